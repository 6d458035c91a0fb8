use std::sync::Arc;

use metaschema_metapath::model::BoundNode;
use metaschema_metapath::schema::{
    AssemblyDefinition, FieldDefinition, FlagDefinition, FlagInstance, ModelInstance, ModuleInfo,
};
use metaschema_metapath::{AtomicType, AtomicValue, ErrorCode, NodeItem, NodeKind};
use rstest::rstest;

struct Schema {
    package: Arc<AssemblyDefinition>,
    item: Arc<FieldDefinition>,
}

fn schema() -> Schema {
    let module = ModuleInfo::new("pkg", "http://example.com/ns/pkg");
    let id = FlagDefinition::new("id", AtomicType::Token, &module);
    let unit = FlagDefinition::new("unit", AtomicType::String, &module);
    let item = FieldDefinition::builder("item", &module)
        .datatype(AtomicType::Integer)
        .flag(FlagInstance::new(&unit))
        .build();
    let note = FieldDefinition::builder("note", &module).build();
    let entry = AssemblyDefinition::builder("entry", &module)
        .flag(FlagInstance::new(&id).use_name("ref"))
        .model(ModelInstance::field(&note))
        .build();
    let package = AssemblyDefinition::builder("package", &module)
        .flag(FlagInstance::new(&id).required())
        .model(ModelInstance::field(&item).occurs(0, None).group_as("items"))
        .model(ModelInstance::assembly(&entry).occurs(0, None))
        .build();
    Schema { package, item }
}

/// `<package id="p1"><item>10</item><item unit="kg">20</item><entry ref="a"><note>hello</note></entry></package>`
fn document(schema: &Schema, uri: Option<&str>) -> NodeItem {
    let bound = BoundNode::assembly()
        .flag("id", "p1")
        .child("item", BoundNode::field("10"))
        .child("item", BoundNode::field("20").flag("unit", "kg"))
        .child(
            "entry",
            BoundNode::assembly()
                .flag("ref", "a")
                .child("note", BoundNode::field("hello")),
        )
        .build();
    NodeItem::document(&schema.package, bound, uri)
}

fn package(doc: &NodeItem) -> NodeItem {
    doc.get_model_items_by_name("package")[0].clone()
}

#[rstest]
fn document_has_the_root_assembly() {
    let s = schema();
    let doc = document(&s, None);
    assert_eq!(doc.kind(), NodeKind::Document);
    assert_eq!(doc.name(), "");
    let root = package(&doc);
    assert_eq!(root.kind(), NodeKind::Assembly);
    assert_eq!(root.name(), "package");
    assert_eq!(root.parent(), Some(doc.clone()));
}

#[rstest]
fn siblings_have_positions() {
    let s = schema();
    let doc = document(&s, None);
    let items = package(&doc).get_model_items_by_name("item").to_vec();
    assert_eq!(items.len(), 2);
    assert_eq!(items[0].position(), 1);
    assert_eq!(items[1].position(), 2);
}

#[rstest]
fn child_lists_are_built_once() {
    let s = schema();
    let doc = document(&s, None);
    let root = package(&doc);
    let first = root.get_model_items_by_name("item");
    let again = root.get_model_items_by_name("item");
    assert!(std::ptr::eq(first.as_ptr(), again.as_ptr()));
    assert_eq!(first[0], again[0]);
    assert!(root.get_model_items_by_name("missing").is_empty());
}

#[rstest]
fn paths_name_each_step() {
    let s = schema();
    let doc = document(&s, None);
    let root = package(&doc);
    let second = root.get_model_items_by_name("item")[1].clone();
    assert_eq!(doc.path(), "/");
    assert_eq!(root.path(), "/package[1]");
    assert_eq!(second.path(), "/package[1]/item[2]");
    let unit = second.get_flag_by_name("unit").unwrap();
    assert_eq!(unit.path(), "/package[1]/item[2]/@unit");
    let note = &root.get_model_items_by_name("entry")[0].get_model_items_by_name("note")[0];
    assert_eq!(note.path(), "/package[1]/entry[1]/note[1]");
}

#[rstest]
fn parent_and_root_navigation() {
    let s = schema();
    let doc = document(&s, None);
    let root = package(&doc);
    let entry = root.get_model_items_by_name("entry")[0].clone();
    let note = entry.get_model_items_by_name("note")[0].clone();
    assert_eq!(note.parent(), Some(entry.clone()));
    assert_eq!(note.root(), doc);
    let names: Vec<String> = note.ancestors().map(|n| n.name().to_string()).collect();
    assert_eq!(names, ["entry", "package", ""]);
}

#[rstest]
fn flags_without_values_are_absent() {
    let s = schema();
    let doc = document(&s, None);
    let root = package(&doc);
    let items = root.get_model_items_by_name("item");
    assert!(items[0].flags().is_empty());
    assert_eq!(items[1].flags().len(), 1);
    let entry = &root.get_model_items_by_name("entry")[0];
    assert!(entry.get_flag_by_name("id").is_none());
    assert_eq!(
        entry.get_flag_by_name("ref").unwrap().typed_value().unwrap(),
        Some(AtomicValue::Token("a".into()))
    );
}

#[rstest]
fn typed_values_follow_the_datatype() {
    let s = schema();
    let doc = document(&s, None);
    let root = package(&doc);
    let items = root.get_model_items_by_name("item");
    assert_eq!(items[0].raw_value(), Some(AtomicValue::string("10")));
    assert_eq!(items[0].typed_value().unwrap(), Some(AtomicValue::Integer(10)));
    assert_eq!(
        root.get_flag_by_name("id").unwrap().typed_value().unwrap(),
        Some(AtomicValue::Token("p1".into()))
    );
}

#[rstest]
fn assemblies_have_no_typed_value() {
    let s = schema();
    let doc = document(&s, None);
    let err = package(&doc).typed_value().unwrap_err();
    assert_eq!(err.code, ErrorCode::FOTY0012);
    assert_eq!(doc.typed_value().unwrap_err().code, ErrorCode::FOTY0012);
}

#[rstest]
fn invalid_field_value_fails_to_atomize() {
    let s = schema();
    let bound = BoundNode::assembly().child("item", BoundNode::field("ten")).build();
    let doc = NodeItem::document(&s.package, bound, None);
    let item = package(&doc).get_model_items_by_name("item")[0].clone();
    assert_eq!(item.typed_value().unwrap_err().code, ErrorCode::FORG0001);
    assert_eq!(item.string_value(), "ten");
}

#[rstest]
fn string_value_concatenates_descendant_fields() {
    let s = schema();
    let doc = document(&s, None);
    assert_eq!(package(&doc).string_value(), "1020hello");
    assert_eq!(doc.string_value(), "1020hello");
}

#[rstest]
fn descendants_are_in_document_order() {
    let s = schema();
    let doc = document(&s, None);
    let paths: Vec<String> = package(&doc).descendants_or_self().iter().map(NodeItem::path).collect();
    assert_eq!(
        paths,
        [
            "/package[1]",
            "/package[1]/item[1]",
            "/package[1]/item[2]",
            "/package[1]/entry[1]",
            "/package[1]/entry[1]/note[1]",
        ]
    );
}

#[rstest]
fn document_order_puts_flags_first() {
    let s = schema();
    let doc = document(&s, None);
    let root = package(&doc);
    let id = root.get_flag_by_name("id").unwrap().clone();
    let items = root.get_model_items_by_name("item");
    let entry = root.get_model_items_by_name("entry")[0].clone();
    assert!(id.document_order_key() < items[0].document_order_key());
    assert!(items[0].document_order_key() < items[1].document_order_key());
    assert!(items[1].document_order_key() < entry.document_order_key());
    assert!(root.document_order_key() < id.document_order_key());
}

#[rstest]
fn base_uri_is_inherited_from_the_document() {
    let s = schema();
    let doc = document(&s, Some("file:///tmp/pkg.xml"));
    let item = package(&doc).get_model_items_by_name("item")[0].clone();
    assert_eq!(item.base_uri().as_deref(), Some("file:///tmp/pkg.xml"));
    assert_eq!(doc.document_uri().as_deref(), Some("file:///tmp/pkg.xml"));
    assert_eq!(item.document_uri(), None);
}

#[rstest]
fn orphan_nodes_carry_their_own_base_uri() {
    let s = schema();
    let orphan = NodeItem::orphan_field(&s.item, BoundNode::field("5").build(), Some("http://example.com/x"));
    assert_eq!(orphan.parent(), None);
    assert_eq!(orphan.root(), orphan);
    assert_eq!(orphan.base_uri().as_deref(), Some("http://example.com/x"));
    assert_eq!(orphan.typed_value().unwrap(), Some(AtomicValue::Integer(5)));
    assert_eq!(orphan.path(), "item[1]");

    let bare = NodeItem::orphan_assembly(&s.package, BoundNode::assembly().build(), None);
    assert_eq!(bare.base_uri(), None);
    assert!(!bare.has_children());
}

#[rstest]
fn definition_documents_have_one_node_per_instance() {
    let s = schema();
    let doc = NodeItem::definition_document(&s.package);
    assert!(doc.is_definition_mode());
    let root = package(&doc);
    assert!(root.is_definition_mode());
    assert_eq!(root.get_model_items_by_name("item").len(), 1);
    assert!(root.get_flag_by_name("id").is_some());
    let item = &root.get_model_items_by_name("item")[0];
    assert!(item.get_flag_by_name("unit").is_some());
    assert_eq!(item.raw_value(), None);
    assert_eq!(item.typed_value().unwrap(), None);
    assert_eq!(item.definition().name(), "item");
}

#[rstest]
fn node_identity() {
    let s = schema();
    let a = document(&s, None);
    let b = document(&s, None);
    assert_ne!(a, b);
    assert_eq!(package(&a), package(&a));
}

#[rstest]
fn concurrent_first_access_shares_one_child_list() {
    let s = schema();
    let doc = document(&s, None);
    let root = package(&doc);
    let addresses: Vec<(usize, usize)> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..8)
            .map(|_| {
                scope.spawn(|| {
                    let items = root.get_model_items_by_name("item");
                    let flag = root.get_flag_by_name("id").map_or(0, |f| std::ptr::from_ref(f).addr());
                    (items.as_ptr().addr(), flag)
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });
    let first = addresses[0];
    assert!(addresses.iter().all(|a| *a == first));
    assert_eq!(first.0, root.get_model_items_by_name("item").as_ptr().addr());
    assert_eq!(root.get_model_items_by_name("item").len(), 2);
}
