use std::sync::Arc;

use metaschema_metapath::ast::ComparisonOp;
use metaschema_metapath::constraint::{
    AllowedValuesConstraint, CardinalityConstraint, ConstraintCommon, ConstraintComposingVisitor,
    ConstraintKind, ConstraintValidator, ExpectConstraint, IndexConstraint, IndexHasKeyConstraint,
    KeyField, Level, MatchesConstraint, MessageTemplate, TargetedConstraints, UniqueConstraint,
    ValidationConfig, ValidationReport,
};
use metaschema_metapath::model::{BoundNode, BoundNodeBuilder};
use metaschema_metapath::schema::{
    AssemblyDefinition, FieldDefinition, FlagDefinition, FlagInstance, ModelInstance, Module, ModuleInfo,
};
use metaschema_metapath::{
    AtomicType, DynamicContext, Error, ErrorCode, Expr, Item, MetapathExpression, NodeItem,
};
use rstest::rstest;

fn inventory_schema() -> Arc<AssemblyDefinition> {
    let module = ModuleInfo::new("inv", "http://example.com/ns/inv");
    let id = FlagDefinition::new("id", AtomicType::Token, &module);
    let status = FlagDefinition::new("status", AtomicType::String, &module);
    let reference = FlagDefinition::new("ref", AtomicType::Token, &module);
    let price = FieldDefinition::builder("price", &module)
        .datatype(AtomicType::Decimal)
        .build();
    let product = AssemblyDefinition::builder("product", &module)
        .flag(FlagInstance::new(&id).required())
        .flag(FlagInstance::new(&status))
        .model(ModelInstance::field(&price))
        .build();
    let order = AssemblyDefinition::builder("order", &module)
        .flag(FlagInstance::new(&reference))
        .build();
    AssemblyDefinition::builder("inventory", &module)
        .model(ModelInstance::assembly(&order).occurs(0, None))
        .model(ModelInstance::assembly(&product).occurs(0, None))
        .build()
}

fn product(id: &str, status: &str, price: &str) -> BoundNodeBuilder {
    BoundNode::assembly()
        .flag("id", id)
        .flag("status", status)
        .child("price", BoundNode::field(price))
}

/// Orders precede the products they reference, so key lookups must wait for the
/// whole index.
fn inventory(root: &Arc<AssemblyDefinition>) -> NodeItem {
    let bound = BoundNode::assembly()
        .child("order", BoundNode::assembly().flag("ref", "p2"))
        .child("order", BoundNode::assembly().flag("ref", "p9"))
        .child("product", product("p1", "active", "10"))
        .child("product", product("p2", "bogus", "0"))
        .child("product", product("p1", "active", "5"))
        .build();
    NodeItem::document(root, bound, None)
}

fn expr(source: &str, expr: Expr) -> MetapathExpression {
    MetapathExpression::new(source, expr)
}

fn at(target: MetapathExpression) -> ConstraintCommon {
    ConstraintCommon::new(target)
}

fn products_path() -> Expr {
    Expr::path([Expr::child("inventory"), Expr::child("product")])
}

fn id_key() -> Vec<KeyField> {
    vec![KeyField::new(expr("@id", Expr::flag("id")))]
}

fn compiler(source: &str) -> Result<MetapathExpression, Error> {
    match source {
        "@id" => Ok(expr(source, Expr::flag("id"))),
        "price" => Ok(expr(source, Expr::child("price"))),
        "." => Ok(MetapathExpression::context_item()),
        other => Err(Error::from_code(
            ErrorCode::FOER0000,
            format!("cannot compile '{other}'"),
        )),
    }
}

fn full_constraint_set() -> Vec<TargetedConstraints> {
    let positive_price = Expr::general_cmp(ComparisonOp::Gt, Expr::child("price"), Expr::integer(0));
    let template = MessageTemplate::parse("price of {@id} must be positive, got {price}", &compiler).unwrap();
    vec![
        TargetedConstraints::new(expr(
            "inventory/product/@status",
            Expr::path([Expr::child("inventory"), Expr::child("product"), Expr::flag("status")]),
        ))
        .allowed_values(AllowedValuesConstraint::new(
            ConstraintCommon::at_context().with_id("status-values"),
            [("active", "In stock"), ("retired", "No longer sold")],
        )),
        TargetedConstraints::new(expr(
            "inventory/product/@id",
            Expr::path([Expr::child("inventory"), Expr::child("product"), Expr::flag("id")]),
        ))
        .matches(MatchesConstraint::new(ConstraintCommon::at_context(), Some(r"p\d+"), None).unwrap()),
        TargetedConstraints::new(expr(
            "inventory/product/price",
            Expr::path([Expr::child("inventory"), Expr::child("product"), Expr::child("price")]),
        ))
        .matches(
            MatchesConstraint::new(ConstraintCommon::at_context(), None, Some(AtomicType::PositiveInteger))
                .unwrap(),
        ),
        TargetedConstraints::new(expr("inventory/product", products_path())).expect(
            ExpectConstraint::new(
                ConstraintCommon::at_context().with_id("positive-price"),
                expr("price > 0", positive_price),
            )
            .with_message(template),
        ),
        TargetedConstraints::new(expr("inventory", Expr::child("inventory")))
            .index(IndexConstraint::new(
                at(expr("product", Expr::child("product"))),
                "products",
                id_key(),
            ))
            .unique(UniqueConstraint::new(
                at(expr("product", Expr::child("product"))).with_id("unique-products"),
                id_key(),
            ))
            .cardinality(CardinalityConstraint::new(
                at(expr("order", Expr::child("order"))).with_level(Level::Critical),
                Some(1),
                Some(1),
            )),
        TargetedConstraints::new(expr(
            "inventory/order",
            Expr::path([Expr::child("inventory"), Expr::child("order")]),
        ))
        .index_has_key(IndexHasKeyConstraint::new(
            ConstraintCommon::at_context(),
            "products",
            vec![KeyField::new(expr("@ref", Expr::flag("ref")))],
        )),
    ]
}

fn compose(root: &Arc<AssemblyDefinition>, groups: &[TargetedConstraints]) -> usize {
    let module = Module::new(&root.module).with_root(root);
    ConstraintComposingVisitor::new(&DynamicContext::new())
        .compose(&module, groups)
        .unwrap()
}

fn messages(report: &ValidationReport, kind: ConstraintKind) -> Vec<(String, String)> {
    report
        .findings_of(kind)
        .map(|f| (f.path.clone(), f.message.clone()))
        .collect()
}

#[rstest]
fn full_validation_run() {
    let root = inventory_schema();
    assert_eq!(compose(&root, &full_constraint_set()), 6);
    let doc = inventory(&root);
    let report = ConstraintValidator::default()
        .validate(&doc, &DynamicContext::new())
        .unwrap();

    assert_eq!(
        messages(&report, ConstraintKind::AllowedValues),
        [(
            "/inventory[1]/product[2]/@status".to_string(),
            "value 'bogus' is not one of: active, retired".to_string()
        )]
    );
    assert_eq!(
        messages(&report, ConstraintKind::Matches),
        [(
            "/inventory[1]/product[2]/price[1]".to_string(),
            "value '0' is not a valid meta:positive-integer".to_string()
        )]
    );
    assert_eq!(
        messages(&report, ConstraintKind::Expect),
        [(
            "/inventory[1]/product[2]".to_string(),
            "price of p2 must be positive, got 0".to_string()
        )]
    );
    assert_eq!(
        messages(&report, ConstraintKind::Index),
        [(
            "/inventory[1]/product[3]".to_string(),
            "index 'products' has duplicate key (p1) (first at /inventory[1]/product[1])".to_string()
        )]
    );
    assert_eq!(
        messages(&report, ConstraintKind::Unique),
        [(
            "/inventory[1]/product[3]".to_string(),
            "duplicate key (p1) (first at /inventory[1]/product[1])".to_string()
        )]
    );
    assert_eq!(
        messages(&report, ConstraintKind::IndexHasKey),
        [(
            "/inventory[1]/order[2]".to_string(),
            "key (p9) not found in index 'products'".to_string()
        )]
    );
    assert_eq!(
        messages(&report, ConstraintKind::Cardinality),
        [(
            "/inventory[1]".to_string(),
            "2 occurrence(s) of 'order', expected 1..1".to_string()
        )]
    );

    assert!(report.errors.is_empty());
    assert!(!report.is_valid());
    assert_eq!(report.highest_level(), Some(Level::Critical));
    let ids: Vec<_> = report.findings.iter().filter_map(|f| f.constraint_id.as_deref()).collect();
    assert!(ids.contains(&"status-values"));
    assert!(ids.contains(&"unique-products"));
    assert!(ids.contains(&"positive-price"));
}

#[rstest]
fn clean_document_is_valid() {
    let root = inventory_schema();
    compose(&root, &full_constraint_set());
    let bound = BoundNode::assembly()
        .child("order", BoundNode::assembly().flag("ref", "p2"))
        .child("product", product("p1", "active", "10"))
        .child("product", product("p2", "retired", "3"))
        .build();
    let doc = NodeItem::document(&root, bound, None);
    let report = ConstraintValidator::default()
        .validate(&doc, &DynamicContext::new())
        .unwrap();
    assert!(report.findings.is_empty(), "{:?}", report.findings);
    assert!(report.is_valid());
    assert_eq!(report.highest_level(), None);
}

fn status_warning() -> Vec<TargetedConstraints> {
    vec![TargetedConstraints::new(expr(
        "inventory/product/@status",
        Expr::path([Expr::child("inventory"), Expr::child("product"), Expr::flag("status")]),
    ))
    .allowed_values(AllowedValuesConstraint::new(
        ConstraintCommon::at_context().with_level(Level::Warning),
        [("active", ""), ("retired", "")],
    ))]
}

#[rstest]
#[case(Level::Debug, 1)]
#[case(Level::Warning, 1)]
#[case(Level::Error, 0)]
fn min_level_skips_lower_constraints(#[case] min_level: Level, #[case] expected: usize) {
    let root = inventory_schema();
    compose(&root, &status_warning());
    let report = ConstraintValidator::new(ValidationConfig::new().min_level(min_level))
        .validate(&inventory(&root), &DynamicContext::new())
        .unwrap();
    assert_eq!(report.findings_of(ConstraintKind::AllowedValues).count(), expected);
}

#[rstest]
fn warnings_alone_keep_a_document_valid() {
    let root = inventory_schema();
    compose(&root, &status_warning());
    let report = ConstraintValidator::default()
        .validate(&inventory(&root), &DynamicContext::new())
        .unwrap();
    assert_eq!(report.findings.len(), 1);
    assert_eq!(report.findings[0].level, Level::Warning);
    assert!(report.is_valid());
    assert_eq!(report.highest_level(), Some(Level::Warning));
}

/// `@status eq 1` cannot compare a string with a number.
fn failing_expect() -> Vec<TargetedConstraints> {
    let test = Expr::value_cmp(ComparisonOp::Eq, Expr::flag("status"), Expr::integer(1));
    vec![
        TargetedConstraints::new(expr("inventory/product", products_path()))
            .expect(ExpectConstraint::new(ConstraintCommon::at_context(), expr("@status eq 1", test))),
        TargetedConstraints::new(expr("inventory", Expr::child("inventory"))).cardinality(
            CardinalityConstraint::new(at(expr("order", Expr::child("order"))), None, Some(1)),
        ),
    ]
}

#[rstest]
fn evaluation_errors_abort_by_default() {
    let root = inventory_schema();
    compose(&root, &failing_expect());
    let err = ConstraintValidator::default()
        .validate(&inventory(&root), &DynamicContext::new())
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::FORG0001);
}

#[rstest]
fn evaluation_errors_can_be_collected() {
    let root = inventory_schema();
    compose(&root, &failing_expect());
    let report = ConstraintValidator::new(ValidationConfig::new().abort_on_error(false))
        .validate(&inventory(&root), &DynamicContext::new())
        .unwrap();
    assert_eq!(report.errors.len(), 3);
    assert!(report.errors.iter().all(|e| e.code == ErrorCode::FORG0001));
    assert_eq!(report.findings_of(ConstraintKind::Cardinality).count(), 1);
    assert!(!report.is_valid());
}

#[rstest]
fn expect_without_message_names_the_test() {
    let root = inventory_schema();
    let test = Expr::general_cmp(ComparisonOp::Gt, Expr::child("price"), Expr::integer(0));
    compose(
        &root,
        &[TargetedConstraints::new(expr("inventory/product", products_path()))
            .expect(ExpectConstraint::new(ConstraintCommon::at_context(), expr("price > 0", test)))],
    );
    let report = ConstraintValidator::default()
        .validate(&inventory(&root), &DynamicContext::new())
        .unwrap();
    assert_eq!(
        messages(&report, ConstraintKind::Expect),
        [(
            "/inventory[1]/product[2]".to_string(),
            "expect test 'price > 0' is false".to_string()
        )]
    );
}

#[rstest]
fn key_lookup_with_custom_message() {
    let root = inventory_schema();
    let template = MessageTemplate::parse("unknown product \\{ref\\}: {.}", &|source: &str| {
        match source {
            "." => Ok(expr(".", Expr::flag("ref"))),
            other => compiler(other),
        }
    })
    .unwrap();
    compose(
        &root,
        &[
            TargetedConstraints::new(expr("inventory", Expr::child("inventory"))).index(IndexConstraint::new(
                at(expr("product", Expr::child("product"))),
                "products",
                id_key(),
            )),
            TargetedConstraints::new(expr(
                "inventory/order",
                Expr::path([Expr::child("inventory"), Expr::child("order")]),
            ))
            .index_has_key(
                IndexHasKeyConstraint::new(
                    ConstraintCommon::at_context(),
                    "products",
                    vec![KeyField::new(expr("@ref", Expr::flag("ref")))],
                )
                .with_message(template),
            ),
        ],
    );
    let report = ConstraintValidator::default()
        .validate(&inventory(&root), &DynamicContext::new())
        .unwrap();
    assert_eq!(
        messages(&report, ConstraintKind::IndexHasKey),
        [(
            "/inventory[1]/order[2]".to_string(),
            "unknown product {ref\\}: p9".to_string()
        )]
    );
}

#[rstest]
fn missing_index_fails_every_lookup() {
    let root = inventory_schema();
    compose(
        &root,
        &[TargetedConstraints::new(expr(
            "inventory/order",
            Expr::path([Expr::child("inventory"), Expr::child("order")]),
        ))
        .index_has_key(IndexHasKeyConstraint::new(
            ConstraintCommon::at_context(),
            "nowhere",
            vec![KeyField::new(expr("@ref", Expr::flag("ref")))],
        ))],
    );
    let report = ConstraintValidator::default()
        .validate(&inventory(&root), &DynamicContext::new())
        .unwrap();
    assert_eq!(report.findings_of(ConstraintKind::IndexHasKey).count(), 2);
}

#[rstest]
#[case(r"p(\d+)", "p42", Some("42"))]
#[case(r"p\d+", "p42", Some("p42"))]
#[case(r"q(\d+)", "p42", Some("p42"))]
fn key_field_patterns(#[case] pattern: &str, #[case] id: &str, #[case] expected: Option<&str>) {
    let root = inventory_schema();
    let bound = BoundNode::assembly().child("product", product(id, "active", "1")).build();
    let doc = NodeItem::document(&root, bound, None);
    let product = doc.get_model_items_by_name("inventory")[0].get_model_items_by_name("product")[0].clone();
    let field = KeyField::new(expr("@id", Expr::flag("id"))).with_pattern(pattern).unwrap();
    let key = field
        .key_value(&Item::Node(product), &DynamicContext::new())
        .unwrap();
    assert_eq!(key.as_deref(), expected);
}

#[rstest]
fn key_field_without_value() {
    let root = inventory_schema();
    let bound = BoundNode::assembly().child("order", BoundNode::assembly()).build();
    let doc = NodeItem::document(&root, bound, None);
    let order = doc.get_model_items_by_name("inventory")[0].get_model_items_by_name("order")[0].clone();
    let field = KeyField::new(expr("@ref", Expr::flag("ref")));
    assert_eq!(field.key_value(&Item::Node(order), &DynamicContext::new()).unwrap(), None);
}

#[rstest]
#[case("plain text", 0, "plain text")]
#[case("id={@id}", 1, "id=p1")]
#[case("{ @id } and { price }", 2, "p1 and 10")]
#[case(r"literal \{x} then {@id}", 1, "literal {x} then p1")]
fn message_templates(#[case] template: &str, #[case] snippets: usize, #[case] expected: &str) {
    let root = inventory_schema();
    let doc = inventory(&root);
    let product = doc.get_model_items_by_name("inventory")[0].get_model_items_by_name("product")[0].clone();
    let template = MessageTemplate::parse(template, &compiler).unwrap();
    assert_eq!(template.snippet_count(), snippets);
    let rendered = template
        .render(&Item::Node(product), &DynamicContext::new())
        .unwrap();
    assert_eq!(rendered, expected);
}

#[rstest]
fn template_joins_multiple_results() {
    let root = inventory_schema();
    let doc = inventory(&root);
    let inventory = doc.get_model_items_by_name("inventory")[0].clone();
    let template = MessageTemplate::parse("ids: {product/@id}", &|source: &str| -> Result<MetapathExpression, Error> {
        Ok(expr(source, Expr::path([Expr::child("product"), Expr::flag("id")])))
    })
    .unwrap();
    assert_eq!(
        template.render(&Item::Node(inventory), &DynamicContext::new()).unwrap(),
        "ids: p1, p2, p1"
    );
}

#[rstest]
fn template_compile_errors_propagate() {
    let err = MessageTemplate::parse("bad {nonsense}", &compiler).unwrap_err();
    assert_eq!(err.code, ErrorCode::FOER0000);
    let literal = MessageTemplate::literal("as is {x}");
    assert_eq!(literal.snippet_count(), 0);
    assert_eq!(literal.to_string(), "as is {x}");
}

#[rstest]
fn levels_are_ordered() {
    assert!(Level::Debug < Level::Informational);
    assert!(Level::Warning < Level::Error);
    assert!(Level::Error < Level::Critical);
    assert_eq!(Level::default(), Level::Error);
    assert_eq!(Level::Critical.to_string(), "CRITICAL");
}
