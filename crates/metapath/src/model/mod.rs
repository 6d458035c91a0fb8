//! Read-only node tree over a bound document.
//!
//! A [`NodeItem`] projects a bound object graph (see [`BoundObject`]) onto the
//! schema: flags and model children are produced by iterating the declared flag and
//! model instances of the node's definition and pulling their values from the bound
//! object. Both child maps are built on first access, once per node, and then kept
//! for the lifetime of the node.
//!
//! Children own nothing upward: the parent link is weak, so a node must be reached
//! from a live document (or orphan root) for [`NodeItem::parent`] to resolve.

mod bound;

pub use bound::{BoundNode, BoundNodeBuilder, BoundNodeOrBuilder, BoundObject};

use core::fmt;
use std::sync::{Arc, OnceLock, Weak};

use indexmap::IndexMap;

use crate::engine::runtime::{Error, ErrorCode};
use crate::schema::{
    AssemblyDefinition, Definition, FieldDefinition, FlagDefinition, FlagInstance, ModelDefinition,
};
use crate::xdm::AtomicValue;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Document,
    Assembly,
    Field,
    Flag,
}

impl NodeKind {
    pub fn type_name(self) -> &'static str {
        match self {
            NodeKind::Document => "document-node",
            NodeKind::Assembly => "assembly",
            NodeKind::Field => "field",
            NodeKind::Flag => "flag",
        }
    }
}

/// A name test used when selecting flags or model children.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum NameTest {
    Name(String),
    Wildcard,
}

impl NameTest {
    pub fn name(name: impl Into<String>) -> Self {
        NameTest::Name(name.into())
    }
}

impl fmt::Display for NameTest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NameTest::Name(n) => f.write_str(n),
            NameTest::Wildcard => f.write_str("*"),
        }
    }
}

type Bound = Option<Arc<dyn BoundObject>>;

#[derive(Debug)]
enum NodeData {
    Document {
        root: Arc<AssemblyDefinition>,
        value: Bound,
    },
    Assembly {
        name: String,
        definition: Arc<AssemblyDefinition>,
        value: Bound,
    },
    Field {
        name: String,
        definition: Arc<FieldDefinition>,
        value: Bound,
    },
    Flag {
        name: String,
        definition: Arc<FlagDefinition>,
        value: Option<AtomicValue>,
    },
}

#[derive(Debug)]
struct NodeInner {
    data: NodeData,
    position: usize,
    parent: Option<Weak<NodeInner>>,
    /// Set on documents and orphan roots; everything else inherits from its parent.
    base_uri: Option<String>,
    /// Definition-mode trees have no bound values and one node per declared instance.
    definition_mode: bool,
    flags: OnceLock<IndexMap<String, NodeItem>>,
    model: OnceLock<IndexMap<String, Vec<NodeItem>>>,
}

/// A node of the document tree. Cloning is cheap; equality is identity.
#[derive(Clone)]
pub struct NodeItem(Arc<NodeInner>);

impl PartialEq for NodeItem {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for NodeItem {}

impl std::hash::Hash for NodeItem {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        Arc::as_ptr(&self.0).hash(state);
    }
}

impl fmt::Debug for NodeItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeItem")
            .field("kind", &self.kind())
            .field("path", &self.path())
            .finish()
    }
}

impl NodeItem {
    fn new(
        data: NodeData,
        position: usize,
        parent: Option<&Arc<NodeInner>>,
        base_uri: Option<String>,
        definition_mode: bool,
    ) -> Self {
        NodeItem(Arc::new(NodeInner {
            data,
            position,
            parent: parent.map(Arc::downgrade),
            base_uri,
            definition_mode,
            flags: OnceLock::new(),
            model: OnceLock::new(),
        }))
    }

    /// A document whose single root assembly is bound to `value`.
    pub fn document(
        root: &Arc<AssemblyDefinition>,
        value: Arc<dyn BoundObject>,
        document_uri: Option<&str>,
    ) -> Self {
        Self::new(
            NodeData::Document {
                root: Arc::clone(root),
                value: Some(value),
            },
            1,
            None,
            document_uri.map(str::to_string),
            false,
        )
    }

    /// A document over the definitions alone, with one node per declared flag and
    /// model instance and no values. Used to evaluate constraint targets against
    /// the schema.
    pub fn definition_document(root: &Arc<AssemblyDefinition>) -> Self {
        Self::new(
            NodeData::Document {
                root: Arc::clone(root),
                value: None,
            },
            1,
            None,
            None,
            true,
        )
    }

    /// A detached assembly: no parent, its own base URI.
    pub fn orphan_assembly(
        definition: &Arc<AssemblyDefinition>,
        value: Arc<dyn BoundObject>,
        base_uri: Option<&str>,
    ) -> Self {
        Self::new(
            NodeData::Assembly {
                name: definition.name.clone(),
                definition: Arc::clone(definition),
                value: Some(value),
            },
            1,
            None,
            base_uri.map(str::to_string),
            false,
        )
    }

    /// A detached field: no parent, its own base URI.
    pub fn orphan_field(
        definition: &Arc<FieldDefinition>,
        value: Arc<dyn BoundObject>,
        base_uri: Option<&str>,
    ) -> Self {
        Self::new(
            NodeData::Field {
                name: definition.name.clone(),
                definition: Arc::clone(definition),
                value: Some(value),
            },
            1,
            None,
            base_uri.map(str::to_string),
            false,
        )
    }

    pub fn kind(&self) -> NodeKind {
        match &self.0.data {
            NodeData::Document { .. } => NodeKind::Document,
            NodeData::Assembly { .. } => NodeKind::Assembly,
            NodeData::Field { .. } => NodeKind::Field,
            NodeData::Flag { .. } => NodeKind::Flag,
        }
    }

    /// Effective name; empty for documents.
    pub fn name(&self) -> &str {
        match &self.0.data {
            NodeData::Document { .. } => "",
            NodeData::Assembly { name, .. }
            | NodeData::Field { name, .. }
            | NodeData::Flag { name, .. } => name,
        }
    }

    /// 1-based position among same-named siblings.
    pub fn position(&self) -> usize {
        self.0.position
    }

    pub fn is_definition_mode(&self) -> bool {
        self.0.definition_mode
    }

    pub fn definition(&self) -> Definition {
        match &self.0.data {
            NodeData::Document { root, .. } => Definition::Assembly(Arc::clone(root)),
            NodeData::Assembly { definition, .. } => Definition::Assembly(Arc::clone(definition)),
            NodeData::Field { definition, .. } => Definition::Field(Arc::clone(definition)),
            NodeData::Flag { definition, .. } => Definition::Flag(Arc::clone(definition)),
        }
    }

    pub fn parent(&self) -> Option<NodeItem> {
        self.0.parent.as_ref().and_then(Weak::upgrade).map(NodeItem)
    }

    /// Parent, grandparent, ... up to the root.
    pub fn ancestors(&self) -> impl Iterator<Item = NodeItem> {
        std::iter::successors(self.parent(), NodeItem::parent)
    }

    /// The topmost reachable ancestor (or the node itself).
    pub fn root(&self) -> NodeItem {
        self.ancestors().last().unwrap_or_else(|| self.clone())
    }

    pub fn base_uri(&self) -> Option<String> {
        if let Some(uri) = &self.0.base_uri {
            return Some(uri.clone());
        }
        self.parent().and_then(|p| p.base_uri())
    }

    /// Document URI; only document nodes carry one.
    pub fn document_uri(&self) -> Option<String> {
        match self.0.data {
            NodeData::Document { .. } => self.0.base_uri.clone(),
            _ => None,
        }
    }

    /// Flags keyed by effective name, in declaration order.
    pub fn flags(&self) -> &IndexMap<String, NodeItem> {
        self.0.flags.get_or_init(|| self.init_flags())
    }

    /// Model children keyed by effective name, in declaration order; each entry lists
    /// the same-named siblings in document order.
    pub fn model_items(&self) -> &IndexMap<String, Vec<NodeItem>> {
        self.0.model.get_or_init(|| self.init_model_items())
    }

    pub fn get_flag_by_name(&self, name: &str) -> Option<&NodeItem> {
        self.flags().get(name)
    }

    /// The cached child list for `name`; the same slice on every call.
    pub fn get_model_items_by_name(&self, name: &str) -> &[NodeItem] {
        self.model_items()
            .get(name)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn matching_flags(&self, test: &NameTest) -> Vec<NodeItem> {
        match test {
            NameTest::Name(n) => self.get_flag_by_name(n).cloned().into_iter().collect(),
            NameTest::Wildcard => self.flags().values().cloned().collect(),
        }
    }

    pub fn matching_model_items(&self, test: &NameTest) -> Vec<NodeItem> {
        match test {
            NameTest::Name(n) => self.get_model_items_by_name(n).to_vec(),
            NameTest::Wildcard => self.model_items().values().flatten().cloned().collect(),
        }
    }

    /// All model children in order.
    pub fn children(&self) -> impl Iterator<Item = &NodeItem> {
        self.model_items().values().flatten()
    }

    pub fn has_children(&self) -> bool {
        self.children().next().is_some()
    }

    /// The node and all of its model descendants, depth first in document order.
    /// Flags are not included.
    pub fn descendants_or_self(&self) -> Vec<NodeItem> {
        let mut out = Vec::new();
        let mut stack = vec![self.clone()];
        while let Some(node) = stack.pop() {
            let mark = stack.len();
            stack.extend(node.children().cloned());
            stack[mark..].reverse();
            out.push(node);
        }
        out
    }

    /// Sort key reflecting document order within one tree: flags precede model
    /// children, children follow their declaration order and then their position.
    pub fn document_order_key(&self) -> Vec<(usize, usize)> {
        let mut key = Vec::new();
        let mut cur = self.clone();
        while let Some(parent) = cur.parent() {
            let step = match cur.kind() {
                NodeKind::Flag => (0, parent.flags().get_index_of(cur.name()).unwrap_or(0)),
                _ => (
                    1 + parent.model_items().get_index_of(cur.name()).unwrap_or(0),
                    cur.position(),
                ),
            };
            key.push(step);
            cur = parent;
        }
        key.reverse();
        key
    }

    /// The value carried by a flag or field, before datatype casting.
    pub fn raw_value(&self) -> Option<AtomicValue> {
        match &self.0.data {
            NodeData::Flag { value, .. } => value.clone(),
            NodeData::Field { value, .. } => value.as_ref().and_then(|v| v.field_value()),
            _ => None,
        }
    }

    /// Typed value of a flag or field, cast to the declared datatype.
    ///
    /// Flags and fields without a value yield `None`. Documents and assemblies have
    /// no typed value and raise `FOTY0012`.
    pub fn typed_value(&self) -> Result<Option<AtomicValue>, Error> {
        let datatype = match &self.0.data {
            NodeData::Flag { definition, .. } => definition.datatype,
            NodeData::Field { definition, .. } => definition.datatype,
            NodeData::Document { .. } | NodeData::Assembly { .. } => {
                return Err(Error::from_code(
                    ErrorCode::FOTY0012,
                    format!("{} {} has no typed value", self.kind().type_name(), self.path()),
                ));
            }
        };
        self.raw_value().map(|v| datatype.cast(&v)).transpose()
    }

    /// Concatenated string value: the value itself for flags and fields, the values of
    /// all descendant fields for assemblies and documents.
    pub fn string_value(&self) -> String {
        match self.kind() {
            NodeKind::Flag | NodeKind::Field => self
                .raw_value()
                .map(|v| v.as_string())
                .unwrap_or_default(),
            NodeKind::Assembly | NodeKind::Document => {
                self.children().map(NodeItem::string_value).collect()
            }
        }
    }

    /// Location path such as `/package[1]/item[2]/@id`.
    pub fn path(&self) -> String {
        let segment = match self.kind() {
            NodeKind::Document => return "/".to_string(),
            NodeKind::Flag => format!("@{}", self.name()),
            NodeKind::Assembly | NodeKind::Field => format!("{}[{}]", self.name(), self.position()),
        };
        match self.parent() {
            Some(p) if p.kind() == NodeKind::Document => format!("/{segment}"),
            Some(p) => format!("{}/{segment}", p.path()),
            None => segment,
        }
    }

    fn bound(&self) -> Option<&Arc<dyn BoundObject>> {
        match &self.0.data {
            NodeData::Document { value, .. }
            | NodeData::Assembly { value, .. }
            | NodeData::Field { value, .. } => value.as_ref(),
            NodeData::Flag { .. } => None,
        }
    }

    fn declared_flags(&self) -> &[FlagInstance] {
        match &self.0.data {
            NodeData::Assembly { definition, .. } => &definition.flags,
            NodeData::Field { definition, .. } => &definition.flags,
            NodeData::Document { .. } | NodeData::Flag { .. } => &[],
        }
    }

    fn init_flags(&self) -> IndexMap<String, NodeItem> {
        let mut flags = IndexMap::new();
        for instance in self.declared_flags() {
            let name = instance.effective_name();
            let value = self.bound().and_then(|b| b.flag_value(name));
            if value.is_none() && !self.0.definition_mode {
                continue;
            }
            let node = NodeItem::new(
                NodeData::Flag {
                    name: name.to_string(),
                    definition: Arc::clone(&instance.definition),
                    value,
                },
                1,
                Some(&self.0),
                None,
                self.0.definition_mode,
            );
            flags.insert(name.to_string(), node);
        }
        flags
    }

    fn init_model_items(&self) -> IndexMap<String, Vec<NodeItem>> {
        let mut model = IndexMap::new();
        match &self.0.data {
            NodeData::Document { root, value } => {
                let name = root.root_name().to_string();
                let node = self.child(
                    ModelDefinition::Assembly(Arc::clone(root)),
                    &name,
                    value.clone(),
                    1,
                );
                model.insert(name, vec![node]);
            }
            NodeData::Assembly { definition, .. } => {
                for instance in &definition.model {
                    let name = instance.effective_name();
                    let values: Vec<Bound> = if self.0.definition_mode {
                        vec![None]
                    } else {
                        self.bound()
                            .map(|b| b.model_values(name).into_iter().map(Some).collect())
                            .unwrap_or_default()
                    };
                    if values.is_empty() {
                        continue;
                    }
                    let children = values
                        .into_iter()
                        .enumerate()
                        .map(|(i, v)| self.child(instance.definition.clone(), name, v, i + 1))
                        .collect();
                    model.insert(name.to_string(), children);
                }
            }
            NodeData::Field { .. } | NodeData::Flag { .. } => {}
        }
        model
    }

    fn child(&self, definition: ModelDefinition, name: &str, value: Bound, position: usize) -> NodeItem {
        let data = match definition {
            ModelDefinition::Assembly(definition) => NodeData::Assembly {
                name: name.to_string(),
                definition,
                value,
            },
            ModelDefinition::Field(definition) => NodeData::Field {
                name: name.to_string(),
                definition,
                value,
            },
        };
        NodeItem::new(data, position, Some(&self.0), None, self.0.definition_mode)
    }
}
