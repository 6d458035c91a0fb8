//! The contract between a binding layer and the node tree, plus a small in-memory
//! implementation of it.
//!
//! ```
//! use metaschema_metapath::model::BoundNode;
//! use metaschema_metapath::xdm::AtomicValue;
//!
//! // <package id="p1"><item>10</item><item>20</item></package>
//! let package = BoundNode::assembly()
//!     .flag("id", AtomicValue::string("p1"))
//!     .child("item", BoundNode::field(AtomicValue::string("10")))
//!     .child("item", BoundNode::field(AtomicValue::string("20")))
//!     .build();
//! assert_eq!(package.children_named("item").len(), 2);
//! ```

use core::fmt;
use std::sync::Arc;

use indexmap::IndexMap;

use crate::xdm::AtomicValue;

/// A bound object: one assembly or field value of a parsed document.
///
/// Names are the effective (schema) names of flag and model instances. Values are
/// already parsed by the binding layer; the node tree casts them to the declared
/// datatype when they are atomized.
pub trait BoundObject: Send + Sync + fmt::Debug {
    fn flag_value(&self, name: &str) -> Option<AtomicValue>;

    /// Values bound to the model instance `name`, in document order. Empty when absent.
    fn model_values(&self, name: &str) -> Vec<Arc<dyn BoundObject>>;

    /// The value of a field. Assemblies return `None`.
    fn field_value(&self) -> Option<AtomicValue>;
}

#[derive(Debug, Default)]
pub struct BoundNode {
    value: Option<AtomicValue>,
    flags: IndexMap<String, AtomicValue>,
    children: IndexMap<String, Vec<Arc<BoundNode>>>,
}

impl BoundNode {
    pub fn assembly() -> BoundNodeBuilder {
        BoundNodeBuilder {
            node: BoundNode::default(),
        }
    }

    pub fn field(value: impl Into<AtomicValue>) -> BoundNodeBuilder {
        BoundNodeBuilder {
            node: BoundNode {
                value: Some(value.into()),
                ..BoundNode::default()
            },
        }
    }

    /// A field without a value; it still carries flags.
    pub fn empty_field() -> BoundNodeBuilder {
        Self::assembly()
    }

    pub fn children_named(&self, name: &str) -> &[Arc<BoundNode>] {
        self.children.get(name).map(Vec::as_slice).unwrap_or_default()
    }
}

impl BoundObject for BoundNode {
    fn flag_value(&self, name: &str) -> Option<AtomicValue> {
        self.flags.get(name).cloned()
    }

    fn model_values(&self, name: &str) -> Vec<Arc<dyn BoundObject>> {
        self.children_named(name)
            .iter()
            .map(|c| Arc::clone(c) as Arc<dyn BoundObject>)
            .collect()
    }

    fn field_value(&self) -> Option<AtomicValue> {
        self.value.clone()
    }
}

pub struct BoundNodeBuilder {
    node: BoundNode,
}

impl BoundNodeBuilder {
    pub fn flag(mut self, name: impl Into<String>, value: impl Into<AtomicValue>) -> Self {
        self.node.flags.insert(name.into(), value.into());
        self
    }

    pub fn child(mut self, name: impl Into<String>, child: impl Into<BoundNodeOrBuilder>) -> Self {
        let child = match child.into() {
            BoundNodeOrBuilder::Built(n) => n,
            BoundNodeOrBuilder::Builder(b) => b.build(),
        };
        self.node.children.entry(name.into()).or_default().push(child);
        self
    }

    pub fn build(self) -> Arc<BoundNode> {
        Arc::new(self.node)
    }
}

pub enum BoundNodeOrBuilder {
    Built(Arc<BoundNode>),
    Builder(BoundNodeBuilder),
}

impl From<Arc<BoundNode>> for BoundNodeOrBuilder {
    fn from(n: Arc<BoundNode>) -> Self {
        BoundNodeOrBuilder::Built(n)
    }
}

impl From<BoundNodeBuilder> for BoundNodeOrBuilder {
    fn from(b: BoundNodeBuilder) -> Self {
        BoundNodeOrBuilder::Builder(b)
    }
}
