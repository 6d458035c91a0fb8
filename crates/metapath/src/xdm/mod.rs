use core::fmt;
use std::ops::Deref;
use std::sync::Arc;

use crate::engine::runtime::{Error, ErrorCode};
use crate::model::NodeItem;

mod atomic;
mod numeric;
pub(crate) mod temporal;
mod types;

pub use atomic::AtomicValue;
pub use numeric::ArithmeticOp;
pub use types::AtomicType;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ExpandedName {
    pub ns_uri: Option<String>,
    pub local: String,
}

impl ExpandedName {
    pub fn new(ns_uri: Option<String>, local: impl Into<String>) -> Self {
        Self {
            ns_uri,
            local: local.into(),
        }
    }

    /// Name in the built-in function namespace.
    pub fn function(local: impl Into<String>) -> Self {
        Self::new(Some(crate::consts::FNS.to_string()), local)
    }

    pub fn local(local: impl Into<String>) -> Self {
        Self::new(None, local)
    }
}

impl fmt::Display for ExpandedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.ns_uri.as_deref() {
            Some(crate::consts::FNS) => write!(f, "fn:{}", self.local),
            Some(crate::consts::MP) => write!(f, "mp:{}", self.local),
            Some(ns) => write!(f, "Q{{{}}}{}", ns, self.local),
            None => f.write_str(&self.local),
        }
    }
}

/// A single item of a sequence: either a node of the document tree or an atomic value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Item {
    Node(NodeItem),
    Atomic(AtomicValue),
}

impl Item {
    pub fn as_node(&self) -> Option<&NodeItem> {
        match self {
            Item::Node(n) => Some(n),
            Item::Atomic(_) => None,
        }
    }

    pub fn as_atomic(&self) -> Option<&AtomicValue> {
        match self {
            Item::Atomic(a) => Some(a),
            Item::Node(_) => None,
        }
    }

    /// Atomize the item. Nodes without a typed value (document, assembly) raise `FOTY0012`;
    /// field and flag nodes that carry no value atomize to nothing.
    pub fn atomize(&self) -> Result<Option<AtomicValue>, Error> {
        match self {
            Item::Atomic(a) => Ok(Some(a.clone())),
            Item::Node(n) => n.typed_value(),
        }
    }

    /// Name of the item's dynamic type, used in diagnostics.
    pub fn type_name(&self) -> String {
        match self {
            Item::Atomic(a) => a.type_of().qualified_name(),
            Item::Node(n) => n.kind().type_name().to_string(),
        }
    }
}

impl From<NodeItem> for Item {
    fn from(n: NodeItem) -> Self {
        Item::Node(n)
    }
}

impl From<AtomicValue> for Item {
    fn from(a: AtomicValue) -> Self {
        Item::Atomic(a)
    }
}

impl fmt::Display for Item {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Item::Node(n) => write!(f, "{}", n.path()),
            Item::Atomic(a) => f.write_str(&a.as_string()),
        }
    }
}

/// An ordered, immutable list of items. Cloning is cheap; the item storage is shared.
///
/// Equality and hashing are structural, so two sequences built separately from equal
/// items compare equal. Use [`Sequence::ptr_eq`] to test for the same instance.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Sequence(Arc<[Item]>);

impl Sequence {
    pub fn empty() -> Self {
        Sequence(Arc::from(Vec::<Item>::new()))
    }

    pub fn new(items: Vec<Item>) -> Self {
        Sequence(Arc::from(items))
    }

    pub fn singleton(item: impl Into<Item>) -> Self {
        Sequence::new(vec![item.into()])
    }

    pub fn atomic(value: AtomicValue) -> Self {
        Sequence::singleton(Item::Atomic(value))
    }

    pub fn boolean(b: bool) -> Self {
        Sequence::atomic(AtomicValue::Boolean(b))
    }

    pub fn items(&self) -> &[Item] {
        &self.0
    }

    pub fn ptr_eq(a: &Sequence, b: &Sequence) -> bool {
        Arc::ptr_eq(&a.0, &b.0)
    }

    pub fn to_vec(&self) -> Vec<Item> {
        self.0.to_vec()
    }

    /// Atomize every item, dropping nodes that have no value.
    pub fn atomize(&self) -> Result<Vec<AtomicValue>, Error> {
        let mut out = Vec::with_capacity(self.len());
        for item in self.iter() {
            if let Some(a) = item.atomize()? {
                out.push(a);
            }
        }
        Ok(out)
    }

    /// Returns the only item, `None` for the empty sequence, or `XPTY0004` for more than one.
    pub fn zero_or_one(&self) -> Result<Option<&Item>, Error> {
        match self.len() {
            0 => Ok(None),
            1 => Ok(self.first()),
            n => Err(Error::from_code(
                ErrorCode::XPTY0004,
                format!("expected at most one item, got {n}"),
            )),
        }
    }

    pub fn nodes(&self) -> impl Iterator<Item = &NodeItem> {
        self.iter().filter_map(Item::as_node)
    }

    /// Effective boolean value (XPath 3.1 §2.4.3).
    pub fn effective_boolean_value(&self) -> Result<bool, Error> {
        match self.items() {
            [] => Ok(false),
            [Item::Node(_), ..] => Ok(true),
            [Item::Atomic(a)] => a.effective_boolean_value(),
            _ => Err(Error::from_code(
                ErrorCode::FORG0006,
                "effective boolean value of a sequence of more than one atomic item",
            )),
        }
    }
}

impl Default for Sequence {
    fn default() -> Self {
        Sequence::empty()
    }
}

impl Deref for Sequence {
    type Target = [Item];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<Vec<Item>> for Sequence {
    fn from(v: Vec<Item>) -> Self {
        Sequence::new(v)
    }
}

impl FromIterator<Item> for Sequence {
    fn from_iter<I: IntoIterator<Item = Item>>(iter: I) -> Self {
        Sequence::new(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a Sequence {
    type Item = &'a Item;
    type IntoIter = std::slice::Iter<'a, Item>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl fmt::Debug for Sequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.0.iter()).finish()
    }
}
