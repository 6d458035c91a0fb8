//! Sequence types and XPath function-conversion of argument sequences.

use core::fmt;

use super::function::FunctionBuildError;
use super::runtime::{Error, ErrorCode};
use crate::model::NodeKind;
use crate::xdm::{AtomicType, AtomicValue, Item, Sequence};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Occurrence {
    Zero,
    ZeroOrOne,
    One,
    OneOrMore,
    ZeroOrMore,
}

impl Occurrence {
    pub fn min(self) -> usize {
        match self {
            Occurrence::One | Occurrence::OneOrMore => 1,
            _ => 0,
        }
    }

    pub fn max(self) -> Option<usize> {
        match self {
            Occurrence::Zero => Some(0),
            Occurrence::ZeroOrOne | Occurrence::One => Some(1),
            Occurrence::OneOrMore | Occurrence::ZeroOrMore => None,
        }
    }

    pub fn accepts(self, count: usize) -> bool {
        count >= self.min() && self.max().is_none_or(|m| count <= m)
    }

    pub fn indicator(self) -> &'static str {
        match self {
            Occurrence::ZeroOrOne => "?",
            Occurrence::OneOrMore => "+",
            Occurrence::ZeroOrMore => "*",
            Occurrence::Zero | Occurrence::One => "",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ItemType {
    AnyItem,
    AnyNode,
    Node(NodeKind),
    Atomic(AtomicType),
}

impl ItemType {
    pub fn matches(self, item: &Item) -> bool {
        match (self, item) {
            (ItemType::AnyItem, _) => true,
            (ItemType::AnyNode, Item::Node(_)) => true,
            (ItemType::Node(kind), Item::Node(n)) => n.kind() == kind,
            (ItemType::Atomic(t), Item::Atomic(a)) => a.is_instance_of(t),
            _ => false,
        }
    }

    fn requires_atomic(self) -> bool {
        matches!(self, ItemType::Atomic(_))
    }
}

impl fmt::Display for ItemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ItemType::AnyItem => f.write_str("item()"),
            ItemType::AnyNode => f.write_str("node()"),
            ItemType::Node(kind) => write!(f, "{}()", kind.type_name()),
            ItemType::Atomic(t) => f.write_str(t.name()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SequenceType {
    pub item: ItemType,
    pub occurrence: Occurrence,
}

impl SequenceType {
    pub const EMPTY: SequenceType = SequenceType {
        item: ItemType::AnyItem,
        occurrence: Occurrence::Zero,
    };

    pub fn new(item: ItemType, occurrence: Occurrence) -> Self {
        Self { item, occurrence }
    }

    pub fn atomic(t: AtomicType, occurrence: Occurrence) -> Self {
        Self::new(ItemType::Atomic(t), occurrence)
    }

    /// Whether `seq` is an instance of this type, without any conversion.
    pub fn matches(&self, seq: &Sequence) -> bool {
        self.occurrence.accepts(seq.len()) && seq.iter().all(|i| self.item.matches(i))
    }

    /// Apply function-conversion rules to `seq`.
    ///
    /// Cardinality is checked first, then nodes are atomized when an atomic type is
    /// required, `uri`/`uri-reference` values are promoted to `string` when a string
    /// is required, and finally every item must be an instance of the item type.
    pub fn convert(&self, seq: &Sequence) -> Result<Sequence, Error> {
        self.check_cardinality(seq.len())?;
        let converted = if self.item.requires_atomic() {
            let atomized = seq.atomize()?;
            self.check_cardinality(atomized.len())?;
            let promote = self.item == ItemType::Atomic(AtomicType::String);
            atomized
                .into_iter()
                .map(|a| match a {
                    AtomicValue::AnyUri(s) | AtomicValue::UriReference(s) if promote => {
                        Item::Atomic(AtomicValue::String(s))
                    }
                    other => Item::Atomic(other),
                })
                .collect::<Sequence>()
        } else {
            seq.clone()
        };
        if let Some(bad) = converted.iter().find(|i| !self.item.matches(i)) {
            return Err(Error::from_code(
                ErrorCode::XPTY0004,
                format!("expected {self}, found item of type {}", bad.type_name()),
            ));
        }
        Ok(converted)
    }

    fn check_cardinality(&self, count: usize) -> Result<(), Error> {
        if self.occurrence.accepts(count) {
            return Ok(());
        }
        Err(Error::from_code(
            ErrorCode::XPTY0004,
            format!("expected {self}, found a sequence of {count} item(s)"),
        ))
    }
}

impl fmt::Display for SequenceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.occurrence == Occurrence::Zero {
            return f.write_str("empty-sequence()");
        }
        write!(f, "{}{}", self.item, self.occurrence.indicator())
    }
}

/// A declared function parameter.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Argument {
    pub name: String,
    pub sequence_type: SequenceType,
}

impl Argument {
    pub fn builder() -> ArgumentBuilder {
        ArgumentBuilder::default()
    }

    pub fn new(name: impl Into<String>, item: ItemType, occurrence: Occurrence) -> Self {
        Self {
            name: name.into(),
            sequence_type: SequenceType::new(item, occurrence),
        }
    }

    /// Convert an actual argument, naming this parameter on failure.
    pub fn convert(&self, seq: &Sequence) -> Result<Sequence, Error> {
        self.sequence_type.convert(seq).map_err(|mut e| {
            e.message = format!("argument ${}: {}", self.name, e.message);
            e
        })
    }
}

impl fmt::Display for Argument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "${} as {}", self.name, self.sequence_type)
    }
}

#[derive(Debug, Default)]
pub struct ArgumentBuilder {
    name: Option<String>,
    item: Option<ItemType>,
    occurrence: Option<Occurrence>,
}

impl ArgumentBuilder {
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn item_type(mut self, item: ItemType) -> Self {
        self.item = Some(item);
        self
    }

    pub fn atomic(self, t: AtomicType) -> Self {
        self.item_type(ItemType::Atomic(t))
    }

    pub fn occurrence(mut self, occurrence: Occurrence) -> Self {
        self.occurrence = Some(occurrence);
        self
    }

    /// The item type defaults to `item()`; name and occurrence are required.
    pub fn build(self) -> Result<Argument, FunctionBuildError> {
        let name = self.name.ok_or(FunctionBuildError::MissingName)?;
        let occurrence = self
            .occurrence
            .ok_or_else(|| FunctionBuildError::MissingOccurrence {
                argument: name.clone(),
            })?;
        Ok(Argument {
            name,
            sequence_type: SequenceType::new(self.item.unwrap_or(ItemType::AnyItem), occurrence),
        })
    }
}
