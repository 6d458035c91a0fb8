//! Declarative constraints over document trees.
//!
//! A constraint pairs a target expression with a kind-specific rule. Constraints
//! are built by a schema loader, attached to definitions through
//! [`TargetedConstraints`] and [`ConstraintComposingVisitor`], and applied to
//! instance documents by [`ConstraintValidator`].
//!
//! Constraint sets are shared between loader threads while a schema is being
//! composed, so attachment goes through a lock. Reads take a snapshot of the list.

mod message;
mod targeted;
mod validator;

pub use message::{MessageTemplate, MetapathCompiler};
pub use targeted::{ConstraintComposingVisitor, TargetedConstraints};
pub use validator::{ConstraintValidator, Finding, ValidationConfig, ValidationReport};

use core::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use indexmap::IndexMap;

use crate::ast::MetapathExpression;
use crate::engine::functions::build_regex;
use crate::engine::runtime::{DynamicContext, Error};
use crate::xdm::{AtomicType, Item};

/// Severity of a constraint violation, in ascending order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum Level {
    Debug,
    Informational,
    Warning,
    #[default]
    Error,
    Critical,
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Level::Debug => "DEBUG",
            Level::Informational => "INFORMATIONAL",
            Level::Warning => "WARNING",
            Level::Error => "ERROR",
            Level::Critical => "CRITICAL",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConstraintKind {
    AllowedValues,
    Matches,
    Expect,
    IndexHasKey,
    Index,
    Unique,
    Cardinality,
}

impl ConstraintKind {
    /// Index, unique and cardinality constraints only make sense on assemblies.
    pub fn is_assembly_only(self) -> bool {
        matches!(
            self,
            ConstraintKind::Index | ConstraintKind::Unique | ConstraintKind::Cardinality
        )
    }

    pub fn name(self) -> &'static str {
        match self {
            ConstraintKind::AllowedValues => "allowed-values",
            ConstraintKind::Matches => "matches",
            ConstraintKind::Expect => "expect",
            ConstraintKind::IndexHasKey => "index-has-key",
            ConstraintKind::Index => "index",
            ConstraintKind::Unique => "unique",
            ConstraintKind::Cardinality => "has-cardinality",
        }
    }
}

impl fmt::Display for ConstraintKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Properties shared by every constraint kind.
#[derive(Debug, Clone)]
pub struct ConstraintCommon {
    pub id: Option<String>,
    pub formal_name: Option<String>,
    pub description: Option<String>,
    pub remarks: Option<String>,
    pub level: Level,
    /// Selects the locations the rule applies to, relative to the defining node.
    pub target: MetapathExpression,
    pub properties: IndexMap<String, String>,
}

impl ConstraintCommon {
    pub fn new(target: MetapathExpression) -> Self {
        Self {
            id: None,
            formal_name: None,
            description: None,
            remarks: None,
            level: Level::default(),
            target,
            properties: IndexMap::new(),
        }
    }

    /// Targets the defining node itself.
    pub fn at_context() -> Self {
        Self::new(MetapathExpression::context_item())
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_formal_name(mut self, name: impl Into<String>) -> Self {
        self.formal_name = Some(name.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_remarks(mut self, remarks: impl Into<String>) -> Self {
        self.remarks = Some(remarks.into());
        self
    }

    pub fn with_level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }
}

pub trait Constraint: fmt::Debug + Send + Sync {
    fn common(&self) -> &ConstraintCommon;

    fn kind(&self) -> ConstraintKind;

    fn id(&self) -> Option<&str> {
        self.common().id.as_deref()
    }

    fn level(&self) -> Level {
        self.common().level
    }

    fn target(&self) -> &MetapathExpression {
        &self.common().target
    }
}

macro_rules! impl_constraint {
    ($ty:ty, $kind:ident) => {
        impl Constraint for $ty {
            fn common(&self) -> &ConstraintCommon {
                &self.common
            }

            fn kind(&self) -> ConstraintKind {
                ConstraintKind::$kind
            }
        }
    };
}

/// Restricts a value to an enumerated set.
#[derive(Debug, Clone)]
pub struct AllowedValuesConstraint {
    pub common: ConstraintCommon,
    /// Allowed value to its description.
    pub values: IndexMap<String, String>,
    /// When set, values outside the set are accepted.
    pub allow_others: bool,
}

impl AllowedValuesConstraint {
    pub fn new<I, V, D>(common: ConstraintCommon, values: I) -> Self
    where
        I: IntoIterator<Item = (V, D)>,
        V: Into<String>,
        D: Into<String>,
    {
        Self {
            common,
            values: values.into_iter().map(|(v, d)| (v.into(), d.into())).collect(),
            allow_others: false,
        }
    }

    pub fn allow_others(mut self, allow: bool) -> Self {
        self.allow_others = allow;
        self
    }

    pub fn permits(&self, value: &str) -> bool {
        self.allow_others || self.values.contains_key(value)
    }
}

impl_constraint!(AllowedValuesConstraint, AllowedValues);

/// Checks a value against a regular expression and/or a datatype. The pattern
/// must match the whole value.
#[derive(Debug, Clone)]
pub struct MatchesConstraint {
    pub common: ConstraintCommon,
    pattern: Option<(String, fancy_regex::Regex)>,
    pub datatype: Option<AtomicType>,
}

impl MatchesConstraint {
    pub fn new(
        common: ConstraintCommon,
        pattern: Option<&str>,
        datatype: Option<AtomicType>,
    ) -> Result<Self, Error> {
        let pattern = pattern
            .map(|p| build_regex(&format!("^(?:{p})$"), "").map(|re| (p.to_string(), re)))
            .transpose()?;
        Ok(Self {
            common,
            pattern,
            datatype,
        })
    }

    pub fn pattern(&self) -> Option<&str> {
        self.pattern.as_ref().map(|(p, _)| p.as_str())
    }

    /// Describes why `value` fails, or `None` when it passes.
    pub fn violation(&self, value: &str) -> Result<Option<String>, Error> {
        if let Some((source, re)) = &self.pattern
            && !re.is_match(value)?
        {
            return Ok(Some(format!(
                "value '{value}' does not match the pattern '{source}'"
            )));
        }
        if let Some(datatype) = self.datatype
            && datatype.value_of(value).is_err()
        {
            return Ok(Some(format!(
                "value '{value}' is not a valid {}",
                datatype.qualified_name()
            )));
        }
        Ok(None)
    }
}

impl_constraint!(MatchesConstraint, Matches);

/// A boolean assertion evaluated at each target.
#[derive(Debug, Clone)]
pub struct ExpectConstraint {
    pub common: ConstraintCommon,
    pub test: MetapathExpression,
    pub message: Option<MessageTemplate>,
}

impl ExpectConstraint {
    pub fn new(common: ConstraintCommon, test: MetapathExpression) -> Self {
        Self {
            common,
            test,
            message: None,
        }
    }

    pub fn with_message(mut self, message: MessageTemplate) -> Self {
        self.message = Some(message);
        self
    }
}

impl_constraint!(ExpectConstraint, Expect);

/// One component of an index or uniqueness key.
#[derive(Debug, Clone)]
pub struct KeyField {
    pub target: MetapathExpression,
    pattern: Option<fancy_regex::Regex>,
    pub remarks: Option<String>,
}

impl KeyField {
    pub fn new(target: MetapathExpression) -> Self {
        Self {
            target,
            pattern: None,
            remarks: None,
        }
    }

    /// Restrict the key to the part of the value matched by `pattern`, or its
    /// first capture group when it has one.
    pub fn with_pattern(mut self, pattern: &str) -> Result<Self, Error> {
        self.pattern = Some(build_regex(pattern, "")?);
        Ok(self)
    }

    pub fn with_remarks(mut self, remarks: impl Into<String>) -> Self {
        self.remarks = Some(remarks.into());
        self
    }

    /// Key value at `item`: the first atomized value of the target, if any.
    pub fn key_value(&self, item: &Item, ctx: &DynamicContext) -> Result<Option<String>, Error> {
        let values = self.target.evaluate_at(item.clone(), ctx)?.atomize()?;
        let Some(value) = values.first().map(|v| v.as_string()) else {
            return Ok(None);
        };
        let Some(re) = &self.pattern else {
            return Ok(Some(value));
        };
        let extracted = re.captures(&value)?.and_then(|caps| {
            caps.get(1)
                .or_else(|| caps.get(0))
                .map(|m| m.as_str().to_string())
        });
        Ok(Some(extracted.unwrap_or(value)))
    }
}

/// The composite key of `item` over `fields`.
pub(crate) fn compute_key(
    fields: &[KeyField],
    item: &Item,
    ctx: &DynamicContext,
) -> Result<Vec<Option<String>>, Error> {
    fields.iter().map(|f| f.key_value(item, ctx)).collect()
}

/// Requires the key of each target to exist in a named index.
#[derive(Debug, Clone)]
pub struct IndexHasKeyConstraint {
    pub common: ConstraintCommon,
    pub index_name: String,
    pub key_fields: Vec<KeyField>,
    pub message: Option<MessageTemplate>,
}

impl IndexHasKeyConstraint {
    pub fn new(common: ConstraintCommon, index_name: impl Into<String>, key_fields: Vec<KeyField>) -> Self {
        Self {
            common,
            index_name: index_name.into(),
            key_fields,
            message: None,
        }
    }

    pub fn with_message(mut self, message: MessageTemplate) -> Self {
        self.message = Some(message);
        self
    }
}

impl_constraint!(IndexHasKeyConstraint, IndexHasKey);

/// Builds a named index over the targets; keys must be unique.
#[derive(Debug, Clone)]
pub struct IndexConstraint {
    pub common: ConstraintCommon,
    pub name: String,
    pub key_fields: Vec<KeyField>,
}

impl IndexConstraint {
    pub fn new(common: ConstraintCommon, name: impl Into<String>, key_fields: Vec<KeyField>) -> Self {
        Self {
            common,
            name: name.into(),
            key_fields,
        }
    }
}

impl_constraint!(IndexConstraint, Index);

/// Keys of the targets must be unique within one defining node.
#[derive(Debug, Clone)]
pub struct UniqueConstraint {
    pub common: ConstraintCommon,
    pub key_fields: Vec<KeyField>,
}

impl UniqueConstraint {
    pub fn new(common: ConstraintCommon, key_fields: Vec<KeyField>) -> Self {
        Self { common, key_fields }
    }
}

impl_constraint!(UniqueConstraint, Unique);

/// Bounds the number of targets.
#[derive(Debug, Clone)]
pub struct CardinalityConstraint {
    pub common: ConstraintCommon,
    pub min_occurs: Option<usize>,
    pub max_occurs: Option<usize>,
}

impl CardinalityConstraint {
    pub fn new(common: ConstraintCommon, min_occurs: Option<usize>, max_occurs: Option<usize>) -> Self {
        Self {
            common,
            min_occurs,
            max_occurs,
        }
    }

    pub fn permits(&self, count: usize) -> bool {
        self.min_occurs.is_none_or(|min| count >= min) && self.max_occurs.is_none_or(|max| count <= max)
    }
}

impl_constraint!(CardinalityConstraint, Cardinality);

/// Lock-protected list of shared constraints. Adding the same constraint twice
/// keeps one entry.
pub struct ConstraintList<T> {
    items: RwLock<Vec<Arc<T>>>,
}

impl<T> Default for ConstraintList<T> {
    fn default() -> Self {
        Self {
            items: RwLock::new(Vec::new()),
        }
    }
}

impl<T> ConstraintList<T> {
    /// Returns `false` when the constraint was already present.
    pub fn add(&self, constraint: &Arc<T>) -> bool {
        let mut items = self.items.write().unwrap_or_else(PoisonError::into_inner);
        if items.iter().any(|c| Arc::ptr_eq(c, constraint)) {
            return false;
        }
        items.push(Arc::clone(constraint));
        true
    }

    pub fn snapshot(&self) -> Vec<Arc<T>> {
        self.items.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn len(&self) -> usize {
        self.items.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T: fmt::Debug> fmt::Debug for ConstraintList<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.snapshot()).finish()
    }
}

/// Constraints every definition kind can carry.
#[derive(Debug, Default)]
pub struct ValueConstraintSet {
    pub allowed_values: ConstraintList<AllowedValuesConstraint>,
    pub matches: ConstraintList<MatchesConstraint>,
    pub expect: ConstraintList<ExpectConstraint>,
    pub index_has_key: ConstraintList<IndexHasKeyConstraint>,
}

impl ValueConstraintSet {
    pub fn len(&self) -> usize {
        self.allowed_values.len() + self.matches.len() + self.expect.len() + self.index_has_key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Constraints of an assembly definition.
#[derive(Debug, Default)]
pub struct AssemblyConstraintSet {
    pub values: ValueConstraintSet,
    pub index: ConstraintList<IndexConstraint>,
    pub unique: ConstraintList<UniqueConstraint>,
    pub cardinality: ConstraintList<CardinalityConstraint>,
}

impl AssemblyConstraintSet {
    pub fn len(&self) -> usize {
        self.values.len() + self.index.len() + self.unique.len() + self.cardinality.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
