use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;

use itertools::Itertools;

use super::{
    CardinalityConstraint, Constraint, ConstraintKind, IndexConstraint, IndexHasKeyConstraint, Level,
    UniqueConstraint, ValueConstraintSet, compute_key,
};
use crate::engine::runtime::{DynamicContext, Error};
use crate::model::{NodeItem, NodeKind};
use crate::xdm::Item;

/// How a validation run treats evaluation failures and which levels it reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidationConfig {
    abort_on_error: bool,
    min_level: Level,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            abort_on_error: true,
            min_level: Level::Debug,
        }
    }
}

impl ValidationConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// When disabled, an error evaluating a constraint is recorded in the report
    /// and validation continues with the next constraint.
    pub fn abort_on_error(mut self, abort: bool) -> Self {
        self.abort_on_error = abort;
        self
    }

    /// Constraints below `level` are skipped.
    pub fn min_level(mut self, level: Level) -> Self {
        self.min_level = level;
        self
    }
}

/// One constraint violation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Finding {
    pub constraint_id: Option<String>,
    pub kind: ConstraintKind,
    pub level: Level,
    /// Location of the offending node.
    pub path: String,
    pub message: String,
}

#[derive(Debug, Default)]
pub struct ValidationReport {
    pub findings: Vec<Finding>,
    /// Evaluation failures recorded instead of aborting.
    pub errors: Vec<Error>,
}

impl ValidationReport {
    /// No evaluation errors and no finding at `Level::Error` or above.
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty() && self.findings.iter().all(|f| f.level < Level::Error)
    }

    pub fn highest_level(&self) -> Option<Level> {
        self.findings.iter().map(|f| f.level).max()
    }

    pub fn findings_of(&self, kind: ConstraintKind) -> impl Iterator<Item = &Finding> {
        self.findings.iter().filter(move |f| f.kind == kind)
    }
}

type Key = Vec<Option<String>>;

struct PendingKeyRef {
    constraint: Arc<IndexHasKeyConstraint>,
    item: Item,
    key: Key,
}

/// Applies the constraints attached to each node's definition.
#[derive(Debug, Clone, Default)]
pub struct ConstraintValidator {
    config: ValidationConfig,
}

struct Run<'a> {
    config: ValidationConfig,
    ctx: &'a DynamicContext,
    report: ValidationReport,
    indexes: HashMap<String, HashMap<Key, String>>,
    pending: Vec<PendingKeyRef>,
}

impl ConstraintValidator {
    pub fn new(config: ValidationConfig) -> Self {
        Self { config }
    }

    /// Validate every node of `document`. Index lookups are checked once all
    /// indexes in the document are built.
    pub fn validate(&self, document: &NodeItem, ctx: &DynamicContext) -> Result<ValidationReport, Error> {
        let mut run = Run {
            config: self.config,
            ctx,
            report: ValidationReport::default(),
            indexes: HashMap::new(),
            pending: Vec::new(),
        };
        for node in document.descendants_or_self() {
            if node.kind() == NodeKind::Document {
                continue;
            }
            run.node(&node)?;
            for flag in node.flags().values() {
                run.node(flag)?;
            }
        }
        run.resolve_pending()?;

        let report = run.report;
        tracing::debug!(
            findings = report.findings.len(),
            errors = report.errors.len(),
            highest = ?report.highest_level(),
            document = %document.path(),
            "validation finished"
        );
        Ok(report)
    }
}

impl Run<'_> {
    fn node(&mut self, node: &NodeItem) -> Result<(), Error> {
        let definition = node.definition();
        self.value_constraints(node, definition.value_constraints())?;
        if let Some(assembly) = definition.assembly_constraints() {
            for c in assembly.index.snapshot() {
                self.guarded(&*c, |run| run.index(node, &c))?;
            }
            for c in assembly.unique.snapshot() {
                self.guarded(&*c, |run| run.unique(node, &c))?;
            }
            for c in assembly.cardinality.snapshot() {
                self.guarded(&*c, |run| run.cardinality(node, &c))?;
            }
        }
        Ok(())
    }

    fn value_constraints(&mut self, node: &NodeItem, set: &ValueConstraintSet) -> Result<(), Error> {
        for c in set.allowed_values.snapshot() {
            self.guarded(&*c, |run| {
                for item in run.targets(node, &*c)? {
                    let Some(value) = item.atomize()? else { continue };
                    let value = value.as_string();
                    if !c.permits(&value) {
                        let allowed = c.values.keys().join(", ");
                        run.report(&*c, &item, format!("value '{value}' is not one of: {allowed}"));
                    }
                }
                Ok(())
            })?;
        }
        for c in set.matches.snapshot() {
            self.guarded(&*c, |run| {
                for item in run.targets(node, &*c)? {
                    let Some(value) = item.atomize()? else { continue };
                    if let Some(message) = c.violation(&value.as_string())? {
                        run.report(&*c, &item, message);
                    }
                }
                Ok(())
            })?;
        }
        for c in set.expect.snapshot() {
            self.guarded(&*c, |run| {
                for item in run.targets(node, &*c)? {
                    if c.test.evaluate_boolean_at(item.clone(), run.ctx)? {
                        continue;
                    }
                    let message = match &c.message {
                        Some(template) => template.render(&item, run.ctx)?,
                        None => format!("expect test '{}' is false", c.test),
                    };
                    run.report(&*c, &item, message);
                }
                Ok(())
            })?;
        }
        for c in set.index_has_key.snapshot() {
            self.guarded(&*c, |run| {
                for item in run.targets(node, &*c)? {
                    let key = compute_key(&c.key_fields, &item, run.ctx)?;
                    run.pending.push(PendingKeyRef {
                        constraint: Arc::clone(&c),
                        item,
                        key,
                    });
                }
                Ok(())
            })?;
        }
        Ok(())
    }

    fn index(&mut self, node: &NodeItem, c: &IndexConstraint) -> Result<(), Error> {
        for item in self.targets(node, c)? {
            let key = compute_key(&c.key_fields, &item, self.ctx)?;
            let duplicate = match self.indexes.entry(c.name.clone()).or_default().entry(key) {
                Entry::Occupied(e) => Some(format!(
                    "index '{}' has duplicate key {} (first at {})",
                    c.name,
                    format_key(e.key()),
                    e.get()
                )),
                Entry::Vacant(e) => {
                    e.insert(item_path(&item));
                    None
                }
            };
            if let Some(message) = duplicate {
                self.report(c, &item, message);
            }
        }
        Ok(())
    }

    fn unique(&mut self, node: &NodeItem, c: &UniqueConstraint) -> Result<(), Error> {
        let mut seen: HashMap<Key, String> = HashMap::new();
        for item in self.targets(node, c)? {
            let key = compute_key(&c.key_fields, &item, self.ctx)?;
            if let Some(first) = seen.get(&key) {
                let message = format!("duplicate key {} (first at {first})", format_key(&key));
                self.report(c, &item, message);
            } else {
                seen.insert(key, item_path(&item));
            }
        }
        Ok(())
    }

    fn cardinality(&mut self, node: &NodeItem, c: &CardinalityConstraint) -> Result<(), Error> {
        let count = self.targets(node, c)?.len();
        if !c.permits(count) {
            let bounds = format!(
                "{}..{}",
                c.min_occurs.unwrap_or(0),
                c.max_occurs.map_or_else(|| "*".to_string(), |m| m.to_string())
            );
            let message = format!("{count} occurrence(s) of '{}', expected {bounds}", c.common.target);
            self.report(c, &Item::Node(node.clone()), message);
        }
        Ok(())
    }

    fn resolve_pending(&mut self) -> Result<(), Error> {
        for pending in std::mem::take(&mut self.pending) {
            let c = &*pending.constraint;
            let found = self
                .indexes
                .get(&c.index_name)
                .is_some_and(|index| index.contains_key(&pending.key));
            if found {
                continue;
            }
            let message = match &c.message {
                Some(template) => match template.render(&pending.item, self.ctx) {
                    Ok(m) => m,
                    Err(e) => {
                        self.failed(c, e)?;
                        continue;
                    }
                },
                None => format!(
                    "key {} not found in index '{}'",
                    format_key(&pending.key),
                    c.index_name
                ),
            };
            self.report(c, &pending.item, message);
        }
        Ok(())
    }

    fn targets(&self, node: &NodeItem, c: &dyn Constraint) -> Result<Vec<Item>, Error> {
        Ok(c.target().evaluate_at(node.clone(), self.ctx)?.to_vec())
    }

    /// Run `check` unless the constraint is below the reporting level, routing
    /// its failure through the abort policy.
    fn guarded<C, F>(&mut self, c: &C, check: F) -> Result<(), Error>
    where
        C: Constraint + ?Sized,
        F: FnOnce(&mut Self) -> Result<(), Error>,
    {
        if c.level() < self.config.min_level {
            return Ok(());
        }
        match check(self) {
            Ok(()) => Ok(()),
            Err(e) => self.failed(c, e),
        }
    }

    fn failed<C: Constraint + ?Sized>(&mut self, c: &C, e: Error) -> Result<(), Error> {
        if self.config.abort_on_error {
            return Err(e);
        }
        tracing::warn!(
            constraint = c.id().unwrap_or("<anonymous>"),
            kind = %c.kind(),
            error = %e,
            "constraint evaluation failed"
        );
        self.report.errors.push(e);
        Ok(())
    }

    fn report<C: Constraint + ?Sized>(&mut self, c: &C, item: &Item, message: String) {
        let finding = Finding {
            constraint_id: c.id().map(str::to_string),
            kind: c.kind(),
            level: c.level(),
            path: item_path(item),
            message,
        };
        tracing::debug!(
            constraint = finding.constraint_id.as_deref().unwrap_or("<anonymous>"),
            kind = %finding.kind,
            level = %finding.level,
            path = %finding.path,
            message = %finding.message,
            "constraint violated"
        );
        self.report.findings.push(finding);
    }
}

fn item_path(item: &Item) -> String {
    match item {
        Item::Node(n) => n.path(),
        Item::Atomic(a) => a.as_string(),
    }
}

fn format_key(key: &Key) -> String {
    format!(
        "({})",
        key.iter().map(|k| k.as_deref().unwrap_or("()")).join(", ")
    )
}
