use std::sync::Arc;

use itertools::Itertools;

use super::{
    AllowedValuesConstraint, CardinalityConstraint, ConstraintKind, ExpectConstraint, IndexConstraint,
    IndexHasKeyConstraint, MatchesConstraint, UniqueConstraint,
};
use crate::ast::MetapathExpression;
use crate::engine::runtime::{DynamicContext, Error, ErrorCode};
use crate::model::NodeItem;
use crate::schema::{Definition, DefinitionKind, Module};

/// A group of constraints declared outside a definition, applied to every
/// definition its target selects.
#[derive(Debug, Clone)]
pub struct TargetedConstraints {
    target: MetapathExpression,
    kind: Option<DefinitionKind>,
    allowed_values: Vec<Arc<AllowedValuesConstraint>>,
    matches: Vec<Arc<MatchesConstraint>>,
    expect: Vec<Arc<ExpectConstraint>>,
    index_has_key: Vec<Arc<IndexHasKeyConstraint>>,
    index: Vec<Arc<IndexConstraint>>,
    unique: Vec<Arc<UniqueConstraint>>,
    cardinality: Vec<Arc<CardinalityConstraint>>,
}

impl TargetedConstraints {
    pub fn new(target: MetapathExpression) -> Self {
        Self {
            target,
            kind: None,
            allowed_values: Vec::new(),
            matches: Vec::new(),
            expect: Vec::new(),
            index_has_key: Vec::new(),
            index: Vec::new(),
            unique: Vec::new(),
            cardinality: Vec::new(),
        }
    }

    /// Restrict the group to one definition kind.
    pub fn for_kind(mut self, kind: DefinitionKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn allowed_values(mut self, c: AllowedValuesConstraint) -> Self {
        self.allowed_values.push(Arc::new(c));
        self
    }

    pub fn matches(mut self, c: MatchesConstraint) -> Self {
        self.matches.push(Arc::new(c));
        self
    }

    pub fn expect(mut self, c: ExpectConstraint) -> Self {
        self.expect.push(Arc::new(c));
        self
    }

    pub fn index_has_key(mut self, c: IndexHasKeyConstraint) -> Self {
        self.index_has_key.push(Arc::new(c));
        self
    }

    pub fn index(mut self, c: IndexConstraint) -> Self {
        self.index.push(Arc::new(c));
        self
    }

    pub fn unique(mut self, c: UniqueConstraint) -> Self {
        self.unique.push(Arc::new(c));
        self
    }

    pub fn cardinality(mut self, c: CardinalityConstraint) -> Self {
        self.cardinality.push(Arc::new(c));
        self
    }

    pub fn target_expression(&self) -> &MetapathExpression {
        &self.target
    }

    /// Kinds present in this group, each listed once.
    pub fn kinds(&self) -> Vec<ConstraintKind> {
        [
            (ConstraintKind::AllowedValues, self.allowed_values.len()),
            (ConstraintKind::Matches, self.matches.len()),
            (ConstraintKind::Expect, self.expect.len()),
            (ConstraintKind::IndexHasKey, self.index_has_key.len()),
            (ConstraintKind::Index, self.index.len()),
            (ConstraintKind::Unique, self.unique.len()),
            (ConstraintKind::Cardinality, self.cardinality.len()),
        ]
        .into_iter()
        .filter(|&(_, n)| n > 0)
        .map(|(k, _)| k)
        .collect()
    }

    /// Attach every constraint of the group to `definition`.
    ///
    /// Fails with `MPST0001` when the definition kind cannot carry the group: a
    /// kind other than the one the group is restricted to, or a flag or field
    /// receiving assembly-only constraints. Nothing is attached on failure.
    pub fn target(&self, definition: &Definition) -> Result<(), Error> {
        if let Some(kind) = self.kind
            && kind != definition.kind()
        {
            return Err(self.unsupported(definition, &format!("{kind} constraints")));
        }
        let Some(assembly) = definition.assembly_constraints() else {
            let assembly_only = self
                .kinds()
                .into_iter()
                .filter(|k| k.is_assembly_only())
                .join(", ");
            if !assembly_only.is_empty() {
                return Err(self.unsupported(definition, &format!("{assembly_only} constraints")));
            }
            self.attach_values(definition);
            return Ok(());
        };
        self.attach_values(definition);
        for c in &self.index {
            assembly.index.add(c);
        }
        for c in &self.unique {
            assembly.unique.add(c);
        }
        for c in &self.cardinality {
            assembly.cardinality.add(c);
        }
        Ok(())
    }

    fn attach_values(&self, definition: &Definition) {
        let set = definition.value_constraints();
        for c in &self.allowed_values {
            set.allowed_values.add(c);
        }
        for c in &self.matches {
            set.matches.add(c);
        }
        for c in &self.expect {
            set.expect.add(c);
        }
        for c in &self.index_has_key {
            set.index_has_key.add(c);
        }
    }

    fn unsupported(&self, definition: &Definition, what: &str) -> Error {
        Error::from_code(
            ErrorCode::MPST0001,
            format!(
                "{what} targeted by '{}' cannot apply to {definition} in module '{}'",
                self.target,
                definition.module()
            ),
        )
    }
}

/// Applies targeted constraint groups to the definitions of a module.
///
/// Each group's target is evaluated against a definition-mode tree of every
/// root assembly, so targets are written as paths from the document node.
pub struct ConstraintComposingVisitor<'a> {
    ctx: &'a DynamicContext,
}

impl<'a> ConstraintComposingVisitor<'a> {
    pub fn new(ctx: &'a DynamicContext) -> Self {
        Self { ctx }
    }

    /// Returns the number of definitions constraints were attached to.
    pub fn compose(&self, module: &Module, groups: &[TargetedConstraints]) -> Result<usize, Error> {
        let mut attached = 0;
        for root in &module.roots {
            let document = NodeItem::definition_document(root);
            for group in groups {
                let selected = group.target.evaluate_at(document.clone(), self.ctx)?;
                let mut visited: Vec<Definition> = Vec::new();
                for node in selected.nodes() {
                    let definition = node.definition();
                    if visited.iter().any(|d| d.ptr_eq(&definition)) {
                        continue;
                    }
                    group.target(&definition)?;
                    tracing::debug!(
                        target_expr = %group.target,
                        definition = %definition,
                        module = %module.info,
                        kinds = %group.kinds().iter().join(","),
                        "attached constraints"
                    );
                    visited.push(definition);
                    attached += 1;
                }
            }
        }
        Ok(attached)
    }
}
