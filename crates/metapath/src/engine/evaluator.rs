//! Tree-walking evaluation of [`Expr`] against a focus.

use core::cmp::Ordering;
use std::collections::HashSet;

use super::registry::ResolveError;
use super::runtime::{DynamicContext, Error, ErrorCode, Focus};
use crate::ast::{Axis, ComparisonOp, Expr, Quantifier};
use crate::model::{NodeItem, NodeKind};
use crate::xdm::{AtomicType, AtomicValue, ExpandedName, Item, Sequence};

/// Evaluate `expr` with `focus` as the initial context.
pub fn evaluate(expr: &Expr, ctx: &DynamicContext, focus: Option<&Focus>) -> Result<Sequence, Error> {
    Evaluator {
        ctx,
        locals: Vec::new(),
    }
    .eval(expr, focus)
}

struct Evaluator<'a> {
    ctx: &'a DynamicContext,
    /// In-scope range variables, innermost last.
    locals: Vec<(ExpandedName, Sequence)>,
}

impl Evaluator<'_> {
    fn eval(&mut self, expr: &Expr, focus: Option<&Focus>) -> Result<Sequence, Error> {
        match expr {
            Expr::ContextItem => Ok(Sequence::singleton(context_item(focus)?.clone())),
            Expr::Root => {
                let root = context_node(focus)?.root();
                if root.kind() != NodeKind::Document {
                    return Err(Error::from_code(
                        ErrorCode::XPDY0050,
                        format!("root of '{}' is not a document node", root.path()),
                    ));
                }
                Ok(Sequence::singleton(root))
            }
            Expr::Parent => Ok(context_node(focus)?
                .parent()
                .map(Sequence::singleton)
                .unwrap_or_default()),
            Expr::Step { axis, test } => {
                let node = context_node(focus)?;
                let items = match axis {
                    Axis::Model => node.matching_model_items(test),
                    Axis::Flag => node.matching_flags(test),
                };
                Ok(items.into_iter().map(Item::Node).collect())
            }
            Expr::Path {
                base,
                step,
                descendant,
            } => self.eval_path(base, step, *descendant, focus),
            Expr::Filter { base, predicates } => {
                let mut seq = self.eval(base, focus)?;
                for predicate in predicates {
                    seq = self.apply_predicate(&seq, predicate)?;
                }
                Ok(seq)
            }
            Expr::Literal(v) => Ok(Sequence::atomic(v.clone())),
            Expr::Sequence(parts) => {
                let mut out = Vec::new();
                for part in parts {
                    out.extend(self.eval(part, focus)?.iter().cloned());
                }
                Ok(Sequence::new(out))
            }
            Expr::Range(from, to) => {
                let (Some(from), Some(to)) = (
                    self.eval_integer(from, focus)?,
                    self.eval_integer(to, focus)?,
                ) else {
                    return Ok(Sequence::empty());
                };
                Ok((from..=to).map(|i| Item::Atomic(AtomicValue::Integer(i))).collect())
            }
            Expr::Variable(name) => self.variable(name),
            Expr::FunctionCall { name, args } => self.call(name, args, focus),
            Expr::And(l, r) => {
                let b = self.eval_ebv(l, focus)? && self.eval_ebv(r, focus)?;
                Ok(Sequence::boolean(b))
            }
            Expr::Or(l, r) => {
                let b = self.eval_ebv(l, focus)? || self.eval_ebv(r, focus)?;
                Ok(Sequence::boolean(b))
            }
            Expr::ValueComparison { op, left, right } => {
                let l = self.eval_atomic_opt(left, focus)?;
                let r = self.eval_atomic_opt(right, focus)?;
                match (l, r) {
                    (Some(l), Some(r)) => Ok(Sequence::boolean(compare_values(*op, &l, &r)?)),
                    _ => Ok(Sequence::empty()),
                }
            }
            Expr::GeneralComparison { op, left, right } => {
                let l = self.eval(left, focus)?.atomize()?;
                let r = self.eval(right, focus)?.atomize()?;
                for a in &l {
                    for b in &r {
                        if compare_values(*op, a, b)? {
                            return Ok(Sequence::boolean(true));
                        }
                    }
                }
                Ok(Sequence::boolean(false))
            }
            Expr::Arithmetic { op, left, right } => {
                let l = self.eval_atomic_opt(left, focus)?;
                let r = self.eval_atomic_opt(right, focus)?;
                match (l, r) {
                    (Some(l), Some(r)) => Ok(Sequence::atomic(l.arithmetic(*op, &r)?)),
                    _ => Ok(Sequence::empty()),
                }
            }
            Expr::Negate(operand) => match self.eval_atomic_opt(operand, focus)? {
                Some(v) => Ok(Sequence::atomic(v.negate()?)),
                None => Ok(Sequence::empty()),
            },
            Expr::StringConcat(parts) => {
                let mut out = String::new();
                for part in parts {
                    if let Some(v) = self.eval_atomic_opt(part, focus)? {
                        out.push_str(&v.as_string());
                    }
                }
                Ok(Sequence::atomic(AtomicValue::String(out)))
            }
            Expr::Union(l, r) => {
                let mut nodes = Vec::new();
                for part in [l, r] {
                    for item in self.eval(part, focus)?.iter() {
                        match item {
                            Item::Node(n) => nodes.push(n.clone()),
                            Item::Atomic(_) => {
                                return Err(Error::from_code(
                                    ErrorCode::XPTY0004,
                                    "union operands must be nodes",
                                ));
                            }
                        }
                    }
                }
                let mut nodes = dedup_nodes(nodes);
                nodes.sort_by_cached_key(NodeItem::document_order_key);
                Ok(nodes.into_iter().map(Item::Node).collect())
            }
            Expr::If {
                condition,
                then,
                otherwise,
            } => {
                if self.eval_ebv(condition, focus)? {
                    self.eval(then, focus)
                } else {
                    self.eval(otherwise, focus)
                }
            }
            Expr::Quantified {
                quantifier,
                bindings,
                satisfies,
            } => {
                let b = self.quantify(*quantifier, bindings, satisfies, focus)?;
                Ok(Sequence::boolean(b))
            }
        }
    }

    fn eval_path(
        &mut self,
        base: &Expr,
        step: &Expr,
        descendant: bool,
        focus: Option<&Focus>,
    ) -> Result<Sequence, Error> {
        let base = self.eval(base, focus)?;
        let mut out: Vec<Item> = Vec::new();
        let size = base.len();
        for (i, item) in base.iter().enumerate() {
            let Item::Node(node) = item else {
                return Err(Error::from_code(
                    ErrorCode::XPTY0019,
                    format!("path step applied to atomic value '{item}'"),
                ));
            };
            if descendant {
                let scope = node.descendants_or_self();
                let scope_size = scope.len();
                for (j, d) in scope.into_iter().enumerate() {
                    let f = Focus::at(Item::Node(d), j + 1, scope_size);
                    out.extend(self.eval(step, Some(&f))?.iter().cloned());
                }
            } else {
                let f = Focus::at(item.clone(), i + 1, size);
                out.extend(self.eval(step, Some(&f))?.iter().cloned());
            }
        }
        let node_count = out.iter().filter(|i| matches!(i, Item::Node(_))).count();
        if node_count == out.len() {
            let nodes = out.into_iter().filter_map(|i| match i {
                Item::Node(n) => Some(n),
                Item::Atomic(_) => None,
            });
            let mut nodes = dedup_nodes(nodes);
            nodes.sort_by_cached_key(NodeItem::document_order_key);
            Ok(nodes.into_iter().map(Item::Node).collect())
        } else if node_count == 0 {
            Ok(Sequence::new(out))
        } else {
            Err(Error::from_code(
                ErrorCode::XPTY0004,
                "path result mixes nodes and atomic values",
            ))
        }
    }

    fn apply_predicate(&mut self, seq: &Sequence, predicate: &Expr) -> Result<Sequence, Error> {
        let size = seq.len();
        let mut out = Vec::new();
        for (i, item) in seq.iter().enumerate() {
            let f = Focus::at(item.clone(), i + 1, size);
            let result = self.eval(predicate, Some(&f))?;
            let keep = match result.items() {
                [Item::Atomic(v)] if v.is_numeric() => v.as_decimal()? == rust_decimal::Decimal::from(i + 1),
                _ => result.effective_boolean_value()?,
            };
            if keep {
                out.push(item.clone());
            }
        }
        Ok(Sequence::new(out))
    }

    fn quantify(
        &mut self,
        quantifier: Quantifier,
        bindings: &[(ExpandedName, Expr)],
        satisfies: &Expr,
        focus: Option<&Focus>,
    ) -> Result<bool, Error> {
        let Some(((name, domain), rest)) = bindings.split_first() else {
            return self.eval_ebv(satisfies, focus);
        };
        let domain = self.eval(domain, focus)?;
        for item in domain.iter() {
            self.locals.push((name.clone(), Sequence::singleton(item.clone())));
            let r = self.quantify(quantifier, rest, satisfies, focus);
            self.locals.pop();
            match (quantifier, r?) {
                (Quantifier::Some, true) => return Ok(true),
                (Quantifier::Every, false) => return Ok(false),
                _ => {}
            }
        }
        Ok(quantifier == Quantifier::Every)
    }

    fn variable(&self, name: &ExpandedName) -> Result<Sequence, Error> {
        if let Some((_, v)) = self.locals.iter().rev().find(|(n, _)| n == name) {
            return Ok(v.clone());
        }
        self.ctx.variable(name).cloned().ok_or_else(|| {
            Error::from_code(ErrorCode::XPST0008, format!("undeclared variable ${name}"))
        })
    }

    fn call(&mut self, name: &ExpandedName, args: &[Expr], focus: Option<&Focus>) -> Result<Sequence, Error> {
        let resolved_name = if name.ns_uri.is_none() {
            ExpandedName::new(
                self.ctx.static_ctx.default_function_namespace.clone(),
                name.local.clone(),
            )
        } else {
            name.clone()
        };
        let function = self
            .ctx
            .functions
            .resolve(&resolved_name, args.len())
            .map_err(|e| match e {
                ResolveError::Unknown(n) => {
                    Error::from_code(ErrorCode::XPST0017, format!("unknown function {n}"))
                }
                ResolveError::WrongArity { name, available } => Error::from_code(
                    ErrorCode::XPST0017,
                    format!(
                        "function {name} does not take {} argument(s); available: {available:?}",
                        args.len()
                    ),
                ),
            })?
            .clone();
        let mut values = Vec::with_capacity(args.len());
        for arg in args {
            values.push(self.eval(arg, focus)?);
        }
        function.execute(&values, self.ctx, focus)
    }

    fn eval_ebv(&mut self, expr: &Expr, focus: Option<&Focus>) -> Result<bool, Error> {
        self.eval(expr, focus)?.effective_boolean_value()
    }

    fn eval_atomic_opt(&mut self, expr: &Expr, focus: Option<&Focus>) -> Result<Option<AtomicValue>, Error> {
        let mut values = self.eval(expr, focus)?.atomize()?;
        match values.len() {
            0 => Ok(None),
            1 => Ok(values.pop()),
            n => Err(Error::from_code(
                ErrorCode::XPTY0004,
                format!("expected a single atomic value, got {n}"),
            )),
        }
    }

    fn eval_integer(&mut self, expr: &Expr, focus: Option<&Focus>) -> Result<Option<i64>, Error> {
        match self.eval_atomic_opt(expr, focus)? {
            Some(v) => Ok(Some(AtomicType::Integer.cast(&v)?.as_integer()?)),
            None => Ok(None),
        }
    }
}

fn context_item(focus: Option<&Focus>) -> Result<&Item, Error> {
    focus
        .map(|f| &f.item)
        .ok_or_else(|| Error::from_code(ErrorCode::XPDY0002, "context item is absent"))
}

fn context_node(focus: Option<&Focus>) -> Result<&NodeItem, Error> {
    match context_item(focus)? {
        Item::Node(n) => Ok(n),
        Item::Atomic(a) => Err(Error::from_code(
            ErrorCode::XPTY0020,
            format!("context item '{a}' is not a node"),
        )),
    }
}

fn dedup_nodes(nodes: impl IntoIterator<Item = NodeItem>) -> Vec<NodeItem> {
    let mut seen = HashSet::new();
    nodes.into_iter().filter(|n| seen.insert(n.clone())).collect()
}

/// Compare two atomic values.
///
/// Strings are cast to the type of a non-string operand first, so `"10" = 10`
/// compares numerically; other cross-type pairs must share a primitive type.
pub fn compare_values(op: ComparisonOp, a: &AtomicValue, b: &AtomicValue) -> Result<bool, Error> {
    let (a, b) = promote_pair(a, b)?;
    let ord = a.compare_to(&b)?;
    Ok(match op {
        ComparisonOp::Eq => ord == Ordering::Equal,
        ComparisonOp::Ne => ord != Ordering::Equal,
        ComparisonOp::Lt => ord == Ordering::Less,
        ComparisonOp::Le => ord != Ordering::Greater,
        ComparisonOp::Gt => ord == Ordering::Greater,
        ComparisonOp::Ge => ord != Ordering::Less,
    })
}

fn promote_pair(a: &AtomicValue, b: &AtomicValue) -> Result<(AtomicValue, AtomicValue), Error> {
    let (ta, tb) = (a.type_of().primitive(), b.type_of().primitive());
    if ta == tb {
        return Ok((a.clone(), b.clone()));
    }
    let stringish = |t: AtomicType| matches!(t, AtomicType::String | AtomicType::UriReference);
    match (stringish(ta), stringish(tb)) {
        (true, true) => Ok((
            AtomicValue::String(a.as_string()),
            AtomicValue::String(b.as_string()),
        )),
        (true, false) => Ok((tb.cast(a)?, b.clone())),
        (false, true) => Ok((a.clone(), ta.cast(b)?)),
        (false, false) => Ok((a.clone(), b.clone())),
    }
}
