//! Expression trees.
//!
//! Trees are produced by an external parser; this crate only evaluates them. The
//! constructor helpers on [`Expr`] keep hand-built trees (tests, generated
//! constraints) readable.

use core::fmt;
use std::sync::Arc;

use crate::engine::evaluator;
use crate::engine::runtime::{DynamicContext, Error, Focus};
use crate::model::NameTest;
use crate::xdm::{ArithmeticOp, AtomicValue, ExpandedName, Item, Sequence};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Axis {
    /// Named assembly and field children.
    Model,
    /// Flags (`@name`).
    Flag,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComparisonOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Quantifier {
    Some,
    Every,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// `.`
    ContextItem,
    /// `/`
    Root,
    /// `..`
    Parent,
    Step {
        axis: Axis,
        test: NameTest,
    },
    /// `base/step`, or `base//step` when `descendant` is set.
    Path {
        base: Box<Expr>,
        step: Box<Expr>,
        descendant: bool,
    },
    Filter {
        base: Box<Expr>,
        predicates: Vec<Expr>,
    },
    Literal(AtomicValue),
    Sequence(Vec<Expr>),
    Range(Box<Expr>, Box<Expr>),
    Variable(ExpandedName),
    FunctionCall {
        name: ExpandedName,
        args: Vec<Expr>,
    },
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    ValueComparison {
        op: ComparisonOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    GeneralComparison {
        op: ComparisonOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Arithmetic {
        op: ArithmeticOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Negate(Box<Expr>),
    StringConcat(Vec<Expr>),
    Union(Box<Expr>, Box<Expr>),
    If {
        condition: Box<Expr>,
        then: Box<Expr>,
        otherwise: Box<Expr>,
    },
    Quantified {
        quantifier: Quantifier,
        bindings: Vec<(ExpandedName, Expr)>,
        satisfies: Box<Expr>,
    },
}

impl Expr {
    pub fn child(name: &str) -> Expr {
        Expr::Step {
            axis: Axis::Model,
            test: NameTest::name(name),
        }
    }

    pub fn any_child() -> Expr {
        Expr::Step {
            axis: Axis::Model,
            test: NameTest::Wildcard,
        }
    }

    pub fn flag(name: &str) -> Expr {
        Expr::Step {
            axis: Axis::Flag,
            test: NameTest::name(name),
        }
    }

    pub fn any_flag() -> Expr {
        Expr::Step {
            axis: Axis::Flag,
            test: NameTest::Wildcard,
        }
    }

    /// `a/b/c` from its steps.
    pub fn path(steps: impl IntoIterator<Item = Expr>) -> Expr {
        let mut it = steps.into_iter();
        let first = it.next().unwrap_or(Expr::ContextItem);
        it.fold(first, |base, step| Expr::Path {
            base: Box::new(base),
            step: Box::new(step),
            descendant: false,
        })
    }

    /// `base//step`
    pub fn descendant(base: Expr, step: Expr) -> Expr {
        Expr::Path {
            base: Box::new(base),
            step: Box::new(step),
            descendant: true,
        }
    }

    pub fn filter(base: Expr, predicate: Expr) -> Expr {
        Expr::Filter {
            base: Box::new(base),
            predicates: vec![predicate],
        }
    }

    pub fn string(s: &str) -> Expr {
        Expr::Literal(AtomicValue::string(s))
    }

    pub fn integer(i: i64) -> Expr {
        Expr::Literal(AtomicValue::Integer(i))
    }

    pub fn var(local: &str) -> Expr {
        Expr::Variable(ExpandedName::local(local))
    }

    /// Call of a built-in function.
    pub fn call(local: &str, args: Vec<Expr>) -> Expr {
        Expr::FunctionCall {
            name: ExpandedName::function(local),
            args,
        }
    }

    pub fn value_cmp(op: ComparisonOp, left: Expr, right: Expr) -> Expr {
        Expr::ValueComparison {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn general_cmp(op: ComparisonOp, left: Expr, right: Expr) -> Expr {
        Expr::GeneralComparison {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn arithmetic(op: ArithmeticOp, left: Expr, right: Expr) -> Expr {
        Expr::Arithmetic {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn and(left: Expr, right: Expr) -> Expr {
        Expr::And(Box::new(left), Box::new(right))
    }

    pub fn or(left: Expr, right: Expr) -> Expr {
        Expr::Or(Box::new(left), Box::new(right))
    }
}

/// A compiled expression: its source text and its tree.
#[derive(Debug, Clone, PartialEq)]
pub struct MetapathExpression {
    source: String,
    expr: Arc<Expr>,
}

impl MetapathExpression {
    pub fn new(source: impl Into<String>, expr: Expr) -> Self {
        Self {
            source: source.into(),
            expr: Arc::new(expr),
        }
    }

    /// `.`
    pub fn context_item() -> Self {
        Self::new(".", Expr::ContextItem)
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn expr(&self) -> &Expr {
        &self.expr
    }

    pub fn evaluate(&self, ctx: &DynamicContext, focus: Option<&Focus>) -> Result<Sequence, Error> {
        evaluator::evaluate(&self.expr, ctx, focus)
    }

    /// Evaluate with `item` as the context item.
    pub fn evaluate_at(&self, item: impl Into<Item>, ctx: &DynamicContext) -> Result<Sequence, Error> {
        let focus = Focus::new(item);
        self.evaluate(ctx, Some(&focus))
    }

    /// Effective boolean value of the result, with `item` as the context item.
    pub fn evaluate_boolean_at(&self, item: impl Into<Item>, ctx: &DynamicContext) -> Result<bool, Error> {
        self.evaluate_at(item, ctx)?.effective_boolean_value()
    }
}

impl fmt::Display for MetapathExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}
