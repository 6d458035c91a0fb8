//! Metapath evaluation and constraint validation over schema-described documents.
//!
//! The crate evaluates already-parsed expression trees ([`ast::Expr`]) against a
//! read-only node tree ([`model::NodeItem`]) built over a bound document, using a
//! typed atomic value system ([`xdm`]) and a registry of signature-checked
//! functions ([`engine`]). Constraints ([`constraint`]) are attached to schema
//! definitions ([`schema`]) and applied to documents by a validator.

pub mod ast;
pub mod consts;
pub mod constraint;
pub mod engine;
pub mod model;
pub mod schema;
pub mod xdm;

pub use ast::{Expr, MetapathExpression};
pub use engine::runtime::{
    CallCtx, DynamicContext, DynamicContextBuilder, Error, ErrorCode, ErrorKind, Focus, StaticContext,
    StaticContextBuilder,
};
pub use model::{NodeItem, NodeKind};
pub use xdm::{AtomicType, AtomicValue, ExpandedName, Item, Sequence};

