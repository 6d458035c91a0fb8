//! The built-in `fn:` function library.

use std::sync::{Arc, OnceLock};

use super::function::{Function, FunctionBuilder};
use super::registry::FunctionRegistry;
use super::runtime::{CallCtx, Error};
use super::signature::{ItemType, Occurrence};
use crate::model::NodeItem;
use crate::xdm::{AtomicType, Item, Sequence};

mod boolean;
mod nodes;
mod numeric;
mod sequences;
mod strings;

pub(crate) use strings::build_regex;

use Occurrence::{One, OneOrMore, ZeroOrMore, ZeroOrOne};

const ITEM: ItemType = ItemType::AnyItem;
const NODE: ItemType = ItemType::AnyNode;
const ATOMIC: ItemType = ItemType::Atomic(AtomicType::AnyAtomic);
const STRING: ItemType = ItemType::Atomic(AtomicType::String);
const BOOLEAN: ItemType = ItemType::Atomic(AtomicType::Boolean);
const DECIMAL: ItemType = ItemType::Atomic(AtomicType::Decimal);
const INTEGER: ItemType = ItemType::Atomic(AtomicType::Integer);
const URI: ItemType = ItemType::Atomic(AtomicType::UriReference);

type Handler = fn(&CallCtx, &[Sequence]) -> Result<Sequence, Error>;

/// Shared default registry, built on first use.
pub fn default_function_registry() -> Arc<FunctionRegistry> {
    static REGISTRY: OnceLock<Arc<FunctionRegistry>> = OnceLock::new();
    Arc::clone(REGISTRY.get_or_init(|| Arc::new(build_default_registry())))
}

fn define(reg: &mut FunctionRegistry, builder: FunctionBuilder) {
    match builder.build() {
        Ok(f) => {
            if let Err(e) = reg.register(f) {
                tracing::error!(error = %e, "built-in function not registered");
            }
        }
        Err(e) => tracing::error!(error = %e, "built-in function is malformed"),
    }
}

/// A deterministic built-in function without context dependencies.
fn pure(local: &str) -> FunctionBuilder {
    Function::builder().name(local).deterministic()
}

/// A deterministic built-in reading the context item.
fn focused(local: &str) -> FunctionBuilder {
    pure(local).focus_dependent()
}

fn build_default_registry() -> FunctionRegistry {
    let mut reg = FunctionRegistry::new();
    let r = &mut reg;

    // boolean
    define(r, pure("true").returns(BOOLEAN, One).handler(boolean::fn_true));
    define(r, pure("false").returns(BOOLEAN, One).handler(boolean::fn_false));
    define(r, pure("not").arg("arg", ITEM, ZeroOrMore).returns(BOOLEAN, One).handler(boolean::fn_not));
    define(r, pure("boolean").arg("arg", ITEM, ZeroOrMore).returns(BOOLEAN, One).handler(boolean::fn_boolean));

    // strings
    for (local, handler) in [
        ("string", strings::string_fn as Handler),
        ("string-length", strings::string_length_fn),
        ("normalize-space", strings::normalize_space_fn),
    ] {
        let returns = if local == "string-length" { INTEGER } else { STRING };
        define(r, focused(local).returns(returns, One).handler(handler));
        let arg = if local == "string" { ITEM } else { STRING };
        define(r, pure(local).arg("arg", arg, ZeroOrOne).returns(returns, One).handler(handler));
    }
    define(
        r,
        pure("concat")
            .arg("arg1", ATOMIC, ZeroOrOne)
            .arg("arg2", ATOMIC, ZeroOrOne)
            .unbounded_arity()
            .returns(STRING, One)
            .handler(strings::concat_fn),
    );
    for (local, handler) in [
        ("contains", strings::contains_fn as Handler),
        ("starts-with", strings::starts_with_fn),
        ("ends-with", strings::ends_with_fn),
    ] {
        define(
            r,
            pure(local)
                .arg("arg1", STRING, ZeroOrOne)
                .arg("arg2", STRING, ZeroOrOne)
                .returns(BOOLEAN, One)
                .handler(handler),
        );
    }
    define(
        r,
        pure("substring")
            .arg("source", STRING, ZeroOrOne)
            .arg("start", DECIMAL, One)
            .returns(STRING, One)
            .handler(strings::substring_fn),
    );
    define(
        r,
        pure("substring")
            .arg("source", STRING, ZeroOrOne)
            .arg("start", DECIMAL, One)
            .arg("length", DECIMAL, One)
            .returns(STRING, One)
            .handler(strings::substring_fn),
    );
    define(r, pure("upper-case").arg("arg", STRING, ZeroOrOne).returns(STRING, One).handler(strings::upper_case_fn));
    define(r, pure("lower-case").arg("arg", STRING, ZeroOrOne).returns(STRING, One).handler(strings::lower_case_fn));
    define(
        r,
        pure("matches")
            .arg("input", STRING, ZeroOrOne)
            .arg("pattern", STRING, One)
            .returns(BOOLEAN, One)
            .handler(strings::matches_fn),
    );
    define(
        r,
        pure("matches")
            .arg("input", STRING, ZeroOrOne)
            .arg("pattern", STRING, One)
            .arg("flags", STRING, One)
            .returns(BOOLEAN, One)
            .handler(strings::matches_fn),
    );
    define(
        r,
        pure("string-join")
            .arg("arg", ATOMIC, ZeroOrMore)
            .returns(STRING, One)
            .handler(strings::string_join_fn),
    );
    define(
        r,
        pure("string-join")
            .arg("arg", ATOMIC, ZeroOrMore)
            .arg("separator", STRING, One)
            .returns(STRING, One)
            .handler(strings::string_join_fn),
    );
    define(
        r,
        pure("tokenize")
            .arg("input", STRING, ZeroOrOne)
            .returns(STRING, ZeroOrMore)
            .handler(strings::tokenize_fn),
    );
    define(
        r,
        pure("tokenize")
            .arg("input", STRING, ZeroOrOne)
            .arg("pattern", STRING, One)
            .returns(STRING, ZeroOrMore)
            .handler(strings::tokenize_fn),
    );
    define(
        r,
        pure("tokenize")
            .arg("input", STRING, ZeroOrOne)
            .arg("pattern", STRING, One)
            .arg("flags", STRING, One)
            .returns(STRING, ZeroOrMore)
            .handler(strings::tokenize_fn),
    );

    // sequences
    define(r, pure("count").arg("arg", ITEM, ZeroOrMore).returns(INTEGER, One).handler(sequences::count_fn));
    define(r, pure("empty").arg("arg", ITEM, ZeroOrMore).returns(BOOLEAN, One).handler(sequences::empty_fn));
    define(r, pure("exists").arg("arg", ITEM, ZeroOrMore).returns(BOOLEAN, One).handler(sequences::exists_fn));
    define(r, pure("sum").arg("arg", ATOMIC, ZeroOrMore).returns(ATOMIC, One).handler(sequences::sum_fn));
    define(
        r,
        pure("sum")
            .arg("arg", ATOMIC, ZeroOrMore)
            .arg("zero", ATOMIC, ZeroOrOne)
            .returns(ATOMIC, ZeroOrOne)
            .handler(sequences::sum_fn),
    );
    define(r, pure("avg").arg("arg", ATOMIC, ZeroOrMore).returns(ATOMIC, ZeroOrOne).handler(sequences::avg_fn));
    define(r, pure("min").arg("arg", ATOMIC, ZeroOrMore).returns(ATOMIC, ZeroOrOne).handler(sequences::min_fn));
    define(r, pure("max").arg("arg", ATOMIC, ZeroOrMore).returns(ATOMIC, ZeroOrOne).handler(sequences::max_fn));
    define(
        r,
        pure("distinct-values")
            .arg("arg", ATOMIC, ZeroOrMore)
            .returns(ATOMIC, ZeroOrMore)
            .handler(sequences::distinct_values_fn),
    );
    define(r, pure("exactly-one").arg("arg", ITEM, ZeroOrMore).returns(ITEM, One).handler(sequences::exactly_one_fn));
    define(r, pure("zero-or-one").arg("arg", ITEM, ZeroOrMore).returns(ITEM, ZeroOrOne).handler(sequences::zero_or_one_fn));
    define(r, pure("one-or-more").arg("arg", ITEM, ZeroOrMore).returns(ITEM, OneOrMore).handler(sequences::one_or_more_fn));
    define(r, pure("reverse").arg("arg", ITEM, ZeroOrMore).returns(ITEM, ZeroOrMore).handler(sequences::reverse_fn));
    define(r, pure("head").arg("arg", ITEM, ZeroOrMore).returns(ITEM, ZeroOrOne).handler(sequences::head_fn));
    define(r, pure("tail").arg("arg", ITEM, ZeroOrMore).returns(ITEM, ZeroOrMore).handler(sequences::tail_fn));

    // numeric
    for (local, handler) in [
        ("abs", numeric::abs_fn as Handler),
        ("ceiling", numeric::ceiling_fn),
        ("floor", numeric::floor_fn),
        ("round", numeric::round_fn),
    ] {
        define(r, pure(local).arg("arg", DECIMAL, ZeroOrOne).returns(DECIMAL, ZeroOrOne).handler(handler));
    }
    define(
        r,
        pure("round")
            .arg("arg", DECIMAL, ZeroOrOne)
            .arg("precision", INTEGER, One)
            .returns(DECIMAL, ZeroOrOne)
            .handler(numeric::round_fn),
    );

    // nodes
    define(r, focused("data").returns(ATOMIC, ZeroOrMore).handler(nodes::data_fn));
    define(r, pure("data").arg("arg", ITEM, ZeroOrMore).returns(ATOMIC, ZeroOrMore).handler(nodes::data_fn));
    for (local, result, handler) in [
        ("base-uri", URI, nodes::base_uri_fn as Handler),
        ("document-uri", URI, nodes::document_uri_fn),
        ("path", STRING, nodes::path_fn),
        ("has-children", BOOLEAN, nodes::has_children_fn),
        ("root", NODE, nodes::root_fn),
    ] {
        let occurrence = if local == "has-children" { One } else { ZeroOrOne };
        define(r, focused(local).returns(result, occurrence).handler(handler));
        define(r, pure(local).arg("arg", NODE, ZeroOrOne).returns(result, occurrence).handler(handler));
    }

    // environment
    define(
        r,
        pure("current-dateTime")
            .context_dependent()
            .returns(ItemType::Atomic(AtomicType::DateTimeWithTimezone), One)
            .handler(nodes::current_date_time_fn),
    );

    reg
}

/// The single node argument of a node function, or the context node for the 0-arity form.
fn node_arg<'a>(ctx: &'a CallCtx, args: &'a [Sequence]) -> Result<Option<&'a NodeItem>, Error> {
    let item = match args.first() {
        Some(seq) => seq.first(),
        None => Some(ctx.context_item()?),
    };
    match item {
        None => Ok(None),
        Some(Item::Node(n)) => Ok(Some(n)),
        Some(Item::Atomic(a)) => Err(Error::from_code(
            super::runtime::ErrorCode::XPTY0004,
            format!("expected a node, found {}", a.type_of().qualified_name()),
        )),
    }
}

/// The optional string argument at `idx`; empty sequence reads as "".
fn string_arg(args: &[Sequence], idx: usize) -> String {
    args.get(idx)
        .and_then(|s| s.first())
        .and_then(Item::as_atomic)
        .map(|a| a.as_string())
        .unwrap_or_default()
}
