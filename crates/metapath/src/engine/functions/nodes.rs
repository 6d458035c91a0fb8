use super::node_arg;
use crate::engine::runtime::{CallCtx, Error};
use crate::xdm::{AtomicValue, Item, Sequence};

/// `fn:data`, atomizing the argument or the context item.
pub(super) fn data_fn(ctx: &CallCtx, args: &[Sequence]) -> Result<Sequence, Error> {
    let values = match args.first() {
        Some(seq) => seq.atomize()?,
        None => ctx.context_item()?.atomize()?.into_iter().collect(),
    };
    Ok(values.into_iter().map(Item::Atomic).collect())
}

fn optional_uri(uri: Option<String>) -> Result<Sequence, Error> {
    match uri {
        Some(u) => Ok(Sequence::atomic(AtomicValue::uri(&u)?)),
        None => Ok(Sequence::empty()),
    }
}

/// `fn:base-uri`. Falls back to the static base URI for nodes without one.
pub(super) fn base_uri_fn(ctx: &CallCtx, args: &[Sequence]) -> Result<Sequence, Error> {
    let Some(node) = node_arg(ctx, args)? else {
        return Ok(Sequence::empty());
    };
    optional_uri(node.base_uri().or_else(|| ctx.dyn_ctx.static_ctx.base_uri.clone()))
}

pub(super) fn document_uri_fn(ctx: &CallCtx, args: &[Sequence]) -> Result<Sequence, Error> {
    optional_uri(node_arg(ctx, args)?.and_then(|n| n.document_uri()))
}

pub(super) fn path_fn(ctx: &CallCtx, args: &[Sequence]) -> Result<Sequence, Error> {
    Ok(node_arg(ctx, args)?
        .map(|n| Sequence::atomic(AtomicValue::string(n.path())))
        .unwrap_or_default())
}

pub(super) fn has_children_fn(ctx: &CallCtx, args: &[Sequence]) -> Result<Sequence, Error> {
    Ok(Sequence::boolean(node_arg(ctx, args)?.is_some_and(|n| n.has_children())))
}

pub(super) fn root_fn(ctx: &CallCtx, args: &[Sequence]) -> Result<Sequence, Error> {
    Ok(node_arg(ctx, args)?
        .map(|n| Sequence::singleton(n.root()))
        .unwrap_or_default())
}

pub(super) fn current_date_time_fn(ctx: &CallCtx, _args: &[Sequence]) -> Result<Sequence, Error> {
    Ok(Sequence::atomic(AtomicValue::DateTimeWithTimezone(
        ctx.dyn_ctx.current_date_time(),
    )))
}
