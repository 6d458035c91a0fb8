use crate::engine::runtime::{CallCtx, Error, ErrorCode};
use crate::xdm::{AtomicValue, Item, Sequence};

fn unary(
    args: &[Sequence],
    op: impl FnOnce(&AtomicValue) -> Result<AtomicValue, Error>,
) -> Result<Sequence, Error> {
    match args[0].first() {
        None => Ok(Sequence::empty()),
        Some(Item::Atomic(a)) => Ok(Sequence::atomic(op(a)?)),
        Some(Item::Node(_)) => Err(Error::from_code(ErrorCode::XPTY0004, "expected a numeric value")),
    }
}

pub(super) fn abs_fn(_ctx: &CallCtx, args: &[Sequence]) -> Result<Sequence, Error> {
    unary(args, AtomicValue::abs)
}

pub(super) fn ceiling_fn(_ctx: &CallCtx, args: &[Sequence]) -> Result<Sequence, Error> {
    unary(args, AtomicValue::ceiling)
}

pub(super) fn floor_fn(_ctx: &CallCtx, args: &[Sequence]) -> Result<Sequence, Error> {
    unary(args, AtomicValue::floor)
}

/// `fn:round($arg)` and `fn:round($arg, $precision)`.
pub(super) fn round_fn(_ctx: &CallCtx, args: &[Sequence]) -> Result<Sequence, Error> {
    let precision = match args.get(1).and_then(|s| s.first()) {
        Some(Item::Atomic(p)) => p.as_integer()?,
        _ => 0,
    };
    unary(args, |v| v.round_to(precision))
}
