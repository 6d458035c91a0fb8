use core::cmp::Ordering;

use crate::engine::runtime::{CallCtx, Error, ErrorCode};
use crate::xdm::{ArithmeticOp, AtomicValue, Item, Sequence};

fn atomics(seq: &Sequence) -> impl Iterator<Item = &AtomicValue> {
    seq.iter().filter_map(Item::as_atomic)
}

fn count_of(seq: &Sequence) -> Result<i64, Error> {
    i64::try_from(seq.len()).map_err(|_| Error::from_code(ErrorCode::FOAR0002, "sequence too long"))
}

pub(super) fn count_fn(_ctx: &CallCtx, args: &[Sequence]) -> Result<Sequence, Error> {
    Ok(Sequence::atomic(AtomicValue::Integer(count_of(&args[0])?)))
}

pub(super) fn empty_fn(_ctx: &CallCtx, args: &[Sequence]) -> Result<Sequence, Error> {
    Ok(Sequence::boolean(args[0].is_empty()))
}

pub(super) fn exists_fn(_ctx: &CallCtx, args: &[Sequence]) -> Result<Sequence, Error> {
    Ok(Sequence::boolean(!args[0].is_empty()))
}

fn total(seq: &Sequence) -> Result<Option<AtomicValue>, Error> {
    atomics(seq).try_fold(None, |acc: Option<AtomicValue>, v| {
        Ok(Some(match acc {
            None if v.is_numeric() => v.clone(),
            None => {
                return Err(Error::from_code(
                    ErrorCode::XPTY0004,
                    format!("cannot sum a value of type {}", v.type_of().qualified_name()),
                ));
            }
            Some(a) => a.arithmetic(ArithmeticOp::Add, v)?,
        }))
    })
}

/// `fn:sum`. An empty input yields the zero argument, or integer 0 without one.
pub(super) fn sum_fn(_ctx: &CallCtx, args: &[Sequence]) -> Result<Sequence, Error> {
    match total(&args[0])? {
        Some(v) => Ok(Sequence::atomic(v)),
        None => Ok(args
            .get(1)
            .cloned()
            .unwrap_or_else(|| Sequence::atomic(AtomicValue::ZERO))),
    }
}

pub(super) fn avg_fn(_ctx: &CallCtx, args: &[Sequence]) -> Result<Sequence, Error> {
    let Some(sum) = total(&args[0])? else {
        return Ok(Sequence::empty());
    };
    let count = AtomicValue::Integer(count_of(&args[0])?);
    Ok(Sequence::atomic(sum.arithmetic(ArithmeticOp::Div, &count)?))
}

fn extreme(seq: &Sequence, keep: Ordering) -> Result<Sequence, Error> {
    let mut best: Option<&AtomicValue> = None;
    for v in atomics(seq) {
        best = match best {
            Some(b) if v.compare_to(b)? != keep => Some(b),
            _ => Some(v),
        };
    }
    Ok(best.cloned().map(Sequence::atomic).unwrap_or_default())
}

pub(super) fn min_fn(_ctx: &CallCtx, args: &[Sequence]) -> Result<Sequence, Error> {
    extreme(&args[0], Ordering::Less)
}

pub(super) fn max_fn(_ctx: &CallCtx, args: &[Sequence]) -> Result<Sequence, Error> {
    extreme(&args[0], Ordering::Greater)
}

/// `fn:distinct-values`, keeping the first of each group of equal values.
/// Values of incomparable types are distinct.
pub(super) fn distinct_values_fn(_ctx: &CallCtx, args: &[Sequence]) -> Result<Sequence, Error> {
    let mut kept: Vec<&AtomicValue> = Vec::new();
    for v in atomics(&args[0]) {
        let seen = kept
            .iter()
            .any(|k| matches!(v.compare_to(k), Ok(Ordering::Equal)));
        if !seen {
            kept.push(v);
        }
    }
    Ok(kept.into_iter().map(|v| Item::Atomic(v.clone())).collect())
}

pub(super) fn exactly_one_fn(_ctx: &CallCtx, args: &[Sequence]) -> Result<Sequence, Error> {
    if args[0].len() != 1 {
        return Err(Error::from_code(
            ErrorCode::FORG0005,
            format!("exactly-one requires a sequence of length 1, got {}", args[0].len()),
        ));
    }
    Ok(args[0].clone())
}

pub(super) fn zero_or_one_fn(_ctx: &CallCtx, args: &[Sequence]) -> Result<Sequence, Error> {
    if args[0].len() > 1 {
        return Err(Error::from_code(
            ErrorCode::FORG0003,
            format!("zero-or-one requires at most one item, got {}", args[0].len()),
        ));
    }
    Ok(args[0].clone())
}

pub(super) fn one_or_more_fn(_ctx: &CallCtx, args: &[Sequence]) -> Result<Sequence, Error> {
    if args[0].is_empty() {
        return Err(Error::from_code(
            ErrorCode::FORG0004,
            "one-or-more requires at least one item",
        ));
    }
    Ok(args[0].clone())
}

pub(super) fn reverse_fn(_ctx: &CallCtx, args: &[Sequence]) -> Result<Sequence, Error> {
    Ok(args[0].iter().rev().cloned().collect())
}

pub(super) fn head_fn(_ctx: &CallCtx, args: &[Sequence]) -> Result<Sequence, Error> {
    Ok(args[0].first().cloned().map(Sequence::singleton).unwrap_or_default())
}

pub(super) fn tail_fn(_ctx: &CallCtx, args: &[Sequence]) -> Result<Sequence, Error> {
    Ok(args[0].iter().skip(1).cloned().collect())
}
