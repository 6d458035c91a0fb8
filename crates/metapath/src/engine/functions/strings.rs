use std::sync::Arc;

use itertools::Itertools;
use rust_decimal::Decimal;

use super::string_arg;
use crate::engine::runtime::{CallCtx, Error, ErrorCode};
use crate::xdm::{AtomicValue, Item, Sequence};

fn string_of(item: &Item) -> String {
    match item {
        Item::Node(n) => n.string_value(),
        Item::Atomic(a) => a.as_string(),
    }
}

/// String value of the argument, or of the context item for the 0-arity form.
fn subject(ctx: &CallCtx, args: &[Sequence]) -> Result<String, Error> {
    match args.first() {
        Some(seq) => Ok(seq.first().map(string_of).unwrap_or_default()),
        None => ctx.context_item().map(string_of),
    }
}

fn string_result(s: impl Into<String>) -> Sequence {
    Sequence::atomic(AtomicValue::string(s))
}

pub(super) fn string_fn(ctx: &CallCtx, args: &[Sequence]) -> Result<Sequence, Error> {
    Ok(string_result(subject(ctx, args)?))
}

pub(super) fn string_length_fn(ctx: &CallCtx, args: &[Sequence]) -> Result<Sequence, Error> {
    let len = subject(ctx, args)?.chars().count();
    let len = i64::try_from(len)
        .map_err(|_| Error::from_code(ErrorCode::FOAR0002, "string length out of range"))?;
    Ok(Sequence::atomic(AtomicValue::Integer(len)))
}

pub(super) fn normalize_space_fn(ctx: &CallCtx, args: &[Sequence]) -> Result<Sequence, Error> {
    let s = subject(ctx, args)?;
    Ok(string_result(s.split_whitespace().join(" ")))
}

pub(super) fn concat_fn(_ctx: &CallCtx, args: &[Sequence]) -> Result<Sequence, Error> {
    let joined: String = (0..args.len()).map(|i| string_arg(args, i)).collect();
    Ok(string_result(joined))
}

pub(super) fn contains_fn(_ctx: &CallCtx, args: &[Sequence]) -> Result<Sequence, Error> {
    Ok(Sequence::boolean(string_arg(args, 0).contains(&string_arg(args, 1))))
}

pub(super) fn starts_with_fn(_ctx: &CallCtx, args: &[Sequence]) -> Result<Sequence, Error> {
    Ok(Sequence::boolean(string_arg(args, 0).starts_with(&string_arg(args, 1))))
}

pub(super) fn ends_with_fn(_ctx: &CallCtx, args: &[Sequence]) -> Result<Sequence, Error> {
    Ok(Sequence::boolean(string_arg(args, 0).ends_with(&string_arg(args, 1))))
}

fn decimal_arg(args: &[Sequence], idx: usize) -> Result<Decimal, Error> {
    match args[idx].first() {
        Some(Item::Atomic(a)) => a.round()?.as_decimal(),
        _ => Err(Error::from_code(ErrorCode::XPTY0004, "expected a numeric argument")),
    }
}

/// `fn:substring` with 1-based, rounded character positions.
pub(super) fn substring_fn(_ctx: &CallCtx, args: &[Sequence]) -> Result<Sequence, Error> {
    let source = string_arg(args, 0);
    let start = decimal_arg(args, 1)?;
    let end = if args.len() > 2 {
        let length = decimal_arg(args, 2)?;
        match start.checked_add(length) {
            Some(end) => Some(end),
            // Overflow past the largest decimal leaves the end open.
            None if length.is_sign_positive() => None,
            None => return Ok(string_result(String::new())),
        }
    } else {
        None
    };
    let out: String = source
        .chars()
        .zip(1i64..)
        .filter(|&(_, pos)| {
            let pos = Decimal::from(pos);
            pos >= start && end.is_none_or(|e| pos < e)
        })
        .map(|(c, _)| c)
        .collect();
    Ok(string_result(out))
}

pub(super) fn upper_case_fn(_ctx: &CallCtx, args: &[Sequence]) -> Result<Sequence, Error> {
    Ok(string_result(string_arg(args, 0).to_uppercase()))
}

pub(super) fn lower_case_fn(_ctx: &CallCtx, args: &[Sequence]) -> Result<Sequence, Error> {
    Ok(string_result(string_arg(args, 0).to_lowercase()))
}

/// Compile `pattern` with XPath regex flags (`i`, `m`, `s`, `x`).
pub(crate) fn build_regex(pattern: &str, flags: &str) -> Result<fancy_regex::Regex, Error> {
    let mut builder = fancy_regex::RegexBuilder::new(pattern);
    for ch in flags.chars() {
        match ch {
            'i' => {
                builder.case_insensitive(true);
            }
            'm' => {
                builder.multi_line(true);
            }
            's' => {
                builder.dot_matches_new_line(true);
            }
            'x' => {
                builder.verbose_mode(true);
            }
            _ => {
                return Err(Error::from_code(
                    ErrorCode::FORX0001,
                    format!("unsupported regex flag: {ch}"),
                ));
            }
        }
    }
    builder.build().map_err(|e| {
        Error::from_code(ErrorCode::FORX0002, format!("invalid regex pattern '{pattern}'"))
            .with_source(Some(Arc::new(e) as Arc<dyn std::error::Error + Send + Sync>))
    })
}

pub(super) fn matches_fn(_ctx: &CallCtx, args: &[Sequence]) -> Result<Sequence, Error> {
    let input = string_arg(args, 0);
    let re = build_regex(&string_arg(args, 1), &string_arg(args, 2))?;
    Ok(Sequence::boolean(re.is_match(&input)?))
}

pub(super) fn string_join_fn(_ctx: &CallCtx, args: &[Sequence]) -> Result<Sequence, Error> {
    let separator = string_arg(args, 1);
    let joined = args[0]
        .iter()
        .filter_map(Item::as_atomic)
        .map(AtomicValue::as_string)
        .join(&separator);
    Ok(string_result(joined))
}

/// `fn:tokenize`. The 1-arity form splits on whitespace after trimming.
pub(super) fn tokenize_fn(_ctx: &CallCtx, args: &[Sequence]) -> Result<Sequence, Error> {
    let input = string_arg(args, 0);
    if args.len() == 1 {
        return Ok(input
            .split_whitespace()
            .map(|t| Item::Atomic(AtomicValue::string(t)))
            .collect());
    }
    if input.is_empty() {
        return Ok(Sequence::empty());
    }
    let pattern = string_arg(args, 1);
    let re = build_regex(&pattern, &string_arg(args, 2))?;
    if re.is_match("")? {
        return Err(Error::from_code(
            ErrorCode::FORX0002,
            format!("pattern '{pattern}' matches a zero-length string"),
        ));
    }
    let mut tokens = Vec::new();
    let mut last = 0;
    for m in re.find_iter(&input) {
        let m = m?;
        tokens.push(&input[last..m.start()]);
        last = m.end();
    }
    tokens.push(&input[last..]);
    Ok(tokens
        .into_iter()
        .map(|t| Item::Atomic(AtomicValue::string(t)))
        .collect())
}
