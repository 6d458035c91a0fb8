//! Lexical parsing and canonical formatting for the date, date-time and duration datatypes.

use chrono::{FixedOffset, NaiveDate, NaiveDateTime, TimeDelta};

use crate::engine::runtime::{Error, ErrorCode};

fn invalid(kind: &str, lexical: &str) -> Error {
    Error::from_code(
        ErrorCode::FORG0001,
        format!("invalid {kind} lexical form: '{lexical}'"),
    )
}

/// Split an optional trailing timezone (`Z` or `±HH:MM`) from a lexical value.
pub(crate) fn split_timezone(s: &str) -> Result<(&str, Option<FixedOffset>), Error> {
    if let Some(rest) = s.strip_suffix('Z') {
        return Ok((rest, FixedOffset::east_opt(0)));
    }
    let bytes = s.as_bytes();
    if bytes.len() >= 6 {
        let at = bytes.len() - 6;
        let sign = bytes[at];
        if (sign == b'+' || sign == b'-') && bytes[at + 3] == b':' {
            let hours: i32 = s[at + 1..at + 3]
                .parse()
                .map_err(|_| invalid("timezone", s))?;
            let minutes: i32 = s[at + 4..].parse().map_err(|_| invalid("timezone", s))?;
            if hours > 14 || minutes > 59 || (hours == 14 && minutes != 0) {
                return Err(invalid("timezone", s));
            }
            let secs = (hours * 3600 + minutes * 60) * if sign == b'-' { -1 } else { 1 };
            let offset = FixedOffset::east_opt(secs).ok_or_else(|| invalid("timezone", s))?;
            return Ok((&s[..at], Some(offset)));
        }
    }
    Ok((s, None))
}

pub(crate) fn parse_date(s: &str) -> Result<(NaiveDate, Option<FixedOffset>), Error> {
    let (body, tz) = split_timezone(s.trim())?;
    let date = NaiveDate::parse_from_str(body, "%Y-%m-%d").map_err(|_| invalid("date", s))?;
    Ok((date, tz))
}

pub(crate) fn parse_date_time(s: &str) -> Result<(NaiveDateTime, Option<FixedOffset>), Error> {
    let (body, tz) = split_timezone(s.trim())?;
    let value = NaiveDateTime::parse_from_str(body, "%Y-%m-%dT%H:%M:%S%.f")
        .map_err(|_| invalid("date-time", s))?;
    Ok((value, tz))
}

pub(crate) fn format_timezone(tz: Option<FixedOffset>) -> String {
    match tz {
        None => String::new(),
        Some(off) if off.local_minus_utc() == 0 => "Z".to_string(),
        Some(off) => {
            let secs = off.local_minus_utc();
            let sign = if secs < 0 { '-' } else { '+' };
            let secs = secs.abs();
            format!("{sign}{:02}:{:02}", secs / 3600, (secs % 3600) / 60)
        }
    }
}

pub(crate) fn format_date(date: NaiveDate, tz: Option<FixedOffset>) -> String {
    format!("{}{}", date.format("%Y-%m-%d"), format_timezone(tz))
}

pub(crate) fn format_date_time(value: NaiveDateTime, tz: Option<FixedOffset>) -> String {
    format!(
        "{}{}",
        value.format("%Y-%m-%dT%H:%M:%S%.f"),
        format_timezone(tz)
    )
}

#[derive(Debug, Default)]
struct DurationParts {
    negative: bool,
    years: i64,
    months: i64,
    days: i64,
    hours: i64,
    minutes: i64,
    seconds: i64,
    nanos: u32,
}

fn parse_duration_parts(s: &str, kind: &str) -> Result<DurationParts, Error> {
    let err = || invalid(kind, s);
    let mut rest = s.trim();
    let mut parts = DurationParts::default();
    if let Some(r) = rest.strip_prefix('-') {
        parts.negative = true;
        rest = r;
    }
    rest = rest.strip_prefix('P').ok_or_else(err)?;
    let mut in_time = false;
    let mut seen_component = false;
    let mut seen_time_component = false;
    let mut number = String::new();
    for ch in rest.chars() {
        match ch {
            '0'..='9' | '.' => number.push(ch),
            'T' if !in_time && number.is_empty() => in_time = true,
            designator => {
                if number.is_empty() {
                    return Err(err());
                }
                let fractional = number.contains('.');
                if fractional && !(in_time && designator == 'S') {
                    return Err(err());
                }
                let whole = |n: &str| n.parse::<i64>().map_err(|_| err());
                match (in_time, designator) {
                    (false, 'Y') => parts.years = whole(number.as_str())?,
                    (false, 'M') => parts.months = whole(number.as_str())?,
                    (false, 'D') => parts.days = whole(number.as_str())?,
                    (true, 'H') => parts.hours = whole(number.as_str())?,
                    (true, 'M') => parts.minutes = whole(number.as_str())?,
                    (true, 'S') => {
                        let (int_part, frac_part) = match number.split_once('.') {
                            // Both sides of the point need digits: `PT.S`, `PT.5S` and `PT5.S` are invalid.
                            Some((i, f)) if i.is_empty() || f.is_empty() || f.contains('.') => {
                                return Err(err());
                            }
                            Some(split) => split,
                            None => (number.as_str(), ""),
                        };
                        parts.seconds = whole(int_part)?;
                        if !frac_part.is_empty() {
                            let digits: String = frac_part.chars().take(9).collect();
                            let scale = 10u32.pow(9 - u32::try_from(digits.len()).map_err(|_| err())?);
                            parts.nanos = digits.parse::<u32>().map_err(|_| err())? * scale;
                        }
                    }
                    _ => return Err(err()),
                }
                seen_component = true;
                if in_time {
                    seen_time_component = true;
                }
                number.clear();
            }
        }
    }
    if !number.is_empty() || !seen_component || (in_time && !seen_time_component) {
        return Err(err());
    }
    Ok(parts)
}

/// Parse an `xs:yearMonthDuration` lexical form into a signed month count.
pub(crate) fn parse_year_month_duration(s: &str) -> Result<i32, Error> {
    let parts = parse_duration_parts(s, "year-month-duration")?;
    if parts.days != 0 || parts.hours != 0 || parts.minutes != 0 || parts.seconds != 0 || parts.nanos != 0 {
        return Err(invalid("year-month-duration", s));
    }
    let months = parts
        .years
        .checked_mul(12)
        .and_then(|m| m.checked_add(parts.months))
        .and_then(|m| i32::try_from(m).ok())
        .ok_or_else(|| Error::from_code(ErrorCode::FODT0002, "year-month-duration overflow"))?;
    Ok(if parts.negative { -months } else { months })
}

/// Parse an `xs:dayTimeDuration` lexical form.
pub(crate) fn parse_day_time_duration(s: &str) -> Result<TimeDelta, Error> {
    let parts = parse_duration_parts(s, "day-time-duration")?;
    if parts.years != 0 || parts.months != 0 {
        return Err(invalid("day-time-duration", s));
    }
    let overflow = || Error::from_code(ErrorCode::FODT0002, "day-time-duration overflow");
    let secs = parts
        .days
        .checked_mul(86_400)
        .and_then(|v| v.checked_add(parts.hours.checked_mul(3_600)?))
        .and_then(|v| v.checked_add(parts.minutes.checked_mul(60)?))
        .and_then(|v| v.checked_add(parts.seconds))
        .ok_or_else(overflow)?;
    let delta = TimeDelta::new(secs, parts.nanos).ok_or_else(overflow)?;
    Ok(if parts.negative { -delta } else { delta })
}

pub(crate) fn format_year_month_duration(months: i32) -> String {
    if months == 0 {
        return "P0M".to_string();
    }
    let sign = if months < 0 { "-" } else { "" };
    let total = months.unsigned_abs();
    let (y, m) = (total / 12, total % 12);
    let mut out = format!("{sign}P");
    if y > 0 {
        out.push_str(&format!("{y}Y"));
    }
    if m > 0 {
        out.push_str(&format!("{m}M"));
    }
    out
}

pub(crate) fn format_day_time_duration(delta: TimeDelta) -> String {
    if delta.is_zero() {
        return "PT0S".to_string();
    }
    let sign = if delta < TimeDelta::zero() { "-" } else { "" };
    let abs = delta.abs();
    let total = abs.num_seconds();
    let nanos = abs.subsec_nanos();
    let (days, rem) = (total / 86_400, total % 86_400);
    let (hours, rem) = (rem / 3_600, rem % 3_600);
    let (minutes, seconds) = (rem / 60, rem % 60);
    let mut out = format!("{sign}P");
    if days > 0 {
        out.push_str(&format!("{days}D"));
    }
    if hours > 0 || minutes > 0 || seconds > 0 || nanos > 0 {
        out.push('T');
        if hours > 0 {
            out.push_str(&format!("{hours}H"));
        }
        if minutes > 0 {
            out.push_str(&format!("{minutes}M"));
        }
        if seconds > 0 || nanos > 0 {
            if nanos > 0 {
                let frac = format!("{nanos:09}");
                out.push_str(&format!("{seconds}.{}S", frac.trim_end_matches('0')));
            } else {
                out.push_str(&format!("{seconds}S"));
            }
        }
    }
    out
}
