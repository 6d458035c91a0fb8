use core::fmt;
use core::str::FromStr;
use std::net::{Ipv4Addr, Ipv6Addr};

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64_STANDARD};
use chrono::{FixedOffset, NaiveTime};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;

use super::atomic::AtomicValue;
use super::temporal;
use crate::engine::runtime::{Error, ErrorCode};

/// The datatype lattice.
///
/// `AnyAtomic` is the root. Every other type has exactly one parent, so the
/// lattice is a tree and `is_subtype_of` is a walk up the parent chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AtomicType {
    AnyAtomic,
    String,
    Token,
    EmailAddress,
    Hostname,
    Uuid,
    IpV4Address,
    IpV6Address,
    Boolean,
    Decimal,
    Integer,
    NonNegativeInteger,
    PositiveInteger,
    UriReference,
    AnyUri,
    YearMonthDuration,
    DayTimeDuration,
    Date,
    DateWithTimezone,
    DateTime,
    DateTimeWithTimezone,
    Base64,
    MarkupLine,
    MarkupMultiline,
}

impl AtomicType {
    pub const ALL: [AtomicType; 24] = [
        AtomicType::AnyAtomic,
        AtomicType::String,
        AtomicType::Token,
        AtomicType::EmailAddress,
        AtomicType::Hostname,
        AtomicType::Uuid,
        AtomicType::IpV4Address,
        AtomicType::IpV6Address,
        AtomicType::Boolean,
        AtomicType::Decimal,
        AtomicType::Integer,
        AtomicType::NonNegativeInteger,
        AtomicType::PositiveInteger,
        AtomicType::UriReference,
        AtomicType::AnyUri,
        AtomicType::YearMonthDuration,
        AtomicType::DayTimeDuration,
        AtomicType::Date,
        AtomicType::DateWithTimezone,
        AtomicType::DateTime,
        AtomicType::DateTimeWithTimezone,
        AtomicType::Base64,
        AtomicType::MarkupLine,
        AtomicType::MarkupMultiline,
    ];

    /// Schema datatype name, e.g. `date-time-with-timezone`.
    pub fn name(self) -> &'static str {
        use AtomicType as T;
        match self {
            T::AnyAtomic => "any-atomic-type",
            T::String => "string",
            T::Token => "token",
            T::EmailAddress => "email-address",
            T::Hostname => "hostname",
            T::Uuid => "uuid",
            T::IpV4Address => "ip-v4-address",
            T::IpV6Address => "ip-v6-address",
            T::Boolean => "boolean",
            T::Decimal => "decimal",
            T::Integer => "integer",
            T::NonNegativeInteger => "non-negative-integer",
            T::PositiveInteger => "positive-integer",
            T::UriReference => "uri-reference",
            T::AnyUri => "uri",
            T::YearMonthDuration => "year-month-duration",
            T::DayTimeDuration => "day-time-duration",
            T::Date => "date",
            T::DateWithTimezone => "date-with-timezone",
            T::DateTime => "date-time",
            T::DateTimeWithTimezone => "date-time-with-timezone",
            T::Base64 => "base64",
            T::MarkupLine => "markup-line",
            T::MarkupMultiline => "markup-multiline",
        }
    }

    /// Prefixed name used in diagnostics (`meta:integer`).
    pub fn qualified_name(self) -> String {
        format!("meta:{}", self.name())
    }

    pub fn from_name(name: &str) -> Option<AtomicType> {
        let local = name.strip_prefix("meta:").unwrap_or(name);
        Self::ALL.iter().copied().find(|t| t.name() == local)
    }

    pub fn parent(self) -> Option<AtomicType> {
        use AtomicType as T;
        match self {
            T::AnyAtomic => None,
            T::Token | T::EmailAddress | T::Hostname | T::Uuid | T::IpV4Address | T::IpV6Address => {
                Some(T::String)
            }
            T::PositiveInteger => Some(T::NonNegativeInteger),
            T::NonNegativeInteger => Some(T::Integer),
            T::Integer => Some(T::Decimal),
            T::AnyUri => Some(T::UriReference),
            T::DateWithTimezone => Some(T::Date),
            T::DateTimeWithTimezone => Some(T::DateTime),
            T::String
            | T::Boolean
            | T::Decimal
            | T::UriReference
            | T::YearMonthDuration
            | T::DayTimeDuration
            | T::Date
            | T::DateTime
            | T::Base64
            | T::MarkupLine
            | T::MarkupMultiline => Some(T::AnyAtomic),
        }
    }

    pub fn is_subtype_of(self, other: AtomicType) -> bool {
        let mut cur = Some(self);
        while let Some(t) = cur {
            if t == other {
                return true;
            }
            cur = t.parent();
        }
        false
    }

    /// Topmost ancestor below `any-atomic-type`. Values are only comparable within a primitive.
    pub fn primitive(self) -> AtomicType {
        let mut cur = self;
        while let Some(p) = cur.parent() {
            if p == AtomicType::AnyAtomic {
                return cur;
            }
            cur = p;
        }
        cur
    }

    pub fn is_numeric(self) -> bool {
        self.is_subtype_of(AtomicType::Decimal)
    }

    /// Parse a lexical form into a value of this type.
    ///
    /// `uri-reference` picks the concrete variant: absolute or opaque URIs become
    /// [`AtomicValue::AnyUri`], relative references stay [`AtomicValue::UriReference`].
    pub fn value_of(self, lexical: &str) -> Result<AtomicValue, Error> {
        use AtomicType as T;
        let invalid = || {
            Error::from_code(
                ErrorCode::FORG0001,
                format!("invalid {} lexical form: '{lexical}'", self.name()),
            )
        };
        let trimmed = lexical.trim();
        let value = match self {
            T::AnyAtomic | T::String => AtomicValue::String(lexical.to_string()),
            T::MarkupLine => AtomicValue::MarkupLine(lexical.to_string()),
            T::MarkupMultiline => AtomicValue::MarkupMultiline(lexical.to_string()),
            T::Token => {
                if !is_token(trimmed) {
                    return Err(invalid());
                }
                AtomicValue::Token(trimmed.to_string())
            }
            T::EmailAddress => {
                if !is_email_address(trimmed) {
                    return Err(invalid());
                }
                AtomicValue::EmailAddress(trimmed.to_string())
            }
            T::Hostname => {
                if !is_hostname(trimmed) {
                    return Err(invalid());
                }
                AtomicValue::Hostname(trimmed.to_string())
            }
            T::Uuid => {
                // Only the hyphenated form is accepted.
                let parsed = uuid::Uuid::try_parse(trimmed)
                    .ok()
                    .filter(|_| trimmed.len() == uuid::fmt::Hyphenated::LENGTH)
                    .ok_or_else(invalid)?;
                AtomicValue::Uuid(parsed.hyphenated().to_string())
            }
            T::IpV4Address => {
                AtomicValue::IpV4Address(Ipv4Addr::from_str(trimmed).map_err(|_| invalid())?)
            }
            T::IpV6Address => {
                AtomicValue::IpV6Address(Ipv6Addr::from_str(trimmed).map_err(|_| invalid())?)
            }
            T::Boolean => match trimmed {
                "true" | "1" => AtomicValue::TRUE,
                "false" | "0" => AtomicValue::FALSE,
                _ => return Err(invalid()),
            },
            T::Decimal => {
                if trimmed.contains(['e', 'E']) {
                    return Err(invalid());
                }
                AtomicValue::Decimal(Decimal::from_str(trimmed).map_err(|_| invalid())?)
            }
            T::Integer | T::NonNegativeInteger | T::PositiveInteger => {
                let i = trimmed.parse::<i64>().map_err(|_| invalid())?;
                integer_in_range(self, i).ok_or_else(invalid)?
            }
            T::UriReference => match url::Url::parse(trimmed) {
                Ok(_) => AtomicValue::AnyUri(trimmed.to_string()),
                Err(url::ParseError::RelativeUrlWithoutBase) => {
                    AtomicValue::UriReference(trimmed.to_string())
                }
                Err(_) => return Err(invalid()),
            },
            T::AnyUri => {
                url::Url::parse(trimmed).map_err(|_| invalid())?;
                AtomicValue::AnyUri(trimmed.to_string())
            }
            T::YearMonthDuration => {
                AtomicValue::YearMonthDuration(temporal::parse_year_month_duration(trimmed)?)
            }
            T::DayTimeDuration => {
                AtomicValue::DayTimeDuration(temporal::parse_day_time_duration(trimmed)?)
            }
            T::Date => {
                let (date, tz) = temporal::parse_date(trimmed)?;
                AtomicValue::Date { date, tz }
            }
            T::DateWithTimezone => match temporal::parse_date(trimmed)? {
                (date, Some(tz)) => AtomicValue::DateWithTimezone { date, tz },
                (_, None) => return Err(invalid()),
            },
            T::DateTime => {
                let (value, tz) = temporal::parse_date_time(trimmed)?;
                AtomicValue::DateTime { value, tz }
            }
            T::DateTimeWithTimezone => match temporal::parse_date_time(trimmed)? {
                (value, Some(tz)) => date_time_with_timezone(value, tz).ok_or_else(invalid)?,
                (_, None) => return Err(invalid()),
            },
            T::Base64 => {
                let compact: String = trimmed.chars().filter(|c| !c.is_whitespace()).collect();
                AtomicValue::Base64Binary(BASE64_STANDARD.decode(compact).map_err(|_| invalid())?)
            }
        };
        Ok(value)
    }

    /// Cast `value` to this type.
    ///
    /// Returns an instance of `self`: exactly `self`, except that `uri-reference`
    /// targets yield `uri` for absolute values, and `any-atomic-type` returns the
    /// value unchanged. Unsupported pairs and out-of-range values raise `FORG0001`.
    pub fn cast(self, value: &AtomicValue) -> Result<AtomicValue, Error> {
        use AtomicType as T;
        use AtomicValue as V;
        let source = value.type_of();
        if source == self || self == T::AnyAtomic {
            return Ok(value.clone());
        }
        let unsupported = || {
            Error::from_code(
                ErrorCode::FORG0001,
                format!(
                    "cannot cast {} '{}' to {}",
                    source.qualified_name(),
                    value.as_string(),
                    self.qualified_name()
                ),
            )
        };
        if self == T::String {
            return Ok(V::String(value.as_string()));
        }
        if self.is_numeric() && source.is_numeric() {
            let d = value.as_decimal()?;
            return match self {
                T::Decimal => Ok(V::Decimal(d)),
                _ => {
                    let i = d.trunc().to_i64().ok_or_else(unsupported)?;
                    integer_in_range(self, i).ok_or_else(unsupported)
                }
            };
        }
        let cast = match (value, self) {
            (V::Boolean(b), T::Decimal) => Some(V::Decimal(Decimal::from(u8::from(*b)))),
            (V::Boolean(b), t) if t.is_numeric() => integer_in_range(t, i64::from(*b)),
            (_, T::Boolean) if source.is_numeric() => {
                Some(V::Boolean(!value.as_decimal()?.is_zero()))
            }
            (V::Date { date, tz }, T::DateWithTimezone) => {
                tz.map(|tz| V::DateWithTimezone { date: *date, tz })
            }
            (V::DateWithTimezone { date, tz }, T::Date) => Some(V::Date {
                date: *date,
                tz: Some(*tz),
            }),
            (V::DateTime { value, tz }, T::DateTimeWithTimezone) => {
                tz.and_then(|tz| date_time_with_timezone(*value, tz))
            }
            (V::DateTimeWithTimezone(dt), T::DateTime) => Some(V::DateTime {
                value: dt.naive_local(),
                tz: Some(*dt.offset()),
            }),
            (V::Date { date, tz }, T::DateTime) => Some(V::DateTime {
                value: date.and_time(NaiveTime::MIN),
                tz: *tz,
            }),
            (V::DateWithTimezone { date, tz }, T::DateTime) => Some(V::DateTime {
                value: date.and_time(NaiveTime::MIN),
                tz: Some(*tz),
            }),
            (V::Date { date, tz: Some(tz) }, T::DateTimeWithTimezone)
            | (V::DateWithTimezone { date, tz }, T::DateTimeWithTimezone) => {
                date_time_with_timezone(date.and_time(NaiveTime::MIN), *tz)
            }
            (V::DateTime { value, tz }, T::Date) => Some(V::Date {
                date: value.date(),
                tz: *tz,
            }),
            (V::DateTimeWithTimezone(dt), T::Date) => Some(V::Date {
                date: dt.date_naive(),
                tz: Some(*dt.offset()),
            }),
            (V::DateTime { value, tz: Some(tz) }, T::DateWithTimezone) => {
                Some(V::DateWithTimezone {
                    date: value.date(),
                    tz: *tz,
                })
            }
            (V::DateTimeWithTimezone(dt), T::DateWithTimezone) => Some(V::DateWithTimezone {
                date: dt.date_naive(),
                tz: *dt.offset(),
            }),
            (V::MarkupLine(s), T::MarkupMultiline) => Some(V::MarkupMultiline(s.clone())),
            (V::MarkupMultiline(s), T::MarkupLine) if !s.contains('\n') => {
                Some(V::MarkupLine(s.clone()))
            }
            (V::MarkupMultiline(_), T::MarkupLine) => None,
            (V::AnyUri(s) | V::UriReference(s), T::UriReference | T::AnyUri) => {
                return self.value_of(s).map_err(|_| unsupported());
            }
            (V::Base64Binary(_), _) => None,
            _ if value.is_string_like()
                || matches!(source, T::MarkupLine | T::MarkupMultiline) =>
            {
                return self.value_of(&value.as_string()).map_err(|e| {
                    if e.code == ErrorCode::FODT0002 { e } else { unsupported() }
                });
            }
            _ => None,
        };
        cast.filter(|v| v.type_of() == self).ok_or_else(unsupported)
    }
}

impl fmt::Display for AtomicType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

fn integer_in_range(t: AtomicType, i: i64) -> Option<AtomicValue> {
    match t {
        AtomicType::Integer => Some(AtomicValue::Integer(i)),
        AtomicType::NonNegativeInteger if i >= 0 => Some(AtomicValue::NonNegativeInteger(i)),
        AtomicType::PositiveInteger if i > 0 => Some(AtomicValue::PositiveInteger(i)),
        _ => None,
    }
}

fn date_time_with_timezone(
    value: chrono::NaiveDateTime,
    tz: FixedOffset,
) -> Option<AtomicValue> {
    value
        .and_local_timezone(tz)
        .single()
        .map(AtomicValue::DateTimeWithTimezone)
}

fn is_token(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_alphanumeric() || matches!(c, '.' | '-' | '_'))
}

/// Dot-separated labels of letters, digits and inner hyphens.
fn is_hostname(s: &str) -> bool {
    s.len() <= 253
        && s.split('.').all(|label| {
            (1..=63).contains(&label.len())
                && !label.starts_with('-')
                && !label.ends_with('-')
                && label.chars().all(|c| c.is_alphanumeric() || c == '-')
        })
}

fn is_email_address(s: &str) -> bool {
    let Some((local, domain)) = s.rsplit_once('@') else {
        return false;
    };
    let local_ok = !local.is_empty()
        && local.len() <= 64
        && local.split('.').all(|atom| {
            !atom.is_empty()
                && atom
                    .chars()
                    .all(|c| c.is_alphanumeric() || "!#$%&'*+/=?^_`{|}~-".contains(c))
        });
    local_ok && is_hostname(domain)
}
