use core::cmp::Ordering;
use core::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64_STANDARD};
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, TimeDelta};
use rust_decimal::Decimal;

use super::temporal;
use super::types::AtomicType;
use crate::engine::runtime::{Error, ErrorCode};

/// An immutable, typed scalar value.
///
/// There is one variant per concrete datatype of the schema datatype system. The
/// lattice between those datatypes (which type derives from which) lives on
/// [`AtomicType`]; a value's concrete type is given by [`AtomicValue::type_of`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AtomicValue {
    String(String),
    Token(String),
    EmailAddress(String),
    Hostname(String),
    Uuid(String),
    IpV4Address(Ipv4Addr),
    IpV6Address(Ipv6Addr),
    Boolean(bool),
    Decimal(Decimal),
    Integer(i64),
    NonNegativeInteger(i64),
    PositiveInteger(i64),
    /// Absolute or opaque URI.
    AnyUri(String),
    /// Relative URI reference (no scheme).
    UriReference(String),
    /// Total months, signed.
    YearMonthDuration(i32),
    DayTimeDuration(TimeDelta),
    Date {
        date: NaiveDate,
        tz: Option<FixedOffset>,
    },
    DateWithTimezone {
        date: NaiveDate,
        tz: FixedOffset,
    },
    DateTime {
        value: NaiveDateTime,
        tz: Option<FixedOffset>,
    },
    DateTimeWithTimezone(DateTime<FixedOffset>),
    Base64Binary(Vec<u8>),
    MarkupLine(String),
    MarkupMultiline(String),
}

impl AtomicValue {
    pub const TRUE: AtomicValue = AtomicValue::Boolean(true);
    pub const FALSE: AtomicValue = AtomicValue::Boolean(false);
    pub const ONE: AtomicValue = AtomicValue::Integer(1);
    pub const ZERO: AtomicValue = AtomicValue::Integer(0);

    pub fn string(s: impl Into<String>) -> Self {
        AtomicValue::String(s.into())
    }

    pub fn boolean(b: bool) -> Self {
        if b { Self::TRUE } else { Self::FALSE }
    }

    pub fn integer(i: i64) -> Self {
        AtomicValue::Integer(i)
    }

    pub fn decimal(d: Decimal) -> Self {
        AtomicValue::Decimal(d)
    }

    /// Build a URI value, picking the absolute/opaque or the relative-reference variant.
    pub fn uri(s: &str) -> Result<Self, Error> {
        AtomicType::UriReference.value_of(s)
    }

    pub fn type_of(&self) -> AtomicType {
        use AtomicValue as V;
        match self {
            V::String(_) => AtomicType::String,
            V::Token(_) => AtomicType::Token,
            V::EmailAddress(_) => AtomicType::EmailAddress,
            V::Hostname(_) => AtomicType::Hostname,
            V::Uuid(_) => AtomicType::Uuid,
            V::IpV4Address(_) => AtomicType::IpV4Address,
            V::IpV6Address(_) => AtomicType::IpV6Address,
            V::Boolean(_) => AtomicType::Boolean,
            V::Decimal(_) => AtomicType::Decimal,
            V::Integer(_) => AtomicType::Integer,
            V::NonNegativeInteger(_) => AtomicType::NonNegativeInteger,
            V::PositiveInteger(_) => AtomicType::PositiveInteger,
            V::AnyUri(_) => AtomicType::AnyUri,
            V::UriReference(_) => AtomicType::UriReference,
            V::YearMonthDuration(_) => AtomicType::YearMonthDuration,
            V::DayTimeDuration(_) => AtomicType::DayTimeDuration,
            V::Date { .. } => AtomicType::Date,
            V::DateWithTimezone { .. } => AtomicType::DateWithTimezone,
            V::DateTime { .. } => AtomicType::DateTime,
            V::DateTimeWithTimezone(_) => AtomicType::DateTimeWithTimezone,
            V::Base64Binary(_) => AtomicType::Base64,
            V::MarkupLine(_) => AtomicType::MarkupLine,
            V::MarkupMultiline(_) => AtomicType::MarkupMultiline,
        }
    }

    pub fn is_instance_of(&self, t: AtomicType) -> bool {
        self.type_of().is_subtype_of(t)
    }

    /// Cast this value to `target`. See [`AtomicType::cast`].
    pub fn cast_as(&self, target: AtomicType) -> Result<AtomicValue, Error> {
        target.cast(self)
    }

    /// Canonical lexical representation.
    pub fn as_string(&self) -> String {
        use AtomicValue as V;
        match self {
            V::String(s)
            | V::Token(s)
            | V::EmailAddress(s)
            | V::Hostname(s)
            | V::Uuid(s)
            | V::AnyUri(s)
            | V::UriReference(s)
            | V::MarkupLine(s)
            | V::MarkupMultiline(s) => s.clone(),
            V::IpV4Address(a) => a.to_string(),
            V::IpV6Address(a) => a.to_string(),
            V::Boolean(b) => if *b { "true" } else { "false" }.to_string(),
            V::Decimal(d) => d.normalize().to_string(),
            V::Integer(i) | V::NonNegativeInteger(i) | V::PositiveInteger(i) => i.to_string(),
            V::YearMonthDuration(m) => temporal::format_year_month_duration(*m),
            V::DayTimeDuration(d) => temporal::format_day_time_duration(*d),
            V::Date { date, tz } => temporal::format_date(*date, *tz),
            V::DateWithTimezone { date, tz } => temporal::format_date(*date, Some(*tz)),
            V::DateTime { value, tz } => temporal::format_date_time(*value, *tz),
            V::DateTimeWithTimezone(dt) => {
                temporal::format_date_time(dt.naive_local(), Some(*dt.offset()))
            }
            V::Base64Binary(bytes) => BASE64_STANDARD.encode(bytes),
        }
    }

    /// Whether this value can be used where a string is required (string family, URIs).
    pub fn is_string_like(&self) -> bool {
        let t = self.type_of();
        t.is_subtype_of(AtomicType::String) || t.is_subtype_of(AtomicType::UriReference)
    }

    /// Effective boolean value of a single atomic item (XPath 3.1 §2.4.3).
    pub fn effective_boolean_value(&self) -> Result<bool, Error> {
        use AtomicValue as V;
        match self {
            V::Boolean(b) => Ok(*b),
            V::Decimal(d) => Ok(!d.is_zero()),
            V::Integer(i) | V::NonNegativeInteger(i) | V::PositiveInteger(i) => Ok(*i != 0),
            other if other.is_string_like() => Ok(!other.as_string().is_empty()),
            other => Err(Error::from_code(
                ErrorCode::FORG0006,
                format!(
                    "effective boolean value is not defined for {}",
                    other.type_of().qualified_name()
                ),
            )),
        }
    }

    /// Order two values of the same primitive type.
    ///
    /// Values of different primitive types are not comparable; callers must cast
    /// one side first. Values with and without a timezone are compared with UTC
    /// standing in for the missing timezone.
    pub fn compare_to(&self, other: &AtomicValue) -> Result<Ordering, Error> {
        use AtomicValue as V;
        let (lp, rp) = (self.type_of().primitive(), other.type_of().primitive());
        if lp != rp {
            return Err(Error::from_code(
                ErrorCode::XPTY0004,
                format!(
                    "cannot compare {} with {}",
                    self.type_of().qualified_name(),
                    other.type_of().qualified_name()
                ),
            ));
        }
        let ord = match (self, other) {
            (V::IpV4Address(a), V::IpV4Address(b)) => a.cmp(b),
            (V::IpV6Address(a), V::IpV6Address(b)) => a.cmp(b),
            (V::Boolean(a), V::Boolean(b)) => a.cmp(b),
            (V::YearMonthDuration(a), V::YearMonthDuration(b)) => a.cmp(b),
            (V::DayTimeDuration(a), V::DayTimeDuration(b)) => a.cmp(b),
            (V::Base64Binary(a), V::Base64Binary(b)) => a.cmp(b),
            _ if lp == AtomicType::Decimal => self.as_decimal()?.cmp(&other.as_decimal()?),
            _ if lp == AtomicType::Date || lp == AtomicType::DateTime => {
                self.instant()?.cmp(&other.instant()?)
            }
            _ => self.as_string().cmp(&other.as_string()),
        };
        Ok(ord)
    }

    /// UTC-normalized instant for date and date-time values, as whole seconds
    /// since the epoch and the sub-second nanoseconds. Seconds are widened so that
    /// values at the edge of the calendar range still shift by their offset.
    fn instant(&self) -> Result<(i128, u32), Error> {
        use AtomicValue as V;
        let utc = |value: NaiveDateTime, tz: Option<FixedOffset>| {
            let at = value.and_utc();
            let offset = tz.map_or(0, |off| i128::from(off.local_minus_utc()));
            (i128::from(at.timestamp()) - offset, at.timestamp_subsec_nanos())
        };
        match self {
            V::Date { date, tz } => Ok(utc(date.and_time(chrono::NaiveTime::MIN), *tz)),
            V::DateWithTimezone { date, tz } => {
                Ok(utc(date.and_time(chrono::NaiveTime::MIN), Some(*tz)))
            }
            V::DateTime { value, tz } => Ok(utc(*value, *tz)),
            V::DateTimeWithTimezone(dt) => Ok(utc(dt.naive_local(), Some(*dt.offset()))),
            other => Err(Error::from_code(
                ErrorCode::XPTY0004,
                format!("{} is not a date or date-time", other.type_of().qualified_name()),
            )),
        }
    }
}

impl fmt::Display for AtomicValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_string())
    }
}

impl From<bool> for AtomicValue {
    fn from(b: bool) -> Self {
        AtomicValue::boolean(b)
    }
}

impl From<i64> for AtomicValue {
    fn from(i: i64) -> Self {
        AtomicValue::Integer(i)
    }
}

impl From<Decimal> for AtomicValue {
    fn from(d: Decimal) -> Self {
        AtomicValue::Decimal(d)
    }
}

impl From<&str> for AtomicValue {
    fn from(s: &str) -> Self {
        AtomicValue::String(s.to_string())
    }
}

impl From<String> for AtomicValue {
    fn from(s: String) -> Self {
        AtomicValue::String(s)
    }
}
