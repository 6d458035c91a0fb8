//! Numeric accessors, rounding and arithmetic on the decimal/integer family.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};

use super::atomic::AtomicValue;
use crate::engine::runtime::{Error, ErrorCode};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithmeticOp {
    Add,
    Sub,
    Mul,
    Div,
    IDiv,
    Mod,
}

fn not_numeric(v: &AtomicValue) -> Error {
    Error::from_code(
        ErrorCode::XPTY0004,
        format!("{} is not numeric", v.type_of().qualified_name()),
    )
}

fn overflow() -> Error {
    Error::from_code(ErrorCode::FOAR0002, "numeric overflow")
}

fn division_by_zero() -> Error {
    Error::from_code(ErrorCode::FOAR0001, "division by zero")
}

impl AtomicValue {
    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            AtomicValue::Decimal(_)
                | AtomicValue::Integer(_)
                | AtomicValue::NonNegativeInteger(_)
                | AtomicValue::PositiveInteger(_)
        )
    }

    fn integer_value(&self) -> Option<i64> {
        match self {
            AtomicValue::Integer(i)
            | AtomicValue::NonNegativeInteger(i)
            | AtomicValue::PositiveInteger(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_decimal(&self) -> Result<Decimal, Error> {
        match self {
            AtomicValue::Decimal(d) => Ok(*d),
            other => other
                .integer_value()
                .map(Decimal::from)
                .ok_or_else(|| not_numeric(other)),
        }
    }

    /// Integer value; decimals are truncated toward zero.
    pub fn as_integer(&self) -> Result<i64, Error> {
        match self {
            AtomicValue::Decimal(d) => d.trunc().to_i64().ok_or_else(overflow),
            other => other.integer_value().ok_or_else(|| not_numeric(other)),
        }
    }

    pub fn abs(&self) -> Result<AtomicValue, Error> {
        match self {
            AtomicValue::Decimal(d) => Ok(AtomicValue::Decimal(d.abs())),
            AtomicValue::Integer(i) => i.checked_abs().map(AtomicValue::Integer).ok_or_else(overflow),
            AtomicValue::NonNegativeInteger(_) | AtomicValue::PositiveInteger(_) => Ok(self.clone()),
            other => Err(not_numeric(other)),
        }
    }

    pub fn ceiling(&self) -> Result<AtomicValue, Error> {
        match self {
            AtomicValue::Decimal(d) => Ok(AtomicValue::Decimal(d.ceil())),
            other if other.is_numeric() => Ok(other.clone()),
            other => Err(not_numeric(other)),
        }
    }

    pub fn floor(&self) -> Result<AtomicValue, Error> {
        match self {
            AtomicValue::Decimal(d) => Ok(AtomicValue::Decimal(d.floor())),
            other if other.is_numeric() => Ok(other.clone()),
            other => Err(not_numeric(other)),
        }
    }

    pub fn round(&self) -> Result<AtomicValue, Error> {
        self.round_to(0)
    }

    /// Round to `precision` decimal places.
    ///
    /// Decimal places (`precision >= 0`): non-negative values round half away from
    /// zero, negative values round half toward zero, so `2.5 -> 3` and `-2.5 -> -2`.
    ///
    /// Powers of ten (`precision < 0`): the magnitude is rounded half up and the sign
    /// is reapplied, so `1250` at `-2` is `1300` and `-1250` is `-1300`.
    pub fn round_to(&self, precision: i64) -> Result<AtomicValue, Error> {
        if let Some(i) = self.integer_value() {
            if precision >= 0 {
                return Ok(self.clone());
            }
            let rounded = round_integer_magnitude(i, precision.unsigned_abs())?;
            return Ok(match self {
                AtomicValue::NonNegativeInteger(_) => AtomicValue::NonNegativeInteger(rounded),
                AtomicValue::PositiveInteger(_) if rounded > 0 => {
                    AtomicValue::PositiveInteger(rounded)
                }
                _ => AtomicValue::Integer(rounded),
            });
        }
        let AtomicValue::Decimal(d) = self else {
            return Err(not_numeric(self));
        };
        if precision >= 0 {
            let dp = u32::try_from(precision).unwrap_or(u32::MAX).min(28);
            let strategy = if d.is_sign_negative() {
                RoundingStrategy::MidpointTowardZero
            } else {
                RoundingStrategy::MidpointAwayFromZero
            };
            return Ok(AtomicValue::Decimal(d.round_dp_with_strategy(dp, strategy)));
        }
        let exponent = u32::try_from(precision.unsigned_abs()).unwrap_or(u32::MAX);
        if exponent > 28 {
            return Ok(AtomicValue::Decimal(Decimal::ZERO));
        }
        let factor = Decimal::from_i128_with_scale(10_i128.pow(exponent), 0);
        let magnitude = (d.abs() / factor)
            .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
            .checked_mul(factor)
            .ok_or_else(overflow)?;
        Ok(AtomicValue::Decimal(if d.is_sign_negative() {
            -magnitude
        } else {
            magnitude
        }))
    }

    pub fn negate(&self) -> Result<AtomicValue, Error> {
        match self {
            AtomicValue::Decimal(d) => Ok(AtomicValue::Decimal(-*d)),
            other => {
                let i = other.integer_value().ok_or_else(|| not_numeric(other))?;
                i.checked_neg().map(AtomicValue::Integer).ok_or_else(overflow)
            }
        }
    }

    /// Numeric arithmetic. Two integer operands stay integers (except `div`);
    /// anything involving a decimal yields a decimal.
    pub fn arithmetic(&self, op: ArithmeticOp, rhs: &AtomicValue) -> Result<AtomicValue, Error> {
        if !self.is_numeric() {
            return Err(not_numeric(self));
        }
        if !rhs.is_numeric() {
            return Err(not_numeric(rhs));
        }
        if let (Some(a), Some(b)) = (self.integer_value(), rhs.integer_value()) {
            let int = |r: Option<i64>| r.map(AtomicValue::Integer).ok_or_else(overflow);
            return match op {
                ArithmeticOp::Add => int(a.checked_add(b)),
                ArithmeticOp::Sub => int(a.checked_sub(b)),
                ArithmeticOp::Mul => int(a.checked_mul(b)),
                ArithmeticOp::IDiv | ArithmeticOp::Mod if b == 0 => Err(division_by_zero()),
                ArithmeticOp::IDiv => int(a.checked_div(b)),
                ArithmeticOp::Mod => int(a.checked_rem(b)),
                ArithmeticOp::Div => {
                    if b == 0 {
                        return Err(division_by_zero());
                    }
                    Decimal::from(a)
                        .checked_div(Decimal::from(b))
                        .map(AtomicValue::Decimal)
                        .ok_or_else(overflow)
                }
            };
        }
        let (a, b) = (self.as_decimal()?, rhs.as_decimal()?);
        let dec = |r: Option<Decimal>| r.map(AtomicValue::Decimal).ok_or_else(overflow);
        match op {
            ArithmeticOp::Add => dec(a.checked_add(b)),
            ArithmeticOp::Sub => dec(a.checked_sub(b)),
            ArithmeticOp::Mul => dec(a.checked_mul(b)),
            ArithmeticOp::Div | ArithmeticOp::IDiv | ArithmeticOp::Mod if b.is_zero() => {
                Err(division_by_zero())
            }
            ArithmeticOp::Div => dec(a.checked_div(b)),
            ArithmeticOp::Mod => dec(a.checked_rem(b)),
            ArithmeticOp::IDiv => {
                let q = a.checked_div(b).ok_or_else(overflow)?;
                q.trunc()
                    .to_i64()
                    .map(AtomicValue::Integer)
                    .ok_or_else(overflow)
            }
        }
    }
}

fn round_integer_magnitude(value: i64, exponent: u64) -> Result<i64, Error> {
    // Past 10^38 every i64 magnitude is below half the factor.
    let Some(factor) = u32::try_from(exponent).ok().and_then(|e| 10_i128.checked_pow(e)) else {
        return Ok(0);
    };
    let magnitude = i128::from(value).abs();
    let rounded = (magnitude + factor / 2) / factor * factor;
    let signed = if value < 0 { -rounded } else { rounded };
    i64::try_from(signed).map_err(|_| overflow())
}
