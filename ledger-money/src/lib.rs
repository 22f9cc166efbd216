#![deny(clippy::print_stdout, clippy::print_stderr)]

//! Fixed-point decimal money, stored as signed minor units (cents).
//!
//! Binary floating point is never used: every stored amount is an `i64`
//! count of minor units, and the only place fractional precision is lost is
//! [`Money::divide_round`], which rounds half-away-from-zero to the nearest
//! minor unit.

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

pub type MoneyResult<T> = Result<T, MoneyError>;

#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum MoneyError {
    #[error("invalid amount: {0}")]
    InvalidAmount(String),
    #[error("arithmetic overflow")]
    Overflow,
    #[error("division by zero")]
    DivisionByZero,
}

/// A 2-decimal-place monetary amount, stored as minor units (cents).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Money(i64);

impl Money {
    pub const ZERO: Money = Money(0);

    #[must_use]
    pub fn from_minor_units(cents: i64) -> Self {
        Money(cents)
    }

    #[must_use]
    pub fn minor_units(self) -> i64 {
        self.0
    }

    #[must_use]
    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    #[must_use]
    pub fn is_negative(self) -> bool {
        self.0 < 0
    }

    #[must_use]
    pub fn negate(self) -> Self {
        Money(-self.0)
    }

    #[must_use]
    pub fn abs(self) -> Self {
        Money(self.0.abs())
    }

    pub fn checked_add(self, other: Money) -> MoneyResult<Money> {
        self.0
            .checked_add(other.0)
            .map(Money)
            .ok_or(MoneyError::Overflow)
    }

    pub fn checked_sub(self, other: Money) -> MoneyResult<Money> {
        self.0
            .checked_sub(other.0)
            .map(Money)
            .ok_or(MoneyError::Overflow)
    }

    /// Multiplies by a non-negative integer quantity. Exact: both operands
    /// are already integral minor units, so no rounding is introduced.
    pub fn checked_mul_quantity(self, quantity: i64) -> MoneyResult<Money> {
        self.0
            .checked_mul(quantity)
            .map(Money)
            .ok_or(MoneyError::Overflow)
    }

    /// Divides by an integer denominator, rounding half-away-from-zero to
    /// the nearest minor unit. This is the only rounding boundary in this
    /// type; it is where WAC's `avgUnitCost = value / qty` loses precision.
    pub fn divide_round(self, denominator: i64) -> MoneyResult<Money> {
        if denominator == 0 {
            return Err(MoneyError::DivisionByZero);
        }
        let numerator = self.0;
        let quotient = numerator / denominator;
        let remainder = numerator % denominator;
        if remainder == 0 {
            return Ok(Money(quotient));
        }
        // round half away from zero: compare 2*|remainder| to |denominator|
        let doubled = remainder
            .checked_abs()
            .and_then(|r| r.checked_mul(2))
            .ok_or(MoneyError::Overflow)?;
        let bump = if doubled >= denominator.abs() { 1 } else { 0 };
        let sign = if (numerator < 0) != (denominator < 0) {
            -1
        } else {
            1
        };
        Ok(Money(quotient + sign * bump))
    }

    #[must_use]
    pub fn sum<I: IntoIterator<Item = Money>>(amounts: I) -> MoneyResult<Money> {
        amounts.into_iter().try_fold(Money::ZERO, Money::checked_add)
    }
}

impl Default for Money {
    fn default() -> Self {
        Money::ZERO
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let cents = self.0;
        if cents == 0 {
            return f.write_str("0.00");
        }
        let negative = cents < 0;
        let magnitude = cents.unsigned_abs();
        let whole = magnitude / 100;
        let frac = magnitude % 100;
        if negative {
            write!(f, "-{whole}.{frac:02}")
        } else {
            write!(f, "{whole}.{frac:02}")
        }
    }
}

impl FromStr for Money {
    type Err = MoneyError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(MoneyError::InvalidAmount(input.to_string()));
        }

        let (negative, rest) = match trimmed.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, trimmed.strip_prefix('+').unwrap_or(trimmed)),
        };

        let mut parts = rest.splitn(2, '.');
        let whole_part = parts.next().unwrap_or("");
        let frac_part = parts.next().unwrap_or("");

        if whole_part.is_empty() || !whole_part.bytes().all(|b| b.is_ascii_digit()) {
            return Err(MoneyError::InvalidAmount(input.to_string()));
        }
        if frac_part.len() > 2 || !frac_part.bytes().all(|b| b.is_ascii_digit()) {
            return Err(MoneyError::InvalidAmount(input.to_string()));
        }

        let whole: i64 = whole_part
            .parse()
            .map_err(|_| MoneyError::InvalidAmount(input.to_string()))?;
        let frac: i64 = if frac_part.is_empty() {
            0
        } else if frac_part.len() == 1 {
            frac_part
                .parse::<i64>()
                .map_err(|_| MoneyError::InvalidAmount(input.to_string()))?
                * 10
        } else {
            frac_part
                .parse()
                .map_err(|_| MoneyError::InvalidAmount(input.to_string()))?
        };

        let magnitude = whole
            .checked_mul(100)
            .and_then(|w| w.checked_add(frac))
            .ok_or(MoneyError::Overflow)?;

        // "-0.00" normalizes to "0.00": a zero magnitude is never negative.
        let cents = if negative && magnitude != 0 {
            -magnitude
        } else {
            magnitude
        };
        Ok(Money(cents))
    }
}

impl TryFrom<String> for Money {
    type Error = MoneyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Money> for String {
    fn from(value: Money) -> Self {
        value.to_string()
    }
}
