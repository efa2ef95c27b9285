//! Fixed-point money.
//!
//! Amounts are an `i64` count of minor units (cents) with exactly two decimal
//! places, so totals never accumulate floating-point drift.

use core::str::FromStr;
use serde::{Deserialize, Serialize};

use crate::error::InventoryError;

/// A monetary amount in minor units (scale 2).
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Money(i64);

impl Money {
    pub const ZERO: Money = Money(0);

    /// Number of minor units per major unit.
    pub const SCALE: i64 = 100;

    pub fn from_minor(minor: i64) -> Self {
        Self(minor)
    }

    /// Convert an accumulated `i128` total back into `Money`, if it fits.
    pub fn from_minor_i128(minor: i128) -> Option<Self> {
        i64::try_from(minor).ok().map(Self)
    }

    pub fn minor(self) -> i64 {
        self.0
    }

    pub fn is_negative(self) -> bool {
        self.0 < 0
    }

    pub fn checked_add(self, other: Money) -> Option<Money> {
        self.0.checked_add(other.0).map(Self)
    }

    /// `self × quantity`, or `None` on overflow.
    pub fn checked_mul_qty(self, quantity: i64) -> Option<Money> {
        self.0.checked_mul(quantity).map(Self)
    }
}

impl core::fmt::Display for Money {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        let scale = Self::SCALE as u64;
        write!(f, "{sign}{}.{:02}", abs / scale, abs % scale)
    }
}

impl FromStr for Money {
    type Err = InventoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| InventoryError::invalid_field("price", reason.to_string());

        let s = s.trim();
        let (negative, digits) = match s.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, s),
        };

        let (whole, frac) = match digits.split_once('.') {
            Some((w, f)) => (w, f),
            None => (digits, ""),
        };

        if whole.is_empty() || !whole.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid("expected a decimal amount such as 9.99"));
        }
        if digits.contains('.') && frac.is_empty() {
            return Err(invalid("missing digits after the decimal point"));
        }
        if frac.len() > 2 {
            return Err(invalid("at most two decimal places are allowed"));
        }
        if !frac.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid("expected a decimal amount such as 9.99"));
        }

        let whole: i64 = whole.parse().map_err(|_| invalid("amount is too large"))?;
        let cents: i64 = match frac.len() {
            0 => 0,
            1 => frac.parse::<i64>().map_err(|_| invalid("bad fraction"))? * 10,
            _ => frac.parse::<i64>().map_err(|_| invalid("bad fraction"))?,
        };

        let minor = whole
            .checked_mul(Self::SCALE)
            .and_then(|m| m.checked_add(cents))
            .ok_or_else(|| invalid("amount is too large"))?;

        Ok(Self(if negative { -minor } else { minor }))
    }
}

impl TryFrom<String> for Money {
    type Error = InventoryError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Money> for String {
    fn from(value: Money) -> Self {
        value.to_string()
    }
}
