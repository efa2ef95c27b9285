use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockbook_core::{InventoryError, InventoryResult, Money, ProductCode, SequenceNumber, UserId};

/// Why stock moved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Reason {
    /// Stock in (delivery, opening stock). Delta must be positive.
    Receipt,
    /// Stock out to a customer. Delta must be negative.
    Sale,
    /// Shrinkage, breakage, stock counts.
    Adjustment,
    /// Offsets an earlier mistaken entry. May re-baseline below zero.
    Correction,
}

impl Reason {
    pub const ALL: [Reason; 4] = [
        Reason::Receipt,
        Reason::Sale,
        Reason::Adjustment,
        Reason::Correction,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Reason::Receipt => "RECEIPT",
            Reason::Sale => "SALE",
            Reason::Adjustment => "ADJUSTMENT",
            Reason::Correction => "CORRECTION",
        }
    }

    /// Only corrections may leave a product with negative stock.
    pub fn allows_negative_stock(&self) -> bool {
        matches!(self, Reason::Correction)
    }

    pub fn check_delta(&self, delta: i64) -> InventoryResult<()> {
        if delta == 0 {
            return Err(InventoryError::invalid_field("delta", "cannot be zero"));
        }
        match self {
            Reason::Receipt if delta < 0 => Err(InventoryError::invalid_field(
                "delta",
                "a receipt must add stock",
            )),
            Reason::Sale if delta > 0 => Err(InventoryError::invalid_field(
                "delta",
                "a sale must remove stock",
            )),
            _ => Ok(()),
        }
    }
}

impl core::fmt::Display for Reason {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for Reason {
    type Err = InventoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Reason::ALL
            .into_iter()
            .find(|r| r.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| InventoryError::invalid_field("reason", format!("unknown reason '{s}'")))
    }
}

/// One committed, immutable stock movement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub sequence: SequenceNumber,
    pub product_code: ProductCode,
    /// Positive = stock in, negative = stock out.
    pub delta: i64,
    pub reason: Reason,
    /// Product price when the entry was committed.
    pub unit_price: Money,
    pub recorded_at: DateTime<Utc>,
    pub recorded_by: UserId,
    pub note: Option<String>,
}

impl LedgerEntry {
    /// delta × unit price, in minor units.
    pub fn value_delta(&self) -> i128 {
        i128::from(self.delta) * i128::from(self.unit_price.minor())
    }
}

/// Input for "record movement".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Movement {
    pub product_code: ProductCode,
    pub delta: i64,
    pub reason: Reason,
    pub note: Option<String>,
}

impl Movement {
    pub fn new(product_code: ProductCode, delta: i64, reason: Reason) -> Self {
        Self {
            product_code,
            delta,
            reason,
            note: None,
        }
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }
}

/// Net effect of a set of entries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MovementTotals {
    pub units: i64,
    /// Σ delta × unit price, minor units.
    pub value_minor: i128,
}

impl MovementTotals {
    pub fn add(&mut self, entry: &LedgerEntry) -> InventoryResult<()> {
        self.include(entry.delta, entry.value_delta())
    }

    /// Fold in a pre-aggregated group of movements. Fails with `InvalidField` on
    /// `units` or `value` instead of wrapping.
    pub fn include(&mut self, units: i64, value_minor: i128) -> InventoryResult<()> {
        let units = self
            .units
            .checked_add(units)
            .ok_or_else(|| InventoryError::invalid_field("units", "total overflows"))?;
        let value_minor = self
            .value_minor
            .checked_add(value_minor)
            .ok_or_else(|| InventoryError::invalid_field("value", "total overflows"))?;
        self.units = units;
        self.value_minor = value_minor;
        Ok(())
    }
}

pub(crate) const MAX_NOTE_LEN: usize = 500;

pub(crate) fn normalize_note(note: Option<&str>) -> InventoryResult<Option<String>> {
    let Some(note) = note.map(str::trim).filter(|n| !n.is_empty()) else {
        return Ok(None);
    };
    if note.chars().count() > MAX_NOTE_LEN {
        return Err(InventoryError::invalid_field(
            "note",
            format!("longer than {MAX_NOTE_LEN} characters"),
        ));
    }
    Ok(Some(note.to_string()))
}
