//! Append, replay and cache maintenance.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockbook_catalog::{Product, ProductReader, ProductWriter, get_product};
use stockbook_core::{InventoryError, InventoryResult, ProductCode, SequenceNumber, UserId};

use crate::entry::{LedgerEntry, Movement, normalize_note};
use crate::table::{EntryReader, EntryWriter};

/// Append one movement and refresh the product's cached quantity.
///
/// The entry row is written before the product row; the caller's transaction makes the
/// pair atomic.
pub fn append<T>(
    tx: &mut T,
    movement: Movement,
    recorded_by: UserId,
    now: DateTime<Utc>,
) -> InventoryResult<LedgerEntry>
where
    T: ProductWriter + EntryWriter + ?Sized,
{
    movement.reason.check_delta(movement.delta)?;
    let note = normalize_note(movement.note.as_deref())?;

    let mut product = get_product(tx, &movement.product_code)?;
    if !product.is_active() {
        return Err(InventoryError::not_found(format!(
            "product '{}' is inactive",
            product.code
        )));
    }

    let resulting = product
        .quantity
        .checked_add(movement.delta)
        .ok_or_else(|| InventoryError::invalid_field("delta", "quantity overflow"))?;
    // Stock already below zero after a correction may still be raised.
    if resulting < 0 && movement.delta < 0 && !movement.reason.allows_negative_stock() {
        return Err(InventoryError::NegativeStock {
            code: product.code.to_string(),
            attempted: movement.delta,
            available: product.quantity,
        });
    }

    let entry = LedgerEntry {
        sequence: tx.next_sequence()?,
        product_code: movement.product_code,
        delta: movement.delta,
        reason: movement.reason,
        unit_price: product.price,
        recorded_at: now,
        recorded_by,
        note,
    };
    tx.insert_entry(&entry)?;

    product.quantity = resulting;
    product.updated_at = now;
    tx.update_product(&product)?;

    Ok(entry)
}

/// Replay every entry for `code` and return the authoritative quantity.
///
/// Read-only; pages through the ledger `page_size` entries at a time.
pub fn recompute<T>(tx: &mut T, code: &ProductCode, page_size: usize) -> InventoryResult<i64>
where
    T: ProductReader + EntryReader + ?Sized,
{
    get_product(tx, code)?;
    replay(tx, code, page_size)
}

fn replay<T>(tx: &mut T, code: &ProductCode, page_size: usize) -> InventoryResult<i64>
where
    T: EntryReader + ?Sized,
{
    let page_size = page_size.max(1);
    let mut after: Option<SequenceNumber> = None;
    let mut quantity: i64 = 0;

    loop {
        let page = tx.entries_for(code, None, after, page_size)?;
        for entry in &page {
            quantity = quantity
                .checked_add(entry.delta)
                .ok_or_else(|| InventoryError::conflict(format!("ledger sum for '{code}' overflows")))?;
        }
        match page.last() {
            Some(last) if page.len() == page_size => after = Some(last.sequence),
            _ => return Ok(quantity),
        }
    }
}

/// A product whose cached quantity disagrees with its ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuantityDrift {
    pub code: ProductCode,
    pub cached: i64,
    pub ledger: i64,
}

/// Compare one product's cache with its ledger replay.
pub fn check_drift<T>(tx: &mut T, product: &Product, page_size: usize) -> InventoryResult<Option<QuantityDrift>>
where
    T: EntryReader + ?Sized,
{
    let ledger = replay(tx, &product.code, page_size)?;
    if ledger == product.quantity {
        return Ok(None);
    }
    Ok(Some(QuantityDrift {
        code: product.code.clone(),
        cached: product.quantity,
        ledger,
    }))
}

/// Outcome of rewriting a product's cache from its ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheRepair {
    pub product: Product,
    /// Cached quantity before the repair.
    pub previous: i64,
}

impl CacheRepair {
    pub fn changed(&self) -> bool {
        self.previous != self.product.quantity
    }
}

/// Rewrite the cached quantity from the ledger. A no-op when they already agree.
pub fn repair_quantity<T>(
    tx: &mut T,
    code: &ProductCode,
    page_size: usize,
    now: DateTime<Utc>,
) -> InventoryResult<CacheRepair>
where
    T: ProductWriter + EntryReader + ?Sized,
{
    let mut product = get_product(tx, code)?;
    let previous = product.quantity;
    let ledger = replay(tx, code, page_size)?;

    if ledger != previous {
        product.quantity = ledger;
        product.updated_at = now;
        tx.update_product(&product)?;
    }

    Ok(CacheRepair { product, previous })
}
