//! The inventory façade.
//!
//! Every operation takes the caller identity first and refuses to touch the store
//! without one. Commands run in exactly one write transaction; queries in one read
//! transaction (history pages excepted, see [`InventoryService::entries_for`]).

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use stockbook_catalog::{
    NewProduct, Product, ProductFilter, ProductOrder, ProductPage, ProductPatch, ProductQuery,
    ProductReader, create_product, deactivate_product, delete_product, get_product,
    list_products, update_product,
};
use stockbook_core::{
    Actor, Clock, InventoryError, InventoryResult, ProductCode, SystemClock, TimeRange,
};
use stockbook_infra::InventoryStore;
use stockbook_ledger::{
    CacheRepair, EntryHistory, LedgerEntry, Movement, QuantityDrift, Reason, append, check_drift,
    recompute, repair_quantity,
};
use stockbook_reporting::{
    AggregateSnapshot, CategoryCount, ExportRow, TrendQuery, TrendSeries, category_breakdown,
    export_rows, snapshot, trend,
};

use crate::authz::authorize;
use crate::settings::ServiceSettings;

const OPENING_STOCK_NOTE: &str = "opening stock";
const STOCK_COUNT_NOTE: &str = "stock count";

/// What `remove_product` ended up doing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "product", rename_all = "lowercase")]
pub enum Removal {
    /// No ledger history: the row is gone.
    Deleted,
    /// Referenced by the ledger: kept, flagged inactive.
    Deactivated(Product),
}

pub struct InventoryService<S> {
    store: S,
    clock: Arc<dyn Clock>,
    settings: ServiceSettings,
}

impl<S: InventoryStore> InventoryService<S> {
    /// Wall clock and default settings.
    pub fn new(store: S) -> Self {
        Self::with_settings(store, ServiceSettings::default(), Arc::new(SystemClock))
    }

    pub fn with_settings(store: S, settings: ServiceSettings, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            settings,
        }
    }

    pub fn settings(&self) -> &ServiceSettings {
        &self.settings
    }

    // ---- commands -------------------------------------------------------------------

    /// Create a product, optionally receiving `opening_quantity` units in the same
    /// transaction.
    pub fn add_product(
        &self,
        caller: Option<&Actor>,
        new: NewProduct,
        opening_quantity: i64,
    ) -> InventoryResult<Product> {
        let actor = authorize(caller)?;
        if opening_quantity < 0 {
            return Err(InventoryError::invalid_field(
                "opening_quantity",
                "cannot be negative",
            ));
        }
        let now = self.clock.now();

        let product = self.store.write(|tx| {
            let product = create_product(tx, new, now)?;
            if opening_quantity == 0 {
                return Ok(product);
            }
            let opening = Movement::new(product.code.clone(), opening_quantity, Reason::Receipt)
                .with_note(OPENING_STOCK_NOTE);
            append(tx, opening, actor.user_id, now)?;
            get_product(tx, &product.code)
        })?;

        info!(code = %product.code, opening_quantity, user = %actor.username, "product added");
        Ok(product)
    }

    pub fn edit_product(
        &self,
        caller: Option<&Actor>,
        code: &ProductCode,
        patch: ProductPatch,
    ) -> InventoryResult<Product> {
        let actor = authorize(caller)?;
        let now = self.clock.now();

        let product = self.store.write(|tx| update_product(tx, code, patch, now))?;
        info!(code = %code, user = %actor.username, "product edited");
        Ok(product)
    }

    pub fn deactivate_product(&self, caller: Option<&Actor>, code: &ProductCode) -> InventoryResult<Product> {
        let actor = authorize(caller)?;
        let now = self.clock.now();

        let product = self.store.write(|tx| deactivate_product(tx, code, now))?;
        info!(code = %code, user = %actor.username, "product deactivated");
        Ok(product)
    }

    /// Hard delete. `Conflict` once any ledger entry references the product.
    pub fn delete_product(&self, caller: Option<&Actor>, code: &ProductCode) -> InventoryResult<()> {
        let actor = authorize(caller)?;

        self.store.write(|tx| delete_product(tx, code))?;
        info!(code = %code, user = %actor.username, "product deleted");
        Ok(())
    }

    /// Delete when the ledger has never seen the product, deactivate otherwise.
    pub fn remove_product(&self, caller: Option<&Actor>, code: &ProductCode) -> InventoryResult<Removal> {
        let actor = authorize(caller)?;
        let now = self.clock.now();

        let removal = self.store.write(|tx| {
            get_product(tx, code)?;
            if tx.ledger_references(code)? == 0 {
                delete_product(tx, code)?;
                Ok(Removal::Deleted)
            } else {
                Ok(Removal::Deactivated(deactivate_product(tx, code, now)?))
            }
        })?;

        let outcome = match removal {
            Removal::Deleted => "deleted",
            Removal::Deactivated(_) => "deactivated",
        };
        info!(code = %code, outcome, user = %actor.username, "product removed");
        Ok(removal)
    }

    /// Append a movement and refresh the cached quantity atomically.
    pub fn record_movement(&self, caller: Option<&Actor>, movement: Movement) -> InventoryResult<LedgerEntry> {
        let actor = authorize(caller)?;
        let now = self.clock.now();
        let (code, delta, reason) = (movement.product_code.clone(), movement.delta, movement.reason);

        let result = self.store.write(|tx| append(tx, movement, actor.user_id, now));
        match &result {
            Ok(entry) => info!(
                code = %code,
                delta,
                reason = %reason,
                seq = entry.sequence.value(),
                user = %actor.username,
                "movement recorded"
            ),
            Err(err) => debug!(code = %code, delta, reason = %reason, error = %err, "movement rejected"),
        }
        result
    }

    /// Record a physical count as an ADJUSTMENT for the difference. `None` when the
    /// count already matches the cached quantity.
    pub fn count_stock(
        &self,
        caller: Option<&Actor>,
        code: &ProductCode,
        counted: i64,
        note: Option<&str>,
    ) -> InventoryResult<Option<LedgerEntry>> {
        let actor = authorize(caller)?;
        if counted < 0 {
            return Err(InventoryError::invalid_field("counted", "cannot be negative"));
        }
        let now = self.clock.now();

        let entry = self.store.write(|tx| {
            let product = get_product(tx, code)?;
            if !product.is_active() {
                return Err(InventoryError::not_found(format!("product '{code}' is inactive")));
            }
            let delta = counted
                .checked_sub(product.quantity)
                .ok_or_else(|| InventoryError::invalid_field("counted", "difference overflows"))?;
            if delta == 0 {
                return Ok(None);
            }
            let movement = Movement::new(code.clone(), delta, Reason::Adjustment)
                .with_note(note.unwrap_or(STOCK_COUNT_NOTE));
            append(tx, movement, actor.user_id, now).map(Some)
        })?;

        match &entry {
            Some(e) => info!(code = %code, counted, delta = e.delta, user = %actor.username, "stock counted"),
            None => debug!(code = %code, counted, "stock count matches"),
        }
        Ok(entry)
    }

    /// Rewrite the cached quantity from the ledger.
    pub fn repair_quantity(&self, caller: Option<&Actor>, code: &ProductCode) -> InventoryResult<CacheRepair> {
        let actor = authorize(caller)?;
        let now = self.clock.now();
        let page_size = self.settings.history_page_size;

        let repair = self.store.write(|tx| repair_quantity(tx, code, page_size, now))?;
        if repair.changed() {
            warn!(
                code = %code,
                cached = repair.previous,
                ledger = repair.product.quantity,
                user = %actor.username,
                "cached quantity repaired"
            );
        }
        Ok(repair)
    }

    // ---- queries --------------------------------------------------------------------

    pub fn get_product(&self, caller: Option<&Actor>, code: &ProductCode) -> InventoryResult<Product> {
        authorize(caller)?;
        self.store.read(|tx| get_product(tx, code))
    }

    pub fn list_products(&self, caller: Option<&Actor>, query: &ProductQuery) -> InventoryResult<ProductPage> {
        authorize(caller)?;
        let page = self.store.read(|tx| list_products(tx, query))?;
        debug!(total = page.total, returned = page.items.len(), "products listed");
        Ok(page)
    }

    /// Lazy, restartable history of one product's entries.
    ///
    /// The product must exist now; each page is then fetched in its own read transaction
    /// as the history is iterated.
    pub fn entries_for(
        &self,
        caller: Option<&Actor>,
        code: &ProductCode,
        range: Option<TimeRange>,
    ) -> InventoryResult<EntryHistory<'_, S>> {
        authorize(caller)?;
        self.store.read(|tx| get_product(tx, code))?;
        Ok(EntryHistory::new(
            &self.store,
            code.clone(),
            range,
            self.settings.history_page_size,
        ))
    }

    /// Authoritative quantity from a full ledger replay. Never writes.
    pub fn recompute(&self, caller: Option<&Actor>, code: &ProductCode) -> InventoryResult<i64> {
        authorize(caller)?;
        let page_size = self.settings.history_page_size;
        self.store.read(|tx| recompute(tx, code, page_size))
    }

    /// Products whose cached quantity disagrees with the ledger.
    pub fn verify_quantities(&self, caller: Option<&Actor>) -> InventoryResult<Vec<QuantityDrift>> {
        authorize(caller)?;
        let page_size = self.settings.history_page_size;

        let drifts = self.store.read(|tx| {
            let mut drifts = Vec::new();
            for product in tx.products()? {
                if let Some(drift) = check_drift(tx, &product, page_size)? {
                    drifts.push(drift);
                }
            }
            Ok(drifts)
        })?;

        for drift in &drifts {
            warn!(code = %drift.code, cached = drift.cached, ledger = drift.ledger, "quantity drift detected");
        }
        Ok(drifts)
    }

    /// Dashboard totals. `threshold` defaults to the configured low-stock threshold.
    pub fn snapshot(&self, caller: Option<&Actor>, threshold: Option<i64>) -> InventoryResult<AggregateSnapshot> {
        authorize(caller)?;
        let threshold = threshold.unwrap_or(self.settings.low_stock_threshold);
        let snap = self.store.read(|tx| snapshot(tx, threshold))?;
        debug!(products = snap.product_count, low_stock = snap.low_stock.len(), "snapshot computed");
        Ok(snap)
    }

    pub fn trend(&self, caller: Option<&Actor>, query: &TrendQuery) -> InventoryResult<TrendSeries> {
        authorize(caller)?;
        let series = self.store.read(|tx| trend(tx, query))?;
        debug!(
            metric = query.metric.as_str(),
            interval = query.interval.as_str(),
            points = series.points.len(),
            "trend computed"
        );
        Ok(series)
    }

    /// Top categories. `limit` defaults to the configured count.
    pub fn category_breakdown(&self, caller: Option<&Actor>, limit: Option<usize>) -> InventoryResult<Vec<CategoryCount>> {
        authorize(caller)?;
        let limit = limit.unwrap_or(self.settings.top_categories);
        self.store.read(|tx| category_breakdown(tx, limit))
    }

    /// Rows for the export collaborator: same filter and order as listing, no paging.
    pub fn export_rows(
        &self,
        caller: Option<&Actor>,
        filter: &ProductFilter,
        order: &ProductOrder,
    ) -> InventoryResult<Vec<ExportRow>> {
        authorize(caller)?;
        let rows = self.store.read(|tx| export_rows(tx, filter, order))?;
        debug!(rows = rows.len(), "export rows produced");
        Ok(rows)
    }
}
