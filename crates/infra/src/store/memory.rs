//! In-memory store.
//!
//! Readers take a snapshot (`Arc` clone) of the committed tables and never wait on a
//! writer. Writers are serialized by a gate, work on a private copy and publish it with
//! a pointer swap on success.

use std::collections::BTreeMap;
use std::sync::{Arc, Condvar, Mutex, PoisonError, RwLock};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use stockbook_catalog::{Product, ProductReader, ProductWriter};
use stockbook_core::{InventoryError, InventoryResult, ProductCode, SequenceNumber, TimeRange};
use stockbook_ledger::{EntryReader, EntrySource, EntryWriter, LedgerEntry, MovementTotals};

use super::{InventoryStore, StoreRead, StoreWrite, page_in_read};

const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Default)]
struct Tables {
    products: BTreeMap<ProductCode, Product>,
    /// Sequence order.
    entries: Vec<LedgerEntry>,
    /// Positions in `entries` per product, ascending.
    by_product: BTreeMap<ProductCode, Vec<usize>>,
}

impl Tables {
    fn product_entries<'a>(&'a self, code: &ProductCode) -> impl Iterator<Item = &'a LedgerEntry> + 'a {
        self.by_product
            .get(code)
            .into_iter()
            .flatten()
            .map(|&idx| &self.entries[idx])
    }

    fn entries_for(
        &self,
        code: &ProductCode,
        range: Option<&TimeRange>,
        after: Option<SequenceNumber>,
        limit: usize,
    ) -> Vec<LedgerEntry> {
        self.product_entries(code)
            .filter(|e| after.is_none_or(|a| e.sequence > a))
            .filter(|e| range.is_none_or(|r| r.contains(e.recorded_at)))
            .take(limit)
            .cloned()
            .collect()
    }

    fn entries_between(&self, range: &TimeRange, product: Option<&ProductCode>) -> Vec<LedgerEntry> {
        let in_range = |e: &&LedgerEntry| range.contains(e.recorded_at);
        match product {
            Some(code) => self.product_entries(code).filter(in_range).cloned().collect(),
            None => self.entries.iter().filter(in_range).cloned().collect(),
        }
    }

    fn totals_before(&self, at: DateTime<Utc>, product: Option<&ProductCode>) -> InventoryResult<MovementTotals> {
        let mut totals = MovementTotals::default();
        let earlier = |e: &&LedgerEntry| e.recorded_at < at;
        match product {
            Some(code) => self.product_entries(code).filter(earlier).try_for_each(|e| totals.add(e))?,
            None => self.entries.iter().filter(earlier).try_for_each(|e| totals.add(e))?,
        }
        Ok(totals)
    }
}

/// Where an injected failure fires inside the next write transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultPoint {
    /// Before a product row is inserted or updated.
    ProductWrite,
    /// Before a ledger entry is inserted.
    EntryWrite,
}

/// Copy-on-write in-memory store.
#[derive(Debug)]
pub struct MemoryStore {
    committed: RwLock<Arc<Tables>>,
    writer: WriterGate,
    lock_timeout: Duration,
    fault: Mutex<Option<FaultPoint>>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::with_lock_timeout(DEFAULT_LOCK_TIMEOUT)
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_lock_timeout(lock_timeout: Duration) -> Self {
        Self {
            committed: RwLock::new(Arc::new(Tables::default())),
            writer: WriterGate::default(),
            lock_timeout,
            fault: Mutex::new(None),
        }
    }

    /// Make the next write transaction fail at `point`. Fires once.
    pub fn fail_on(&self, point: FaultPoint) {
        *self.fault.lock().unwrap_or_else(PoisonError::into_inner) = Some(point);
    }

    fn snapshot(&self) -> InventoryResult<Arc<Tables>> {
        let committed = self
            .committed
            .read()
            .map_err(|_| InventoryError::unavailable("memory store lock poisoned"))?;
        Ok(Arc::clone(&committed))
    }

    fn publish(&self, tables: Tables) -> InventoryResult<()> {
        let mut committed = self
            .committed
            .write()
            .map_err(|_| InventoryError::unavailable("memory store lock poisoned"))?;
        *committed = Arc::new(tables);
        Ok(())
    }

    fn take_fault(&self) -> Option<FaultPoint> {
        self.fault.lock().unwrap_or_else(PoisonError::into_inner).take()
    }
}

impl InventoryStore for MemoryStore {
    fn read<R, F>(&self, op: F) -> InventoryResult<R>
    where
        F: FnOnce(&mut dyn StoreRead) -> InventoryResult<R>,
    {
        let snapshot = self.snapshot()?;
        let mut view = MemoryView { tables: &snapshot };
        op(&mut view)
    }

    fn write<R, F>(&self, op: F) -> InventoryResult<R>
    where
        F: FnOnce(&mut dyn StoreWrite) -> InventoryResult<R>,
    {
        let _permit = self.writer.acquire(self.lock_timeout)?;
        let base = self.snapshot()?;
        let mut tx = MemoryTx {
            tables: Tables::clone(&base),
            fault: self.take_fault(),
        };

        match op(&mut tx) {
            Ok(out) => {
                self.publish(tx.tables)?;
                debug!("memory transaction committed");
                Ok(out)
            }
            Err(err) => {
                debug!(error = %err, "memory transaction rolled back");
                Err(err)
            }
        }
    }
}

impl EntrySource for MemoryStore {
    fn entry_page(
        &self,
        code: &ProductCode,
        range: Option<&TimeRange>,
        after: Option<SequenceNumber>,
        limit: usize,
    ) -> InventoryResult<Vec<LedgerEntry>> {
        page_in_read(self, code, range, after, limit)
    }
}

/// Single-writer gate with a bounded wait.
#[derive(Debug, Default)]
struct WriterGate {
    busy: Mutex<bool>,
    released: Condvar,
}

impl WriterGate {
    fn acquire(&self, timeout: Duration) -> InventoryResult<WriterPermit<'_>> {
        let deadline = Instant::now() + timeout;
        let mut busy = self
            .busy
            .lock()
            .map_err(|_| InventoryError::unavailable("writer gate poisoned"))?;

        while *busy {
            let now = Instant::now();
            if now >= deadline {
                warn!(timeout_ms = timeout.as_millis() as u64, "timed out waiting for the writer lock");
                return Err(InventoryError::unavailable("timed out waiting for the writer lock"));
            }
            let (guard, _) = self
                .released
                .wait_timeout(busy, deadline - now)
                .map_err(|_| InventoryError::unavailable("writer gate poisoned"))?;
            busy = guard;
        }

        *busy = true;
        Ok(WriterPermit { gate: self })
    }
}

struct WriterPermit<'a> {
    gate: &'a WriterGate,
}

impl Drop for WriterPermit<'_> {
    fn drop(&mut self) {
        *self.gate.busy.lock().unwrap_or_else(PoisonError::into_inner) = false;
        self.gate.released.notify_one();
    }
}

/// Read view over a committed snapshot.
struct MemoryView<'a> {
    tables: &'a Tables,
}

impl ProductReader for MemoryView<'_> {
    fn product(&mut self, code: &ProductCode) -> InventoryResult<Option<Product>> {
        Ok(self.tables.products.get(code).cloned())
    }

    fn products(&mut self) -> InventoryResult<Vec<Product>> {
        Ok(self.tables.products.values().cloned().collect())
    }

    fn ledger_references(&mut self, code: &ProductCode) -> InventoryResult<u64> {
        Ok(self.tables.by_product.get(code).map_or(0, |v| v.len() as u64))
    }
}

impl EntryReader for MemoryView<'_> {
    fn entries_for(
        &mut self,
        code: &ProductCode,
        range: Option<&TimeRange>,
        after: Option<SequenceNumber>,
        limit: usize,
    ) -> InventoryResult<Vec<LedgerEntry>> {
        Ok(self.tables.entries_for(code, range, after, limit))
    }

    fn entries_between(
        &mut self,
        range: &TimeRange,
        product: Option<&ProductCode>,
    ) -> InventoryResult<Vec<LedgerEntry>> {
        Ok(self.tables.entries_between(range, product))
    }

    fn totals_before(
        &mut self,
        at: DateTime<Utc>,
        product: Option<&ProductCode>,
    ) -> InventoryResult<MovementTotals> {
        self.tables.totals_before(at, product)
    }
}

/// Private working copy of a write transaction.
struct MemoryTx {
    tables: Tables,
    fault: Option<FaultPoint>,
}

impl MemoryTx {
    fn trip(&mut self, point: FaultPoint) -> InventoryResult<()> {
        if self.fault == Some(point) {
            self.fault = None;
            return Err(InventoryError::unavailable(format!("injected fault at {point:?}")));
        }
        Ok(())
    }
}

impl ProductReader for MemoryTx {
    fn product(&mut self, code: &ProductCode) -> InventoryResult<Option<Product>> {
        Ok(self.tables.products.get(code).cloned())
    }

    fn products(&mut self) -> InventoryResult<Vec<Product>> {
        Ok(self.tables.products.values().cloned().collect())
    }

    fn ledger_references(&mut self, code: &ProductCode) -> InventoryResult<u64> {
        Ok(self.tables.by_product.get(code).map_or(0, |v| v.len() as u64))
    }
}

impl ProductWriter for MemoryTx {
    fn insert_product(&mut self, product: &Product) -> InventoryResult<()> {
        self.trip(FaultPoint::ProductWrite)?;
        if self.tables.products.contains_key(&product.code) {
            return Err(InventoryError::duplicate_key(product.code.as_str()));
        }
        self.tables.products.insert(product.code.clone(), product.clone());
        Ok(())
    }

    fn update_product(&mut self, product: &Product) -> InventoryResult<()> {
        self.trip(FaultPoint::ProductWrite)?;
        match self.tables.products.get_mut(&product.code) {
            Some(slot) => {
                *slot = product.clone();
                Ok(())
            }
            None => Err(InventoryError::not_found(format!("product '{}'", product.code))),
        }
    }

    fn remove_product(&mut self, code: &ProductCode) -> InventoryResult<()> {
        self.tables.products.remove(code);
        Ok(())
    }
}

impl EntryReader for MemoryTx {
    fn entries_for(
        &mut self,
        code: &ProductCode,
        range: Option<&TimeRange>,
        after: Option<SequenceNumber>,
        limit: usize,
    ) -> InventoryResult<Vec<LedgerEntry>> {
        Ok(self.tables.entries_for(code, range, after, limit))
    }

    fn entries_between(
        &mut self,
        range: &TimeRange,
        product: Option<&ProductCode>,
    ) -> InventoryResult<Vec<LedgerEntry>> {
        Ok(self.tables.entries_between(range, product))
    }

    fn totals_before(
        &mut self,
        at: DateTime<Utc>,
        product: Option<&ProductCode>,
    ) -> InventoryResult<MovementTotals> {
        self.tables.totals_before(at, product)
    }
}

impl EntryWriter for MemoryTx {
    fn next_sequence(&mut self) -> InventoryResult<SequenceNumber> {
        Ok(self
            .tables
            .entries
            .last()
            .map_or(SequenceNumber::FIRST, |e| e.sequence.next()))
    }

    fn insert_entry(&mut self, entry: &LedgerEntry) -> InventoryResult<()> {
        self.trip(FaultPoint::EntryWrite)?;
        if self.tables.entries.last().is_some_and(|last| last.sequence >= entry.sequence) {
            return Err(InventoryError::conflict(format!(
                "ledger sequence {} already taken",
                entry.sequence
            )));
        }
        let idx = self.tables.entries.len();
        self.tables.entries.push(entry.clone());
        self.tables
            .by_product
            .entry(entry.product_code.clone())
            .or_default()
            .push(idx);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use chrono::TimeZone;
    use stockbook_catalog::{NewProduct, create_product, get_product};
    use stockbook_core::{Money, UserId};
    use stockbook_ledger::{Movement, Reason, append};

    use super::*;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    fn code(s: &str) -> ProductCode {
        ProductCode::new(s).unwrap()
    }

    fn seed(store: &MemoryStore, c: &str) {
        store
            .write(|tx| {
                create_product(
                    tx,
                    NewProduct {
                        code: code(c),
                        name: "Widget".to_string(),
                        price: Money::from_minor(500),
                        category: None,
                    },
                    t0(),
                )
            })
            .unwrap();
    }

    #[test]
    fn failed_write_publishes_nothing() {
        let store = MemoryStore::new();
        seed(&store, "A");

        let err = store
            .write(|tx| {
                append(tx, Movement::new(code("A"), 5, Reason::Receipt), UserId::new(), t0())?;
                Err::<(), _>(InventoryError::conflict("abort"))
            })
            .unwrap_err();
        assert!(matches!(err, InventoryError::Conflict(_)));

        let (qty, refs) = store
            .read(|tx| Ok((get_product(tx, &code("A"))?.quantity, tx.ledger_references(&code("A"))?)))
            .unwrap();
        assert_eq!((qty, refs), (0, 0));
    }

    #[test]
    fn injected_fault_fires_once() {
        let store = MemoryStore::new();
        seed(&store, "A");
        store.fail_on(FaultPoint::ProductWrite);

        let movement = Movement::new(code("A"), 5, Reason::Receipt);
        let err = store
            .write(|tx| append(tx, movement.clone(), UserId::new(), t0()))
            .unwrap_err();
        assert!(err.is_retryable());

        let entry = store.write(|tx| append(tx, movement, UserId::new(), t0())).unwrap();
        assert_eq!(entry.sequence, SequenceNumber::FIRST);
    }

    #[test]
    fn reader_snapshot_is_stable_during_a_write() {
        let store = MemoryStore::new();
        seed(&store, "A");

        store
            .write(|tx| {
                append(tx, Movement::new(code("A"), 3, Reason::Receipt), UserId::new(), t0())?;
                // A concurrent reader still sees the committed state.
                let seen = store.read(|r| Ok(get_product(r, &code("A"))?.quantity))?;
                assert_eq!(seen, 0);
                Ok(())
            })
            .unwrap();

        let after = store.read(|r| Ok(get_product(r, &code("A"))?.quantity)).unwrap();
        assert_eq!(after, 3);
    }

    #[test]
    fn second_writer_times_out() {
        let store = Arc::new(MemoryStore::with_lock_timeout(Duration::from_millis(20)));
        seed(&store, "A");

        let inner = Arc::clone(&store);
        let err = store
            .write(move |_| {
                let blocked = thread::spawn(move || inner.write(|_| Ok(())));
                blocked.join().map_err(|_| InventoryError::conflict("writer thread panicked"))?
            })
            .unwrap_err();
        assert!(matches!(err, InventoryError::StoreUnavailable(_)));

        // The gate is released afterwards.
        store.write(|_| Ok(())).unwrap();
    }

    #[test]
    fn writers_serialize_without_losing_updates() {
        let store = Arc::new(MemoryStore::new());
        seed(&store, "A");

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    for _ in 0..25 {
                        store
                            .write(|tx| append(tx, Movement::new(code("A"), 1, Reason::Receipt), UserId::new(), t0()))
                            .unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let (qty, refs) = store
            .read(|tx| Ok((get_product(tx, &code("A"))?.quantity, tx.ledger_references(&code("A"))?)))
            .unwrap();
        assert_eq!((qty, refs), (200, 200));
    }

    #[test]
    fn pages_come_from_separate_reads() {
        let store = MemoryStore::new();
        seed(&store, "A");
        for _ in 0..5 {
            store
                .write(|tx| append(tx, Movement::new(code("A"), 1, Reason::Receipt), UserId::new(), t0()))
                .unwrap();
        }

        let first = store.entry_page(&code("A"), None, None, 2).unwrap();
        let rest = store.entry_page(&code("A"), None, Some(first[1].sequence), 10).unwrap();
        assert_eq!(first.len() + rest.len(), 5);
        assert_eq!(rest[0].sequence.value(), 3);
    }
}
