//! The transactional boundary shared by the Products and LedgerEntries tables.
//!
//! Domain code never sees a backend type. Commands receive `&mut dyn StoreWrite`,
//! queries `&mut dyn StoreRead`, and the store decides how the closure is isolated.

mod memory;
mod sqlite;

use std::sync::Arc;

use stockbook_catalog::{ProductReader, ProductWriter};
use stockbook_core::{InventoryResult, ProductCode, SequenceNumber, TimeRange};
use stockbook_ledger::{EntryReader, EntrySource, EntryWriter, LedgerEntry};

use crate::config::StockbookConfig;

pub use memory::{FaultPoint, MemoryStore};
pub use sqlite::SqliteStore;

/// Everything a read transaction can see.
pub trait StoreRead: ProductReader + EntryReader {}

impl<T: ProductReader + EntryReader + ?Sized> StoreRead for T {}

/// Everything a write transaction can touch.
pub trait StoreWrite: StoreRead + ProductWriter + EntryWriter {}

impl<T: StoreRead + ProductWriter + EntryWriter + ?Sized> StoreWrite for T {}

/// A store that runs closures as transactions.
///
/// `write` commits only when the closure returns `Ok`; any error discards every change
/// the closure made. Both calls give up with `StoreUnavailable` once the configured lock
/// timeout passes.
pub trait InventoryStore: EntrySource + Send + Sync {
    fn read<R, F>(&self, op: F) -> InventoryResult<R>
    where
        F: FnOnce(&mut dyn StoreRead) -> InventoryResult<R>;

    fn write<R, F>(&self, op: F) -> InventoryResult<R>
    where
        F: FnOnce(&mut dyn StoreWrite) -> InventoryResult<R>;
}

/// A shared store; lets a caller keep its own handle next to the service.
impl<T: InventoryStore> InventoryStore for Arc<T> {
    fn read<R, F>(&self, op: F) -> InventoryResult<R>
    where
        F: FnOnce(&mut dyn StoreRead) -> InventoryResult<R>,
    {
        (**self).read(op)
    }

    fn write<R, F>(&self, op: F) -> InventoryResult<R>
    where
        F: FnOnce(&mut dyn StoreWrite) -> InventoryResult<R>,
    {
        (**self).write(op)
    }
}

/// The backend selected by configuration.
#[derive(Debug)]
pub enum StoreBackend {
    Memory(MemoryStore),
    Sqlite(SqliteStore),
}

impl StoreBackend {
    /// SQLite when a database URL is configured, otherwise an empty in-memory store.
    pub fn open(config: &StockbookConfig) -> InventoryResult<Self> {
        match config.database_url.as_deref() {
            Some(url) => Ok(Self::Sqlite(SqliteStore::open(url, config.lock_timeout)?)),
            None => Ok(Self::Memory(MemoryStore::with_lock_timeout(config.lock_timeout))),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            StoreBackend::Memory(_) => "memory",
            StoreBackend::Sqlite(_) => "sqlite",
        }
    }
}

impl InventoryStore for StoreBackend {
    fn read<R, F>(&self, op: F) -> InventoryResult<R>
    where
        F: FnOnce(&mut dyn StoreRead) -> InventoryResult<R>,
    {
        match self {
            StoreBackend::Memory(store) => store.read(op),
            StoreBackend::Sqlite(store) => store.read(op),
        }
    }

    fn write<R, F>(&self, op: F) -> InventoryResult<R>
    where
        F: FnOnce(&mut dyn StoreWrite) -> InventoryResult<R>,
    {
        match self {
            StoreBackend::Memory(store) => store.write(op),
            StoreBackend::Sqlite(store) => store.write(op),
        }
    }
}

impl EntrySource for StoreBackend {
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

/// One history page, fetched in its own read transaction.
pub(crate) fn page_in_read<S: InventoryStore>(
    store: &S,
    code: &ProductCode,
    range: Option<&TimeRange>,
    after: Option<SequenceNumber>,
    limit: usize,
) -> InventoryResult<Vec<LedgerEntry>> {
    store.read(|tx| tx.entries_for(code, range, after, limit))
}
