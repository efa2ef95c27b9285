//! Stock Ledger: the append-only log of stock movements.
//!
//! The ledger is the source of truth for quantities. Every append also refreshes the
//! product's cached quantity, in the same store transaction.

pub mod entry;
pub mod history;
pub mod ledger;
pub mod table;

pub use entry::{LedgerEntry, Movement, MovementTotals, Reason};
pub use history::{EntryHistory, EntryIter, EntrySource};
pub use ledger::{CacheRepair, QuantityDrift, append, check_drift, recompute, repair_quantity};
pub use table::{EntryReader, EntryWriter};
