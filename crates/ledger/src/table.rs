use chrono::{DateTime, Utc};

use stockbook_core::{InventoryResult, ProductCode, SequenceNumber, TimeRange};

use crate::entry::{LedgerEntry, MovementTotals};

/// Read access to the LedgerEntries table inside a store transaction.
pub trait EntryReader {
    /// Entries for `code` with sequence greater than `after`, recorded inside `range`
    /// when one is given, ordered by sequence ascending, at most `limit` of them.
    fn entries_for(
        &mut self,
        code: &ProductCode,
        range: Option<&TimeRange>,
        after: Option<SequenceNumber>,
        limit: usize,
    ) -> InventoryResult<Vec<LedgerEntry>>;

    /// Every entry recorded inside `range` (optionally for one product), ordered by sequence.
    fn entries_between(
        &mut self,
        range: &TimeRange,
        product: Option<&ProductCode>,
    ) -> InventoryResult<Vec<LedgerEntry>>;

    /// Net movement of every entry recorded strictly before `at`.
    fn totals_before(
        &mut self,
        at: DateTime<Utc>,
        product: Option<&ProductCode>,
    ) -> InventoryResult<MovementTotals>;
}

/// Append access to the LedgerEntries table.
///
/// There is no update or delete: committed entries are immutable.
pub trait EntryWriter: EntryReader {
    /// The sequence number the next inserted entry must carry.
    fn next_sequence(&mut self) -> InventoryResult<SequenceNumber>;

    /// Fails with `Conflict` if the sequence number is already taken.
    fn insert_entry(&mut self, entry: &LedgerEntry) -> InventoryResult<()>;
}
