//! Streaming a product's ledger in sequence order.

use std::fmt;
use std::sync::Arc;

use stockbook_core::{InventoryResult, ProductCode, SequenceNumber, TimeRange};

use crate::entry::LedgerEntry;

/// Something that can hand out one page of a product's ledger at a time.
///
/// Each call is its own read; a page never holds a store lock past its return.
pub trait EntrySource {
    fn entry_page(
        &self,
        code: &ProductCode,
        range: Option<&TimeRange>,
        after: Option<SequenceNumber>,
        limit: usize,
    ) -> InventoryResult<Vec<LedgerEntry>>;
}

impl<S: EntrySource + ?Sized> EntrySource for Arc<S> {
    fn entry_page(
        &self,
        code: &ProductCode,
        range: Option<&TimeRange>,
        after: Option<SequenceNumber>,
        limit: usize,
    ) -> InventoryResult<Vec<LedgerEntry>> {
        (**self).entry_page(code, range, after, limit)
    }
}

/// A restartable view over a product's entries. Iterate it as often as needed.
pub struct EntryHistory<'a, S: EntrySource + ?Sized> {
    source: &'a S,
    code: ProductCode,
    range: Option<TimeRange>,
    page_size: usize,
}

impl<'a, S: EntrySource + ?Sized> EntryHistory<'a, S> {
    pub fn new(source: &'a S, code: ProductCode, range: Option<TimeRange>, page_size: usize) -> Self {
        Self {
            source,
            code,
            range,
            page_size: page_size.max(1),
        }
    }

    pub fn code(&self) -> &ProductCode {
        &self.code
    }

    pub fn iter(&self) -> EntryIter<'_, S> {
        EntryIter {
            source: self.source,
            code: &self.code,
            range: self.range.as_ref(),
            page_size: self.page_size,
            after: None,
            buffer: Vec::new().into_iter(),
            exhausted: false,
        }
    }

    /// Drain the whole history into memory, stopping at the first error.
    pub fn collect_all(&self) -> InventoryResult<Vec<LedgerEntry>> {
        self.iter().collect()
    }
}

impl<S: EntrySource + ?Sized> fmt::Debug for EntryHistory<'_, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntryHistory")
            .field("code", &self.code)
            .field("range", &self.range)
            .field("page_size", &self.page_size)
            .finish_non_exhaustive()
    }
}

impl<'h, 'a, S: EntrySource + ?Sized> IntoIterator for &'h EntryHistory<'a, S> {
    type Item = InventoryResult<LedgerEntry>;
    type IntoIter = EntryIter<'h, S>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Keyset pager over an [`EntrySource`]. Fused: after the last entry or an error it
/// keeps returning `None`.
pub struct EntryIter<'h, S: EntrySource + ?Sized> {
    source: &'h S,
    code: &'h ProductCode,
    range: Option<&'h TimeRange>,
    page_size: usize,
    after: Option<SequenceNumber>,
    buffer: std::vec::IntoIter<LedgerEntry>,
    exhausted: bool,
}

impl<S: EntrySource + ?Sized> Iterator for EntryIter<'_, S> {
    type Item = InventoryResult<LedgerEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(entry) = self.buffer.next() {
            self.after = Some(entry.sequence);
            return Some(Ok(entry));
        }
        if self.exhausted {
            return None;
        }

        match self
            .source
            .entry_page(self.code, self.range, self.after, self.page_size)
        {
            Ok(page) => {
                if page.len() < self.page_size {
                    self.exhausted = true;
                }
                self.buffer = page.into_iter();
                let entry = self.buffer.next()?;
                self.after = Some(entry.sequence);
                Some(Ok(entry))
            }
            Err(err) => {
                self.exhausted = true;
                Some(Err(err))
            }
        }
    }
}

impl<S: EntrySource + ?Sized> std::iter::FusedIterator for EntryIter<'_, S> {}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use chrono::{Duration, TimeZone, Utc};
    use stockbook_core::{InventoryError, Money, UserId};

    use super::*;
    use crate::entry::Reason;

    struct VecSource {
        entries: Vec<LedgerEntry>,
        calls: Cell<usize>,
        fail_on_call: Option<usize>,
    }

    impl VecSource {
        fn new(n: u64) -> Self {
            let t0 = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
            let user = UserId::new();
            let entries = (1..=n)
                .map(|i| LedgerEntry {
                    sequence: SequenceNumber::new(i),
                    product_code: ProductCode::new(if i % 2 == 0 { "EVEN" } else { "ODD" }).unwrap(),
                    delta: 1,
                    reason: Reason::Receipt,
                    unit_price: Money::from_minor(100),
                    recorded_at: t0 + Duration::hours(i as i64),
                    recorded_by: user,
                    note: None,
                })
                .collect();
            Self {
                entries,
                calls: Cell::new(0),
                fail_on_call: None,
            }
        }
    }

    impl EntrySource for VecSource {
        fn entry_page(
            &self,
            code: &ProductCode,
            range: Option<&TimeRange>,
            after: Option<SequenceNumber>,
            limit: usize,
        ) -> InventoryResult<Vec<LedgerEntry>> {
            let call = self.calls.get() + 1;
            self.calls.set(call);
            if self.fail_on_call == Some(call) {
                return Err(InventoryError::unavailable("disk on fire"));
            }
            Ok(self
                .entries
                .iter()
                .filter(|e| &e.product_code == code)
                .filter(|e| after.is_none_or(|a| e.sequence > a))
                .filter(|e| range.is_none_or(|r| r.contains(e.recorded_at)))
                .take(limit)
                .cloned()
                .collect())
        }
    }

    fn sequences(entries: &[LedgerEntry]) -> Vec<u64> {
        entries.iter().map(|e| e.sequence.value()).collect()
    }

    #[test]
    fn pages_through_in_sequence_order() {
        let source = VecSource::new(20);
        let history = EntryHistory::new(&source, ProductCode::new("ODD").unwrap(), None, 3);

        let all = history.collect_all().unwrap();
        assert_eq!(sequences(&all), vec![1, 3, 5, 7, 9, 11, 13, 15, 17, 19]);
        // 10 entries in pages of 3: four pages, the last one short.
        assert_eq!(source.calls.get(), 4);
    }

    #[test]
    fn history_is_restartable() {
        let source = VecSource::new(6);
        let history = EntryHistory::new(&source, ProductCode::new("EVEN").unwrap(), None, 2);

        let first: Vec<_> = history.iter().map(Result::unwrap).collect();
        let mut second = Vec::new();
        for entry in &history {
            second.push(entry.unwrap());
        }
        assert_eq!(first, second);
    }

    #[test]
    fn range_limits_the_window() {
        let source = VecSource::new(10);
        let t0 = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        let range = TimeRange::new(t0 + Duration::hours(3), t0 + Duration::hours(7)).unwrap();
        let history = EntryHistory::new(&source, ProductCode::new("ODD").unwrap(), Some(range), 100);

        assert_eq!(sequences(&history.collect_all().unwrap()), vec![3, 5]);
    }

    #[test]
    fn error_ends_the_iteration() {
        let mut source = VecSource::new(10);
        source.fail_on_call = Some(2);
        let history = EntryHistory::new(&source, ProductCode::new("ODD").unwrap(), None, 2);

        let mut iter = history.iter();
        assert!(iter.next().unwrap().is_ok());
        assert!(iter.next().unwrap().is_ok());
        assert!(iter.next().unwrap().is_err());
        assert!(iter.next().is_none());
        assert!(iter.next().is_none());
    }

    #[test]
    fn debug_output_does_not_touch_the_source() {
        let source = VecSource::new(4);
        let history = EntryHistory::new(&source, ProductCode::new("ODD").unwrap(), None, 3);

        let shown = format!("{history:?}");
        assert!(shown.contains("ODD"), "{shown}");
        assert!(shown.contains("page_size: 3"), "{shown}");
        assert_eq!(source.calls.get(), 0);
    }

    #[test]
    fn unknown_product_yields_nothing() {
        let source = VecSource::new(4);
        let history = EntryHistory::new(&source, ProductCode::new("NONE").unwrap(), None, 8);
        assert!(history.collect_all().unwrap().is_empty());
    }
}
