//! Aggregation Engine: dashboard and report views derived from the catalog and ledger.
//!
//! Each entry point reads through a single store transaction and returns an owned value.
//! The pure halves (`summarize`, `build_series`, `rank_categories`) take plain data so
//! they can be exercised without a store.

pub mod categories;
pub mod export;
pub mod snapshot;
pub mod trend;

pub use categories::{CategoryCount, UNCATEGORIZED, category_breakdown, rank_categories};
pub use export::{ExportRow, export_rows};
pub use snapshot::{AggregateSnapshot, LowStockItem, snapshot, summarize};
pub use trend::{
    Baseline, Interval, MAX_BUCKETS, TrendMetric, TrendPoint, TrendQuery, TrendSeries, buckets,
    build_series, trend,
};
