//! Time-bucketed stock trends.
//!
//! A series has exactly one point per bucket overlapping the requested range. Each
//! point carries the running total at the end of its bucket, so gaps read as a flat
//! line.

use chrono::{DateTime, Datelike, Duration, Months, NaiveTime, Timelike, Utc};
use serde::{Deserialize, Serialize};

use stockbook_core::{InventoryError, InventoryResult, ProductCode, TimeRange};
use stockbook_ledger::{EntryReader, LedgerEntry};

/// Upper bound on points per series.
pub const MAX_BUCKETS: usize = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendMetric {
    /// Σ delta.
    #[default]
    Units,
    /// Σ delta × unit price at the time of the entry, in minor units.
    Value,
}

impl TrendMetric {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrendMetric::Units => "units",
            TrendMetric::Value => "value",
        }
    }

    fn measure(self, entry: &LedgerEntry) -> i128 {
        match self {
            TrendMetric::Units => i128::from(entry.delta),
            TrendMetric::Value => entry.value_delta(),
        }
    }
}

impl core::str::FromStr for TrendMetric {
    type Err = InventoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "units" => Ok(TrendMetric::Units),
            "value" => Ok(TrendMetric::Value),
            other => Err(InventoryError::invalid_field(
                "metric",
                format!("unknown metric '{other}'"),
            )),
        }
    }
}

/// Bucket width. All boundaries are computed in UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Interval {
    Hour,
    Day,
    /// ISO week, starting Monday 00:00.
    Week,
    /// Calendar month, starting on the 1st.
    Month,
}

impl Interval {
    pub fn as_str(&self) -> &'static str {
        match self {
            Interval::Hour => "hour",
            Interval::Day => "day",
            Interval::Week => "week",
            Interval::Month => "month",
        }
    }

    /// Start of the bucket containing `at`.
    pub fn floor(self, at: DateTime<Utc>) -> DateTime<Utc> {
        let date = at.date_naive();
        let midnight = |d: chrono::NaiveDate| d.and_time(NaiveTime::MIN).and_utc();
        match self {
            Interval::Hour => midnight(date) + Duration::hours(i64::from(at.hour())),
            Interval::Day => midnight(date),
            Interval::Week => {
                midnight(date) - Duration::days(i64::from(date.weekday().num_days_from_monday()))
            }
            Interval::Month => midnight(date) - Duration::days(i64::from(date.day0())),
        }
    }

    /// The boundary after `boundary`, or `None` past the representable range.
    pub fn next(self, boundary: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Interval::Hour => boundary.checked_add_signed(Duration::hours(1)),
            Interval::Day => boundary.checked_add_signed(Duration::days(1)),
            Interval::Week => boundary.checked_add_signed(Duration::weeks(1)),
            Interval::Month => boundary.checked_add_months(Months::new(1)),
        }
    }
}

impl core::str::FromStr for Interval {
    type Err = InventoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "hour" => Ok(Interval::Hour),
            "day" => Ok(Interval::Day),
            "week" => Ok(Interval::Week),
            "month" => Ok(Interval::Month),
            other => Err(InventoryError::invalid_field(
                "interval",
                format!("unknown interval '{other}'"),
            )),
        }
    }
}

/// Where the running total starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Baseline {
    /// Net change within the range.
    #[default]
    Zero,
    /// Seeded with the net movement before the range: absolute levels.
    Opening,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrendQuery {
    pub metric: TrendMetric,
    pub interval: Interval,
    pub range: TimeRange,
    pub product: Option<ProductCode>,
    pub baseline: Baseline,
}

impl TrendQuery {
    pub fn new(metric: TrendMetric, interval: Interval, range: TimeRange) -> Self {
        Self {
            metric,
            interval,
            range,
            product: None,
            baseline: Baseline::Zero,
        }
    }

    pub fn for_product(mut self, code: ProductCode) -> Self {
        self.product = Some(code);
        self
    }

    pub fn with_baseline(mut self, baseline: Baseline) -> Self {
        self.baseline = baseline;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrendPoint {
    /// Bucket start.
    pub at: DateTime<Utc>,
    /// Running total at the end of the bucket.
    pub value: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrendSeries {
    pub metric: TrendMetric,
    pub interval: Interval,
    pub baseline: Baseline,
    pub points: Vec<TrendPoint>,
}

/// Bucket boundaries overlapping `range`, the first one being the floor of its start.
pub fn buckets(interval: Interval, range: &TimeRange) -> InventoryResult<Vec<DateTime<Utc>>> {
    let mut out = Vec::new();
    let mut boundary = interval.floor(range.start());

    while boundary < range.end() {
        if out.len() == MAX_BUCKETS {
            return Err(InventoryError::invalid_field(
                "range",
                format!("more than {MAX_BUCKETS} {} buckets", interval.as_str()),
            ));
        }
        out.push(boundary);
        boundary = match interval.next(boundary) {
            Some(next) => next,
            None => break,
        };
    }

    Ok(out)
}

/// Compute a trend series inside one read transaction.
pub fn trend<T>(tx: &mut T, query: &TrendQuery) -> InventoryResult<TrendSeries>
where
    T: EntryReader + ?Sized,
{
    let boundaries = buckets(query.interval, &query.range)?;
    let opening = match query.baseline {
        Baseline::Zero => 0,
        Baseline::Opening => {
            let totals = tx.totals_before(query.range.start(), query.product.as_ref())?;
            match query.metric {
                TrendMetric::Units => i128::from(totals.units),
                TrendMetric::Value => totals.value_minor,
            }
        }
    };
    let entries = tx.entries_between(&query.range, query.product.as_ref())?;
    let points = build_series(query.metric, &boundaries, &entries, opening)?;

    Ok(TrendSeries {
        metric: query.metric,
        interval: query.interval,
        baseline: query.baseline,
        points,
    })
}

/// Pure half of [`trend`]: fold `entries` into `boundaries` (ascending) starting from
/// `opening`. Entries before the first boundary are ignored.
pub fn build_series(
    metric: TrendMetric,
    boundaries: &[DateTime<Utc>],
    entries: &[LedgerEntry],
    opening: i128,
) -> InventoryResult<Vec<TrendPoint>> {
    let overflow = || InventoryError::invalid_field(metric.as_str(), "running total overflows");

    let mut per_bucket = vec![0i128; boundaries.len()];
    for entry in entries {
        let idx = boundaries.partition_point(|b| *b <= entry.recorded_at);
        if idx == 0 {
            continue;
        }
        let slot = &mut per_bucket[idx - 1];
        *slot = slot.checked_add(metric.measure(entry)).ok_or_else(overflow)?;
    }

    let mut running = opening;
    per_bucket
        .into_iter()
        .zip(boundaries)
        .map(|(sum, at)| {
            running = running.checked_add(sum).ok_or_else(overflow)?;
            let value = i64::try_from(running).map_err(|_| overflow())?;
            Ok(TrendPoint { at: *at, value })
        })
        .collect()
}
