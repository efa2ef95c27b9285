//! Configuration loading and representation.
//!
//! Every setting comes from a `STOCKBOOK_*` environment variable and has a default, so
//! an empty environment yields a working in-memory setup.

use std::time::Duration;

use stockbook_observability::LogFormat;
use thiserror::Error;

pub const DATABASE_URL: &str = "STOCKBOOK_DATABASE_URL";
pub const LOCK_TIMEOUT_MS: &str = "STOCKBOOK_LOCK_TIMEOUT_MS";
pub const HISTORY_PAGE_SIZE: &str = "STOCKBOOK_HISTORY_PAGE_SIZE";
pub const LOW_STOCK_THRESHOLD: &str = "STOCKBOOK_LOW_STOCK_THRESHOLD";
pub const TOP_CATEGORIES: &str = "STOCKBOOK_TOP_CATEGORIES";
pub const LOG_FORMAT: &str = "STOCKBOOK_LOG_FORMAT";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("{var}: expected {expected}, got '{value}'")]
    Invalid {
        var: &'static str,
        value: String,
        expected: &'static str,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StockbookConfig {
    /// `None` selects the in-memory store.
    pub database_url: Option<String>,
    /// Bound on every wait for the writer lock, a pooled connection or a busy database.
    pub lock_timeout: Duration,
    pub history_page_size: usize,
    pub low_stock_threshold: i64,
    pub top_categories: usize,
    pub log_format: LogFormat,
}

impl Default for StockbookConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            lock_timeout: Duration::from_millis(5_000),
            history_page_size: 256,
            low_stock_threshold: 5,
            top_categories: 8,
            log_format: LogFormat::Json,
        }
    }
}

impl StockbookConfig {
    pub const MAX_HISTORY_PAGE_SIZE: usize = 10_000;

    /// Read the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Read settings through `lookup`. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |var: &str| lookup(var).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let defaults = Self::default();

        let lock_timeout = match get(LOCK_TIMEOUT_MS) {
            Some(raw) => Duration::from_millis(parse_in(LOCK_TIMEOUT_MS, &raw, 1..=u64::MAX, "a positive integer (milliseconds)")?),
            None => defaults.lock_timeout,
        };
        let history_page_size = match get(HISTORY_PAGE_SIZE) {
            Some(raw) => parse_in(HISTORY_PAGE_SIZE, &raw, 1..=Self::MAX_HISTORY_PAGE_SIZE, "an integer between 1 and 10000")?,
            None => defaults.history_page_size,
        };
        let low_stock_threshold = match get(LOW_STOCK_THRESHOLD) {
            Some(raw) => parse_in(LOW_STOCK_THRESHOLD, &raw, 0..=i64::MAX, "a non-negative integer")?,
            None => defaults.low_stock_threshold,
        };
        let top_categories = match get(TOP_CATEGORIES) {
            Some(raw) => parse_in(TOP_CATEGORIES, &raw, 1..=usize::MAX, "a positive integer")?,
            None => defaults.top_categories,
        };
        let log_format = match get(LOG_FORMAT) {
            Some(raw) => raw.parse().map_err(|_| ConfigError::Invalid {
                var: LOG_FORMAT,
                value: raw,
                expected: "json, pretty or compact",
            })?,
            None => defaults.log_format,
        };

        Ok(Self {
            database_url: get(DATABASE_URL),
            lock_timeout,
            history_page_size,
            low_stock_threshold,
            top_categories,
            log_format,
        })
    }
}

fn parse_in<N>(
    var: &'static str,
    raw: &str,
    range: std::ops::RangeInclusive<N>,
    expected: &'static str,
) -> Result<N, ConfigError>
where
    N: core::str::FromStr + PartialOrd,
{
    match raw.parse::<N>() {
        Ok(n) if range.contains(&n) => Ok(n),
        _ => Err(ConfigError::Invalid {
            var,
            value: raw.to_string(),
            expected,
        }),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |var| map.get(var).cloned()
    }

    #[test]
    fn empty_environment_gives_defaults() {
        let config = StockbookConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, StockbookConfig::default());
        assert_eq!(config.lock_timeout, Duration::from_secs(5));
    }

    #[test]
    fn reads_every_variable() {
        let config = StockbookConfig::from_lookup(lookup(&[
            (DATABASE_URL, "sqlite://stock.db"),
            (LOCK_TIMEOUT_MS, "250"),
            (HISTORY_PAGE_SIZE, "32"),
            (LOW_STOCK_THRESHOLD, "0"),
            (TOP_CATEGORIES, "3"),
            (LOG_FORMAT, "Pretty"),
        ]))
        .unwrap();

        assert_eq!(config.database_url.as_deref(), Some("sqlite://stock.db"));
        assert_eq!(config.lock_timeout, Duration::from_millis(250));
        assert_eq!(config.history_page_size, 32);
        assert_eq!(config.low_stock_threshold, 0);
        assert_eq!(config.top_categories, 3);
        assert_eq!(config.log_format, LogFormat::Pretty);
    }

    #[test]
    fn blank_values_fall_back_to_defaults() {
        let config = StockbookConfig::from_lookup(lookup(&[(DATABASE_URL, "  "), (TOP_CATEGORIES, "")])).unwrap();
        assert_eq!(config.database_url, None);
        assert_eq!(config.top_categories, 8);
    }

    #[test]
    fn rejects_out_of_range_values() {
        let err = StockbookConfig::from_lookup(lookup(&[(HISTORY_PAGE_SIZE, "0")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { var: HISTORY_PAGE_SIZE, .. }));

        let err = StockbookConfig::from_lookup(lookup(&[(LOW_STOCK_THRESHOLD, "-1")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { var: LOW_STOCK_THRESHOLD, .. }));

        let err = StockbookConfig::from_lookup(lookup(&[(LOG_FORMAT, "xml")])).unwrap_err();
        assert_eq!(err.to_string(), "STOCKBOOK_LOG_FORMAT: expected json, pretty or compact, got 'xml'");
    }
}
