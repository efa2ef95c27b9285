use stockbook_infra::StockbookConfig;

/// Reporting defaults the façade applies when a caller does not supply its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceSettings {
    pub history_page_size: usize,
    pub low_stock_threshold: i64,
    pub top_categories: usize,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self::from(&StockbookConfig::default())
    }
}

impl From<&StockbookConfig> for ServiceSettings {
    fn from(config: &StockbookConfig) -> Self {
        Self {
            history_page_size: config.history_page_size,
            low_stock_threshold: config.low_stock_threshold,
            top_categories: config.top_categories,
        }
    }
}
