//! Subcommands of the `stockbook` report binary.

use clap::Subcommand;
use serde_json::Value as JsonValue;

use stockbook_catalog::{ProductFilter, ProductOrder};
use stockbook_core::Actor;
use stockbook_infra::InventoryStore;
use stockbook_reporting::ExportRow;

use crate::service::InventoryService;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Subcommand)]
pub enum ReportCommand {
    /// Dashboard totals and the low-stock list
    Snapshot {
        /// Low-stock threshold; defaults to STOCKBOOK_LOW_STOCK_THRESHOLD
        #[arg(long)]
        threshold: Option<i64>,
    },
    /// Top categories by product count
    Categories {
        /// How many categories to list; defaults to STOCKBOOK_TOP_CATEGORIES
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Every active product, in export column order
    Export,
}

impl Default for ReportCommand {
    fn default() -> Self {
        ReportCommand::Snapshot { threshold: None }
    }
}

impl ReportCommand {
    /// Produce the report as JSON.
    pub fn run<S: InventoryStore>(
        self,
        service: &InventoryService<S>,
        caller: &Actor,
    ) -> anyhow::Result<JsonValue> {
        let value = match self {
            ReportCommand::Snapshot { threshold } => {
                serde_json::to_value(service.snapshot(Some(caller), threshold)?)?
            }
            ReportCommand::Categories { limit } => {
                serde_json::to_value(service.category_breakdown(Some(caller), limit)?)?
            }
            ReportCommand::Export => {
                let rows = service.export_rows(Some(caller), &ProductFilter::active(), &ProductOrder::default())?;
                serde_json::json!({
                    "columns": ExportRow::COLUMNS,
                    "rows": rows.iter().map(ExportRow::to_record).collect::<Vec<_>>(),
                })
            }
        };
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use stockbook_core::UserId;
    use stockbook_infra::MemoryStore;

    use super::*;

    #[test]
    fn empty_store_reports() {
        let service = InventoryService::new(MemoryStore::new());
        let caller = Actor::new(UserId::new(), "ops");

        let snapshot = ReportCommand::default().run(&service, &caller).unwrap();
        assert_eq!(snapshot["product_count"], 0);
        assert_eq!(snapshot["total_value"], "0.00");

        let export = ReportCommand::Export.run(&service, &caller).unwrap();
        assert_eq!(export["columns"][0], "code");
        assert_eq!(export["rows"].as_array().map(Vec::len), Some(0));

        let err = ReportCommand::Categories { limit: Some(0) }.run(&service, &caller).unwrap_err();
        assert!(err.to_string().contains("limit"), "{err}");
    }
}
