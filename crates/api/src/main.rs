use std::io::Write;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use stockbook_api::{Cli, InventoryService, ServiceSettings};
use stockbook_core::{Actor, SystemClock, UserId};
use stockbook_infra::{StockbookConfig, StoreBackend};

fn main() -> anyhow::Result<()> {
    let command = Cli::parse().report();
    let config = StockbookConfig::from_env().context("invalid stockbook configuration")?;
    stockbook_observability::init_with(config.log_format);

    let username = std::env::var("USER").unwrap_or_else(|_| {
        tracing::warn!("USER not set; reporting as 'stockbook'");
        "stockbook".to_string()
    });
    let caller = Actor::new(UserId::new(), username);

    let store = StoreBackend::open(&config).context("failed to open the inventory store")?;
    tracing::info!(backend = store.kind(), ?command, "running report");

    let service = InventoryService::with_settings(store, ServiceSettings::from(&config), Arc::new(SystemClock));
    let report = command.run(&service, &caller)?;

    let mut stdout = std::io::stdout().lock();
    serde_json::to_writer_pretty(&mut stdout, &report).context("failed to write report")?;
    writeln!(stdout)?;
    Ok(())
}
