//! Infrastructure layer: transactional stores and configuration.

pub mod config;
pub mod store;

pub use config::{ConfigError, StockbookConfig};
pub use store::{
    FaultPoint, InventoryStore, MemoryStore, SqliteStore, StoreBackend, StoreRead, StoreWrite,
};
