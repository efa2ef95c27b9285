//! Query/Command façade over the inventory engine.
//!
//! [`InventoryService`] is the only entry point the presentation layer and the export
//! collaborator use. It checks the caller, stamps time, and runs every command in one
//! store transaction.

pub mod authz;
pub mod cli;
pub mod report;
pub mod service;
pub mod settings;

pub use cli::Cli;
pub use report::ReportCommand;
pub use service::{InventoryService, Removal};
pub use settings::ServiceSettings;
