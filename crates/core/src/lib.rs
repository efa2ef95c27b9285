//! `stockbook-core`: shared building blocks for the inventory engine.
//!
//! Pure types only: identifiers, fixed-point money, the caller identity handed in
//! by the auth gate, time ranges, and the error taxonomy every layer reports with.

pub mod actor;
pub mod error;
pub mod id;
pub mod money;
pub mod time;

pub use actor::Actor;
pub use error::{InventoryError, InventoryResult};
pub use id::{ProductCode, SequenceNumber, UserId};
pub use money::Money;
pub use time::{Clock, ManualClock, SystemClock, TimeRange};
