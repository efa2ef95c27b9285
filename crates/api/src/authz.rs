//! Caller check applied at the façade boundary, before any store access.

use stockbook_core::{Actor, InventoryError, InventoryResult};

/// Accept a caller only if the auth gate supplied a usable identity.
pub fn authorize(caller: Option<&Actor>) -> InventoryResult<&Actor> {
    match caller {
        Some(actor) if actor.is_valid() => Ok(actor),
        Some(_) => {
            tracing::warn!("rejected caller with blank username");
            Err(InventoryError::Unauthorized)
        }
        None => {
            tracing::warn!("rejected anonymous caller");
            Err(InventoryError::Unauthorized)
        }
    }
}
