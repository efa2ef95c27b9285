//! Error taxonomy shared by every layer of the engine.

use thiserror::Error;

/// Result type used across the inventory engine.
pub type InventoryResult<T> = Result<T, InventoryError>;

/// Inventory engine error.
///
/// Only `StoreUnavailable` is transient. Every other kind describes a request that
/// would fail the same way again, so callers should report it rather than retry.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InventoryError {
    /// A caller-supplied value has the wrong shape or range.
    #[error("invalid {field}: {reason}")]
    InvalidField { field: &'static str, reason: String },

    /// A product with this code already exists.
    #[error("product '{0}' already exists")]
    DuplicateKey(String),

    /// The referenced record does not exist (or is not usable in this state).
    #[error("not found: {0}")]
    NotFound(String),

    /// The request conflicts with the current state of the store.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Applying the movement would leave the product with negative stock.
    #[error("insufficient stock for '{code}': attempted {attempted}, available {available}")]
    NegativeStock {
        code: String,
        attempted: i64,
        available: i64,
    },

    /// No (or an invalid) authenticated identity was supplied.
    #[error("unauthorized")]
    Unauthorized,

    /// The underlying store could not complete the transaction in time.
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),
}

impl InventoryError {
    pub fn invalid_field(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidField {
            field,
            reason: reason.into(),
        }
    }

    pub fn duplicate_key(code: impl Into<String>) -> Self {
        Self::DuplicateKey(code.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::StoreUnavailable(msg.into())
    }

    /// Whether retrying the same request (with backoff) can succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::StoreUnavailable(_))
    }

    /// Stable machine-readable kind, for logs and presentation-layer mapping.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidField { .. } => "invalid_field",
            Self::DuplicateKey(_) => "duplicate_key",
            Self::NotFound(_) => "not_found",
            Self::Conflict(_) => "conflict",
            Self::NegativeStock { .. } => "negative_stock",
            Self::Unauthorized => "unauthorized",
            Self::StoreUnavailable(_) => "store_unavailable",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_store_unavailable_is_retryable() {
        assert!(InventoryError::unavailable("lock timeout").is_retryable());
        assert!(!InventoryError::invalid_field("name", "empty").is_retryable());
        assert!(!InventoryError::duplicate_key("SKU1").is_retryable());
        assert!(!InventoryError::not_found("product 'SKU1'").is_retryable());
        assert!(!InventoryError::conflict("referenced").is_retryable());
        assert!(!InventoryError::Unauthorized.is_retryable());
    }

    #[test]
    fn negative_stock_reports_both_quantities() {
        let err = InventoryError::NegativeStock {
            code: "SKU1".to_string(),
            attempted: -100,
            available: 7,
        };
        let msg = err.to_string();
        assert!(msg.contains("-100"));
        assert!(msg.contains('7'));
        assert_eq!(err.kind(), "negative_stock");
    }
}
