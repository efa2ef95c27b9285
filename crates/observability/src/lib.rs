//! Tracing and logging setup shared by every stockbook binary.

/// Initialize process-wide logging with the default JSON output.
///
/// This is safe to call multiple times; subsequent calls become no-ops.
pub fn init() {
    tracing::init_with(LogFormat::Json);
}

/// Initialize process-wide logging in the given output format.
pub fn init_with(format: LogFormat) {
    tracing::init_with(format);
}

/// Tracing configuration (filters, formats).
pub mod tracing;

pub use tracing::{LogFormat, UnknownLogFormat};
