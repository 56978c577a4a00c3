//! Tracing and logging setup shared by every stock ledger binary.

pub mod config;
pub mod tracing;

pub use config::{LogConfig, LogFormat, ParseLogFormatError};

/// Initialize process-wide tracing.
///
/// Safe to call multiple times; subsequent calls are no-ops.
pub fn init(config: &LogConfig) {
    tracing::init(config);
}
