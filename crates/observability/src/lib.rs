//! Tracing and logging (shared setup).

/// Initialize process-wide tracing with the default configuration.
///
/// This is safe to call multiple times; subsequent calls become no-ops.
pub fn init() {
    init_with(&LogConfig::default());
}

/// Initialize process-wide tracing with an explicit configuration.
pub fn init_with(config: &LogConfig) {
    tracing::init(config);
}

/// Tracing configuration (filters, output format).
pub mod tracing;

pub use tracing::{LogConfig, LogFormat};
