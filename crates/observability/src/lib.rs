//! Tracing/logging setup shared by the API and worker binaries.

/// Filter applied when `RUST_LOG` is unset or unparsable.
pub const DEFAULT_FILTER: &str = "info";

/// Initialize process-wide structured logging.
///
/// This is safe to call multiple times; subsequent calls become no-ops.
pub fn init() {
    tracing::init(DEFAULT_FILTER);
}

/// Tracing configuration (filters, layers).
pub mod tracing;
