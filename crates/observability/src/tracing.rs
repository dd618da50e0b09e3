//! Tracing/logging initialization.

use tracing_subscriber::EnvFilter;

/// Initialize JSON logging filtered by `RUST_LOG`, falling back to
/// `default_filter`.
///
/// Safe to call multiple times (subsequent calls are no-ops).
pub fn init(default_filter: &str) {
    let filter = build_filter(std::env::var("RUST_LOG").ok().as_deref(), default_filter);

    // JSON logs + timestamps; job fields (job_id, attempt, ...) become JSON keys.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .json()
        .with_timer(tracing_subscriber::fmt::time::SystemTime)
        .with_target(false)
        .try_init();
}

fn build_filter(directives: Option<&str>, default_filter: &str) -> EnvFilter {
    directives
        .filter(|d| !d.trim().is_empty())
        .and_then(|d| EnvFilter::try_new(d).ok())
        .unwrap_or_else(|| EnvFilter::new(default_filter))
}
