//! `voltmart-observability` — tracing/logging initialization.

use tracing_subscriber::EnvFilter;

/// Initialize tracing/logging for the process.
///
/// JSON log lines, filtered via `RUST_LOG` (default `info`). Safe to call
/// multiple times; subsequent calls are no-ops.
pub fn init() {
    init_with_filter(
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    );
}

/// Initialize with an explicit filter (useful in tests and tools).
pub fn init_with_filter(filter: EnvFilter) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .json()
        .with_timer(tracing_subscriber::fmt::time::SystemTime)
        .with_target(false)
        .try_init();
}
