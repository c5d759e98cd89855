//! Logging initialization.
//!
//! Sets up tracing-subscriber with an env-filter. RUST_LOG takes
//! precedence over the configured default level.

use tracing_subscriber::EnvFilter;

/// Install the global tracing subscriber. Safe to call more than once;
/// later calls are no-ops.
pub fn init_tracing(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
