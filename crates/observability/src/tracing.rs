//! Tracing/logging initialization.

use tracing_subscriber::EnvFilter;

/// Default filter: our crates at info, chatty dependencies at warn.
/// `RUST_LOG` overrides everything.
const DEFAULT_DIRECTIVES: &str = "info,sqlx=warn,hyper=warn,tower=warn";

/// Initialize tracing/logging for the process.
///
/// JSON lines so security-relevant fields (ip, grant, points) survive log
/// shipping intact. Safe to call multiple times; later calls are no-ops.
pub fn init() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVES));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .json()
        .with_timer(tracing_subscriber::fmt::time::SystemTime)
        .with_target(false)
        .try_init();
}
