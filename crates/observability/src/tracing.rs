//! Tracing/logging initialization.

use tracing_subscriber::EnvFilter;

/// Initialize tracing/logging for the process.
///
/// JSON lines by default (one event per line, machine-collectable);
/// `CRM_LOG_FORMAT=text` switches to a human-readable format for local
/// runs. Filtering is configured via `RUST_LOG`.
///
/// Safe to call multiple times (subsequent calls are no-ops).
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let wants_text = std::env::var("CRM_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("text"))
        .unwrap_or(false);

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);

    if wants_text {
        let _ = builder.try_init();
    } else {
        let _ = builder
            .json()
            .with_timer(tracing_subscriber::fmt::time::SystemTime)
            .try_init();
    }
}
