//! Telemetry initialization.
//!
//! Logging goes to stderr through `tracing-subscriber`, filtered by
//! `RUST_LOG` (default `warn` — orphaned-change and skipped-entry warnings
//! stay visible without drowning the CLI output).

use tracing_subscriber::EnvFilter;

/// Initialize the global subscriber. Call once from `main()`.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
