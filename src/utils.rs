//! Logging setup.

use tracing_subscriber::{EnvFilter, fmt};

/// Directives used when `RUST_LOG` is unset. The transport crates are noisy at
/// `info`, so they are held back to `warn`.
const DEFAULT_DIRECTIVES: &str = "info,tungstenite=warn,tokio_tungstenite=warn";

/// Initialize the `tracing` subscriber for the binary.
pub fn init_logging() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVES));
    fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .init();
}
