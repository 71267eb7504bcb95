//! Diagnostic tracing for the pipeline.
//!
//! Operator-facing text goes through [`crate::io::prompt::Prompter`] on
//! stdout; tracing goes to stderr and never carries parameter values.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Filter directive for a `--log-level` value (`DEBUG`, `INFO`, `WARNING`,
/// `ERROR`; case-insensitive). Unknown names fall back to `info`.
pub fn directive(level: &str) -> &'static str {
    match level.trim().to_ascii_uppercase().as_str() {
        "DEBUG" => "debug",
        "WARNING" | "WARN" => "warn",
        "ERROR" => "error",
        _ => "info",
    }
}

/// Initialize the stderr subscriber.
///
/// `RUST_LOG` wins over `level` when set.
///
/// # Example
/// ```bash
/// RUST_LOG=dune=debug dune --quick "pobierz pocztę"
/// ```
pub fn init(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(directive(level)));

    // A second init (tests, embedding) keeps the first subscriber.
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .try_init();
}
