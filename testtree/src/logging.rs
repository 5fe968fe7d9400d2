//! Diagnostic tracing for the CLI.
//!
//! Reads `RUST_LOG`; defaults to `warn`. Output goes to stderr in compact
//! format so stdout stays reserved for command output.
//!
//! # Example
//! ```bash
//! RUST_LOG=testtree=debug testtree merge math.test.js result.json
//! ```

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the global tracing subscriber.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}
