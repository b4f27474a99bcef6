//! # Logging
//!
//! Installs the global `tracing` subscriber.
//!
//! The filter comes from `RUST_LOG` (default `platform_operator=info`); the
//! output format from `LOG_FORMAT` (`json` or `text`).

use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "platform_operator=info";

/// Initialize the global subscriber. Calling it twice is harmless.
pub fn init_logging(format: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_FILTER.into());
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    let result = if format.eq_ignore_ascii_case("text") {
        builder.try_init()
    } else {
        builder.json().with_current_span(true).try_init()
    };

    if let Err(e) = result {
        tracing::debug!("tracing subscriber already installed: {}", e);
    }
}
