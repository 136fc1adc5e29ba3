//! Structured logging setup.
//!
//! # Responsibilities
//! - Install the global `tracing` subscriber once at startup
//! - `RUST_LOG` wins over the configured level when present
//! - JSON output for machines, pretty output for people

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::{EnvFilter, Layer};

use crate::config::schema::{LogFormat, ObservabilityConfig};

/// Install the global subscriber.
///
/// Fails if a subscriber is already installed; callers that may run twice
/// (tests) can ignore the error.
pub fn init_logging(config: &ObservabilityConfig, development: bool) -> Result<(), TryInitError> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(&config.log_level)));

    let fmt_layer = match config.log_format {
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .json()
            .with_current_span(true)
            .with_target(true)
            .with_file(development)
            .with_line_number(development)
            .boxed(),
        LogFormat::Pretty => tracing_subscriber::fmt::layer()
            .pretty()
            .with_target(true)
            .with_thread_ids(false)
            .with_file(development)
            .with_line_number(development)
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init()
}

fn default_directives(level: &str) -> String {
    format!("{level},tower_http=info,hyper=warn")
}
