//! Resilient users API.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request
//!     ──────────────▶ http::server (request id, trace, timeout, body limit)
//!                         │
//!                         ▼
//!                     http::handlers ──▶ domain::UserService ──▶ outbound stores
//!                         │
//!                         ▼
//!                     http::dispatch
//!                       ├─ resilience::CircuitRegistry (one breaker per command)
//!                       ├─ resilience::TraceLinkStore (cause of the last failure)
//!                       └─ observability (logs, metrics, spans)
//!                         │
//!     Client Response     ▼
//!     ◀────────────── http::outcome (JSON envelope)
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

#[derive(Parser)]
#[command(name = "resilient-api")]
#[command(about = "Users API with per-command circuit breakers", long_about = None)]
struct Args {
    /// TOML configuration file; defaults are used when omitted.
    #[arg(short, long, env = "RESILIENT_API_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    match resilient_api::lifecycle::run(args.config.as_deref()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            // Logging may not be installed yet.
            eprintln!("fatal: {err}");
            tracing::error!(error = %err, "fatal startup error");
            ExitCode::FAILURE
        }
    }
}
