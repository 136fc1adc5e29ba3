//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define API metrics (requests, latency, breaker rejections and state)
//! - Expose Prometheus-compatible metrics endpoint
//!
//! # Metrics
//! - `api_requests_total` (counter): requests by command, status
//! - `api_request_duration_seconds` (histogram): latency by command
//! - `api_circuit_rejections_total` (counter): guard rejections by command, reason
//! - `api_circuit_state` (gauge): 0=closed, 1=half-open, 2=open
//!
//! # Design Decisions
//! - Facade macros only; without an installed recorder every call is a no-op
//! - Labels are command names, never raw paths (bounded cardinality)

use std::net::SocketAddr;
use std::time::Duration;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

use crate::resilience::circuit_breaker::CircuitState;

/// Install the Prometheus recorder and its scrape listener.
///
/// Must run inside a Tokio runtime; the listener is spawned on it.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

pub fn record_request(command: &str, status: u16, duration: Duration) {
    ::metrics::counter!(
        "api_requests_total",
        "command" => command.to_owned(),
        "status" => status.to_string()
    )
    .increment(1);
    ::metrics::histogram!("api_request_duration_seconds", "command" => command.to_owned())
        .record(duration.as_secs_f64());
}

pub fn record_rejection(command: &str, reason: &'static str) {
    ::metrics::counter!(
        "api_circuit_rejections_total",
        "command" => command.to_owned(),
        "reason" => reason
    )
    .increment(1);
}

pub fn record_circuit_state(command: &str, state: CircuitState) {
    let level = match state {
        CircuitState::Closed => 0.0,
        CircuitState::HalfOpen => 1.0,
        CircuitState::Open => 2.0,
    };
    ::metrics::gauge!("api_circuit_state", "command" => command.to_owned()).set(level);
}
