//! Users API with a resilient request dispatcher.
//!
//! Every route runs under a per-command circuit breaker. Failures are
//! classified as expected business errors or unexpected infrastructure
//! errors, and rejected calls carry a trace link back to the failure that
//! opened the circuit.

pub mod config;
pub mod domain;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod outbound;
pub mod resilience;

pub use config::schema::AppConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
