//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events)
//!     → metrics.rs (counters, gauges, histograms)
//!     → tracing.rs (spans, trace links)
//!
//! Consumers:
//!     → Log aggregation (stdout, JSON)
//!     → Metrics endpoint (Prometheus scrape)
//!     → OpenTelemetry tracer provider
//! ```
//!
//! # Design Decisions
//! - Structured logging (JSON) for machine parsing
//! - Request ID flows through logs and spans
//! - Metrics are cheap (atomic increments)
//! - Span handling goes through a port so tests can record spans in memory

pub mod logging;
pub mod metrics;
pub mod tracing;
