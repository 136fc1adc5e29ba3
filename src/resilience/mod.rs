//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Inbound request for command C:
//!     → registry.rs (breaker for C, created on first use)
//!     → circuit_breaker.rs (admission, concurrency bound, timeout)
//!         → rolling.rs (outcome counts over the rolling window)
//!     → On unexpected failure: trace_link.rs stores the failing span under C
//!     → On rejection/timeout: trace_link.rs returns it for the diagnostic span
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every guarded call has a deadline
//! - No retries: a rejected call is answered, not replayed
//! - Circuit breaker prevents cascading failures
//! - Breakers live as long as their registry; nothing removes them

pub mod circuit_breaker;
pub mod registry;
pub mod rolling;
pub mod trace_link;

pub use circuit_breaker::{
    BreakerConfigError, BreakerError, CircuitBreaker, CircuitState, Verdict,
};
pub use registry::CircuitRegistry;
pub use trace_link::TraceLinkStore;
