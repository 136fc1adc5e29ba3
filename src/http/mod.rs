//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, middleware layers)
//!     → request.rs (request scope: id, auth, idempotency key, traceparent)
//!     → handlers.rs (users API, health check)
//!     → dispatch.rs (breaker, classification, trace links, failure logs)
//!     → outcome.rs (JSON envelope, encoding)
//!     → Send to client
//! ```

pub mod dispatch;
pub mod handlers;
pub mod outcome;
pub mod recover;
pub mod request;
pub mod server;

pub use dispatch::{Dispatcher, Route, CAUSE_SPAN};
pub use outcome::{ErrorEnvelope, Outcome};
pub use request::{RequestScope, X_REQUEST_ID};
pub use server::{AppState, HttpServer, ServerDeps};
