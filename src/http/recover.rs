//! Supervisory boundary for request tasks.
//!
//! A panicking handler must still produce a well-formed outcome. Inside the
//! dispatcher `supervise` turns a panic into an `Internal` outcome (which
//! counts against the breaker); outside it `CatchPanicLayer` uses
//! `panic_response` for the same JSON 500.
//!
//! The body-limit and timeout layers answer with bare 413 and 408 responses;
//! `envelope_layer_rejection` re-encodes those as error envelopes.

use std::any::Any;
use std::backtrace::Backtrace;
use std::future::Future;
use std::panic::AssertUnwindSafe;

use axum::http::header::CONTENT_TYPE;
use axum::http::StatusCode;
use axum::response::Response;
use futures_util::FutureExt;
use thiserror::Error;

use crate::domain::error::resource_from_status;
use crate::http::outcome::{bare_response, ErrorEnvelope, Outcome};

#[derive(Debug, Error)]
#[error("panic: {0}")]
pub struct Panicked(pub String);

/// Run `handler`, converting a panic into an internal-error outcome.
pub async fn supervise<F>(handler: F) -> Outcome
where
    F: Future<Output = Outcome>,
{
    match AssertUnwindSafe(handler).catch_unwind().await {
        Ok(outcome) => outcome,
        Err(panic) => Outcome::internal_server_error(log_panic(panic.as_ref())),
    }
}

/// Response for a panic that escaped every handler.
pub fn panic_response(panic: Box<dyn Any + Send + 'static>) -> Response {
    let outcome = Outcome::internal_server_error(log_panic(panic.as_ref()));
    outcome
        .encode()
        .unwrap_or_else(|_| bare_response(outcome.status))
}

/// Give a bare 413 or 408 from the middleware stack a JSON error body.
///
/// Responses that already carry JSON (the breaker's own timeout) pass
/// through untouched.
pub async fn envelope_layer_rejection(response: Response) -> Response {
    let status = response.status();
    let (code, message) = match status {
        StatusCode::PAYLOAD_TOO_LARGE => ("request:too-large", "request body exceeds the size limit"),
        StatusCode::REQUEST_TIMEOUT => ("request:timeout", "request did not complete in time"),
        _ => return response,
    };
    if is_json(&response) {
        return response;
    }

    tracing::warn!(status = status.as_u16(), code, "request rejected by middleware");
    let envelope = ErrorEnvelope {
        kind: resource_from_status(status).to_owned(),
        code: code.to_owned(),
        message: message.to_owned(),
    };
    Outcome::rejection(status, &envelope)
        .encode()
        .unwrap_or_else(|_| bare_response(status))
}

fn is_json(response: &Response) -> bool {
    response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.starts_with("application/json"))
}

fn log_panic(panic: &(dyn Any + Send)) -> Panicked {
    let message = panic_message(panic);
    let backtrace = Backtrace::force_capture();
    tracing::error!(panic = %message, backtrace = %backtrace, "request task panicked");
    Panicked(message)
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&'static str>() {
        (*s).to_owned()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_owned()
    }
}
