//! Handler outcomes.
//!
//! # Responsibilities
//! - The complete result of a handler invocation before encoding: status,
//!   payload, headers, internal error, log attributes, log suppression
//! - Canned outcomes for guard rejections
//! - Deterministic JSON encoding onto an axum `Response`
//!
//! # Design Decisions
//! - Payloads are converted to `serde_json::Value` at construction; a value
//!   that cannot be represented surfaces as an encode error at send time
//! - Object keys are ordered, so encoding the same outcome twice yields the
//!   same bytes
//! - The internal error never reaches the body; only the envelope does

use std::collections::BTreeMap;

use axum::body::Body;
use axum::http::header::{HeaderName, HeaderValue, CONTENT_TYPE};
use axum::http::StatusCode;
use axum::response::Response;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::error::{AppError, ErrorKind};
use crate::resilience::circuit_breaker::BreakerError;

/// Client-visible error body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    #[serde(rename = "type")]
    pub kind: String,
    pub code: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
}

impl From<&AppError> for ErrorEnvelope {
    fn from(err: &AppError) -> Self {
        Self {
            kind: err.resource_type().to_owned(),
            code: err.code().to_owned(),
            message: err.message().to_owned(),
        }
    }
}

#[derive(Debug)]
pub enum Payload {
    Empty,
    Json(serde_json::Value),
    Unencodable(serde_json::Error),
}

impl Payload {
    fn from_serialize<T: Serialize + ?Sized>(value: &T) -> Self {
        match serde_json::to_value(value) {
            Ok(value) => Payload::Json(value),
            Err(err) => Payload::Unencodable(err),
        }
    }
}

#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("send json encode: {0}")]
    Payload(String),

    #[error("invalid response header {name:?}")]
    Header { name: String },
}

/// Result of one handler invocation.
#[derive(Debug)]
pub struct Outcome {
    pub status: StatusCode,
    pub payload: Payload,
    pub headers: BTreeMap<String, String>,
    pub internal_error: Option<AppError>,
    pub log_attrs: BTreeMap<String, serde_json::Value>,
    pub omit_logs: bool,
}

impl Outcome {
    fn new(status: StatusCode, payload: Payload) -> Self {
        Self {
            status,
            payload,
            headers: BTreeMap::new(),
            internal_error: None,
            log_attrs: BTreeMap::new(),
            omit_logs: false,
        }
    }

    pub fn ok<T: Serialize + ?Sized>(payload: &T) -> Self {
        Self::new(StatusCode::OK, Payload::from_serialize(payload))
    }

    /// Status only, empty body.
    pub fn empty(status: StatusCode) -> Self {
        Self::new(status, Payload::Empty)
    }

    pub fn no_content() -> Self {
        Self::empty(StatusCode::NO_CONTENT)
    }

    /// Failure outcome for a business or infrastructure error.
    pub fn from_error(err: AppError) -> Self {
        let envelope = ErrorEnvelope::from(&err);
        let mut outcome = Self::new(err.status(), Payload::from_serialize(&envelope));
        outcome.internal_error = Some(err);
        outcome
    }

    /// Error body for a rejection raised outside any handler.
    pub fn rejection(status: StatusCode, envelope: &ErrorEnvelope) -> Self {
        Self::new(status, Payload::from_serialize(envelope))
    }

    pub fn internal_server_error(
        source: impl Into<Box<dyn std::error::Error + Send + Sync + 'static>>,
    ) -> Self {
        Self::from_error(AppError::internal(source))
    }

    /// Canned outcome for a guard rejection.
    pub fn from_breaker(err: BreakerError) -> Self {
        let kind = match err {
            BreakerError::Open => ErrorKind::BreakerOpen,
            BreakerError::ConcurrencyLimit => ErrorKind::BreakerOverload,
            BreakerError::Timeout => ErrorKind::BreakerTimeout,
        };
        Self::from_error(AppError::of_kind(kind))
    }

    pub fn with_headers<I, K, V>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.headers = headers
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        self
    }

    pub fn with_log_attr(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.log_attrs.insert(key.into(), value.into());
        self
    }

    pub fn with_omitted_logs(mut self) -> Self {
        self.omit_logs = true;
        self
    }

    /// JSON body bytes, `None` for an empty payload.
    pub fn encode_body(&self) -> Result<Option<Vec<u8>>, EncodeError> {
        match &self.payload {
            Payload::Empty => Ok(None),
            Payload::Json(value) => serde_json::to_vec(value)
                .map(Some)
                .map_err(|err| EncodeError::Payload(err.to_string())),
            Payload::Unencodable(err) => Err(EncodeError::Payload(err.to_string())),
        }
    }

    /// Full transport response.
    pub fn encode(&self) -> Result<Response, EncodeError> {
        let body = self.encode_body()?;

        let mut response = Response::new(Body::empty());
        *response.status_mut() = self.status;
        let headers = response.headers_mut();
        for (name, value) in &self.headers {
            let invalid = || EncodeError::Header { name: name.clone() };
            let name = HeaderName::try_from(name.as_str()).map_err(|_| invalid())?;
            let value = HeaderValue::try_from(value.as_str()).map_err(|_| invalid())?;
            headers.insert(name, value);
        }

        if let Some(bytes) = body {
            headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
            *response.body_mut() = Body::from(bytes);
        }
        Ok(response)
    }
}

/// Response sent when encoding failed: status kept, body dropped.
pub fn bare_response(status: StatusCode) -> Response {
    let mut response = Response::new(Body::empty());
    *response.status_mut() = status;
    response
}
