//! Request scope extraction.
//!
//! # Responsibilities
//! - Collect request-scoped values (request id, authorization, idempotency
//!   key, inbound trace parent, method, route) into one explicit struct
//! - Parse the W3C `traceparent` header
//!
//! # Design Decisions
//! - Request ID is assigned by `SetRequestIdLayer` before any handler runs;
//!   the extractor only reads it
//! - Extraction never fails; missing headers are simply absent

use axum::extract::{FromRequestParts, MatchedPath};
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use axum::http::{HeaderMap, Method};
use std::convert::Infallible;

use crate::observability::tracing::TraceLink;

pub const X_REQUEST_ID: &str = "x-request-id";
pub const IDEMPOTENCY_KEY: &str = "idempotency-key";
pub const TRACEPARENT: &str = "traceparent";

/// Values scoped to one inbound request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestScope {
    pub request_id: String,
    pub authorization: Option<String>,
    pub idempotency_key: Option<String>,
    pub parent_trace: Option<TraceLink>,
    pub method: Method,
    /// Matched route pattern, e.g. `/api/v1/user/{id}`.
    pub route: String,
}

impl RequestScope {
    pub fn from_parts(parts: &Parts) -> Self {
        let route = parts
            .extensions
            .get::<MatchedPath>()
            .map(|p| p.as_str().to_owned())
            .unwrap_or_else(|| parts.uri.path().to_owned());

        Self::from_headers(parts.method.clone(), route, &parts.headers)
    }

    pub fn from_headers(method: Method, route: String, headers: &HeaderMap) -> Self {
        Self {
            request_id: header(headers, X_REQUEST_ID).unwrap_or_else(|| "unknown".to_owned()),
            authorization: header(headers, AUTHORIZATION.as_str()),
            idempotency_key: header(headers, IDEMPOTENCY_KEY),
            parent_trace: header(headers, TRACEPARENT)
                .as_deref()
                .and_then(TraceLink::from_traceparent),
            method,
            route,
        }
    }

    /// Token of an `Authorization: Bearer <token>` header.
    pub fn bearer_token(&self) -> Option<&str> {
        let value = self.authorization.as_deref()?;
        let (scheme, token) = value.split_once(' ')?;
        scheme
            .eq_ignore_ascii_case("bearer")
            .then(|| token.trim())
            .filter(|t| !t.is_empty())
    }
}

fn header(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_owned)
}

impl<S> FromRequestParts<S> for RequestScope
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self::from_parts(parts))
    }
}
