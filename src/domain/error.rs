//! Error taxonomy.
//!
//! # Responsibilities
//! - Closed set of error kinds, each mapped to a status, resource type,
//!   default code and default message
//! - Business error value (`AppError`) carrying a stable `(code, message)`
//!   pair, an operation chain for logs, and an optional source
//! - Classification of an error into breaker accounting categories
//!
//! # Design Decisions
//! - The client only ever sees `{type, code, message}`; `Display` output
//!   (operation chain + source) is for logs and spans
//! - Classification is computed once from the kind and the expected flag,
//!   never by re-inspecting error chains

use std::borrow::Cow;
use std::fmt;

use axum::http::StatusCode;

/// Resource type strings reported in the `type` field of the error envelope.
pub mod resource {
    pub const BAD_REQUEST: &str = "srn:error:bad_request";
    pub const NOT_FOUND: &str = "srn:error:not_found";
    pub const UNAUTHORIZED: &str = "srn:error:unauthorized";
    pub const METHOD_NOT_ALLOWED: &str = "srn:error:method_not_allowed";
    pub const SERVER_ERROR: &str = "srn:error:server_error";
    pub const SERVICE_UNAVAILABLE: &str = "srn:error:service_unavailable";
    pub const TOO_MANY_REQUESTS: &str = "srn:error:too_many_requests";
    pub const REQUEST_TIMEOUT: &str = "srn:error:request_timeout";
    pub const PAYLOAD_TOO_LARGE: &str = "srn:error:payload_too_large";
}

/// Resource type reported for a status code.
pub fn resource_from_status(status: StatusCode) -> &'static str {
    match status {
        StatusCode::BAD_REQUEST => resource::BAD_REQUEST,
        StatusCode::UNAUTHORIZED => resource::UNAUTHORIZED,
        StatusCode::NOT_FOUND => resource::NOT_FOUND,
        StatusCode::METHOD_NOT_ALLOWED => resource::METHOD_NOT_ALLOWED,
        StatusCode::REQUEST_TIMEOUT => resource::REQUEST_TIMEOUT,
        StatusCode::PAYLOAD_TOO_LARGE => resource::PAYLOAD_TOO_LARGE,
        StatusCode::TOO_MANY_REQUESTS => resource::TOO_MANY_REQUESTS,
        StatusCode::SERVICE_UNAVAILABLE => resource::SERVICE_UNAVAILABLE,
        _ => resource::SERVER_ERROR,
    }
}

/// Abstract error kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Validation,
    NotFound,
    Unauthorized,
    MethodNotAllowed,
    Internal,
    BreakerOpen,
    BreakerOverload,
    BreakerTimeout,
}

impl ErrorKind {
    pub fn status(self) -> StatusCode {
        match self {
            ErrorKind::Validation => StatusCode::BAD_REQUEST,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Unauthorized => StatusCode::UNAUTHORIZED,
            ErrorKind::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
            ErrorKind::BreakerOpen => StatusCode::SERVICE_UNAVAILABLE,
            ErrorKind::BreakerOverload => StatusCode::TOO_MANY_REQUESTS,
            ErrorKind::BreakerTimeout => StatusCode::REQUEST_TIMEOUT,
        }
    }

    pub fn resource_type(self) -> &'static str {
        resource_from_status(self.status())
    }

    pub fn default_code(self) -> &'static str {
        match self {
            ErrorKind::Validation => "oops:bad-request",
            ErrorKind::NotFound => "oops:not-found",
            ErrorKind::Unauthorized => "oops:unauthorized",
            ErrorKind::MethodNotAllowed => "oops:method-not-allowed",
            ErrorKind::Internal => "oops:internal-server-error",
            ErrorKind::BreakerOpen => "circuit-breaker:service-unavailable",
            ErrorKind::BreakerOverload => "circuit-breaker:too-many-requests",
            ErrorKind::BreakerTimeout => "circuit-breaker:request-timeout",
        }
    }

    pub fn default_message(self) -> &'static str {
        match self {
            ErrorKind::Validation => "the request is invalid",
            ErrorKind::NotFound => "the requested resource was not found",
            ErrorKind::Unauthorized => "user is not authorized to perform this operation",
            ErrorKind::MethodNotAllowed => "the http method used is not supported by this resource",
            ErrorKind::Internal => "an unexpected error has occurred",
            ErrorKind::BreakerOpen => "circuit is open",
            ErrorKind::BreakerOverload => "too many concurrent requests",
            ErrorKind::BreakerTimeout => "timeout",
        }
    }

    /// Business kinds are produced on purpose by handlers and must not
    /// count against breaker health.
    pub fn expected_by_default(self) -> bool {
        matches!(
            self,
            ErrorKind::Validation
                | ErrorKind::NotFound
                | ErrorKind::Unauthorized
                | ErrorKind::MethodNotAllowed
        )
    }
}

/// Breaker accounting category of a failed request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Expected,
    BreakerOpen,
    BreakerOverload,
    BreakerTimeout,
    Unexpected,
}

/// Classify an error. Guard-level kinds win over the expected flag.
pub fn classify(err: &AppError) -> Classification {
    match err.kind {
        ErrorKind::BreakerOpen => Classification::BreakerOpen,
        ErrorKind::BreakerOverload => Classification::BreakerOverload,
        ErrorKind::BreakerTimeout => Classification::BreakerTimeout,
        _ if err.expected => Classification::Expected,
        _ => Classification::Unexpected,
    }
}

/// Path to an invalid field, e.g. `delivery_address.postal_code`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldPath(Vec<String>);

impl FieldPath {
    pub fn new<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(segments.into_iter().map(Into::into).collect())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Colon-joined form used in error codes.
    pub fn code_prefix(&self) -> String {
        self.0.join(":")
    }

    /// Dotted form used in human readable messages.
    pub fn message_prefix(&self) -> String {
        self.0.join(".")
    }
}

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// A business error with a stable client-facing `(code, message)` pair.
#[derive(Debug)]
pub struct AppError {
    kind: ErrorKind,
    code: Cow<'static, str>,
    message: Cow<'static, str>,
    expected: bool,
    operations: Vec<&'static str>,
    source: Option<BoxError>,
}

impl AppError {
    pub fn new(
        kind: ErrorKind,
        code: impl Into<Cow<'static, str>>,
        message: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self {
            kind,
            code: code.into(),
            message: message.into(),
            expected: kind.expected_by_default(),
            operations: Vec::new(),
            source: None,
        }
    }

    /// Error using the kind's default code and message.
    pub fn of_kind(kind: ErrorKind) -> Self {
        Self::new(kind, kind.default_code(), kind.default_message())
    }

    pub fn not_found(
        code: impl Into<Cow<'static, str>>,
        message: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self::new(ErrorKind::NotFound, code, message)
    }

    /// Field validation failure.
    ///
    /// The code is `<field:path>:<rule>` and the message is
    /// `<field.path> <reason>`.
    pub fn validation(field: &FieldPath, rule: &str, reason: &str) -> Self {
        if field.is_empty() {
            return Self::new(ErrorKind::Validation, rule.to_owned(), reason.to_owned());
        }
        Self::new(
            ErrorKind::Validation,
            format!("{}:{}", field.code_prefix(), rule),
            format!("{} {}", field.message_prefix(), reason),
        )
    }

    /// Malformed request body or parameters.
    pub fn invalid_request(source: impl Into<BoxError>) -> Self {
        Self::new(ErrorKind::Validation, "request:invalid", "invalid request").with_source(source)
    }

    pub fn internal(source: impl Into<BoxError>) -> Self {
        Self::of_kind(ErrorKind::Internal).with_source(source)
    }

    pub fn with_source(mut self, source: impl Into<BoxError>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Mark as an expected business failure.
    pub fn expected(mut self) -> Self {
        self.expected = true;
        self
    }

    /// Mark as an infrastructure failure that counts against the breaker.
    pub fn unexpected(mut self) -> Self {
        self.expected = false;
        self
    }

    /// Prefix the operation chain with `operation`.
    pub fn context(mut self, operation: &'static str) -> Self {
        self.operations.insert(0, operation);
        self
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn is_expected(&self) -> bool {
        self.expected
    }

    pub fn status(&self) -> StatusCode {
        self.kind.status()
    }

    pub fn resource_type(&self) -> &'static str {
        self.kind.resource_type()
    }

    pub fn classification(&self) -> Classification {
        classify(self)
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for op in &self.operations {
            write!(f, "{op} -> ")?;
        }
        write!(f, "{}", self.message)?;
        if let Some(source) = &self.source {
            write!(f, ": {source}")?;
        }
        Ok(())
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_deref()
            .map(|e| e as &(dyn std::error::Error + 'static))
    }
}
