//! Resilient dispatcher.
//!
//! # Data Flow
//! ```text
//! serve(route, scope, handler)
//!     → request span (parent = inbound traceparent)
//!     → dispatch:
//!         breaker.execute(supervise(handler))
//!             Expected error   → force_close + exempt verdict
//!             Unexpected error → failure verdict
//!         Guard rejection/timeout → cached trace link → cause span → canned outcome
//!         Unexpected failure      → store request span link under command
//!                                   (skipped when the span has no identity of its own)
//!         Failure log (WARN/ERROR) unless suppressed, metrics
//!     → encode outcome (encode failure keeps status, drops body)
//!     → span status, end
//! ```
//!
//! # Design Decisions
//! - Guard-level signals win: a timed-out handler never reports its own
//!   error because its future has been dropped
//! - Trace link reads and writes are best effort and never fail a request
//! - Span status is set once, after encoding, so an encode failure can still
//!   mark the span as errored

use std::future::Future;
use std::sync::Arc;

use axum::http::StatusCode;
use axum::response::Response;
use tokio::time::Instant;

use crate::domain::error::{AppError, Classification};
use crate::domain::ports::Cache;
use crate::http::outcome::{bare_response, Outcome};
use crate::http::recover::supervise;
use crate::http::request::RequestScope;
use crate::observability::metrics;
use crate::observability::tracing::{
    ActiveSpan, SpanAttribute, SpanKind, SpanOptions, SpanStatus, TraceLink, Tracer,
};
use crate::resilience::{
    BreakerConfigError, BreakerError, CircuitBreaker, CircuitRegistry, TraceLinkStore, Verdict,
};

/// Name of the span that links a rejected call to the failure that opened
/// the circuit.
pub const CAUSE_SPAN: &str = "circuit-break-cause";

const COMPONENT: &str = "http.dispatcher";

/// A command bound to its breaker. Resolved once at router build time.
#[derive(Debug, Clone)]
pub struct Route {
    command: Arc<str>,
    breaker: Arc<CircuitBreaker>,
}

impl Route {
    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }
}

/// Final outcome of a dispatch plus what the request span should report.
#[derive(Debug)]
pub struct Dispatched {
    pub outcome: Outcome,
    pub classification: Option<Classification>,
    pub span_status: SpanStatus,
}

pub struct Dispatcher {
    registry: Arc<CircuitRegistry>,
    trace_links: TraceLinkStore,
    tracer: Arc<dyn Tracer>,
    environment: String,
}

impl Dispatcher {
    /// Trace links live for one sleep window plus a second.
    pub fn new(
        registry: Arc<CircuitRegistry>,
        cache: Arc<dyn Cache>,
        tracer: Arc<dyn Tracer>,
        environment: impl Into<String>,
    ) -> Self {
        let ttl = registry.config().trace_link_ttl();
        Self {
            registry,
            trace_links: TraceLinkStore::new(cache, ttl),
            tracer,
            environment: environment.into(),
        }
    }

    pub fn registry(&self) -> &CircuitRegistry {
        &self.registry
    }

    /// Bind `command` to its breaker, creating the breaker if needed.
    pub fn route(&self, command: &str) -> Result<Route, BreakerConfigError> {
        Ok(Route {
            command: Arc::from(command),
            breaker: self.registry.get_or_create(command)?,
        })
    }

    /// Run `handler` under the route's breaker inside a request span and
    /// encode the result.
    pub async fn serve<F>(&self, route: &Route, scope: &RequestScope, handler: F) -> Response
    where
        F: Future<Output = Outcome>,
    {
        let name = format!("{} {}", scope.method, scope.route);
        let mut span = self.tracer.start_span(
            &name,
            SpanOptions {
                kind: SpanKind::Server,
                parent: scope.parent_trace,
                link: None,
            },
        );
        let mut attributes = self.scope_attributes(scope);
        attributes.extend([
            ("command", route.command().to_owned()),
            ("http.method", scope.method.to_string()),
            ("http.route", scope.route.clone()),
        ]);
        span.set_attributes(&attributes);

        let Dispatched {
            outcome,
            mut span_status,
            ..
        } = self.dispatch(route, scope, &mut *span, handler).await;

        let response = match outcome.encode() {
            Ok(response) => response,
            Err(err) => {
                tracing::error!(
                    error = %err,
                    command = route.command(),
                    request_id = %scope.request_id,
                    http.method = %scope.method,
                    http.route = %scope.route,
                    http.status = outcome.status.as_u16(),
                    "response encoding failed"
                );
                span.record_error(&err);
                span_status = SpanStatus::Error(err.to_string());
                bare_response(outcome.status)
            }
        };

        span.set_attributes(&[("http.status_code", response.status().as_u16().to_string())]);
        span.set_status(span_status);
        span.end();
        response
    }

    /// Run `handler` under the route's breaker and settle the outcome.
    ///
    /// `span` is the request's active span; errors are recorded on it but its
    /// status is left to the caller via `Dispatched::span_status`.
    pub async fn dispatch<F>(
        &self,
        route: &Route,
        scope: &RequestScope,
        span: &mut dyn ActiveSpan,
        handler: F,
    ) -> Dispatched
    where
        F: Future<Output = Outcome>,
    {
        let started = Instant::now();
        let breaker = route.breaker();

        let guarded = breaker
            .execute(async {
                let outcome = supervise(handler).await;
                match outcome.internal_error.as_ref().map(AppError::classification) {
                    None => Verdict::Success(outcome),
                    Some(Classification::Expected) => {
                        breaker.force_close();
                        Verdict::Exempt(outcome)
                    }
                    Some(_) => Verdict::Failure(outcome),
                }
            })
            .await;

        let outcome = match guarded {
            Ok(outcome) => outcome,
            Err(rejection) => {
                let parent = span.trace_link().non_empty();
                self.divert(route, scope, parent, rejection).await
            }
        };
        let classification = outcome
            .internal_error
            .as_ref()
            .map(AppError::classification);

        if classification == Some(Classification::Unexpected) {
            // An inert tracer hands back the inbound parent or nothing; neither
            // identifies this request's span.
            let link = span.trace_link();
            if Some(link) != scope.parent_trace {
                self.trace_links.record(route.command(), link).await;
            }
        }

        let span_status = match &outcome.internal_error {
            None => SpanStatus::Ok,
            Some(err) => {
                span.record_error(err);
                if classification == Some(Classification::Expected) {
                    SpanStatus::Ok
                } else {
                    SpanStatus::Error(err.to_string())
                }
            }
        };

        let elapsed = started.elapsed();
        if let Some(err) = &outcome.internal_error {
            if !outcome.omit_logs {
                log_failure(route, scope, &outcome, err, classification, elapsed);
            }
        }
        metrics::record_request(route.command(), outcome.status.as_u16(), elapsed);

        Dispatched {
            outcome,
            classification,
            span_status,
        }
    }

    /// Replace a rejected call's outcome and leave a span pointing at the
    /// failure that caused the rejection.
    async fn divert(
        &self,
        route: &Route,
        scope: &RequestScope,
        parent: Option<TraceLink>,
        rejection: BreakerError,
    ) -> Outcome {
        metrics::record_rejection(route.command(), rejection.reason());

        let cause = self.trace_links.fetch(route.command()).await;
        let mut span = self.tracer.start_span(
            CAUSE_SPAN,
            SpanOptions {
                kind: SpanKind::Server,
                parent,
                link: cause,
            },
        );
        let mut attributes = self.scope_attributes(scope);
        attributes.extend([
            ("command", route.command().to_owned()),
            ("circuit.rejection", rejection.reason().to_owned()),
        ]);
        span.set_attributes(&attributes);
        span.record_error(&rejection);
        span.set_status(SpanStatus::Error(rejection.to_string()));
        span.end();

        Outcome::from_breaker(rejection)
    }

    fn scope_attributes(&self, scope: &RequestScope) -> Vec<SpanAttribute> {
        let mut attributes = vec![
            ("env", self.environment.clone()),
            ("version", env!("CARGO_PKG_VERSION").to_owned()),
            ("language", "rust".to_owned()),
            ("component", COMPONENT.to_owned()),
            ("request_id", scope.request_id.clone()),
        ];
        if let Some(key) = &scope.idempotency_key {
            attributes.push(("idempotency_key", key.clone()));
        }
        attributes
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("registry", &self.registry)
            .field("trace_links", &self.trace_links)
            .field("environment", &self.environment)
            .finish_non_exhaustive()
    }
}

fn log_failure(
    route: &Route,
    scope: &RequestScope,
    outcome: &Outcome,
    err: &AppError,
    classification: Option<Classification>,
    elapsed: std::time::Duration,
) {
    let metadata = serde_json::to_string(&outcome.log_attrs).unwrap_or_default();
    let status = outcome.status.as_u16();
    let duration_ms = elapsed.as_millis() as u64;

    if classification == Some(Classification::Expected) || outcome.status == StatusCode::BAD_REQUEST
    {
        tracing::warn!(
            metadata = %metadata,
            command = route.command(),
            request_id = %scope.request_id,
            http.method = %scope.method,
            http.route = %scope.route,
            http.status = status,
            http.duration_ms = duration_ms,
            "{err}"
        );
    } else {
        tracing::error!(
            metadata = %metadata,
            command = route.command(),
            request_id = %scope.request_id,
            http.method = %scope.method,
            http.route = %scope.route,
            http.status = status,
            http.duration_ms = duration_ms,
            "{err}"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::pin::pin;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use axum::http::{HeaderMap, Method};
    use tokio::sync::oneshot;

    use crate::config::CircuitBreakerConfig;
    use crate::domain::error::{ErrorKind, FieldPath};
    use crate::observability::tracing::RecordingTracer;
    use crate::outbound::MemoryCache;
    use crate::resilience::CircuitState;

    const ROUTE: &str = "/api/v1/user/{id}";
    const REQUEST_SPAN: &str = "GET /api/v1/user/{id}";

    struct Harness {
        dispatcher: Dispatcher,
        tracer: Arc<RecordingTracer>,
        cache: Arc<MemoryCache>,
    }

    fn harness(config: CircuitBreakerConfig) -> Harness {
        let tracer = Arc::new(RecordingTracer::new());
        let cache = Arc::new(MemoryCache::new());
        let registry = Arc::new(CircuitRegistry::new(config).unwrap());
        let dispatcher = Dispatcher::new(registry, cache.clone(), tracer.clone(), "test");
        Harness {
            dispatcher,
            tracer,
            cache,
        }
    }

    fn scope() -> RequestScope {
        let mut headers = HeaderMap::new();
        headers.insert("x-request-id", "req-1".parse().unwrap());
        RequestScope::from_headers(Method::GET, ROUTE.into(), &headers)
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn internal() -> Outcome {
        Outcome::internal_server_error("connection refused")
    }

    #[tokio::test]
    async fn test_success_passes_through() {
        let h = harness(CircuitBreakerConfig::default());
        let route = h.dispatcher.route("get-user").unwrap();

        let response = h
            .dispatcher
            .serve(&route, &scope(), async { Outcome::ok(&serde_json::json!({"name": "Ada"})) })
            .await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["name"], "Ada");

        let span = h.tracer.span(REQUEST_SPAN).unwrap();
        assert_eq!(span.status, SpanStatus::Ok);
        assert_eq!(span.attribute("request_id"), Some("req-1"));
        assert_eq!(span.attribute("language"), Some("rust"));
        assert_eq!(span.attribute("command"), Some("get-user"));
        assert!(span.ended);
    }

    #[tokio::test]
    async fn test_expected_not_found_keeps_circuit_closed() {
        let h = harness(CircuitBreakerConfig::default());
        let route = h.dispatcher.route("get-user").unwrap();

        for _ in 0..40 {
            let response = h
                .dispatcher
                .serve(&route, &scope(), async {
                    Outcome::from_error(AppError::not_found("user:not-found", "user not found"))
                })
                .await;
            assert_eq!(response.status(), StatusCode::NOT_FOUND);
        }

        let response = h
            .dispatcher
            .serve(&route, &scope(), async {
                Outcome::from_error(AppError::not_found("user:not-found", "user not found"))
            })
            .await;
        assert_eq!(
            body_json(response).await,
            serde_json::json!({
                "type": "srn:error:not_found",
                "code": "user:not-found",
                "message": "user not found",
            })
        );
        assert_eq!(route.breaker().state(), CircuitState::Closed);
        assert!(!h.cache.exists("get-user").await.unwrap());

        let span = h.tracer.span(REQUEST_SPAN).unwrap();
        assert_eq!(span.status, SpanStatus::Ok);
        assert_eq!(span.errors, vec!["user not found".to_owned()]);
    }

    #[tokio::test]
    async fn test_open_circuit_short_circuits_with_cause_link() {
        let h = harness(CircuitBreakerConfig::default());
        let route = h.dispatcher.route("create-user").unwrap();

        for _ in 0..20 {
            let response = h.dispatcher.serve(&route, &scope(), async { internal() }).await;
            assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        }
        assert_eq!(route.breaker().state(), CircuitState::Open);
        let last_failure = h.tracer.span(REQUEST_SPAN).unwrap().trace_link;

        let calls = AtomicUsize::new(0);
        let response = h
            .dispatcher
            .serve(&route, &scope(), async {
                calls.fetch_add(1, Ordering::SeqCst);
                Outcome::no_content()
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        let body = body_json(response).await;
        assert_eq!(body["code"], "circuit-breaker:service-unavailable");
        assert_eq!(body["type"], "srn:error:service_unavailable");

        let request = h.tracer.span(REQUEST_SPAN).unwrap();
        let cause = h.tracer.span(CAUSE_SPAN).unwrap();
        assert_eq!(cause.link, Some(last_failure));
        assert_eq!(cause.parent, Some(request.trace_link));
        assert_eq!(cause.kind, SpanKind::Server);
        assert_eq!(cause.attribute("circuit.rejection"), Some("open"));
        assert!(cause.ended);
        assert_eq!(request.status, SpanStatus::Error("circuit is open".into()));
    }

    #[tokio::test]
    async fn test_rejection_without_cached_link() {
        let h = harness(CircuitBreakerConfig {
            request_volume_threshold: 1,
            ..CircuitBreakerConfig::default()
        });
        let route = h.dispatcher.route("create-user").unwrap();

        // A handler-produced breaker kind opens the circuit without storing a link.
        let response = h
            .dispatcher
            .serve(&route, &scope(), async {
                Outcome::from_error(AppError::of_kind(ErrorKind::BreakerOpen))
            })
            .await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(route.breaker().state(), CircuitState::Open);

        let response = h.dispatcher.serve(&route, &scope(), async { internal() }).await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        let cause = h.tracer.span(CAUSE_SPAN).unwrap();
        assert_eq!(cause.link, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unexpected_failure_link_expires() {
        let h = harness(CircuitBreakerConfig::default());
        let route = h.dispatcher.route("create-user").unwrap();

        h.dispatcher.serve(&route, &scope(), async { internal() }).await;
        let failing = h.tracer.span(REQUEST_SPAN).unwrap().trace_link;
        let stored: TraceLink = crate::domain::ports::get_json(h.cache.as_ref(), "create-user")
            .await
            .unwrap();
        assert_eq!(stored, failing);

        // Sleep window (5s) + 1s.
        tokio::time::advance(Duration::from_millis(5_999)).await;
        assert!(h.cache.exists("create-user").await.unwrap());
        tokio::time::advance(Duration::from_millis(1)).await;
        assert!(!h.cache.exists("create-user").await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_becomes_408() {
        let h = harness(CircuitBreakerConfig {
            timeout_ms: 100,
            ..CircuitBreakerConfig::default()
        });
        let route = h.dispatcher.route("get-user").unwrap();

        let response = h
            .dispatcher
            .serve(&route, &scope(), async {
                tokio::time::sleep(Duration::from_secs(1)).await;
                Outcome::no_content()
            })
            .await;

        assert_eq!(response.status(), StatusCode::REQUEST_TIMEOUT);
        let body = body_json(response).await;
        assert_eq!(body["code"], "circuit-breaker:request-timeout");
        assert_eq!(body["message"], "timeout");
        let cause = h.tracer.span(CAUSE_SPAN).unwrap();
        assert_eq!(cause.attribute("circuit.rejection"), Some("timeout"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_expected_error_closes_open_circuit() {
        let h = harness(CircuitBreakerConfig::default());
        let route = h.dispatcher.route("get-user").unwrap();
        for _ in 0..20 {
            h.dispatcher.serve(&route, &scope(), async { internal() }).await;
        }
        assert_eq!(route.breaker().state(), CircuitState::Open);

        tokio::time::advance(Duration::from_secs(5)).await;
        let response = h
            .dispatcher
            .serve(&route, &scope(), async {
                Outcome::from_error(AppError::not_found("user:not-found", "user not found"))
            })
            .await;

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(route.breaker().state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_validation_error_is_bad_request() {
        let h = harness(CircuitBreakerConfig::default());
        let route = h.dispatcher.route("create-user").unwrap();
        let field = FieldPath::new(["name"]);

        let response = h
            .dispatcher
            .serve(&route, &scope(), async {
                Outcome::from_error(AppError::validation(&field, "required", "cannot be blank"))
            })
            .await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["code"], "name:required");
        assert_eq!(body["message"], "name cannot be blank");
    }

    #[tokio::test]
    async fn test_panic_counts_as_unexpected() {
        let h = harness(CircuitBreakerConfig {
            request_volume_threshold: 2,
            ..CircuitBreakerConfig::default()
        });
        let route = h.dispatcher.route("update-user").unwrap();

        for _ in 0..2 {
            let response = h
                .dispatcher
                .serve(&route, &scope(), async {
                    if true {
                        panic!("handler bug");
                    }
                    Outcome::no_content()
                })
                .await;
            assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        }

        assert_eq!(route.breaker().state(), CircuitState::Open);
        assert!(h.cache.exists("update-user").await.unwrap());
    }

    #[tokio::test]
    async fn test_encode_failure_keeps_status() {
        let h = harness(CircuitBreakerConfig::default());
        let route = h.dispatcher.route("get-user").unwrap();

        let response = h
            .dispatcher
            .serve(&route, &scope(), async {
                Outcome::ok(&serde_json::json!({})).with_headers([("bad header", "x")])
            })
            .await;

        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert!(bytes.is_empty());

        let span = h.tracer.span(REQUEST_SPAN).unwrap();
        assert!(matches!(span.status, SpanStatus::Error(_)));
        assert_eq!(span.errors.len(), 1);
    }

    #[tokio::test]
    async fn test_request_span_follows_inbound_parent() {
        let h = harness(CircuitBreakerConfig::default());
        let route = h.dispatcher.route("get-user").unwrap();
        let mut scope = scope();
        let parent = TraceLink::new([4; 16], [2; 8]);
        scope.parent_trace = Some(parent);
        scope.idempotency_key = Some("idem-1".into());

        h.dispatcher.serve(&route, &scope, async { Outcome::no_content() }).await;

        let span = h.tracer.span(REQUEST_SPAN).unwrap();
        assert_eq!(span.parent, Some(parent));
        assert_eq!(span.trace_link.trace_id, parent.trace_id);
        assert_eq!(span.attribute("idempotency_key"), Some("idem-1"));
    }

    #[tokio::test]
    async fn test_commands_do_not_share_breakers() {
        let h = harness(CircuitBreakerConfig::default());
        let create = h.dispatcher.route("create-user").unwrap();
        let get = h.dispatcher.route("get-user").unwrap();

        for _ in 0..20 {
            h.dispatcher.serve(&create, &scope(), async { internal() }).await;
        }
        assert_eq!(create.breaker().state(), CircuitState::Open);

        let response = h.dispatcher.serve(&get, &scope(), async { Outcome::no_content() }).await;
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert_eq!(h.dispatcher.registry().len(), 2);
    }

    #[tokio::test]
    async fn test_overload_becomes_429_and_leaves_circuit_alone() {
        let h = harness(CircuitBreakerConfig {
            max_concurrent_requests: 1,
            timeout_ms: 60_000,
            ..CircuitBreakerConfig::default()
        });
        let route = h.dispatcher.route("get-user").unwrap();
        let (release, held) = oneshot::channel::<()>();
        let held_scope = scope();

        let mut first = pin!(h.dispatcher.serve(&route, &held_scope, async {
            let _ = held.await;
            Outcome::no_content()
        }));
        assert!(futures_util::poll!(first.as_mut()).is_pending());

        let calls = AtomicUsize::new(0);
        for _ in 0..25 {
            let response = h
                .dispatcher
                .serve(&route, &scope(), async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Outcome::no_content()
                })
                .await;
            assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
            let body = body_json(response).await;
            assert_eq!(body["code"], "circuit-breaker:too-many-requests");
            assert_eq!(body["type"], "srn:error:too_many_requests");
        }

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(route.breaker().state(), CircuitState::Closed);
        let cause = h.tracer.span(CAUSE_SPAN).unwrap();
        assert_eq!(cause.attribute("circuit.rejection"), Some("concurrency_limit"));
        assert!(cause.ended);

        release.send(()).unwrap();
        assert_eq!(first.await.status(), StatusCode::NO_CONTENT);
        assert_eq!(route.breaker().state(), CircuitState::Closed);
    }

    /// Tracer whose spans carry their parent's identity, as the no-op
    /// OpenTelemetry provider does.
    struct EchoTracer;

    struct EchoSpan(TraceLink);

    impl Tracer for EchoTracer {
        fn start_span(&self, _name: &str, options: SpanOptions) -> Box<dyn ActiveSpan> {
            Box::new(EchoSpan(options.parent.unwrap_or_default()))
        }
    }

    impl ActiveSpan for EchoSpan {
        fn trace_link(&self) -> TraceLink {
            self.0
        }

        fn set_attributes(&mut self, _attributes: &[SpanAttribute]) {}

        fn record_error(&mut self, _error: &(dyn std::error::Error + 'static)) {}

        fn set_status(&mut self, _status: SpanStatus) {}

        fn end(&mut self) {}
    }

    #[tokio::test]
    async fn test_inbound_parent_is_not_stored_as_failure_link() {
        let cache = Arc::new(MemoryCache::new());
        let registry = Arc::new(CircuitRegistry::new(CircuitBreakerConfig::default()).unwrap());
        let dispatcher = Dispatcher::new(registry, cache.clone(), Arc::new(EchoTracer), "test");
        let route = dispatcher.route("create-user").unwrap();

        let mut with_parent = scope();
        with_parent.parent_trace = Some(TraceLink::new([4; 16], [2; 8]));
        let response = dispatcher.serve(&route, &with_parent, async { internal() }).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!cache.exists("create-user").await.unwrap());

        let response = dispatcher.serve(&route, &scope(), async { internal() }).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!cache.exists("create-user").await.unwrap());
    }
}
