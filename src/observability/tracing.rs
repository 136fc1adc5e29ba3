//! Distributed tracing.
//!
//! # Responsibilities
//! - `Tracer` / `ActiveSpan` ports used by the dispatcher
//! - `TraceLink`: the (trace id, span id) pair that identifies a span
//! - OpenTelemetry adapter and provider bootstrap
//! - W3C `traceparent` parsing for inbound parents
//!
//! # Design Decisions
//! - The dispatcher never touches OpenTelemetry types directly, so tests can
//!   swap in the in-memory `RecordingTracer`
//! - An all-zero id is treated as "no span" everywhere

use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;

use opentelemetry::global::{self, BoxedSpan, BoxedTracer};
use opentelemetry::propagation::TextMapPropagator as _;
use opentelemetry::trace::{
    Link, Span as _, SpanContext, SpanId, SpanKind as OtelSpanKind, Status, TraceContextExt as _,
    TraceFlags, TraceId, TraceState, Tracer as _,
};
use opentelemetry::{Context, KeyValue};
use opentelemetry_sdk::propagation::TraceContextPropagator;
use opentelemetry_sdk::trace::{self as sdktrace, Sampler};
use opentelemetry_sdk::Resource;
use serde::{Deserialize, Serialize};

use crate::config::schema::ObservabilityConfig;

const TRACEPARENT: &str = "traceparent";

/// Identity of a span, persisted so later spans can link back to it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TraceLink {
    pub trace_id: [u8; 16],
    pub span_id: [u8; 8],
}

impl TraceLink {
    pub fn new(trace_id: [u8; 16], span_id: [u8; 8]) -> Self {
        Self { trace_id, span_id }
    }

    pub fn is_empty(&self) -> bool {
        self.trace_id == [0; 16] || self.span_id == [0; 8]
    }

    /// `Some(self)` unless empty.
    pub fn non_empty(self) -> Option<Self> {
        (!self.is_empty()).then_some(self)
    }

    /// Parse a W3C `traceparent` header (`00-<trace>-<span>-<flags>`).
    pub fn from_traceparent(header: &str) -> Option<Self> {
        let carrier = HashMap::from([(TRACEPARENT.to_owned(), header.trim().to_owned())]);
        let context = TraceContextPropagator::new().extract(&carrier);
        let remote = context.span().span_context().clone();
        if !remote.is_valid() {
            return None;
        }
        Self::new(remote.trace_id().to_bytes(), remote.span_id().to_bytes()).non_empty()
    }

    pub fn trace_id_hex(&self) -> String {
        TraceId::from_bytes(self.trace_id).to_string()
    }

    pub fn span_id_hex(&self) -> String {
        SpanId::from_bytes(self.span_id).to_string()
    }
}

impl fmt::Display for TraceLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.trace_id_hex(), self.span_id_hex())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SpanKind {
    Server,
    #[default]
    Internal,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum SpanStatus {
    #[default]
    Unset,
    Ok,
    Error(String),
}

#[derive(Debug, Clone, Default)]
pub struct SpanOptions {
    pub kind: SpanKind,
    /// Remote parent; a new trace is started when absent.
    pub parent: Option<TraceLink>,
    /// Causal link to an unrelated earlier span.
    pub link: Option<TraceLink>,
}

pub type SpanAttribute = (&'static str, String);

pub trait ActiveSpan: Send {
    fn trace_link(&self) -> TraceLink;

    fn set_attributes(&mut self, attributes: &[SpanAttribute]);

    fn record_error(&mut self, error: &(dyn std::error::Error + 'static));

    fn set_status(&mut self, status: SpanStatus);

    fn end(&mut self);
}

pub trait Tracer: Send + Sync {
    fn start_span(&self, name: &str, options: SpanOptions) -> Box<dyn ActiveSpan>;
}

/// `Tracer` over the globally installed OpenTelemetry provider.
pub struct OtelTracer {
    tracer: BoxedTracer,
}

impl OtelTracer {
    /// Resolve the tracer now; call after `init_tracing`.
    pub fn new(instrumentation: impl Into<Cow<'static, str>>) -> Self {
        Self {
            tracer: global::tracer(instrumentation),
        }
    }
}

impl fmt::Debug for OtelTracer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OtelTracer").finish_non_exhaustive()
    }
}

fn remote_context(link: TraceLink) -> SpanContext {
    SpanContext::new(
        TraceId::from_bytes(link.trace_id),
        SpanId::from_bytes(link.span_id),
        TraceFlags::SAMPLED,
        true,
        TraceState::default(),
    )
}

impl Tracer for OtelTracer {
    fn start_span(&self, name: &str, options: SpanOptions) -> Box<dyn ActiveSpan> {
        let mut builder = self.tracer.span_builder(name.to_owned());
        builder.span_kind = Some(match options.kind {
            SpanKind::Server => OtelSpanKind::Server,
            SpanKind::Internal => OtelSpanKind::Internal,
        });
        if let Some(link) = options.link.and_then(TraceLink::non_empty) {
            builder.links = Some(vec![Link::new(remote_context(link), Vec::new())]);
        }

        let parent = match options.parent.and_then(TraceLink::non_empty) {
            Some(parent) => Context::new().with_remote_span_context(remote_context(parent)),
            None => Context::new(),
        };

        let span = self.tracer.build_with_context(builder, &parent);
        Box::new(OtelSpan { span })
    }
}

struct OtelSpan {
    span: BoxedSpan,
}

impl ActiveSpan for OtelSpan {
    fn trace_link(&self) -> TraceLink {
        let context = self.span.span_context();
        TraceLink::new(
            context.trace_id().to_bytes(),
            context.span_id().to_bytes(),
        )
    }

    fn set_attributes(&mut self, attributes: &[SpanAttribute]) {
        for (key, value) in attributes {
            self.span.set_attribute(KeyValue::new(*key, value.clone()));
        }
    }

    fn record_error(&mut self, error: &(dyn std::error::Error + 'static)) {
        self.span.record_error(error);
    }

    fn set_status(&mut self, status: SpanStatus) {
        match status {
            SpanStatus::Unset => {}
            SpanStatus::Ok => self.span.set_status(Status::Ok),
            SpanStatus::Error(description) => self.span.set_status(Status::error(description)),
        }
    }

    fn end(&mut self) {
        self.span.end();
    }
}

/// Install the SDK tracer provider as the global provider.
///
/// Spans get real ids and sampling decisions; no exporter is attached here,
/// so deployments add one to the provider builder when they ship traces.
pub fn init_tracing(config: &ObservabilityConfig, environment: &str) {
    let resource = Resource::new(vec![
        KeyValue::new("service.name", config.service_name.clone()),
        KeyValue::new("deployment.environment", environment.to_owned()),
        KeyValue::new("service.version", env!("CARGO_PKG_VERSION")),
        KeyValue::new("library.language", "rust"),
    ]);

    let sampler = Sampler::ParentBased(Box::new(Sampler::TraceIdRatioBased(
        config.sampling_ratio,
    )));

    let provider = sdktrace::TracerProvider::builder()
        .with_config(sdktrace::config().with_sampler(sampler).with_resource(resource))
        .build();

    global::set_tracer_provider(provider);
    ::tracing::info!(
        service_name = %config.service_name,
        sampling_ratio = config.sampling_ratio,
        "Tracer provider installed"
    );
}

/// Flush and drop the global provider.
pub fn shutdown_tracing() {
    global::shutdown_tracer_provider();
}

#[cfg(any(test, feature = "test-util"))]
pub use recording::{RecordedSpan, RecordingTracer};

#[cfg(any(test, feature = "test-util"))]
mod recording {
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::{Arc, Mutex};

    use super::*;

    /// Snapshot of a span started through `RecordingTracer`.
    #[derive(Debug, Clone)]
    pub struct RecordedSpan {
        pub name: String,
        pub kind: SpanKind,
        pub parent: Option<TraceLink>,
        pub link: Option<TraceLink>,
        pub trace_link: TraceLink,
        pub attributes: Vec<SpanAttribute>,
        pub errors: Vec<String>,
        pub status: SpanStatus,
        pub ended: bool,
    }

    impl RecordedSpan {
        pub fn attribute(&self, key: &str) -> Option<&str> {
            self.attributes
                .iter()
                .rev()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| v.as_str())
        }
    }

    /// In-memory tracer for tests.
    #[derive(Debug, Default)]
    pub struct RecordingTracer {
        spans: Arc<Mutex<Vec<RecordedSpan>>>,
        next_id: AtomicU64,
    }

    impl RecordingTracer {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn spans(&self) -> Vec<RecordedSpan> {
            self.spans.lock().expect("recording tracer poisoned").clone()
        }

        /// Most recent span called `name`.
        pub fn span(&self, name: &str) -> Option<RecordedSpan> {
            self.spans().into_iter().rev().find(|s| s.name == name)
        }
    }

    impl Tracer for RecordingTracer {
        fn start_span(&self, name: &str, options: SpanOptions) -> Box<dyn ActiveSpan> {
            let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
            let parent = options.parent.and_then(TraceLink::non_empty);
            let trace_id = match parent {
                Some(parent) => parent.trace_id,
                None => u128::from(id).to_be_bytes(),
            };
            let trace_link = TraceLink::new(trace_id, id.to_be_bytes());

            let mut spans = self.spans.lock().expect("recording tracer poisoned");
            spans.push(RecordedSpan {
                name: name.to_owned(),
                kind: options.kind,
                parent,
                link: options.link.and_then(TraceLink::non_empty),
                trace_link,
                attributes: Vec::new(),
                errors: Vec::new(),
                status: SpanStatus::Unset,
                ended: false,
            });

            Box::new(RecordingSpan {
                index: spans.len() - 1,
                trace_link,
                spans: self.spans.clone(),
            })
        }
    }

    struct RecordingSpan {
        index: usize,
        trace_link: TraceLink,
        spans: Arc<Mutex<Vec<RecordedSpan>>>,
    }

    impl RecordingSpan {
        fn update(&self, f: impl FnOnce(&mut RecordedSpan)) {
            let mut spans = self.spans.lock().expect("recording tracer poisoned");
            f(&mut spans[self.index]);
        }
    }

    impl ActiveSpan for RecordingSpan {
        fn trace_link(&self) -> TraceLink {
            self.trace_link
        }

        fn set_attributes(&mut self, attributes: &[SpanAttribute]) {
            self.update(|span| span.attributes.extend_from_slice(attributes));
        }

        fn record_error(&mut self, error: &(dyn std::error::Error + 'static)) {
            let message = error.to_string();
            self.update(|span| span.errors.push(message));
        }

        fn set_status(&mut self, status: SpanStatus) {
            self.update(|span| span.status = status);
        }

        fn end(&mut self) {
            self.update(|span| span.ended = true);
        }
    }
}
