//! Server-side HTTP tracing for axum applications.
//!
//! ```ignore
//! let app = Router::new()
//!     .route("/mcp", post(handle))
//!     .layer(axum::middleware::from_fn_with_state(
//!         HttpTracing::global(),
//!         trace_requests::<BoxedTracer>,
//!     ));
//! ```

use std::sync::Arc;
use std::time::Instant;

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;
use http::header::HOST;
use http::StatusCode;
use opentelemetry::global::{self, BoxedTracer};
use opentelemetry::metrics::{Counter, Histogram, Meter};
use opentelemetry::trace::{
    FutureExt, SpanKind, SpanRef, Status, TraceContextExt, Tracer,
};
use opentelemetry::{Context, KeyValue};

use crate::propagation::{extract_context, HttpHeaderCarrier};

pub const TRACER_NAME: &str = "mcp-broker";
pub const HTTP_SPAN_NAME: &str = "mcp-broker.http";
pub const SESSION_ID_HEADER: &str = "mcp-session-id";
const INCOMPLETE_STATUS: &str = "request did not complete";

/// Starts a span named `name` under `parent` with the given attributes and
/// returns the context holding it.
pub fn start_span<T>(tracer: &T, parent: &Context, name: &'static str, attrs: Vec<KeyValue>) -> Context
where
    T: Tracer,
    T::Span: Send + Sync + 'static,
{
    let span = tracer
        .span_builder(name)
        .with_attributes(attrs)
        .start_with_context(tracer, parent);
    parent.with_span(span)
}

/// Marks the span failed and records where the error came from.
pub fn record_error(span: &SpanRef<'_>, err: &dyn std::error::Error, source: &str) {
    span.record_error(err);
    span.set_status(Status::error(err.to_string()));
    span.set_attributes([
        KeyValue::new("error", true),
        KeyValue::new("error_source", source.to_string()),
    ]);
}

/// Request counter and latency histogram recorded per traced request.
#[derive(Clone)]
pub struct HttpMetrics {
    requests: Counter<u64>,
    duration: Histogram<f64>,
}

impl HttpMetrics {
    pub fn new(meter: &Meter) -> Self {
        Self {
            requests: meter
                .u64_counter("http.server.requests")
                .with_description("Number of HTTP requests handled")
                .build(),
            duration: meter
                .f64_histogram("http.server.duration")
                .with_description("HTTP request handling time")
                .with_unit("s")
                .build(),
        }
    }

    pub fn global() -> Self {
        Self::new(&global::meter(TRACER_NAME))
    }

    fn record(&self, method: &str, status: u16, started: Instant) {
        let attrs = [
            KeyValue::new("http.method", method.to_string()),
            KeyValue::new("http.status_code", i64::from(status)),
        ];
        self.requests.add(1, &attrs);
        self.duration.record(started.elapsed().as_secs_f64(), &attrs);
    }
}

/// Middleware state: the tracer that owns request spans plus optional metrics.
pub struct HttpTracing<T = BoxedTracer> {
    tracer: Arc<T>,
    metrics: Option<HttpMetrics>,
}

impl<T> Clone for HttpTracing<T> {
    fn clone(&self) -> Self {
        Self {
            tracer: Arc::clone(&self.tracer),
            metrics: self.metrics.clone(),
        }
    }
}

impl HttpTracing<BoxedTracer> {
    /// Uses the globally installed tracer provider.
    pub fn global() -> Self {
        Self::new(global::tracer(TRACER_NAME))
    }
}

impl<T> HttpTracing<T> {
    pub fn new(tracer: T) -> Self {
        Self {
            tracer: Arc::new(tracer),
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: HttpMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }
}

/// Ends the request span exactly once, whichever way the handler exits.
struct SpanGuard {
    cx: Context,
    method: String,
    status: Option<StatusCode>,
    metrics: Option<HttpMetrics>,
    started: Instant,
}

impl Drop for SpanGuard {
    fn drop(&mut self) {
        let span = self.cx.span();
        let Some(status) = self.status else {
            // handler panicked or the request future was dropped
            span.set_status(Status::error(INCOMPLETE_STATUS));
            span.end();
            return;
        };

        span.set_attribute(KeyValue::new("http.status_code", i64::from(status.as_u16())));
        if status.as_u16() >= 400 {
            let text = status.canonical_reason().unwrap_or("unknown status");
            span.set_status(Status::error(text));
        }
        if let Some(metrics) = &self.metrics {
            metrics.record(&self.method, status.as_u16(), self.started);
        }
        span.end();
    }
}

/// Traces one inbound request.
///
/// The extracted context becomes the parent of a server span, the span context
/// is made current while the inner handler runs and is also available to
/// handlers as an `Extension<Context>`.
pub async fn trace_requests<T>(
    State(state): State<HttpTracing<T>>,
    mut request: Request,
    next: Next,
) -> Response
where
    T: Tracer + Send + Sync + 'static,
    T::Span: Send + Sync + 'static,
{
    let started = Instant::now();
    let parent = extract_context(&Context::current(), &HttpHeaderCarrier(request.headers_mut()));

    let method = request.method().to_string();
    let host = request
        .headers()
        .get(HOST)
        .and_then(|value| value.to_str().ok())
        .or_else(|| request.uri().host())
        .unwrap_or_default()
        .to_string();
    let mut attrs = vec![
        KeyValue::new("http.method", method.clone()),
        KeyValue::new("http.path", request.uri().path().to_string()),
        KeyValue::new("http.host", host),
    ];
    if let Some(session_id) = request
        .headers()
        .get(SESSION_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.is_empty())
    {
        attrs.push(KeyValue::new("mcp.session_id", session_id.to_string()));
    }

    let span = state
        .tracer
        .span_builder(HTTP_SPAN_NAME)
        .with_kind(SpanKind::Server)
        .with_attributes(attrs)
        .start_with_context(state.tracer.as_ref(), &parent);
    let cx = parent.with_span(span);

    let mut guard = SpanGuard {
        cx: cx.clone(),
        method,
        status: None,
        metrics: state.metrics.clone(),
        started,
    };

    request.extensions_mut().insert(cx.clone());
    let response = next.run(request).with_context(cx).await;
    guard.status = Some(response.status());
    response
}
