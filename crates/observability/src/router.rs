//! Request tracing for the proxy filter path.
//!
//! The filter receives headers as an ordered, immutable list rather than an
//! HTTP header map, and forwards trace context downstream through a plain map.

use std::collections::HashMap;

use opentelemetry::trace::{SpanKind, SpanRef, Status, TraceContextExt, Tracer};
use opentelemetry::{Context, KeyValue};
use serde::{Deserialize, Serialize};

use crate::propagation::{extract_context, inject_into_map, ProxyHeaderCarrier};

pub const TRACER_NAME: &str = "mcp-router";
pub const REQUEST_SPAN_NAME: &str = "mcp-router.process";
pub const ERROR_SOURCE: &str = "ext-proc";

/// One header as delivered by the proxy. `value` is empty when the proxy only
/// populated the raw bytes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderEntry {
    pub key: String,
    #[serde(default)]
    pub value: String,
    #[serde(default)]
    pub raw_value: Vec<u8>,
}

impl HeaderEntry {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            raw_value: Vec::new(),
        }
    }

    pub fn raw(key: impl Into<String>, raw_value: impl Into<Vec<u8>>) -> Self {
        Self {
            key: key.into(),
            value: String::new(),
            raw_value: raw_value.into(),
        }
    }

    /// `value` when set, otherwise the raw bytes if they are valid UTF-8.
    pub fn as_str(&self) -> Option<&str> {
        if !self.value.is_empty() {
            return Some(&self.value);
        }
        std::str::from_utf8(&self.raw_value).ok()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderList {
    pub headers: Vec<HeaderEntry>,
}

impl HeaderList {
    pub fn new(headers: Vec<HeaderEntry>) -> Self {
        Self { headers }
    }

    /// First entry whose key matches, ignoring ASCII case.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|entry| entry.key.eq_ignore_ascii_case(key))
            .and_then(HeaderEntry::as_str)
    }

    pub fn keys(&self) -> Vec<&str> {
        self.headers.iter().map(|entry| entry.key.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.headers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }
}

/// The parts of an MCP request that end up on the request span.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct McpRequest {
    pub method: String,
    #[serde(default)]
    pub session_id: String,
    #[serde(default)]
    pub server_name: String,
    #[serde(default)]
    pub tool_name: String,
}

impl McpRequest {
    pub fn new(method: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            ..Default::default()
        }
    }

    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = session_id.into();
        self
    }

    pub fn with_server_name(mut self, server_name: impl Into<String>) -> Self {
        self.server_name = server_name.into();
        self
    }

    pub fn with_tool_name(mut self, tool_name: impl Into<String>) -> Self {
        self.tool_name = tool_name.into();
        self
    }
}

pub fn span_attributes(request: &McpRequest) -> Vec<KeyValue> {
    let mut attrs = vec![KeyValue::new("mcp.method.name", request.method.clone())];
    if !request.session_id.is_empty() {
        attrs.push(KeyValue::new("mcp.session.id", request.session_id.clone()));
    }
    if !request.server_name.is_empty() {
        attrs.push(KeyValue::new("mcp.server", request.server_name.clone()));
    }
    if !request.tool_name.is_empty() {
        attrs.push(KeyValue::new("mcp.tool", request.tool_name.clone()));
    }
    attrs
}

/// Trace context carried by the proxy headers, layered on `parent`. A missing
/// header list behaves like an empty one.
pub fn extract_trace_context(parent: &Context, headers: Option<&HeaderList>) -> Context {
    extract_context(parent, &ProxyHeaderCarrier(headers))
}

/// Headers to attach to the call forwarded downstream.
pub fn inject_trace_context(cx: &Context) -> HashMap<String, String> {
    inject_into_map(cx)
}

/// Starts the server span for one filtered request, continuing any trace the
/// proxy headers carry.
pub fn start_request_span<T>(
    tracer: &T,
    parent: &Context,
    headers: Option<&HeaderList>,
    request: &McpRequest,
) -> Context
where
    T: Tracer,
    T::Span: Send + Sync + 'static,
{
    let parent = extract_trace_context(parent, headers);
    let span = tracer
        .span_builder(REQUEST_SPAN_NAME)
        .with_kind(SpanKind::Server)
        .with_attributes(span_attributes(request))
        .start_with_context(tracer, &parent);
    parent.with_span(span)
}

pub fn record_error(span: &SpanRef<'_>, err: &dyn std::error::Error, status_code: u16) {
    span.record_error(err);
    span.set_status(Status::error(err.to_string()));
    span.set_attributes([
        KeyValue::new("error", true),
        KeyValue::new("error_source", ERROR_SOURCE),
        KeyValue::new("http.status_code", i64::from(status_code)),
    ]);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::propagation::install_propagator;
    use opentelemetry::trace::TracerProvider as _;
    use opentelemetry::Value;
    use opentelemetry_sdk::trace::{InMemorySpanExporter, SdkTracerProvider};

    const TRACEPARENT: &str = "00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01";

    fn provider() -> (SdkTracerProvider, InMemorySpanExporter) {
        let exporter = InMemorySpanExporter::default();
        let provider = SdkTracerProvider::builder()
            .with_simple_exporter(exporter.clone())
            .build();
        (provider, exporter)
    }

    fn attr<'a>(attrs: &'a [KeyValue], key: &str) -> Option<&'a Value> {
        attrs
            .iter()
            .find(|kv| kv.key.as_str() == key)
            .map(|kv| &kv.value)
    }

    #[test]
    fn header_lookup_is_first_match_and_case_insensitive() {
        let list = HeaderList::new(vec![
            HeaderEntry::new("X-Request-Id", "first"),
            HeaderEntry::new("x-request-id", "second"),
            HeaderEntry::raw("mcp-session-id", b"abc".to_vec()),
            HeaderEntry::raw("x-binary", vec![0xff, 0xfe]),
        ]);
        assert_eq!(list.get("x-request-id"), Some("first"));
        assert_eq!(list.get("MCP-SESSION-ID"), Some("abc"));
        assert_eq!(list.get("x-binary"), None);
        assert_eq!(list.get("absent"), None);
        assert_eq!(list.len(), 4);
    }

    #[test]
    fn attributes_skip_empty_fields() {
        let attrs = span_attributes(&McpRequest::new("initialize"));
        assert_eq!(attrs.len(), 1);
        assert_eq!(
            attr(&attrs, "mcp.method.name"),
            Some(&Value::from("initialize"))
        );

        let attrs = span_attributes(
            &McpRequest::new("tools/call")
                .with_session_id("s-1")
                .with_server_name("weather")
                .with_tool_name("forecast"),
        );
        assert_eq!(attrs.len(), 4);
        assert_eq!(attr(&attrs, "mcp.session.id"), Some(&Value::from("s-1")));
        assert_eq!(attr(&attrs, "mcp.server"), Some(&Value::from("weather")));
        assert_eq!(attr(&attrs, "mcp.tool"), Some(&Value::from("forecast")));
    }

    #[test]
    fn request_span_continues_proxy_trace_and_propagates_downstream() {
        install_propagator();
        let (provider, exporter) = provider();
        let tracer = provider.tracer(TRACER_NAME);

        let headers = HeaderList::new(vec![HeaderEntry::new("traceparent", TRACEPARENT)]);
        let request = McpRequest::new("tools/call").with_tool_name("forecast");
        let cx = start_request_span(&tracer, &Context::new(), Some(&headers), &request);

        let downstream = inject_trace_context(&cx);
        let traceparent = downstream.get("traceparent").cloned().unwrap_or_default();
        assert!(traceparent.starts_with("00-4bf92f3577b34da6a3ce929d0e0e4736-"));
        // the downstream parent is the new span, not the proxy's
        assert!(!traceparent.contains("00f067aa0ba902b7"));

        cx.span().end();
        let spans = exporter.get_finished_spans().unwrap();
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].name, REQUEST_SPAN_NAME);
        assert_eq!(spans[0].span_kind, SpanKind::Server);
        assert_eq!(
            spans[0].span_context.trace_id().to_string(),
            "4bf92f3577b34da6a3ce929d0e0e4736"
        );
        assert_eq!(
            attr(&spans[0].attributes, "mcp.tool"),
            Some(&Value::from("forecast"))
        );
    }

    #[test]
    fn missing_headers_start_a_new_trace() {
        install_propagator();
        let (provider, exporter) = provider();
        let tracer = provider.tracer(TRACER_NAME);

        let cx = start_request_span(&tracer, &Context::new(), None, &McpRequest::new("ping"));
        assert!(cx.span().span_context().is_valid());
        cx.span().end();

        let spans = exporter.get_finished_spans().unwrap();
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].parent_span_id, opentelemetry::trace::SpanId::INVALID);
    }

    #[test]
    fn record_error_marks_span() {
        let (provider, exporter) = provider();
        let tracer = provider.tracer(TRACER_NAME);

        let cx = Context::new().with_span(tracer.start("filter"));
        let err = std::io::Error::other("upstream refused");
        record_error(&cx.span(), &err, 503);
        cx.span().end();

        let spans = exporter.get_finished_spans().unwrap();
        let span = &spans[0];
        assert_eq!(span.status, Status::error("upstream refused"));
        assert_eq!(attr(&span.attributes, "error"), Some(&Value::Bool(true)));
        assert_eq!(
            attr(&span.attributes, "error_source"),
            Some(&Value::from(ERROR_SOURCE))
        );
        assert_eq!(
            attr(&span.attributes, "http.status_code"),
            Some(&Value::I64(503))
        );
        assert_eq!(span.events.events.len(), 1);
        assert_eq!(span.events.events[0].name, "exception");
    }
}
