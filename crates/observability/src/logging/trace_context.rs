use std::fmt;

use opentelemetry::trace::{SpanContext, TraceContextExt};
use opentelemetry::Context;
use serde_json::{Map, Value};
use tracing::{Event, Subscriber};
use tracing_opentelemetry::OpenTelemetrySpanExt;
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields};
use tracing_subscriber::registry::LookupSpan;

use super::format::LogFormat;

pub const TRACE_ID_KEY: &str = "trace_id";
pub const SPAN_ID_KEY: &str = "span_id";

/// Span context of the operation currently being logged.
///
/// The innermost `tracing` span wins when it is exported through
/// `tracing_opentelemetry`. Otherwise the current OpenTelemetry context counts
/// if its span is recording. Remote-only or invalid contexts yield `None`.
pub fn active_span_context() -> Option<SpanContext> {
    let current = tracing::Span::current();
    if !current.is_disabled() {
        let cx = current.context();
        let span = cx.span();
        let span_context = span.span_context();
        if span_context.is_valid() && span_context.is_sampled() && !span_context.is_remote() {
            return Some(span_context.clone());
        }
    }

    let cx = Context::current();
    let span = cx.span();
    if span.is_recording() && span.span_context().is_valid() {
        Some(span.span_context().clone())
    } else {
        None
    }
}

/// Event formatter adding `trace_id` and `span_id` to every line written while
/// a span is active. Other lines are left exactly as `inner` wrote them.
pub struct TracingFormat<F> {
    inner: F,
    format: LogFormat,
}

impl<F> TracingFormat<F> {
    pub fn new(inner: F, format: LogFormat) -> Self {
        Self { inner, format }
    }
}

impl<S, N, F> FormatEvent<S, N> for TracingFormat<F>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
    F: FormatEvent<S, N>,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let Some(span_context) = active_span_context() else {
            return self.inner.format_event(ctx, writer, event);
        };

        let mut buf = String::new();
        self.inner.format_event(ctx, Writer::new(&mut buf), event)?;
        let line = buf.trim_end_matches('\n');
        let trace_id = span_context.trace_id().to_string();
        let span_id = span_context.span_id().to_string();

        if self.format == LogFormat::Json {
            if let Ok(mut object) = serde_json::from_str::<Map<String, Value>>(line) {
                object.insert(TRACE_ID_KEY.to_string(), Value::from(trace_id));
                object.insert(SPAN_ID_KEY.to_string(), Value::from(span_id));
                let encoded = serde_json::to_string(&object).map_err(|_| fmt::Error)?;
                return writeln!(writer, "{encoded}");
            }
            return writeln!(writer, "{line}");
        }

        writeln!(writer, "{line} {TRACE_ID_KEY}={trace_id} {SPAN_ID_KEY}={span_id}")
    }
}
