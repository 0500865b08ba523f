use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::{span, Event, Level, Subscriber};
use tracing_subscriber::filter::Targets;
use tracing_subscriber::layer::{Context, Layer};
use tracing_subscriber::registry::LookupSpan;

use super::BoxedLayer;

/// Count of sink callbacks that panicked, shared by clones.
#[derive(Debug, Clone, Default)]
pub struct SinkFailures(Arc<AtomicU64>);

impl SinkFailures {
    pub fn count(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }

    fn record(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }
}

struct Sink<S> {
    layer: BoxedLayer<S>,
    filter: Targets,
}

/// Fans every event out to an ordered set of sink layers.
///
/// A sink only sees the events its own filter accepts. A sink that fails is
/// counted in [`SinkFailures`] and skipped: later sinks still receive the
/// event and the failure never reaches the emitting code. Span callbacks go to
/// every sink so span fields stay in step across all of them.
pub struct MultiHandler<S> {
    sinks: Vec<Sink<S>>,
    failures: SinkFailures,
}

impl<S> MultiHandler<S>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    pub fn new() -> Self {
        Self {
            sinks: Vec::new(),
            failures: SinkFailures::default(),
        }
    }

    /// Appends a sink. `layer` must not carry its own per-layer filter;
    /// `filter` takes that role.
    pub fn with_sink(mut self, layer: impl Layer<S> + Send + Sync + 'static, filter: Targets) -> Self {
        self.sinks.push(Sink {
            layer: Box::new(layer),
            filter,
        });
        self
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }

    pub fn failures(&self) -> SinkFailures {
        self.failures.clone()
    }

    /// True if any sink accepts events from `target` at `level`.
    pub fn enabled(&self, target: &str, level: &Level) -> bool {
        self.sinks
            .iter()
            .any(|sink| sink.filter.would_enable(target, level))
    }

    fn isolated(&self, call: impl FnOnce()) {
        if panic::catch_unwind(AssertUnwindSafe(call)).is_err() {
            self.failures.record();
        }
    }

    fn each(&self, mut call: impl FnMut(&BoxedLayer<S>)) {
        for sink in &self.sinks {
            self.isolated(|| call(&sink.layer));
        }
    }
}

impl<S> Default for MultiHandler<S>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<S> Layer<S> for MultiHandler<S>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_new_span(&self, attrs: &span::Attributes<'_>, id: &span::Id, ctx: Context<'_, S>) {
        self.each(|layer| layer.on_new_span(attrs, id, ctx.clone()));
    }

    fn on_record(&self, id: &span::Id, values: &span::Record<'_>, ctx: Context<'_, S>) {
        self.each(|layer| layer.on_record(id, values, ctx.clone()));
    }

    fn on_follows_from(&self, id: &span::Id, follows: &span::Id, ctx: Context<'_, S>) {
        self.each(|layer| layer.on_follows_from(id, follows, ctx.clone()));
    }

    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        let metadata = event.metadata();
        for sink in &self.sinks {
            if sink.filter.would_enable(metadata.target(), metadata.level()) {
                self.isolated(|| sink.layer.on_event(event, ctx.clone()));
            }
        }
    }

    fn on_enter(&self, id: &span::Id, ctx: Context<'_, S>) {
        self.each(|layer| layer.on_enter(id, ctx.clone()));
    }

    fn on_exit(&self, id: &span::Id, ctx: Context<'_, S>) {
        self.each(|layer| layer.on_exit(id, ctx.clone()));
    }

    fn on_close(&self, id: span::Id, ctx: Context<'_, S>) {
        self.each(|layer| layer.on_close(id.clone(), ctx.clone()));
    }

    fn on_id_change(&self, old: &span::Id, new: &span::Id, ctx: Context<'_, S>) {
        self.each(|layer| layer.on_id_change(old, new, ctx.clone()));
    }
}
