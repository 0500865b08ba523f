//! Trace-correlated logging.
//!
//! Every `tracing` event goes to a local console sink whose lines carry
//! `trace_id`/`span_id` while a span is active. When logs export is enabled
//! the console is fanned out together with an OTLP bridge through a
//! [`MultiHandler`], so a failing collector never silences the console.

mod bridge;
mod format;
mod multi;
mod trace_context;

pub use bridge::{bridge_filter, otel_bridge, OtelBridge};
pub use format::{console_layer, LogFormat};
pub use multi::{MultiHandler, SinkFailures};
pub use trace_context::{active_span_context, TracingFormat, SPAN_ID_KEY, TRACE_ID_KEY};

use std::io;

use opentelemetry::trace::TracerProvider as _;
use opentelemetry_sdk::logs::SdkLoggerProvider;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;
use tracing::level_filters::LevelFilter;
use tracing::Subscriber;
use tracing_subscriber::filter::Targets;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::config::DEFAULT_SERVICE_NAME;
use crate::setup::Telemetry;

pub type BoxedLayer<S> = Box<dyn Layer<S> + Send + Sync + 'static>;

#[derive(Debug, Error)]
pub enum LogError {
    #[error("failed to install log subscriber: {0}")]
    Init(#[from] tracing_subscriber::util::TryInitError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggerOptions {
    #[serde(with = "level_filter")]
    pub level: LevelFilter,
    pub format: LogFormat,
}

impl Default for LoggerOptions {
    fn default() -> Self {
        Self {
            level: LevelFilter::INFO,
            format: LogFormat::Text,
        }
    }
}

mod level_filter {
    use serde::{Deserialize, Deserializer, Serializer};
    use tracing::level_filters::LevelFilter;

    pub fn serialize<S: Serializer>(level: &LevelFilter, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(level)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<LevelFilter, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Builds the logging layer: trace-correlated console output to `writer`,
/// fanned out with OTLP export when a logger provider is given.
pub fn new_tracing_logger<S>(
    writer: BoxMakeWriter,
    options: &LoggerOptions,
    logger_provider: Option<&SdkLoggerProvider>,
) -> BoxedLayer<S>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    let console = console_layer(writer, options.format);
    let console_filter = Targets::new().with_default(options.level);

    match logger_provider {
        None => console.with_filter(console_filter).boxed(),
        Some(provider) => MultiHandler::new()
            .with_sink(console, console_filter)
            .with_sink(otel_bridge(provider), bridge_filter(options.level))
            .boxed(),
    }
}

/// Installs the process-wide subscriber: `RUST_LOG` (falling back to the
/// configured level), the logging layer writing to stdout, and span export
/// when traces are enabled.
pub fn init_logging(options: &LoggerOptions, telemetry: &Telemetry) -> Result<(), LogError> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(options.level.to_string()));
    let logger = new_tracing_logger(
        BoxMakeWriter::new(io::stdout),
        options,
        telemetry.logger_provider(),
    );
    let span_export = telemetry.tracer_provider().map(|provider| {
        tracing_opentelemetry::layer().with_tracer(provider.tracer(DEFAULT_SERVICE_NAME))
    });

    tracing_subscriber::registry()
        .with(env_filter)
        .with(logger)
        .with(span_export)
        .try_init()?;

    info!(
        logging.format = %options.format,
        logging.level = %options.level,
        logging.export = telemetry.logger_provider().is_some(),
        "Logging initialized"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use format::tests::Buffer;
    use opentelemetry_sdk::logs::InMemoryLogExporter;

    #[test]
    fn console_only_without_provider() {
        let buffer = Buffer::default();
        let options = LoggerOptions {
            level: LevelFilter::DEBUG,
            format: LogFormat::Text,
        };
        let subscriber = tracing_subscriber::registry()
            .with(new_tracing_logger(buffer.boxed_writer(), &options, None));

        tracing::subscriber::with_default(subscriber, || {
            tracing::debug!("ready");
            tracing::trace!("too verbose");
        });

        let lines = buffer.lines();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].contains("ready"));
    }

    #[test]
    fn provider_adds_remote_sink() {
        let exporter = InMemoryLogExporter::default();
        let provider = SdkLoggerProvider::builder()
            .with_simple_exporter(exporter.clone())
            .build();
        let buffer = Buffer::default();
        let options = LoggerOptions {
            level: LevelFilter::INFO,
            format: LogFormat::Json,
        };
        let subscriber = tracing_subscriber::registry().with(new_tracing_logger(
            buffer.boxed_writer(),
            &options,
            Some(&provider),
        ));

        tracing::subscriber::with_default(subscriber, || {
            tracing::info!("both sinks");
            tracing::debug!("neither");
        });

        let lines = buffer.json_lines();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0]["message"], "both sinks");
        assert_eq!(exporter.get_emitted_logs().unwrap().len(), 1);
    }

    #[test]
    fn options_deserialize_from_names() {
        let options: LoggerOptions =
            serde_json::from_str(r#"{"level":"warn","format":"json"}"#).unwrap();
        assert_eq!(options.level, LevelFilter::WARN);
        assert_eq!(options.format, LogFormat::Json);
    }
}
