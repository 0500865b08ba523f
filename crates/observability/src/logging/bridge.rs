use opentelemetry_appender_tracing::layer::OpenTelemetryTracingBridge;
use opentelemetry_sdk::logs::{SdkLogger, SdkLoggerProvider};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::filter::Targets;

/// Crates on the export path itself. Forwarding their events would export
/// the exporter's own chatter in a loop.
const EXPORT_PATH_TARGETS: [&str; 5] = ["opentelemetry", "hyper", "tonic", "h2", "reqwest"];

pub type OtelBridge = OpenTelemetryTracingBridge<SdkLoggerProvider, SdkLogger>;

/// Remote sink emitting `tracing` events into the OTLP logs pipeline. Trace
/// context comes from the enclosing exported span, else from the current
/// OpenTelemetry context.
pub fn otel_bridge(provider: &SdkLoggerProvider) -> OtelBridge {
    OpenTelemetryTracingBridge::new(provider)
}

pub fn bridge_filter(level: LevelFilter) -> Targets {
    EXPORT_PATH_TARGETS
        .iter()
        .fold(Targets::new().with_default(level), |targets, target| {
            targets.with_target(*target, LevelFilter::OFF)
        })
}
