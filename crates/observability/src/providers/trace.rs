use opentelemetry_sdk::trace::SdkTracerProvider;
use opentelemetry_sdk::Resource;

use super::shutdown_result;
use crate::config::{Signal, SignalConfig};
use crate::error::{TelemetryError, TelemetryResult};
use crate::exporter::span_exporter;

/// Owns the OTLP span exporter behind a batch span processor.
#[derive(Debug, Clone, Default)]
pub struct TraceProvider {
    tracer_provider: Option<SdkTracerProvider>,
}

impl TraceProvider {
    pub fn new(config: &SignalConfig, resource: Resource) -> TelemetryResult<Self> {
        let endpoint = config.traces_endpoint();
        if endpoint.is_empty() {
            return Err(TelemetryError::NoEndpoint {
                signal: Signal::Traces,
            });
        }

        let exporter = span_exporter(endpoint, config.insecure)?;
        let tracer_provider = SdkTracerProvider::builder()
            .with_resource(resource)
            .with_batch_exporter(exporter)
            .build();

        Ok(Self {
            tracer_provider: Some(tracer_provider),
        })
    }

    pub fn tracer_provider(&self) -> Option<&SdkTracerProvider> {
        self.tracer_provider.as_ref()
    }

    /// Flushes queued spans and releases the exporter. A provider that was
    /// never built shuts down successfully.
    pub fn shutdown(&self) -> TelemetryResult<()> {
        match &self.tracer_provider {
            Some(provider) => shutdown_result(Signal::Traces, provider.shutdown()),
            None => Ok(()),
        }
    }
}
