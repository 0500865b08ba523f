use std::time::Duration;

use opentelemetry_sdk::metrics::{PeriodicReader, SdkMeterProvider};
use opentelemetry_sdk::Resource;

use super::shutdown_result;
use crate::config::{Signal, SignalConfig};
use crate::error::{TelemetryError, TelemetryResult};
use crate::exporter::metric_exporter;

pub const METRICS_EXPORT_INTERVAL: Duration = Duration::from_secs(10);

/// Owns the OTLP metric exporter behind a periodic reader.
#[derive(Debug, Clone, Default)]
pub struct MetricsProvider {
    meter_provider: Option<SdkMeterProvider>,
}

impl MetricsProvider {
    pub fn new(config: &SignalConfig, resource: Resource) -> TelemetryResult<Self> {
        let endpoint = config.metrics_endpoint();
        if endpoint.is_empty() {
            return Err(TelemetryError::NoEndpoint {
                signal: Signal::Metrics,
            });
        }

        let exporter = metric_exporter(endpoint, config.insecure)?;
        let reader = PeriodicReader::builder(exporter)
            .with_interval(METRICS_EXPORT_INTERVAL)
            .build();
        let meter_provider = SdkMeterProvider::builder()
            .with_resource(resource)
            .with_reader(reader)
            .build();

        Ok(Self {
            meter_provider: Some(meter_provider),
        })
    }

    pub fn meter_provider(&self) -> Option<&SdkMeterProvider> {
        self.meter_provider.as_ref()
    }

    /// Collects and exports pending metrics one last time, then releases the
    /// exporter.
    pub fn shutdown(&self) -> TelemetryResult<()> {
        match &self.meter_provider {
            Some(provider) => shutdown_result(Signal::Metrics, provider.shutdown()),
            None => Ok(()),
        }
    }
}
