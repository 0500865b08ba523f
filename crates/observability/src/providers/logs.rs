use opentelemetry_sdk::logs::SdkLoggerProvider;
use opentelemetry_sdk::Resource;

use super::shutdown_result;
use crate::config::{Signal, SignalConfig};
use crate::error::{TelemetryError, TelemetryResult};
use crate::exporter::log_exporter;

/// Owns the OTLP log exporter behind a batch log processor.
#[derive(Debug, Clone, Default)]
pub struct LogsProvider {
    logger_provider: Option<SdkLoggerProvider>,
}

impl LogsProvider {
    pub fn new(config: &SignalConfig, resource: Resource) -> TelemetryResult<Self> {
        let endpoint = config.logs_endpoint();
        if endpoint.is_empty() {
            return Err(TelemetryError::NoEndpoint {
                signal: Signal::Logs,
            });
        }

        let exporter = log_exporter(endpoint, config.insecure)?;
        let logger_provider = SdkLoggerProvider::builder()
            .with_resource(resource)
            .with_batch_exporter(exporter)
            .build();

        Ok(Self {
            logger_provider: Some(logger_provider),
        })
    }

    pub fn logger_provider(&self) -> Option<&SdkLoggerProvider> {
        self.logger_provider.as_ref()
    }

    pub fn shutdown(&self) -> TelemetryResult<()> {
        match &self.logger_provider {
            Some(provider) => shutdown_result(Signal::Logs, provider.shutdown()),
            None => Ok(()),
        }
    }
}
