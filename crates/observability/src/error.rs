use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::config::Signal;
use crate::shutdown::ShutdownHandle;

/// Errors raised while building or tearing down telemetry signals.
#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("invalid endpoint URL {endpoint:?}: {source}")]
    InvalidEndpoint {
        endpoint: String,
        #[source]
        source: url::ParseError,
    },
    #[error("unsupported endpoint scheme: {scheme} (use 'rpc', 'http', or 'https')")]
    UnsupportedScheme { scheme: String },
    #[error("{signal} disabled: no endpoint configured")]
    NoEndpoint { signal: Signal },
    #[error("failed to create OTLP {signal} exporter: {source}")]
    ExporterBuild {
        signal: Signal,
        #[source]
        source: opentelemetry_otlp::ExporterBuildError,
    },
    #[error("failed to shut down {signal} provider: {source}")]
    Shutdown {
        signal: Signal,
        #[source]
        source: opentelemetry_sdk::error::OTelSdkError,
    },
    #[error("{signal} provider did not shut down within {timeout:?}")]
    ShutdownTimeout { signal: Signal, timeout: Duration },
    #[error("{signal} provider shutdown task aborted")]
    ShutdownAborted { signal: Signal },
}

impl TelemetryError {
    /// Malformed or unsupported endpoints; fatal for the affected signal only.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            TelemetryError::InvalidEndpoint { .. } | TelemetryError::UnsupportedScheme { .. }
        )
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, TelemetryError::ShutdownTimeout { .. })
    }

    pub fn signal(&self) -> Option<Signal> {
        match self {
            TelemetryError::NoEndpoint { signal }
            | TelemetryError::ExporterBuild { signal, .. }
            | TelemetryError::Shutdown { signal, .. }
            | TelemetryError::ShutdownTimeout { signal, .. }
            | TelemetryError::ShutdownAborted { signal } => Some(*signal),
            TelemetryError::InvalidEndpoint { .. } | TelemetryError::UnsupportedScheme { .. } => {
                None
            }
        }
    }
}

pub type TelemetryResult<T> = Result<T, TelemetryError>;

/// Every provider failure collected by one composed shutdown.
#[derive(Debug)]
pub struct ShutdownError {
    failures: Vec<TelemetryError>,
}

impl ShutdownError {
    pub(crate) fn from_failures(failures: Vec<TelemetryError>) -> Option<Self> {
        if failures.is_empty() {
            None
        } else {
            Some(Self { failures })
        }
    }

    pub fn failures(&self) -> &[TelemetryError] {
        &self.failures
    }

    pub fn into_failures(self) -> Vec<TelemetryError> {
        self.failures
    }
}

impl fmt::Display for ShutdownError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, failure) in self.failures.iter().enumerate() {
            if i > 0 {
                f.write_str("\n")?;
            }
            write!(f, "{failure}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ShutdownError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.failures
            .first()
            .map(|e| e as &(dyn std::error::Error + 'static))
    }
}

/// A failed setup. The handle releases whichever providers were built before
/// the failing signal.
#[derive(Debug, Error)]
#[error("telemetry setup failed: {source}")]
pub struct SetupError {
    #[source]
    pub source: TelemetryError,
    pub shutdown: ShutdownHandle,
}

impl SetupError {
    pub fn into_parts(self) -> (TelemetryError, ShutdownHandle) {
        (self.source, self.shutdown)
    }
}
