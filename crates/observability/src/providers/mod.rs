//! One provider per signal. Each owns its exporter behind the SDK's batching
//! or periodic-export wrapper and shuts it down on request.

mod logs;
mod metrics;
mod trace;

pub use logs::LogsProvider;
pub use metrics::{MetricsProvider, METRICS_EXPORT_INTERVAL};
pub use trace::TraceProvider;

use opentelemetry_sdk::error::OTelSdkResult;

use crate::config::Signal;
use crate::error::{TelemetryError, TelemetryResult};

fn shutdown_result(signal: Signal, result: OTelSdkResult) -> TelemetryResult<()> {
    result.map_err(|source| TelemetryError::Shutdown { signal, source })
}
