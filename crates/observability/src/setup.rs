use std::time::Duration;

use opentelemetry::global;
use opentelemetry_sdk::logs::SdkLoggerProvider;
use opentelemetry_sdk::metrics::SdkMeterProvider;
use opentelemetry_sdk::trace::SdkTracerProvider;
use tracing::info;

use crate::config::{BuildInfo, Signal, SignalConfig};
use crate::error::{SetupError, ShutdownError, TelemetryError};
use crate::propagation::install_propagator;
use crate::providers::{LogsProvider, MetricsProvider, TraceProvider};
use crate::resource::build_resource;
use crate::shutdown::ShutdownHandle;

/// Everything setup produced: the resolved configuration, one provider per
/// enabled signal and the composed shutdown.
///
/// Tracer and meter providers are also installed globally; the logger provider
/// is only reachable through this value.
#[derive(Debug)]
pub struct Telemetry {
    config: SignalConfig,
    trace: TraceProvider,
    metrics: MetricsProvider,
    logs: LogsProvider,
    shutdown: ShutdownHandle,
}

impl Telemetry {
    pub fn config(&self) -> &SignalConfig {
        &self.config
    }

    pub fn tracer_provider(&self) -> Option<&SdkTracerProvider> {
        self.trace.tracer_provider()
    }

    pub fn meter_provider(&self) -> Option<&SdkMeterProvider> {
        self.metrics.meter_provider()
    }

    /// `None` when logs export is disabled.
    pub fn logger_provider(&self) -> Option<&SdkLoggerProvider> {
        self.logs.logger_provider()
    }

    pub fn shutdown_handle(&self) -> &ShutdownHandle {
        &self.shutdown
    }

    pub fn into_shutdown(self) -> ShutdownHandle {
        self.shutdown
    }

    /// Shuts every enabled provider down once, bounded by `timeout`.
    pub async fn shutdown(self, timeout: Duration) -> Result<(), ShutdownError> {
        self.shutdown.shutdown(timeout).await
    }
}

/// Sets telemetry up from the `OTEL_*` environment.
///
/// Must run inside a Tokio runtime when any endpoint uses the `rpc` scheme.
pub fn setup_telemetry(build: &BuildInfo) -> Result<Telemetry, SetupError> {
    setup_telemetry_with_config(SignalConfig::from_env(build))
}

/// Installs the W3C trace-context and baggage propagator, then builds each
/// enabled signal in the order traces, metrics, logs.
///
/// The first signal that fails to build stops setup; the returned error
/// carries a handle for the providers that were already running.
pub fn setup_telemetry_with_config(config: SignalConfig) -> Result<Telemetry, SetupError> {
    install_propagator();

    let resource = build_resource(&config);
    let mut shutdown = ShutdownHandle::new();
    let mut trace = TraceProvider::default();
    let mut metrics = MetricsProvider::default();
    let mut logs = LogsProvider::default();

    if config.is_enabled(Signal::Traces) {
        trace = match TraceProvider::new(&config, resource.clone()) {
            Ok(provider) => provider,
            Err(source) => return Err(failed(source, shutdown)),
        };
        let provider = trace.clone();
        shutdown.register(Signal::Traces, move || provider.shutdown());
        if let Some(tracer_provider) = trace.tracer_provider() {
            global::set_tracer_provider(tracer_provider.clone());
        }
        info!(
            endpoint = config.traces_endpoint(),
            "OpenTelemetry tracing enabled"
        );
    }

    if config.is_enabled(Signal::Metrics) {
        metrics = match MetricsProvider::new(&config, resource.clone()) {
            Ok(provider) => provider,
            Err(source) => return Err(failed(source, shutdown)),
        };
        let provider = metrics.clone();
        shutdown.register(Signal::Metrics, move || provider.shutdown());
        if let Some(meter_provider) = metrics.meter_provider() {
            global::set_meter_provider(meter_provider.clone());
        }
        info!(
            endpoint = config.metrics_endpoint(),
            "OpenTelemetry metrics enabled"
        );
    }

    if config.is_enabled(Signal::Logs) {
        logs = match LogsProvider::new(&config, resource) {
            Ok(provider) => provider,
            Err(source) => return Err(failed(source, shutdown)),
        };
        let provider = logs.clone();
        shutdown.register(Signal::Logs, move || provider.shutdown());
        info!(endpoint = config.logs_endpoint(), "OpenTelemetry logs enabled");
    }

    Ok(Telemetry {
        config,
        trace,
        metrics,
        logs,
        shutdown,
    })
}

fn failed(source: TelemetryError, shutdown: ShutdownHandle) -> SetupError {
    SetupError { source, shutdown }
}
