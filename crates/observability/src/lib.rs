//! Telemetry for the MCP gateway: OTLP traces, metrics and logs set up from the
//! environment, trace-context propagation across HTTP headers, proxy header
//! lists and plain maps, an axum tracing middleware, and a trace-correlated
//! logging chain.

pub mod config;
pub mod error;
pub mod exporter;
pub mod logging;
pub mod middleware;
pub mod propagation;
pub mod providers;
pub mod resource;
pub mod router;
pub mod setup;
pub mod shutdown;

pub use config::{BuildInfo, Signal, SignalConfig, DEFAULT_SERVICE_NAME};
pub use error::{SetupError, ShutdownError, TelemetryError, TelemetryResult};
pub use exporter::{ExporterTarget, Transport};
pub use logging::{
    console_layer, init_logging, new_tracing_logger, LogError, LogFormat, LoggerOptions,
    MultiHandler, SinkFailures, TracingFormat,
};
pub use middleware::{trace_requests, HttpMetrics, HttpTracing};
pub use propagation::{
    extract_context, inject_context, Carrier, HttpHeaderCarrier, MapCarrier, ProxyHeaderCarrier,
};
pub use providers::{LogsProvider, MetricsProvider, TraceProvider};
pub use router::{HeaderEntry, HeaderList, McpRequest};
pub use setup::{setup_telemetry, setup_telemetry_with_config, Telemetry};
pub use shutdown::ShutdownHandle;
