//! OTLP exporter construction.
//!
//! The endpoint URL scheme picks the wire transport; the dispatch is the same
//! for every signal, only the exporter type differs.

use opentelemetry_otlp::tonic_types::transport::ClientTlsConfig;
use opentelemetry_otlp::{LogExporter, MetricExporter, SpanExporter, WithExportConfig, WithTonicConfig};
use url::Url;

use crate::config::Signal;
use crate::error::{TelemetryError, TelemetryResult};

pub const RPC_SCHEME: &str = "rpc";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    /// OTLP over gRPC.
    Grpc,
    /// OTLP over HTTP with protobuf payloads.
    Http,
}

/// Where and how one signal's exporter talks to the collector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExporterTarget {
    pub signal: Signal,
    pub transport: Transport,
    /// URL handed to the OTLP builder.
    pub url: String,
    pub tls: bool,
}

impl ExporterTarget {
    pub fn resolve(endpoint: &str, insecure: bool, signal: Signal) -> TelemetryResult<Self> {
        let invalid = |source| TelemetryError::InvalidEndpoint {
            endpoint: endpoint.to_string(),
            source,
        };
        let parsed = Url::parse(endpoint).map_err(invalid)?;
        let host = parsed
            .host_str()
            .filter(|host| !host.is_empty())
            .ok_or_else(|| invalid(url::ParseError::EmptyHost))?;
        let authority = match parsed.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        };

        match parsed.scheme() {
            RPC_SCHEME => {
                let tls = !insecure;
                let scheme = if tls { "https" } else { "http" };
                Ok(Self {
                    signal,
                    transport: Transport::Grpc,
                    url: format!("{scheme}://{authority}"),
                    tls,
                })
            }
            scheme @ ("http" | "https") => {
                let tls = !(insecure || scheme == "http");
                let scheme = if tls { "https" } else { "http" };
                let path = match parsed.path() {
                    "" | "/" => signal.default_http_path(),
                    path => path,
                };
                Ok(Self {
                    signal,
                    transport: Transport::Http,
                    url: format!("{scheme}://{authority}{path}"),
                    tls,
                })
            }
            other => Err(TelemetryError::UnsupportedScheme {
                scheme: other.to_string(),
            }),
        }
    }
}

macro_rules! build_exporter {
    ($exporter:ty, $target:expr) => {{
        let target: &ExporterTarget = $target;
        let built = match target.transport {
            Transport::Grpc => {
                let builder = <$exporter>::builder()
                    .with_tonic()
                    .with_endpoint(target.url.clone());
                if target.tls {
                    builder
                        .with_tls_config(ClientTlsConfig::new().with_enabled_roots())
                        .build()
                } else {
                    builder.build()
                }
            }
            Transport::Http => <$exporter>::builder()
                .with_http()
                .with_endpoint(target.url.clone())
                .build(),
        };
        built.map_err(|source| TelemetryError::ExporterBuild {
            signal: target.signal,
            source,
        })
    }};
}

pub fn span_exporter(endpoint: &str, insecure: bool) -> TelemetryResult<SpanExporter> {
    let target = ExporterTarget::resolve(endpoint, insecure, Signal::Traces)?;
    build_exporter!(SpanExporter, &target)
}

pub fn metric_exporter(endpoint: &str, insecure: bool) -> TelemetryResult<MetricExporter> {
    let target = ExporterTarget::resolve(endpoint, insecure, Signal::Metrics)?;
    build_exporter!(MetricExporter, &target)
}

pub fn log_exporter(endpoint: &str, insecure: bool) -> TelemetryResult<LogExporter> {
    let target = ExporterTarget::resolve(endpoint, insecure, Signal::Logs)?;
    build_exporter!(LogExporter, &target)
}
