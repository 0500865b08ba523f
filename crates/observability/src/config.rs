use std::fmt;

use serde::{Deserialize, Serialize};

pub const DEFAULT_SERVICE_NAME: &str = "mcp-gateway";

pub const ENV_ENDPOINT: &str = "OTEL_EXPORTER_OTLP_ENDPOINT";
pub const ENV_TRACES_ENDPOINT: &str = "OTEL_EXPORTER_OTLP_TRACES_ENDPOINT";
pub const ENV_METRICS_ENDPOINT: &str = "OTEL_EXPORTER_OTLP_METRICS_ENDPOINT";
pub const ENV_LOGS_ENDPOINT: &str = "OTEL_EXPORTER_OTLP_LOGS_ENDPOINT";
pub const ENV_INSECURE: &str = "OTEL_EXPORTER_OTLP_INSECURE";
pub const ENV_SERVICE_NAME: &str = "OTEL_SERVICE_NAME";
pub const ENV_SERVICE_VERSION: &str = "OTEL_SERVICE_VERSION";

/// An independently configurable telemetry stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Signal {
    Traces,
    Metrics,
    Logs,
}

impl Signal {
    pub const ALL: [Signal; 3] = [Signal::Traces, Signal::Metrics, Signal::Logs];

    pub fn as_str(&self) -> &'static str {
        match self {
            Signal::Traces => "traces",
            Signal::Metrics => "metrics",
            Signal::Logs => "logs",
        }
    }

    /// Export path used by OTLP/HTTP when the endpoint URL carries none.
    pub fn default_http_path(&self) -> &'static str {
        match self {
            Signal::Traces => "/v1/traces",
            Signal::Metrics => "/v1/metrics",
            Signal::Logs => "/v1/logs",
        }
    }

    fn endpoint_env(&self) -> &'static str {
        match self {
            Signal::Traces => ENV_TRACES_ENDPOINT,
            Signal::Metrics => ENV_METRICS_ENDPOINT,
            Signal::Logs => ENV_LOGS_ENDPOINT,
        }
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Build metadata handed in by the binary.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildInfo {
    pub version: String,
    pub git_sha: String,
    pub git_dirty: String,
}

impl BuildInfo {
    pub fn new(
        version: impl Into<String>,
        git_sha: impl Into<String>,
        git_dirty: impl Into<String>,
    ) -> Self {
        Self {
            version: version.into(),
            git_sha: git_sha.into(),
            git_dirty: git_dirty.into(),
        }
    }
}

/// Endpoint and identity settings for all three signals.
///
/// A signal's effective endpoint is its override when non-empty, else the base
/// endpoint; the signal is enabled iff that effective endpoint is non-empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalConfig {
    pub endpoint: String,
    pub traces_endpoint: String,
    pub metrics_endpoint: String,
    pub logs_endpoint: String,
    pub insecure: bool,
    pub service_name: String,
    pub service_version: String,
    pub git_sha: String,
    pub git_dirty: String,
}

impl SignalConfig {
    /// Reads the `OTEL_*` variables of the process environment.
    pub fn from_env(build: &BuildInfo) -> Self {
        Self::from_lookup(build, |key| std::env::var(key).ok())
    }

    /// Resolves the configuration through `lookup`, which returns the value of
    /// an environment variable if it is set.
    pub fn from_lookup<F>(build: &BuildInfo, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let string = |key: &str| lookup(key).unwrap_or_default();
        let non_empty_or = |key: &str, default: &str| {
            lookup(key)
                .filter(|value| !value.is_empty())
                .unwrap_or_else(|| default.to_string())
        };

        Self {
            endpoint: string(ENV_ENDPOINT),
            traces_endpoint: string(Signal::Traces.endpoint_env()),
            metrics_endpoint: string(Signal::Metrics.endpoint_env()),
            logs_endpoint: string(Signal::Logs.endpoint_env()),
            insecure: lookup(ENV_INSECURE).as_deref().is_some_and(parse_bool),
            service_name: non_empty_or(ENV_SERVICE_NAME, DEFAULT_SERVICE_NAME),
            service_version: non_empty_or(ENV_SERVICE_VERSION, &build.version),
            git_sha: build.git_sha.clone(),
            git_dirty: build.git_dirty.clone(),
        }
    }

    pub fn endpoint_for(&self, signal: Signal) -> &str {
        let override_endpoint = match signal {
            Signal::Traces => &self.traces_endpoint,
            Signal::Metrics => &self.metrics_endpoint,
            Signal::Logs => &self.logs_endpoint,
        };
        if override_endpoint.is_empty() {
            &self.endpoint
        } else {
            override_endpoint
        }
    }

    pub fn is_enabled(&self, signal: Signal) -> bool {
        !self.endpoint_for(signal).is_empty()
    }

    pub fn traces_endpoint(&self) -> &str {
        self.endpoint_for(Signal::Traces)
    }

    pub fn metrics_endpoint(&self) -> &str {
        self.endpoint_for(Signal::Metrics)
    }

    pub fn logs_endpoint(&self) -> &str {
        self.endpoint_for(Signal::Logs)
    }

    /// True if any signal is enabled.
    pub fn enabled(&self) -> bool {
        Signal::ALL.iter().any(|signal| self.is_enabled(*signal))
    }
}

fn parse_bool(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "true" | "1" | "yes" | "on"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn resolve(vars: &[(&str, &str)]) -> SignalConfig {
        let env: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        SignalConfig::from_lookup(&BuildInfo::new("v1.2.3", "abc123", "false"), |key| {
            env.get(key).cloned()
        })
    }

    #[test]
    fn empty_environment_disables_everything() {
        let config = resolve(&[]);
        assert!(!config.enabled());
        for signal in Signal::ALL {
            assert!(!config.is_enabled(signal));
            assert_eq!(config.endpoint_for(signal), "");
        }
        assert!(!config.insecure);
        assert_eq!(config.service_name, DEFAULT_SERVICE_NAME);
        assert_eq!(config.service_version, "v1.2.3");
        assert_eq!(config.git_sha, "abc123");
        assert_eq!(config.git_dirty, "false");
    }

    #[test]
    fn override_wins_over_base_endpoint() {
        let cases = [
            ("", "", ""),
            ("http://base:4318", "", "http://base:4318"),
            ("", "rpc://override:4317", "rpc://override:4317"),
            ("http://base:4318", "rpc://override:4317", "rpc://override:4317"),
        ];

        for signal in Signal::ALL {
            for (base, signal_override, expected) in cases {
                let config = resolve(&[
                    (ENV_ENDPOINT, base),
                    (signal.endpoint_env(), signal_override),
                ]);
                assert_eq!(config.endpoint_for(signal), expected, "{signal}");
                assert_eq!(config.is_enabled(signal), !expected.is_empty(), "{signal}");
            }
        }
    }

    #[test]
    fn override_only_affects_its_own_signal() {
        let config = resolve(&[(ENV_METRICS_ENDPOINT, "http://localhost:4318")]);
        assert!(config.is_enabled(Signal::Metrics));
        assert!(!config.is_enabled(Signal::Traces));
        assert!(!config.is_enabled(Signal::Logs));
        assert_eq!(config.metrics_endpoint(), "http://localhost:4318");
    }

    #[test]
    fn insecure_flag_parsing() {
        for value in ["true", "TRUE", "1", "yes", " on "] {
            assert!(resolve(&[(ENV_INSECURE, value)]).insecure, "{value}");
        }
        for value in ["false", "0", "", "nope"] {
            assert!(!resolve(&[(ENV_INSECURE, value)]).insecure, "{value}");
        }
    }

    #[test]
    fn service_identity_overrides() {
        let config = resolve(&[
            (ENV_SERVICE_NAME, "edge-gateway"),
            (ENV_SERVICE_VERSION, "v9"),
        ]);
        assert_eq!(config.service_name, "edge-gateway");
        assert_eq!(config.service_version, "v9");
    }
}
