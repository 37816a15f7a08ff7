//! Telemetry configuration.
//!
//! Values come from an optional JSON5 file and are then overlaid by the
//! standard `OTEL_*` environment variables. Once [`TelemetryConfig`] has been
//! built it is treated as immutable for the rest of the process lifetime.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::endpoint::Signal;
use crate::error::{Result, TelemetryError};

pub const ENV_SERVICE_NAME: &str = "OTEL_SERVICE_NAME";
pub const ENV_SERVICE_NAMESPACE: &str = "OTEL_SERVICE_NAMESPACE";
pub const ENV_SERVICE_VERSION: &str = "OTEL_SERVICE_VERSION";
pub const ENV_ENVIRONMENT: &str = "OTEL_ENVIRONMENT";
pub const ENV_OTLP_ENDPOINT: &str = "OTEL_EXPORTER_OTLP_ENDPOINT";
pub const ENV_EXPORTER_ENDPOINT: &str = "OTEL_EXPORTER_ENDPOINT";
pub const ENV_TRACES_ENDPOINT: &str = "OTEL_EXPORTER_OTLP_TRACES_ENDPOINT";
pub const ENV_METRICS_ENDPOINT: &str = "OTEL_EXPORTER_OTLP_METRICS_ENDPOINT";
pub const ENV_LOGS_ENDPOINT: &str = "OTEL_EXPORTER_OTLP_LOGS_ENDPOINT";
pub const ENV_OTLP_HEADERS: &str = "OTEL_EXPORTER_OTLP_HEADERS";
pub const ENV_GRAFANA_TOKEN: &str = "GRAFANA_OTEL_TOKEN";
pub const ENV_DEBUG: &str = "OTEL_DEBUG";

const AUTHORIZATION_KEY: &str = "Authorization=";

/// OpenTelemetry identity and exporter settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// `service.name` resource attribute.
    #[serde(default = "default_service_name")]
    pub service_name: String,

    /// `service.namespace` resource attribute.
    #[serde(default = "default_service_namespace")]
    pub service_namespace: String,

    /// `service.version` resource attribute.
    #[serde(default = "default_service_version")]
    pub service_version: String,

    /// `deployment.environment` resource attribute.
    #[serde(default = "default_environment")]
    pub environment: String,

    /// Base OTLP/HTTP endpoint, usually the trace endpoint.
    #[serde(default = "default_exporter_endpoint")]
    pub exporter_endpoint: String,

    /// Credential sent in the `Authorization` header.
    #[serde(default)]
    pub exporter_token: Option<String>,

    /// Verbose diagnostics for the demo and the OpenTelemetry SDK.
    #[serde(default)]
    pub debug_enabled: bool,

    /// Explicit trace endpoint, used verbatim.
    #[serde(default)]
    pub traces_endpoint: Option<String>,

    /// Explicit metric endpoint, used verbatim.
    #[serde(default)]
    pub metrics_endpoint: Option<String>,

    /// Explicit log endpoint, used verbatim.
    #[serde(default)]
    pub logs_endpoint: Option<String>,
}

fn default_service_name() -> String {
    "otel-dynamodb-demo".to_string()
}

fn default_service_namespace() -> String {
    "demo".to_string()
}

fn default_service_version() -> String {
    "1.0.0".to_string()
}

fn default_environment() -> String {
    "development".to_string()
}

fn default_exporter_endpoint() -> String {
    Signal::Traces.default_endpoint()
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: default_service_name(),
            service_namespace: default_service_namespace(),
            service_version: default_service_version(),
            environment: default_environment(),
            exporter_endpoint: default_exporter_endpoint(),
            exporter_token: None,
            debug_enabled: false,
            traces_endpoint: None,
            metrics_endpoint: None,
            logs_endpoint: None,
        }
    }
}

impl TelemetryConfig {
    /// Build the configuration from the process environment and defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env();
        config
    }

    /// Overlay the process environment onto this configuration.
    pub fn apply_env(&mut self) {
        self.apply_lookup(|key| std::env::var(key).ok());
    }

    /// Overlay values returned by `lookup` onto this configuration.
    ///
    /// Empty values are treated as unset.
    pub fn apply_lookup<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.is_empty());

        if let Some(v) = get(ENV_SERVICE_NAME) {
            self.service_name = v;
        }
        if let Some(v) = get(ENV_SERVICE_NAMESPACE) {
            self.service_namespace = v;
        }
        if let Some(v) = get(ENV_SERVICE_VERSION) {
            self.service_version = v;
        }
        if let Some(v) = get(ENV_ENVIRONMENT) {
            self.environment = v;
        }
        if let Some(v) = get(ENV_OTLP_ENDPOINT).or_else(|| get(ENV_EXPORTER_ENDPOINT)) {
            self.exporter_endpoint = v;
        }
        if let Some(v) = get(ENV_TRACES_ENDPOINT) {
            self.traces_endpoint = Some(v);
        }
        if let Some(v) = get(ENV_METRICS_ENDPOINT) {
            self.metrics_endpoint = Some(v);
        }
        if let Some(v) = get(ENV_LOGS_ENDPOINT) {
            self.logs_endpoint = Some(v);
        }

        let header_token = get(ENV_OTLP_HEADERS)
            .filter(|h| h.contains("Authorization"))
            .and_then(|h| parse_authorization(&h));
        if let Some(token) = header_token.or_else(|| get(ENV_GRAFANA_TOKEN)) {
            self.exporter_token = Some(token);
        }

        if let Some(v) = get(ENV_DEBUG) {
            self.debug_enabled = v == "true";
        }
    }

    /// Per-signal endpoint override, if one was configured.
    pub fn signal_override(&self, signal: Signal) -> Option<&str> {
        match signal {
            Signal::Traces => self.traces_endpoint.as_deref(),
            Signal::Metrics => self.metrics_endpoint.as_deref(),
            Signal::Logs => self.logs_endpoint.as_deref(),
        }
    }

    /// Value of the `Authorization` header sent to the exporter.
    ///
    /// A token without an auth scheme is sent as `Basic <token>`.
    pub fn authorization_header(&self) -> Option<String> {
        let token = self.exporter_token.as_deref()?.trim();
        if token.is_empty() {
            return None;
        }

        let lower = token.to_ascii_lowercase();
        if lower.starts_with("basic ") || lower.starts_with("bearer ") {
            Some(token.to_string())
        } else {
            Some(format!("Basic {}", token))
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.exporter_endpoint.trim().is_empty() {
            return Err(TelemetryError::Validation(
                "exporter_endpoint cannot be empty".to_string(),
            ));
        }

        if self.service_name.trim().is_empty() {
            return Err(TelemetryError::Validation(
                "service_name cannot be empty".to_string(),
            ));
        }

        Ok(())
    }
}

/// Extract the `Authorization` value from an `OTEL_EXPORTER_OTLP_HEADERS`
/// style string (`key=value,key=value`).
///
/// Everything after the first `Authorization=` up to the next `,` is taken;
/// values that themselves contain `=` are not unescaped.
pub fn parse_authorization(headers: &str) -> Option<String> {
    let (_, rest) = headers.split_once(AUTHORIZATION_KEY)?;
    let value = rest.split(',').next().unwrap_or_default().trim();

    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable text format (default).
    #[default]
    Text,
    /// Structured JSON format.
    Json,
}

/// Console logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log output format: "text" or "json".
    #[serde(default)]
    pub format: LogFormat,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

/// Load a configuration file in JSON5 format.
pub fn load_config<T: for<'de> Deserialize<'de>>(path: impl AsRef<Path>) -> Result<T> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|source| TelemetryError::ConfigRead {
        path: path.display().to_string(),
        source,
    })?;

    parse_config(&content)
}

/// Load a configuration from a JSON5 string.
pub fn parse_config<T: for<'de> Deserialize<'de>>(content: &str) -> Result<T> {
    Ok(json5::from_str(content)?)
}
