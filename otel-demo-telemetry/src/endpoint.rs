//! Per-signal OTLP endpoint resolution.
//!
//! The demo is configured with a single, trace-shaped base URL such as
//! `https://otlp-gateway.grafana.net/otlp/v1/traces`. Metric and log
//! endpoints are derived from it by swapping the `/v1/traces` suffix, unless
//! an explicit per-signal override is configured.

use std::fmt;

use url::Url;

use crate::config::TelemetryConfig;

/// Path suffix that marks a base URL as trace-shaped.
pub const TRACES_PATH: &str = "/v1/traces";
pub const METRICS_PATH: &str = "/v1/metrics";
pub const LOGS_PATH: &str = "/v1/logs";

/// Local collector used when a configured endpoint cannot be used.
pub const DEFAULT_COLLECTOR: &str = "http://localhost:4318";

/// Telemetry signal kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Signal {
    Traces,
    Metrics,
    Logs,
}

impl Signal {
    /// All signals, in bootstrap order.
    pub const ALL: [Signal; 3] = [Signal::Traces, Signal::Metrics, Signal::Logs];

    /// Endpoint of this signal on [`DEFAULT_COLLECTOR`].
    pub fn default_endpoint(self) -> String {
        format!("{}{}", DEFAULT_COLLECTOR, self.path())
    }

    /// Canonical OTLP/HTTP path for this signal.
    pub fn path(self) -> &'static str {
        match self {
            Signal::Traces => TRACES_PATH,
            Signal::Metrics => METRICS_PATH,
            Signal::Logs => LOGS_PATH,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Signal::Traces => "trace",
            Signal::Metrics => "metric",
            Signal::Logs => "log",
        }
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resolve the endpoint a signal's exporter should post to.
///
/// An explicit override wins unconditionally. Otherwise the endpoint is
/// derived from the base endpoint with [`derive_endpoint`]. Never fails.
pub fn resolve_endpoint(signal: Signal, config: &TelemetryConfig) -> String {
    if let Some(endpoint) = config.signal_override(signal) {
        return endpoint.to_string();
    }

    derive_endpoint(&config.exporter_endpoint, signal)
}

/// Derive a signal endpoint from a base URL.
///
/// - a path ending in `/v1/traces` has that suffix replaced;
/// - an empty or `/` path becomes the signal's canonical path;
/// - any other path is left alone.
///
/// If `base` does not parse as a URL it is returned unmodified.
pub fn derive_endpoint(base: &str, signal: Signal) -> String {
    let Ok(mut url) = Url::parse(base) else {
        return base.to_string();
    };

    let path = url.path().to_string();
    if let Some(prefix) = path.strip_suffix(TRACES_PATH) {
        url.set_path(&format!("{}{}", prefix, signal.path()));
    } else if path.is_empty() || path == "/" {
        url.set_path(signal.path());
    } else {
        return base.to_string();
    }

    url.to_string()
}

/// Endpoints for all three signals, resolved once at bootstrap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignalEndpoints {
    pub traces: String,
    pub metrics: String,
    pub logs: String,
}

impl SignalEndpoints {
    pub fn resolve(config: &TelemetryConfig) -> Self {
        Self {
            traces: resolve_endpoint(Signal::Traces, config),
            metrics: resolve_endpoint(Signal::Metrics, config),
            logs: resolve_endpoint(Signal::Logs, config),
        }
    }

    pub fn get(&self, signal: Signal) -> &str {
        match signal {
            Signal::Traces => &self.traces,
            Signal::Metrics => &self.metrics,
            Signal::Logs => &self.logs,
        }
    }

    pub fn set(&mut self, signal: Signal, endpoint: String) {
        match signal {
            Signal::Traces => self.traces = endpoint,
            Signal::Metrics => self.metrics = endpoint,
            Signal::Logs => self.logs = endpoint,
        }
    }
}
