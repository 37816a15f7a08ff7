//! Outgoing-call filter.
//!
//! Decides whether an outgoing HTTP call should be left uninstrumented
//! because it is telemetry traffic. Tracing the exporter's own requests
//! would produce spans about exporting spans, forever.

use url::Url;

use crate::config::TelemetryConfig;
use crate::endpoint::SignalEndpoints;

/// Hostnames of known telemetry backends, matched as substrings.
pub const IGNORED_HOSTS: &[&str] = &["collector.newrelic.com", "grafana.net", "launchdarkly.com"];

/// Path fragments that identify telemetry ingestion requests.
pub const IGNORED_PATH_FRAGMENTS: &[&str] = &["otlp", "v1/traces", "grafana.net", "newrelic"];

#[derive(Debug, Clone, PartialEq, Eq)]
struct ExporterHost {
    /// Hostname without port.
    hostname: String,
    /// Hostname with the port when it is not the scheme default.
    host: String,
}

impl ExporterHost {
    fn parse(endpoint: &str) -> Option<Self> {
        let url = Url::parse(endpoint).ok()?;
        let hostname = url.host_str()?.to_string();
        let host = match url.port() {
            Some(port) => format!("{}:{}", hostname, port),
            None => hostname.clone(),
        };
        Some(Self { hostname, host })
    }

    fn matches(&self, host: &str) -> bool {
        host == self.hostname || host == self.host
    }
}

/// Filter for outgoing calls that must not be traced.
#[derive(Debug, Clone, Default)]
pub struct OutgoingCallFilter {
    exporter_hosts: Vec<ExporterHost>,
}

impl OutgoingCallFilter {
    /// Create a filter that recognises every configured exporter endpoint.
    pub fn new(config: &TelemetryConfig) -> Self {
        let endpoints = SignalEndpoints::resolve(config);
        let mut filter = Self::for_endpoint(&config.exporter_endpoint);
        for endpoint in [&endpoints.traces, &endpoints.metrics, &endpoints.logs] {
            filter.add_endpoint(endpoint);
        }
        filter
    }

    /// Create a filter for a single exporter endpoint.
    ///
    /// An unparseable endpoint contributes no host match; the deny-lists
    /// still apply.
    pub fn for_endpoint(endpoint: &str) -> Self {
        let mut filter = Self::default();
        filter.add_endpoint(endpoint);
        filter
    }

    fn add_endpoint(&mut self, endpoint: &str) {
        if let Some(host) = ExporterHost::parse(endpoint)
            && !self.exporter_hosts.contains(&host)
        {
            self.exporter_hosts.push(host);
        }
    }

    /// Check whether a call to `host` + `path` should be ignored.
    ///
    /// Any single match is enough.
    pub fn should_ignore(&self, host: &str, path: &str) -> bool {
        if !host.is_empty() {
            if self.exporter_hosts.iter().any(|h| h.matches(host)) {
                return true;
            }

            if IGNORED_HOSTS.iter().any(|h| host.contains(h)) {
                return true;
            }
        }

        IGNORED_PATH_FRAGMENTS.iter().any(|p| path.contains(p))
    }

    /// Convenience wrapper over [`should_ignore`](Self::should_ignore) for a
    /// full request URI. Unparseable URIs are never ignored.
    pub fn should_ignore_uri(&self, uri: &str) -> bool {
        match host_and_path(uri) {
            Some((host, path)) => self.should_ignore(&host, &path),
            None => false,
        }
    }
}

/// Split a request URI into `host[:port]` and path.
///
/// The port is only included when it differs from the scheme default.
pub fn host_and_path(uri: &str) -> Option<(String, String)> {
    let url = Url::parse(uri).ok()?;
    let host = match (url.host_str(), url.port()) {
        (Some(h), Some(port)) => format!("{}:{}", h, port),
        (Some(h), None) => h.to_string(),
        (None, _) => String::new(),
    };
    Some((host, url.path().to_string()))
}
