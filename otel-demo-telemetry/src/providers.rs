//! Trace, metric and log provider bootstrap and lifecycle.

use std::sync::Arc;
use std::time::Duration;

use opentelemetry::global;
use opentelemetry::metrics::{Meter, MeterProvider as _};
use opentelemetry::trace::TracerProvider;
use opentelemetry_otlp::{
    Compression, LogExporter, MetricExporter, Protocol, SpanExporter, WithExportConfig,
    WithHttpConfig,
};
use opentelemetry_sdk::Resource;
use opentelemetry_sdk::logs::SdkLoggerProvider;
use opentelemetry_sdk::metrics::{PeriodicReader, SdkMeterProvider};
use opentelemetry_sdk::propagation::TraceContextPropagator;
use opentelemetry_sdk::trace::{
    BatchConfigBuilder, BatchSpanProcessor, Sampler, SdkTracerProvider,
};
use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::config::TelemetryConfig;
use crate::endpoint::{Signal, SignalEndpoints};
use crate::error::{Result, TelemetryError};
use crate::exporter::{ExportStats, ReportingSpanExporter};
use crate::resource::build_resource;
use crate::transport::{AuthorizingHttpClient, authorization_value, blocking_client};

/// HTTP client handed to each exporter.
type ExportClient = AuthorizingHttpClient<reqwest::blocking::Client>;

/// Network timeout for a single OTLP export request.
pub const EXPORT_TIMEOUT: Duration = Duration::from_millis(1000);

/// Upper bound on a full flush of all three providers.
pub const FLUSH_TIMEOUT: Duration = Duration::from_secs(5);

/// Upper bound on provider shutdown.
pub const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

pub const TRACE_MAX_QUEUE_SIZE: usize = 2048;
pub const TRACE_MAX_EXPORT_BATCH_SIZE: usize = 500;

/// Long enough that span export is driven by explicit flushes, not the timer.
pub const TRACE_SCHEDULED_DELAY: Duration = Duration::from_secs(60);

pub const METRIC_EXPORT_INTERVAL: Duration = Duration::from_secs(10);

/// Flush outcome counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlushStats {
    pub flushes: u64,
    pub failed: u64,
    pub timed_out: u64,
}

/// The three OpenTelemetry providers used by the demo.
///
/// Built once at startup and passed by reference to everything that emits
/// telemetry or needs to flush it.
pub struct TelemetryProviders {
    tracer_provider: SdkTracerProvider,
    meter_provider: SdkMeterProvider,
    logger_provider: SdkLoggerProvider,
    endpoints: SignalEndpoints,
    startup_warnings: Vec<String>,
    export_stats: Arc<RwLock<ExportStats>>,
    flush_stats: RwLock<FlushStats>,
}

impl TelemetryProviders {
    /// Build all three providers and register them as the process defaults.
    ///
    /// A signal whose endpoint the exporter rejects falls back to
    /// [`Signal::default_endpoint`] with a warning; the endpoint content never
    /// makes bootstrap fail.
    pub fn init(config: &TelemetryConfig) -> Result<Self> {
        let mut endpoints = SignalEndpoints::resolve(config);
        let authorization = config
            .authorization_header()
            .and_then(|value| authorization_value(&value));

        info!(
            traces = %endpoints.traces,
            metrics = %endpoints.metrics,
            logs = %endpoints.logs,
            authenticated = authorization.is_some(),
            "Initializing OpenTelemetry providers"
        );

        let client = AuthorizingHttpClient::new(blocking_client(EXPORT_TIMEOUT)?, authorization);
        let mut warnings = Vec::new();

        let span_exporter =
            build_with_fallback(Signal::Traces, &mut endpoints, &mut warnings, |endpoint| {
                build_span_exporter(endpoint, client.clone())
            })?;
        let metric_exporter =
            build_with_fallback(Signal::Metrics, &mut endpoints, &mut warnings, |endpoint| {
                build_metric_exporter(endpoint, client.clone())
            })?;
        let log_exporter =
            build_with_fallback(Signal::Logs, &mut endpoints, &mut warnings, |endpoint| {
                build_log_exporter(endpoint, client.clone())
            })?;

        let resource = build_resource(config);

        let span_exporter = ReportingSpanExporter::new(span_exporter);
        let export_stats = span_exporter.stats_handle();
        let tracer_provider = build_tracer_provider(span_exporter, resource.clone());
        let meter_provider = build_meter_provider(metric_exporter, resource.clone());
        let logger_provider = build_logger_provider(log_exporter, resource);

        global::set_text_map_propagator(TraceContextPropagator::new());
        global::set_tracer_provider(tracer_provider.clone());
        global::set_meter_provider(meter_provider.clone());

        Ok(Self {
            tracer_provider,
            meter_provider,
            logger_provider,
            endpoints,
            startup_warnings: warnings,
            export_stats,
            flush_stats: RwLock::new(FlushStats::default()),
        })
    }

    pub fn tracer_provider(&self) -> &SdkTracerProvider {
        &self.tracer_provider
    }

    pub fn meter_provider(&self) -> &SdkMeterProvider {
        &self.meter_provider
    }

    pub fn logger_provider(&self) -> &SdkLoggerProvider {
        &self.logger_provider
    }

    /// Endpoints the exporters post to, after any fallback.
    pub fn endpoints(&self) -> &SignalEndpoints {
        &self.endpoints
    }

    /// Endpoint fallbacks taken during [`init`](Self::init).
    ///
    /// Bootstrap normally runs before logging is set up, so callers report
    /// these once it is.
    pub fn startup_warnings(&self) -> &[String] {
        &self.startup_warnings
    }

    pub fn tracer(&self, name: &'static str) -> <SdkTracerProvider as TracerProvider>::Tracer {
        self.tracer_provider.tracer(name)
    }

    pub fn meter(&self, name: &'static str) -> Meter {
        self.meter_provider.meter(name)
    }

    /// Force all buffered telemetry out.
    ///
    /// Best effort: failures and timeouts are logged and counted, never
    /// returned. Returns `true` when every provider flushed cleanly within
    /// [`FLUSH_TIMEOUT`].
    pub async fn flush(&self) -> bool {
        let tracer = self.tracer_provider.clone();
        let meter = self.meter_provider.clone();
        let logger = self.logger_provider.clone();

        let task = tokio::task::spawn_blocking(move || flush_providers(&tracer, &meter, &logger));

        let ok = match tokio::time::timeout(FLUSH_TIMEOUT, task).await {
            Ok(Ok(failures)) => failures == 0,
            Ok(Err(e)) => {
                warn!(error = %e, "Flush task failed");
                false
            }
            Err(_) => {
                warn!(timeout = ?FLUSH_TIMEOUT, "Telemetry flush timed out");
                self.flush_stats.write().timed_out += 1;
                return false;
            }
        };

        let mut stats = self.flush_stats.write();
        if ok {
            stats.flushes += 1;
        } else {
            stats.failed += 1;
        }
        ok
    }

    /// Shut down the trace provider within [`SHUTDOWN_TIMEOUT`].
    ///
    /// Used on termination signals; errors are logged and swallowed.
    pub async fn shutdown_traces(&self) {
        let tracer = self.tracer_provider.clone();
        let task =
            tokio::task::spawn_blocking(move || tracer.shutdown_with_timeout(SHUTDOWN_TIMEOUT));

        match tokio::time::timeout(SHUTDOWN_TIMEOUT, task).await {
            Ok(Ok(Ok(()))) => debug!("Tracer provider shut down"),
            Ok(Ok(Err(e))) => debug!(error = %e, "Error shutting down tracer provider"),
            Ok(Err(e)) => debug!(error = %e, "Tracer shutdown task failed"),
            Err(_) => debug!("Tracer provider shutdown timed out"),
        }
    }

    /// Shut down all three providers. Errors are logged and swallowed.
    pub async fn shutdown(&self) {
        info!("Shutting down OpenTelemetry providers");

        self.shutdown_traces().await;

        let meter = self.meter_provider.clone();
        let logger = self.logger_provider.clone();
        let task = tokio::task::spawn_blocking(move || {
            if let Err(e) = meter.shutdown() {
                debug!(error = %e, "Error shutting down meter provider");
            }
            if let Err(e) = logger.shutdown() {
                eprintln!("Error shutting down logger provider: {e}");
            }
        });

        if tokio::time::timeout(SHUTDOWN_TIMEOUT, task).await.is_err() {
            eprintln!("OpenTelemetry provider shutdown timed out");
        }
    }

    pub fn flush_stats(&self) -> FlushStats {
        self.flush_stats.read().clone()
    }

    pub fn export_stats(&self) -> ExportStats {
        self.export_stats.read().clone()
    }
}

fn flush_providers(
    tracer: &SdkTracerProvider,
    meter: &SdkMeterProvider,
    logger: &SdkLoggerProvider,
) -> usize {
    let mut failures = 0;

    if let Err(e) = tracer.force_flush() {
        warn!(error = %e, "Failed to flush tracer provider");
        failures += 1;
    }

    if let Err(e) = meter.force_flush() {
        warn!(error = %e, "Failed to flush meter provider");
        failures += 1;
    }

    if let Err(e) = logger.force_flush() {
        warn!(error = %e, "Failed to flush logger provider");
        failures += 1;
    }

    failures
}

/// Build a signal's exporter against its resolved endpoint, or against the
/// default collector if the exporter rejects that endpoint.
fn build_with_fallback<T>(
    signal: Signal,
    endpoints: &mut SignalEndpoints,
    warnings: &mut Vec<String>,
    build: impl Fn(&str) -> Result<T>,
) -> Result<T> {
    match build(endpoints.get(signal)) {
        Ok(exporter) => Ok(exporter),
        Err(e) => {
            let fallback = signal.default_endpoint();
            let message = format!(
                "Unusable {} endpoint {:?} ({}), falling back to {}",
                signal,
                endpoints.get(signal),
                e,
                fallback
            );
            warn!("{}", message);
            warnings.push(message);

            let exporter = build(fallback.as_str())?;
            endpoints.set(signal, fallback);
            Ok(exporter)
        }
    }
}

fn build_span_exporter(endpoint: &str, client: ExportClient) -> Result<SpanExporter> {
    SpanExporter::builder()
        .with_http()
        .with_protocol(Protocol::HttpBinary)
        .with_endpoint(endpoint)
        .with_timeout(EXPORT_TIMEOUT)
        .with_http_client(client)
        .with_compression(Compression::Gzip)
        .build()
        .map_err(|source| TelemetryError::Exporter {
            signal: Signal::Traces,
            source,
        })
}

fn build_metric_exporter(endpoint: &str, client: ExportClient) -> Result<MetricExporter> {
    MetricExporter::builder()
        .with_http()
        .with_protocol(Protocol::HttpBinary)
        .with_endpoint(endpoint)
        .with_timeout(EXPORT_TIMEOUT)
        .with_http_client(client)
        .with_compression(Compression::Gzip)
        .build()
        .map_err(|source| TelemetryError::Exporter {
            signal: Signal::Metrics,
            source,
        })
}

fn build_log_exporter(endpoint: &str, client: ExportClient) -> Result<LogExporter> {
    LogExporter::builder()
        .with_http()
        .with_protocol(Protocol::HttpBinary)
        .with_endpoint(endpoint)
        .with_timeout(EXPORT_TIMEOUT)
        .with_http_client(client)
        .with_compression(Compression::Gzip)
        .build()
        .map_err(|source| TelemetryError::Exporter {
            signal: Signal::Logs,
            source,
        })
}

fn build_tracer_provider(
    exporter: ReportingSpanExporter<SpanExporter>,
    resource: Resource,
) -> SdkTracerProvider {
    let batch_config = BatchConfigBuilder::default()
        .with_max_queue_size(TRACE_MAX_QUEUE_SIZE)
        .with_max_export_batch_size(TRACE_MAX_EXPORT_BATCH_SIZE)
        .with_scheduled_delay(TRACE_SCHEDULED_DELAY)
        .build();

    let processor = BatchSpanProcessor::builder(exporter)
        .with_batch_config(batch_config)
        .build();

    let provider = SdkTracerProvider::builder()
        .with_sampler(Sampler::AlwaysOn)
        .with_span_processor(processor)
        .with_resource(resource)
        .build();

    info!("Tracer provider initialized");
    provider
}

fn build_meter_provider(exporter: MetricExporter, resource: Resource) -> SdkMeterProvider {
    let reader = PeriodicReader::builder(exporter)
        .with_interval(METRIC_EXPORT_INTERVAL)
        .build();

    let provider = SdkMeterProvider::builder()
        .with_resource(resource)
        .with_reader(reader)
        .build();

    info!("Meter provider initialized");
    provider
}

fn build_logger_provider(exporter: LogExporter, resource: Resource) -> SdkLoggerProvider {
    let provider = SdkLoggerProvider::builder()
        .with_resource(resource)
        .with_batch_exporter(exporter)
        .build();

    info!("Logger provider initialized");
    provider
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unreachable_config() -> TelemetryConfig {
        TelemetryConfig {
            // Port 9 (discard) is closed on test machines; exports fail fast.
            exporter_endpoint: "http://127.0.0.1:9/v1/traces".to_string(),
            exporter_token: Some("dGVzdDp0ZXN0".to_string()),
            ..Default::default()
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_init_resolves_endpoints() {
        let providers = TelemetryProviders::init(&unreachable_config()).unwrap();

        assert_eq!(providers.endpoints().traces, "http://127.0.0.1:9/v1/traces");
        assert_eq!(providers.endpoints().metrics, "http://127.0.0.1:9/v1/metrics");
        assert_eq!(providers.endpoints().logs, "http://127.0.0.1:9/v1/logs");

        assert!(providers.startup_warnings().is_empty());

        providers.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_malformed_endpoint_falls_back_to_default_collector() {
        let config = TelemetryConfig {
            exporter_endpoint: "http://exa mple.com/v1/traces".to_string(),
            metrics_endpoint: Some("http://127.0.0.1:9/v1/metrics".to_string()),
            ..Default::default()
        };

        let providers = TelemetryProviders::init(&config).unwrap();

        assert_eq!(providers.endpoints().traces, "http://localhost:4318/v1/traces");
        assert_eq!(providers.endpoints().metrics, "http://127.0.0.1:9/v1/metrics");
        assert_eq!(providers.endpoints().logs, "http://localhost:4318/v1/logs");

        let warnings = providers.startup_warnings();
        assert_eq!(warnings.len(), 2);
        assert!(warnings[0].contains("exa mple.com"));
        assert!(warnings[1].starts_with("Unusable log endpoint"));

        providers.shutdown().await;
    }

    #[test]
    fn test_fallback_is_skipped_for_usable_endpoints() {
        let mut endpoints = SignalEndpoints::resolve(&unreachable_config());
        let mut warnings = Vec::new();

        let built = build_with_fallback(Signal::Metrics, &mut endpoints, &mut warnings, |e| {
            Ok(e.to_string())
        })
        .unwrap();

        assert_eq!(built, "http://127.0.0.1:9/v1/metrics");
        assert!(warnings.is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_flush_is_counted_and_never_hangs() {
        let providers = TelemetryProviders::init(&unreachable_config()).unwrap();

        let started = std::time::Instant::now();
        providers.flush().await;
        assert!(started.elapsed() <= FLUSH_TIMEOUT + Duration::from_secs(1));

        let stats = providers.flush_stats();
        assert_eq!(stats.flushes + stats.failed + stats.timed_out, 1);

        providers.shutdown().await;
    }
}
