//! OpenTelemetry bootstrap for the DynamoDB demo.
//!
//! This crate turns a handful of `OTEL_*` environment variables into three
//! OTLP/HTTP providers (traces, metrics, logs) that share one resource:
//!
//! - [`config`] - Telemetry configuration (env + JSON5)
//! - [`endpoint`] - Per-signal endpoint resolution
//! - [`resource`] - Service identity attributes
//! - [`providers`] - Provider construction, flush and shutdown
//! - [`exporter`] - Span exporter decorator that reports failed exports
//! - [`transport`] - HTTP client that carries the exporter credential
//! - [`filter`] - Outgoing-call filter for telemetry traffic
//! - [`error`] - Error types
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐     ┌──────────────────┐     ┌─────────────────┐
//! │ Environment  │────>│ TelemetryConfig  │────>│ SignalEndpoints │
//! └──────────────┘     └──────────────────┘     └────────┬────────┘
//!                                                        v
//!                      ┌──────────────────┐     ┌─────────────────┐
//!                      │ tracing layers   │<────│ Telemetry-      │──> OTLP
//!                      │ (fmt/otel/logs)  │     │ Providers       │
//!                      └──────────────────┘     └─────────────────┘
//! ```

pub mod config;
pub mod endpoint;
pub mod error;
pub mod exporter;
pub mod filter;
pub mod providers;
pub mod resource;
pub mod transport;

pub use config::{LogFormat, LoggingConfig, TelemetryConfig, load_config, parse_config};
pub use endpoint::{Signal, SignalEndpoints, derive_endpoint, resolve_endpoint};
pub use error::{Result, TelemetryError};
pub use exporter::{EXPORT_LOG_TARGET, ReportingSpanExporter};
pub use filter::{OutgoingCallFilter, host_and_path};
pub use providers::{FlushStats, TelemetryProviders};
pub use resource::{build_resource, build_resource_attributes};
pub use transport::AuthorizingHttpClient;

use opentelemetry_appender_tracing::layer::OpenTelemetryTracingBridge;
use tracing_subscriber::filter::{Directive, filter_fn};
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt, prelude::*};

/// Instrumentation scope name for spans created by the demo.
pub const INSTRUMENTATION_SCOPE: &str = "otel-dynamodb-demo";

/// Log targets that must never be bridged into the OTLP log pipeline.
///
/// These are the exporter's own transport and diagnostics; forwarding them
/// would make every export produce more telemetry to export.
const TRANSPORT_TARGETS: &[&str] = &[
    "opentelemetry",
    "opentelemetry_sdk",
    "opentelemetry_otlp",
    "opentelemetry-otlp",
    "hyper",
    "hyper_util",
    "h2",
    "reqwest",
    "tonic",
    EXPORT_LOG_TARGET,
];

/// Whether events from `target` are part of the exporter's own traffic.
pub fn is_transport_target(target: &str) -> bool {
    TRANSPORT_TARGETS.iter().any(|t| {
        target == *t
            || target
                .strip_prefix(t)
                .is_some_and(|rest| rest.starts_with("::"))
    })
}

/// Build the console log filter.
///
/// `RUST_LOG` wins when set. Otherwise the configured level applies, raised
/// to `debug` when `debug_enabled`; SDK internals stay at `warn` unless
/// debugging.
pub fn build_env_filter(config: &LoggingConfig, debug_enabled: bool) -> Result<EnvFilter> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }

    let level = if debug_enabled { "debug" } else { config.level.as_str() };
    let mut filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));

    let quiet = if debug_enabled { "debug" } else { "warn" };
    for target in ["opentelemetry", "opentelemetry_sdk", "opentelemetry_otlp"] {
        filter = filter.add_directive(format!("{}={}", target, quiet).parse::<Directive>()?);
    }
    for target in [
        "aws_sdk_dynamodb",
        "aws_smithy_runtime",
        "aws_config",
        "hyper",
        "h2",
        "reqwest",
    ] {
        filter = filter.add_directive(format!("{}=warn", target).parse::<Directive>()?);
    }

    Ok(filter)
}

/// Initialize tracing: console output plus span and log export through the
/// given providers.
///
/// Supports two console formats:
/// - `LogFormat::Text` (default): Human-readable text format
/// - `LogFormat::Json`: Structured JSON format for log aggregation systems
pub fn init_tracing(
    config: &LoggingConfig,
    debug_enabled: bool,
    providers: &TelemetryProviders,
) -> Result<()> {
    let filter = build_env_filter(config, debug_enabled)?;

    let fmt_layer: Box<dyn Layer<Registry> + Send + Sync> = match config.format {
        LogFormat::Text => fmt::layer().with_target(false).boxed(),
        LogFormat::Json => fmt::layer().json().boxed(),
    };

    let span_layer =
        tracing_opentelemetry::layer().with_tracer(providers.tracer(INSTRUMENTATION_SCOPE));

    let log_layer = OpenTelemetryTracingBridge::new(providers.logger_provider())
        .with_filter(filter_fn(|meta| !is_transport_target(meta.target())));

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(span_layer)
        .with(log_layer)
        .with(filter)
        .try_init()?;

    Ok(())
}
