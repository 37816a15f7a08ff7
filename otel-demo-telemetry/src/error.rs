use thiserror::Error;

use crate::endpoint::Signal;

/// Errors raised while bootstrapping the telemetry pipeline.
#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("Failed to read config file '{path}': {source}")]
    ConfigRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    ConfigParse(#[from] json5::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Failed to create {signal} exporter: {source}")]
    Exporter {
        signal: Signal,
        #[source]
        source: opentelemetry_otlp::ExporterBuildError,
    },

    #[error("Failed to create OTLP HTTP client: {0}")]
    HttpClient(String),

    #[error("Invalid log filter directive: {0}")]
    Filter(#[from] tracing_subscriber::filter::ParseError),

    #[error("Failed to initialize tracing: {0}")]
    Subscriber(#[from] tracing_subscriber::util::TryInitError),
}

/// Result type alias using [`TelemetryError`].
pub type Result<T> = std::result::Result<T, TelemetryError>;
