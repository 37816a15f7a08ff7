//! Error types for the DynamoDB demo.

use thiserror::Error;

/// Result type alias using [`DemoError`].
pub type Result<T> = std::result::Result<T, DemoError>;

/// Errors that can occur while running the demo.
#[derive(Error, Debug)]
pub enum DemoError {
    /// Configuration validation error.
    #[error("Configuration validation failed: {0}")]
    ConfigValidation(String),

    /// Telemetry bootstrap error.
    #[error(transparent)]
    Telemetry(#[from] otel_demo_telemetry::TelemetryError),

    /// A DynamoDB call failed.
    #[error("DynamoDB {operation} failed: {source}")]
    DynamoDb {
        operation: &'static str,
        #[source]
        source: aws_sdk_dynamodb::Error,
    },
}

impl DemoError {
    /// Create a configuration validation error.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::ConfigValidation(msg.into())
    }

    /// Wrap a DynamoDB SDK error for `operation`.
    pub fn dynamodb<E>(operation: &'static str, err: E) -> Self
    where
        E: Into<aws_sdk_dynamodb::Error>,
    {
        Self::DynamoDb {
            operation,
            source: err.into(),
        }
    }

    /// Whether the target table does not exist.
    pub fn is_resource_not_found(&self) -> bool {
        matches!(
            self,
            Self::DynamoDb {
                source: aws_sdk_dynamodb::Error::ResourceNotFoundException(_),
                ..
            }
        )
    }
}
