//! DynamoDB workload instrumented with OpenTelemetry.
//!
//! # Overview
//!
//! - [`AppConfig`] for configuration loading (JSON5 file, environment, CLI)
//! - [`DynamoDbWorkload`] runs PutItem, GetItem and Scan against one table
//! - [`OperationMetrics`] counts and times every DynamoDB call
//! - [`StorageCallInterceptor`] tags DynamoDB spans and traces outgoing HTTP
//! - [`DemoLoop`] repeats the workload and flushes telemetry after each pass
//!
//! # Example
//!
//! ```ignore
//! use otel_dynamodb_demo::{AppConfig, DemoLoop, DynamoDbWorkload, OperationMetrics};
//! use otel_demo_telemetry::{OutgoingCallFilter, TelemetryProviders};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let (config, _warnings) = AppConfig::load(None)?;
//!     let providers = TelemetryProviders::init(&config.telemetry)?;
//!
//!     let metrics = OperationMetrics::new(
//!         &providers.meter("demo"),
//!         config.workload.table_name.clone(),
//!     );
//!     let filter = OutgoingCallFilter::new(&config.telemetry);
//!     let mut workload = DynamoDbWorkload::connect(&config.workload, filter, metrics).await;
//!
//!     let (_tx, rx) = tokio::sync::watch::channel(false);
//!     DemoLoop::new(&config.demo).run(&mut workload, &providers, rx).await;
//!
//!     providers.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod args;
pub mod config;
pub mod error;
pub mod interceptor;
pub mod metrics;
pub mod runner;
pub mod workload;

pub use args::DemoArgs;
pub use config::{AppConfig, LoopConfig, WorkloadConfig};
pub use error::{DemoError, Result};
pub use interceptor::{StorageCallInterceptor, with_call_span};
pub use metrics::{OperationMetrics, OperationObserver, record_operation};
pub use runner::{DemoLoop, DemoLoopState, LoopState, LoopSummary, TelemetryFlush};
pub use workload::{DynamoDbWorkload, Workload};
