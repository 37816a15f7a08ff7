//! CLI argument parsing.

use std::path::PathBuf;

use clap::Parser;

use crate::config::AppConfig;

/// DynamoDB demo instrumented with OpenTelemetry.
#[derive(Parser, Debug, Clone, Default)]
#[command(name = "otel-dynamodb-demo")]
#[command(about = "Run a DynamoDB Put/Get/Scan workload and export its telemetry over OTLP")]
#[command(version)]
pub struct DemoArgs {
    /// Path to configuration file (JSON5 format).
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Number of iterations to run; 0 runs until interrupted.
    #[arg(short = 'n', long)]
    pub iterations: Option<u64>,

    /// Pause between iterations in milliseconds.
    #[arg(long)]
    pub interval_ms: Option<u64>,

    /// Override log level (trace, debug, info, warn, error).
    #[arg(long)]
    pub log_level: Option<String>,
}

impl DemoArgs {
    /// Apply flag overrides on top of file and environment settings.
    pub fn apply_to(&self, config: &mut AppConfig) {
        if let Some(n) = self.iterations {
            config.demo.max_iterations = n;
        }
        if let Some(ms) = self.interval_ms {
            config.demo.interval_ms = ms;
        }
        if let Some(level) = &self.log_level {
            config.logging.level = level.clone();
        }
    }
}
