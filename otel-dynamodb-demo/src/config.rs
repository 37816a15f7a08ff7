//! Demo configuration.
//!
//! An [`AppConfig`] is assembled once at startup from, in increasing order of
//! precedence: built-in defaults, an optional JSON5 file, environment
//! variables, and CLI flags.

use std::path::Path;
use std::time::Duration;

use otel_demo_telemetry::{LoggingConfig, TelemetryConfig};
use serde::{Deserialize, Serialize};

use crate::error::{DemoError, Result};

pub const ENV_TABLE: &str = "DYNAMODB_TABLE";
pub const ENV_TABLE_NAME: &str = "TABLE_NAME";
pub const ENV_REGION: &str = "AWS_REGION";
pub const ENV_DEFAULT_REGION: &str = "AWS_DEFAULT_REGION";
pub const ENV_INTERVAL_MS: &str = "DEMO_INTERVAL_MS";
pub const ENV_ITERATIONS: &str = "DEMO_ITERATIONS";

/// Complete demo configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub telemetry: TelemetryConfig,

    #[serde(default)]
    pub workload: WorkloadConfig,

    #[serde(default)]
    pub demo: LoopConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Target of the DynamoDB workload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkloadConfig {
    /// Table the demo writes to and reads from.
    #[serde(default = "default_table_name")]
    pub table_name: String,

    /// AWS region of the table.
    #[serde(default = "default_region")]
    pub region: String,
}

fn default_table_name() -> String {
    "otel-demo-items".to_string()
}

fn default_region() -> String {
    "us-east-1".to_string()
}

impl Default for WorkloadConfig {
    fn default() -> Self {
        Self {
            table_name: default_table_name(),
            region: default_region(),
        }
    }
}

/// Demo loop pacing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoopConfig {
    /// Pause between iterations in milliseconds.
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,

    /// Number of iterations to run; 0 runs until interrupted.
    #[serde(default)]
    pub max_iterations: u64,
}

fn default_interval_ms() -> u64 {
    10_000
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
            max_iterations: 0,
        }
    }
}

impl LoopConfig {
    /// Pause between iterations.
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

impl AppConfig {
    /// Load the configuration file if given and overlay the process
    /// environment.
    ///
    /// Returns the configuration together with warnings about environment
    /// values that were ignored. Logging is not initialized yet at this
    /// point, so the caller reports them. The caller validates once all
    /// overrides have been applied.
    pub fn load(path: Option<&Path>) -> Result<(Self, Vec<String>)> {
        let mut config: Self = match path {
            Some(path) => otel_demo_telemetry::load_config(path)?,
            None => Self::default(),
        };

        let warnings = config.apply_env();

        Ok((config, warnings))
    }

    /// Parse a JSON5 configuration string without consulting the environment.
    pub fn parse(content: &str) -> Result<Self> {
        Ok(otel_demo_telemetry::parse_config(content)?)
    }

    /// Overlay the process environment onto this configuration.
    pub fn apply_env(&mut self) -> Vec<String> {
        self.apply_lookup(|key| std::env::var(key).ok())
    }

    /// Overlay values returned by `lookup` onto this configuration.
    ///
    /// Empty values are treated as unset. Numeric values that fail to parse
    /// keep the current setting and produce a warning.
    pub fn apply_lookup<F>(&mut self, lookup: F) -> Vec<String>
    where
        F: Fn(&str) -> Option<String>,
    {
        self.telemetry.apply_lookup(&lookup);

        let get = |key: &str| lookup(key).filter(|v| !v.is_empty());
        let mut warnings = Vec::new();

        if let Some(v) = get(ENV_TABLE).or_else(|| get(ENV_TABLE_NAME)) {
            self.workload.table_name = v;
        }
        if let Some(v) = get(ENV_REGION).or_else(|| get(ENV_DEFAULT_REGION)) {
            self.workload.region = v;
        }

        if let Some(v) = get(ENV_INTERVAL_MS) {
            match v.trim().parse() {
                Ok(ms) => self.demo.interval_ms = ms,
                Err(_) => warnings.push(format!(
                    "Ignoring {}={:?}: not a number of milliseconds, using {}",
                    ENV_INTERVAL_MS, v, self.demo.interval_ms
                )),
            }
        }
        if let Some(v) = get(ENV_ITERATIONS) {
            match v.trim().parse() {
                Ok(n) => self.demo.max_iterations = n,
                Err(_) => warnings.push(format!(
                    "Ignoring {}={:?}: not an iteration count, using {}",
                    ENV_ITERATIONS, v, self.demo.max_iterations
                )),
            }
        }

        warnings
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        self.telemetry.validate()?;

        if self.workload.table_name.trim().is_empty() {
            return Err(DemoError::validation("table_name cannot be empty"));
        }

        if self.workload.region.trim().is_empty() {
            return Err(DemoError::validation("region cannot be empty"));
        }

        Ok(())
    }
}
