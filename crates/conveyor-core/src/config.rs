//! Agent configuration loaded from environment variables.
//!
//! The agent is configured entirely through its process environment (it
//! runs as a containerized task, not from config files). Values are read
//! through the `config` crate's `Environment` source and validated before
//! the worker loop is allowed to start.

use std::time::Duration;

use serde::Deserialize;

use crate::error::AppError;
use crate::result::AppResult;

/// Runtime configuration for the worker agent.
///
/// Recognized environment variables:
///
/// | Variable | Meaning |
/// |---|---|
/// | `API_ENDPOINT` | Queue API base URL (required, http/https) |
/// | `JOB_TYPES` | Comma-separated job types to process (required) |
/// | `WORKER_USERNAME` | Login email for the queue API (required) |
/// | `WORKER_PASSWORD` | Login password for the queue API (required) |
/// | `AWS_REGION` | Region for result uploads (default `ap-southeast-2`) |
/// | `S3_ENDPOINT` | Optional S3-compatible endpoint override |
/// | `POLL_INTERVAL_MS` | Delay between empty polls (default 2000) |
/// | `IDLE_TIMEOUT_MS` | Idle shutdown after this long (default 300000, 0 disables) |
#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    /// Base URL of the job queue API.
    #[serde(default)]
    pub api_endpoint: String,
    /// Comma-separated list of job types this worker processes.
    #[serde(default)]
    pub job_types: String,
    /// Login email for the queue API.
    #[serde(default)]
    pub worker_username: String,
    /// Login password for the queue API.
    #[serde(default)]
    pub worker_password: String,
    /// AWS region used for result uploads and reported to handlers.
    #[serde(default = "default_region")]
    pub aws_region: String,
    /// Optional endpoint override for S3-compatible object stores.
    #[serde(default)]
    pub s3_endpoint: Option<String>,
    /// Milliseconds to sleep between polls that yield no work.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Milliseconds of inactivity after which the worker shuts itself
    /// down. Zero disables idle shutdown.
    #[serde(default = "default_idle_timeout_ms")]
    pub idle_timeout_ms: u64,
}

impl AgentConfig {
    /// Load and validate configuration from the process environment.
    pub fn from_env() -> AppResult<Self> {
        let raw = config::Config::builder()
            .add_source(config::Environment::default().try_parsing(true))
            .build()
            .map_err(|e| AppError::configuration(format!("Failed to read environment: {e}")))?;

        let cfg: Self = raw
            .try_deserialize()
            .map_err(|e| AppError::configuration(format!("Invalid worker configuration: {e}")))?;

        cfg.validate()?;
        Ok(cfg)
    }

    /// Validate required fields and value formats.
    ///
    /// Called by [`AgentConfig::from_env`] before the configuration is
    /// handed to any component; a failure here aborts startup.
    pub fn validate(&self) -> AppResult<()> {
        if self.api_endpoint.is_empty() {
            return Err(AppError::configuration("API_ENDPOINT must be set"));
        }
        if !self.api_endpoint.starts_with("http://") && !self.api_endpoint.starts_with("https://") {
            return Err(AppError::configuration(format!(
                "API_ENDPOINT must start with http:// or https://, got '{}'",
                self.api_endpoint
            )));
        }
        if self.job_type_list().is_empty() {
            return Err(AppError::configuration(
                "JOB_TYPES must be a non-empty comma-separated list",
            ));
        }
        if self.worker_username.is_empty() {
            return Err(AppError::configuration("WORKER_USERNAME must be set"));
        }
        if self.worker_password.is_empty() {
            return Err(AppError::configuration("WORKER_PASSWORD must be set"));
        }
        Ok(())
    }

    /// The configured job types, split and trimmed, empty entries removed.
    pub fn job_type_list(&self) -> Vec<String> {
        self.job_types
            .split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect()
    }

    /// Delay between polls that return no matching work.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Idle shutdown threshold, or `None` when disabled.
    pub fn idle_timeout(&self) -> Option<Duration> {
        if self.idle_timeout_ms == 0 {
            None
        } else {
            Some(Duration::from_millis(self.idle_timeout_ms))
        }
    }
}

fn default_region() -> String {
    "ap-southeast-2".to_string()
}

fn default_poll_interval_ms() -> u64 {
    2_000
}

fn default_idle_timeout_ms() -> u64 {
    300_000
}
