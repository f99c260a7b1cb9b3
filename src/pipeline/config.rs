//! Pipeline configuration.
//!
//! This module provides configuration for the document pipeline: where job
//! workspaces and job-less outputs live, how many workers run stages, the
//! LLM endpoint and credential, and how per-document failures are treated.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default chat-completions endpoint.
pub const DEFAULT_API_BASE: &str = "https://api.x.ai/v1";

/// Default model for correction, grading and moderation.
pub const DEFAULT_MODEL: &str = "grok-4-fast-reasoning";

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An environment variable has an invalid value.
    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    /// Configuration validation failed.
    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),
}

/// What a multi-document stage does when one document fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemFailurePolicy {
    /// Record the error in the stage's stderr and move on to the next document.
    #[default]
    SkipItem,
    /// Fail the stage, and therefore the job, on the first document error.
    FailStage,
}

impl FromStr for ItemFailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "skip_item" | "skip" => Ok(ItemFailurePolicy::SkipItem),
            "fail_stage" | "fail" => Ok(ItemFailurePolicy::FailStage),
            other => Err(format!(
                "expected 'skip_item' or 'fail_stage', got '{}'",
                other
            )),
        }
    }
}

/// Configuration for the pipeline facade and the shipped capabilities.
#[derive(Clone)]
pub struct PipelineConfig {
    // Storage settings
    /// Root under which per-job workspaces are created.
    pub jobs_root: PathBuf,
    /// Output directory for job-less transform runs.
    pub transformed_dir: PathBuf,
    /// Output directory for job-less score runs.
    pub scored_dir: PathBuf,

    // Execution settings
    /// Number of scheduler workers, i.e. concurrent stage invocations.
    pub max_workers: usize,
    /// Per-document failure handling inside a stage.
    pub item_failure_policy: ItemFailurePolicy,

    // LLM settings
    /// API token shared by both capabilities. Checked when a stage runs.
    pub api_key: Option<String>,
    /// Base URL of the chat-completions API.
    pub api_base: String,
    /// Model identifier.
    pub model: String,
    /// HTTP timeout for a single LLM request.
    pub request_timeout: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            jobs_root: PathBuf::from("./jobs"),
            transformed_dir: PathBuf::from("./essays_to_grade"),
            scored_dir: PathBuf::from("./graded_essays"),

            max_workers: 2,
            item_failure_policy: ItemFailurePolicy::SkipItem,

            api_key: None,
            api_base: DEFAULT_API_BASE.to_string(),
            model: DEFAULT_MODEL.to_string(),
            request_timeout: Duration::from_secs(120),
        }
    }
}

impl fmt::Debug for PipelineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineConfig")
            .field("jobs_root", &self.jobs_root)
            .field("transformed_dir", &self.transformed_dir)
            .field("scored_dir", &self.scored_dir)
            .field("max_workers", &self.max_workers)
            .field("item_failure_policy", &self.item_failure_policy)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("api_base", &self.api_base)
            .field("model", &self.model)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

impl PipelineConfig {
    /// Creates a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a configuration from environment variables.
    ///
    /// Reads a `.env` file first if one is present. Recognized variables:
    /// - `GRADEFORGE_JOBS_ROOT`, `GRADEFORGE_TRANSFORMED_DIR`, `GRADEFORGE_SCORED_DIR`
    /// - `GRADEFORGE_MAX_WORKERS`
    /// - `GRADEFORGE_ITEM_FAILURE_POLICY` (`skip_item` or `fail_stage`)
    /// - `GRADEFORGE_API_BASE`, `GRADEFORGE_MODEL`, `GRADEFORGE_REQUEST_TIMEOUT_SECS`
    /// - `XAI_API_KEY` (optional here; stages fail without it)
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a value cannot be parsed or validation fails.
    pub fn from_env() -> Result<Self, ConfigError> {
        if let Err(e) = dotenvy::dotenv() {
            if !e.not_found() {
                tracing::warn!(error = %e, "Failed to load .env file");
            }
        }

        let mut config = Self::default();

        if let Ok(val) = std::env::var("GRADEFORGE_JOBS_ROOT") {
            config.jobs_root = PathBuf::from(val);
        }

        if let Ok(val) = std::env::var("GRADEFORGE_TRANSFORMED_DIR") {
            config.transformed_dir = PathBuf::from(val);
        }

        if let Ok(val) = std::env::var("GRADEFORGE_SCORED_DIR") {
            config.scored_dir = PathBuf::from(val);
        }

        if let Ok(val) = std::env::var("GRADEFORGE_MAX_WORKERS") {
            config.max_workers = parse_env_value(&val, "GRADEFORGE_MAX_WORKERS")?;
        }

        if let Ok(val) = std::env::var("GRADEFORGE_ITEM_FAILURE_POLICY") {
            config.item_failure_policy =
                val.parse().map_err(|message| ConfigError::InvalidValue {
                    key: "GRADEFORGE_ITEM_FAILURE_POLICY".to_string(),
                    message,
                })?;
        }

        if let Ok(val) = std::env::var("GRADEFORGE_API_BASE") {
            config.api_base = val;
        }

        if let Ok(val) = std::env::var("GRADEFORGE_MODEL") {
            config.model = val;
        }

        if let Ok(val) = std::env::var("GRADEFORGE_REQUEST_TIMEOUT_SECS") {
            let secs: u64 = parse_env_value(&val, "GRADEFORGE_REQUEST_TIMEOUT_SECS")?;
            config.request_timeout = Duration::from_secs(secs);
        }

        config.api_key = std::env::var("XAI_API_KEY")
            .ok()
            .filter(|key| !key.trim().is_empty());
        if config.api_key.is_none() {
            tracing::warn!("XAI_API_KEY is not set; stage execution will fail until it is");
        }

        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationFailed` if any values are invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_workers == 0 {
            return Err(ConfigError::ValidationFailed(
                "max_workers must be greater than 0".to_string(),
            ));
        }

        if self.jobs_root.as_os_str().is_empty() {
            return Err(ConfigError::ValidationFailed(
                "jobs_root cannot be empty".to_string(),
            ));
        }

        if self.api_base.is_empty() {
            return Err(ConfigError::ValidationFailed(
                "api_base cannot be empty".to_string(),
            ));
        }

        if self.model.is_empty() {
            return Err(ConfigError::ValidationFailed(
                "model cannot be empty".to_string(),
            ));
        }

        if self.request_timeout.as_secs() == 0 {
            return Err(ConfigError::ValidationFailed(
                "request_timeout must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Returns the API key or a description of why it is unusable.
    pub fn require_api_key(&self) -> Result<&str, String> {
        self.api_key
            .as_deref()
            .ok_or_else(|| "XAI_API_KEY is not configured".to_string())
    }

    /// Builder method to set the jobs root.
    pub fn with_jobs_root(mut self, path: impl Into<PathBuf>) -> Self {
        self.jobs_root = path.into();
        self
    }

    /// Builder method to set the job-less transform output directory.
    pub fn with_transformed_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.transformed_dir = path.into();
        self
    }

    /// Builder method to set the job-less score output directory.
    pub fn with_scored_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.scored_dir = path.into();
        self
    }

    /// Builder method to set the worker count.
    pub fn with_max_workers(mut self, workers: usize) -> Self {
        self.max_workers = workers;
        self
    }

    /// Builder method to set the per-document failure policy.
    pub fn with_item_failure_policy(mut self, policy: ItemFailurePolicy) -> Self {
        self.item_failure_policy = policy;
        self
    }

    /// Builder method to set the API key.
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Builder method to set the API base URL.
    pub fn with_api_base(mut self, base: impl Into<String>) -> Self {
        self.api_base = base.into();
        self
    }

    /// Builder method to set the model.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Builder method to set the LLM request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

/// Parse an environment variable value into a type.
fn parse_env_value<T: std::str::FromStr>(value: &str, key: &str) -> Result<T, ConfigError> {
    value.parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        message: format!("could not parse '{}'", value),
    })
}
