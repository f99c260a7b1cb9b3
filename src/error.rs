//! Error types for gradeforge operations.
//!
//! Defines the error types for each subsystem:
//! - Workspace allocation and file placement
//! - Stage execution through the pipeline facade
//! - Job registry and scheduler operations
//! - Stage capabilities (text correction, scoring)
//! - LLM API interactions

use std::path::PathBuf;

use thiserror::Error;

use crate::pipeline::runner::CapturedOutput;
use crate::scheduler::job::{JobId, JobStatus, StageKind};

/// Errors that can occur while allocating or using a job workspace.
#[derive(Debug, Error)]
pub enum WorkspaceError {
    #[error("Workspace IO error at '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Path '{0}' escapes the job workspace")]
    OutsideWorkspace(String),

    #[error("Artifact not found: {0}")]
    NotFound(String),
}

impl WorkspaceError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Errors that can occur while running a stage through the pipeline.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Workspace error: {0}")]
    Workspace(#[from] WorkspaceError),

    #[error("{stage} stage failed: {message}")]
    StageExecution {
        stage: StageKind,
        message: String,
        /// Diagnostic text the capability emitted before it faulted.
        output: CapturedOutput,
    },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    /// Returns the diagnostic text captured before the failure, if any.
    pub fn captured_output(&self) -> Option<&CapturedOutput> {
        match self {
            PipelineError::StageExecution { output, .. } => Some(output),
            _ => None,
        }
    }
}

/// Errors returned by the job registry and the scheduler.
#[derive(Debug, Error)]
pub enum JobError {
    #[error("Job '{0}' not found")]
    NotFound(JobId),

    #[error("Job '{0}' is running and cannot be deleted")]
    JobBusy(JobId),

    #[error("Invalid transition for job '{job_id}' from '{from}': {reason}")]
    InvalidTransition {
        job_id: JobId,
        from: JobStatus,
        reason: String,
    },

    #[error("Workspace error: {0}")]
    Workspace(#[from] WorkspaceError),

    #[error("Scheduler is shut down and no longer accepts jobs")]
    SchedulerClosed,

    #[error("Scheduler shutdown timed out after {0:?}")]
    ShutdownTimeout(std::time::Duration),
}

/// Errors raised by a stage capability while processing documents.
#[derive(Debug, Error)]
pub enum CapabilityError {
    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Rubric error: {0}")]
    Rubric(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("{0}")]
    Other(String),
}

/// Errors that can occur during LLM operations.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("Missing API key: XAI_API_KEY environment variable not set")]
    MissingApiKey,

    #[error("HTTP request failed: {0}")]
    RequestFailed(String),

    #[error("Failed to parse LLM response: {0}")]
    ParseError(String),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("API error ({code}): {message}")]
    ApiError { code: u16, message: String },

    #[error("Task join error: {0}")]
    Join(String),
}
