//! Job definitions for the scheduler.
//!
//! This module defines the core job types used by the registry and workers:
//!
//! - `JobId`: Opaque identifier of a submitted job
//! - `JobType`: Which stages a job runs
//! - `JobStatus`: Lifecycle state shared by jobs and stages
//! - `StageSnapshot`: Per-stage status, captured text and output files
//! - `JobRecord`: The full record kept by the registry

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::workspace::JobPaths;

/// Unique identifier of a job. Generated once, never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(Uuid);

impl JobId {
    /// Generates a fresh random identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for JobId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// A single stage of the document pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    /// OCR and text correction of raw documents.
    Transform,
    /// Rubric-based scoring of transformed documents.
    Score,
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StageKind::Transform => write!(f, "transform"),
            StageKind::Score => write!(f, "score"),
        }
    }
}

/// Kind of job, which fixes the stages it runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    Transform,
    Score,
    Full,
}

impl JobType {
    /// Stages this job type runs, in execution order.
    pub fn stages(&self) -> &'static [StageKind] {
        match self {
            JobType::Transform => &[StageKind::Transform],
            JobType::Score => &[StageKind::Score],
            JobType::Full => &[StageKind::Transform, StageKind::Score],
        }
    }

    /// Whether this job type needs a rubric to run.
    pub fn requires_rubric(&self) -> bool {
        self.stages().contains(&StageKind::Score)
    }
}

impl fmt::Display for JobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobType::Transform => write!(f, "transform"),
            JobType::Score => write!(f, "score"),
            JobType::Full => write!(f, "full"),
        }
    }
}

impl FromStr for JobType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "transform" | "process" => Ok(JobType::Transform),
            "score" | "grade" => Ok(JobType::Score),
            "full" => Ok(JobType::Full),
            other => Err(format!(
                "unknown job type '{}': expected transform, score or full",
                other
            )),
        }
    }
}

/// Lifecycle state of a job or of one of its stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    /// Returns true for `Completed` and `Failed`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobStatus::Pending => write!(f, "pending"),
            JobStatus::Running => write!(f, "running"),
            JobStatus::Completed => write!(f, "completed"),
            JobStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Status and outputs of one stage of a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageSnapshot {
    pub name: StageKind,
    pub status: JobStatus,
    pub stdout: String,
    pub stderr: String,
    /// Files produced by the stage, relative to the job root when possible.
    pub output_files: Vec<PathBuf>,
}

impl StageSnapshot {
    pub fn new(name: StageKind) -> Self {
        Self {
            name,
            status: JobStatus::Pending,
            stdout: String::new(),
            stderr: String::new(),
            output_files: Vec::new(),
        }
    }
}

/// The registry's record of a job.
///
/// `stages` is fixed at creation from `job_type` and only mutated in place.
#[derive(Debug, Clone)]
pub struct JobRecord {
    pub id: JobId,
    pub job_type: JobType,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub paths: JobPaths,
    pub stages: Vec<StageSnapshot>,
    pub error: Option<String>,
}

impl JobRecord {
    /// Creates a pending record with one pending stage per required stage.
    pub fn new(job_type: JobType, paths: JobPaths) -> Self {
        let now = Utc::now();
        Self {
            id: paths.job_id,
            job_type,
            status: JobStatus::Pending,
            created_at: now,
            updated_at: now,
            paths,
            stages: job_type
                .stages()
                .iter()
                .copied()
                .map(StageSnapshot::new)
                .collect(),
            error: None,
        }
    }

    pub fn stage(&self, kind: StageKind) -> Option<&StageSnapshot> {
        self.stages.iter().find(|s| s.name == kind)
    }

    pub(crate) fn stage_mut(&mut self, kind: StageKind) -> Option<&mut StageSnapshot> {
        self.stages.iter_mut().find(|s| s.name == kind)
    }

    /// Whether every stage has completed.
    pub fn all_stages_completed(&self) -> bool {
        self.stages
            .iter()
            .all(|s| s.status == JobStatus::Completed)
    }

    pub(crate) fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}
