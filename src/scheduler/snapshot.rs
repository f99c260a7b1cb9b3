//! Serializable views of job records.
//!
//! A [`JobSnapshot`] is what clients see: ids and timestamps as strings,
//! stage output paths relative to the job root, and only the input/output
//! directories of the workspace.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::job::{JobRecord, JobStatus, JobType, StageKind};

/// Workspace directories exposed to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathsSnapshot {
    pub raw: PathBuf,
    pub transformed: PathBuf,
    pub scored: PathBuf,
    pub rubric: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageView {
    pub name: StageKind,
    pub status: JobStatus,
    pub stdout: String,
    pub stderr: String,
    pub output_files: Vec<PathBuf>,
}

/// Client-facing view of a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSnapshot {
    pub id: String,
    #[serde(rename = "type")]
    pub job_type: JobType,
    pub status: JobStatus,
    /// RFC 3339 timestamp.
    pub created_at: String,
    /// RFC 3339 timestamp.
    pub updated_at: String,
    pub error: Option<String>,
    pub stages: Vec<StageView>,
    pub paths: PathsSnapshot,
}

impl From<&JobRecord> for JobSnapshot {
    fn from(record: &JobRecord) -> Self {
        Self {
            id: record.id.to_string(),
            job_type: record.job_type,
            status: record.status,
            created_at: record.created_at.to_rfc3339(),
            updated_at: record.updated_at.to_rfc3339(),
            error: record.error.clone(),
            stages: record
                .stages
                .iter()
                .map(|stage| StageView {
                    name: stage.name,
                    status: stage.status,
                    stdout: stage.stdout.clone(),
                    stderr: stage.stderr.clone(),
                    output_files: stage.output_files.clone(),
                })
                .collect(),
            paths: PathsSnapshot {
                raw: record.paths.raw.clone(),
                transformed: record.paths.transformed.clone(),
                scored: record.paths.scored.clone(),
                rubric: record.paths.rubric.clone(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::job::JobId;
    use crate::workspace::JobPaths;
    use chrono::DateTime;
    use std::path::Path;

    #[test]
    fn test_snapshot_json_shape() {
        let paths = JobPaths::under(Path::new("/srv/jobs"), JobId::new());
        let mut record = JobRecord::new(JobType::Full, paths);
        record.stages[0].status = JobStatus::Completed;
        record.stages[0].output_files = vec![PathBuf::from("transformed/a.txt")];

        let snapshot = JobSnapshot::from(&record);
        let json = serde_json::to_value(&snapshot).expect("serialize");

        assert_eq!(json["id"], record.id.to_string());
        assert_eq!(json["type"], "full");
        assert_eq!(json["status"], "pending");
        assert!(json["error"].is_null());
        assert_eq!(json["stages"][0]["name"], "transform");
        assert_eq!(json["stages"][0]["status"], "completed");
        assert_eq!(json["stages"][0]["output_files"][0], "transformed/a.txt");
        assert_eq!(json["stages"][1]["name"], "score");
        assert_eq!(
            json["paths"]["raw"],
            format!("/srv/jobs/{}/raw", record.id)
        );
        assert!(json["paths"].get("artifacts").is_none());
    }

    #[test]
    fn test_snapshot_timestamps_are_rfc3339() {
        let paths = JobPaths::under(Path::new("/srv/jobs"), JobId::new());
        let record = JobRecord::new(JobType::Score, paths);
        let snapshot = JobSnapshot::from(&record);

        let parsed = DateTime::parse_from_rfc3339(&snapshot.created_at).expect("rfc3339");
        assert_eq!(parsed, record.created_at);
        assert!(DateTime::parse_from_rfc3339(&snapshot.updated_at).is_ok());
    }
}
