//! In-memory registry of jobs.
//!
//! The registry is the single owner of every [`JobRecord`]. Reads hand out
//! clones; all mutation goes through short critical sections on one
//! `std::sync::Mutex`, which is never held across an `.await`.

use std::collections::HashMap;
use std::sync::Mutex;

use tracing::{debug, info, warn};

use super::job::{JobId, JobRecord, JobStatus, JobType, StageKind};
use super::snapshot::JobSnapshot;
use crate::error::{JobError, PipelineError};
use crate::pipeline::runner::StageResult;
use crate::workspace::WorkspaceAllocator;

/// Diagnostic text and message of a stage that faulted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StageFailure {
    pub message: String,
    pub stdout: String,
    pub stderr: String,
}

impl StageFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Default::default()
        }
    }
}

impl From<&PipelineError> for StageFailure {
    fn from(err: &PipelineError) -> Self {
        let output = err.captured_output().cloned().unwrap_or_default();
        Self {
            message: err.to_string(),
            stdout: output.stdout,
            stderr: output.stderr,
        }
    }
}

/// Thread-safe store of job records keyed by id.
pub struct JobRegistry {
    allocator: WorkspaceAllocator,
    jobs: Mutex<HashMap<JobId, JobRecord>>,
}

impl JobRegistry {
    pub fn new(allocator: WorkspaceAllocator) -> Self {
        Self {
            allocator,
            jobs: Mutex::new(HashMap::new()),
        }
    }

    pub fn allocator(&self) -> &WorkspaceAllocator {
        &self.allocator
    }

    /// Allocates a workspace and registers a new pending job.
    ///
    /// # Errors
    ///
    /// Returns `JobError::Workspace` if the workspace cannot be created. No
    /// record is registered in that case.
    pub async fn create_job(&self, job_type: JobType) -> Result<JobRecord, JobError> {
        let paths = self.allocator.create_workspace(None).await?;
        let record = JobRecord::new(job_type, paths);

        self.jobs
            .lock()
            .expect("jobs lock poisoned")
            .insert(record.id, record.clone());

        info!(job_id = %record.id, job_type = %job_type, "Job created");
        Ok(record)
    }

    /// All jobs ordered by creation time.
    pub fn list_jobs(&self) -> Vec<JobRecord> {
        let mut jobs: Vec<JobRecord> = self
            .jobs
            .lock()
            .expect("jobs lock poisoned")
            .values()
            .cloned()
            .collect();
        jobs.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.id.as_uuid().cmp(b.id.as_uuid()))
        });
        jobs
    }

    pub fn get_job(&self, job_id: &JobId) -> Option<JobRecord> {
        self.jobs
            .lock()
            .expect("jobs lock poisoned")
            .get(job_id)
            .cloned()
    }

    /// Serializable view of one job.
    pub fn snapshot(&self, job_id: &JobId) -> Option<JobSnapshot> {
        self.get_job(job_id).as_ref().map(JobSnapshot::from)
    }

    /// Removes a job and its workspace.
    ///
    /// # Errors
    ///
    /// - `JobError::NotFound` if no such job exists
    /// - `JobError::JobBusy` if the job is running
    /// - `JobError::Workspace` if the workspace tree cannot be removed (the
    ///   record is already gone by then)
    pub async fn delete_job(&self, job_id: &JobId) -> Result<(), JobError> {
        let record = {
            let mut jobs = self.jobs.lock().expect("jobs lock poisoned");
            match jobs.get(job_id) {
                None => return Err(JobError::NotFound(*job_id)),
                Some(record) if record.status == JobStatus::Running => {
                    return Err(JobError::JobBusy(*job_id));
                }
                Some(_) => {}
            }
            jobs.remove(job_id).ok_or(JobError::NotFound(*job_id))?
        };

        self.allocator.remove_workspace(&record.paths).await?;
        info!(job_id = %job_id, "Job deleted");
        Ok(())
    }

    /// Moves a pending job to `running`.
    pub(crate) fn mark_running(&self, job_id: &JobId) -> Result<(), JobError> {
        self.mutate(job_id, |record| {
            if record.status != JobStatus::Pending {
                return Err(JobError::InvalidTransition {
                    job_id: record.id,
                    from: record.status,
                    reason: "only pending jobs can start".to_string(),
                });
            }
            record.status = JobStatus::Running;
            Ok(())
        })
    }

    pub(crate) fn set_stage_status(
        &self,
        job_id: &JobId,
        stage: StageKind,
        status: JobStatus,
    ) -> Result<(), JobError> {
        self.mutate(job_id, |record| {
            stage_of(record, stage)?.status = status;
            Ok(())
        })
    }

    /// Records a successful stage and recomputes job completion in the same
    /// critical section.
    pub(crate) fn complete_stage(
        &self,
        job_id: &JobId,
        stage: StageKind,
        result: &StageResult,
    ) -> Result<JobStatus, JobError> {
        self.mutate(job_id, |record| {
            let output_files = result
                .output_files
                .iter()
                .map(|path| record.paths.relative(path))
                .collect();
            let snapshot = stage_of(record, stage)?;
            snapshot.status = JobStatus::Completed;
            snapshot.stdout = result.stdout.clone();
            snapshot.stderr = result.stderr.clone();
            snapshot.output_files = output_files;
            Ok(apply_completion(record))
        })
    }

    /// Marks the stage and the job failed.
    ///
    /// The stage keeps the text captured before the fault; the failure
    /// message is appended to its stderr on a new line.
    pub(crate) fn fail_stage(
        &self,
        job_id: &JobId,
        stage: StageKind,
        failure: &StageFailure,
    ) -> Result<(), JobError> {
        self.mutate(job_id, |record| {
            let snapshot = stage_of(record, stage)?;
            snapshot.status = JobStatus::Failed;
            snapshot.stdout = failure.stdout.clone();
            snapshot.stderr = failure.stderr.clone();
            if !snapshot.stderr.is_empty() && !snapshot.stderr.ends_with('\n') {
                snapshot.stderr.push('\n');
            }
            snapshot.stderr.push_str(&failure.message);

            record.status = JobStatus::Failed;
            record.error = Some(failure.message.clone());
            warn!(job_id = %record.id, stage = %stage, error = %failure.message, "Stage failed");
            Ok(())
        })
    }

    /// Sets the job to `completed` if every stage has completed.
    ///
    /// A job that is already terminal is left alone and its status returned.
    pub(crate) fn recompute_job_completion(&self, job_id: &JobId) -> Result<JobStatus, JobError> {
        let mut jobs = self.jobs.lock().expect("jobs lock poisoned");
        let record = jobs.get_mut(job_id).ok_or(JobError::NotFound(*job_id))?;
        if record.status.is_terminal() {
            return Ok(record.status);
        }
        let status = apply_completion(record);
        record.touch();
        Ok(status)
    }

    /// Applies `f` to a job under the lock.
    ///
    /// Completed and failed jobs are terminal and never reach `f`. `f` must
    /// validate before it writes so an error leaves the record untouched.
    fn mutate<T>(
        &self,
        job_id: &JobId,
        f: impl FnOnce(&mut JobRecord) -> Result<T, JobError>,
    ) -> Result<T, JobError> {
        let mut jobs = self.jobs.lock().expect("jobs lock poisoned");
        let record = jobs.get_mut(job_id).ok_or(JobError::NotFound(*job_id))?;
        if record.status.is_terminal() {
            return Err(JobError::InvalidTransition {
                job_id: *job_id,
                from: record.status,
                reason: format!("job is already {}", record.status),
            });
        }
        let value = f(record)?;
        record.touch();
        Ok(value)
    }
}

fn stage_of(
    record: &mut JobRecord,
    stage: StageKind,
) -> Result<&mut super::job::StageSnapshot, JobError> {
    let job_id = record.id;
    let from = record.status;
    record
        .stage_mut(stage)
        .ok_or_else(|| JobError::InvalidTransition {
            job_id,
            from,
            reason: format!("job has no {} stage", stage),
        })
}

fn apply_completion(record: &mut JobRecord) -> JobStatus {
    if record.all_stages_completed() && record.status != JobStatus::Completed {
        record.status = JobStatus::Completed;
        debug!(job_id = %record.id, "All stages completed");
    }
    record.status
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::runner::CapturedOutput;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn registry(tmp: &TempDir) -> JobRegistry {
        JobRegistry::new(WorkspaceAllocator::new(tmp.path().join("jobs")))
    }

    fn result_for(record: &JobRecord, names: &[&str]) -> StageResult {
        StageResult {
            output_files: names
                .iter()
                .map(|n| record.paths.transformed.join(n))
                .collect(),
            stdout: "done\n".to_string(),
            stderr: String::new(),
        }
    }

    #[tokio::test]
    async fn test_create_job_registers_pending_record() {
        let tmp = TempDir::new().expect("tempdir");
        let registry = registry(&tmp);

        let record = registry.create_job(JobType::Full).await.expect("create");

        assert_eq!(record.status, JobStatus::Pending);
        assert_eq!(record.stages.len(), 2);
        assert!(record.paths.raw.is_dir());
        assert_eq!(registry.get_job(&record.id).map(|r| r.id), Some(record.id));
    }

    #[tokio::test]
    async fn test_list_jobs_ordered_by_creation() {
        let tmp = TempDir::new().expect("tempdir");
        let registry = registry(&tmp);

        let first = registry.create_job(JobType::Transform).await.expect("create");
        let second = registry.create_job(JobType::Score).await.expect("create");
        let third = registry.create_job(JobType::Full).await.expect("create");

        let ids: Vec<JobId> = registry.list_jobs().iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![first.id, second.id, third.id]);
    }

    #[tokio::test]
    async fn test_get_unknown_job() {
        let tmp = TempDir::new().expect("tempdir");
        let registry = registry(&tmp);
        assert!(registry.get_job(&JobId::new()).is_none());
        assert!(registry.snapshot(&JobId::new()).is_none());
    }

    #[tokio::test]
    async fn test_complete_stage_stores_relative_paths_and_completes_job() {
        let tmp = TempDir::new().expect("tempdir");
        let registry = registry(&tmp);
        let record = registry.create_job(JobType::Transform).await.expect("create");

        registry.mark_running(&record.id).expect("running");
        registry
            .set_stage_status(&record.id, StageKind::Transform, JobStatus::Running)
            .expect("stage running");
        let status = registry
            .complete_stage(
                &record.id,
                StageKind::Transform,
                &result_for(&record, &["a.txt", "b.txt"]),
            )
            .expect("complete");

        assert_eq!(status, JobStatus::Completed);
        let stored = registry.get_job(&record.id).expect("record");
        assert_eq!(stored.status, JobStatus::Completed);
        let stage = stored.stage(StageKind::Transform).expect("stage");
        assert_eq!(stage.stdout, "done\n");
        assert_eq!(
            stage.output_files,
            vec![
                std::path::PathBuf::from("transformed/a.txt"),
                std::path::PathBuf::from("transformed/b.txt")
            ]
        );
        assert!(stored.updated_at >= stored.created_at);
    }

    #[tokio::test]
    async fn test_complete_first_of_two_stages_keeps_job_running() {
        let tmp = TempDir::new().expect("tempdir");
        let registry = registry(&tmp);
        let record = registry.create_job(JobType::Full).await.expect("create");

        registry.mark_running(&record.id).expect("running");
        let status = registry
            .complete_stage(&record.id, StageKind::Transform, &result_for(&record, &["a.txt"]))
            .expect("complete");

        assert_eq!(status, JobStatus::Running);
        assert_eq!(
            registry.recompute_job_completion(&record.id).expect("recompute"),
            JobStatus::Running
        );
    }

    #[tokio::test]
    async fn test_fail_stage_keeps_output_and_appends_message() {
        let tmp = TempDir::new().expect("tempdir");
        let registry = registry(&tmp);
        let record = registry.create_job(JobType::Full).await.expect("create");
        registry.mark_running(&record.id).expect("running");

        let err = PipelineError::StageExecution {
            stage: StageKind::Transform,
            message: "OCR backend down".to_string(),
            output: CapturedOutput {
                stdout: "Processing a.txt\n".to_string(),
                stderr: "retrying".to_string(),
            },
        };
        registry
            .fail_stage(&record.id, StageKind::Transform, &StageFailure::from(&err))
            .expect("fail");

        let stored = registry.get_job(&record.id).expect("record");
        assert_eq!(stored.status, JobStatus::Failed);
        assert_eq!(
            stored.error.as_deref(),
            Some("transform stage failed: OCR backend down")
        );
        let stage = stored.stage(StageKind::Transform).expect("stage");
        assert_eq!(stage.status, JobStatus::Failed);
        assert_eq!(stage.stdout, "Processing a.txt\n");
        assert_eq!(
            stage.stderr,
            "retrying\ntransform stage failed: OCR backend down"
        );
        assert_eq!(
            stored.stage(StageKind::Score).map(|s| s.status),
            Some(JobStatus::Pending)
        );
    }

    #[tokio::test]
    async fn test_fail_stage_with_empty_stderr() {
        let tmp = TempDir::new().expect("tempdir");
        let registry = registry(&tmp);
        let record = registry.create_job(JobType::Score).await.expect("create");

        registry
            .fail_stage(&record.id, StageKind::Score, &StageFailure::new("Rubric file not found"))
            .expect("fail");

        let stored = registry.get_job(&record.id).expect("record");
        assert_eq!(
            stored.stage(StageKind::Score).map(|s| s.stderr.as_str()),
            Some("Rubric file not found")
        );
    }

    #[tokio::test]
    async fn test_failed_job_rejects_further_mutation() {
        let tmp = TempDir::new().expect("tempdir");
        let registry = registry(&tmp);
        let record = registry.create_job(JobType::Full).await.expect("create");
        registry
            .fail_stage(&record.id, StageKind::Transform, &StageFailure::new("boom"))
            .expect("fail");
        let before = registry.get_job(&record.id).expect("record");

        let err = registry
            .complete_stage(&record.id, StageKind::Score, &result_for(&record, &["x.txt"]))
            .expect_err("should reject");
        assert!(matches!(err, JobError::InvalidTransition { from: JobStatus::Failed, .. }));
        assert!(registry.mark_running(&record.id).is_err());

        let after = registry.get_job(&record.id).expect("record");
        assert_eq!(after.status, JobStatus::Failed);
        assert_eq!(after.stages, before.stages);
        assert_eq!(after.updated_at, before.updated_at);
    }

    #[tokio::test]
    async fn test_completed_job_rejects_further_mutation() {
        let tmp = TempDir::new().expect("tempdir");
        let registry = registry(&tmp);
        let record = registry.create_job(JobType::Transform).await.expect("create");
        registry.mark_running(&record.id).expect("running");
        registry
            .complete_stage(&record.id, StageKind::Transform, &result_for(&record, &["a.txt"]))
            .expect("complete");
        let before = registry.get_job(&record.id).expect("record");

        let err = registry
            .set_stage_status(&record.id, StageKind::Transform, JobStatus::Running)
            .expect_err("stage of a completed job");
        assert!(matches!(
            err,
            JobError::InvalidTransition {
                from: JobStatus::Completed,
                ..
            }
        ));
        let err = registry
            .fail_stage(&record.id, StageKind::Transform, &StageFailure::new("late fault"))
            .expect_err("completed job cannot fail");
        assert!(matches!(err, JobError::InvalidTransition { .. }));
        assert!(registry
            .complete_stage(&record.id, StageKind::Transform, &result_for(&record, &["b.txt"]))
            .is_err());
        assert_eq!(
            registry.recompute_job_completion(&record.id).expect("recompute"),
            JobStatus::Completed
        );

        let after = registry.get_job(&record.id).expect("record");
        assert_eq!(after.status, JobStatus::Completed);
        assert!(after.error.is_none());
        assert_eq!(after.stages, before.stages);
        assert_eq!(after.updated_at, before.updated_at);
    }

    #[tokio::test]
    async fn test_unknown_stage_is_rejected_without_mutation() {
        let tmp = TempDir::new().expect("tempdir");
        let registry = registry(&tmp);
        let record = registry.create_job(JobType::Transform).await.expect("create");

        let err = registry
            .set_stage_status(&record.id, StageKind::Score, JobStatus::Running)
            .expect_err("no score stage");
        assert!(matches!(err, JobError::InvalidTransition { .. }));
        assert_eq!(
            registry.get_job(&record.id).map(|r| r.status),
            Some(JobStatus::Pending)
        );
    }

    #[tokio::test]
    async fn test_mutating_unknown_job() {
        let tmp = TempDir::new().expect("tempdir");
        let registry = registry(&tmp);
        let err = registry.mark_running(&JobId::new()).expect_err("missing");
        assert!(matches!(err, JobError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_mark_running_twice_is_rejected() {
        let tmp = TempDir::new().expect("tempdir");
        let registry = registry(&tmp);
        let record = registry.create_job(JobType::Score).await.expect("create");

        registry.mark_running(&record.id).expect("running");
        let err = registry.mark_running(&record.id).expect_err("already running");
        assert!(matches!(
            err,
            JobError::InvalidTransition {
                from: JobStatus::Running,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_delete_job_guards() {
        let tmp = TempDir::new().expect("tempdir");
        let registry = registry(&tmp);

        let err = registry.delete_job(&JobId::new()).await.expect_err("missing");
        assert!(matches!(err, JobError::NotFound(_)));

        let record = registry.create_job(JobType::Transform).await.expect("create");
        registry.mark_running(&record.id).expect("running");
        let err = registry.delete_job(&record.id).await.expect_err("busy");
        assert!(matches!(err, JobError::JobBusy(_)));
        assert!(registry.get_job(&record.id).is_some());
        assert!(record.paths.root.exists());

        registry
            .complete_stage(&record.id, StageKind::Transform, &result_for(&record, &[]))
            .expect("complete");
        registry.delete_job(&record.id).await.expect("delete");
        assert!(registry.get_job(&record.id).is_none());
        assert!(!record.paths.root.exists());
    }

    #[tokio::test]
    async fn test_readers_never_observe_partial_completion() {
        let tmp = TempDir::new().expect("tempdir");
        let registry = Arc::new(registry(&tmp));
        let record = registry.create_job(JobType::Transform).await.expect("create");
        registry.mark_running(&record.id).expect("running");

        let reader = {
            let registry = Arc::clone(&registry);
            let job_id = record.id;
            std::thread::spawn(move || {
                for _ in 0..10_000 {
                    let seen = registry.get_job(&job_id).expect("record");
                    assert_eq!(
                        seen.all_stages_completed(),
                        seen.status == JobStatus::Completed
                    );
                    if seen.status == JobStatus::Completed {
                        break;
                    }
                }
            })
        };

        registry
            .complete_stage(&record.id, StageKind::Transform, &result_for(&record, &["a.txt"]))
            .expect("complete");
        reader.join().expect("reader thread");
    }
}
