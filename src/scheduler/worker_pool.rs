//! Fixed-size worker pool that runs submitted jobs.
//!
//! Submissions go onto one in-process FIFO queue shared by every worker.
//! Each worker runs a job's stages strictly in order, recording progress in
//! the [`JobRegistry`] as it goes.
//!
//! # Features
//!
//! - Configurable number of workers (default 2)
//! - Non-blocking submission
//! - Stage panics are contained and recorded as stage failures
//! - Graceful shutdown that drains queued work within a timeout
//! - Queue and outcome counters

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::job::{JobId, JobStatus, JobType, StageKind};
use super::registry::{JobRegistry, StageFailure};
use crate::error::{JobError, PipelineError};
use crate::pipeline::{Pipeline, StageOptions, StageResult};
use crate::workspace::JobPaths;

/// Configuration for the scheduler's worker pool.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Number of worker tasks to spawn.
    pub num_workers: usize,
    /// Timeout for graceful shutdown.
    pub shutdown_timeout: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            num_workers: 2,
            shutdown_timeout: Duration::from_secs(60),
        }
    }
}

impl SchedulerConfig {
    /// Creates a new configuration with the specified number of workers.
    pub fn new(num_workers: usize) -> Self {
        Self {
            num_workers,
            ..Default::default()
        }
    }

    /// Sets the shutdown timeout.
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }
}

/// A request to run a registered job.
#[derive(Debug, Clone)]
pub struct Submission {
    pub job_id: JobId,
    /// Rubric file for jobs with a score stage.
    pub rubric: Option<PathBuf>,
    pub options: StageOptions,
}

impl Submission {
    pub fn new(job_id: JobId) -> Self {
        Self {
            job_id,
            rubric: None,
            options: StageOptions::default(),
        }
    }

    pub fn with_rubric(mut self, rubric: impl Into<PathBuf>) -> Self {
        self.rubric = Some(rubric.into());
        self
    }

    pub fn with_options(mut self, options: StageOptions) -> Self {
        self.options = options;
        self
    }
}

/// Point-in-time counters of the scheduler.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    pub num_workers: usize,
    /// Submissions accepted but not yet picked up by a worker.
    pub queued: u64,
    /// Jobs whose stages are executing right now. Never exceeds `num_workers`.
    pub running: u64,
    /// Jobs that ended `completed`.
    pub completed: u64,
    /// Jobs that ended `failed`.
    pub failed: u64,
}

/// Counters shared by the scheduler handle and its workers.
#[derive(Default)]
struct JobCounters {
    queued: AtomicU64,
    running: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
}

impl JobCounters {
    fn enqueued(&self) {
        self.queued.fetch_add(1, Ordering::SeqCst);
    }

    /// A submission left the queue, whether or not it will run.
    fn dequeued(&self) {
        self.queued.fetch_sub(1, Ordering::SeqCst);
    }

    fn started(&self) {
        self.running.fetch_add(1, Ordering::SeqCst);
    }

    fn finished(&self, status: JobStatus) {
        self.running.fetch_sub(1, Ordering::SeqCst);
        if status == JobStatus::Completed {
            self.completed.fetch_add(1, Ordering::SeqCst);
        } else {
            self.failed.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn snapshot(&self, num_workers: usize) -> PoolStats {
        PoolStats {
            num_workers,
            queued: self.queued.load(Ordering::SeqCst),
            running: self.running.load(Ordering::SeqCst),
            completed: self.completed.load(Ordering::SeqCst),
            failed: self.failed.load(Ordering::SeqCst),
        }
    }
}

type SharedReceiver = Arc<tokio::sync::Mutex<mpsc::UnboundedReceiver<Submission>>>;

/// Runs submitted jobs on a fixed pool of workers.
pub struct Scheduler {
    config: SchedulerConfig,
    registry: Arc<JobRegistry>,
    sender: Mutex<Option<mpsc::UnboundedSender<Submission>>>,
    worker_handles: Mutex<Vec<JoinHandle<()>>>,
    counters: Arc<JobCounters>,
}

impl Scheduler {
    /// Spawns the workers and returns a scheduler ready for submissions.
    ///
    /// Must be called from within a tokio runtime. A `num_workers` of zero is
    /// treated as one.
    pub fn start(
        config: SchedulerConfig,
        registry: Arc<JobRegistry>,
        pipeline: Arc<Pipeline>,
    ) -> Self {
        let num_workers = config.num_workers.max(1);
        let (sender, receiver) = mpsc::unbounded_channel();
        let receiver: SharedReceiver = Arc::new(tokio::sync::Mutex::new(receiver));
        let counters = Arc::new(JobCounters::default());

        let worker_handles = (0..num_workers)
            .map(|i| {
                let worker = Worker {
                    id: format!("worker-{}", i),
                    receiver: Arc::clone(&receiver),
                    registry: Arc::clone(&registry),
                    pipeline: Arc::clone(&pipeline),
                    counters: Arc::clone(&counters),
                };
                tokio::spawn(worker.run())
            })
            .collect();

        info!(num_workers = num_workers, "Scheduler started");

        Self {
            config: SchedulerConfig {
                num_workers,
                ..config
            },
            registry,
            sender: Mutex::new(Some(sender)),
            worker_handles: Mutex::new(worker_handles),
            counters,
        }
    }

    /// Queues a pending job for execution. Returns immediately.
    ///
    /// # Errors
    ///
    /// - `JobError::NotFound` if the job is not registered
    /// - `JobError::InvalidTransition` if the job is not `pending`
    /// - `JobError::SchedulerClosed` after [`Scheduler::shutdown`]
    pub fn submit(&self, submission: Submission) -> Result<(), JobError> {
        let job_id = submission.job_id;
        let record = self
            .registry
            .get_job(&job_id)
            .ok_or(JobError::NotFound(job_id))?;
        if record.status != JobStatus::Pending {
            return Err(JobError::InvalidTransition {
                job_id,
                from: record.status,
                reason: "only pending jobs can be submitted".to_string(),
            });
        }

        let sender = self.sender.lock().expect("sender lock poisoned");
        let sender = sender.as_ref().ok_or(JobError::SchedulerClosed)?;
        self.counters.enqueued();
        if sender.send(submission).is_err() {
            self.counters.dequeued();
            return Err(JobError::SchedulerClosed);
        }

        debug!(job_id = %job_id, job_type = %record.job_type, "Job queued");
        Ok(())
    }

    /// Stops accepting submissions and waits for workers to drain the queue.
    ///
    /// Jobs already queued still run. Calling this twice is harmless.
    ///
    /// # Errors
    ///
    /// Returns `JobError::ShutdownTimeout` if workers don't finish within
    /// the configured timeout. Unfinished workers keep running detached.
    pub async fn shutdown(&self) -> Result<(), JobError> {
        info!("Initiating scheduler shutdown");

        // Dropping the sender closes the queue once it is drained.
        self.sender.lock().expect("sender lock poisoned").take();
        let handles: Vec<JoinHandle<()>> = self
            .worker_handles
            .lock()
            .expect("worker handles lock poisoned")
            .drain(..)
            .collect();

        let drain = async {
            for handle in handles {
                if let Err(e) = handle.await {
                    error!(error = %e, "Worker task panicked during shutdown");
                }
            }
        };

        match tokio::time::timeout(self.config.shutdown_timeout, drain).await {
            Ok(()) => {
                info!("Scheduler shutdown complete");
                Ok(())
            }
            Err(_) => Err(JobError::ShutdownTimeout(self.config.shutdown_timeout)),
        }
    }

    /// Returns the current queue and job counters.
    pub fn stats(&self) -> PoolStats {
        self.counters.snapshot(self.config.num_workers)
    }
}

/// A single worker pulling submissions from the shared queue.
struct Worker {
    id: String,
    receiver: SharedReceiver,
    registry: Arc<JobRegistry>,
    pipeline: Arc<Pipeline>,
    counters: Arc<JobCounters>,
}

impl Worker {
    /// Processes submissions until the queue is closed and empty.
    async fn run(self) {
        info!(worker_id = %self.id, "Worker started");

        loop {
            let next = self.receiver.lock().await.recv().await;
            match next {
                Some(submission) => self.process_job(submission).await,
                None => break,
            }
        }

        info!(worker_id = %self.id, "Worker stopped");
    }

    async fn process_job(&self, submission: Submission) {
        let job_id = submission.job_id;
        self.counters.dequeued();

        let Some(record) = self.registry.get_job(&job_id) else {
            warn!(worker_id = %self.id, job_id = %job_id, "Submitted job no longer exists");
            return;
        };
        if let Err(e) = self.registry.mark_running(&job_id) {
            warn!(worker_id = %self.id, job_id = %job_id, error = %e, "Skipping job");
            return;
        }

        info!(
            worker_id = %self.id,
            job_id = %job_id,
            job_type = %record.job_type,
            "Processing job"
        );

        let start_time = Instant::now();
        self.counters.started();
        let status = self.run_stages(&record.paths, record.job_type, &submission).await;
        let duration = start_time.elapsed();
        self.counters.finished(status);

        if status == JobStatus::Completed {
            info!(
                worker_id = %self.id,
                job_id = %job_id,
                duration_ms = duration.as_millis(),
                "Job completed successfully"
            );
        } else {
            warn!(
                worker_id = %self.id,
                job_id = %job_id,
                status = %status,
                "Job did not complete"
            );
        }
    }

    /// Runs every stage of the job in order and returns the job's final status.
    async fn run_stages(
        &self,
        paths: &JobPaths,
        job_type: JobType,
        submission: &Submission,
    ) -> JobStatus {
        let job_id = submission.job_id;

        for &stage in job_type.stages() {
            if let Err(e) = self
                .registry
                .set_stage_status(&job_id, stage, JobStatus::Running)
            {
                error!(worker_id = %self.id, job_id = %job_id, stage = %stage, error = %e, "Failed to start stage");
                return JobStatus::Failed;
            }

            debug!(worker_id = %self.id, job_id = %job_id, stage = %stage, "Running stage");
            match self.run_stage(stage, paths, submission).await {
                Ok(result) => {
                    if let Err(e) = self.registry.complete_stage(&job_id, stage, &result) {
                        error!(worker_id = %self.id, job_id = %job_id, stage = %stage, error = %e, "Failed to record stage result");
                        return JobStatus::Failed;
                    }
                }
                Err(failure) => {
                    if let Err(e) = self.registry.fail_stage(&job_id, stage, &failure) {
                        error!(worker_id = %self.id, job_id = %job_id, stage = %stage, error = %e, "Failed to record stage failure");
                    }
                    return JobStatus::Failed;
                }
            }
        }

        match self.registry.recompute_job_completion(&job_id) {
            Ok(status) => status,
            Err(e) => {
                error!(worker_id = %self.id, job_id = %job_id, error = %e, "Failed to finalize job");
                JobStatus::Failed
            }
        }
    }

    /// Runs one stage in its own task so a panic fails the stage, not the worker.
    async fn run_stage(
        &self,
        stage: StageKind,
        paths: &JobPaths,
        submission: &Submission,
    ) -> Result<StageResult, StageFailure> {
        let pipeline = Arc::clone(&self.pipeline);
        let paths = paths.clone();
        let rubric = submission.rubric.clone();
        let options = submission.options.clone();

        let handle = tokio::spawn(async move {
            match stage {
                StageKind::Transform => {
                    pipeline
                        .run_transform(&paths.raw, Some(&paths.transformed), &options)
                        .await
                }
                StageKind::Score => match rubric {
                    Some(rubric) => {
                        pipeline
                            .run_score(&paths.transformed, Some(&paths.scored), &rubric)
                            .await
                    }
                    None => Err(PipelineError::NotFound(
                        "Rubric file not found: no rubric was provided".to_string(),
                    )),
                },
            }
        });

        match handle.await {
            Ok(Ok(result)) => Ok(result),
            Ok(Err(e)) => Err(StageFailure::from(&e)),
            Err(join_error) => Err(StageFailure::new(format!(
                "{} stage panicked: {}",
                stage, join_error
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scheduler_config_default() {
        let config = SchedulerConfig::default();
        assert_eq!(config.num_workers, 2);
        assert_eq!(config.shutdown_timeout, Duration::from_secs(60));
    }

    #[test]
    fn test_scheduler_config_builder() {
        let config = SchedulerConfig::new(5).with_shutdown_timeout(Duration::from_secs(3));
        assert_eq!(config.num_workers, 5);
        assert_eq!(config.shutdown_timeout, Duration::from_secs(3));
    }

    #[test]
    fn test_submission_builder() {
        let job_id = JobId::new();
        let submission = Submission::new(job_id)
            .with_rubric("/tmp/rubric.json")
            .with_options(StageOptions::new().with_name_from_header(true));

        assert_eq!(submission.job_id, job_id);
        assert_eq!(submission.rubric, Some(PathBuf::from("/tmp/rubric.json")));
        assert!(submission.options.name_from_header);
    }

    #[test]
    fn test_job_counters_follow_a_job_through_the_pool() {
        let counters = JobCounters::default();

        counters.enqueued();
        counters.enqueued();
        counters.enqueued();
        assert_eq!(counters.snapshot(2).queued, 3);

        counters.dequeued();
        counters.started();
        counters.dequeued();
        counters.started();
        let stats = counters.snapshot(2);
        assert_eq!((stats.queued, stats.running), (1, 2));

        counters.finished(JobStatus::Completed);
        counters.finished(JobStatus::Failed);
        counters.dequeued();
        assert_eq!(
            counters.snapshot(2),
            PoolStats {
                num_workers: 2,
                queued: 0,
                running: 0,
                completed: 1,
                failed: 1,
            }
        );
    }
}
