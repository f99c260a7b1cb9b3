//! Job registry and worker pool.
//!
//! This module provides the in-process job system:
//!
//! - **JobRegistry**: owns every job record behind one lock
//! - **Scheduler**: fixed pool of workers fed by a FIFO queue
//! - **JobSnapshot**: serializable view of a job for clients
//!
//! # Architecture
//!
//! ```text
//!                      ┌──────────────┐
//!                      │   Producer   │
//!                      │  (API/CLI)   │
//!                      └──────┬───────┘
//!                             │ submit
//!                      ┌──────▼───────┐
//!                      │  FIFO queue  │
//!                      └──────┬───────┘
//!                             │
//!         ┌───────────────────┼───────────────────┐
//!         ▼                   ▼                   ▼
//!    ┌─────────┐         ┌─────────┐         ┌─────────┐
//!    │ Worker 1│         │ Worker 2│         │ Worker N│
//!    └────┬────┘         └────┬────┘         └────┬────┘
//!         └──────────► JobRegistry ◄──────────────┘
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use gradeforge::pipeline::{Pipeline, PipelineConfig};
//! use gradeforge::scheduler::{JobRegistry, JobType, Scheduler, SchedulerConfig, Submission};
//! use std::sync::Arc;
//!
//! let config = PipelineConfig::from_env()?;
//! let pipeline = Arc::new(Pipeline::from_config(config)?);
//! let registry = Arc::new(JobRegistry::new(pipeline.allocator().clone()));
//! let scheduler = Scheduler::start(SchedulerConfig::default(), registry.clone(), pipeline);
//!
//! let job = registry.create_job(JobType::Transform).await?;
//! scheduler.submit(Submission::new(job.id))?;
//!
//! scheduler.shutdown().await?;
//! ```

pub mod job;
pub mod registry;
pub mod snapshot;
pub mod worker_pool;

pub use job::{JobId, JobRecord, JobStatus, JobType, StageKind, StageSnapshot};
pub use registry::{JobRegistry, StageFailure};
pub use snapshot::{JobSnapshot, PathsSnapshot, StageView};
pub use worker_pool::{PoolStats, Scheduler, SchedulerConfig, Submission};
