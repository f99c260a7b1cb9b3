//! gradeforge: job orchestration for essay OCR correction and rubric grading.
//!
//! Documents are uploaded into per-job workspaces, run through a transform
//! stage and/or a score stage on a fixed worker pool, and the live status of
//! every job is available as a serializable snapshot.

pub mod cli;
pub mod error;
pub mod llm;
pub mod pipeline;
pub mod prompts;
pub mod scheduler;
pub mod stages;
pub mod workspace;

// Re-export commonly used error types
pub use error::{CapabilityError, JobError, LlmError, PipelineError, WorkspaceError};
