//! Stage execution for document processing.
//!
//! This module turns a directory of documents into transformed documents and
//! score reports.
//!
//! # Architecture
//!
//! - **Capability**: the `Transformer` / `Scorer` contracts the stages fulfil
//! - **Runner**: invokes one capability and works out which files it created
//! - **Facade**: `Pipeline`, which checks preconditions and composes stages
//! - **Config**: `PipelineConfig`, loaded from the environment
//!
//! # Example
//!
//! ```rust,ignore
//! use gradeforge::pipeline::{Pipeline, PipelineConfig, StageOptions};
//! use std::path::Path;
//!
//! let pipeline = Pipeline::from_config(PipelineConfig::from_env()?)?;
//! let run = pipeline
//!     .run_full(Path::new("./scans"), Path::new("./rubric.json"), &StageOptions::default())
//!     .await?;
//!
//! if let Some(Ok(scored)) = &run.score {
//!     println!("{} reports written", scored.output_files.len());
//! }
//! ```
//!
//! # Configuration
//!
//! See [`PipelineConfig::from_env`] for the recognised environment variables.

pub mod capability;
pub mod config;
pub mod facade;
pub mod runner;

pub use capability::{ScoreRequest, Scorer, StageOptions, TransformRequest, Transformer};
pub use config::{ConfigError, ItemFailurePolicy, PipelineConfig};
pub use facade::{Pipeline, PipelineRun};
pub use runner::{CapturedOutput, DiagnosticSink, StageResult, StageRunner};
