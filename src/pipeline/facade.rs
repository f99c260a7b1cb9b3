//! Pipeline facade composing workspaces and stage runs.
//!
//! The `Pipeline` is what the scheduler calls for each stage of a job, and
//! what the CLI calls directly for job-less runs. It checks preconditions,
//! resolves output directories and delegates to the [`StageRunner`].

use std::path::Path;
use std::sync::Arc;

use tokio::fs;
use tracing::{info, warn};

use super::capability::{ScoreRequest, Scorer, StageOptions, TransformRequest, Transformer};
use super::config::PipelineConfig;
use super::runner::{StageResult, StageRunner};
use crate::error::{LlmError, PipelineError, WorkspaceError};
use crate::llm::ChatClient;
use crate::scheduler::job::JobId;
use crate::stages::{RubricScorer, TextCorrector};
use crate::workspace::{JobPaths, WorkspaceAllocator};

/// Outcome of a transform-then-score run.
#[derive(Debug)]
pub struct PipelineRun {
    /// Workspace the run wrote into.
    pub paths: JobPaths,
    pub transform: Result<StageResult, PipelineError>,
    /// `None` when the transform stage failed and scoring was never attempted.
    pub score: Option<Result<StageResult, PipelineError>>,
}

impl PipelineRun {
    /// Whether both stages ran and succeeded.
    pub fn is_success(&self) -> bool {
        self.transform.is_ok() && matches!(self.score, Some(Ok(_)))
    }
}

/// Composes the workspace allocator and the stage capabilities.
pub struct Pipeline {
    config: PipelineConfig,
    allocator: WorkspaceAllocator,
    transformer: Arc<dyn Transformer>,
    scorer: Arc<dyn Scorer>,
    runner: StageRunner,
}

impl Pipeline {
    /// Creates a pipeline with explicit capabilities.
    pub fn new(
        config: PipelineConfig,
        transformer: Arc<dyn Transformer>,
        scorer: Arc<dyn Scorer>,
    ) -> Self {
        let allocator = WorkspaceAllocator::new(config.jobs_root.clone());
        Self {
            config,
            allocator,
            transformer,
            scorer,
            runner: StageRunner::new(),
        }
    }

    /// Creates a pipeline backed by the LLM text corrector and rubric scorer.
    ///
    /// # Errors
    ///
    /// Returns `LlmError::RequestFailed` if the HTTP client cannot be built.
    pub fn from_config(config: PipelineConfig) -> Result<Self, LlmError> {
        let client = Arc::new(ChatClient::new(
            config.api_base.clone(),
            config.model.clone(),
            config.request_timeout,
        )?);
        let transformer = Arc::new(TextCorrector::new(
            client.clone(),
            config.item_failure_policy,
        ));
        let scorer = Arc::new(RubricScorer::new(client, config.item_failure_policy));
        Ok(Self::new(config, transformer, scorer))
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn allocator(&self) -> &WorkspaceAllocator {
        &self.allocator
    }

    /// Creates (or re-opens) a job workspace.
    pub async fn create_workspace(&self, job_id: Option<JobId>) -> Result<JobPaths, WorkspaceError> {
        self.allocator.create_workspace(job_id).await
    }

    /// Runs the transform stage over `input_dir`.
    ///
    /// Writes into `output_dir`, or into the configured transformed directory
    /// when none is given.
    ///
    /// # Errors
    ///
    /// - `PipelineError::NotFound` if `input_dir` is not a directory
    /// - `PipelineError::Configuration` if no API key is configured
    /// - `PipelineError::StageExecution` if the capability faults
    pub async fn run_transform(
        &self,
        input_dir: &Path,
        output_dir: Option<&Path>,
        options: &StageOptions,
    ) -> Result<StageResult, PipelineError> {
        require_dir(input_dir).await?;
        let api_key = self
            .config
            .require_api_key()
            .map_err(PipelineError::Configuration)?;
        let output_dir = output_dir.unwrap_or(&self.config.transformed_dir);

        info!(
            input = %input_dir.display(),
            output = %output_dir.display(),
            "Running transform stage"
        );
        self.runner
            .run_transform(
                self.transformer.as_ref(),
                TransformRequest {
                    input_dir,
                    output_dir,
                    options,
                    api_key,
                },
            )
            .await
    }

    /// Runs the score stage over `input_dir` with the rubric at `rubric_path`.
    ///
    /// Writes into `output_dir`, or into the configured scored directory when
    /// none is given.
    ///
    /// # Errors
    ///
    /// - `PipelineError::NotFound` if `input_dir` or the rubric is missing
    /// - `PipelineError::Configuration` if no API key is configured
    /// - `PipelineError::StageExecution` if the capability faults
    pub async fn run_score(
        &self,
        input_dir: &Path,
        output_dir: Option<&Path>,
        rubric_path: &Path,
    ) -> Result<StageResult, PipelineError> {
        require_dir(input_dir).await?;
        if fs::metadata(rubric_path).await.is_err() {
            return Err(PipelineError::NotFound(format!(
                "Rubric file not found: {}",
                rubric_path.display()
            )));
        }
        let api_key = self
            .config
            .require_api_key()
            .map_err(PipelineError::Configuration)?;
        let output_dir = output_dir.unwrap_or(&self.config.scored_dir);

        info!(
            input = %input_dir.display(),
            output = %output_dir.display(),
            rubric = %rubric_path.display(),
            "Running score stage"
        );
        self.runner
            .run_score(
                self.scorer.as_ref(),
                ScoreRequest {
                    input_dir,
                    output_dir,
                    rubric_path,
                    api_key,
                },
            )
            .await
    }

    /// Transforms `input_dir` into a fresh workspace, then scores the result.
    ///
    /// Scoring only runs when the transform succeeded.
    ///
    /// # Errors
    ///
    /// Returns `PipelineError::Workspace` if the workspace cannot be
    /// allocated. Stage errors are reported inside the returned `PipelineRun`.
    pub async fn run_full(
        &self,
        input_dir: &Path,
        rubric_path: &Path,
        options: &StageOptions,
    ) -> Result<PipelineRun, PipelineError> {
        let paths = self.create_workspace(None).await?;

        let transform = self
            .run_transform(input_dir, Some(&paths.transformed), options)
            .await;
        let score = match &transform {
            Ok(_) => Some(
                self.run_score(&paths.transformed, Some(&paths.scored), rubric_path)
                    .await,
            ),
            Err(e) => {
                warn!(error = %e, "Transform failed; skipping score stage");
                None
            }
        };

        Ok(PipelineRun {
            paths,
            transform,
            score,
        })
    }
}

async fn require_dir(dir: &Path) -> Result<(), PipelineError> {
    let is_dir = fs::metadata(dir).await.map(|m| m.is_dir()).unwrap_or(false);
    if is_dir {
        Ok(())
    } else {
        Err(PipelineError::NotFound(format!(
            "Input folder not found: {}",
            dir.display()
        )))
    }
}
