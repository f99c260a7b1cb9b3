//! LLM-backed rubric scoring stage.
//!
//! Every document is evaluated by two graders at different temperatures,
//! run concurrently, and a moderator then reconciles both evaluations. The
//! report file holds all three evaluations; the moderator's score summary
//! feeds the batch table.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::fs;
use tracing::{debug, info, warn};

use super::rubric::Rubric;
use super::summary::{parse_score_summary, write_batch_summary, BatchEntry};
use super::transform::{display_name, list_documents, warn_ignored, DocumentSet};
use crate::error::{CapabilityError, LlmError};
use crate::llm::{GenerationRequest, LlmProvider, Message};
use crate::pipeline::{DiagnosticSink, ItemFailurePolicy, ScoreRequest, Scorer};
use crate::prompts::{build_grading_prompt, build_moderator_prompt};

const GRADER_A_TEMPERATURE: f64 = 0.4;
const GRADER_B_TEMPERATURE: f64 = 0.8;
const MODERATOR_TEMPERATURE: f64 = 0.7;

/// The three evaluations produced for one document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Evaluation {
    pub grader_a: String,
    pub grader_b: String,
    pub moderator: String,
}

impl Evaluation {
    /// Renders the report with one labelled section per evaluation.
    pub fn render(&self) -> String {
        format!(
            "--- Agent 1 Evaluation ---\n{}\n--- End of Agent 1 Evaluation ---\n\n\
             --- Agent 2 Evaluation ---\n{}\n--- End of Agent 2 Evaluation ---\n\n\
             --- Final Moderator Evaluation ---\n{}\n--- End of Final Moderator Evaluation ---\n",
            self.grader_a, self.grader_b, self.moderator
        )
    }
}

/// Grades documents against a rubric using an LLM.
pub struct RubricScorer {
    llm: Arc<dyn LlmProvider>,
    failure_policy: ItemFailurePolicy,
}

impl RubricScorer {
    pub fn new(llm: Arc<dyn LlmProvider>, failure_policy: ItemFailurePolicy) -> Self {
        Self {
            llm,
            failure_policy,
        }
    }

    /// Runs both graders concurrently, then the moderator.
    pub async fn evaluate(
        &self,
        api_key: &str,
        rubric: &Rubric,
        paper: &str,
    ) -> Result<Evaluation, CapabilityError> {
        let grading_prompt = build_grading_prompt(rubric, paper);

        let grader_a = spawn_completion(
            Arc::clone(&self.llm),
            api_key.to_string(),
            grading_prompt.clone(),
            GRADER_A_TEMPERATURE,
        );
        let grader_b = spawn_completion(
            Arc::clone(&self.llm),
            api_key.to_string(),
            grading_prompt,
            GRADER_B_TEMPERATURE,
        );

        // Await both before inspecting either so neither task is left detached.
        let (a, b) = (grader_a.await, grader_b.await);
        let grader_a = a.map_err(|e| LlmError::Join(e.to_string()))??;
        let grader_b = b.map_err(|e| LlmError::Join(e.to_string()))??;

        let moderator = complete(
            self.llm.as_ref(),
            api_key,
            build_moderator_prompt(rubric, paper, &grader_a, &grader_b),
            MODERATOR_TEMPERATURE,
        )
        .await?;

        Ok(Evaluation {
            grader_a,
            grader_b,
            moderator,
        })
    }

    async fn score_document(
        &self,
        request: &ScoreRequest<'_>,
        rubric: &Rubric,
        path: &Path,
        sink: &mut DiagnosticSink,
    ) -> Result<Evaluation, CapabilityError> {
        let paper = fs::read_to_string(path).await?;
        let evaluation = self.evaluate(request.api_key, rubric, &paper).await?;

        let output_path = request.output_dir.join(display_name(path));
        fs::write(&output_path, evaluation.render()).await?;
        sink.out(format!("  - Saved evaluation to {}", output_path.display()));
        Ok(evaluation)
    }
}

#[async_trait]
impl Scorer for RubricScorer {
    async fn score(
        &self,
        request: ScoreRequest<'_>,
        sink: &mut DiagnosticSink,
    ) -> Result<(), CapabilityError> {
        sink.out("--- Starting Grading Process ---");
        let rubric = Rubric::load(request.rubric_path).await?;
        let DocumentSet { documents, ignored } = list_documents(request.input_dir).await?;
        warn_ignored(&ignored, sink);
        info!(
            input = %request.input_dir.display(),
            documents = documents.len(),
            ignored = ignored.len(),
            "Grading documents"
        );

        let mut batch = Vec::new();
        for path in &documents {
            let file_name = display_name(path);
            sink.out(format!("Grading {}...", path.display()));

            match self.score_document(&request, &rubric, path, sink).await {
                Ok(evaluation) => {
                    let summary = parse_score_summary(&evaluation.moderator);
                    if summary.is_empty() {
                        sink.out("  - Warning: Could not extract score summary for batch table.");
                    } else {
                        debug!(document = %file_name, criteria = summary.criteria.len(), "Parsed score summary");
                        batch.push(BatchEntry {
                            filename: file_name,
                            summary,
                        });
                    }
                }
                Err(e) => match self.failure_policy {
                    ItemFailurePolicy::SkipItem => {
                        warn!(document = %file_name, error = %e, "Skipping document");
                        sink.err(format!("Error evaluating {}: {}", path.display(), e));
                    }
                    ItemFailurePolicy::FailStage => return Err(e),
                },
            }
        }

        if let Some(summary_path) = write_batch_summary(request.output_dir, &batch).await? {
            sink.out(format!(
                "Batch score summary saved to {}",
                summary_path.display()
            ));
        }

        sink.out("--- Grading Process Complete ---");
        Ok(())
    }
}

fn spawn_completion(
    llm: Arc<dyn LlmProvider>,
    api_key: String,
    prompt: String,
    temperature: f64,
) -> tokio::task::JoinHandle<Result<String, CapabilityError>> {
    tokio::spawn(async move { complete(llm.as_ref(), &api_key, prompt, temperature).await })
}

async fn complete(
    llm: &dyn LlmProvider,
    api_key: &str,
    prompt: String,
    temperature: f64,
) -> Result<String, CapabilityError> {
    let request = GenerationRequest::with_default_model(vec![Message::user(prompt)])
        .with_temperature(temperature);
    let response = llm.generate(api_key, request).await?;
    response
        .first_content()
        .map(str::to_string)
        .ok_or_else(|| CapabilityError::Other("model returned no evaluation".to_string()))
}
