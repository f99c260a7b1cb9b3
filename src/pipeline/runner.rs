//! Stage runner for invoking one capability and collecting its outputs.
//!
//! This module provides the `StageRunner`, which wraps a single transform or
//! score invocation: it prepares the output directory, records which files
//! were already there, hands the capability a private `DiagnosticSink`, and
//! reports the newly created files together with the captured text.

use std::collections::BTreeSet;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::debug;

use super::capability::{ScoreRequest, Scorer, TransformRequest, Transformer};
use crate::error::{CapabilityError, PipelineError};
use crate::scheduler::job::StageKind;

/// Text a capability emitted during one invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapturedOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Per-invocation buffer that replaces the process-wide output streams.
///
/// Each stage invocation owns its sink, so concurrent stages never
/// interleave their diagnostic text.
#[derive(Debug, Default)]
pub struct DiagnosticSink {
    output: CapturedOutput,
}

impl DiagnosticSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a line to the captured stdout.
    pub fn out(&mut self, line: impl AsRef<str>) {
        self.output.stdout.push_str(line.as_ref());
        self.output.stdout.push('\n');
    }

    /// Appends a line to the captured stderr.
    pub fn err(&mut self, line: impl AsRef<str>) {
        self.output.stderr.push_str(line.as_ref());
        self.output.stderr.push('\n');
    }

    pub fn stdout(&self) -> &str {
        &self.output.stdout
    }

    pub fn stderr(&self) -> &str {
        &self.output.stderr
    }

    pub fn into_output(self) -> CapturedOutput {
        self.output
    }
}

/// Outcome of a successful stage invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StageResult {
    /// Absolute paths of the files the stage created, sorted by file name.
    pub output_files: Vec<PathBuf>,
    pub stdout: String,
    pub stderr: String,
}

/// Runs a single stage capability against a directory of documents.
#[derive(Debug, Clone, Copy, Default)]
pub struct StageRunner;

impl StageRunner {
    pub fn new() -> Self {
        Self
    }

    /// Runs the transform capability and reports the files it created.
    ///
    /// # Errors
    ///
    /// Returns `PipelineError::Io` if the output directory cannot be
    /// prepared or listed, and `PipelineError::StageExecution` if the
    /// capability faults.
    pub async fn run_transform(
        &self,
        transformer: &dyn Transformer,
        request: TransformRequest<'_>,
    ) -> Result<StageResult, PipelineError> {
        let before = prepare_output_dir(request.output_dir).await?;
        let mut sink = DiagnosticSink::new();
        let outcome = transformer.transform(request, &mut sink).await;
        finish(StageKind::Transform, request.output_dir, before, sink, outcome).await
    }

    /// Runs the score capability and reports the files it created.
    ///
    /// # Errors
    ///
    /// Same as [`StageRunner::run_transform`].
    pub async fn run_score(
        &self,
        scorer: &dyn Scorer,
        request: ScoreRequest<'_>,
    ) -> Result<StageResult, PipelineError> {
        let before = prepare_output_dir(request.output_dir).await?;
        let mut sink = DiagnosticSink::new();
        let outcome = scorer.score(request, &mut sink).await;
        finish(StageKind::Score, request.output_dir, before, sink, outcome).await
    }
}

async fn prepare_output_dir(dir: &Path) -> Result<BTreeSet<OsString>, PipelineError> {
    fs::create_dir_all(dir).await?;
    list_file_names(dir).await
}

async fn finish(
    stage: StageKind,
    output_dir: &Path,
    before: BTreeSet<OsString>,
    sink: DiagnosticSink,
    outcome: Result<(), CapabilityError>,
) -> Result<StageResult, PipelineError> {
    let output = sink.into_output();
    if let Err(e) = outcome {
        return Err(PipelineError::StageExecution {
            stage,
            message: e.to_string(),
            output,
        });
    }

    let after = list_file_names(output_dir).await?;
    let output_files: Vec<PathBuf> = after
        .difference(&before)
        .map(|name| output_dir.join(name))
        .collect();

    debug!(
        stage = %stage,
        new_files = output_files.len(),
        "Stage produced output files"
    );

    Ok(StageResult {
        output_files,
        stdout: output.stdout,
        stderr: output.stderr,
    })
}

/// Names of the regular files directly inside `dir`, in sorted order.
async fn list_file_names(dir: &Path) -> Result<BTreeSet<OsString>, PipelineError> {
    let mut names = BTreeSet::new();
    let mut entries = fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        if entry.file_type().await?.is_file() {
            names.insert(entry.file_name());
        }
    }
    Ok(names)
}
