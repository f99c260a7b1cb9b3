//! LLM-backed text correction stage.
//!
//! Reads each `.txt`/`.md` document in the input directory, asks the model
//! to repair OCR mistakes and writes the corrected text to the output
//! directory.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use regex::Regex;
use tokio::fs;
use tracing::{debug, info};

use crate::error::CapabilityError;
use crate::llm::{GenerationRequest, LlmProvider, Message};
use crate::pipeline::{DiagnosticSink, ItemFailurePolicy, TransformRequest, Transformer};
use crate::prompts::build_correction_prompt;

const CORRECTION_TEMPERATURE: f64 = 0.7;

/// Corrects OCR output using an LLM.
pub struct TextCorrector {
    llm: Arc<dyn LlmProvider>,
    failure_policy: ItemFailurePolicy,
}

impl TextCorrector {
    pub fn new(llm: Arc<dyn LlmProvider>, failure_policy: ItemFailurePolicy) -> Self {
        Self {
            llm,
            failure_policy,
        }
    }

    async fn correct(&self, api_key: &str, text: &str) -> Result<String, CapabilityError> {
        let request = GenerationRequest::with_default_model(vec![Message::user(
            build_correction_prompt(text),
        )])
        .with_temperature(CORRECTION_TEMPERATURE);

        let response = self.llm.generate(api_key, request).await?;
        response
            .first_content()
            .map(str::to_string)
            .ok_or_else(|| CapabilityError::Other("model returned no correction".to_string()))
    }

    /// Corrects one document and returns the path it was written to.
    ///
    /// `written` holds the output stems already used in this run; a clash
    /// gets a numeric suffix instead of overwriting the earlier output.
    async fn process_document(
        &self,
        request: &TransformRequest<'_>,
        path: &Path,
        written: &mut HashSet<String>,
        sink: &mut DiagnosticSink,
    ) -> Result<Option<PathBuf>, CapabilityError> {
        let file_name = display_name(path);
        let raw_text = fs::read_to_string(path).await?;
        if raw_text.trim().is_empty() {
            sink.out(format!("  - Warning: No text found in {}. Skipping.", file_name));
            return Ok(None);
        }

        sink.out("  - Correcting OCR mistakes with AI...");
        let corrected = self.correct(request.api_key, &raw_text).await?;

        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("document");
        let output_name = if request.options.name_from_header {
            student_name(&corrected).unwrap_or_else(|| stem.to_string())
        } else {
            stem.to_string()
        };

        let unique = unique_stem(&output_name, written);
        if unique != output_name {
            sink.out(format!(
                "  - Warning: {}.txt was already written in this run. Saving as {}.txt instead.",
                output_name, unique
            ));
        }

        let output_path = request.output_dir.join(format!("{}.txt", unique));
        fs::write(&output_path, &corrected).await?;
        written.insert(unique);
        sink.out(format!(
            "  - Successfully saved corrected essay to {}",
            output_path.display()
        ));
        Ok(Some(output_path))
    }
}

#[async_trait]
impl Transformer for TextCorrector {
    async fn transform(
        &self,
        request: TransformRequest<'_>,
        sink: &mut DiagnosticSink,
    ) -> Result<(), CapabilityError> {
        sink.out("--- Starting OCR and Text Correction Process ---");

        let DocumentSet { documents, ignored } = list_documents(request.input_dir).await?;
        warn_ignored(&ignored, sink);
        info!(
            input = %request.input_dir.display(),
            documents = documents.len(),
            ignored = ignored.len(),
            "Correcting documents"
        );

        let mut written = HashSet::new();
        for path in &documents {
            sink.out(format!("Processing: {}", path.display()));
            match self.process_document(&request, path, &mut written, sink).await {
                Ok(written) => {
                    debug!(document = %path.display(), written = ?written, "Document corrected");
                }
                Err(e) => match self.failure_policy {
                    ItemFailurePolicy::SkipItem => {
                        sink.err(format!(
                            "An error occurred while processing {}: {}",
                            display_name(path),
                            e
                        ));
                    }
                    ItemFailurePolicy::FailStage => return Err(e),
                },
            }
        }

        sink.out("--- OCR and Text Correction Process Complete ---");
        Ok(())
    }
}

/// Regular files directly inside an input directory, split by whether a
/// stage can read them.
#[derive(Debug, Default)]
pub(crate) struct DocumentSet {
    /// `.txt`/`.md` files, sorted by name.
    pub documents: Vec<PathBuf>,
    /// Every other regular file, sorted by name.
    pub ignored: Vec<PathBuf>,
}

pub(crate) async fn list_documents(dir: &Path) -> Result<DocumentSet, CapabilityError> {
    let mut set = DocumentSet::default();
    let mut entries = fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        if !entry.file_type().await?.is_file() {
            continue;
        }
        let path = entry.path();
        let is_text = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.eq_ignore_ascii_case("txt") || e.eq_ignore_ascii_case("md"))
            .unwrap_or(false);
        if is_text {
            set.documents.push(path);
        } else {
            set.ignored.push(path);
        }
    }
    set.documents.sort();
    set.ignored.sort();
    Ok(set)
}

/// One warning line per file the stage will not read.
pub(crate) fn warn_ignored(ignored: &[PathBuf], sink: &mut DiagnosticSink) {
    for path in ignored {
        sink.out(format!(
            "Warning: Skipping {}. Only .txt and .md documents are processed.",
            display_name(path)
        ));
    }
}

/// `base`, or `base_2`, `base_3`... if `base` is already taken.
fn unique_stem(base: &str, taken: &HashSet<String>) -> String {
    if !taken.contains(base) {
        return base.to_string();
    }
    (2..)
        .map(|n| format!("{}_{}", base, n))
        .find(|candidate| !taken.contains(candidate))
        .unwrap_or_else(|| base.to_string())
}

pub(crate) fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Student name from a `Name:` header line, lower-cased with spaces as
/// underscores. `None` when there is no such line or it is blank.
fn student_name(text: &str) -> Option<String> {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    let pattern = PATTERN.get_or_init(|| {
        Regex::new(r"(?im)^name:[ \t]*(.*)$").expect("name pattern is valid")
    });

    let name = pattern.captures(text)?.get(1)?.as_str().trim();
    let name = Path::new(name).file_name()?.to_str()?;
    if name.is_empty() {
        return None;
    }
    Some(name.to_lowercase().replace(' ', "_"))
}
