//! Contracts for the external stage capabilities.
//!
//! The pipeline never knows how documents are transformed or scored. It
//! hands a capability an input directory, an output directory and a
//! [`DiagnosticSink`] for its progress text, and looks at which files appeared
//! afterwards. Implementations live in [`crate::stages`]; tests use fakes.

use std::path::Path;

use async_trait::async_trait;

use super::runner::DiagnosticSink;
use crate::error::CapabilityError;

/// Options shared by stage invocations.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StageOptions {
    /// Name transformed documents after the `Name:` header found in them.
    pub name_from_header: bool,
}

impl StageOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether outputs are named after the document's `Name:` header.
    pub fn with_name_from_header(mut self, enabled: bool) -> Self {
        self.name_from_header = enabled;
        self
    }
}

/// Input of a transform invocation.
#[derive(Debug, Clone, Copy)]
pub struct TransformRequest<'a> {
    pub input_dir: &'a Path,
    pub output_dir: &'a Path,
    pub options: &'a StageOptions,
    /// Opaque API token from the credential loader.
    pub api_key: &'a str,
}

/// Input of a score invocation.
#[derive(Debug, Clone, Copy)]
pub struct ScoreRequest<'a> {
    pub input_dir: &'a Path,
    pub output_dir: &'a Path,
    pub rubric_path: &'a Path,
    /// Opaque API token from the credential loader.
    pub api_key: &'a str,
}

/// Turns the documents of one directory into zero or more output documents.
#[async_trait]
pub trait Transformer: Send + Sync {
    async fn transform(
        &self,
        request: TransformRequest<'_>,
        sink: &mut DiagnosticSink,
    ) -> Result<(), CapabilityError>;
}

/// Produces a score report per document, given rubric data.
#[async_trait]
pub trait Scorer: Send + Sync {
    async fn score(
        &self,
        request: ScoreRequest<'_>,
        sink: &mut DiagnosticSink,
    ) -> Result<(), CapabilityError>;
}
