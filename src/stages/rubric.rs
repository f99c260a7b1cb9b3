//! Rubric loading.
//!
//! A rubric file is either JSON (`{"rubric", "question", "correct_answers"}`,
//! every field optional) or plain text / markdown holding only the rubric.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::error::CapabilityError;

/// Grading criteria plus optional question and reference answers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rubric {
    #[serde(default)]
    pub rubric: String,
    #[serde(default)]
    pub question: String,
    #[serde(default)]
    pub correct_answers: Vec<String>,
}

impl Rubric {
    /// A rubric with criteria text only.
    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            rubric: text.into(),
            ..Default::default()
        }
    }

    /// Loads a rubric, choosing the format from the file extension.
    ///
    /// # Errors
    ///
    /// - `CapabilityError::Io` if the file cannot be read
    /// - `CapabilityError::Rubric` for invalid JSON or an unsupported extension
    pub async fn load(path: &Path) -> Result<Self, CapabilityError> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();

        match extension.as_str() {
            "json" => {
                let content = fs::read_to_string(path).await?;
                serde_json::from_str(&content).map_err(|e| {
                    CapabilityError::Rubric(format!(
                        "'{}' is not a valid rubric JSON file: {}",
                        path.display(),
                        e
                    ))
                })
            }
            "txt" | "md" => Ok(Self::from_text(fs::read_to_string(path).await?)),
            _ => Err(CapabilityError::Rubric(format!(
                "Unsupported rubric file format for '{}'. Please use a .json, .txt or .md file.",
                path.display()
            ))),
        }
    }
}
