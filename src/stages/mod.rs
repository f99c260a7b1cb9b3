//! Shipped stage capabilities.
//!
//! - [`TextCorrector`]: cleans up OCR text with an LLM (transform stage)
//! - [`RubricScorer`]: grades documents against a rubric (score stage)
//!
//! Both work on plain-text documents and report progress through the
//! [`crate::pipeline::DiagnosticSink`] they are handed.

pub mod rubric;
pub mod score;
pub mod summary;
pub mod transform;

pub use rubric::Rubric;
pub use score::{Evaluation, RubricScorer};
pub use summary::{
    format_score, parse_score_summary, render_batch_summary, write_batch_summary, BatchEntry,
    Score, ScoreSummary, BATCH_SUMMARY_FILE,
};
pub use transform::TextCorrector;
