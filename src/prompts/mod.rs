//! LLM prompts for text correction and rubric grading.
//!
//! - [`correction`] - Prompt for fixing OCR mistakes in transcribed text
//! - [`grading`] - Grader and moderator prompts, with rubric context
//!
//! # Usage
//!
//! ```ignore
//! use gradeforge::prompts::{build_correction_prompt, build_grading_prompt};
//! use gradeforge::stages::Rubric;
//!
//! let fix = build_correction_prompt("Teh quick brwn fox");
//! let grade = build_grading_prompt(&Rubric::from_text("Clarity: 10"), "essay text");
//! ```

pub mod correction;
pub mod grading;

pub use correction::{build_correction_prompt, OCR_CORRECTION_PROMPT};
pub use grading::{
    build_grading_prompt, build_moderator_prompt, CALIBRATION_PREAMBLE, GRADING_PROMPT,
    MODERATOR_PROMPT,
};
