//! Grader and moderator prompts for rubric scoring.
//!
//! Both graders receive the same prompt and differ only in sampling
//! temperature. The moderator sees the paper, the rubric and both
//! evaluations, and must end with a per-criterion score summary that
//! [`crate::stages::summary::parse_score_summary`] can read.

use crate::stages::rubric::Rubric;

/// Calibration preamble shared by every grading call.
pub const CALIBRATION_PREAMBLE: &str = "Calibrate evaluations for community college freshmen: Be fair, constructive, and motivational. Typical papers should score 10-15/20, not failing unless severely deficient.";

/// Instructions for each independent grader.
pub const GRADING_PROMPT: &str = r#"You are an experienced writing instructor grading a student paper against the rubric below.

For every rubric criterion:
1. Quote or point to the evidence in the paper.
2. Explain strengths and weaknesses in one or two sentences.
3. Assign a score.

Finish with a "Score Summary" section listing one line per criterion in the form
Criterion name: earned / maximum
followed by
Total: earned / maximum"#;

/// Instructions for the moderator reconciling two evaluations.
pub const MODERATOR_PROMPT: &str = r#"You are the moderator for two independent graders who evaluated the same student paper.

Compare both evaluations against the rubric and the paper. Where they agree, confirm the score. Where they disagree, decide which reading of the paper is better supported and explain briefly.

Write the final feedback addressed to the student, then a "Score Summary" section listing one line per criterion in the form
Criterion name: earned / maximum
followed by
Total: earned / maximum

Use the exact criterion names from the rubric."#;

/// Question, reference answers and rubric, in the order the models expect.
fn rubric_context(rubric: &Rubric) -> String {
    let mut context = String::new();
    if !rubric.question.is_empty() {
        context.push_str(&format!("Question:\n{}\n\n", rubric.question));
    }
    if !rubric.correct_answers.is_empty() {
        context.push_str("Correct Answers:\n");
        for answer in &rubric.correct_answers {
            context.push_str(&format!("- {}\n", answer));
        }
        context.push('\n');
    }
    context.push_str(&format!("Rubric:\n{}", rubric.rubric));
    context
}

/// Builds the prompt for one grader.
pub fn build_grading_prompt(rubric: &Rubric, paper: &str) -> String {
    format!(
        "{}\n\n{}\n\n{}\n\nStudent Paper:\n{}",
        CALIBRATION_PREAMBLE,
        GRADING_PROMPT,
        rubric_context(rubric),
        paper
    )
}

/// Builds the moderator prompt from both grader evaluations.
pub fn build_moderator_prompt(
    rubric: &Rubric,
    paper: &str,
    evaluation_a: &str,
    evaluation_b: &str,
) -> String {
    format!(
        "{}\n\n{}\n\n{}\nStudent Paper:\n{}\nEvaluation from Grader A:\n{}\nEvaluation from Grader B:\n{}",
        CALIBRATION_PREAMBLE,
        MODERATOR_PROMPT,
        rubric_context(rubric),
        paper,
        evaluation_a,
        evaluation_b
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rubric() -> Rubric {
        Rubric {
            rubric: "Thesis: 5\nEvidence: 5".to_string(),
            question: "Why do leaves fall?".to_string(),
            correct_answers: vec!["Abscission".to_string(), "Less daylight".to_string()],
        }
    }

    #[test]
    fn test_grading_prompt_includes_context() {
        let prompt = build_grading_prompt(&rubric(), "Leaves fall because...");

        assert!(prompt.starts_with(CALIBRATION_PREAMBLE));
        assert!(prompt.contains("Question:\nWhy do leaves fall?"));
        assert!(prompt.contains("Correct Answers:\n- Abscission\n- Less daylight\n"));
        assert!(prompt.contains("Rubric:\nThesis: 5"));
        assert!(prompt.ends_with("Student Paper:\nLeaves fall because..."));
    }

    #[test]
    fn test_grading_prompt_omits_empty_sections() {
        let rubric = Rubric {
            rubric: "Clarity: 10".to_string(),
            ..Default::default()
        };
        let prompt = build_grading_prompt(&rubric, "paper");

        assert!(!prompt.contains("Question:"));
        assert!(!prompt.contains("Correct Answers:"));
    }

    #[test]
    fn test_moderator_prompt_orders_evaluations() {
        let prompt = build_moderator_prompt(&rubric(), "paper", "A says 7", "B says 9");
        let a = prompt.find("Evaluation from Grader A:\nA says 7").expect("grader a");
        let b = prompt.find("Evaluation from Grader B:\nB says 9").expect("grader b");
        assert!(a < b);
        assert!(prompt.contains(MODERATOR_PROMPT));
    }
}
