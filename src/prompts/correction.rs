//! Prompt for cleaning up OCR output.

/// Instructions for the text-correction model.
pub const OCR_CORRECTION_PROMPT: &str = r#"You are correcting text produced by OCR from a scanned, handwritten student essay.

Fix recognition mistakes: misread letters and words, broken words split across lines, stray symbols and duplicated fragments.

Rules:
- Do NOT rewrite, improve or summarize the student's writing.
- Keep the student's own spelling and grammar errors when they are clearly the student's and not OCR noise.
- Keep paragraph breaks.
- Keep any header lines such as "Name: ..." exactly on their own line.

Output ONLY the corrected text. No commentary."#;

/// Builds the user message asking for `text` to be corrected.
pub fn build_correction_prompt(text: &str) -> String {
    format!("{}\n\nInput text:\n{}", OCR_CORRECTION_PROMPT, text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_correction_prompt() {
        let prompt = build_correction_prompt("Teh quick brwn fox");
        assert!(prompt.starts_with(OCR_CORRECTION_PROMPT));
        assert!(prompt.ends_with("Input text:\nTeh quick brwn fox"));
    }
}
