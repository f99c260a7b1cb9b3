//! Score summary extraction and the per-batch CSV table.
//!
//! Moderator evaluations end with lines such as `Thesis: 4 / 5` and
//! `Total: 15/20`. [`parse_score_summary`] pulls those out so a batch of
//! reports can be tabulated in `batch_scores.csv`.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;
use tokio::fs;

/// File name of the batch table written next to the score reports.
pub const BATCH_SUMMARY_FILE: &str = "batch_scores.csv";

/// Points earned out of points available.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Score {
    pub earned: f64,
    pub max: f64,
}

impl Score {
    pub fn new(earned: f64, max: f64) -> Self {
        Self { earned, max }
    }
}

/// Scores found in one evaluation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScoreSummary {
    /// Criteria in order of first appearance.
    pub criteria: Vec<(String, Score)>,
    pub total: Option<Score>,
}

impl ScoreSummary {
    pub fn is_empty(&self) -> bool {
        self.criteria.is_empty()
    }

    pub fn criterion(&self, label: &str) -> Option<Score> {
        self.criteria
            .iter()
            .find(|(l, _)| l == label)
            .map(|(_, score)| *score)
    }
}

fn criterion_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?m)^\s*([^:\n]+):\s*(\d+(?:\.\d+)?)\s*/\s*(\d+(?:\.\d+)?)\b")
            .expect("criterion pattern is valid")
    })
}

fn total_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(
            r"(?im)^\s*(?:Total|Overall(?:\s+Score)?|Final\s+Score):\s*(\d+(?:\.\d+)?)\s*/\s*(\d+(?:\.\d+)?)\b",
        )
        .expect("total pattern is valid")
    })
}

/// Extracts criterion scores and the total from an evaluation.
///
/// The first occurrence of a criterion wins and a `Total` line is never a
/// criterion. Without an explicit total line the total is the sum of the
/// criteria, or `None` when there are none.
pub fn parse_score_summary(text: &str) -> ScoreSummary {
    let mut summary = ScoreSummary::default();

    for caps in criterion_pattern().captures_iter(text) {
        let label = caps[1].trim();
        if label.eq_ignore_ascii_case("total") {
            continue;
        }
        let (Ok(earned), Ok(max)) = (caps[2].parse::<f64>(), caps[3].parse::<f64>()) else {
            continue;
        };
        if summary.criterion(label).is_none() {
            summary
                .criteria
                .push((label.to_string(), Score::new(earned, max)));
        }
    }

    summary.total = total_pattern()
        .captures(text)
        .and_then(|caps| Some(Score::new(caps[1].parse().ok()?, caps[2].parse().ok()?)))
        .or_else(|| {
            (!summary.criteria.is_empty()).then(|| {
                summary
                    .criteria
                    .iter()
                    .fold(Score::new(0.0, 0.0), |acc, (_, s)| {
                        Score::new(acc.earned + s.earned, acc.max + s.max)
                    })
            })
        });

    summary
}

fn format_number(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{}", value.round() as i64)
    } else {
        format!("{:.2}", value)
            .trim_end_matches('0')
            .trim_end_matches('.')
            .to_string()
    }
}

/// Renders a score as `earned/max`, e.g. `7/10` or `7.5/10`.
pub fn format_score(score: Score) -> String {
    format!("{}/{}", format_number(score.earned), format_number(score.max))
}

/// One scored document in a batch.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchEntry {
    pub filename: String,
    pub summary: ScoreSummary,
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

fn csv_row(fields: &[String]) -> String {
    let mut row = fields
        .iter()
        .map(|f| csv_field(f))
        .collect::<Vec<_>>()
        .join(",");
    row.push_str("\r\n");
    row
}

/// Renders the batch table: `Essay`, each criterion in first-seen order,
/// then `Total`. Missing scores are empty cells.
pub fn render_batch_summary(entries: &[BatchEntry]) -> String {
    let mut criteria: Vec<&str> = Vec::new();
    for entry in entries {
        for (label, _) in &entry.summary.criteria {
            if !criteria.contains(&label.as_str()) {
                criteria.push(label);
            }
        }
    }

    let mut header = vec!["Essay".to_string()];
    header.extend(criteria.iter().map(|c| c.to_string()));
    header.push("Total".to_string());

    let mut out = csv_row(&header);
    for entry in entries {
        let mut row = vec![entry.filename.clone()];
        row.extend(
            criteria
                .iter()
                .map(|c| entry.summary.criterion(c).map(format_score).unwrap_or_default()),
        );
        row.push(entry.summary.total.map(format_score).unwrap_or_default());
        out.push_str(&csv_row(&row));
    }
    out
}

/// Writes `batch_scores.csv` into `output_dir`.
///
/// Returns `None` without touching the disk when no entry has criteria.
pub async fn write_batch_summary(
    output_dir: &Path,
    entries: &[BatchEntry],
) -> std::io::Result<Option<PathBuf>> {
    if entries.iter().all(|e| e.summary.is_empty()) {
        return Ok(None);
    }
    let path = output_dir.join(BATCH_SUMMARY_FILE);
    fs::write(&path, render_batch_summary(entries)).await?;
    Ok(Some(path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const MODERATOR_OUTPUT: &str = "\
Final feedback: strong argument overall.

Score Summary
Thesis: 4 / 5
Evidence: 3.5/5
Organization: 5/5
Thesis: 1/5
Total: 12.5 / 15
";

    #[test]
    fn test_parse_score_summary() {
        let summary = parse_score_summary(MODERATOR_OUTPUT);

        let labels: Vec<&str> = summary.criteria.iter().map(|(l, _)| l.as_str()).collect();
        assert_eq!(labels, vec!["Thesis", "Evidence", "Organization"]);
        assert_eq!(summary.criterion("Thesis"), Some(Score::new(4.0, 5.0)));
        assert_eq!(summary.criterion("Evidence"), Some(Score::new(3.5, 5.0)));
        assert_eq!(summary.total, Some(Score::new(12.5, 15.0)));
    }

    #[test]
    fn test_total_falls_back_to_sum() {
        let summary = parse_score_summary("Grammar: 2/4\nStyle: 3/6\n");
        assert_eq!(summary.total, Some(Score::new(5.0, 10.0)));
    }

    #[test]
    fn test_total_variants_case_insensitive() {
        let summary = parse_score_summary("Clarity: 8/10\nfinal score: 17/20");
        assert_eq!(summary.total, Some(Score::new(17.0, 20.0)));

        let summary = parse_score_summary("Clarity: 8/10\nOverall Score: 16/20");
        assert_eq!(summary.total, Some(Score::new(16.0, 20.0)));
    }

    #[test]
    fn test_no_scores() {
        let summary = parse_score_summary("The essay was thoughtful but unfinished.");
        assert!(summary.is_empty());
        assert_eq!(summary.total, None);
    }

    #[test]
    fn test_format_score() {
        assert_eq!(format_score(Score::new(7.0, 10.0)), "7/10");
        assert_eq!(format_score(Score::new(7.5, 10.0)), "7.5/10");
        assert_eq!(format_score(Score::new(2.0 / 3.0, 1.0)), "0.67/1");
        assert_eq!(format_score(Score::new(3.10, 4.0)), "3.1/4");
    }

    #[test]
    fn test_render_batch_summary() {
        let entries = vec![
            BatchEntry {
                filename: "alice.txt".to_string(),
                summary: parse_score_summary("Thesis: 4/5\nEvidence: 3/5"),
            },
            BatchEntry {
                filename: "bob, jr.txt".to_string(),
                summary: parse_score_summary("Evidence: 5/5\nStyle: 2.5/5\nTotal: 7.5/10"),
            },
        ];

        let csv = render_batch_summary(&entries);
        let lines: Vec<&str> = csv.split("\r\n").collect();
        assert_eq!(lines[0], "Essay,Thesis,Evidence,Style,Total");
        assert_eq!(lines[1], "alice.txt,4/5,3/5,,7/10");
        assert_eq!(lines[2], "\"bob, jr.txt\",,5/5,2.5/5,7.5/10");
        assert_eq!(lines[3], "");
    }

    #[test]
    fn test_csv_field_quoting() {
        assert_eq!(csv_field("plain"), "plain");
        assert_eq!(csv_field("say \"hi\""), "\"say \"\"hi\"\"\"");
        assert_eq!(csv_field("two\nlines"), "\"two\nlines\"");
    }

    #[tokio::test]
    async fn test_write_batch_summary() {
        let tmp = TempDir::new().expect("tempdir");

        let none = write_batch_summary(tmp.path(), &[]).await.expect("write");
        assert!(none.is_none());
        assert!(!tmp.path().join(BATCH_SUMMARY_FILE).exists());

        let entries = vec![BatchEntry {
            filename: "a.txt".to_string(),
            summary: parse_score_summary("Clarity: 9/10"),
        }];
        let path = write_batch_summary(tmp.path(), &entries)
            .await
            .expect("write")
            .expect("written");
        assert_eq!(path, tmp.path().join(BATCH_SUMMARY_FILE));
        let content = std::fs::read_to_string(path).expect("read");
        assert!(content.starts_with("Essay,Clarity,Total\r\n"));
    }
}
