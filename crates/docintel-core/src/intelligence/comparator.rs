use serde_json::Value;

use super::diff::{unified_diff, SequenceMatcher};
use super::{scalar_string, DocumentIntelligence};
use crate::analysis::{Change, ComparisonResult};
use crate::generation::GenerationRequest;

/// Non-blank lines per side fed to the line diff.
pub const DIFF_LINE_LIMIT: usize = 180;
pub const CHANGE_LIMIT: usize = 30;
pub const DIFF_PREVIEW_LIMIT: usize = 220;

const DIFF_CONTEXT: usize = 2;
/// Diff lines scanned when deriving changes without the model.
const FALLBACK_SCAN_LINES: usize = 12;
const FALLBACK_IMPACT: &str = "Review";

const SYSTEM_PROMPT: &str = r#"Compare two document versions and return strict JSON schema: {"summary":string,"changes":[{"type":string,"description":string,"impact":string}]}"#;

fn non_blank_lines(text: &str) -> Vec<&str> {
    text.lines()
        .filter(|line| !line.trim().is_empty())
        .take(DIFF_LINE_LIMIT)
        .collect()
}

fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

/// Coerces one model-reported change. Non-object items are skipped.
fn change_from_value(value: &Value) -> Option<Change> {
    let record = value.as_object()?;
    let change_type = scalar_string(record.get("type"));
    Some(Change {
        change_type: if change_type.is_empty() {
            "change".to_string()
        } else {
            change_type
        },
        description: scalar_string(record.get("description")),
        impact: scalar_string(record.get("impact")),
    })
}

/// Changes read straight off the head of a unified diff.
fn changes_from_diff(diff: &[String]) -> Vec<Change> {
    diff.iter()
        .take(FALLBACK_SCAN_LINES)
        .filter(|line| !(line.starts_with("+++") || line.starts_with("---") || line.starts_with("@@")))
        .map(|line| {
            let change_type = match line.chars().next() {
                Some('-') => "removed",
                Some('+') => "added",
                _ => "context",
            };
            let mut rest = line.chars();
            rest.next();
            Change {
                change_type: change_type.to_string(),
                description: rest.as_str().trim().to_string(),
                impact: FALLBACK_IMPACT.to_string(),
            }
        })
        .collect()
}

impl DocumentIntelligence {
    /// Similarity, line diff and described changes between two texts.
    pub async fn compare(
        &self,
        left_name: &str,
        left_text: &str,
        right_name: &str,
        right_text: &str,
    ) -> ComparisonResult {
        let (left_clip, right_clip) = (self.clip(left_text), self.clip(right_text));

        let left_chars: Vec<char> = left_clip.chars().collect();
        let right_chars: Vec<char> = right_clip.chars().collect();
        let similarity = SequenceMatcher::new(&left_chars, &right_chars).ratio();

        let diff_lines = unified_diff(
            &non_blank_lines(left_text),
            &non_blank_lines(right_text),
            left_name,
            right_name,
            DIFF_CONTEXT,
        );

        let prompt = format!(
            "Left document ({left_name}):\n{left_clip}\n\nRight document ({right_name}):\n{right_clip}"
        );
        let response = self
            .structured_or_empty(GenerationRequest::new(SYSTEM_PROMPT, prompt))
            .await;

        let mut changes: Vec<Change> = response
            .get("changes")
            .and_then(Value::as_array)
            .map(|items| items.iter().filter_map(change_from_value).collect())
            .unwrap_or_default();
        if changes.is_empty() {
            tracing::debug!("no usable changes from model, deriving from diff");
            changes = changes_from_diff(&diff_lines);
        }

        let mut summary = scalar_string(response.get("summary"));
        if summary.is_empty() {
            summary = format!(
                "Similarity score is {similarity:.2}. Detected {} notable line-level differences.",
                changes.len()
            );
        }

        changes.truncate(CHANGE_LIMIT);
        let mut diff_preview = diff_lines;
        diff_preview.truncate(DIFF_PREVIEW_LIMIT);

        ComparisonResult {
            summary,
            similarity: round4(similarity),
            changes,
            diff_preview,
        }
    }
}
