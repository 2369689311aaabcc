use std::sync::LazyLock;

use regex::Regex;

use super::{clip_chars, or_placeholder, string_list, DocumentIntelligence};
use crate::analysis::{Summary, SummaryLevel};
use crate::generation::{GenerationRequest, TEXT_TEMPERATURE};

pub const NO_TEXT_BRIEF: &str = "No readable text was extracted.";
pub const NO_TEXT_DETAILED: &str = "No readable text was extracted from this document.";

const BRIEF_MAX_CHARS: usize = 360;
const BRIEF_SENTENCES: usize = 2;
const DETAILED_MAX_CHARS: usize = 900;
const DETAILED_LINES: usize = 8;
const FALLBACK_BULLETS: usize = 8;

static BULLET_SPLIT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\n•-]+").expect("static pattern"));

const BULLETS_SYSTEM_PROMPT: &str =
    r#"Return strict JSON with schema {"level":string,"content":string,"bullets":string[]}"#;
const TEXT_SYSTEM_PROMPT: &str =
    "You summarize documents. Reply with the summary text only, without preamble.";

/// First two sentences of the whitespace-normalized text.
#[must_use]
pub fn brief_summary(text: &str) -> String {
    if text.trim().is_empty() {
        return NO_TEXT_BRIEF.to_string();
    }

    let normalized = text.split_whitespace().collect::<Vec<_>>().join(" ");
    let mut end = normalized.len();
    let mut boundaries = 0;
    let mut prev = None;
    for (i, c) in normalized.char_indices() {
        if c == ' ' && matches!(prev, Some('.' | '!' | '?')) {
            boundaries += 1;
            if boundaries == BRIEF_SENTENCES {
                end = i;
                break;
            }
        }
        prev = Some(c);
    }

    clip_chars(&normalized[..end], BRIEF_MAX_CHARS).to_string()
}

/// First eight non-blank lines, joined with spaces.
#[must_use]
pub fn detailed_summary(text: &str) -> String {
    if text.trim().is_empty() {
        return NO_TEXT_DETAILED.to_string();
    }

    let joined = text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .take(DETAILED_LINES)
        .collect::<Vec<_>>()
        .join(" ");
    clip_chars(&joined, DETAILED_MAX_CHARS).to_string()
}

/// Fragments of `summary` between newlines, bullet glyphs and hyphens.
pub(crate) fn split_bullets(summary: &str, limit: usize) -> Vec<String> {
    BULLET_SPLIT
        .split(summary)
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .take(limit)
        .map(String::from)
        .collect()
}

fn user_prompt(level: SummaryLevel, text: &str) -> String {
    format!(
        "Requested level: {level}\nInstruction: {}\nDocument content:\n{}",
        level.instruction(),
        or_placeholder(text)
    )
}

impl DocumentIntelligence {
    /// Summary at `level`, from the model when it answers usefully.
    pub async fn summarize(&self, text: &str, level: SummaryLevel) -> Summary {
        let prompt = user_prompt(level, self.clip(text));

        if level == SummaryLevel::Bullets {
            let response = self
                .structured_or_empty(GenerationRequest::new(BULLETS_SYSTEM_PROMPT, prompt))
                .await;
            let mut bullets = string_list(response.get("bullets"));
            if bullets.is_empty() {
                tracing::debug!("no usable bullets from model, deriving from text");
                bullets = split_bullets(&detailed_summary(text), FALLBACK_BULLETS);
            }
            let content = bullets
                .iter()
                .map(|b| format!("- {b}"))
                .collect::<Vec<_>>()
                .join("\n");
            return Summary {
                level,
                content,
                bullets,
            };
        }

        let request =
            GenerationRequest::new(TEXT_SYSTEM_PROMPT, prompt).with_temperature(TEXT_TEMPERATURE);
        let mut content = self.text_or_empty(request).await;
        if content.is_empty() {
            tracing::debug!(%level, "no usable summary from model, using extractive summary");
            content = match level {
                SummaryLevel::Detailed => detailed_summary(text),
                _ => brief_summary(text),
            };
        }

        Summary {
            level,
            content,
            bullets: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use super::*;
    use crate::generation::testing::{Scripted, ScriptedGenerator};
    use crate::generation::OfflineGenerator;

    fn offline() -> DocumentIntelligence {
        DocumentIntelligence::new(Arc::new(OfflineGenerator))
    }

    #[tokio::test]
    async fn test_empty_text_brief_sentinel() {
        let summary = offline().summarize("", SummaryLevel::Brief).await;

        assert_eq!(summary.level, SummaryLevel::Brief);
        assert_eq!(summary.content, "No readable text was extracted.");
        assert!(summary.bullets.is_empty());
    }

    #[tokio::test]
    async fn test_whitespace_text_detailed_sentinel() {
        let summary = offline().summarize(" \n\t ", SummaryLevel::Detailed).await;
        assert_eq!(summary.content, NO_TEXT_DETAILED);
    }

    #[test]
    fn test_brief_takes_two_sentences() {
        let text = "First   sentence.\nSecond one! Third? Fourth.";
        assert_eq!(brief_summary(text), "First sentence. Second one!");
        assert_eq!(brief_summary("No terminal punctuation here"), "No terminal punctuation here");
        assert_eq!(brief_summary("Version 2.5 shipped. Done"), "Version 2.5 shipped. Done");
    }

    #[test]
    fn test_brief_is_capped() {
        let text = "x".repeat(1000);
        assert_eq!(brief_summary(&text).chars().count(), 360);
    }

    #[test]
    fn test_detailed_takes_first_lines() {
        let text = (1..=10).map(|n| format!("  line {n}  ")).collect::<Vec<_>>().join("\n\n");
        assert_eq!(
            detailed_summary(&text),
            "line 1 line 2 line 3 line 4 line 5 line 6 line 7 line 8"
        );
    }

    #[tokio::test]
    async fn test_bullets_from_model() {
        let generator = ScriptedGenerator::structured(json!({"bullets": ["Rent is due", "", "Deposit held"]}));
        let intel = DocumentIntelligence::new(Arc::new(generator));
        let summary = intel.summarize("lease text", SummaryLevel::Bullets).await;

        assert_eq!(summary.bullets, vec!["Rent is due", "Deposit held"]);
        assert_eq!(summary.content, "- Rent is due\n- Deposit held");
    }

    #[tokio::test]
    async fn test_bullets_fallback_splits_detailed_summary() {
        let text = "Alpha line\nBeta - gamma\n• delta";
        let summary = offline().summarize(text, SummaryLevel::Bullets).await;

        assert_eq!(summary.bullets, vec!["Alpha line Beta", "gamma", "delta"]);
        assert_eq!(summary.content, "- Alpha line Beta\n- gamma\n- delta");
    }

    #[tokio::test]
    async fn test_model_text_is_used_and_context_is_clipped() {
        let generator = Arc::new(ScriptedGenerator::new(vec![Scripted::Text(
            "  A short model summary.  ".into(),
        )]));
        let intel = DocumentIntelligence::new(generator.clone()).with_max_context_chars(10);
        let summary = intel.summarize("0123456789ABCDEF", SummaryLevel::Brief).await;

        assert_eq!(summary.content, "A short model summary.");

        let requests = generator.requests();
        assert_eq!(requests.len(), 1);
        assert!(requests[0].user_prompt.contains("0123456789"));
        assert!(!requests[0].user_prompt.contains('A'));
        assert!((requests[0].temperature - TEXT_TEMPERATURE).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_blank_model_text_falls_back() {
        let generator = ScriptedGenerator::new(vec![Scripted::Text("   ".into())]);
        let intel = DocumentIntelligence::new(Arc::new(generator));
        let summary = intel.summarize("One. Two. Three.", SummaryLevel::Brief).await;

        assert_eq!(summary.content, "One. Two.");
    }
}
