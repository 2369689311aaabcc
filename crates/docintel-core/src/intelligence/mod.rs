//! Model-assisted analysis with deterministic fallbacks.
//!
//! Each operation makes at most one generation call, validates whatever
//! comes back field by field, and fills anything unusable from the
//! deterministic path. Generation failures never escape this module.

mod auto_extract;
mod comparator;
pub mod diff;
mod summarizer;

pub use comparator::{CHANGE_LIMIT, DIFF_LINE_LIMIT, DIFF_PREVIEW_LIMIT};
pub use summarizer::{brief_summary, detailed_summary, NO_TEXT_BRIEF, NO_TEXT_DETAILED};

use std::sync::Arc;

use serde_json::{Map, Value};

use crate::config::DEFAULT_MAX_CONTEXT_CHARS;
use crate::generation::{GenerationRequest, Generator};

/// Shown to the model in place of an empty document.
const NO_TEXT_PLACEHOLDER: &str = "[no extracted text]";

/// The analysis engine. Cheap to clone; holds no mutable state.
#[derive(Clone)]
pub struct DocumentIntelligence {
    generator: Arc<dyn Generator>,
    max_context_chars: usize,
}

impl DocumentIntelligence {
    #[must_use]
    pub fn new(generator: Arc<dyn Generator>) -> Self {
        Self {
            generator,
            max_context_chars: DEFAULT_MAX_CONTEXT_CHARS,
        }
    }

    #[must_use]
    pub const fn with_max_context_chars(mut self, max_context_chars: usize) -> Self {
        self.max_context_chars = max_context_chars;
        self
    }

    #[must_use]
    pub fn generator(&self) -> &dyn Generator {
        self.generator.as_ref()
    }

    fn clip<'a>(&self, text: &'a str) -> &'a str {
        clip_chars(text, self.max_context_chars)
    }

    /// Structured call; any failure becomes an empty map.
    async fn structured_or_empty(&self, request: GenerationRequest) -> Map<String, Value> {
        match self.generator.generate_structured(&request).await {
            Ok(output) => output,
            Err(e) => {
                tracing::warn!(error = %e, "structured generation failed, using fallback");
                Map::new()
            }
        }
    }

    /// Text call; any failure becomes an empty string.
    async fn text_or_empty(&self, request: GenerationRequest) -> String {
        match self.generator.generate_text(&request).await {
            Ok(text) => text.trim().to_string(),
            Err(e) => {
                tracing::warn!(error = %e, "text generation failed, using fallback");
                String::new()
            }
        }
    }
}

/// Longest prefix of `text` holding at most `max_chars` characters.
pub(crate) fn clip_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((end, _)) => &text[..end],
        None => text,
    }
}

fn or_placeholder(text: &str) -> &str {
    if text.is_empty() {
        NO_TEXT_PLACEHOLDER
    } else {
        text
    }
}

/// Trimmed text of a scalar JSON value; empty for null, arrays and objects.
pub(crate) fn scalar_string(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.trim().to_string(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        _ => String::new(),
    }
}

/// Non-empty scalar items of a JSON array. Anything else yields nothing.
pub(crate) fn string_list(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .map(|item| scalar_string(Some(item)))
                .filter(|s| !s.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_clip_counts_chars() {
        assert_eq!(clip_chars("héllo", 2), "hé");
        assert_eq!(clip_chars("abc", 10), "abc");
        assert_eq!(clip_chars("abc", 0), "");
    }

    #[test]
    fn test_scalar_string() {
        assert_eq!(scalar_string(Some(&json!("  x "))), "x");
        assert_eq!(scalar_string(Some(&json!(3))), "3");
        assert_eq!(scalar_string(Some(&json!(null))), "");
        assert_eq!(scalar_string(Some(&json!({"a": 1}))), "");
        assert_eq!(scalar_string(None), "");
    }

    #[test]
    fn test_string_list() {
        let value = json!(["a", " ", 2, null, {"x": 1}, " b "]);
        assert_eq!(string_list(Some(&value)), vec!["a", "2", "b"]);
        assert!(string_list(Some(&json!("not a list"))).is_empty());
    }
}
