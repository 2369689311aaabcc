use std::collections::HashSet;

use serde_json::{Map, Value};

use super::extractor::fallback_entities;
use super::span::{locate, snippet, SNIPPET_RADIUS};
use crate::entity::{sort_matches, EntityCategory, EntityMatch};

/// Confidence given to a model-reported entity that carries none.
pub const DEFAULT_MODEL_CONFIDENCE: f64 = 0.8;

/// One entity as reported by the model, before reconciliation.
#[derive(Debug, Clone, PartialEq)]
struct Candidate {
    value: String,
    confidence: f64,
    snippet: String,
}

impl Candidate {
    /// Accepts a bare scalar or a `{value|text, confidence, snippet}` record.
    fn from_value(item: &Value) -> Option<Self> {
        let candidate = match item {
            Value::Object(record) => Self {
                value: record
                    .get("value")
                    .and_then(scalar_text)
                    .or_else(|| record.get("text").and_then(scalar_text))
                    .unwrap_or_default(),
                confidence: record
                    .get("confidence")
                    .and_then(confidence_of)
                    .unwrap_or(DEFAULT_MODEL_CONFIDENCE),
                snippet: record
                    .get("snippet")
                    .and_then(scalar_text)
                    .unwrap_or_default(),
            },
            other => Self {
                value: scalar_text(other)?,
                confidence: DEFAULT_MODEL_CONFIDENCE,
                snippet: String::new(),
            },
        };

        (!candidate.value.is_empty()).then_some(candidate)
    }
}

/// Non-empty trimmed text of a string, number or boolean.
fn scalar_text(value: &Value) -> Option<String> {
    let text = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => return None,
    };
    (!text.is_empty()).then_some(text)
}

/// A zero or unreadable confidence counts as missing.
fn confidence_of(value: &Value) -> Option<f64> {
    let raw = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    (raw.is_finite() && raw != 0.0).then_some(raw)
}

/// Reconciles the model's `entities` map against the source text.
///
/// Falls back to pattern extraction when the map is missing, is not an
/// object, or yields nothing usable. The result holds at most one entity per
/// category and lowercased value, sorted by [`sort_matches`].
#[must_use]
pub fn normalize_entities(model_output: Option<&Map<String, Value>>, text: &str) -> Vec<EntityMatch> {
    let Some(entities) = model_output
        .and_then(|output| output.get("entities"))
        .and_then(Value::as_object)
    else {
        tracing::debug!("no entity map in model output, using pattern extraction");
        return fallback_entities(text);
    };

    let mut output = Vec::new();
    let mut seen: HashSet<(EntityCategory, String)> = HashSet::new();

    for category in EntityCategory::ALL {
        let Some(items) = entities.get(category.as_str()).and_then(Value::as_array) else {
            continue;
        };

        for candidate in items.iter().filter_map(Candidate::from_value) {
            if !seen.insert((category, candidate.value.to_lowercase())) {
                continue;
            }

            let span = locate(text, &candidate.value);
            let snippet = if candidate.snippet.is_empty() {
                snippet(text, span, SNIPPET_RADIUS)
            } else {
                candidate.snippet
            };

            output.push(
                EntityMatch::new(category, candidate.value, candidate.confidence)
                    .with_span(span)
                    .with_snippet(snippet),
            );
        }
    }

    if output.is_empty() {
        tracing::debug!("model reported no usable entities, using pattern extraction");
        return fallback_entities(text);
    }

    sort_matches(&mut output);
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const TEXT: &str = "Contact: Jane Doe at jane@example.com, invoice $1,200.00 due 2024-01-15.";

    fn object(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn test_missing_entities_falls_back() {
        let output = object(json!({"summary_brief": "x"}));
        assert_eq!(normalize_entities(Some(&output), TEXT), fallback_entities(TEXT));
        assert_eq!(normalize_entities(None, TEXT), fallback_entities(TEXT));
    }

    #[test]
    fn test_wrong_shape_falls_back() {
        let output = object(json!({"entities": ["Jane Doe"]}));
        assert_eq!(normalize_entities(Some(&output), TEXT), fallback_entities(TEXT));
    }

    #[test]
    fn test_confidently_empty_falls_back() {
        let output = object(json!({"entities": {"names": [], "emails": [""]}}));
        let result = normalize_entities(Some(&output), TEXT);

        assert_eq!(result, fallback_entities(TEXT));
        assert!(!result.is_empty());
    }

    #[test]
    fn test_records_and_strings_are_coerced() {
        let output = object(json!({
            "entities": {
                "names": ["Jane Doe", {"value": "JANE DOE", "confidence": 0.99}],
                "emails": [{"text": "jane@example.com", "confidence": "1.5"}],
                "amounts": [{"value": "$1,200.00", "confidence": 0, "snippet": "invoice total"}],
                "planets": ["Mars"]
            }
        }));
        let result = normalize_entities(Some(&output), TEXT);

        assert_eq!(result.len(), 3);

        let email = &result[0];
        assert_eq!(email.entity_type, EntityCategory::Emails);
        assert!((email.confidence - 1.0).abs() < f64::EPSILON);

        let name = result
            .iter()
            .find(|m| m.entity_type == EntityCategory::Names)
            .unwrap();
        assert_eq!(name.value, "Jane Doe");
        assert!((name.confidence - DEFAULT_MODEL_CONFIDENCE).abs() < f64::EPSILON);
        assert_eq!(name.start_index, Some(9));
        assert_eq!(name.end_index, Some(17));
        assert_eq!(name.snippet, TEXT.trim());

        let amount = result
            .iter()
            .find(|m| m.entity_type == EntityCategory::Amounts)
            .unwrap();
        assert_eq!(amount.snippet, "invoice total");
        assert!((amount.confidence - DEFAULT_MODEL_CONFIDENCE).abs() < f64::EPSILON);
    }

    #[test]
    fn test_value_not_in_text_keeps_no_span() {
        let output = object(json!({"entities": {"organizations": ["Initech LLC"]}}));
        let result = normalize_entities(Some(&output), TEXT);

        assert_eq!(result.len(), 1);
        assert_eq!(result[0].start_index, None);
        assert_eq!(result[0].end_index, None);
        assert!(result[0].snippet.is_empty());
    }

    #[test]
    fn test_never_returns_duplicate_keys() {
        let output = object(json!({
            "entities": {
                "names": ["a b", "A B", " a b ", "c d"],
                "dates": ["a b"]
            }
        }));
        let result = normalize_entities(Some(&output), "a b c d");
        let keys: HashSet<_> = result.iter().map(EntityMatch::key).collect();

        assert_eq!(keys.len(), result.len());
        assert_eq!(result.len(), 3);
    }

    #[test]
    fn test_output_is_sorted() {
        let output = object(json!({
            "entities": {
                "names": [{"value": "Zed", "confidence": 0.5}, {"value": "Amy", "confidence": 0.5}],
                "emails": [{"value": "z@z.io", "confidence": 0.95}]
            }
        }));
        let values: Vec<_> = normalize_entities(Some(&output), "")
            .into_iter()
            .map(|m| m.value)
            .collect();

        assert_eq!(values, vec!["z@z.io", "Amy", "Zed"]);
    }
}
