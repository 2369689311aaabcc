use serde_json::Value;

use super::summarizer::split_bullets;
use super::{brief_summary, detailed_summary, or_placeholder, scalar_string, string_list};
use super::DocumentIntelligence;
use crate::analysis::{AutoExtract, Highlight};
use crate::generation::{GenerationRequest, MODEL_KEY};
use crate::ingest::normalize_entities;

const FALLBACK_BULLET_POINTS: usize = 5;
const DERIVED_HIGHLIGHTS: usize = 10;
const DEFAULT_HIGHLIGHT_LABEL: &str = "Key detail";

const SYSTEM_PROMPT: &str = concat!(
    "You are a local document intelligence engine. ",
    "Return strict JSON with this schema: ",
    r#"{"summary_brief":string,"summary_detailed":string,"bullet_points":string[],"#,
    r#""entities":{"names":[],"dates":[],"amounts":[],"addresses":[],"#,
    r#""organizations":[],"emails":[],"phones":[]},"#,
    r#""highlights":[{"label":string,"value":string,"snippet":string}]}"#,
);

fn highlight_from_value(value: &Value) -> Option<Highlight> {
    let record = value.as_object()?;
    let value = scalar_string(record.get("value"));
    if value.is_empty() {
        return None;
    }
    let label = scalar_string(record.get("label"));
    Some(Highlight {
        label: if label.is_empty() {
            DEFAULT_HIGHLIGHT_LABEL.to_string()
        } else {
            label
        },
        value,
        snippet: scalar_string(record.get("snippet")),
    })
}

fn or_else(value: String, fallback: impl FnOnce() -> String) -> String {
    if value.is_empty() {
        fallback()
    } else {
        value
    }
}

impl DocumentIntelligence {
    /// One-shot extraction of summaries, bullet points, entities and
    /// highlights. `images` are forwarded to multimodal models.
    pub async fn analyze(&self, text: &str, filename: &str, images: Vec<Vec<u8>>) -> AutoExtract {
        let prompt = format!(
            "Document filename: {filename}\n\
             Identify key information and provide concise summaries. \
             If the content is unclear, leave uncertain values out instead of hallucinating.\n\
             Document content:\n{}",
            or_placeholder(self.clip(text))
        );
        let request = GenerationRequest::new(SYSTEM_PROMPT, prompt).with_images(images);
        let model_output = self.structured_or_empty(request).await;

        let summary_brief = or_else(scalar_string(model_output.get("summary_brief")), || {
            brief_summary(text)
        });
        let summary_detailed = or_else(scalar_string(model_output.get("summary_detailed")), || {
            detailed_summary(text)
        });

        let mut bullet_points = string_list(model_output.get("bullet_points"));
        if bullet_points.is_empty() {
            bullet_points = split_bullets(&brief_summary(text), FALLBACK_BULLET_POINTS);
        }

        let entities = normalize_entities(Some(&model_output), text);

        let mut highlights: Vec<Highlight> = model_output
            .get("highlights")
            .and_then(Value::as_array)
            .map(|items| items.iter().filter_map(highlight_from_value).collect())
            .unwrap_or_default();
        if highlights.is_empty() {
            highlights = entities
                .iter()
                .take(DERIVED_HIGHLIGHTS)
                .map(|entity| Highlight {
                    label: entity.entity_type.to_string(),
                    value: entity.value.clone(),
                    snippet: entity.snippet.clone(),
                })
                .collect();
        }

        let model = model_output
            .get(MODEL_KEY)
            .and_then(Value::as_str)
            .map(String::from);

        tracing::info!(
            filename,
            entities = entities.len(),
            from_model = !model_output.is_empty(),
            "document analyzed"
        );

        AutoExtract {
            summary_brief,
            summary_detailed,
            bullet_points,
            entities,
            highlights,
            model_output,
            model,
        }
    }
}
