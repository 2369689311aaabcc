use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

use super::span::{snippet, SNIPPET_RADIUS};
use crate::entity::{sort_matches, EntityCategory, EntityMatch};

/// Confidence assigned to every pattern match. Deliberately below the
/// default given to model-reported entities.
pub const FALLBACK_CONFIDENCE: f64 = 0.58;

const MIN_MATCH_CHARS: usize = 3;

static DEFAULT_EXTRACTOR: LazyLock<RuleBasedExtractor> =
    LazyLock::new(RuleBasedExtractor::with_default_patterns);

pub struct ExtractionPattern {
    pub category: EntityCategory,
    pub regex: Regex,
}

impl ExtractionPattern {
    pub fn new(category: EntityCategory, pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            category,
            regex: Regex::new(pattern)?,
        })
    }
}

/// Deterministic, regex-driven entity extraction.
///
/// Each pattern runs independently over the full text. Within a category the
/// first occurrence of a value (compared case-insensitively) wins.
pub struct RuleBasedExtractor {
    patterns: Vec<ExtractionPattern>,
    confidence: f64,
}

impl RuleBasedExtractor {
    #[must_use]
    pub fn new() -> Self {
        Self {
            patterns: Vec::new(),
            confidence: FALLBACK_CONFIDENCE,
        }
    }

    #[must_use]
    pub fn with_pattern(mut self, pattern: ExtractionPattern) -> Self {
        self.patterns.push(pattern);
        self
    }

    #[must_use]
    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence;
        self
    }

    #[must_use]
    pub fn with_default_patterns() -> Self {
        let defaults = [
            (
                EntityCategory::Emails,
                r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}",
            ),
            (
                EntityCategory::Phones,
                r"(?:\+?\d{1,2}[\s.-]?)?(?:\(\d{3}\)|\d{3})[\s.-]?\d{3}[\s.-]?\d{4}",
            ),
            (
                EntityCategory::Amounts,
                r"(?:USD\s*)?\$\s?\d[\d,]*(?:\.\d{2})?",
            ),
            (
                EntityCategory::Dates,
                r"\b\d{4}-\d{1,2}-\d{1,2}\b|\d{1,2}[/-]\d{1,2}[/-]\d{2,4}|\b(?:Jan|Feb|Mar|Apr|May|Jun|Jul|Aug|Sep|Oct|Nov|Dec)[a-z]*\s+\d{1,2},?\s+\d{2,4}",
            ),
            (
                EntityCategory::Addresses,
                r"\b\d{1,6}\s+[A-Za-z0-9\s]{2,40}\s(?:Street|St|Avenue|Ave|Road|Rd|Boulevard|Blvd|Lane|Ln|Drive|Dr|Court|Ct)\b[^\n,]*",
            ),
            (
                EntityCategory::Organizations,
                r"\b[A-Z][A-Za-z0-9&.,\-\s]{2,40}\s(?:Inc|LLC|Ltd|Corp|Corporation|University|Bank|Agency)\b",
            ),
            (EntityCategory::Names, r"\b[A-Z][a-z]+\s+[A-Z][a-z]+\b"),
        ];

        let mut extractor = Self::new();
        for (category, pattern) in defaults {
            match ExtractionPattern::new(category, pattern) {
                Ok(p) => extractor.patterns.push(p),
                Err(e) => tracing::error!(%category, "invalid built-in pattern: {e}"),
            }
        }
        extractor
    }

    #[must_use]
    pub fn extract(&self, text: &str) -> Vec<EntityMatch> {
        if text.trim().is_empty() {
            return Vec::new();
        }

        let mut found = Vec::new();
        for pattern in &self.patterns {
            let mut seen: HashSet<String> = HashSet::new();
            for capture in pattern.regex.find_iter(text) {
                let value = capture.as_str().trim();
                if value.chars().count() < MIN_MATCH_CHARS {
                    continue;
                }
                if !seen.insert(value.to_lowercase()) {
                    continue;
                }

                let span = Some((capture.start(), capture.end()));
                found.push(
                    EntityMatch::new(pattern.category, value.to_string(), self.confidence)
                        .with_span(span)
                        .with_snippet(snippet(text, span, SNIPPET_RADIUS)),
                );
            }
        }

        sort_matches(&mut found);
        found
    }
}

impl Default for RuleBasedExtractor {
    fn default() -> Self {
        Self::with_default_patterns()
    }
}

/// Runs the built-in patterns over `text`.
#[must_use]
pub fn fallback_entities(text: &str) -> Vec<EntityMatch> {
    DEFAULT_EXTRACTOR.extract(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn values_of(matches: &[EntityMatch], category: EntityCategory) -> Vec<&str> {
        matches
            .iter()
            .filter(|m| m.entity_type == category)
            .map(|m| m.value.as_str())
            .collect()
    }

    #[test]
    fn test_contact_line() {
        let text = "Contact: Jane Doe at jane@example.com, invoice $1,200.00 due 2024-01-15.";
        let found = fallback_entities(text);

        assert_eq!(values_of(&found, EntityCategory::Emails), vec!["jane@example.com"]);
        assert_eq!(values_of(&found, EntityCategory::Amounts), vec!["$1,200.00"]);
        assert_eq!(values_of(&found, EntityCategory::Dates), vec!["2024-01-15"]);
        assert_eq!(values_of(&found, EntityCategory::Names), vec!["Jane Doe"]);
        assert_eq!(found.len(), 4);
        assert!(found.iter().all(|m| (m.confidence - 0.58).abs() < f64::EPSILON));
    }

    #[test]
    fn test_offsets_and_snippets_come_from_match() {
        let text = "Reach us at info@acme.io today.";
        let found = fallback_entities(text);
        let email = &found[0];

        assert_eq!(email.entity_type, EntityCategory::Emails);
        let (start, end) = (email.start_index.unwrap(), email.end_index.unwrap());
        assert_eq!(&text[start..end], "info@acme.io");
        assert_eq!(email.snippet, "Reach us at info@acme.io today.");
    }

    #[test]
    fn test_duplicates_dropped_case_insensitively() {
        let text = "Mail JOE@EXAMPLE.COM or joe@example.com, again JOE@example.com.";
        let found = fallback_entities(text);

        assert_eq!(values_of(&found, EntityCategory::Emails), vec!["JOE@EXAMPLE.COM"]);
    }

    #[test]
    fn test_month_dates_phones_and_organizations() {
        let text = "Signed March 3, 2023 by Globex Corporation. Call (555) 123-4567. \
                    Office at 42 Main Street, Springfield.";
        let found = fallback_entities(text);

        assert_eq!(values_of(&found, EntityCategory::Dates), vec!["March 3, 2023"]);
        assert_eq!(values_of(&found, EntityCategory::Phones), vec!["(555) 123-4567"]);
        assert_eq!(values_of(&found, EntityCategory::Addresses), vec!["42 Main Street"]);
        assert!(values_of(&found, EntityCategory::Organizations)
            .iter()
            .any(|v| v.ends_with("Globex Corporation")));
    }

    #[test]
    fn test_empty_text() {
        assert!(fallback_entities("").is_empty());
        assert!(fallback_entities("   \n ").is_empty());
    }

    #[test]
    fn test_custom_patterns() {
        let extractor = RuleBasedExtractor::new()
            .with_confidence(0.4)
            .with_pattern(ExtractionPattern::new(EntityCategory::Names, r"Agent \w+").unwrap());
        let found = extractor.extract("Agent Smith met Agent Jones.");

        assert_eq!(found.len(), 2);
        assert!(found.iter().all(|m| (m.confidence - 0.4).abs() < f64::EPSILON));
    }
}
