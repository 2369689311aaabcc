use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

/// The closed set of entity categories. Anything a model reports outside
/// this set is ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityCategory {
    Names,
    Dates,
    Amounts,
    Addresses,
    Organizations,
    Emails,
    Phones,
}

impl EntityCategory {
    /// Order in which categories are read from model output.
    pub const ALL: [Self; 7] = [
        Self::Names,
        Self::Dates,
        Self::Amounts,
        Self::Addresses,
        Self::Organizations,
        Self::Emails,
        Self::Phones,
    ];

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Names => "names",
            Self::Dates => "dates",
            Self::Amounts => "amounts",
            Self::Addresses => "addresses",
            Self::Organizations => "organizations",
            Self::Emails => "emails",
            Self::Phones => "phones",
        }
    }
}

impl std::fmt::Display for EntityCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EntityCategory {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| crate::Error::InvalidEntityType(s.to_string()))
    }
}

/// A typed fact found in a document's text.
///
/// `start_index`/`end_index` are byte offsets into the source text and always
/// fall on character boundaries. They are absent when the value could not be
/// found in the text (model output that paraphrases, for instance).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityMatch {
    pub entity_type: EntityCategory,
    pub value: String,
    pub confidence: f64,
    pub snippet: String,
    pub start_index: Option<usize>,
    pub end_index: Option<usize>,
}

impl EntityMatch {
    #[must_use]
    pub fn new(entity_type: EntityCategory, value: String, confidence: f64) -> Self {
        Self {
            entity_type,
            value,
            confidence: confidence.clamp(0.0, 1.0),
            snippet: String::new(),
            start_index: None,
            end_index: None,
        }
    }

    #[must_use]
    pub fn with_span(mut self, span: Option<(usize, usize)>) -> Self {
        self.start_index = span.map(|(start, _)| start);
        self.end_index = span.map(|(_, end)| end);
        self
    }

    #[must_use]
    pub fn with_snippet(mut self, snippet: String) -> Self {
        self.snippet = snippet;
        self
    }

    /// Identity used for deduplication: category plus lowercased value.
    #[must_use]
    pub fn key(&self) -> (EntityCategory, String) {
        (self.entity_type, self.value.to_lowercase())
    }
}

/// Highest confidence first, then category name and value ascending.
pub fn sort_matches(matches: &mut [EntityMatch]) {
    matches.sort_by(compare_matches);
}

fn compare_matches(a: &EntityMatch, b: &EntityMatch) -> Ordering {
    b.confidence
        .total_cmp(&a.confidence)
        .then_with(|| a.entity_type.as_str().cmp(b.entity_type.as_str()))
        .then_with(|| a.value.cmp(&b.value))
}
