use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::entity::EntityMatch;

/// Level recorded for analyses that have only one flavor.
pub const DEFAULT_LEVEL: &str = "default";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisKind {
    AutoExtract,
    Summary,
    Comparison,
}

impl AnalysisKind {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::AutoExtract => "auto_extract",
            Self::Summary => "summary",
            Self::Comparison => "comparison",
        }
    }
}

impl std::fmt::Display for AnalysisKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AnalysisKind {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "auto_extract" => Ok(Self::AutoExtract),
            "summary" => Ok(Self::Summary),
            "comparison" => Ok(Self::Comparison),
            _ => Err(crate::Error::CorruptRow(format!("unknown analysis type {s}"))),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SummaryLevel {
    #[default]
    Brief,
    Detailed,
    Bullets,
}

impl SummaryLevel {
    pub const ALL: [Self; 3] = [Self::Brief, Self::Detailed, Self::Bullets];

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Brief => "brief",
            Self::Detailed => "detailed",
            Self::Bullets => "bullets",
        }
    }

    /// Instruction sent to the model for this level.
    #[must_use]
    pub const fn instruction(&self) -> &'static str {
        match self {
            Self::Brief => "Produce a concise 2-3 sentence summary.",
            Self::Detailed => "Produce a detailed summary in 3-6 paragraphs.",
            Self::Bullets => "Produce a concise bullet-point summary.",
        }
    }
}

impl std::fmt::Display for SummaryLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SummaryLevel {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|level| level.as_str() == s)
            .ok_or_else(|| crate::Error::InvalidSummaryLevel(s.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Summary {
    pub level: SummaryLevel,
    pub content: String,
    /// Populated only for [`SummaryLevel::Bullets`].
    pub bullets: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Change {
    #[serde(rename = "type")]
    pub change_type: String,
    pub description: String,
    pub impact: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonResult {
    pub summary: String,
    /// In `[0, 1]`, rounded to 4 decimals.
    pub similarity: f64,
    pub changes: Vec<Change>,
    pub diff_preview: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Highlight {
    pub label: String,
    pub value: String,
    pub snippet: String,
}

/// Everything the one-shot document analysis produces.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutoExtract {
    pub summary_brief: String,
    pub summary_detailed: String,
    pub bullet_points: Vec<String>,
    pub entities: Vec<EntityMatch>,
    pub highlights: Vec<Highlight>,
    /// Raw structured model reply, empty when the model was unusable.
    #[serde(default)]
    pub model_output: Map<String, Value>,
    #[serde(default)]
    pub model: Option<String>,
}

impl AutoExtract {
    /// Placeholder result recorded when analysis could not run at all.
    #[must_use]
    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            summary_brief: "Automatic AI extraction failed.".to_string(),
            summary_detailed: reason.into(),
            bullet_points: Vec::new(),
            entities: Vec::new(),
            highlights: Vec::new(),
            model_output: Map::new(),
            model: None,
        }
    }
}

/// A persisted analysis, payload kept as raw JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredAnalysis {
    pub analysis_type: AnalysisKind,
    pub level: String,
    pub result: Value,
    pub created_at: DateTime<Utc>,
}

impl StoredAnalysis {
    /// Decodes the payload; `None` if it no longer matches `T`.
    #[must_use]
    pub fn decode<T: serde::de::DeserializeOwned>(&self) -> Option<T> {
        serde_json::from_value(self.result.clone()).ok()
    }
}

/// Level under which a comparison is filed on the left document.
#[must_use]
pub fn comparison_level(right_id: Uuid) -> String {
    format!("against:{right_id}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_level_parsing() {
        assert_eq!("bullets".parse::<SummaryLevel>().unwrap(), SummaryLevel::Bullets);
        assert!(matches!(
            "short".parse::<SummaryLevel>(),
            Err(crate::Error::InvalidSummaryLevel(_))
        ));
        assert_eq!(SummaryLevel::default(), SummaryLevel::Brief);
    }

    #[test]
    fn test_change_serializes_type_key() {
        let change = Change {
            change_type: "added".into(),
            description: "new clause".into(),
            impact: "Review".into(),
        };
        let json = serde_json::to_value(&change).unwrap();
        assert_eq!(json["type"], "added");
    }

    #[test]
    fn test_comparison_level() {
        let id = Uuid::nil();
        assert_eq!(
            comparison_level(id),
            "against:00000000-0000-0000-0000-000000000000"
        );
    }

    #[test]
    fn test_stored_analysis_decode() {
        let stored = StoredAnalysis {
            analysis_type: AnalysisKind::Summary,
            level: "brief".into(),
            result: serde_json::json!({"level": "brief", "content": "x", "bullets": []}),
            created_at: Utc::now(),
        };
        let summary: Summary = stored.decode().unwrap();
        assert_eq!(summary.content, "x");
        assert!(stored.decode::<ComparisonResult>().is_none());
    }
}
