use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::ingest::FileType;

pub const PREVIEW_CHARS: usize = 360;
/// Preview stored for documents with no extractable text.
pub const EMPTY_PREVIEW: &str = "No text extracted.";
const DEFAULT_GROUP: &str = "document";

static GROUP_INVALID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^a-z0-9_-]+").expect("static pattern"));
static STEM_INVALID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^a-z0-9]+").expect("static pattern"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisStatus {
    Pending,
    Processing,
    Complete,
    Failed,
}

impl AnalysisStatus {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Complete => "complete",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for AnalysisStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AnalysisStatus {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "processing" => Ok(Self::Processing),
            "complete" => Ok(Self::Complete),
            "failed" => Ok(Self::Failed),
            _ => Err(crate::Error::InvalidAnalysisStatus(s.to_string())),
        }
    }
}

/// An ingested file and its extracted text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: Uuid,
    pub filename: String,
    pub file_path: PathBuf,
    pub file_type: FileType,
    pub file_size: u64,
    pub checksum: String,
    pub uploaded_at: DateTime<Utc>,
    pub preview_text: String,
    pub full_text: String,
    pub version_group: String,
    pub version_number: u32,
    pub parent_document_id: Option<Uuid>,
    pub analysis_status: AnalysisStatus,
}

impl Document {
    /// Image payloads to forward to the model: the stored file itself for
    /// image documents whose file is still on disk.
    pub async fn image_payloads(&self) -> std::io::Result<Vec<Vec<u8>>> {
        if !self.file_type.is_image() {
            return Ok(Vec::new());
        }
        match tokio::fs::read(&self.file_path).await {
            Ok(bytes) => Ok(vec![bytes]),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e),
        }
    }
}

/// Listing view of a document, without its text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentSummary {
    pub id: Uuid,
    pub filename: String,
    pub file_type: FileType,
    pub file_size: u64,
    pub uploaded_at: DateTime<Utc>,
    pub preview_text: String,
    pub version_group: String,
    pub version_number: u32,
    pub analysis_status: AnalysisStatus,
    /// Brief summary from the latest auto-extraction, or empty.
    pub summary_brief: String,
}

impl DocumentSummary {
    #[must_use]
    pub fn new(document: &Document, summary_brief: String) -> Self {
        Self {
            id: document.id,
            filename: document.filename.clone(),
            file_type: document.file_type,
            file_size: document.file_size,
            uploaded_at: document.uploaded_at,
            preview_text: document.preview_text.clone(),
            version_group: document.version_group.clone(),
            version_number: document.version_number,
            analysis_status: document.analysis_status,
            summary_brief,
        }
    }
}

/// One member of a version group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionInfo {
    pub id: Uuid,
    pub filename: String,
    pub uploaded_at: DateTime<Utc>,
    pub version_number: u32,
    pub parent_document_id: Option<Uuid>,
}

/// Whitespace-collapsed text, cut to `max_chars` with a trailing `...`.
#[must_use]
pub fn build_preview(text: &str, max_chars: usize) -> String {
    let normalized = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if normalized.chars().count() <= max_chars {
        return normalized;
    }
    let head: String = normalized.chars().take(max_chars.saturating_sub(3)).collect();
    format!("{}...", head.trim_end())
}

/// Hex SHA-256 of the raw file bytes.
#[must_use]
pub fn checksum(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

/// Slug naming the version group a file belongs to.
///
/// An explicit group wins when it survives slugging; otherwise the file stem
/// is used, and `"document"` when that is empty too.
#[must_use]
pub fn clean_version_group(explicit: Option<&str>, filename: &str) -> String {
    if let Some(group) = explicit {
        let lowered = group.to_lowercase();
        let slug = GROUP_INVALID.replace_all(&lowered, "-");
        let slug = slug.trim_matches('-');
        if !slug.is_empty() {
            return slug.to_string();
        }
    }

    let stem = Path::new(filename)
        .file_stem()
        .map(|s| s.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    let slug = STEM_INVALID.replace_all(&stem, "-");
    let slug = slug.trim_matches('-');
    if slug.is_empty() {
        DEFAULT_GROUP.to_string()
    } else {
        slug.to_string()
    }
}
