use thiserror::Error;
use uuid::Uuid;

use crate::ingest::{ChunkError, ParseError};

#[derive(Debug, Error)]
pub enum Error {
    #[error("Document not found: {0}")]
    DocumentNotFound(Uuid),

    #[error("Invalid entity type: {0}")]
    InvalidEntityType(String),

    #[error("Invalid summary level: {0} (expected brief, detailed or bullets)")]
    InvalidSummaryLevel(String),

    #[error("Invalid analysis status: {0}")]
    InvalidAnalysisStatus(String),

    #[error("Unsupported file type: {0} (allowed: .docx, .jpeg, .jpg, .pdf, .png, .txt)")]
    UnsupportedFileType(String),

    #[error("Unsupported export format: {0} (use json, csv, or report)")]
    UnsupportedExportFormat(String),

    #[error("Uploaded file is empty: {0}")]
    EmptyUpload(String),

    #[error("File exceeds max upload size of {max_mb}MB: {size} bytes")]
    UploadTooLarge { size: u64, max_mb: u64 },

    #[error("Stored file for document {0} no longer exists on disk")]
    StoredFileMissing(Uuid),

    #[error("No documents available for export")]
    NothingToExport,

    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("Chunking error: {0}")]
    Chunk(#[from] ChunkError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Corrupt stored value: {0}")]
    CorruptRow(String),
}

pub type Result<T> = std::result::Result<T, Error>;
