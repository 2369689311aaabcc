pub mod analysis;
pub mod config;
pub mod document;
pub mod entity;
pub mod error;
pub mod export;
pub mod generation;
pub mod ingest;
pub mod intelligence;
pub mod storage;

pub use analysis::{
    AnalysisKind, AutoExtract, Change, ComparisonResult, Highlight, StoredAnalysis, Summary,
    SummaryLevel,
};
pub use config::{AppConfig, GenerationConfig};
pub use document::{AnalysisStatus, Document, DocumentSummary, VersionInfo};
pub use entity::{EntityCategory, EntityMatch};
pub use error::{Error, Result};
pub use export::{ExportFile, ExportFormat};
pub use generation::{
    GenerationError, GenerationRequest, GenerationResult, Generator, GeneratorHealth,
    OfflineGenerator, OllamaClient,
};
pub use ingest::{
    Chunk, Chunker, Dashboard, DocumentPipeline, FileType, IngestOptions, IngestOutput, ParseError,
    StoredFile,
};
pub use intelligence::DocumentIntelligence;
pub use storage::Storage;
