mod chunker;
mod extractor;
mod normalizer;
mod parser;
mod pipeline;
mod span;

pub use chunker::{
    chunk_text, Chunk, ChunkError, ChunkResult, Chunker, DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE,
};
pub use extractor::{fallback_entities, ExtractionPattern, RuleBasedExtractor, FALLBACK_CONFIDENCE};
pub use normalizer::{normalize_entities, DEFAULT_MODEL_CONFIDENCE};
pub use parser::{DocumentParser, FileType, ParseError, ParseResult, ParsedDocument, Parser};
pub use pipeline::{
    ComparisonOutput, Dashboard, DashboardStats, DocumentDetail, DocumentPipeline, HealthReport,
    IngestOptions, IngestOutput, StoredFile, SummaryOutput, DASHBOARD_RECENT,
};
pub use span::{locate, snippet, SNIPPET_RADIUS};
