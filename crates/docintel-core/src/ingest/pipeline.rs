use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::chunker::{Chunk, Chunker};
use super::parser::{DocumentParser, FileType, ParsedDocument, Parser};
use crate::analysis::{
    comparison_level, AnalysisKind, AutoExtract, ComparisonResult, StoredAnalysis, Summary,
    SummaryLevel, DEFAULT_LEVEL,
};
use crate::config::AppConfig;
use crate::document::{
    build_preview, checksum, clean_version_group, AnalysisStatus, Document, DocumentSummary,
    VersionInfo, EMPTY_PREVIEW, PREVIEW_CHARS,
};
use crate::entity::EntityMatch;
use crate::generation::GeneratorHealth;
use crate::intelligence::DocumentIntelligence;
use crate::storage::Storage;
use crate::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestOptions {
    /// Explicit version group; derived from the file name when absent.
    pub version_group: Option<String>,
    pub parent_document_id: Option<Uuid>,
    pub auto_analyze: bool,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            version_group: None,
            parent_document_id: None,
            auto_analyze: true,
        }
    }
}

impl IngestOptions {
    #[must_use]
    pub fn with_version_group(mut self, group: impl Into<String>) -> Self {
        self.version_group = Some(group.into());
        self
    }

    #[must_use]
    pub const fn with_parent(mut self, parent: Uuid) -> Self {
        self.parent_document_id = Some(parent);
        self
    }

    #[must_use]
    pub const fn with_auto_analyze(mut self, auto_analyze: bool) -> Self {
        self.auto_analyze = auto_analyze;
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestOutput {
    pub document: DocumentSummary,
    pub analysis: Option<AutoExtract>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryOutput {
    pub document_id: Uuid,
    pub summary: Summary,
    pub created_at: DateTime<Utc>,
    pub cached: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComparisonOutput {
    pub left_document: DocumentSummary,
    pub right_document: DocumentSummary,
    pub comparison: ComparisonResult,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentDetail {
    pub document: DocumentSummary,
    pub full_text: String,
    pub entities: Vec<EntityMatch>,
    pub analyses: Vec<StoredAnalysis>,
    pub versions: Vec<VersionInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: String,
    pub generator: GeneratorHealth,
    pub documents: u64,
    pub supported_types: Vec<FileType>,
}

/// Documents listed on the dashboard.
pub const DASHBOARD_RECENT: usize = 8;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashboardStats {
    pub documents: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dashboard {
    pub stats: DashboardStats,
    /// Newest uploads first.
    pub recent_documents: Vec<DocumentSummary>,
}

/// The original upload as it was stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredFile {
    pub filename: String,
    pub media_type: &'static str,
    pub content: Vec<u8>,
}

/// Ingests files and serves analyses over the result store.
///
/// Holds no locks: two concurrent analyses of the same document both run and
/// both write. Callers that need at-most-once analysis must serialize
/// themselves.
pub struct DocumentPipeline {
    storage: Storage,
    intelligence: DocumentIntelligence,
    config: AppConfig,
    parser: Box<dyn Parser>,
    chunker: Chunker,
}

impl DocumentPipeline {
    #[must_use]
    pub fn new(storage: Storage, intelligence: DocumentIntelligence, config: AppConfig) -> Self {
        Self {
            storage,
            intelligence,
            config,
            parser: Box::new(DocumentParser::new()),
            chunker: Chunker::default(),
        }
    }

    #[must_use]
    pub fn with_parser(mut self, parser: Box<dyn Parser>) -> Self {
        self.parser = parser;
        self
    }

    #[must_use]
    pub const fn with_chunker(mut self, chunker: Chunker) -> Self {
        self.chunker = chunker;
        self
    }

    #[must_use]
    pub const fn storage(&self) -> &Storage {
        &self.storage
    }

    #[must_use]
    pub const fn config(&self) -> &AppConfig {
        &self.config
    }

    pub async fn ingest_file(&self, path: &Path, options: IngestOptions) -> Result<IngestOutput> {
        let filename = path
            .file_name()
            .map_or_else(|| "uploaded-file".to_string(), |n| n.to_string_lossy().into_owned());
        let bytes = tokio::fs::read(path).await?;
        self.ingest_bytes(&filename, bytes, options).await
    }

    /// Validates, stores and extracts one upload, then optionally analyzes it.
    ///
    /// Analysis failures do not fail the ingest: the document is marked
    /// `failed` and the returned analysis describes the error.
    pub async fn ingest_bytes(
        &self,
        filename: &str,
        bytes: Vec<u8>,
        options: IngestOptions,
    ) -> Result<IngestOutput> {
        let file_type = FileType::from_path(Path::new(filename)).ok_or_else(|| {
            let ext = Path::new(filename)
                .extension()
                .map_or_else(|| filename.to_string(), |e| format!(".{}", e.to_string_lossy()));
            Error::UnsupportedFileType(ext)
        })?;
        if !self.parser.can_parse(file_type) {
            return Err(Error::UnsupportedFileType(format!(".{file_type}")));
        }

        if bytes.is_empty() {
            return Err(Error::EmptyUpload(filename.to_string()));
        }
        let size = bytes.len() as u64;
        if size > self.config.max_upload_bytes {
            return Err(Error::UploadTooLarge {
                size,
                max_mb: self.config.max_upload_mb(),
            });
        }

        if let Some(parent) = options.parent_document_id {
            self.storage.get_document(parent).await?;
        }

        let id = Uuid::now_v7();
        let stored_path = self.store_upload(id, file_type, &bytes).await?;

        let (document, images) = match self
            .record_upload(id, filename, file_type, &bytes, stored_path.clone(), &options)
            .await
        {
            Ok(recorded) => recorded,
            Err(e) => {
                self.discard_upload(id, &stored_path).await;
                return Err(e);
            }
        };

        tracing::info!(
            id = %id,
            filename,
            file_type = %file_type,
            version = document.version_number,
            group = %document.version_group,
            "document ingested"
        );

        let analysis = if options.auto_analyze {
            match self.run_analysis(&document, images).await {
                Ok(result) => Some(result),
                Err(e) => {
                    tracing::warn!(id = %id, error = %e, "automatic analysis failed");
                    self.storage
                        .set_analysis_status(id, AnalysisStatus::Failed)
                        .await?;
                    Some(AutoExtract::failed(e.to_string()))
                }
            }
        } else {
            None
        };

        let document = self.storage.get_document(id).await?;
        Ok(IngestOutput {
            document: self.document_summary(&document).await?,
            analysis,
        })
    }

    /// Parses the stored upload and writes its document row and chunks.
    async fn record_upload(
        &self,
        id: Uuid,
        filename: &str,
        file_type: FileType,
        bytes: &[u8],
        stored_path: PathBuf,
        options: &IngestOptions,
    ) -> Result<(Document, Vec<Vec<u8>>)> {
        let ParsedDocument { full_text, images } = self.parser.parse_bytes(bytes, file_type)?;

        let version_group = clean_version_group(options.version_group.as_deref(), filename);
        let version_number = self.storage.next_version_number(&version_group).await?;

        let document = Document {
            id,
            filename: filename.to_string(),
            file_path: stored_path,
            file_type,
            file_size: bytes.len() as u64,
            checksum: checksum(bytes),
            uploaded_at: Utc::now(),
            preview_text: if full_text.is_empty() {
                EMPTY_PREVIEW.to_string()
            } else {
                build_preview(&full_text, PREVIEW_CHARS)
            },
            full_text,
            version_group,
            version_number,
            parent_document_id: options.parent_document_id,
            analysis_status: if options.auto_analyze {
                AnalysisStatus::Processing
            } else {
                AnalysisStatus::Pending
            },
        };
        self.storage.insert_document(&document).await?;

        if !document.full_text.is_empty() {
            let chunks = self.chunker.chunk(&document.full_text);
            self.storage.replace_chunks(id, &chunks).await?;
        }

        Ok((document, images))
    }

    /// Best-effort removal of a half-recorded upload: its row, if one was
    /// written, and the stored file.
    async fn discard_upload(&self, id: Uuid, stored_path: &Path) {
        match self.storage.delete_document(id).await {
            Ok(()) | Err(Error::DocumentNotFound(_)) => {}
            Err(e) => tracing::warn!(id = %id, error = %e, "could not remove partial document row"),
        }
        if let Err(e) = tokio::fs::remove_file(stored_path).await {
            tracing::warn!(path = %stored_path.display(), error = %e, "could not remove stored upload");
        }
    }

    async fn store_upload(&self, id: Uuid, file_type: FileType, bytes: &[u8]) -> Result<PathBuf> {
        let dir = self.config.upload_dir();
        tokio::fs::create_dir_all(&dir).await?;
        let path = dir.join(format!("{id}.{}", file_type.as_str()));
        tokio::fs::write(&path, bytes).await?;
        Ok(path)
    }

    async fn run_analysis(&self, document: &Document, images: Vec<Vec<u8>>) -> Result<AutoExtract> {
        let result = self
            .intelligence
            .analyze(&document.full_text, &document.filename, images)
            .await;

        self.storage
            .save_analysis(
                document.id,
                AnalysisKind::AutoExtract,
                DEFAULT_LEVEL,
                &serde_json::to_value(&result)?,
            )
            .await?;
        self.storage
            .replace_entities(document.id, &result.entities)
            .await?;
        self.storage
            .set_analysis_status(document.id, AnalysisStatus::Complete)
            .await?;

        Ok(result)
    }

    /// Re-runs auto-extraction and supersedes the document's entities.
    pub async fn analyze(&self, id: Uuid) -> Result<AutoExtract> {
        let document = self.storage.get_document(id).await?;
        let images = document.image_payloads().await?;
        self.run_analysis(&document, images).await
    }

    /// Cached summary at `level` unless `refresh` is set.
    pub async fn summary(&self, id: Uuid, level: SummaryLevel, refresh: bool) -> Result<SummaryOutput> {
        let document = self.storage.get_document(id).await?;

        if !refresh {
            let cached = self
                .storage
                .latest_analysis(id, AnalysisKind::Summary, Some(level.as_str()))
                .await?;
            if let Some(stored) = cached {
                if let Some(summary) = stored.decode::<Summary>() {
                    tracing::debug!(id = %id, %level, "serving cached summary");
                    return Ok(SummaryOutput {
                        document_id: id,
                        summary,
                        created_at: stored.created_at,
                        cached: true,
                    });
                }
                tracing::warn!(id = %id, %level, "cached summary is unreadable, recomputing");
            }
        }

        let summary = self.intelligence.summarize(&document.full_text, level).await;
        let stored = self
            .storage
            .save_analysis(
                id,
                AnalysisKind::Summary,
                level.as_str(),
                &serde_json::to_value(&summary)?,
            )
            .await?;

        Ok(SummaryOutput {
            document_id: id,
            summary,
            created_at: stored.created_at,
            cached: false,
        })
    }

    /// Compares two documents and files the result on the left one.
    pub async fn compare(&self, left_id: Uuid, right_id: Uuid) -> Result<ComparisonOutput> {
        let left = self.storage.get_document(left_id).await?;
        let right = self.storage.get_document(right_id).await?;

        let comparison = self
            .intelligence
            .compare(&left.filename, &left.full_text, &right.filename, &right.full_text)
            .await;

        self.storage
            .save_analysis(
                left.id,
                AnalysisKind::Comparison,
                &comparison_level(right.id),
                &serde_json::to_value(&comparison)?,
            )
            .await?;

        Ok(ComparisonOutput {
            left_document: self.document_summary(&left).await?,
            right_document: self.document_summary(&right).await?,
            comparison,
        })
    }

    pub(crate) async fn document_summary(&self, document: &Document) -> Result<DocumentSummary> {
        let summary_brief = self
            .latest_auto_extract(document.id)
            .await?
            .and_then(|result| {
                result
                    .get("summary_brief")
                    .and_then(serde_json::Value::as_str)
                    .map(String::from)
            })
            .unwrap_or_default();
        Ok(DocumentSummary::new(document, summary_brief))
    }

    pub(crate) async fn latest_auto_extract(&self, id: Uuid) -> Result<Option<serde_json::Value>> {
        Ok(self
            .storage
            .latest_analysis(id, AnalysisKind::AutoExtract, None)
            .await?
            .map(|stored| stored.result))
    }

    pub async fn list_documents(&self) -> Result<Vec<DocumentSummary>> {
        let mut out = Vec::new();
        for document in self.storage.list_documents().await? {
            out.push(self.document_summary(&document).await?);
        }
        Ok(out)
    }

    pub async fn document_detail(&self, id: Uuid) -> Result<DocumentDetail> {
        let document = self.storage.get_document(id).await?;

        Ok(DocumentDetail {
            document: self.document_summary(&document).await?,
            entities: self.storage.list_entities(id).await?,
            analyses: self.storage.list_analyses(id).await?,
            versions: self.storage.list_versions(&document.version_group).await?,
            full_text: document.full_text,
        })
    }

    /// Deletes the stored file and every row belonging to the document.
    pub async fn delete_document(&self, id: Uuid) -> Result<()> {
        let document = self.storage.get_document(id).await?;

        match tokio::fs::remove_file(&document.file_path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %document.file_path.display(), "stored file already gone");
            }
            Err(e) => return Err(e.into()),
        }

        self.storage.delete_document(id).await?;
        tracing::info!(id = %id, "document deleted");
        Ok(())
    }

    pub async fn versions(&self, id: Uuid) -> Result<Vec<VersionInfo>> {
        let document = self.storage.get_document(id).await?;
        self.storage.list_versions(&document.version_group).await
    }

    pub async fn chunks(&self, id: Uuid) -> Result<Vec<Chunk>> {
        self.storage.get_document(id).await?;
        self.storage.list_chunks(id).await
    }

    pub async fn entities(&self, id: Uuid) -> Result<Vec<EntityMatch>> {
        self.storage.get_document(id).await?;
        self.storage.list_entities(id).await
    }

    pub async fn dashboard(&self) -> Result<Dashboard> {
        let mut recent_documents = Vec::new();
        for document in self.storage.list_recent_documents(DASHBOARD_RECENT).await? {
            recent_documents.push(self.document_summary(&document).await?);
        }

        Ok(Dashboard {
            stats: DashboardStats {
                documents: self.storage.count_documents().await?,
            },
            recent_documents,
        })
    }

    /// Reads back the stored original of a document.
    pub async fn document_file(&self, id: Uuid) -> Result<StoredFile> {
        let document = self.storage.get_document(id).await?;
        let content = match tokio::fs::read(&document.file_path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::StoredFileMissing(id));
            }
            Err(e) => return Err(e.into()),
        };

        Ok(StoredFile {
            media_type: document.file_type.media_type(),
            filename: document.filename,
            content,
        })
    }

    pub async fn health(&self) -> Result<HealthReport> {
        Ok(HealthReport {
            status: "ok".to_string(),
            generator: self.intelligence.generator().health().await,
            documents: self.storage.count_documents().await?,
            supported_types: FileType::ALL.to_vec(),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;
    use tempfile::TempDir;

    use super::*;
    use crate::generation::testing::{Scripted, ScriptedGenerator};
    use crate::generation::{Generator, OfflineGenerator};

    const CONTRACT_V1: &str = "Lease Agreement\n\nTenant: Jane Doe\nRent: $900 per month\nContact jane@example.com";
    const CONTRACT_V2: &str = "Lease Agreement\n\nTenant: Jane Doe\nRent: $950 per month\nContact jane@example.com";

    async fn pipeline_with(generator: Arc<dyn Generator>) -> (DocumentPipeline, TempDir) {
        let dir = TempDir::new().unwrap();
        let config = AppConfig::with_data_dir(dir.path());
        let storage = Storage::open_memory().await.unwrap();
        let intelligence = DocumentIntelligence::new(generator);
        (DocumentPipeline::new(storage, intelligence, config), dir)
    }

    async fn offline_pipeline() -> (DocumentPipeline, TempDir) {
        pipeline_with(Arc::new(OfflineGenerator)).await
    }

    #[tokio::test]
    async fn test_ingest_with_analysis() {
        let (pipeline, _dir) = offline_pipeline().await;
        let output = pipeline
            .ingest_bytes("Lease.txt", CONTRACT_V1.as_bytes().to_vec(), IngestOptions::default())
            .await
            .unwrap();

        let doc = &output.document;
        assert_eq!(doc.version_group, "lease");
        assert_eq!(doc.version_number, 1);
        assert_eq!(doc.analysis_status, AnalysisStatus::Complete);
        assert_eq!(doc.summary_brief, output.analysis.as_ref().unwrap().summary_brief);

        let stored = pipeline.storage().get_document(doc.id).await.unwrap();
        assert!(stored.file_path.exists());
        assert_eq!(std::fs::read_to_string(&stored.file_path).unwrap(), CONTRACT_V1);

        let chunks = pipeline.chunks(doc.id).await.unwrap();
        assert_eq!(chunks.len(), 1);

        let entities = pipeline.entities(doc.id).await.unwrap();
        assert!(entities.iter().any(|e| e.value == "jane@example.com"));
    }

    #[tokio::test]
    async fn test_ingest_without_analysis_is_pending() {
        let (pipeline, _dir) = offline_pipeline().await;
        let output = pipeline
            .ingest_bytes(
                "notes.txt",
                b"hello".to_vec(),
                IngestOptions::default().with_auto_analyze(false),
            )
            .await
            .unwrap();

        assert!(output.analysis.is_none());
        assert_eq!(output.document.analysis_status, AnalysisStatus::Pending);
        assert!(output.document.summary_brief.is_empty());
    }

    #[tokio::test]
    async fn test_upload_validation() {
        let (pipeline, _dir) = offline_pipeline().await;

        assert!(matches!(
            pipeline.ingest_bytes("a.exe", b"x".to_vec(), IngestOptions::default()).await,
            Err(Error::UnsupportedFileType(ext)) if ext == ".exe"
        ));
        assert!(matches!(
            pipeline.ingest_bytes("a.txt", Vec::new(), IngestOptions::default()).await,
            Err(Error::EmptyUpload(_))
        ));
        assert!(matches!(
            pipeline
                .ingest_bytes("a.txt", b"x".to_vec(), IngestOptions::default().with_parent(Uuid::now_v7()))
                .await,
            Err(Error::DocumentNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_upload_size_limit() {
        let dir = TempDir::new().unwrap();
        let mut config = AppConfig::with_data_dir(dir.path());
        config.max_upload_bytes = 4;
        let pipeline = DocumentPipeline::new(
            Storage::open_memory().await.unwrap(),
            DocumentIntelligence::new(Arc::new(OfflineGenerator)),
            config,
        );

        assert!(matches!(
            pipeline.ingest_bytes("a.txt", b"12345".to_vec(), IngestOptions::default()).await,
            Err(Error::UploadTooLarge { size: 5, .. })
        ));
    }

    #[tokio::test]
    async fn test_versions_and_compare() {
        let (pipeline, _dir) = offline_pipeline().await;
        let v1 = pipeline
            .ingest_bytes("lease.txt", CONTRACT_V1.as_bytes().to_vec(), IngestOptions::default())
            .await
            .unwrap()
            .document;
        let v2 = pipeline
            .ingest_bytes(
                "lease-final.txt",
                CONTRACT_V2.as_bytes().to_vec(),
                IngestOptions::default().with_version_group("Lease").with_parent(v1.id),
            )
            .await
            .unwrap()
            .document;

        assert_eq!(v2.version_number, 2);
        let versions = pipeline.versions(v1.id).await.unwrap();
        assert_eq!(versions.iter().map(|v| v.id).collect::<Vec<_>>(), vec![v1.id, v2.id]);
        assert_eq!(versions[1].parent_document_id, Some(v1.id));

        let output = pipeline.compare(v1.id, v2.id).await.unwrap();
        let kinds: Vec<_> = output
            .comparison
            .changes
            .iter()
            .map(|c| c.change_type.as_str())
            .collect();
        assert!(kinds.contains(&"removed"));
        assert!(kinds.contains(&"added"));

        let saved = pipeline
            .storage()
            .latest_analysis(v1.id, AnalysisKind::Comparison, None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(saved.level, comparison_level(v2.id));
    }

    #[tokio::test]
    async fn test_summary_is_cached_until_refresh() {
        let generator = Arc::new(ScriptedGenerator::new(vec![
            Scripted::Fail,
            Scripted::Text("First model summary.".into()),
            Scripted::Text("Second model summary.".into()),
        ]));
        let (pipeline, _dir) = pipeline_with(generator.clone()).await;
        let id = pipeline
            .ingest_bytes("memo.txt", b"Quarterly memo. Sales rose.".to_vec(), IngestOptions::default())
            .await
            .unwrap()
            .document
            .id;

        let first = pipeline.summary(id, SummaryLevel::Brief, false).await.unwrap();
        assert!(!first.cached);
        assert_eq!(first.summary.content, "First model summary.");

        let second = pipeline.summary(id, SummaryLevel::Brief, false).await.unwrap();
        assert!(second.cached);
        assert_eq!(second.summary.content, "First model summary.");

        let refreshed = pipeline.summary(id, SummaryLevel::Brief, true).await.unwrap();
        assert!(!refreshed.cached);
        assert_eq!(refreshed.summary.content, "Second model summary.");

        assert_eq!(generator.requests().len(), 3);
    }

    #[tokio::test]
    async fn test_reanalysis_supersedes_entities() {
        let generator = Arc::new(ScriptedGenerator::new(vec![
            Scripted::Fail,
            Scripted::Structured(
                json!({"entities": {"names": ["Jane Doe"]}})
                    .as_object()
                    .cloned()
                    .unwrap(),
            ),
        ]));
        let (pipeline, _dir) = pipeline_with(generator).await;
        let id = pipeline
            .ingest_bytes("lease.txt", CONTRACT_V1.as_bytes().to_vec(), IngestOptions::default())
            .await
            .unwrap()
            .document
            .id;
        assert!(pipeline.entities(id).await.unwrap().len() > 1);

        pipeline.analyze(id).await.unwrap();
        let entities = pipeline.entities(id).await.unwrap();
        assert_eq!(entities.len(), 1);
        assert_eq!(entities[0].value, "Jane Doe");
    }

    #[tokio::test]
    async fn test_detail_and_delete() {
        let (pipeline, _dir) = offline_pipeline().await;
        let id = pipeline
            .ingest_bytes("lease.txt", CONTRACT_V1.as_bytes().to_vec(), IngestOptions::default())
            .await
            .unwrap()
            .document
            .id;
        pipeline.summary(id, SummaryLevel::Bullets, false).await.unwrap();

        let detail = pipeline.document_detail(id).await.unwrap();
        assert_eq!(detail.full_text, CONTRACT_V1);
        assert_eq!(detail.analyses.len(), 2);
        assert_eq!(detail.analyses[0].analysis_type, AnalysisKind::Summary);
        assert_eq!(detail.versions.len(), 1);

        let path = pipeline.storage().get_document(id).await.unwrap().file_path;
        pipeline.delete_document(id).await.unwrap();
        assert!(!path.exists());
        assert!(pipeline.list_documents().await.unwrap().is_empty());
        assert!(matches!(
            pipeline.document_detail(id).await,
            Err(Error::DocumentNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_image_upload_forwards_bytes() {
        let generator = Arc::new(ScriptedGenerator::default());
        let (pipeline, _dir) = pipeline_with(generator.clone()).await;
        let png = vec![0x89, b'P', b'N', b'G'];
        let output = pipeline
            .ingest_bytes("scan.PNG", png.clone(), IngestOptions::default())
            .await
            .unwrap();

        assert_eq!(output.document.preview_text, EMPTY_PREVIEW);
        assert_eq!(generator.requests()[0].images, vec![png.clone()]);

        pipeline.analyze(output.document.id).await.unwrap();
        assert_eq!(generator.requests()[1].images, vec![png]);
    }

    #[tokio::test]
    async fn test_health_report() {
        let (pipeline, _dir) = offline_pipeline().await;
        let report = pipeline.health().await.unwrap();

        assert_eq!(report.status, "ok");
        assert!(!report.generator.available);
        assert_eq!(report.documents, 0);
        assert_eq!(report.supported_types.len(), 6);
    }

    /// Accepts plain text only.
    struct TextOnlyParser;

    impl Parser for TextOnlyParser {
        fn supported_types(&self) -> &[FileType] {
            &[FileType::Txt]
        }

        fn parse_bytes(
            &self,
            data: &[u8],
            file_type: FileType,
        ) -> crate::ingest::ParseResult<ParsedDocument> {
            DocumentParser::new().parse_bytes(data, file_type)
        }
    }

    fn stored_uploads(pipeline: &DocumentPipeline) -> usize {
        std::fs::read_dir(pipeline.config().upload_dir())
            .map(Iterator::count)
            .unwrap_or(0)
    }

    #[tokio::test]
    async fn test_parser_decides_accepted_types() {
        let (pipeline, _dir) = offline_pipeline().await;
        let pipeline = pipeline.with_parser(Box::new(TextOnlyParser));

        assert!(matches!(
            pipeline.ingest_bytes("scan.png", vec![1, 2, 3], IngestOptions::default()).await,
            Err(Error::UnsupportedFileType(ext)) if ext == ".png"
        ));
        assert_eq!(stored_uploads(&pipeline), 0);
        assert!(pipeline
            .ingest_bytes("notes.txt", b"fine".to_vec(), IngestOptions::default())
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_configured_chunk_window() {
        let dir = TempDir::new().unwrap();
        let mut config = AppConfig::with_data_dir(dir.path());
        config.chunk_size = 40;
        config.chunk_overlap = 10;
        let chunker = config.chunker().unwrap();
        let pipeline = DocumentPipeline::new(
            Storage::open_memory().await.unwrap(),
            DocumentIntelligence::new(Arc::new(OfflineGenerator)),
            config,
        )
        .with_chunker(chunker);

        let text = "x".repeat(200);
        let id = pipeline
            .ingest_bytes("long.txt", text.into_bytes(), IngestOptions::default().with_auto_analyze(false))
            .await
            .unwrap()
            .document
            .id;

        let chunks = pipeline.chunks(id).await.unwrap();
        assert_eq!(chunks.len(), 7);
        assert!(chunks.iter().all(|c| c.content.chars().count() <= 40));
    }

    #[tokio::test]
    async fn test_failed_ingest_removes_stored_upload() {
        let (pipeline, _dir) = offline_pipeline().await;

        assert!(matches!(
            pipeline.ingest_bytes("broken.docx", b"not a zip".to_vec(), IngestOptions::default()).await,
            Err(Error::Parse(_))
        ));
        assert_eq!(stored_uploads(&pipeline), 0);

        pipeline.storage().close().await;
        assert!(matches!(
            pipeline.ingest_bytes("notes.txt", b"hello".to_vec(), IngestOptions::default()).await,
            Err(Error::Database(_))
        ));
        assert_eq!(stored_uploads(&pipeline), 0);
    }

    #[tokio::test]
    async fn test_dashboard_lists_recent_documents() {
        let (pipeline, _dir) = offline_pipeline().await;
        for i in 0..9 {
            pipeline
                .ingest_bytes(
                    &format!("doc{i}.txt"),
                    format!("Document number {i}.").into_bytes(),
                    IngestOptions::default().with_auto_analyze(false),
                )
                .await
                .unwrap();
        }

        let dashboard = pipeline.dashboard().await.unwrap();
        assert_eq!(dashboard.stats.documents, 9);
        assert_eq!(dashboard.recent_documents.len(), DASHBOARD_RECENT);
        assert_eq!(dashboard.recent_documents[0].filename, "doc8.txt");
        assert_eq!(dashboard.recent_documents[7].filename, "doc1.txt");

        let json = serde_json::to_value(&dashboard).unwrap();
        assert_eq!(json["stats"]["documents"], 9);
    }

    #[tokio::test]
    async fn test_document_file_returns_stored_original() {
        let (pipeline, _dir) = offline_pipeline().await;
        let id = pipeline
            .ingest_bytes("lease.txt", CONTRACT_V1.as_bytes().to_vec(), IngestOptions::default())
            .await
            .unwrap()
            .document
            .id;

        let file = pipeline.document_file(id).await.unwrap();
        assert_eq!(file.filename, "lease.txt");
        assert_eq!(file.media_type, "text/plain");
        assert_eq!(file.content, CONTRACT_V1.as_bytes());

        let path = pipeline.storage().get_document(id).await.unwrap().file_path;
        std::fs::remove_file(path).unwrap();
        assert!(matches!(
            pipeline.document_file(id).await,
            Err(Error::StoredFileMissing(missing)) if missing == id
        ));
    }
}
