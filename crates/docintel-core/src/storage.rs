use std::path::{Path, PathBuf};

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    Pool, Sqlite,
};
use uuid::Uuid;

use crate::{
    analysis::{AnalysisKind, StoredAnalysis},
    document::{AnalysisStatus, Document, VersionInfo},
    entity::EntityMatch,
    ingest::Chunk,
    Error, Result,
};

const INIT_SQL: &str = r"
CREATE TABLE IF NOT EXISTS documents (
    id TEXT PRIMARY KEY,
    filename TEXT NOT NULL,
    file_path TEXT NOT NULL,
    file_type TEXT NOT NULL,
    file_size INTEGER NOT NULL,
    checksum TEXT NOT NULL,
    uploaded_at TEXT NOT NULL,
    preview_text TEXT NOT NULL,
    full_text TEXT NOT NULL,
    version_group TEXT NOT NULL,
    version_number INTEGER NOT NULL,
    parent_document_id TEXT,
    analysis_status TEXT NOT NULL DEFAULT 'pending'
);

CREATE INDEX IF NOT EXISTS idx_documents_uploaded_at ON documents(uploaded_at DESC);
CREATE INDEX IF NOT EXISTS idx_documents_group ON documents(version_group, version_number);

CREATE TABLE IF NOT EXISTS document_chunks (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    document_id TEXT NOT NULL REFERENCES documents(id) ON DELETE CASCADE,
    chunk_index INTEGER NOT NULL,
    content TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_chunks_document ON document_chunks(document_id, chunk_index);

CREATE TABLE IF NOT EXISTS document_analyses (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    document_id TEXT NOT NULL REFERENCES documents(id) ON DELETE CASCADE,
    analysis_type TEXT NOT NULL,
    level TEXT NOT NULL,
    result_json TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_analyses_doc_type ON document_analyses(document_id, analysis_type, level);

CREATE TABLE IF NOT EXISTS document_entities (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    document_id TEXT NOT NULL REFERENCES documents(id) ON DELETE CASCADE,
    entity_type TEXT NOT NULL,
    entity_value TEXT NOT NULL,
    confidence REAL NOT NULL,
    snippet TEXT NOT NULL,
    start_index INTEGER,
    end_index INTEGER,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_entities_document ON document_entities(document_id, entity_type);
";

const DOCUMENT_COLUMNS: &str = "id, filename, file_path, file_type, file_size, checksum, uploaded_at, \
     preview_text, full_text, version_group, version_number, parent_document_id, analysis_status";

type DocumentRow = (
    String,
    String,
    String,
    String,
    i64,
    String,
    String,
    String,
    String,
    String,
    i64,
    Option<String>,
    String,
);

type AnalysisRow = (String, String, String, String);

type EntityRow = (String, String, f64, String, Option<i64>, Option<i64>);

fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub struct Storage {
    pool: Pool<Sqlite>,
}

impl Storage {
    pub async fn open(path: &Path) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        sqlx::query(INIT_SQL).execute(&pool).await?;

        Ok(Self { pool })
    }

    pub async fn open_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;

        sqlx::query(INIT_SQL).execute(&pool).await?;

        Ok(Self { pool })
    }

    /// Waits for in-flight queries and closes every connection.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    // Document operations

    pub async fn insert_document(&self, document: &Document) -> Result<()> {
        sqlx::query(&format!(
            "INSERT INTO documents ({DOCUMENT_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
        ))
        .bind(document.id.to_string())
        .bind(&document.filename)
        .bind(document.file_path.to_string_lossy().into_owned())
        .bind(document.file_type.as_str())
        .bind(i64::try_from(document.file_size).unwrap_or(i64::MAX))
        .bind(&document.checksum)
        .bind(timestamp(document.uploaded_at))
        .bind(&document.preview_text)
        .bind(&document.full_text)
        .bind(&document.version_group)
        .bind(i64::from(document.version_number))
        .bind(document.parent_document_id.map(|id| id.to_string()))
        .bind(document.analysis_status.as_str())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn get_document(&self, id: Uuid) -> Result<Document> {
        let row: DocumentRow =
            sqlx::query_as(&format!("SELECT {DOCUMENT_COLUMNS} FROM documents WHERE id = ?"))
                .bind(id.to_string())
                .fetch_optional(&self.pool)
                .await?
                .ok_or(Error::DocumentNotFound(id))?;

        parse_document_row(row)
    }

    /// Newest upload first.
    pub async fn list_documents(&self) -> Result<Vec<Document>> {
        let rows: Vec<DocumentRow> = sqlx::query_as(&format!(
            "SELECT {DOCUMENT_COLUMNS} FROM documents ORDER BY uploaded_at DESC, id DESC"
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(parse_document_row).collect()
    }

    /// The `limit` newest uploads.
    pub async fn list_recent_documents(&self, limit: usize) -> Result<Vec<Document>> {
        let rows: Vec<DocumentRow> = sqlx::query_as(&format!(
            "SELECT {DOCUMENT_COLUMNS} FROM documents ORDER BY uploaded_at DESC, id DESC LIMIT ?"
        ))
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(parse_document_row).collect()
    }

    pub async fn count_documents(&self) -> Result<u64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM documents")
            .fetch_one(&self.pool)
            .await?;
        Ok(u64::try_from(count).unwrap_or_default())
    }

    /// Removes the document row; chunks, analyses and entities cascade.
    pub async fn delete_document(&self, id: Uuid) -> Result<()> {
        let result = sqlx::query("DELETE FROM documents WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(Error::DocumentNotFound(id));
        }

        Ok(())
    }

    pub async fn set_analysis_status(&self, id: Uuid, status: AnalysisStatus) -> Result<()> {
        let result = sqlx::query("UPDATE documents SET analysis_status = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(Error::DocumentNotFound(id));
        }

        Ok(())
    }

    // Version operations

    pub async fn next_version_number(&self, version_group: &str) -> Result<u32> {
        let (max,): (Option<i64>,) =
            sqlx::query_as("SELECT MAX(version_number) FROM documents WHERE version_group = ?")
                .bind(version_group)
                .fetch_one(&self.pool)
                .await?;

        let current = u32::try_from(max.unwrap_or(0))
            .map_err(|_| Error::CorruptRow(format!("version number in group {version_group}")))?;
        Ok(current + 1)
    }

    /// Members of a version group, oldest version first.
    pub async fn list_versions(&self, version_group: &str) -> Result<Vec<VersionInfo>> {
        let rows: Vec<(String, String, String, i64, Option<String>)> = sqlx::query_as(
            r"
            SELECT id, filename, uploaded_at, version_number, parent_document_id
            FROM documents
            WHERE version_group = ?
            ORDER BY version_number ASC, uploaded_at ASC
            ",
        )
        .bind(version_group)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|(id, filename, uploaded_at, version_number, parent)| {
                Ok(VersionInfo {
                    id: parse_uuid(&id)?,
                    filename,
                    uploaded_at: parse_timestamp(&uploaded_at)?,
                    version_number: parse_version(version_number)?,
                    parent_document_id: parent.as_deref().map(parse_uuid).transpose()?,
                })
            })
            .collect()
    }

    // Chunk operations

    pub async fn replace_chunks(&self, document_id: Uuid, chunks: &[Chunk]) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM document_chunks WHERE document_id = ?")
            .bind(document_id.to_string())
            .execute(&mut *tx)
            .await?;

        for chunk in chunks {
            sqlx::query(
                "INSERT INTO document_chunks (document_id, chunk_index, content) VALUES (?, ?, ?)",
            )
            .bind(document_id.to_string())
            .bind(i64::try_from(chunk.index).unwrap_or(i64::MAX))
            .bind(&chunk.content)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    pub async fn list_chunks(&self, document_id: Uuid) -> Result<Vec<Chunk>> {
        let rows: Vec<(i64, String)> = sqlx::query_as(
            "SELECT chunk_index, content FROM document_chunks WHERE document_id = ? ORDER BY chunk_index",
        )
        .bind(document_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|(index, content)| {
                let index = usize::try_from(index)
                    .map_err(|_| Error::CorruptRow(format!("chunk index {index}")))?;
                Ok(Chunk { index, content })
            })
            .collect()
    }

    // Analysis operations

    /// Appends a result; earlier results for the same key are kept.
    pub async fn save_analysis(
        &self,
        document_id: Uuid,
        kind: AnalysisKind,
        level: &str,
        result: &Value,
    ) -> Result<StoredAnalysis> {
        let created_at = Utc::now();

        sqlx::query(
            r"
            INSERT INTO document_analyses (document_id, analysis_type, level, result_json, created_at)
            VALUES (?, ?, ?, ?, ?)
            ",
        )
        .bind(document_id.to_string())
        .bind(kind.as_str())
        .bind(level)
        .bind(serde_json::to_string(result)?)
        .bind(timestamp(created_at))
        .execute(&self.pool)
        .await?;

        Ok(StoredAnalysis {
            analysis_type: kind,
            level: level.to_string(),
            result: result.clone(),
            created_at,
        })
    }

    /// Most recent result of `kind`, optionally restricted to one level.
    pub async fn latest_analysis(
        &self,
        document_id: Uuid,
        kind: AnalysisKind,
        level: Option<&str>,
    ) -> Result<Option<StoredAnalysis>> {
        let row: Option<AnalysisRow> = sqlx::query_as(
            r"
            SELECT analysis_type, level, result_json, created_at
            FROM document_analyses
            WHERE document_id = ? AND analysis_type = ? AND (? IS NULL OR level = ?)
            ORDER BY created_at DESC, id DESC
            LIMIT 1
            ",
        )
        .bind(document_id.to_string())
        .bind(kind.as_str())
        .bind(level)
        .bind(level)
        .fetch_optional(&self.pool)
        .await?;

        row.map(parse_analysis_row).transpose()
    }

    /// Every result for a document, newest first.
    pub async fn list_analyses(&self, document_id: Uuid) -> Result<Vec<StoredAnalysis>> {
        let rows: Vec<AnalysisRow> = sqlx::query_as(
            r"
            SELECT analysis_type, level, result_json, created_at
            FROM document_analyses
            WHERE document_id = ?
            ORDER BY created_at DESC, id DESC
            ",
        )
        .bind(document_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(parse_analysis_row).collect()
    }

    // Entity operations

    /// Supersedes the document's entity set in one transaction.
    pub async fn replace_entities(&self, document_id: Uuid, entities: &[EntityMatch]) -> Result<()> {
        let created_at = timestamp(Utc::now());
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM document_entities WHERE document_id = ?")
            .bind(document_id.to_string())
            .execute(&mut *tx)
            .await?;

        for entity in entities {
            sqlx::query(
                r"
                INSERT INTO document_entities (
                    document_id, entity_type, entity_value, confidence, snippet,
                    start_index, end_index, created_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                ",
            )
            .bind(document_id.to_string())
            .bind(entity.entity_type.as_str())
            .bind(&entity.value)
            .bind(entity.confidence)
            .bind(&entity.snippet)
            .bind(entity.start_index.and_then(|i| i64::try_from(i).ok()))
            .bind(entity.end_index.and_then(|i| i64::try_from(i).ok()))
            .bind(&created_at)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Highest confidence first, then type and value.
    pub async fn list_entities(&self, document_id: Uuid) -> Result<Vec<EntityMatch>> {
        let rows: Vec<EntityRow> = sqlx::query_as(
            r"
            SELECT entity_type, entity_value, confidence, snippet, start_index, end_index
            FROM document_entities
            WHERE document_id = ?
            ORDER BY confidence DESC, entity_type, entity_value
            ",
        )
        .bind(document_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(parse_entity_row).collect()
    }
}

fn parse_uuid(raw: &str) -> Result<Uuid> {
    raw.parse()
        .map_err(|_| Error::CorruptRow(format!("invalid id {raw}")))
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|_| Error::CorruptRow(format!("invalid timestamp {raw}")))
}

fn parse_version(raw: i64) -> Result<u32> {
    u32::try_from(raw).map_err(|_| Error::CorruptRow(format!("invalid version number {raw}")))
}

fn parse_document_row(row: DocumentRow) -> Result<Document> {
    let (
        id,
        filename,
        file_path,
        file_type,
        file_size,
        checksum,
        uploaded_at,
        preview_text,
        full_text,
        version_group,
        version_number,
        parent_document_id,
        analysis_status,
    ) = row;

    Ok(Document {
        id: parse_uuid(&id)?,
        filename,
        file_path: PathBuf::from(file_path),
        file_type: file_type.parse()?,
        file_size: u64::try_from(file_size)
            .map_err(|_| Error::CorruptRow(format!("invalid file size {file_size}")))?,
        checksum,
        uploaded_at: parse_timestamp(&uploaded_at)?,
        preview_text,
        full_text,
        version_group,
        version_number: parse_version(version_number)?,
        parent_document_id: parent_document_id.as_deref().map(parse_uuid).transpose()?,
        analysis_status: analysis_status.parse()?,
    })
}

fn parse_analysis_row(row: AnalysisRow) -> Result<StoredAnalysis> {
    let (analysis_type, level, result_json, created_at) = row;

    Ok(StoredAnalysis {
        analysis_type: analysis_type.parse()?,
        level,
        result: serde_json::from_str(&result_json).unwrap_or(Value::Object(serde_json::Map::new())),
        created_at: parse_timestamp(&created_at)?,
    })
}

fn parse_entity_row(row: EntityRow) -> Result<EntityMatch> {
    let (entity_type, value, confidence, snippet, start_index, end_index) = row;
    let span = start_index
        .zip(end_index)
        .and_then(|(start, end)| Some((usize::try_from(start).ok()?, usize::try_from(end).ok()?)));

    Ok(EntityMatch::new(entity_type.parse()?, value, confidence)
        .with_span(span)
        .with_snippet(snippet))
}
