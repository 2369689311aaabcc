use std::fmt::Write as _;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::document::DocumentSummary;
use crate::entity::EntityMatch;
use crate::ingest::DocumentPipeline;
use crate::{Error, Result};

const REPORT_ENTITY_LIMIT: usize = 15;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Json,
    Csv,
    /// Markdown report.
    Report,
}

impl ExportFormat {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Csv => "csv",
            Self::Report => "report",
        }
    }

    #[must_use]
    pub const fn media_type(&self) -> &'static str {
        match self {
            Self::Json => "application/json",
            Self::Csv => "text/csv",
            Self::Report => "text/markdown",
        }
    }

    fn file_name(self, at: DateTime<Utc>) -> String {
        let stamp = at.format("%Y%m%d-%H%M%S");
        match self {
            Self::Json => format!("document-export-{stamp}.json"),
            Self::Csv => format!("document-export-{stamp}.csv"),
            Self::Report => format!("document-report-{stamp}.md"),
        }
    }
}

impl std::fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ExportFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "csv" => Ok(Self::Csv),
            "report" => Ok(Self::Report),
            _ => Err(Error::UnsupportedExportFormat(s.to_string())),
        }
    }
}

/// One document with everything an export needs.
#[derive(Debug, Clone, Serialize)]
pub struct ExportEntry {
    #[serde(flatten)]
    pub document: DocumentSummary,
    pub entities: Vec<EntityMatch>,
    /// Latest auto-extraction payload, empty when there is none.
    pub analysis: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportFile {
    pub filename: String,
    pub media_type: &'static str,
    pub content: String,
}

#[derive(Serialize)]
struct JsonExport<'a> {
    generated_at: String,
    documents: &'a [ExportEntry],
}

#[derive(Serialize)]
struct CsvRow<'a> {
    document_id: Uuid,
    filename: &'a str,
    version_group: &'a str,
    version_number: u32,
    entity_type: &'static str,
    entity_value: &'a str,
    confidence: f64,
    snippet: &'a str,
    summary_brief: &'a str,
}

const CSV_HEADER: [&str; 9] = [
    "document_id",
    "filename",
    "version_group",
    "version_number",
    "entity_type",
    "entity_value",
    "confidence",
    "snippet",
    "summary_brief",
];

fn analysis_brief(entry: &ExportEntry) -> &str {
    entry
        .analysis
        .get("summary_brief")
        .and_then(Value::as_str)
        .unwrap_or_default()
}

fn render_json(entries: &[ExportEntry], at: DateTime<Utc>) -> Result<String> {
    let export = JsonExport {
        generated_at: at.to_rfc3339_opts(SecondsFormat::Secs, true),
        documents: entries,
    };
    Ok(serde_json::to_string_pretty(&export)?)
}

/// One row per entity; documents without entities contribute no rows.
fn render_csv(entries: &[ExportEntry]) -> Result<String> {
    let mut buf = Vec::new();
    {
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(&mut buf);
        writer.write_record(CSV_HEADER)?;

        for entry in entries {
            let doc = &entry.document;
            for entity in &entry.entities {
                writer.serialize(CsvRow {
                    document_id: doc.id,
                    filename: &doc.filename,
                    version_group: &doc.version_group,
                    version_number: doc.version_number,
                    entity_type: entity.entity_type.as_str(),
                    entity_value: &entity.value,
                    confidence: entity.confidence,
                    snippet: &entity.snippet,
                    summary_brief: analysis_brief(entry),
                })?;
            }
        }
        writer.flush()?;
    }
    String::from_utf8(buf).map_err(|e| Error::CorruptRow(e.to_string()))
}

fn render_report(entries: &[ExportEntry], at: DateTime<Utc>) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "# Document Intelligence Report\n");
    let _ = writeln!(out, "Generated: {}\n", at.to_rfc3339_opts(SecondsFormat::Secs, true));

    for entry in entries {
        let doc = &entry.document;
        let _ = writeln!(out, "## {} (v{})", doc.filename, doc.version_number);
        let _ = writeln!(out, "- Document ID: `{}`", doc.id);
        let _ = writeln!(out, "- Uploaded: {}", doc.uploaded_at.to_rfc3339_opts(SecondsFormat::Secs, true));
        let _ = writeln!(out, "- Version Group: `{}`", doc.version_group);
        if !entry.analysis.is_empty() {
            let _ = writeln!(out, "- Brief Summary: {}", analysis_brief(entry));
        }
        if !entry.entities.is_empty() {
            let _ = writeln!(out, "- Extracted Entities:");
            for entity in entry.entities.iter().take(REPORT_ENTITY_LIMIT) {
                let _ = writeln!(
                    out,
                    "  - [{}] {} (confidence {:.2})",
                    entity.entity_type, entity.value, entity.confidence
                );
            }
        }
        out.push('\n');
    }
    out
}

/// Renders `entries` in `format`, stamped with `at`.
pub fn render(entries: &[ExportEntry], format: ExportFormat, at: DateTime<Utc>) -> Result<ExportFile> {
    if entries.is_empty() {
        return Err(Error::NothingToExport);
    }

    let content = match format {
        ExportFormat::Json => render_json(entries, at)?,
        ExportFormat::Csv => render_csv(entries)?,
        ExportFormat::Report => render_report(entries, at),
    };

    Ok(ExportFile {
        filename: format.file_name(at),
        media_type: format.media_type(),
        content,
    })
}

impl DocumentPipeline {
    /// Exports the given documents, or every document when `ids` is empty.
    /// Newest uploads come first.
    pub async fn export(&self, ids: &[Uuid], format: ExportFormat) -> Result<ExportFile> {
        let mut documents = if ids.is_empty() {
            self.storage().list_documents().await?
        } else {
            let mut selected = Vec::with_capacity(ids.len());
            for id in ids {
                selected.push(self.storage().get_document(*id).await?);
            }
            selected
        };
        documents.sort_by(|a, b| b.uploaded_at.cmp(&a.uploaded_at));

        let mut entries = Vec::with_capacity(documents.len());
        for document in &documents {
            let analysis = match self.latest_auto_extract(document.id).await? {
                Some(Value::Object(map)) => map,
                _ => Map::new(),
            };
            entries.push(ExportEntry {
                document: self.document_summary(document).await?,
                entities: self.storage().list_entities(document.id).await?,
                analysis,
            });
        }

        let file = render(&entries, format, Utc::now())?;
        tracing::info!(format = %format, documents = entries.len(), file = %file.filename, "export rendered");
        Ok(file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::AnalysisStatus;
    use crate::entity::EntityCategory;
    use crate::ingest::FileType;
    use chrono::TimeZone;

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 5).unwrap()
    }

    fn entry(with_analysis: bool) -> ExportEntry {
        let mut analysis = Map::new();
        if with_analysis {
            analysis.insert("summary_brief".into(), Value::String("A lease, v1.".into()));
        }
        ExportEntry {
            document: DocumentSummary {
                id: Uuid::nil(),
                filename: "lease.txt".into(),
                file_type: FileType::Txt,
                file_size: 10,
                uploaded_at: at(),
                preview_text: "Lease".into(),
                version_group: "lease".into(),
                version_number: 1,
                analysis_status: AnalysisStatus::Complete,
                summary_brief: "A lease, v1.".into(),
            },
            entities: vec![
                EntityMatch::new(EntityCategory::Emails, "jane@example.com".into(), 0.95)
                    .with_snippet("mail jane@example.com".into()),
                EntityMatch::new(EntityCategory::Names, "Jane Doe".into(), 0.58),
            ],
            analysis,
        }
    }

    #[test]
    fn test_format_parsing() {
        assert_eq!(" CSV ".parse::<ExportFormat>().unwrap(), ExportFormat::Csv);
        assert!(matches!(
            "xml".parse::<ExportFormat>(),
            Err(Error::UnsupportedExportFormat(_))
        ));
    }

    #[test]
    fn test_nothing_to_export() {
        assert!(matches!(
            render(&[], ExportFormat::Json, at()),
            Err(Error::NothingToExport)
        ));
    }

    #[test]
    fn test_json_export() {
        let file = render(&[entry(true)], ExportFormat::Json, at()).unwrap();
        assert_eq!(file.filename, "document-export-20240301-123005.json");
        assert_eq!(file.media_type, "application/json");

        let value: Value = serde_json::from_str(&file.content).unwrap();
        assert_eq!(value["generated_at"], "2024-03-01T12:30:05Z");
        assert_eq!(value["documents"][0]["filename"], "lease.txt");
        assert_eq!(value["documents"][0]["entities"][1]["value"], "Jane Doe");
        assert_eq!(value["documents"][0]["analysis"]["summary_brief"], "A lease, v1.");
    }

    #[test]
    fn test_csv_export() {
        let file = render(&[entry(true)], ExportFormat::Csv, at()).unwrap();
        let lines: Vec<_> = file.content.lines().collect();

        assert_eq!(
            lines[0],
            "document_id,filename,version_group,version_number,entity_type,entity_value,confidence,snippet,summary_brief"
        );
        assert_eq!(
            lines[1],
            "00000000-0000-0000-0000-000000000000,lease.txt,lease,1,emails,jane@example.com,0.95,mail jane@example.com,\"A lease, v1.\""
        );
        assert_eq!(lines.len(), 3);
    }

    #[test]
    fn test_report_export() {
        let file = render(&[entry(true), entry(false)], ExportFormat::Report, at()).unwrap();
        assert_eq!(file.filename, "document-report-20240301-123005.md");

        let report = &file.content;
        assert!(report.starts_with("# Document Intelligence Report\n\nGenerated: 2024-03-01T12:30:05Z\n"));
        assert!(report.contains("## lease.txt (v1)\n- Document ID: `00000000-0000-0000-0000-000000000000`"));
        assert!(report.contains("  - [emails] jane@example.com (confidence 0.95)"));
        assert!(report.contains("  - [names] Jane Doe (confidence 0.58)"));
        assert_eq!(report.matches("- Brief Summary: A lease, v1.").count(), 1);
    }
}
