use std::io::Read;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Upper bound on a decompressed OOXML entry, guards against zip bombs.
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("PDF extraction failed: {0}")]
    Pdf(String),
    #[error("DOCX extraction failed: {0}")]
    Docx(String),
}

pub type ParseResult<T> = Result<T, ParseError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    Pdf,
    Docx,
    Txt,
    Png,
    Jpg,
    Jpeg,
}

impl FileType {
    pub const ALL: [Self; 6] = [
        Self::Pdf,
        Self::Docx,
        Self::Txt,
        Self::Png,
        Self::Jpg,
        Self::Jpeg,
    ];

    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.trim_start_matches('.').to_lowercase().as_str() {
            "pdf" => Some(Self::Pdf),
            "docx" => Some(Self::Docx),
            "txt" => Some(Self::Txt),
            "png" => Some(Self::Png),
            "jpg" => Some(Self::Jpg),
            "jpeg" => Some(Self::Jpeg),
            _ => None,
        }
    }

    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(Self::from_extension)
    }

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Docx => "docx",
            Self::Txt => "txt",
            Self::Png => "png",
            Self::Jpg => "jpg",
            Self::Jpeg => "jpeg",
        }
    }

    #[must_use]
    pub const fn media_type(&self) -> &'static str {
        match self {
            Self::Pdf => "application/pdf",
            Self::Docx => {
                "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
            }
            Self::Txt => "text/plain",
            Self::Png => "image/png",
            Self::Jpg | Self::Jpeg => "image/jpeg",
        }
    }

    #[must_use]
    pub const fn is_image(&self) -> bool {
        matches!(self, Self::Png | Self::Jpg | Self::Jpeg)
    }
}

impl std::fmt::Display for FileType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for FileType {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_extension(s).ok_or_else(|| crate::Error::UnsupportedFileType(s.to_string()))
    }
}

/// Plain text pulled out of one uploaded file.
///
/// Image uploads carry no text (there is no OCR step); their raw bytes are
/// kept in `images` so a multimodal model can read them instead.
#[derive(Debug, Clone, Default)]
pub struct ParsedDocument {
    pub full_text: String,
    pub images: Vec<Vec<u8>>,
}

impl ParsedDocument {
    #[must_use]
    pub fn text(full_text: String) -> Self {
        Self {
            full_text,
            images: Vec::new(),
        }
    }

    #[must_use]
    pub fn image(data: Vec<u8>) -> Self {
        Self {
            full_text: String::new(),
            images: vec![data],
        }
    }
}

pub trait Parser: Send + Sync {
    fn supported_types(&self) -> &[FileType];

    fn can_parse(&self, file_type: FileType) -> bool {
        self.supported_types().contains(&file_type)
    }

    fn parse_bytes(&self, data: &[u8], file_type: FileType) -> ParseResult<ParsedDocument>;
}

/// Handles every [`FileType`]: PDF, DOCX, plain text and pass-through images.
#[derive(Debug, Default, Clone, Copy)]
pub struct DocumentParser;

impl DocumentParser {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl Parser for DocumentParser {
    fn supported_types(&self) -> &[FileType] {
        &FileType::ALL
    }

    fn parse_bytes(&self, data: &[u8], file_type: FileType) -> ParseResult<ParsedDocument> {
        match file_type {
            FileType::Pdf => extract_pdf(data).map(ParsedDocument::text),
            FileType::Docx => extract_docx(data).map(ParsedDocument::text),
            FileType::Txt => Ok(ParsedDocument::text(decode_text(data))),
            FileType::Png | FileType::Jpg | FileType::Jpeg => {
                Ok(ParsedDocument::image(data.to_vec()))
            }
        }
    }
}

fn extract_pdf(data: &[u8]) -> ParseResult<String> {
    let text =
        pdf_extract::extract_text_from_mem(data).map_err(|e| ParseError::Pdf(e.to_string()))?;
    Ok(text.trim().to_string())
}

fn extract_docx(data: &[u8]) -> ParseResult<String> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(data))
        .map_err(|e| ParseError::Docx(e.to_string()))?;
    let entry = archive
        .by_name("word/document.xml")
        .map_err(|e| ParseError::Docx(e.to_string()))?;

    let mut xml = Vec::new();
    entry.take(MAX_XML_ENTRY_BYTES).read_to_end(&mut xml)?;
    if xml.len() as u64 >= MAX_XML_ENTRY_BYTES {
        return Err(ParseError::Docx(
            "word/document.xml exceeds size limit".to_string(),
        ));
    }

    docx_paragraphs(&xml)
}

fn docx_paragraphs(xml: &[u8]) -> ParseResult<String> {
    use quick_xml::events::Event;

    let mut reader = quick_xml::Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut paragraphs: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut in_text = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) if e.local_name().as_ref() == b"t" => in_text = true,
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"p" => {
                    let paragraph = current.trim();
                    if !paragraph.is_empty() {
                        paragraphs.push(paragraph.to_string());
                    }
                    current.clear();
                }
                _ => {}
            },
            Ok(Event::Empty(e)) if matches!(e.local_name().as_ref(), b"tab" | b"br") => {
                current.push(' ');
            }
            Ok(Event::Text(t)) if in_text => {
                let text = t.unescape().map_err(|e| ParseError::Docx(e.to_string()))?;
                current.push_str(&text);
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(ParseError::Docx(e.to_string())),
            _ => {}
        }
        buf.clear();
    }

    let tail = current.trim();
    if !tail.is_empty() {
        paragraphs.push(tail.to_string());
    }

    Ok(paragraphs.join("\n"))
}

/// UTF-8, then BOM-marked UTF-16, then Latin-1, which never fails.
fn decode_text(data: &[u8]) -> String {
    if let Ok(text) = std::str::from_utf8(data) {
        return text.trim().to_string();
    }
    if let Some(text) = decode_utf16(data) {
        return text.trim().to_string();
    }
    data.iter()
        .map(|&b| char::from(b))
        .collect::<String>()
        .trim()
        .to_string()
}

fn decode_utf16(data: &[u8]) -> Option<String> {
    if data.len() % 2 != 0 || data.len() < 2 {
        return None;
    }
    let little_endian = match (data[0], data[1]) {
        (0xFF, 0xFE) => true,
        (0xFE, 0xFF) => false,
        _ => return None,
    };
    let units = data[2..].chunks_exact(2).map(|pair| {
        if little_endian {
            u16::from_le_bytes([pair[0], pair[1]])
        } else {
            u16::from_be_bytes([pair[0], pair[1]])
        }
    });
    char::decode_utf16(units).collect::<Result<String, _>>().ok()
}
