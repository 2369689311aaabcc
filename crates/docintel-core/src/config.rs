use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::ingest::{Chunker, DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE};

pub const DEFAULT_OLLAMA_URL: &str = "http://127.0.0.1:11434";
pub const DEFAULT_MODEL: &str = "llama3.2:3b";
pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 35 * 1024 * 1024;
/// Ceiling on how much source text is sent with any generation request.
pub const DEFAULT_MAX_CONTEXT_CHARS: usize = 24_000;
pub const HEALTH_TIMEOUT: Duration = Duration::from_secs(8);
pub const GENERATION_TIMEOUT: Duration = Duration::from_secs(120);

const DB_FILE_NAME: &str = "document_intel.db";

/// Where and how to reach the generation service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationConfig {
    pub base_url: String,
    pub model: String,
    /// Model used for requests that carry images. Empty means none.
    pub vision_model: String,
    pub request_timeout: Duration,
    pub health_timeout: Duration,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_OLLAMA_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            vision_model: String::new(),
            request_timeout: GENERATION_TIMEOUT,
            health_timeout: HEALTH_TIMEOUT,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub data_dir: PathBuf,
    pub db_path: PathBuf,
    pub generation: GenerationConfig,
    pub max_upload_bytes: u64,
    pub max_context_chars: usize,
    /// Chunk window in characters.
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self::with_data_dir(default_data_dir())
    }
}

impl AppConfig {
    /// Defaults rooted at `data_dir`.
    #[must_use]
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        let data_dir = data_dir.into();
        Self {
            db_path: data_dir.join(DB_FILE_NAME),
            data_dir,
            generation: GenerationConfig::default(),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            max_context_chars: DEFAULT_MAX_CONTEXT_CHARS,
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
        }
    }

    /// Reads `DOC_INTEL_*`, `OLLAMA_*`, `MAX_UPLOAD_BYTES` and
    /// `MAX_CONTEXT_CHARS` from the process environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`AppConfig::from_env`] with an injectable variable source.
    /// Blank or unparsable values fall back to the defaults.
    #[must_use]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let data_dir = get("DOC_INTEL_DATA_DIR").map_or_else(default_data_dir, PathBuf::from);
        let mut config = Self::with_data_dir(data_dir);

        if let Some(db) = get("DOC_INTEL_DB_PATH") {
            config.db_path = PathBuf::from(db);
        }
        if let Some(url) = get("OLLAMA_BASE_URL") {
            config.generation.base_url = url;
        }
        if let Some(model) = get("OLLAMA_MODEL") {
            config.generation.model = model;
        }
        if let Some(model) = get("OLLAMA_VISION_MODEL") {
            config.generation.vision_model = model;
        }
        match get("MAX_UPLOAD_BYTES").map(|v| v.parse::<u64>()) {
            Some(Ok(bytes)) if bytes > 0 => config.max_upload_bytes = bytes,
            Some(_) => tracing::warn!("ignoring invalid MAX_UPLOAD_BYTES"),
            None => {}
        }
        match get("MAX_CONTEXT_CHARS").map(|v| v.parse::<usize>()) {
            Some(Ok(chars)) if chars > 0 => config.max_context_chars = chars,
            Some(_) => tracing::warn!("ignoring invalid MAX_CONTEXT_CHARS"),
            None => {}
        }
        match get("DOC_INTEL_CHUNK_SIZE").map(|v| v.parse::<usize>()) {
            Some(Ok(chars)) => config.chunk_size = chars,
            Some(Err(_)) => tracing::warn!("ignoring invalid DOC_INTEL_CHUNK_SIZE"),
            None => {}
        }
        match get("DOC_INTEL_CHUNK_OVERLAP").map(|v| v.parse::<usize>()) {
            Some(Ok(chars)) => config.chunk_overlap = chars,
            Some(Err(_)) => tracing::warn!("ignoring invalid DOC_INTEL_CHUNK_OVERLAP"),
            None => {}
        }

        config
    }

    /// Stored originals live here as `<document id>.<extension>`.
    #[must_use]
    pub fn upload_dir(&self) -> PathBuf {
        self.data_dir.join("uploads")
    }

    #[must_use]
    pub fn max_upload_mb(&self) -> u64 {
        self.max_upload_bytes / (1024 * 1024)
    }

    /// Chunker for the configured window. Fails when the window is unusable.
    pub fn chunker(&self) -> crate::Result<Chunker> {
        Ok(Chunker::new(self.chunk_size, self.chunk_overlap)?)
    }

    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(self.upload_dir())?;
        if let Some(parent) = self.db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        Ok(())
    }
}

fn default_data_dir() -> PathBuf {
    dirs::data_dir().map_or_else(|| Path::new("data").to_path_buf(), |dir| dir.join("docintel"))
}
