//! Text generation capability.
//!
//! Every caller in this crate treats a [`GenerationError`] as "no usable
//! model output" and takes its deterministic fallback instead. Nothing here
//! retries.

mod client;

pub use client::{OllamaClient, MODEL_KEY};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Sampling temperature for JSON extraction requests.
pub const STRUCTURED_TEMPERATURE: f64 = 0.1;
/// Sampling temperature for free-text requests.
pub const TEXT_TEMPERATURE: f64 = 0.2;

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("Generation service unavailable: {0}")]
    Unavailable(String),
    #[error("Generation service returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("Model output is not a JSON object: {0}")]
    MalformedOutput(String),
    #[error("Invalid generation service URL: {0}")]
    InvalidUrl(String),
}

pub type GenerationResult<T> = Result<T, GenerationError>;

#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub system_prompt: String,
    pub user_prompt: String,
    /// Overrides the generator's configured model.
    pub model: Option<String>,
    pub temperature: f64,
    /// Raw image payloads for multimodal models.
    pub images: Vec<Vec<u8>>,
}

impl GenerationRequest {
    #[must_use]
    pub fn new(system_prompt: impl Into<String>, user_prompt: impl Into<String>) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            user_prompt: user_prompt.into(),
            model: None,
            temperature: STRUCTURED_TEMPERATURE,
            images: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    #[must_use]
    pub const fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }

    #[must_use]
    pub fn with_images(mut self, images: Vec<Vec<u8>>) -> Self {
        self.images = images;
        self
    }
}

/// Liveness report. Producing one never fails.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratorHealth {
    pub available: bool,
    pub error: String,
    pub model: String,
    pub vision_model: String,
    #[serde(default)]
    pub installed_models: Vec<String>,
}

#[async_trait]
pub trait Generator: Send + Sync {
    /// Requests JSON output. Anything that is not a JSON object is an error.
    async fn generate_structured(
        &self,
        request: &GenerationRequest,
    ) -> GenerationResult<Map<String, Value>>;

    async fn generate_text(&self, request: &GenerationRequest) -> GenerationResult<String>;

    async fn health(&self) -> GeneratorHealth;

    /// Model used when a request does not name one.
    fn model(&self) -> &str;
}

/// A generator that is never reachable. Forces every deterministic path.
#[derive(Debug, Clone, Default)]
pub struct OfflineGenerator;

const OFFLINE_REASON: &str = "generation disabled (offline mode)";

#[async_trait]
impl Generator for OfflineGenerator {
    async fn generate_structured(
        &self,
        _request: &GenerationRequest,
    ) -> GenerationResult<Map<String, Value>> {
        Err(GenerationError::Unavailable(OFFLINE_REASON.to_string()))
    }

    async fn generate_text(&self, _request: &GenerationRequest) -> GenerationResult<String> {
        Err(GenerationError::Unavailable(OFFLINE_REASON.to_string()))
    }

    async fn health(&self) -> GeneratorHealth {
        GeneratorHealth {
            available: false,
            error: OFFLINE_REASON.to_string(),
            ..GeneratorHealth::default()
        }
    }

    fn model(&self) -> &str {
        ""
    }
}

/// Parses model content as a JSON object, tolerating a Markdown code fence.
pub(crate) fn parse_json_object(content: &str) -> GenerationResult<Map<String, Value>> {
    let mut body = content.trim();
    if body.starts_with("```") {
        body = body.trim_matches('`').trim_start();
        body = body.strip_prefix("json").unwrap_or(body).trim();
    }

    match serde_json::from_str::<Value>(body) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) | Err(_) => Err(GenerationError::MalformedOutput(preview(content))),
    }
}

fn preview(content: &str) -> String {
    const MAX: usize = 120;
    let mut out: String = content.chars().take(MAX).collect();
    if content.chars().count() > MAX {
        out.push_str("...");
    }
    out
}
