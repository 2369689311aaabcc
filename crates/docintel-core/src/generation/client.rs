use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use url::Url;

use super::{
    parse_json_object, GenerationError, GenerationRequest, GenerationResult, Generator,
    GeneratorHealth,
};
use crate::config::GenerationConfig;

/// Key under which the model that produced a structured reply is recorded.
pub const MODEL_KEY: &str = "_model";

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    message: Option<ChatMessage>,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: String,
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<InstalledModel>,
}

#[derive(Debug, Deserialize)]
struct InstalledModel {
    #[serde(default)]
    name: String,
}

/// Client for a local Ollama server's chat API.
pub struct OllamaClient {
    base_url: Url,
    model: String,
    vision_model: String,
    request_timeout: Duration,
    health_timeout: Duration,
    http: Client,
}

impl OllamaClient {
    pub fn new(config: &GenerationConfig) -> GenerationResult<Self> {
        let base_url = Url::parse(config.base_url.trim_end_matches('/'))
            .map_err(|e| GenerationError::InvalidUrl(format!("{}: {e}", config.base_url)))?;
        if base_url.cannot_be_a_base() {
            return Err(GenerationError::InvalidUrl(config.base_url.clone()));
        }

        let http = Client::builder()
            .build()
            .map_err(|e| GenerationError::Unavailable(e.to_string()))?;

        Ok(Self {
            base_url,
            model: config.model.clone(),
            vision_model: config.vision_model.clone(),
            request_timeout: config.request_timeout,
            health_timeout: config.health_timeout,
            http,
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{path}", self.base_url.as_str().trim_end_matches('/'))
    }

    /// Explicit model first, then the vision model for image requests.
    fn select_model(&self, request: &GenerationRequest) -> String {
        if let Some(model) = request.model.as_deref().filter(|m| !m.is_empty()) {
            return model.to_string();
        }
        if !request.images.is_empty() && !self.vision_model.is_empty() {
            return self.vision_model.clone();
        }
        self.model.clone()
    }

    fn chat_body(request: &GenerationRequest, model: &str, structured: bool) -> Value {
        let mut user = json!({"role": "user", "content": request.user_prompt});
        if !request.images.is_empty() {
            user["images"] = request
                .images
                .iter()
                .map(|image| Value::String(STANDARD.encode(image)))
                .collect();
        }

        let mut body = json!({
            "model": model,
            "messages": [
                {"role": "system", "content": request.system_prompt},
                user,
            ],
            "stream": false,
            "options": {"temperature": request.temperature},
        });
        if structured {
            body["format"] = Value::String("json".into());
        }
        body
    }

    async fn chat(&self, body: &Value) -> GenerationResult<String> {
        let response = self
            .http
            .post(self.endpoint("/api/chat"))
            .timeout(self.request_timeout)
            .json(body)
            .send()
            .await
            .map_err(|e| GenerationError::Unavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GenerationError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let reply: ChatResponse = response
            .json()
            .await
            .map_err(|e| GenerationError::MalformedOutput(e.to_string()))?;

        Ok(reply.message.map(|m| m.content).unwrap_or_default())
    }

    async fn installed_models(&self) -> Result<Vec<String>, String> {
        let response = self
            .http
            .get(self.endpoint("/api/tags"))
            .timeout(self.health_timeout)
            .send()
            .await
            .map_err(|e| e.to_string())?
            .error_for_status()
            .map_err(|e| e.to_string())?;

        let tags: TagsResponse = response.json().await.map_err(|e| e.to_string())?;
        Ok(tags.models.into_iter().map(|m| m.name).collect())
    }
}

#[async_trait]
impl Generator for OllamaClient {
    async fn generate_structured(
        &self,
        request: &GenerationRequest,
    ) -> GenerationResult<Map<String, Value>> {
        let model = self.select_model(request);
        tracing::debug!(model = %model, images = request.images.len(), "structured generation request");

        let content = self.chat(&Self::chat_body(request, &model, true)).await?;
        let mut output = parse_json_object(&content)?;
        output
            .entry(MODEL_KEY)
            .or_insert_with(|| Value::String(model));
        Ok(output)
    }

    async fn generate_text(&self, request: &GenerationRequest) -> GenerationResult<String> {
        let model = self.select_model(request);
        tracing::debug!(model = %model, "text generation request");

        let content = self.chat(&Self::chat_body(request, &model, false)).await?;
        Ok(content.trim().to_string())
    }

    async fn health(&self) -> GeneratorHealth {
        let mut health = GeneratorHealth {
            model: self.model.clone(),
            vision_model: self.vision_model.clone(),
            ..GeneratorHealth::default()
        };

        match self.installed_models().await {
            Ok(models) => {
                health.available = true;
                health.installed_models = models;
            }
            Err(e) => {
                tracing::warn!(url = %self.base_url, error = %e, "generation service health check failed");
                health.error = e;
            }
        }
        health
    }

    fn model(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(base_url: &str) -> GenerationConfig {
        GenerationConfig {
            base_url: base_url.to_string(),
            model: "llama3.2:3b".to_string(),
            vision_model: "llava".to_string(),
            request_timeout: Duration::from_secs(1),
            health_timeout: Duration::from_millis(500),
        }
    }

    #[test]
    fn test_rejects_invalid_url() {
        assert!(matches!(
            OllamaClient::new(&config("not a url")),
            Err(GenerationError::InvalidUrl(_))
        ));
    }

    #[test]
    fn test_endpoint_joins_path() {
        let client = OllamaClient::new(&config("http://127.0.0.1:11434/")).unwrap();
        assert_eq!(client.endpoint("/api/chat"), "http://127.0.0.1:11434/api/chat");
    }

    #[test]
    fn test_model_selection() {
        let client = OllamaClient::new(&config("http://127.0.0.1:11434")).unwrap();

        let plain = GenerationRequest::new("s", "u");
        assert_eq!(client.select_model(&plain), "llama3.2:3b");

        let with_image = GenerationRequest::new("s", "u").with_images(vec![vec![0xff]]);
        assert_eq!(client.select_model(&with_image), "llava");

        let explicit = with_image.with_model("custom");
        assert_eq!(client.select_model(&explicit), "custom");
    }

    #[test]
    fn test_chat_body_shape() {
        let request = GenerationRequest::new("sys", "user").with_images(vec![b"abc".to_vec()]);
        let body = OllamaClient::chat_body(&request, "m", true);

        assert_eq!(body["model"], "m");
        assert_eq!(body["stream"], false);
        assert_eq!(body["format"], "json");
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["images"][0], "YWJj");

        let text = OllamaClient::chat_body(&GenerationRequest::new("s", "u"), "m", false);
        assert!(text.get("format").is_none());
        assert!(text["messages"][1].get("images").is_none());
    }

    #[tokio::test]
    async fn test_unreachable_server_degrades() {
        let client = OllamaClient::new(&config("http://127.0.0.1:9")).unwrap();
        let request = GenerationRequest::new("s", "u");

        assert!(matches!(
            client.generate_structured(&request).await,
            Err(GenerationError::Unavailable(_))
        ));

        let health = client.health().await;
        assert!(!health.available);
        assert!(!health.error.is_empty());
        assert_eq!(health.model, "llama3.2:3b");
    }
}
