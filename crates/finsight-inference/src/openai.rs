//! OpenAI-compatible generation backend.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use finsight_core::{Error, GenerationBackend, Result};

use crate::config::LlmConfig;

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: String,
}

#[derive(Debug, Deserialize)]
struct OpenAIErrorResponse {
    error: OpenAIError,
}

#[derive(Debug, Deserialize)]
struct OpenAIError {
    message: String,
}

/// OpenAI-compatible generation backend.
pub struct OpenAIBackend {
    client: Client,
    config: LlmConfig,
}

impl OpenAIBackend {
    /// Create a new backend with the given configuration.
    pub fn new(config: LlmConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| Error::Inference(format!("Failed to create HTTP client: {}", e)))?;

        info!(
            subsystem = "inference",
            component = "openai",
            model = %config.model,
            base_url = %config.base_url,
            "Initializing generation backend"
        );

        Ok(Self { client, config })
    }

    /// Create from environment variables.
    pub fn from_env() -> Result<Self> {
        Self::new(LlmConfig::from_env()?)
    }

    /// Get the current configuration.
    pub fn config(&self) -> &LlmConfig {
        &self.config
    }

    fn build_request(&self, endpoint: &str) -> reqwest::RequestBuilder {
        let url = format!("{}{}", self.config.base_url.trim_end_matches('/'), endpoint);
        self.client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .header("Content-Type", "application/json")
    }
}

#[async_trait]
impl GenerationBackend for OpenAIBackend {
    async fn generate_with_system(&self, system: &str, prompt: &str) -> Result<String> {
        debug!(
            subsystem = "inference",
            component = "openai",
            op = "generate",
            model = %self.config.model,
            prompt_len = prompt.len(),
            "Generating"
        );

        let mut messages = Vec::new();
        if !system.is_empty() {
            messages.push(ChatMessage {
                role: "system".to_string(),
                content: system.to_string(),
            });
        }
        messages.push(ChatMessage {
            role: "user".to_string(),
            content: prompt.to_string(),
        });

        let request = ChatCompletionRequest {
            model: self.config.model.clone(),
            messages,
            temperature: None,
            stream: false,
        };

        let response = self
            .build_request("/chat/completions")
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Inference(format!("Request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body: OpenAIErrorResponse = response.json().await.unwrap_or(OpenAIErrorResponse {
                error: OpenAIError {
                    message: "Unknown error".to_string(),
                },
            });
            return Err(Error::Inference(format!(
                "Generation endpoint returned {}: {}",
                status, body.error.message
            )));
        }

        let result: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| Error::Inference(format!("Failed to parse response: {}", e)))?;

        let content = result
            .choices
            .first()
            .map(|c| c.message.content.clone())
            .ok_or_else(|| Error::Inference("Response contained no choices".to_string()))?;

        debug!(
            subsystem = "inference",
            component = "openai",
            op = "generate",
            response_len = content.len(),
            "Generation complete"
        );
        Ok(content)
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config(base_url: String) -> LlmConfig {
        LlmConfig {
            base_url,
            api_key: "test-key".to_string(),
            model: "test-model".to_string(),
            timeout_seconds: 5,
        }
    }

    #[tokio::test]
    async fn test_generate_with_system_success() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("Authorization", "Bearer test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [
                    {"message": {"role": "assistant", "content": "Revenue grew 12%."}}
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let backend = OpenAIBackend::new(test_config(server.uri())).unwrap();
        let out = backend
            .generate_with_system("You are a financial analyst.", "Summarize the report.")
            .await
            .unwrap();
        assert_eq!(out, "Revenue grew 12%.");
    }

    #[tokio::test]
    async fn test_generate_api_error_maps_to_inference() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(429).set_body_json(serde_json::json!({
                "error": {"message": "Rate limit exceeded", "type": "rate_limit"}
            })))
            .mount(&server)
            .await;

        let backend = OpenAIBackend::new(test_config(server.uri())).unwrap();
        let err = backend
            .generate_with_system("", "prompt")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Inference(_)));
        assert!(err.to_string().contains("Rate limit exceeded"));
    }

    #[tokio::test]
    async fn test_generate_empty_choices() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"choices": []})),
            )
            .mount(&server)
            .await;

        let backend = OpenAIBackend::new(test_config(server.uri())).unwrap();
        let err = backend
            .generate_with_system("", "prompt")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("no choices"));
    }

    #[tokio::test]
    async fn test_trailing_slash_in_base_url() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"role": "assistant", "content": "ok"}}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let backend = OpenAIBackend::new(test_config(format!("{}/", server.uri()))).unwrap();
        backend.generate_with_system("", "x").await.unwrap();
    }

    #[test]
    fn test_model_name() {
        let backend = OpenAIBackend::new(test_config("http://localhost:1".into())).unwrap();
        assert_eq!(backend.model_name(), "test-model");
    }
}
