//! Local model server client (Ollama `/api/generate`).
//!
//! Text only: inline document parts are not sent, the local pipeline passes
//! reconstructed OCR text instead.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{DocmapError, EngineError, Result};
use crate::models::config::LocalModelConfig;

use super::{GenerativeModel, ModelRequest, ModelResponse, TokenUsage};

/// Client for a local text model.
#[derive(Clone)]
pub struct OllamaModel {
    http_client: Client,
    base_url: String,
    model: String,
    display_name: String,
}

impl OllamaModel {
    pub fn from_config(config: &LocalModelConfig) -> Result<Self> {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            http_client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            display_name: config.display_name.clone(),
        })
    }
}

#[derive(Debug, Serialize)]
struct OllamaRequest {
    model: String,
    prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Debug, Default, Serialize)]
struct OllamaOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Deserialize)]
struct OllamaResponse {
    response: String,
    #[serde(default)]
    prompt_eval_count: u64,
    #[serde(default)]
    eval_count: u64,
}

fn build_request(model: &str, request: &ModelRequest) -> OllamaRequest {
    OllamaRequest {
        model: model.to_string(),
        prompt: request.prompt_text(),
        system: request.system_instruction.clone(),
        stream: false,
        options: OllamaOptions {
            num_predict: request.max_output_tokens,
            temperature: request.temperature,
        },
    }
}

#[async_trait]
impl GenerativeModel for OllamaModel {
    async fn generate(&self, request: &ModelRequest) -> Result<ModelResponse> {
        let body = build_request(&self.model, request);
        debug!("Sending {} prompt chars to {}", body.prompt.len(), self.model);

        let response = self
            .http_client
            .post(format!("{}/api/generate", self.base_url))
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(DocmapError::Engine(EngineError::Model(format!(
                "{} returned {}",
                self.model, status
            ))));
        }

        let parsed: OllamaResponse = response.json().await?;
        Ok(ModelResponse {
            text: parsed.response,
            usage: TokenUsage {
                input_tokens: parsed.prompt_eval_count,
                output_tokens: parsed.eval_count,
            },
        })
    }

    fn display_name(&self) -> &str {
        &self.display_name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::sync::Arc;

    #[test]
    fn test_request_is_text_only() {
        let request = ModelRequest::new()
            .inline_data("image/png", Arc::from(vec![0u8; 4]))
            .text("Extract these details")
            .max_output_tokens(150)
            .temperature(0.5);

        let body = serde_json::to_value(build_request("qwen2.5:0.5b", &request)).unwrap();

        assert_eq!(
            body,
            json!({
                "model": "qwen2.5:0.5b",
                "prompt": "Extract these details",
                "stream": false,
                "options": {"num_predict": 150, "temperature": 0.5}
            })
        );
    }

    #[test]
    fn test_response_counts_default_to_zero() {
        let parsed: OllamaResponse = serde_json::from_str(r#"{"response": "{}"}"#).unwrap();
        assert_eq!(parsed.prompt_eval_count, 0);
        assert_eq!(parsed.eval_count, 0);
    }
}
