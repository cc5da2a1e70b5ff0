//! Hosted multimodal model client (Gemini `generateContent`).

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::error::{DocmapError, EngineError, Result};
use crate::models::config::CloudConfig;

use super::{ContentPart, GenerativeModel, ModelRequest, ModelResponse, TokenUsage};

/// Client for the hosted extraction model.
#[derive(Clone)]
pub struct GeminiModel {
    http_client: Client,
    base_url: String,
    model: String,
    display_name: String,
    api_key: String,
}

impl GeminiModel {
    pub fn new(config: &CloudConfig, api_key: String) -> Result<Self> {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            http_client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            display_name: config.display_name.clone(),
            api_key,
        })
    }

    /// Build from config, reading the API key from the environment.
    pub fn from_config(config: &CloudConfig) -> Result<Self> {
        Self::new(config, config.api_key()?)
    }

    fn endpoint(&self) -> String {
        format!("{}/v1beta/models/{}:generateContent", self.base_url, self.model)
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'static str>,
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
enum Part {
    Text(String),
    InlineData(InlineData),
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    response_mime_type: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_schema: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    usage_metadata: Option<GeminiUsage>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiUsage {
    #[serde(default)]
    prompt_token_count: u64,
    #[serde(default)]
    candidates_token_count: u64,
}

fn build_request(request: &ModelRequest) -> GenerateRequest {
    let parts = request
        .parts
        .iter()
        .map(|part| match part {
            ContentPart::Text(text) => Part::Text(text.clone()),
            ContentPart::InlineData { mime_type, data } => Part::InlineData(InlineData {
                mime_type: mime_type.clone(),
                data: base64::engine::general_purpose::STANDARD.encode(data),
            }),
        })
        .collect();

    GenerateRequest {
        system_instruction: request.system_instruction.as_ref().map(|text| Content {
            role: None,
            parts: vec![Part::Text(text.clone())],
        }),
        contents: vec![Content {
            role: Some("user"),
            parts,
        }],
        generation_config: GenerationConfig {
            response_mime_type: request.response_schema.as_ref().map(|_| "application/json"),
            response_schema: request.response_schema.clone(),
            max_output_tokens: request.max_output_tokens,
            temperature: request.temperature,
        },
    }
}

fn parse_response(body: GenerateResponse) -> Result<ModelResponse> {
    let text: String = body
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();

    if text.trim().is_empty() {
        return Err(EngineError::Model("no response text from model".to_string()).into());
    }

    let usage = body.usage_metadata.unwrap_or_default();
    Ok(ModelResponse {
        text,
        usage: TokenUsage {
            input_tokens: usage.prompt_token_count,
            output_tokens: usage.candidates_token_count,
        },
    })
}

#[async_trait]
impl GenerativeModel for GeminiModel {
    async fn generate(&self, request: &ModelRequest) -> Result<ModelResponse> {
        let body = build_request(request);
        debug!("Sending request to {} ({} parts)", self.model, request.parts.len());

        let response = self
            .http_client
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(DocmapError::Engine(EngineError::Model(format!(
                "{} returned {}: {}",
                self.model,
                status,
                detail.chars().take(300).collect::<String>()
            ))));
        }

        let parsed: GenerateResponse = response.json().await?;
        let result = parse_response(parsed)?;
        debug!(
            "Model responded: {} chars, {} in / {} out tokens",
            result.text.len(),
            result.usage.input_tokens,
            result.usage.output_tokens
        );
        Ok(result)
    }

    fn display_name(&self) -> &str {
        &self.display_name
    }
}
