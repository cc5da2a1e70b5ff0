//! Generative model abstraction.
//!
//! Engines talk to models through the `GenerativeModel` trait so that the
//! hosted service, a local model server, or a scripted test double can be
//! swapped without touching extraction logic.
//!
//! - `GeminiModel`: hosted multimodal model (`generateContent` API)
//! - `OllamaModel`: local text model server (`/api/generate`)

mod gemini;
#[cfg(test)]
pub(crate) mod mock;
mod ollama;

pub use gemini::GeminiModel;
pub use ollama::OllamaModel;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;

/// One part of a request body.
#[derive(Debug, Clone, PartialEq)]
pub enum ContentPart {
    /// Inline document bytes.
    InlineData { mime_type: String, data: std::sync::Arc<[u8]> },
    Text(String),
}

/// A single request/response exchange.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelRequest {
    pub system_instruction: Option<String>,
    pub parts: Vec<ContentPart>,
    /// Structured-output schema the response must follow.
    pub response_schema: Option<Value>,
    pub max_output_tokens: Option<u32>,
    pub temperature: Option<f32>,
}

impl ModelRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn system(mut self, instruction: impl Into<String>) -> Self {
        self.system_instruction = Some(instruction.into());
        self
    }

    pub fn inline_data(mut self, mime_type: impl Into<String>, data: std::sync::Arc<[u8]>) -> Self {
        self.parts.push(ContentPart::InlineData {
            mime_type: mime_type.into(),
            data,
        });
        self
    }

    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.parts.push(ContentPart::Text(text.into()));
        self
    }

    pub fn schema(mut self, schema: Value) -> Self {
        self.response_schema = Some(schema);
        self
    }

    pub fn max_output_tokens(mut self, tokens: u32) -> Self {
        self.max_output_tokens = Some(tokens);
        self
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Text parts joined with blank lines.
    pub fn prompt_text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|p| match p {
                ContentPart::Text(t) => Some(t.as_str()),
                ContentPart::InlineData { .. } => None,
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

/// Token counts reported for one request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

/// Model output.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelResponse {
    pub text: String,
    pub usage: TokenUsage,
}

/// A generative model reachable through one request/response exchange.
#[async_trait]
pub trait GenerativeModel: Send + Sync {
    async fn generate(&self, request: &ModelRequest) -> Result<ModelResponse>;

    /// Human-readable name recorded in usage metadata.
    fn display_name(&self) -> &str;
}
