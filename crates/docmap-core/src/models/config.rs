//! Configuration structures for the extraction engines.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{DocmapError, Result};

/// Main configuration for docmap.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DocmapConfig {
    /// Engine identifier used when the caller does not pick one.
    pub engine: String,

    /// Hosted multimodal model configuration.
    pub cloud: CloudConfig,

    /// Local generative model configuration.
    pub local_model: LocalModelConfig,

    /// OCR configuration.
    pub ocr: OcrConfig,

    /// PDF rasterization configuration.
    pub pdf: PdfConfig,
}

impl Default for DocmapConfig {
    fn default() -> Self {
        Self {
            engine: "cloud".to_string(),
            cloud: CloudConfig::default(),
            local_model: LocalModelConfig::default(),
            ocr: OcrConfig::default(),
            pdf: PdfConfig::default(),
        }
    }
}

/// Hosted multimodal extraction service configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CloudConfig {
    /// Service base URL.
    pub base_url: String,

    /// Model identifier sent with each request.
    pub model: String,

    /// Human-readable model name recorded in usage metadata.
    pub display_name: String,

    /// Environment variable holding the API key.
    pub api_key_env: String,

    /// Price per million input tokens.
    pub price_input_per_million: f64,

    /// Price per million output tokens.
    pub price_output_per_million: f64,

    /// Request timeout in seconds.
    pub timeout_secs: u64,

    /// Reject a refinement round that changes the number of line items.
    pub enforce_line_item_count: bool,
}

impl Default for CloudConfig {
    fn default() -> Self {
        Self {
            base_url: "https://generativelanguage.googleapis.com".to_string(),
            model: "gemini-2.5-flash".to_string(),
            display_name: "Gemini 2.5 Flash".to_string(),
            api_key_env: "GEMINI_API_KEY".to_string(),
            price_input_per_million: 0.075,
            price_output_per_million: 0.30,
            timeout_secs: 120,
            enforce_line_item_count: true,
        }
    }
}

impl CloudConfig {
    /// Read the API key from the configured environment variable.
    pub fn api_key(&self) -> Result<String> {
        std::env::var(&self.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| {
                DocmapError::Config(format!(
                    "{} must be set to use the cloud engine",
                    self.api_key_env
                ))
            })
    }

    /// Per-million-token prices as a pricing table.
    pub fn pricing(&self) -> crate::extraction::usage::Pricing {
        crate::extraction::usage::Pricing {
            input_per_million: self.price_input_per_million,
            output_per_million: self.price_output_per_million,
        }
    }
}

/// Local generative model (header extraction) configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalModelConfig {
    /// Local model server base URL.
    pub base_url: String,

    /// Model identifier.
    pub model: String,

    /// Human-readable model name recorded in usage metadata.
    pub display_name: String,

    /// Number of characters of reconstructed text included in the prompt.
    pub excerpt_chars: usize,

    /// Maximum tokens to generate.
    pub max_new_tokens: u32,

    /// Sampling temperature.
    pub temperature: f32,

    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for LocalModelConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".to_string(),
            model: "qwen2.5:0.5b".to_string(),
            display_name: "Qwen2.5 0.5B (Local)".to_string(),
            excerpt_chars: 1000,
            max_new_tokens: 150,
            temperature: 0.1,
            timeout_secs: 60,
        }
    }
}

/// OCR engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrConfig {
    /// Directory containing det.onnx, latin_rec.onnx and latin_dict.txt.
    pub model_dir: PathBuf,

    /// Language code passed to the OCR backend.
    pub language: String,

    /// Luminance above which a pixel is forced to white (0-255).
    pub binarize_threshold: u8,

    /// Keep `[UNK]` tokens in recognized text.
    pub keep_unk: bool,

    /// Fraction of a text box height within which boxes share a line.
    pub line_tolerance: f32,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            model_dir: PathBuf::from("models"),
            language: "eng".to_string(),
            binarize_threshold: 160,
            keep_unk: false,
            line_tolerance: 0.5,
        }
    }
}

/// PDF processing configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PdfConfig {
    /// Upscale factor applied to the first page raster.
    pub render_scale: f32,

    /// Use the embedded text layer when the first page has no raster image.
    pub text_layer_fallback: bool,
}

impl Default for PdfConfig {
    fn default() -> Self {
        Self {
            render_scale: 2.0,
            text_layer_fallback: true,
        }
    }
}

impl DocmapConfig {
    /// Load configuration from a JSON file.
    pub fn from_file(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content).map_err(|e| {
            DocmapError::Config(format!("invalid config {}: {}", path.display(), e))
        })
    }

    /// Save configuration to a JSON file.
    pub fn save(&self, path: &std::path::Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| DocmapError::Config(e.to_string()))?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }
}
