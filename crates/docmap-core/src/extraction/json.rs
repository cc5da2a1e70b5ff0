//! Recovery of JSON objects from model response text.
//!
//! Models wrap JSON in code fences or precede it with prose. The object is
//! recovered by stripping fence markers and taking the span from the first
//! `{` to the last `}`.

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::{DocmapError, Result};

const RAW_PREVIEW_CHARS: usize = 200;

/// Strip code fences and surrounding prose from `text`.
///
/// Returns the trimmed text unchanged when no brace pair is found.
pub fn clean_json_string(text: &str) -> String {
    let clean = text.replace("```json", "").replace("```", "");
    let clean = clean.trim();

    match (clean.find('{'), clean.rfind('}')) {
        (Some(start), Some(end)) if start < end => clean[start..=end].to_string(),
        _ => clean.to_string(),
    }
}

/// Recover a JSON object from model text and decode it as `T`.
pub fn parse_json_object<T: DeserializeOwned>(text: &str) -> Result<T> {
    let value = parse_json_value(text)?;
    serde_json::from_value(value).map_err(|e| {
        DocmapError::MalformedResponse(format!("unexpected response shape: {}", e))
    })
}

/// Recover a JSON object from model text.
pub fn parse_json_value(text: &str) -> Result<Value> {
    let clean = clean_json_string(text);
    if clean.is_empty() {
        return Err(DocmapError::MalformedResponse(
            "empty response text".to_string(),
        ));
    }

    match serde_json::from_str::<Value>(&clean) {
        Ok(value @ Value::Object(_)) => Ok(value),
        Ok(_) => Err(DocmapError::MalformedResponse(format!(
            "response is not a JSON object | Raw: {}",
            preview(&clean)
        ))),
        Err(e) => Err(DocmapError::MalformedResponse(format!(
            "invalid JSON: {} | Raw: {}",
            e,
            preview(&clean)
        ))),
    }
}

fn preview(text: &str) -> String {
    if text.chars().count() > RAW_PREVIEW_CHARS {
        let head: String = text.chars().take(RAW_PREVIEW_CHARS).collect();
        format!("{}...", head)
    } else {
        text.to_string()
    }
}
