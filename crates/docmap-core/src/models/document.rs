//! Document payload and the per-invocation extraction context.

use std::path::Path;
use std::sync::Arc;

use crate::error::Result;
use crate::models::schema::TrainingRules;

pub const MIME_PDF: &str = "application/pdf";

/// Raw document handed over by the caller.
#[derive(Debug, Clone)]
pub struct DocumentPayload {
    /// Original filename, matched by `FILENAME` rules.
    pub name: String,
    /// MIME type of `data`.
    pub mime_type: String,
    /// Document bytes, shared with blocking pipeline stages.
    pub data: Arc<[u8]>,
}

impl DocumentPayload {
    pub fn new(name: impl Into<String>, mime_type: impl Into<String>, data: impl Into<Arc<[u8]>>) -> Self {
        Self {
            name: name.into(),
            mime_type: mime_type.into(),
            data: data.into(),
        }
    }

    /// Read a document from disk, guessing the MIME type from its extension.
    pub fn from_path(path: &Path) -> Result<Self> {
        let data = std::fs::read(path)?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(Self::new(name, mime_from_path(path), data))
    }

    pub fn is_pdf(&self) -> bool {
        self.mime_type.eq_ignore_ascii_case(MIME_PDF)
    }

    pub fn is_image(&self) -> bool {
        self.mime_type.to_ascii_lowercase().starts_with("image/")
    }
}

/// MIME type for a file extension, `application/octet-stream` when unknown.
pub fn mime_from_path(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();

    match ext.as_str() {
        "pdf" => MIME_PDF,
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "tif" | "tiff" => "image/tiff",
        "bmp" => "image/bmp",
        "gif" => "image/gif",
        "webp" => "image/webp",
        _ => "application/octet-stream",
    }
}

/// Everything an engine needs for one extraction.
#[derive(Debug, Clone)]
pub struct ExtractionContext {
    pub document: DocumentPayload,
    /// Supplementary free text (e.g. the email the document came with).
    pub supplementary_text: Option<String>,
    /// Schema and rules in force.
    pub rules: Arc<TrainingRules>,
}

impl ExtractionContext {
    pub fn new(document: DocumentPayload, rules: Arc<TrainingRules>) -> Self {
        Self {
            document,
            supplementary_text: None,
            rules,
        }
    }

    pub fn with_supplementary_text(mut self, text: impl Into<String>) -> Self {
        let text = text.into();
        self.supplementary_text = if text.trim().is_empty() { None } else { Some(text) };
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mime_from_path() {
        assert_eq!(mime_from_path(Path::new("po.PDF")), MIME_PDF);
        assert_eq!(mime_from_path(Path::new("scan.jpeg")), "image/jpeg");
        assert_eq!(mime_from_path(Path::new("notes")), "application/octet-stream");
    }

    #[test]
    fn test_blank_supplementary_text_is_dropped() {
        let doc = DocumentPayload::new("a.png", "image/png", vec![1u8, 2, 3]);
        let ctx = ExtractionContext::new(doc, Arc::new(TrainingRules::default()))
            .with_supplementary_text("   ");
        assert!(ctx.supplementary_text.is_none());
        assert!(ctx.document.is_image());
    }
}
