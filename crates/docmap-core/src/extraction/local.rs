//! Local OCR pipeline.
//!
//! Stages run strictly in order for one document: first-page rasterization,
//! binarization, OCR, spatial reconstruction, line-item grammar, header
//! extraction. The CPU-bound stages run on the blocking pool so concurrent
//! documents are not starved.

use std::sync::Arc;

use async_trait::async_trait;
use image::DynamicImage;
use tracing::{debug, info, warn};

use super::headers::{header_prompt, parse_model_headers, regex_extract_headers};
use super::line_items::parse_line_items;
use super::usage::{Pricing, UsageMeter};
use super::{EngineKind, Extractor};
use crate::error::{EngineError, Result};
use crate::llm::ModelRequest;
use crate::models::document::{DocumentPayload, ExtractionContext};
use crate::models::result::{ExtractionResult, FieldMap, UsageMetadata};
use crate::models::schema::TrainingRules;
use crate::ocr::{binarize, reconstruct_spatial_text, OcrPage};
use crate::pdf::{render_first_page, FirstPage};
use crate::registry::EngineRegistry;

/// Model name reported by the regex-only pipeline.
pub const REGEX_MODEL_NAME: &str = "Local OCR (regex)";

const FREE: Pricing = Pricing {
    input_per_million: 0.0,
    output_per_million: 0.0,
};

/// OCR text in both forms the later stages need.
#[derive(Debug, Clone, PartialEq)]
pub struct RecognizedText {
    /// Text as the OCR backend produced it; header regexes run on this.
    pub raw: String,
    /// Column-preserving reconstruction; the line-item grammar runs on this.
    pub spatial: String,
}

/// What the OCR stage receives.
enum OcrSource {
    Image(DynamicImage),
    TextLayer(String),
}

/// Local extraction, with headers from either a local model or regexes.
pub struct LocalExtractor {
    registry: Arc<EngineRegistry>,
    use_model: bool,
}

impl LocalExtractor {
    /// Regex-only header extraction.
    pub fn regex(registry: Arc<EngineRegistry>) -> Self {
        Self {
            registry,
            use_model: false,
        }
    }

    /// Local-model header extraction with regex fallback.
    pub fn with_model(registry: Arc<EngineRegistry>) -> Self {
        Self {
            registry,
            use_model: true,
        }
    }

    /// Run rasterization, binarization, OCR and spatial reconstruction.
    pub async fn recognize(&self, document: &DocumentPayload) -> Result<RecognizedText> {
        let source = self.ocr_source(document).await?;

        let page = match source {
            OcrSource::Image(image) => {
                let ocr = self.registry.ocr().await?;
                let config = self.registry.config().ocr.clone();
                tokio::task::spawn_blocking(move || {
                    let image = binarize(&image, config.binarize_threshold);
                    ocr.recognize(&image, &config.language)
                })
                .await
                .map_err(|e| EngineError::Task(e.to_string()))??
            }
            OcrSource::TextLayer(text) => OcrPage::from_text_layer(&text),
        };

        debug!(
            "OCR produced {} lines, {} words",
            page.lines.len(),
            page.words().count()
        );

        let spatial = reconstruct_spatial_text(&page);
        Ok(RecognizedText {
            raw: page.text,
            spatial,
        })
    }

    async fn ocr_source(&self, document: &DocumentPayload) -> Result<OcrSource> {
        let data = Arc::clone(&document.data);

        if document.is_pdf() {
            let config = self.registry.config().pdf.clone();
            let page = tokio::task::spawn_blocking(move || render_first_page(&data, &config))
                .await
                .map_err(|e| EngineError::Task(e.to_string()))??;
            return Ok(match page {
                FirstPage::Raster(image) => OcrSource::Image(image),
                FirstPage::Text(text) => OcrSource::TextLayer(text),
            });
        }

        if document.is_image() {
            let image = tokio::task::spawn_blocking(move || image::load_from_memory(&data))
                .await
                .map_err(|e| EngineError::Task(e.to_string()))??;
            return Ok(OcrSource::Image(image));
        }

        Err(EngineError::UnsupportedType(document.mime_type.clone()).into())
    }

    /// Headers from the local model, falling back to regexes on any failure
    /// or an empty answer.
    async fn model_headers(
        &self,
        text: &RecognizedText,
        rules: &TrainingRules,
        meter: &mut UsageMeter,
    ) -> Option<FieldMap> {
        let model = match self.registry.local_model().await {
            Ok(model) => model,
            Err(e) => {
                warn!("Local model unavailable, using regex headers: {}", e);
                return None;
            }
        };

        let config = &self.registry.config().local_model;
        let request = ModelRequest::new()
            .text(header_prompt(&text.spatial, rules, config.excerpt_chars))
            .max_output_tokens(config.max_new_tokens)
            .temperature(config.temperature);

        match model.generate(&request).await {
            Ok(response) => {
                meter.record(response.usage);
                parse_model_headers(&response.text, rules)
            }
            Err(e) => {
                warn!("Local model failed, using regex headers: {}", e);
                None
            }
        }
    }

    fn model_name(&self) -> String {
        if self.use_model {
            self.registry.config().local_model.display_name.clone()
        } else {
            REGEX_MODEL_NAME.to_string()
        }
    }
}

#[async_trait]
impl Extractor for LocalExtractor {
    fn kind(&self) -> EngineKind {
        if self.use_model {
            EngineKind::LocalModel
        } else {
            EngineKind::LocalRegex
        }
    }

    async fn extract(&self, ctx: &ExtractionContext) -> Result<ExtractionResult> {
        ctx.rules.validate()?;

        let text = self.recognize(&ctx.document).await?;
        let mut meter = UsageMeter::new();

        let model_headers = if self.use_model {
            self.model_headers(&text, &ctx.rules, &mut meter).await
        } else {
            None
        };
        let mapped_data = match model_headers {
            Some(headers) => headers,
            None => regex_extract_headers(&text.raw, &ctx.rules.schema),
        };

        let line_items = parse_line_items(&text.spatial);

        let usage_metadata = if meter.requests() > 0 {
            meter.finish(self.model_name(), &FREE)
        } else {
            UsageMetadata::free(self.model_name())
        };

        info!(
            "Local extraction of {}: {} header fields, {} line items",
            ctx.document.name,
            mapped_data.len(),
            line_items.len()
        );

        Ok(ExtractionResult {
            mapped_data,
            line_items,
            usage_metadata,
            ..ExtractionResult::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DocmapError;
    use crate::llm::mock::ScriptedModel;
    use crate::llm::GenerativeModel;
    use crate::models::config::DocmapConfig;
    use crate::models::result::FieldValue;
    use crate::ocr::OcrBackend;
    use crate::registry::tests::FixedOcr;
    use image::{ImageFormat, Rgb, RgbImage};
    use pretty_assertions::assert_eq;
    use std::io::Cursor;

    const PAGE_TEXT: &str = "\
ACME Industrial Supply
Purchase Order: 4500012345
Bill To: Northwind Traders
WIDGET-100   Blue Widget      12.50   10 EACH    125.00
Page 1 of 1
Subtotal                              125.00
";

    fn png_bytes() -> Vec<u8> {
        let image = RgbImage::from_pixel(4, 4, Rgb([255, 255, 255]));
        let mut buffer = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(image)
            .write_to(&mut buffer, ImageFormat::Png)
            .unwrap();
        buffer.into_inner()
    }

    fn registry(model: Option<Arc<ScriptedModel>>) -> Arc<EngineRegistry> {
        let mut builder = EngineRegistry::builder(DocmapConfig::default()).with_ocr(Arc::new(
            FixedOcr(OcrPage::from_text_layer(PAGE_TEXT)),
        ) as Arc<dyn OcrBackend>);
        if let Some(model) = model {
            builder = builder.with_local_model(model as Arc<dyn GenerativeModel>);
        }
        Arc::new(builder.build())
    }

    fn context() -> ExtractionContext {
        ExtractionContext::new(
            DocumentPayload::new("scan.png", "image/png", png_bytes()),
            Arc::new(TrainingRules::default()),
        )
    }

    #[tokio::test]
    async fn test_regex_pipeline() {
        let result = LocalExtractor::regex(registry(None))
            .extract(&context())
            .await
            .unwrap();

        assert_eq!(result.mapped_data["po_number"], FieldValue::from("4500012345"));
        assert_eq!(result.mapped_data["customer_name"], FieldValue::from("Northwind Traders"));
        assert_eq!(result.line_items.len(), 1);
        assert_eq!(result.line_items[0].vendor_item_number.as_deref(), Some("WIDGET-100"));
        assert_eq!(result.line_items[0].cost_extended, Some(125.0));
        assert!(result.unmapped_data.is_empty());
        assert!(result.confidence.is_empty());
        assert_eq!(result.terms_and_conditions, "");
        assert_eq!(result.usage_metadata, UsageMetadata::free(REGEX_MODEL_NAME));
    }

    #[tokio::test]
    async fn test_model_headers_win_when_usable() {
        let model = Arc::new(ScriptedModel::new("Qwen (Local)").reply(
            "{\"po_number\": \"PO-77\", \"total_amount\": 125}",
            300,
            20,
        ));
        let result = LocalExtractor::with_model(registry(Some(Arc::clone(&model))))
            .extract(&context())
            .await
            .unwrap();

        assert_eq!(result.mapped_data.len(), 2);
        assert_eq!(result.mapped_data["po_number"], FieldValue::from("PO-77"));
        assert_eq!(result.usage_metadata.total_tokens, 320);
        assert_eq!(result.usage_metadata.estimated_cost, 0.0);
        assert_eq!(
            result.usage_metadata.model_name,
            DocmapConfig::default().local_model.display_name
        );

        let request = &model.requests()[0];
        assert_eq!(request.max_output_tokens, Some(150));
        assert!(request.prompt_text().contains("WIDGET-100"));
    }

    #[tokio::test]
    async fn test_model_failure_falls_back_to_regex() {
        let model = Arc::new(ScriptedModel::new("m").fail("connection refused"));
        let result = LocalExtractor::with_model(registry(Some(model)))
            .extract(&context())
            .await
            .unwrap();
        assert_eq!(result.mapped_data["po_number"], FieldValue::from("4500012345"));

        let model = Arc::new(ScriptedModel::new("m").reply("no idea", 10, 2));
        let result = LocalExtractor::with_model(registry(Some(model)))
            .extract(&context())
            .await
            .unwrap();
        assert_eq!(result.mapped_data["customer_name"], FieldValue::from("Northwind Traders"));
    }

    #[tokio::test]
    async fn test_spatial_text_keeps_columns() {
        let text = LocalExtractor::regex(registry(None))
            .recognize(&context().document)
            .await
            .unwrap();

        assert!(text.spatial.contains("WIDGET-100   Blue Widget      12.50"));
        assert!(text.raw.contains("WIDGET-100 Blue Widget 12.50"));
    }

    #[tokio::test]
    async fn test_unsupported_type() {
        let ctx = ExtractionContext::new(
            DocumentPayload::new("order.docx", "application/msword", vec![1u8]),
            Arc::new(TrainingRules::default()),
        );
        let err = LocalExtractor::regex(registry(None)).extract(&ctx).await.unwrap_err();
        assert!(matches!(err, DocmapError::Engine(EngineError::UnsupportedType(_))));
    }

    #[tokio::test]
    async fn test_corrupt_image_is_an_error() {
        let ctx = ExtractionContext::new(
            DocumentPayload::new("scan.png", "image/png", vec![0u8, 1, 2, 3]),
            Arc::new(TrainingRules::default()),
        );
        assert!(LocalExtractor::regex(registry(None)).extract(&ctx).await.is_err());
    }
}
