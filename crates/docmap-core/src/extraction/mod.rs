//! Extraction engines and the service that selects between them.
//!
//! Three engines share the `Extractor` capability:
//! - `CloudExtractor`: hosted multimodal model, two rounds
//! - `LocalExtractor` (regex): OCR pipeline with alias/regex headers
//! - `LocalExtractor` (model): OCR pipeline with local-model headers
//!
//! `ExtractionService` never fails an extraction: engine errors become a
//! degraded result. Feedback refinement, by contrast, returns its errors.

pub mod cloud;
pub mod feedback;
pub mod headers;
pub mod json;
pub mod line_items;
pub mod local;
pub mod patterns;
pub mod schema;
pub mod usage;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

pub use cloud::CloudExtractor;
pub use feedback::{FeedbackRefiner, Refinement};
pub use local::LocalExtractor;

use crate::error::{DocmapError, Result};
use crate::models::document::ExtractionContext;
use crate::models::result::ExtractionResult;
use crate::registry::EngineRegistry;

/// The engine variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EngineKind {
    Cloud,
    LocalRegex,
    LocalModel,
}

impl EngineKind {
    pub const ALL: [EngineKind; 3] = [EngineKind::Cloud, EngineKind::LocalRegex, EngineKind::LocalModel];

    /// Canonical identifier.
    pub fn id(&self) -> &'static str {
        match self {
            EngineKind::Cloud => "cloud",
            EngineKind::LocalRegex => "local-regex",
            EngineKind::LocalModel => "local-model",
        }
    }
}

impl fmt::Display for EngineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for EngineKind {
    type Err = DocmapError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cloud" | "gemini-cloud" => Ok(EngineKind::Cloud),
            "local-regex" | "tesseract-local" => Ok(EngineKind::LocalRegex),
            "local-model" | "chrome-device-llm" => Ok(EngineKind::LocalModel),
            other => Err(DocmapError::Config(format!("unknown extraction engine: {:?}", other))),
        }
    }
}

/// Turns one document into an `ExtractionResult`.
#[async_trait]
pub trait Extractor: Send + Sync {
    fn kind(&self) -> EngineKind;

    async fn extract(&self, ctx: &ExtractionContext) -> Result<ExtractionResult>;
}

/// Engine selection and failure degradation over a shared registry.
#[derive(Clone)]
pub struct ExtractionService {
    registry: Arc<EngineRegistry>,
}

impl ExtractionService {
    pub fn new(registry: Arc<EngineRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<EngineRegistry> {
        &self.registry
    }

    /// The extractor for `kind`.
    pub fn extractor(&self, kind: EngineKind) -> Box<dyn Extractor> {
        let registry = Arc::clone(&self.registry);
        match kind {
            EngineKind::Cloud => Box::new(CloudExtractor::new(registry)),
            EngineKind::LocalRegex => Box::new(LocalExtractor::regex(registry)),
            EngineKind::LocalModel => Box::new(LocalExtractor::with_model(registry)),
        }
    }

    /// Extract with the engine named by `engine`.
    ///
    /// Fails only when the identifier is unknown.
    pub async fn extract(&self, engine: &str, ctx: &ExtractionContext) -> Result<ExtractionResult> {
        let kind = engine.parse::<EngineKind>()?;
        Ok(self.extract_with(kind, ctx).await)
    }

    /// Extract with the configured default engine.
    pub async fn extract_default(&self, ctx: &ExtractionContext) -> Result<ExtractionResult> {
        let engine = self.registry.config().engine.clone();
        self.extract(&engine, ctx).await
    }

    /// Extract with `kind`; any failure degrades to an error-marked result.
    pub async fn extract_with(&self, kind: EngineKind, ctx: &ExtractionContext) -> ExtractionResult {
        info!("Processing {} using engine: {}", ctx.document.name, kind);

        match self.extractor(kind).extract(ctx).await {
            Ok(result) => result,
            Err(e) => {
                warn!("Error processing {} with {}: {}", ctx.document.name, kind, e);
                ExtractionResult::degraded(kind.id(), &e.to_string())
            }
        }
    }

    /// Refiner sharing this service's registry.
    pub fn feedback(&self) -> FeedbackRefiner {
        FeedbackRefiner::new(Arc::clone(&self.registry))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::mock::ScriptedModel;
    use crate::llm::GenerativeModel;
    use crate::models::config::DocmapConfig;
    use crate::models::document::DocumentPayload;
    use crate::models::schema::TrainingRules;
    use crate::ocr::{OcrBackend, OcrPage};
    use crate::registry::tests::FixedOcr;
    use pretty_assertions::assert_eq;
    use serde_json::Value;

    #[test]
    fn test_engine_kind_parsing() {
        assert_eq!("cloud".parse::<EngineKind>().unwrap(), EngineKind::Cloud);
        assert_eq!("gemini-cloud".parse::<EngineKind>().unwrap(), EngineKind::Cloud);
        assert_eq!("tesseract-local".parse::<EngineKind>().unwrap(), EngineKind::LocalRegex);
        assert_eq!(" Local-Model ".parse::<EngineKind>().unwrap(), EngineKind::LocalModel);
        assert_eq!("chrome-device-llm".parse::<EngineKind>().unwrap(), EngineKind::LocalModel);
        assert!(matches!("gpt".parse::<EngineKind>(), Err(DocmapError::Config(_))));

        for kind in EngineKind::ALL {
            assert_eq!(kind.to_string().parse::<EngineKind>().unwrap(), kind);
        }
    }

    fn service(cloud: ScriptedModel) -> ExtractionService {
        let registry = EngineRegistry::builder(DocmapConfig::default())
            .with_cloud_model(Arc::new(cloud) as Arc<dyn GenerativeModel>)
            .with_local_model(
                Arc::new(ScriptedModel::new("local").fail("offline")) as Arc<dyn GenerativeModel>
            )
            .with_ocr(Arc::new(FixedOcr(OcrPage::from_text_layer(
                "PO Number: 77\nSKU-1 Gasket set      3.00   2 PC    6.00\n",
            ))) as Arc<dyn OcrBackend>)
            .build();
        ExtractionService::new(Arc::new(registry))
    }

    fn context(mime_type: &str) -> ExtractionContext {
        let data = if mime_type == "image/png" {
            let mut buffer = std::io::Cursor::new(Vec::new());
            image::DynamicImage::new_rgb8(2, 2)
                .write_to(&mut buffer, image::ImageFormat::Png)
                .unwrap();
            buffer.into_inner()
        } else {
            b"%PDF-1.4".to_vec()
        };
        ExtractionContext::new(
            DocumentPayload::new("po", mime_type, data),
            Arc::new(TrainingRules::default()),
        )
    }

    #[tokio::test]
    async fn test_unknown_engine_is_an_error() {
        let err = service(ScriptedModel::new("m"))
            .extract("magic", &context("image/png"))
            .await
            .unwrap_err();
        assert!(matches!(err, DocmapError::Config(_)));
    }

    #[tokio::test]
    async fn test_engine_failure_degrades() {
        let result = service(ScriptedModel::new("m").fail("quota exceeded"))
            .extract("cloud", &context("application/pdf"))
            .await
            .unwrap();

        assert!(result.is_degraded());
        assert_eq!(result.usage_metadata.model_name, "cloud");
        assert_eq!(result.usage_metadata.estimated_cost, 0.0);
        assert!(result.unmapped_data[0]
            .value
            .to_string()
            .starts_with("Extraction failed using cloud: "));
    }

    #[tokio::test]
    async fn test_every_engine_yields_same_shape() {
        let cloud_reply = r#"{"mappedData": {"po_number": "77"}, "lineItems": [], "unmappedData": [],
            "termsAndConditions": "", "confidence": {"po_number": 0.9}}"#;
        let service = service(ScriptedModel::new("m").reply(cloud_reply, 1, 1));

        let cloud = service.extract_with(EngineKind::Cloud, &context("image/png")).await;
        let local = service.extract_with(EngineKind::LocalRegex, &context("image/png")).await;
        // The local model fails, so headers fall back to regexes.
        let model = service.extract_with(EngineKind::LocalModel, &context("image/png")).await;
        let degraded = ExtractionResult::degraded("local-regex", "boom");

        let keys = |r: &ExtractionResult| match serde_json::to_value(r).unwrap() {
            Value::Object(map) => map.keys().cloned().collect::<Vec<_>>(),
            _ => Vec::new(),
        };

        assert!(!cloud.is_degraded());
        assert!(!local.is_degraded());
        assert_eq!(keys(&cloud), keys(&local));
        assert_eq!(keys(&local), keys(&model));
        assert_eq!(keys(&model), keys(&degraded));
        assert_eq!(local.line_items.len(), 1);
    }
}
