//! Lazily initialized, process-wide engine instances.
//!
//! Models and the OCR backend are expensive to create. The registry creates
//! each one on first use and hands out shared handles afterwards; concurrent
//! first uses wait on the same initialization. Tests inject doubles through
//! the builder instead of touching global state.

use std::sync::Arc;

use tokio::sync::OnceCell;
use tracing::info;

use crate::error::{DocmapError, EngineError, OcrError, Result};
use crate::llm::{GeminiModel, GenerativeModel, OllamaModel};
use crate::models::config::DocmapConfig;
use crate::ocr::OcrBackend;

type ModelFactory = Box<dyn Fn(&DocmapConfig) -> Result<Arc<dyn GenerativeModel>> + Send + Sync>;
type OcrFactory =
    Arc<dyn Fn(&DocmapConfig) -> std::result::Result<Arc<dyn OcrBackend>, OcrError> + Send + Sync>;

/// Shared engine instances plus the read-only configuration they came from.
pub struct EngineRegistry {
    config: Arc<DocmapConfig>,
    cloud_factory: ModelFactory,
    local_factory: ModelFactory,
    ocr_factory: OcrFactory,
    cloud_model: OnceCell<Arc<dyn GenerativeModel>>,
    local_model: OnceCell<Arc<dyn GenerativeModel>>,
    ocr: OnceCell<Arc<dyn OcrBackend>>,
}

impl EngineRegistry {
    /// Registry creating the real backends from `config`.
    pub fn new(config: DocmapConfig) -> Self {
        Self::builder(config).build()
    }

    pub fn builder(config: DocmapConfig) -> EngineRegistryBuilder {
        EngineRegistryBuilder::new(config)
    }

    pub fn config(&self) -> &DocmapConfig {
        &self.config
    }

    /// The hosted multimodal model.
    pub async fn cloud_model(&self) -> Result<Arc<dyn GenerativeModel>> {
        self.cloud_model
            .get_or_try_init(|| async {
                let model = (self.cloud_factory)(&self.config)?;
                info!("Initialized cloud model: {}", model.display_name());
                Ok::<_, DocmapError>(model)
            })
            .await
            .cloned()
    }

    /// The local header-extraction model.
    pub async fn local_model(&self) -> Result<Arc<dyn GenerativeModel>> {
        self.local_model
            .get_or_try_init(|| async {
                let model = (self.local_factory)(&self.config)?;
                info!("Initialized local model: {}", model.display_name());
                Ok::<_, DocmapError>(model)
            })
            .await
            .cloned()
    }

    /// The OCR backend. Loading runs on the blocking pool.
    pub async fn ocr(&self) -> Result<Arc<dyn OcrBackend>> {
        self.ocr
            .get_or_try_init(|| async {
                let factory = Arc::clone(&self.ocr_factory);
                let config = Arc::clone(&self.config);
                let backend = tokio::task::spawn_blocking(move || factory(&config))
                    .await
                    .map_err(|e| EngineError::Task(e.to_string()))??;
                info!("Initialized OCR backend: {}", backend.name());
                Ok::<_, DocmapError>(backend)
            })
            .await
            .cloned()
    }
}

/// Builder for injecting engine instances or factories.
pub struct EngineRegistryBuilder {
    config: DocmapConfig,
    cloud_factory: ModelFactory,
    local_factory: ModelFactory,
    ocr_factory: OcrFactory,
}

impl EngineRegistryBuilder {
    fn new(config: DocmapConfig) -> Self {
        Self {
            config,
            cloud_factory: Box::new(|config| {
                Ok(Arc::new(GeminiModel::from_config(&config.cloud)?) as Arc<dyn GenerativeModel>)
            }),
            local_factory: Box::new(|config| {
                Ok(Arc::new(OllamaModel::from_config(&config.local_model)?) as Arc<dyn GenerativeModel>)
            }),
            ocr_factory: Arc::new(default_ocr),
        }
    }

    pub fn with_cloud_model(mut self, model: Arc<dyn GenerativeModel>) -> Self {
        self.cloud_factory = Box::new(move |_| Ok(Arc::clone(&model)));
        self
    }

    pub fn with_local_model(mut self, model: Arc<dyn GenerativeModel>) -> Self {
        self.local_factory = Box::new(move |_| Ok(Arc::clone(&model)));
        self
    }

    pub fn with_ocr(mut self, backend: Arc<dyn OcrBackend>) -> Self {
        self.ocr_factory = Arc::new(move |_| Ok(Arc::clone(&backend)));
        self
    }

    /// Replace how the OCR backend is created.
    pub fn with_ocr_factory<F>(mut self, factory: F) -> Self
    where
        F: Fn(&DocmapConfig) -> std::result::Result<Arc<dyn OcrBackend>, OcrError> + Send + Sync + 'static,
    {
        self.ocr_factory = Arc::new(factory);
        self
    }

    pub fn build(self) -> EngineRegistry {
        EngineRegistry {
            config: Arc::new(self.config),
            cloud_factory: self.cloud_factory,
            local_factory: self.local_factory,
            ocr_factory: self.ocr_factory,
            cloud_model: OnceCell::new(),
            local_model: OnceCell::new(),
            ocr: OnceCell::new(),
        }
    }
}

#[cfg(feature = "native")]
fn default_ocr(config: &DocmapConfig) -> std::result::Result<Arc<dyn OcrBackend>, OcrError> {
    let engine = crate::ocr::PureOcrEngine::from_dir(&config.ocr.model_dir, config.ocr.clone())?;
    Ok(Arc::new(engine))
}

#[cfg(not(feature = "native"))]
fn default_ocr(_config: &DocmapConfig) -> std::result::Result<Arc<dyn OcrBackend>, OcrError> {
    Err(OcrError::Unavailable(
        "built without the `native` feature".to_string(),
    ))
}
