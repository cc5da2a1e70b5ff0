//! Error types for the docmap-core library.

use thiserror::Error;

/// Main error type for the docmap library.
#[derive(Error, Debug)]
pub enum DocmapError {
    /// Unknown engine selection or missing required settings.
    #[error("configuration error: {0}")]
    Config(String),

    /// Model response could not be recovered as JSON matching the schema.
    #[error("malformed model response: {0}")]
    MalformedResponse(String),

    /// OCR, PDF, model or transport failure.
    #[error("engine error: {0}")]
    Engine(#[from] EngineError),

    /// Response or input violates the expected shape.
    #[error("validation failed: {0}")]
    Validation(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failures raised by one of the extraction engines.
#[derive(Error, Debug)]
pub enum EngineError {
    /// PDF processing error.
    #[error("PDF error: {0}")]
    Pdf(#[from] PdfError),

    /// OCR processing error.
    #[error("OCR error: {0}")]
    Ocr(#[from] OcrError),

    /// Image decoding error.
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    /// HTTP transport error talking to a model service.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Model service answered, but not with usable content.
    #[error("model error: {0}")]
    Model(String),

    /// A blocking pipeline task panicked or was cancelled.
    #[error("pipeline task failed: {0}")]
    Task(String),

    /// Document MIME type is not handled by the local pipeline.
    #[error("unsupported document type: {0}")]
    UnsupportedType(String),
}

/// Errors related to PDF processing.
#[derive(Error, Debug)]
pub enum PdfError {
    /// Failed to open/parse the PDF file.
    #[error("failed to parse PDF: {0}")]
    Parse(String),

    /// Failed to extract text from PDF.
    #[error("failed to extract text: {0}")]
    TextExtraction(String),

    /// First page has neither a raster image nor a text layer.
    #[error("no renderable content on first page")]
    NoRenderableContent,

    /// The PDF is encrypted and cannot be processed.
    #[error("PDF is encrypted")]
    Encrypted,

    /// The PDF is empty or has no pages.
    #[error("PDF has no pages")]
    NoPages,
}

/// Errors related to OCR processing.
#[derive(Error, Debug)]
pub enum OcrError {
    /// Failed to load OCR models.
    #[error("failed to load model: {0}")]
    ModelLoad(String),

    /// Text recognition failed.
    #[error("text recognition failed: {0}")]
    Recognition(String),

    /// No OCR backend is available in this build.
    #[error("no OCR backend available: {0}")]
    Unavailable(String),
}

impl From<PdfError> for DocmapError {
    fn from(e: PdfError) -> Self {
        DocmapError::Engine(e.into())
    }
}

impl From<OcrError> for DocmapError {
    fn from(e: OcrError) -> Self {
        DocmapError::Engine(e.into())
    }
}

impl From<image::ImageError> for DocmapError {
    fn from(e: image::ImageError) -> Self {
        DocmapError::Engine(e.into())
    }
}

impl From<reqwest::Error> for DocmapError {
    fn from(e: reqwest::Error) -> Self {
        DocmapError::Engine(e.into())
    }
}

/// Result type for the docmap library.
pub type Result<T> = std::result::Result<T, DocmapError>;
