//! Core library for order-document extraction.
//!
//! This crate provides:
//! - Structured-output schema compilation from typed field definitions
//! - Conditional rule evaluation over extracted data
//! - Cloud multi-step extraction through a hosted multimodal model
//! - A local pipeline: first-page rasterization, OCR, spatial text
//!   reconstruction, line-item grammar and header extraction
//! - Feedback refinement with partial-merge semantics
//! - Token and cost accounting

pub mod error;
pub mod extraction;
pub mod llm;
pub mod models;
pub mod ocr;
pub mod pdf;
pub mod registry;
pub mod rules;

pub use error::{DocmapError, EngineError, OcrError, PdfError, Result};
pub use extraction::{
    CloudExtractor, EngineKind, ExtractionService, Extractor, FeedbackRefiner, LocalExtractor,
    Refinement,
};
pub use llm::{GenerativeModel, ModelRequest, ModelResponse, TokenUsage};
pub use models::config::DocmapConfig;
pub use models::document::{DocumentPayload, ExtractionContext};
pub use models::result::{ExtractionResult, FieldMap, FieldValue, LineItem, UnmappedEntry, UsageMetadata};
pub use models::schema::{ConditionalRule, FieldType, RuleCondition, RuleOperator, SchemaField, TrainingRules};
pub use ocr::{OcrBackend, OcrPage};
#[cfg(feature = "native")]
pub use ocr::PureOcrEngine;
pub use registry::EngineRegistry;
pub use rules::{evaluate_rules, MatchedRules, RuleSubject};
