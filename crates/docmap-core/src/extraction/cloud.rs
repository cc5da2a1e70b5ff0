//! Cloud multi-step extractor.
//!
//! Round one extracts the whole record from the document. Conditional rules
//! are then evaluated against that record; when any match, round two sends
//! the record back with the rules' instructions and its answer replaces the
//! working result wholesale. Any failure aborts the document.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, info};

use super::json::parse_json_object;
use super::schema::compile_response_schema;
use super::usage::UsageMeter;
use super::{EngineKind, Extractor};
use crate::error::{DocmapError, Result};
use crate::llm::{GenerativeModel, ModelRequest};
use crate::models::document::{DocumentPayload, ExtractionContext};
use crate::models::result::{ExtractionResult, FieldMap, LineItem, UnmappedEntry};
use crate::models::schema::TrainingRules;
use crate::registry::EngineRegistry;
use crate::rules::{evaluate_rules, MatchedRules, RuleSubject};

const BASE_PROMPT: &str = "Analyze the image/PDF provided and return the JSON response.";

/// Suffix on the model name when the refinement round ran.
pub const MULTI_STEP_SUFFIX: &str = " (multi-step)";

/// System instruction for the base extraction round.
pub fn base_instruction(rules: &TrainingRules, supplementary_text: Option<&str>) -> String {
    let context = match supplementary_text {
        Some(text) => format!(
            "The user provided the following Email/Text Context along with the document. \
             Use this to override standard extraction or clarify details \
             (e.g. Ship To addresses, special instructions): \n\"{}\"",
            text
        ),
        None => "No additional email context provided.".to_string(),
    };

    format!(
        "You are an intelligent document processing agent specializing in complex Purchase Orders and Sales Orders.\n\n\
         GOAL: Extract data to create a Sales Order in the downstream order-entry system.\n\n\
         1. HEADERS: Extract the specific fields requested in 'mappedData'.\n\
         2. LINE ITEMS: Extract the table of items into 'lineItems'. Pay close attention to:\n\
         \x20  - Vendor Item Number (e.g. 6510866, CRECP4N)\n\
         \x20  - Descriptions\n\
         \x20  - Quantities and Unit Costs\n\
         \x20  - Extended Costs (ensure Quantity * Cost = Extended)\n\
         3. EXTRAS: Put any other useful info in 'unmappedData'.\n\n\
         GLOBAL RULES: \"{}\"\n\n\
         ADDITIONAL CONTEXT (Important):\n{}",
        rules.natural_language_rules, context
    )
}

/// Instruction appended to the round-two request.
pub fn refinement_instruction(matched: &MatchedRules<'_>, line_item_count: usize) -> String {
    let rule_lines = matched
        .rules()
        .map(|r| format!("- Condition Met: {}. Instruction: {}", r.name, r.instruction))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "You have already extracted data. However, specific rules apply to this document.\n\n\
         APPLY THESE SPECIFIC RULES AND UPDATE THE JSON:\n{}\n\n\
         CRITICAL INSTRUCTIONS:\n\
         1. Return the COMPLETE JSON structure with the updates applied.\n\
         2. DO NOT remove any Line Items. The extracted data has {} line items. \
         Your output MUST contain exactly this number of line items.\n\
         3. Only modify the specific fields mentioned in the rules (e.g., Description, PO Number). \
         Keep all other values identical.",
        rule_lines, line_item_count
    )
}

/// The working result as sent back to the model.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Snapshot<'a> {
    mapped_data: &'a FieldMap,
    line_items: &'a [LineItem],
    unmapped_data: &'a [UnmappedEntry],
    terms_and_conditions: &'a str,
    confidence: &'a BTreeMap<String, f64>,
}

impl<'a> From<&'a ExtractionResult> for Snapshot<'a> {
    fn from(result: &'a ExtractionResult) -> Self {
        Self {
            mapped_data: &result.mapped_data,
            line_items: &result.line_items,
            unmapped_data: &result.unmapped_data,
            terms_and_conditions: &result.terms_and_conditions,
            confidence: &result.confidence,
        }
    }
}

/// Two-round extraction against the hosted model.
pub struct CloudExtractor {
    registry: Arc<EngineRegistry>,
}

impl CloudExtractor {
    pub fn new(registry: Arc<EngineRegistry>) -> Self {
        Self { registry }
    }

    async fn base_round(
        &self,
        model: &dyn GenerativeModel,
        ctx: &ExtractionContext,
        schema: &serde_json::Value,
        meter: &mut UsageMeter,
    ) -> Result<ExtractionResult> {
        let request = ModelRequest::new()
            .system(base_instruction(&ctx.rules, ctx.supplementary_text.as_deref()))
            .inline_data(ctx.document.mime_type.clone(), Arc::clone(&ctx.document.data))
            .text(BASE_PROMPT)
            .schema(schema.clone());

        debug!("Step 1: base extraction of {}", ctx.document.name);
        let response = model.generate(&request).await?;
        meter.record(response.usage);

        parse_json_object(&response.text)
    }

    async fn refinement_round(
        &self,
        model: &dyn GenerativeModel,
        document: &DocumentPayload,
        current: &ExtractionResult,
        matched: &MatchedRules<'_>,
        schema: &serde_json::Value,
        meter: &mut UsageMeter,
    ) -> Result<ExtractionResult> {
        let snapshot = serde_json::to_string(&Snapshot::from(current))
            .map_err(|e| DocmapError::Validation(format!("cannot serialize step 1 result: {}", e)))?;

        let request = ModelRequest::new()
            .inline_data(document.mime_type.clone(), Arc::clone(&document.data))
            .text(format!(
                "Current Extraction Data: {}. \n\n {}",
                snapshot,
                refinement_instruction(matched, current.line_items.len())
            ))
            .schema(schema.clone());

        info!(
            "Step 2: {} rule(s) triggered for {}, refining",
            matched.len(),
            document.name
        );
        let response = model.generate(&request).await?;
        meter.record(response.usage);

        parse_json_object(&response.text)
    }
}

#[async_trait]
impl Extractor for CloudExtractor {
    fn kind(&self) -> EngineKind {
        EngineKind::Cloud
    }

    async fn extract(&self, ctx: &ExtractionContext) -> Result<ExtractionResult> {
        ctx.rules.validate()?;

        let model = self.registry.cloud_model().await?;
        let config = &self.registry.config().cloud;
        let schema = compile_response_schema(&ctx.rules);
        let mut meter = UsageMeter::new();

        let mut result = self.base_round(model.as_ref(), ctx, &schema, &mut meter).await?;

        let matched = evaluate_rules(
            &ctx.rules.conditional_rules,
            RuleSubject {
                filename: &ctx.document.name,
                mapped_data: &result.mapped_data,
                line_items: &result.line_items,
            },
        );
        let applied_rule_ids = matched.ids();
        let refined = !matched.is_empty();

        if refined {
            let refinement = self
                .refinement_round(model.as_ref(), &ctx.document, &result, &matched, &schema, &mut meter)
                .await?;

            if config.enforce_line_item_count
                && refinement.line_items.len() != result.line_items.len()
            {
                return Err(DocmapError::Validation(format!(
                    "refinement changed line item count from {} to {}",
                    result.line_items.len(),
                    refinement.line_items.len()
                )));
            }
            result = refinement;
        }

        let field_names = ctx.rules.field_names();
        result.mapped_data.retain(|k, _| field_names.contains(&k.as_str()));
        result.applied_rule_ids = applied_rule_ids;

        let model_name = if refined {
            format!("{}{}", model.display_name(), MULTI_STEP_SUFFIX)
        } else {
            model.display_name().to_string()
        };
        result.usage_metadata = meter.finish(model_name, &config.pricing());

        info!(
            "Cloud extraction of {}: {} header fields, {} line items, {} request(s)",
            ctx.document.name,
            result.mapped_data.len(),
            result.line_items.len(),
            meter.requests()
        );
        Ok(result)
    }
}
