//! Feedback refiner.
//!
//! Applies a free-text user correction to an existing result. The model is
//! asked only for what changed, and its answer is merged over the prior
//! result. This is a partial merge, unlike the cloud extractor's second
//! round which replaces the whole result. Errors propagate to the caller.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::json::parse_json_object;
use super::schema::compile_feedback_schema;
use super::usage::UsageMeter;
use crate::error::{DocmapError, Result};
use crate::llm::ModelRequest;
use crate::models::document::DocumentPayload;
use crate::models::lenient;
use crate::models::result::{ExtractionResult, FieldMap, LineItem, UnmappedEntry, UsageMetadata};
use crate::models::schema::TrainingRules;
use crate::registry::EngineRegistry;

/// Suggestion used when the model offers none.
pub const DEFAULT_SUGGESTED_RULE: &str = "Review extraction logic.";

/// Partial update returned by the model. Absent or `null` sections mean
/// "unchanged".
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackResponse {
    #[serde(default, deserialize_with = "lenient::opt_field_map")]
    pub updated_mapped_data: Option<FieldMap>,

    #[serde(default)]
    pub updated_line_items: Option<Vec<LineItem>>,

    #[serde(default)]
    pub updated_unmapped_data: Option<Vec<UnmappedEntry>>,

    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub suggested_rule: Option<String>,
}

/// Outcome of one feedback round.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Refinement {
    pub mapped_data: FieldMap,
    pub line_items: Vec<LineItem>,
    pub unmapped_data: Vec<UnmappedEntry>,
    /// Generalized rule the caller may promote into its rule set.
    pub suggested_rule: String,
    pub usage_metadata: UsageMetadata,
}

impl Refinement {
    /// A new result carrying the refined sections; everything else is copied
    /// from `result`.
    pub fn apply_to(&self, result: &ExtractionResult) -> ExtractionResult {
        ExtractionResult {
            mapped_data: self.mapped_data.clone(),
            line_items: self.line_items.clone(),
            unmapped_data: self.unmapped_data.clone(),
            ..result.clone()
        }
    }
}

/// Merge a partial response over the current result.
///
/// - header fields are shallow-merged: returned fields overwrite, others stay
/// - line items are replaced only by a non-empty list
/// - unmapped entries are replaced whenever the response provides them
pub fn merge_feedback(current: &ExtractionResult, response: FeedbackResponse) -> Refinement {
    let mut mapped_data = current.mapped_data.clone();
    if let Some(updates) = response.updated_mapped_data {
        mapped_data.extend(updates);
    }

    let line_items = match response.updated_line_items {
        Some(items) if !items.is_empty() => items,
        _ => current.line_items.clone(),
    };

    let unmapped_data = response
        .updated_unmapped_data
        .unwrap_or_else(|| current.unmapped_data.clone());

    let suggested_rule = response
        .suggested_rule
        .filter(|r| !r.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_SUGGESTED_RULE.to_string());

    Refinement {
        mapped_data,
        line_items,
        unmapped_data,
        suggested_rule,
        usage_metadata: UsageMetadata::default(),
    }
}

fn feedback_instruction(feedback: &str) -> String {
    format!(
        "You are an expert AI Document Trainer.\n\
         Update the extraction based on the user's feedback.\n\n\
         IMPORTANT:\n\
         1. Only return the fields that need to be updated.\n\
         2. If 'updatedLineItems' are not affected by the feedback, return an empty array [] to save processing time.\n\
         3. Suggest a generalized rule that could automate this in the future.\n\n\
         User Feedback: \"{}\"",
        feedback
    )
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CurrentData<'a> {
    mapped_data: &'a FieldMap,
    line_items: &'a [LineItem],
    unmapped_data: &'a [UnmappedEntry],
    terms_and_conditions: &'a str,
}

/// Runs feedback rounds against the hosted model.
pub struct FeedbackRefiner {
    registry: Arc<EngineRegistry>,
}

impl FeedbackRefiner {
    pub fn new(registry: Arc<EngineRegistry>) -> Self {
        Self { registry }
    }

    /// Apply `feedback` to `current`. Any failure is returned to the caller.
    pub async fn refine(
        &self,
        document: &DocumentPayload,
        current: &ExtractionResult,
        feedback: &str,
        rules: &TrainingRules,
    ) -> Result<Refinement> {
        if feedback.trim().is_empty() {
            return Err(DocmapError::Validation("feedback text is empty".to_string()));
        }
        rules.validate()?;

        let model = self.registry.cloud_model().await?;
        let pricing = self.registry.config().cloud.pricing();

        let snapshot = serde_json::to_string(&CurrentData {
            mapped_data: &current.mapped_data,
            line_items: &current.line_items,
            unmapped_data: &current.unmapped_data,
            terms_and_conditions: &current.terms_and_conditions,
        })
        .map_err(|e| DocmapError::Validation(format!("cannot serialize current data: {}", e)))?;

        let request = ModelRequest::new()
            .system(feedback_instruction(feedback))
            .inline_data(document.mime_type.clone(), Arc::clone(&document.data))
            .text(format!(
                "Current Data: {}. \n\nUser Feedback: {}.",
                snapshot, feedback
            ))
            .schema(compile_feedback_schema(rules));

        info!("Refining {} with user feedback", document.name);
        let response = model.generate(&request).await?;

        let mut meter = UsageMeter::new();
        meter.record(response.usage);

        let parsed: FeedbackResponse = parse_json_object(&response.text)?;
        debug!(
            "Feedback response: {} header updates, {} line items, unmapped {}",
            parsed.updated_mapped_data.as_ref().map_or(0, |m| m.len()),
            parsed.updated_line_items.as_ref().map_or(0, |l| l.len()),
            if parsed.updated_unmapped_data.is_some() { "replaced" } else { "kept" }
        );

        let mut refinement = merge_feedback(current, parsed);
        refinement.usage_metadata = meter.finish(model.display_name(), &pricing);
        Ok(refinement)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EngineError;
    use crate::llm::mock::ScriptedModel;
    use crate::llm::GenerativeModel;
    use crate::models::config::DocmapConfig;
    use crate::models::result::FieldValue;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn current() -> ExtractionResult {
        ExtractionResult {
            mapped_data: [
                ("a".to_string(), FieldValue::Number(1.0)),
                ("b".to_string(), FieldValue::Number(2.0)),
            ]
            .into_iter()
            .collect(),
            line_items: vec![
                LineItem {
                    description: Some("X".to_string()),
                    ..LineItem::default()
                },
                LineItem {
                    description: Some("Y".to_string()),
                    ..LineItem::default()
                },
            ],
            unmapped_data: vec![UnmappedEntry::new("Terms", "Net 30")],
            terms_and_conditions: "Standard terms".to_string(),
            applied_rule_ids: vec!["r1".to_string()],
            ..ExtractionResult::default()
        }
    }

    fn response(value: serde_json::Value) -> FeedbackResponse {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_mapped_data_shallow_merge() {
        let merged = merge_feedback(&current(), response(json!({"updatedMappedData": {"b": 5}})));

        assert_eq!(merged.mapped_data["a"], FieldValue::Number(1.0));
        assert_eq!(merged.mapped_data["b"], FieldValue::Number(5.0));
        assert_eq!(merged.mapped_data.len(), 2);
    }

    #[test]
    fn test_empty_line_items_keep_prior_list() {
        let merged = merge_feedback(&current(), response(json!({"updatedLineItems": []})));
        assert_eq!(merged.line_items, current().line_items);

        let merged = merge_feedback(&current(), response(json!({"updatedLineItems": null})));
        assert_eq!(merged.line_items, current().line_items);
    }

    #[test]
    fn test_non_empty_line_items_replace() {
        let merged = merge_feedback(
            &current(),
            response(json!({"updatedLineItems": [{"ItemDescription": "Z"}]})),
        );
        assert_eq!(merged.line_items.len(), 1);
        assert_eq!(merged.line_items[0].description.as_deref(), Some("Z"));
    }

    #[test]
    fn test_unmapped_data_replaced_only_when_provided() {
        let kept = merge_feedback(&current(), response(json!({})));
        assert_eq!(kept.unmapped_data, current().unmapped_data);

        let replaced = merge_feedback(&current(), response(json!({"updatedUnmappedData": []})));
        assert!(replaced.unmapped_data.is_empty());
    }

    #[test]
    fn test_null_header_update_does_not_blank_field() {
        let merged = merge_feedback(
            &current(),
            response(json!({"updatedMappedData": {"a": null, "c": "new"}})),
        );
        assert_eq!(merged.mapped_data["a"], FieldValue::Number(1.0));
        assert_eq!(merged.mapped_data["c"], FieldValue::from("new"));
    }

    #[test]
    fn test_default_suggested_rule() {
        let merged = merge_feedback(&current(), response(json!({"suggestedRule": ""})));
        assert_eq!(merged.suggested_rule, DEFAULT_SUGGESTED_RULE);
    }

    #[test]
    fn test_apply_to_keeps_other_sections() {
        let base = current();
        let merged = merge_feedback(&base, response(json!({"updatedMappedData": {"b": 7}})));
        let updated = merged.apply_to(&base);

        assert_eq!(updated.mapped_data["b"], FieldValue::Number(7.0));
        assert_eq!(updated.terms_and_conditions, "Standard terms");
        assert_eq!(updated.applied_rule_ids, vec!["r1".to_string()]);
        // The prior result is untouched.
        assert_eq!(base.mapped_data["b"], FieldValue::Number(2.0));
    }

    fn refiner(model: Arc<ScriptedModel>) -> FeedbackRefiner {
        let registry = EngineRegistry::builder(DocmapConfig::default())
            .with_cloud_model(model as Arc<dyn GenerativeModel>)
            .build();
        FeedbackRefiner::new(Arc::new(registry))
    }

    fn document() -> DocumentPayload {
        DocumentPayload::new("po.pdf", "application/pdf", vec![1u8, 2, 3])
    }

    #[tokio::test]
    async fn test_refine_merges_and_reports_usage() {
        let model = Arc::new(ScriptedModel::new("Gemini 2.5 Flash").reply(
            "```json\n{\"updatedMappedData\": {\"b\": 9}, \"updatedLineItems\": [], \"suggestedRule\": \"Use the ship-to block\"}\n```",
            2_000_000,
            1_000_000,
        ));
        let refiner = refiner(Arc::clone(&model));

        let refinement = refiner
            .refine(&document(), &current(), "b should be 9", &TrainingRules::default())
            .await
            .unwrap();

        assert_eq!(refinement.mapped_data["b"], FieldValue::Number(9.0));
        assert_eq!(refinement.line_items.len(), 2);
        assert_eq!(refinement.suggested_rule, "Use the ship-to block");
        assert_eq!(refinement.usage_metadata.model_name, "Gemini 2.5 Flash");
        assert!((refinement.usage_metadata.estimated_cost - 0.45).abs() < 1e-9);

        let requests = model.requests();
        assert_eq!(requests.len(), 1);
        assert!(requests[0]
            .system_instruction
            .as_deref()
            .unwrap()
            .contains("User Feedback: \"b should be 9\""));
        assert!(requests[0].prompt_text().starts_with("Current Data: {\"mappedData\""));
        assert_eq!(
            requests[0].response_schema.as_ref().unwrap()["properties"]["updatedLineItems"]["nullable"],
            true
        );
    }

    #[tokio::test]
    async fn test_refine_propagates_errors() {
        let model = Arc::new(ScriptedModel::new("m").fail("quota exceeded"));
        let err = refiner(model)
            .refine(&document(), &current(), "fix it", &TrainingRules::default())
            .await
            .unwrap_err();
        assert!(matches!(err, DocmapError::Engine(EngineError::Model(_))));

        let model = Arc::new(ScriptedModel::new("m").reply("not json at all", 10, 10));
        let err = refiner(model)
            .refine(&document(), &current(), "fix it", &TrainingRules::default())
            .await
            .unwrap_err();
        assert!(matches!(err, DocmapError::MalformedResponse(_)));
    }

    #[tokio::test]
    async fn test_blank_feedback_is_rejected() {
        let model = Arc::new(ScriptedModel::new("m"));
        let err = refiner(Arc::clone(&model))
            .refine(&document(), &current(), "  ", &TrainingRules::default())
            .await
            .unwrap_err();
        assert!(matches!(err, DocmapError::Validation(_)));
        assert_eq!(model.request_count(), 0);
    }
}
