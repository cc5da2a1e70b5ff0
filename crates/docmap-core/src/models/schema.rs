//! Extraction schema and conditional rule definitions.
//!
//! These are owned and persisted by the caller; the core only reads them
//! (and appends promoted rule text to `natural_language_rules`).

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::{DocmapError, Result};

/// Reserved rule subject that matches against the document filename.
pub const FILENAME_FIELD: &str = "FILENAME";

/// Semantic type of a header field.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    #[default]
    String,
    Number,
    Date,
}

/// One header field to extract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaField {
    /// Caller-side identifier.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,

    /// Field name, unique within a schema.
    pub name: String,

    /// Semantic type.
    #[serde(rename = "type", alias = "semanticType", default)]
    pub field_type: FieldType,

    /// Description handed to the model.
    #[serde(default)]
    pub description: String,
}

impl SchemaField {
    pub fn new(name: impl Into<String>, field_type: FieldType, description: impl Into<String>) -> Self {
        Self {
            id: String::new(),
            name: name.into(),
            field_type,
            description: description.into(),
        }
    }
}

/// Comparison applied to a rule's subject values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleOperator {
    Equals,
    Contains,
    StartsWith,
    Always,
    /// Operator not understood by this version; never matches.
    #[serde(other)]
    Unknown,
}

/// Trigger part of a conditional rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleCondition {
    /// `FILENAME`, a header field name, or a line-item attribute name.
    #[serde(default)]
    pub field: String,

    pub operator: RuleOperator,

    #[serde(default)]
    pub value: String,
}

/// A trigger plus an instruction applied when the trigger matches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConditionalRule {
    pub id: String,

    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub active: bool,

    pub condition: RuleCondition,

    #[serde(default)]
    pub instruction: String,

    /// Field the instruction is expected to affect (informational).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_field: Option<String>,
}

/// The schema, global hints and conditional rules in force.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrainingRules {
    pub schema: Vec<SchemaField>,

    #[serde(default)]
    pub natural_language_rules: String,

    #[serde(default)]
    pub conditional_rules: Vec<ConditionalRule>,
}

impl Default for TrainingRules {
    fn default() -> Self {
        Self {
            schema: vec![
                SchemaField::new("po_number", FieldType::String, "The Purchase Order Number"),
                SchemaField::new(
                    "customer_name",
                    FieldType::String,
                    "Name of the customer placing the order",
                ),
                SchemaField::new("total_amount", FieldType::Number, "Total value of the order"),
                SchemaField::new("order_date", FieldType::Date, "Date of the order"),
                SchemaField::new(
                    "delivery_address",
                    FieldType::String,
                    "Shipping or delivery address",
                ),
            ],
            natural_language_rules: "Identify the PO Number (often labeled as PO#, Order No). \
                Extract the customer name from the header. Look for the total amount at the bottom. \
                Identify specific delivery instructions if present."
                .to_string(),
            conditional_rules: Vec::new(),
        }
    }
}

impl TrainingRules {
    /// Load rules from a JSON file.
    pub fn from_file(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content).map_err(|e| {
            DocmapError::Config(format!("invalid rules file {}: {}", path.display(), e))
        })
    }

    /// Save rules to a JSON file.
    pub fn save(&self, path: &std::path::Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| DocmapError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Schema field names, in schema order.
    pub fn field_names(&self) -> Vec<&str> {
        self.schema.iter().map(|f| f.name.as_str()).collect()
    }

    /// Look up a field definition by name.
    pub fn field(&self, name: &str) -> Option<&SchemaField> {
        self.schema.iter().find(|f| f.name == name)
    }

    /// Check that field names are non-empty and unique.
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for field in &self.schema {
            if field.name.trim().is_empty() {
                return Err(DocmapError::Validation(
                    "schema field with empty name".to_string(),
                ));
            }
            if !seen.insert(field.name.as_str()) {
                return Err(DocmapError::Validation(format!(
                    "duplicate schema field: {}",
                    field.name
                )));
            }
        }
        Ok(())
    }

    /// Append a suggested rule to the global hints.
    pub fn promote_rule(&mut self, rule: &str) {
        let rule = rule.trim();
        if rule.is_empty() {
            return;
        }
        if self.natural_language_rules.is_empty() {
            self.natural_language_rules = rule.to_string();
        } else {
            self.natural_language_rules.push('\n');
            self.natural_language_rules.push_str(rule);
        }
    }
}
