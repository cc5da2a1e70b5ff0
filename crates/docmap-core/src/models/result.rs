//! The extraction result contract shared by every engine.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::lenient;

/// A header or unmapped value: either text or a number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Number(f64),
    Text(String),
}

impl FieldValue {
    /// Convert an arbitrary JSON value; `null` has no field value.
    pub fn from_json(value: Value) -> Option<Self> {
        match value {
            Value::Null => None,
            Value::Number(n) => n.as_f64().map(FieldValue::Number),
            Value::String(s) => Some(FieldValue::Text(s)),
            other => Some(FieldValue::Text(other.to_string())),
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Number(n) => Some(*n),
            FieldValue::Text(s) => lenient::parse_number(s),
        }
    }
}

impl Default for FieldValue {
    fn default() -> Self {
        FieldValue::Text(String::new())
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Number(n) => write!(f, "{}", n),
            FieldValue::Text(s) => f.write_str(s),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::Text(s.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        FieldValue::Text(s)
    }
}

impl From<f64> for FieldValue {
    fn from(n: f64) -> Self {
        FieldValue::Number(n)
    }
}

/// Header fields keyed by schema field name.
pub type FieldMap = BTreeMap<String, FieldValue>;

/// Names of the core line-item attributes, as serialized.
pub const LINE_ITEM_ATTRIBUTES: [&str; 10] = [
    "LineItem",
    "VendorItemNumber",
    "ItemDescription",
    "QuantityOrdered",
    "UnitOfMeasure",
    "CostEach",
    "CostExtended",
    "DateRequired",
    "CustomerReference",
    "SOReference",
];

/// One row of the document's line-item table.
///
/// Known attributes are typed; anything else the engine produced is kept in
/// `extra` so it can still be matched by rules and shown to the caller.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    /// Line number as printed (e.g. 1, 10, 20).
    #[serde(
        rename = "LineItem",
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient::opt_string"
    )]
    pub line_number: Option<String>,

    /// Vendor part / material number.
    #[serde(
        rename = "VendorItemNumber",
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient::opt_string"
    )]
    pub vendor_item_number: Option<String>,

    #[serde(
        rename = "ItemDescription",
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient::opt_string"
    )]
    pub description: Option<String>,

    #[serde(
        rename = "QuantityOrdered",
        default,
        skip_serializing_if = "Option::is_none",
        serialize_with = "lenient::opt_whole_number",
        deserialize_with = "lenient::opt_number"
    )]
    pub quantity: Option<f64>,

    #[serde(
        rename = "UnitOfMeasure",
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient::opt_string"
    )]
    pub unit_of_measure: Option<String>,

    /// Unit price.
    #[serde(
        rename = "CostEach",
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient::opt_number"
    )]
    pub cost_each: Option<f64>,

    /// Total line amount.
    #[serde(
        rename = "CostExtended",
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient::opt_number"
    )]
    pub cost_extended: Option<f64>,

    #[serde(
        rename = "DateRequired",
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient::opt_string"
    )]
    pub date_required: Option<String>,

    #[serde(
        rename = "CustomerReference",
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient::opt_string"
    )]
    pub customer_reference: Option<String>,

    /// Sales order reference / SO line.
    #[serde(
        rename = "SOReference",
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient::opt_string"
    )]
    pub so_reference: Option<String>,

    /// Attributes outside the core set.
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl LineItem {
    /// String form of an attribute, core or extra. `None` when absent.
    pub fn attribute(&self, name: &str) -> Option<String> {
        let text = |v: &Option<String>| v.clone();
        let number = |v: &Option<f64>| v.map(|n| n.to_string());

        match name {
            "LineItem" => text(&self.line_number),
            "VendorItemNumber" => text(&self.vendor_item_number),
            "ItemDescription" => text(&self.description),
            "QuantityOrdered" => number(&self.quantity),
            "UnitOfMeasure" => text(&self.unit_of_measure),
            "CostEach" => number(&self.cost_each),
            "CostExtended" => number(&self.cost_extended),
            "DateRequired" => text(&self.date_required),
            "CustomerReference" => text(&self.customer_reference),
            "SOReference" => text(&self.so_reference),
            _ => match self.extra.get(name)? {
                Value::Null => None,
                Value::String(s) => Some(s.clone()),
                other => Some(other.to_string()),
            },
        }
    }

    /// Set an attribute outside the core set.
    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }
}

/// A key/value pair that did not fit the schema or the line-item table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnmappedEntry {
    #[serde(default)]
    pub key: String,

    #[serde(default, deserialize_with = "lenient::field_value")]
    pub value: FieldValue,
}

impl UnmappedEntry {
    pub fn new(key: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Token counts and derived cost of a model invocation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UsageMetadata {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_tokens: u64,
    pub model_name: String,
    pub estimated_cost: f64,
}

impl UsageMetadata {
    /// Zero usage attributed to a model or engine name.
    pub fn free(model_name: impl Into<String>) -> Self {
        Self {
            model_name: model_name.into(),
            ..Self::default()
        }
    }
}

/// Structured record produced by every engine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionResult {
    /// Header fields.
    #[serde(default, deserialize_with = "lenient::field_map")]
    pub mapped_data: FieldMap,

    /// Line items in document table order.
    #[serde(default, deserialize_with = "lenient::null_default")]
    pub line_items: Vec<LineItem>,

    /// Leftover key/value pairs.
    #[serde(default, deserialize_with = "lenient::null_default")]
    pub unmapped_data: Vec<UnmappedEntry>,

    #[serde(default, deserialize_with = "lenient::null_default")]
    pub terms_and_conditions: String,

    /// Per-field confidence in [0, 1].
    #[serde(default, deserialize_with = "lenient::confidence_map")]
    pub confidence: BTreeMap<String, f64>,

    /// Ids of conditional rules applied during extraction.
    #[serde(default, deserialize_with = "lenient::null_default")]
    pub applied_rule_ids: Vec<String>,

    #[serde(default, deserialize_with = "lenient::null_default")]
    pub usage_metadata: UsageMetadata,
}

impl ExtractionResult {
    /// Result standing in for a failed extraction.
    pub fn degraded(engine: &str, reason: &str) -> Self {
        Self {
            unmapped_data: vec![UnmappedEntry::new(
                "error",
                format!("Extraction failed using {}: {}", engine, reason),
            )],
            terms_and_conditions: "Error processing document.".to_string(),
            usage_metadata: UsageMetadata::free(engine),
            ..Self::default()
        }
    }

    /// Whether this result carries an `error` marker.
    pub fn is_degraded(&self) -> bool {
        self.unmapped_data.iter().any(|e| e.key == "error")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_line_item_known_and_extra_attributes() {
        let item: LineItem = serde_json::from_value(json!({
            "LineItem": 10,
            "ItemDescription": "Blue Widget",
            "QuantityOrdered": "1,200",
            "CostEach": null,
            "Discount": "5%"
        }))
        .unwrap();

        assert_eq!(item.line_number.as_deref(), Some("10"));
        assert_eq!(item.quantity, Some(1200.0));
        assert_eq!(item.cost_each, None);
        assert_eq!(item.attribute("Discount").as_deref(), Some("5%"));
        assert_eq!(item.attribute("QuantityOrdered").as_deref(), Some("1200"));
        assert_eq!(item.attribute("Missing"), None);
    }

    #[test]
    fn test_line_item_serializes_core_names() {
        let item = LineItem {
            vendor_item_number: Some("WIDGET-100".to_string()),
            cost_each: Some(12.5),
            ..LineItem::default()
        }
        .with_extra("Discount", "10%");

        let value = serde_json::to_value(&item).unwrap();
        assert_eq!(
            value,
            json!({"VendorItemNumber": "WIDGET-100", "CostEach": 12.5, "Discount": "10%"})
        );
    }

    #[test]
    fn test_whole_quantities_serialize_without_fraction() {
        let whole = LineItem {
            quantity: Some(10.0),
            ..LineItem::default()
        };
        let partial = LineItem {
            quantity: Some(2.5),
            ..LineItem::default()
        };

        assert_eq!(serde_json::to_string(&whole).unwrap(), r#"{"QuantityOrdered":10}"#);
        assert_eq!(serde_json::to_string(&partial).unwrap(), r#"{"QuantityOrdered":2.5}"#);
    }

    #[test]
    fn test_result_tolerates_nulls() {
        let result: ExtractionResult = serde_json::from_value(json!({
            "mappedData": {"po_number": "PO-1", "total_amount": 12.5, "customer_name": null},
            "lineItems": null,
            "unmappedData": [{"key": "Terms", "value": null}],
            "confidence": {"po_number": 1.4, "total_amount": "high"}
        }))
        .unwrap();

        assert_eq!(result.mapped_data.len(), 2);
        assert_eq!(result.mapped_data["total_amount"], FieldValue::Number(12.5));
        assert!(result.line_items.is_empty());
        assert_eq!(result.unmapped_data[0].value, FieldValue::Text(String::new()));
        assert_eq!(result.confidence.len(), 1);
        assert_eq!(result.confidence["po_number"], 1.0);
    }

    #[test]
    fn test_unmapped_entry_without_value_decodes() {
        let result: ExtractionResult = serde_json::from_str(
            r#"{"mappedData":{"po_number":"1"},"lineItems":[],"unmappedData":[{"key":"Incoterms"}]}"#,
        )
        .unwrap();

        assert_eq!(result.unmapped_data, vec![UnmappedEntry::new("Incoterms", "")]);
        assert_eq!(result.mapped_data["po_number"], FieldValue::from("1"));
    }

    #[test]
    fn test_degraded_result() {
        let result = ExtractionResult::degraded("local-regex", "OCR failed");
        assert!(result.is_degraded());
        assert_eq!(result.usage_metadata.estimated_cost, 0.0);
        assert_eq!(result.usage_metadata.model_name, "local-regex");
        assert_eq!(
            result.unmapped_data[0].value.to_string(),
            "Extraction failed using local-regex: OCR failed"
        );
    }

    #[test]
    fn test_field_value_display_matches_plain_numbers() {
        assert_eq!(FieldValue::Number(10.0).to_string(), "10");
        assert_eq!(FieldValue::Number(12.5).to_string(), "12.5");
        assert_eq!(FieldValue::from("ACME").to_string(), "ACME");
    }
}
