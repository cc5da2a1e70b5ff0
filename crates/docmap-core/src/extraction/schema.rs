//! Schema compiler.
//!
//! Turns the caller's field definitions into the request descriptor each
//! engine family needs: a structured-output schema for the hosted model, a
//! field-name list for the local pipeline.

use serde_json::{json, Map, Value};

use crate::models::schema::{FieldType, SchemaField, TrainingRules};

/// Core line-item attributes with their schema type and description.
const LINE_ITEM_PROPERTIES: [(&str, &str, &str); 10] = [
    ("LineItem", "STRING", "Line number (e.g., 1, 10, 20)"),
    ("VendorItemNumber", "STRING", "Vendor Part Number / Material Number"),
    ("ItemDescription", "STRING", "Description of the item"),
    ("QuantityOrdered", "NUMBER", "Quantity"),
    ("UnitOfMeasure", "STRING", "UOM (e.g. EACH, PC)"),
    ("CostEach", "NUMBER", "Unit Price"),
    ("CostExtended", "NUMBER", "Total Line Amount"),
    ("DateRequired", "STRING", "Delivery Date"),
    ("CustomerReference", "STRING", "Customer Ref / Equipment Material"),
    ("SOReference", "STRING", "Sales Order Reference / SO Line"),
];

fn field_type_name(field_type: FieldType) -> &'static str {
    match field_type {
        FieldType::Number => "NUMBER",
        // Dates travel as text.
        FieldType::String | FieldType::Date => "STRING",
    }
}

fn header_property(field: &SchemaField, nullable: bool) -> Value {
    let mut prop = json!({
        "type": field_type_name(field.field_type),
        "description": field.description,
    });
    if nullable {
        prop["nullable"] = Value::Bool(true);
    }
    prop
}

fn line_item_schema(with_descriptions: bool) -> Value {
    let properties: Map<String, Value> = LINE_ITEM_PROPERTIES
        .iter()
        .map(|(name, ty, description)| {
            let prop = if with_descriptions {
                json!({"type": ty, "description": description})
            } else {
                json!({"type": ty})
            };
            (name.to_string(), prop)
        })
        .collect();

    json!({"type": "OBJECT", "properties": properties})
}

fn unmapped_entry_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "key": {"type": "STRING"},
            "value": {"type": "STRING"}
        }
    })
}

/// Structured-output schema for a full extraction result.
///
/// Every schema field is required in `mappedData` and gets a matching
/// confidence entry.
pub fn compile_response_schema(rules: &TrainingRules) -> Value {
    let mut mapped = Map::new();
    let mut confidence = Map::new();

    for field in &rules.schema {
        mapped.insert(field.name.clone(), header_property(field, false));
        confidence.insert(
            field.name.clone(),
            json!({
                "type": "NUMBER",
                "description": format!("Confidence score (0.0-1.0) for {}", field.name),
            }),
        );
    }

    json!({
        "type": "OBJECT",
        "properties": {
            "mappedData": {
                "type": "OBJECT",
                "description": "The Header fields of the Purchase Order / Invoice",
                "properties": mapped,
                "required": rules.field_names(),
            },
            "lineItems": {
                "type": "ARRAY",
                "description": "List of all line items in the Purchase Order grid",
                "items": line_item_schema(true),
            },
            "unmappedData": {
                "type": "ARRAY",
                "description": "Any other important key-value pairs not found in mappedData or lineItems",
                "items": unmapped_entry_schema(),
            },
            "termsAndConditions": {"type": "STRING"},
            "confidence": {"type": "OBJECT", "properties": confidence},
        }
    })
}

/// Structured-output schema for a partial feedback update.
///
/// All sections are nullable so the model can omit what did not change.
pub fn compile_feedback_schema(rules: &TrainingRules) -> Value {
    let mapped: Map<String, Value> = rules
        .schema
        .iter()
        .map(|field| (field.name.clone(), header_property(field, true)))
        .collect();

    json!({
        "type": "OBJECT",
        "properties": {
            "updatedMappedData": {
                "type": "OBJECT",
                "properties": mapped,
                "nullable": true,
            },
            "updatedLineItems": {
                "type": "ARRAY",
                "nullable": true,
                "items": line_item_schema(false),
            },
            "updatedUnmappedData": {
                "type": "ARRAY",
                "nullable": true,
                "items": unmapped_entry_schema(),
            },
            "suggestedRule": {"type": "STRING"},
        }
    })
}

/// Comma-separated field names for local-model prompts.
pub fn field_list(rules: &TrainingRules) -> String {
    rules.field_names().join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_response_schema_types_and_required() {
        let rules = TrainingRules::default();
        let schema = compile_response_schema(&rules);

        let mapped = &schema["properties"]["mappedData"];
        assert_eq!(mapped["properties"]["total_amount"]["type"], "NUMBER");
        assert_eq!(mapped["properties"]["order_date"]["type"], "STRING");
        assert_eq!(
            mapped["required"],
            json!(["po_number", "customer_name", "total_amount", "order_date", "delivery_address"])
        );
        assert_eq!(
            schema["properties"]["confidence"]["properties"]["po_number"]["type"],
            "NUMBER"
        );
        assert_eq!(
            schema["properties"]["lineItems"]["items"]["properties"]["CostEach"]["type"],
            "NUMBER"
        );
        assert!(mapped["properties"]["po_number"].get("nullable").is_none());
    }

    #[test]
    fn test_feedback_schema_is_nullable() {
        let rules = TrainingRules::default();
        let schema = compile_feedback_schema(&rules);
        let props = &schema["properties"];

        assert_eq!(props["updatedMappedData"]["nullable"], true);
        assert_eq!(props["updatedMappedData"]["properties"]["po_number"]["nullable"], true);
        assert_eq!(props["updatedLineItems"]["nullable"], true);
        assert_eq!(props["updatedUnmappedData"]["nullable"], true);
        assert_eq!(props["suggestedRule"]["type"], "STRING");
    }

    #[test]
    fn test_field_list() {
        let rules = TrainingRules {
            schema: vec![
                SchemaField::new("po_number", FieldType::String, ""),
                SchemaField::new("total", FieldType::Number, ""),
            ],
            natural_language_rules: String::new(),
            conditional_rules: Vec::new(),
        };
        assert_eq!(field_list(&rules), "po_number, total");
    }
}
