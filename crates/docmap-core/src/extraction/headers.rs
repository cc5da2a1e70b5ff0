//! Header field extraction for the local pipeline.
//!
//! Two strategies: a small local model prompted with an excerpt of the
//! reconstructed text, and label-alias regexes over the raw OCR text. The
//! model strategy falls back to the regexes whenever it yields nothing.

use std::collections::HashMap;

use lazy_static::lazy_static;
use regex::Regex;
use tracing::{debug, trace};

use super::json::parse_json_value;
use super::patterns::{HEADER_NUMBER, LEADING_PUNCT};
use crate::models::result::{FieldMap, FieldValue};
use crate::models::schema::{FieldType, SchemaField, TrainingRules};

lazy_static! {
    /// Printed label synonyms for the standard order fields, in priority order.
    static ref ALIAS_MAP: HashMap<&'static str, &'static [&'static str]> = {
        let mut m: HashMap<&'static str, &'static [&'static str]> = HashMap::new();
        m.insert("po_number", &[
            "PO Number", "Purchase Order", "Order No", "PO #", "P.O.", "Order Number", "Reference No",
        ]);
        m.insert("customer_name", &["Customer", "Bill To", "Sold To", "Client", "Billed To"]);
        m.insert("total_amount", &[
            "Total", "Grand Total", "Total Amount", "Amount Due", "Balance", "Total Incl",
        ]);
        m.insert("order_date", &["Date", "Order Date", "Invoice Date", "Dated", "Issue Date"]);
        m.insert("delivery_address", &[
            "Ship To", "Delivery Address", "Shipping Address", "Destination", "Consignee",
        ]);
        m
    };
}

/// Labels tried for a field: its aliases, or its name with and without
/// underscores.
pub fn labels_for(field_name: &str) -> Vec<String> {
    match ALIAS_MAP.get(field_name) {
        Some(aliases) => aliases.iter().map(|a| a.to_string()).collect(),
        None => vec![field_name.to_string(), field_name.replace('_', " ")],
    }
}

/// Extract header fields by label regexes.
///
/// For each field the labels are tried in order; the first label followed by
/// a usable value on the same line wins. Number fields take the first
/// numeric run with thousands separators removed.
pub fn regex_extract_headers(text: &str, schema: &[SchemaField]) -> FieldMap {
    let mut mapped = FieldMap::new();

    for field in schema {
        for label in labels_for(&field.name) {
            let Ok(re) = Regex::new(&format!(r"(?i){}[:\s\-\.]*([^\n]+)", regex::escape(&label)))
            else {
                continue;
            };
            let Some(raw) = re.captures(text).and_then(|c| c.get(1)) else {
                continue;
            };

            if let Some(value) = field_value(field.field_type, raw.as_str().trim()) {
                trace!("Header {} matched label {:?}", field.name, label);
                mapped.insert(field.name.clone(), value);
                break;
            }
        }
    }

    debug!("Regex header extraction found {} of {} fields", mapped.len(), schema.len());
    mapped
}

fn field_value(field_type: FieldType, raw: &str) -> Option<FieldValue> {
    match field_type {
        FieldType::Number => {
            let digits = HEADER_NUMBER.find(raw)?.as_str().replace(',', "");
            digits
                .parse::<f64>()
                .ok()
                .filter(|n| n.is_finite())
                .map(FieldValue::Number)
        }
        FieldType::String | FieldType::Date => {
            let value = LEADING_PUNCT.replace(raw, "");
            (!value.is_empty()).then(|| FieldValue::Text(value.into_owned()))
        }
    }
}

/// Prompt asking the local model for header fields as JSON.
pub fn header_prompt(spatial_text: &str, rules: &TrainingRules, excerpt_chars: usize) -> String {
    let excerpt: String = spatial_text.chars().take(excerpt_chars).collect();
    format!(
        "Extract these details from the invoice: {}.\n\nText:\n{}\n\nReturn strict JSON format like {{\"po_number\": \"...\", \"date\": \"...\"}}.",
        super::schema::field_list(rules),
        excerpt
    )
}

/// Header fields from local model output, restricted to schema fields.
///
/// `None` when no JSON object can be recovered or it holds no schema field.
pub fn parse_model_headers(output: &str, rules: &TrainingRules) -> Option<FieldMap> {
    let value = match parse_json_value(output) {
        Ok(value) => value,
        Err(e) => {
            debug!("Local model output unusable: {}", e);
            return None;
        }
    };

    let object = value.as_object()?;
    let mapped: FieldMap = rules
        .schema
        .iter()
        .filter_map(|field| {
            let value = FieldValue::from_json(object.get(&field.name)?.clone())?;
            Some((field.name.clone(), value))
        })
        .collect();

    (!mapped.is_empty()).then_some(mapped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const OCR_TEXT: &str = "\
ACME Industrial Supply
Purchase Order: 4500012345
Bill To: Northwind Traders
Order Date - 2024-03-18
Ship To: 12 Harbour Rd, Bristol
Grand Total $1,234.50
";

    #[test]
    fn test_regex_headers_with_aliases() {
        let rules = TrainingRules::default();
        let mapped = regex_extract_headers(OCR_TEXT, &rules.schema);

        assert_eq!(mapped["po_number"], FieldValue::from("4500012345"));
        assert_eq!(mapped["customer_name"], FieldValue::from("Northwind Traders"));
        assert_eq!(mapped["order_date"], FieldValue::from("2024-03-18"));
        assert_eq!(mapped["delivery_address"], FieldValue::from("12 Harbour Rd, Bristol"));
        // "Total" matches first; the value is the first numeric run after it.
        assert_eq!(mapped["total_amount"], FieldValue::Number(1234.5));
    }

    #[test]
    fn test_custom_field_uses_name_as_label() {
        let schema = vec![
            SchemaField::new("ship_via", FieldType::String, ""),
            SchemaField::new("freight", FieldType::Number, ""),
        ];
        let mapped = regex_extract_headers("Ship Via: UPS Ground\nfreight: n/a\n", &schema);

        assert_eq!(mapped.get("ship_via"), Some(&FieldValue::from("UPS Ground")));
        assert_eq!(mapped.get("freight"), None);
    }

    #[test]
    fn test_labels_for() {
        assert_eq!(labels_for("order_date")[0], "Date");
        assert_eq!(labels_for("ship_via"), vec!["ship_via", "ship via"]);
    }

    #[test]
    fn test_model_headers_filtered_to_schema() {
        let rules = TrainingRules::default();
        let output = "Sure: {\"po_number\": \"PO-9\", \"date\": \"2024-01-01\", \"total_amount\": 99.5, \"customer_name\": null}";

        let mapped = parse_model_headers(output, &rules).unwrap();

        assert_eq!(mapped.len(), 2);
        assert_eq!(mapped["po_number"], FieldValue::from("PO-9"));
        assert_eq!(mapped["total_amount"], FieldValue::Number(99.5));
    }

    #[test]
    fn test_model_headers_none_when_unusable() {
        let rules = TrainingRules::default();
        assert_eq!(parse_model_headers("I cannot help with that.", &rules), None);
        assert_eq!(parse_model_headers("{\"date\": \"2024\"}", &rules), None);
        assert_eq!(parse_model_headers("{}", &rules), None);
    }

    #[test]
    fn test_prompt_truncates_excerpt() {
        let rules = TrainingRules::default();
        let prompt = header_prompt(&"#".repeat(5000), &rules, 1000);
        assert!(prompt.contains("po_number, customer_name, total_amount, order_date, delivery_address"));
        assert_eq!(prompt.matches('#').count(), 1000);
    }
}
