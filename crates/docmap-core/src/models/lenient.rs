//! Tolerant serde helpers for model-produced JSON.
//!
//! Models return `null` for empty sections, numbers where strings were
//! requested and vice versa. These helpers normalise such output instead of
//! rejecting the whole response.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serializer};
use serde_json::Value;

use super::result::{FieldMap, FieldValue};

/// Treat `null` as the type's default.
pub fn null_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Header map; `null` entries are dropped.
pub fn field_map<'de, D>(deserializer: D) -> Result<FieldMap, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(opt_field_map(deserializer)?.unwrap_or_default())
}

/// Optional header map; `null` entries are dropped, a `null` map is `None`.
pub fn opt_field_map<'de, D>(deserializer: D) -> Result<Option<FieldMap>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<BTreeMap<String, Value>> = Option::deserialize(deserializer)?;
    Ok(raw.map(|map| {
        map.into_iter()
            .filter_map(|(k, v)| FieldValue::from_json(v).map(|v| (k, v)))
            .collect()
    }))
}

/// A single field value; `null` becomes empty text.
pub fn field_value<'de, D>(deserializer: D) -> Result<FieldValue, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Value::deserialize(deserializer)?;
    Ok(FieldValue::from_json(raw).unwrap_or_else(|| FieldValue::Text(String::new())))
}

/// String attribute that may arrive as a number or bool.
pub fn opt_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Null => None,
        Value::String(s) => Some(s),
        other => Some(other.to_string()),
    })
}

/// Numeric attribute that may arrive as a formatted string.
pub fn opt_number<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => parse_number(&s),
        _ => None,
    })
}

/// Write whole quantities as integers (`10`, not `10.0`).
pub fn opt_whole_number<S>(value: &Option<f64>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    const MAX_EXACT: f64 = 9_007_199_254_740_992.0;

    match value {
        Some(n) if n.fract() == 0.0 && n.abs() <= MAX_EXACT => serializer.serialize_i64(*n as i64),
        Some(n) => serializer.serialize_f64(*n),
        None => serializer.serialize_none(),
    }
}

/// Confidence scores clamped to [0, 1]; non-numeric entries are dropped.
pub fn confidence_map<'de, D>(deserializer: D) -> Result<BTreeMap<String, f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<BTreeMap<String, Value>> = Option::deserialize(deserializer)?;
    Ok(raw
        .unwrap_or_default()
        .into_iter()
        .filter_map(|(k, v)| v.as_f64().map(|score| (k, clamp_confidence(score))))
        .collect())
}

/// Clamp a score into [0, 1], mapping NaN to 0.
pub fn clamp_confidence(score: f64) -> f64 {
    if score.is_nan() {
        0.0
    } else {
        score.clamp(0.0, 1.0)
    }
}

/// Parse a number after stripping currency symbols, thousands separators
/// and whitespace.
pub fn parse_number(raw: &str) -> Option<f64> {
    let cleaned: String = raw
        .chars()
        .filter(|c| !matches!(c, '$' | ',' | ' ' | '\u{00a0}'))
        .collect();
    cleaned.parse::<f64>().ok().filter(|n| n.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_number() {
        assert_eq!(parse_number("$1,234.50"), Some(1234.5));
        assert_eq!(parse_number("12"), Some(12.0));
        assert_eq!(parse_number("n/a"), None);
        assert_eq!(parse_number(""), None);
    }

    #[test]
    fn test_clamp_confidence() {
        assert_eq!(clamp_confidence(1.7), 1.0);
        assert_eq!(clamp_confidence(-0.2), 0.0);
        assert_eq!(clamp_confidence(f64::NAN), 0.0);
        assert_eq!(clamp_confidence(0.42), 0.42);
    }
}
