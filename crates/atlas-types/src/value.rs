//! Opaque, dynamically-shaped extraction results.
//!
//! §9 of the spec calls for a recursive sum type rather than a typed
//! struct, since callers supply arbitrary output shapes. The
//! orchestrator never inspects the interior of a value beyond
//! counting items in a declared array field or a length hint — it
//! stays opaque end to end.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ExtractedValue {
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Array(Vec<ExtractedValue>),
    Object(BTreeMap<String, ExtractedValue>),
}

impl ExtractedValue {
    pub fn as_object(&self) -> Option<&BTreeMap<String, ExtractedValue>> {
        match self {
            ExtractedValue::Object(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[ExtractedValue]> {
        match self {
            ExtractedValue::Array(items) => Some(items),
            _ => None,
        }
    }

    /// Count items via a declared array field, falling back to a
    /// top-level `count`/`length` hint, per §9's "counts items only
    /// via declared array fields or a top-level length hint."
    pub fn item_count(&self, array_field: Option<&str>) -> Option<usize> {
        match self {
            ExtractedValue::Array(items) => Some(items.len()),
            ExtractedValue::Object(map) => {
                if let Some(field) = array_field {
                    if let Some(ExtractedValue::Array(items)) = map.get(field) {
                        return Some(items.len());
                    }
                }
                for hint in ["count", "length", "total"] {
                    if let Some(ExtractedValue::Number(n)) = map.get(hint) {
                        return Some(*n as usize);
                    }
                }
                None
            }
            _ => None,
        }
    }

    pub fn serialized_len(&self) -> usize {
        serde_json::to_vec(self).map(|v| v.len()).unwrap_or(0)
    }
}

impl From<serde_json::Value> for ExtractedValue {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => ExtractedValue::Null,
            serde_json::Value::Bool(b) => ExtractedValue::Bool(b),
            serde_json::Value::Number(n) => ExtractedValue::Number(n.as_f64().unwrap_or_default()),
            serde_json::Value::String(s) => ExtractedValue::String(s),
            serde_json::Value::Array(items) => {
                ExtractedValue::Array(items.into_iter().map(ExtractedValue::from).collect())
            }
            serde_json::Value::Object(map) => ExtractedValue::Object(
                map.into_iter()
                    .map(|(k, v)| (k, ExtractedValue::from(v)))
                    .collect(),
            ),
        }
    }
}

impl From<ExtractedValue> for serde_json::Value {
    fn from(value: ExtractedValue) -> Self {
        match value {
            ExtractedValue::Null => serde_json::Value::Null,
            ExtractedValue::Bool(b) => serde_json::Value::Bool(b),
            ExtractedValue::Number(n) => serde_json::Number::from_f64(n)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            ExtractedValue::String(s) => serde_json::Value::String(s),
            ExtractedValue::Array(items) => {
                serde_json::Value::Array(items.into_iter().map(Into::into).collect())
            }
            ExtractedValue::Object(map) => serde_json::Value::Object(
                map.into_iter().map(|(k, v)| (k, v.into())).collect(),
            ),
        }
    }
}

/// Where a value came from, carried alongside the value rather than
/// embedded inside it (keeps the value itself caller-shaped).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Provenance {
    pub source_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

impl Provenance {
    pub fn new(source_url: impl Into<String>) -> Self {
        Self {
            source_url: source_url.into(),
            selector: None,
            confidence: None,
        }
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = Some(confidence);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_json() {
        let original = serde_json::json!({"title": "Example Domain", "count": 3});
        let value: ExtractedValue = original.clone().into();
        let back: serde_json::Value = value.into();
        assert_eq!(original, back);
    }

    #[test]
    fn item_count_prefers_declared_array_field() {
        let value: ExtractedValue = serde_json::json!({
            "articles": [{"title": "a"}, {"title": "b"}],
            "count": 99,
        })
        .into();
        assert_eq!(value.item_count(Some("articles")), Some(2));
    }

    #[test]
    fn item_count_falls_back_to_length_hint() {
        let value: ExtractedValue = serde_json::json!({"total": 7}).into();
        assert_eq!(value.item_count(None), Some(7));
    }
}
