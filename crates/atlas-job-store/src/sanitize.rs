//! Oversize-result sanitization (§4.1, §8).
//!
//! If a job's serialized `result` exceeds the store's per-item cap,
//! replace it with a small placeholder that still carries the
//! truncation flag and a best-effort partial, rather than failing the
//! whole write.

use atlas_types::ExtractedValue;
use std::collections::BTreeMap;

/// Conservative item-size cap modeled on common KV-store limits
/// (e.g. a 400 KB DynamoDB item, minus headroom for the rest of the
/// record).
pub const STORE_ITEM_CAP_BYTES: usize = 380_000;

/// How much of the original payload to preserve (stringified) inside
/// the truncated placeholder's `partial` field.
const PARTIAL_PREVIEW_BYTES: usize = 2_000;

pub fn sanitize_result(result: ExtractedValue) -> ExtractedValue {
    if result.serialized_len() <= STORE_ITEM_CAP_BYTES {
        return result;
    }

    let serialized = serde_json::to_string(&result).unwrap_or_default();
    let preview: String = serialized.chars().take(PARTIAL_PREVIEW_BYTES).collect();

    let mut map = BTreeMap::new();
    map.insert("_truncated".to_string(), ExtractedValue::Bool(true));
    map.insert(
        "_reason".to_string(),
        ExtractedValue::String(format!(
            "serialized result exceeded {STORE_ITEM_CAP_BYTES} byte store cap"
        )),
    );
    map.insert("partial".to_string(), ExtractedValue::String(preview));
    ExtractedValue::Object(map)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_results_pass_through_untouched() {
        let value = ExtractedValue::String("Example Domain".to_string());
        let sanitized = sanitize_result(value.clone());
        assert_eq!(sanitized, value);
    }

    #[test]
    fn oversize_results_are_flagged_and_truncated() {
        let big_string = "x".repeat(STORE_ITEM_CAP_BYTES + 1000);
        let value = ExtractedValue::String(big_string);
        let sanitized = sanitize_result(value);
        let obj = sanitized.as_object().expect("truncated result is an object");
        assert_eq!(obj.get("_truncated"), Some(&ExtractedValue::Bool(true)));
        assert!(obj.contains_key("partial"));
        assert!(sanitized.serialized_len() < STORE_ITEM_CAP_BYTES);
    }
}
