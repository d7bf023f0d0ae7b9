//! `_type` discriminator extraction.
//!
//! Decoding a polymorphic slot is two-phase: peek the `_type` member, then fully decode the
//! payload into the shape the registry resolves for it. The peek skips every other member
//! without materialising it.

use crate::error::DecodeError;
use serde::Deserialize;
use serde_json::Value;

/// Wire name of the discriminator member.
pub const TYPE_FIELD: &str = "_type";

#[derive(Deserialize)]
struct Peek {
    #[serde(rename = "_type", default)]
    type_tag: Option<String>,
}

/// Extract `_type` from a serialised JSON object.
///
/// Returns `Ok(None)` if the object carries no `_type` (callers then apply the family default).
///
/// # Errors
///
/// Returns [`DecodeError::Json`] for malformed JSON and [`DecodeError::Discriminator`] if the
/// input is not an object or `_type` is not a string.
pub fn extract_discriminator(bytes: &[u8]) -> Result<Option<String>, DecodeError> {
    match serde_json::from_slice::<Peek>(bytes) {
        Ok(peek) => Ok(peek.type_tag),
        Err(err) if err.is_data() => Err(DecodeError::Discriminator(err.to_string())),
        Err(err) => Err(DecodeError::Json(err)),
    }
}

/// Peek `_type` on an already-parsed JSON value.
///
/// Non-object values have no discriminator.
///
/// # Errors
///
/// Returns a message if `_type` is present but not a string.
pub fn peek_discriminator(value: &Value) -> Result<Option<&str>, String> {
    match value.get(TYPE_FIELD) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(tag)) => Ok(Some(tag.as_str())),
        Some(other) => Err(format!("`_type` must be a string, got {other}")),
    }
}

/// Maximum nesting depth of a serialised JSON document.
///
/// A lexical scan over brackets outside string literals; nothing is parsed, so arbitrarily
/// deep input cannot exhaust the stack here.
pub(crate) fn json_depth(bytes: &[u8]) -> usize {
    let mut depth = 0usize;
    let mut max = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for &byte in bytes {
        if in_string {
            if escaped {
                escaped = false;
            } else if byte == b'\\' {
                escaped = true;
            } else if byte == b'"' {
                in_string = false;
            }
            continue;
        }
        match byte {
            b'"' => in_string = true,
            b'{' | b'[' => {
                depth += 1;
                max = max.max(depth);
            }
            b'}' | b']' => depth = depth.saturating_sub(1),
            _ => {}
        }
    }
    max
}

/// Maximum nesting depth of an in-memory JSON value, computed without recursion.
pub(crate) fn value_depth(value: &Value) -> usize {
    let mut max = 0usize;
    let mut stack = vec![(value, 1usize)];
    while let Some((current, depth)) = stack.pop() {
        match current {
            Value::Object(map) => {
                max = max.max(depth);
                stack.extend(map.values().map(|child| (child, depth + 1)));
            }
            Value::Array(items) => {
                max = max.max(depth);
                stack.extend(items.iter().map(|child| (child, depth + 1)));
            }
            _ => {}
        }
    }
    max
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn extracts_tag_without_decoding_payload() {
        let bytes = br#"{"value": {"deeply": [1, 2, {"x": null}]}, "_type": "DV_TEXT"}"#;
        assert_eq!(
            extract_discriminator(bytes).expect("peek"),
            Some("DV_TEXT".to_string())
        );
    }

    #[test]
    fn missing_tag_is_none() {
        assert_eq!(extract_discriminator(br#"{"value": "x"}"#).expect("peek"), None);
    }

    #[test]
    fn non_object_and_non_string_tags_are_rejected() {
        assert!(matches!(
            extract_discriminator(br#""DV_TEXT""#),
            Err(DecodeError::Discriminator(_))
        ));
        assert!(matches!(
            extract_discriminator(br#"{"_type": 5}"#),
            Err(DecodeError::Discriminator(_))
        ));
        assert!(matches!(
            extract_discriminator(br#"{"_type": "#),
            Err(DecodeError::Json(_))
        ));
    }

    #[test]
    fn peek_on_values() {
        assert_eq!(peek_discriminator(&json!({"_type": "CLUSTER"})), Ok(Some("CLUSTER")));
        assert_eq!(peek_discriminator(&json!({"_type": null})), Ok(None));
        assert_eq!(peek_discriminator(&json!("text")), Ok(None));
        assert!(peek_discriminator(&json!({"_type": []})).is_err());
    }

    #[test]
    fn depth_scan_ignores_brackets_in_strings() {
        assert_eq!(json_depth(br#"{"a": "[[[{{{", "b": [{"c": 1}]}"#), 3);
        assert_eq!(json_depth(br#"{"a": "quote \" [[["}"#), 1);
        assert_eq!(json_depth(b"42"), 0);
    }

    #[test]
    fn value_depth_matches_byte_scan() {
        let value = json!({"items": [{"value": {"value": "x"}}]});
        let bytes = serde_json::to_vec(&value).expect("encode");
        assert_eq!(value_depth(&value), 4);
        assert_eq!(json_depth(&bytes), 4);
    }
}
