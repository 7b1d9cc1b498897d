//! Conversion of formatted messages into flat field sets.
//!
//! Messages reaching the shipping handler carry a JSON object. Nested objects
//! are flattened into dotted keys (`{"user": {"id": 7}}` becomes
//! `{"user.id": 7}`) so the collector receives one level of fields. Arrays and
//! scalars are kept as they are.

use serde_json::{Map, Value};
use thiserror::Error;

/// Reasons a message cannot become a field set.
#[derive(Debug, Error)]
pub enum FieldParseError {
    #[error("message is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("message is JSON but not an object")]
    NotAnObject,
}

/// Parse `message` as a JSON object and flatten it.
pub fn parse_fields(message: &str) -> Result<Map<String, Value>, FieldParseError> {
    match serde_json::from_str::<Value>(message)? {
        Value::Object(map) => Ok(flatten(map)),
        _ => Err(FieldParseError::NotAnObject),
    }
}

/// Flatten nested objects into dotted keys.
pub fn flatten(map: Map<String, Value>) -> Map<String, Value> {
    let mut out = Map::new();
    flatten_into(&mut out, None, map);
    out
}

fn flatten_into(out: &mut Map<String, Value>, prefix: Option<&str>, map: Map<String, Value>) {
    for (key, value) in map {
        let key = match prefix {
            Some(prefix) => format!("{prefix}.{key}"),
            None => key,
        };
        match value {
            Value::Object(inner) if !inner.is_empty() => flatten_into(out, Some(&key), inner),
            other => {
                out.insert(key, other);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    #[rstest]
    fn empty_object_yields_empty_field_set() {
        let fields = parse_fields("{}").expect("empty object parses");
        assert!(fields.is_empty());
    }

    #[rstest]
    fn nested_objects_become_dotted_keys() {
        let fields = parse_fields(r#"{"user":{"id":7,"geo":{"city":"Leeds"}},"msg":"hi"}"#)
            .expect("object parses");
        assert_eq!(fields.get("user.id"), Some(&json!(7)));
        assert_eq!(fields.get("user.geo.city"), Some(&json!("Leeds")));
        assert_eq!(fields.get("msg"), Some(&json!("hi")));
        assert_eq!(fields.len(), 3);
    }

    #[rstest]
    fn arrays_are_left_intact() {
        let fields = parse_fields(r#"{"tags":["a","b"]}"#).expect("object parses");
        assert_eq!(fields.get("tags"), Some(&json!(["a", "b"])));
    }

    #[rstest]
    #[case("plain text")]
    #[case("[1, 2]")]
    #[case("42")]
    fn non_objects_are_rejected(#[case] message: &str) {
        assert!(parse_fields(message).is_err());
    }
}
