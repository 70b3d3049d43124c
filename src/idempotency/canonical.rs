//! Deterministic JSON serialization.
//!
//! Fingerprints must be byte-identical for semantically equal requests, so
//! the serializer is explicit: object keys in lexicographic order, no
//! incidental whitespace, and no reliance on a library's map ordering.

use serde_json::Value;

/// Serialize a JSON value canonically.
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_value(&mut out, value);
    out
}

fn write_value(out: &mut String, value: &Value) {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Number(n) => out.push_str(&n.to_string()),
        Value::String(s) => write_string(out, s),
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_value(out, item);
            }
            out.push(']');
        }
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();

            out.push('{');
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_string(out, key);
                out.push(':');
                // Key came from the map, the value is present by construction.
                if let Some(v) = map.get(*key) {
                    write_value(out, v);
                }
            }
            out.push('}');
        }
    }
}

fn write_string(out: &mut String, s: &str) {
    // serde_json's escaping is already deterministic for a given string.
    match serde_json::to_string(s) {
        Ok(escaped) => out.push_str(&escaped),
        Err(_) => {
            out.push('"');
            out.push_str(s);
            out.push('"');
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sorts_keys_recursively() {
        let value = serde_json::json!({
            "b": {"z": 1, "a": 2},
            "a": [{"y": true, "x": false}],
        });
        assert_eq!(
            canonical_json(&value),
            r#"{"a":[{"x":false,"y":true}],"b":{"a":2,"z":1}}"#
        );
    }

    #[test]
    fn test_no_incidental_whitespace() {
        let value = serde_json::json!({"k": [1, 2, 3], "s": "v"});
        assert_eq!(canonical_json(&value), r#"{"k":[1,2,3],"s":"v"}"#);
    }

    #[test]
    fn test_scalars() {
        assert_eq!(canonical_json(&Value::Null), "null");
        assert_eq!(canonical_json(&serde_json::json!(true)), "true");
        assert_eq!(canonical_json(&serde_json::json!(42)), "42");
        assert_eq!(canonical_json(&serde_json::json!("a\"b")), r#""a\"b""#);
    }

    #[test]
    fn test_equal_objects_serialize_identically() {
        let a: Value = serde_json::from_str(r#"{"x": 1, "y": {"b": 2, "a": 3}}"#).unwrap();
        let b: Value = serde_json::from_str(r#"{"y": {"a": 3, "b": 2}, "x": 1}"#).unwrap();
        assert_eq!(canonical_json(&a), canonical_json(&b));
    }
}
