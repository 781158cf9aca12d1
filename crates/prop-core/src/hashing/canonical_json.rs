//! Canonical JSON minimal: claves ordenadas, sin espacios.
//!
//! Es la forma sobre la que se calculan hashes de artifacts, fingerprints y
//! claves de idempotencia. Dos `Value` equivalentes producen el mismo string.

use serde_json::Value;
use std::collections::BTreeMap;

pub fn to_canonical_json(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => quote(s),
        Value::Array(arr) => {
            let items: Vec<String> = arr.iter().map(to_canonical_json).collect();
            format!("[{}]", items.join(","))
        }
        Value::Object(map) => {
            let tree: BTreeMap<&String, String> = map.iter().map(|(k, v)| (k, to_canonical_json(v))).collect();
            let items: Vec<String> = tree.into_iter()
                                         .map(|(k, v)| format!("{}:{}", quote(k), v))
                                         .collect();
            format!("{{{}}}", items.join(","))
        }
    }
}

// serde_json escapa un &str sin posibilidad de error; el fallback nunca se usa.
fn quote(s: &str) -> String {
    serde_json::to_string(s).unwrap_or_else(|_| format!("\"{}\"", s.escape_default()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn keys_are_sorted_recursively() {
        let a = json!({"b": 1, "a": {"d": [1, 2], "c": null}});
        assert_eq!(to_canonical_json(&a), r#"{"a":{"c":null,"d":[1,2]},"b":1}"#);
    }

    #[test]
    fn equivalent_objects_share_canonical_form() {
        let a = json!({"x": "1", "y": 2.5});
        let b = json!({"y": 2.5, "x": "1"});
        assert_eq!(to_canonical_json(&a), to_canonical_json(&b));
    }
}
