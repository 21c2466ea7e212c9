//! Order-preserving JSON loading and recursive key normalization.

use crate::error::{Error, Result};
use serde_json::Value;
use std::fs;
use std::path::Path;

/// Reads and parses a JSON file. Object key order is preserved (via
/// `serde_json`'s `preserve_order` feature) the same way a Python `dict`
/// preserves insertion order when read with the stdlib `json` module.
pub fn load_json(path: &Path) -> Result<Value> {
    let content = fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
    serde_json::from_str(&content).map_err(|e| Error::json(path, e))
}

/// Recursively lower-cases every object key in a JSON value, so that lookups
/// like `manifest["Config"]` and `manifest["config"]` resolve to the same
/// value regardless of which casing a particular `docker save` producer used.
pub fn normalize_keys(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut out = serde_json::Map::with_capacity(map.len());
            for (k, v) in map {
                out.insert(k.to_lowercase(), normalize_keys(v));
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.into_iter().map(normalize_keys).collect()),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn lowercases_nested_keys() {
        let input = json!({"Config": {"Cmd": ["/bin/sh"]}, "Layers": ["a", "b"]});
        let normalized = normalize_keys(input);
        assert_eq!(normalized["config"]["cmd"][0], "/bin/sh");
        assert_eq!(normalized["layers"][1], "b");
    }

    #[test]
    fn preserves_insertion_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("obj.json");
        fs::write(&path, r#"{"z": 1, "a": 2, "m": 3}"#).unwrap();
        let value = load_json(&path).unwrap();
        let keys: Vec<_> = value.as_object().unwrap().keys().collect();
        assert_eq!(keys, vec!["z", "a", "m"]);
    }
}
