//! Canonical JSON: keys sorted recursively, compact output.
//!
//! Two documents that differ only in key insertion order canonicalize to the
//! same bytes, which is what config hashing, cache keys and the audit hash
//! chain all rely on.

use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};

pub fn sort_keys(v: &Value) -> Value {
    match v {
        Value::Object(map) => {
            let mut keys: Vec<_> = map.keys().cloned().collect();
            keys.sort();
            let mut new = serde_json::Map::new();
            for k in keys {
                new.insert(k.clone(), sort_keys(&map[&k]));
            }
            Value::Object(new)
        }
        Value::Array(arr) => Value::Array(arr.iter().map(sort_keys).collect()),
        _ => v.clone(),
    }
}

/// Serialize `v` to a compact, key-sorted JSON string.
pub fn canonical_string<T: Serialize>(v: &T) -> Result<String, serde_json::Error> {
    let raw = serde_json::to_value(v)?;
    serde_json::to_string(&sort_keys(&raw))
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn insertion_order_does_not_matter() {
        let a = json!({"a": 1, "b": {"y": 2, "x": [ {"q": 1, "p": 2} ]}});
        let b = json!({"b": {"x": [ {"p": 2, "q": 1} ], "y": 2}, "a": 1});
        assert_eq!(canonical_string(&a).unwrap(), canonical_string(&b).unwrap());
    }

    #[test]
    fn array_order_is_preserved() {
        let a = json!([1, 2]);
        let b = json!([2, 1]);
        assert_ne!(canonical_string(&a).unwrap(), canonical_string(&b).unwrap());
    }
}
