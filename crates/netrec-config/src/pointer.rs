//! JSON-pointer helpers over a merged config tree.

use serde_json::Value;

/// Every scalar leaf of `v` with its pointer. Empty objects and arrays have
/// no leaves.
pub(crate) fn leaves(v: &Value) -> Vec<(String, &Value)> {
    let mut out = Vec::new();
    walk(v, "", &mut out);
    out
}

fn walk<'a>(v: &'a Value, at: &str, out: &mut Vec<(String, &'a Value)>) {
    match v {
        Value::Object(map) => {
            for (k, child) in map {
                walk(child, &format!("{at}/{}", escape(k)), out);
            }
        }
        Value::Array(items) => {
            for (i, child) in items.iter().enumerate() {
                walk(child, &format!("{at}/{i}"), out);
            }
        }
        scalar => {
            let ptr = if at.is_empty() { "/".to_string() } else { at.to_string() };
            out.push((ptr, scalar));
        }
    }
}

fn escape(token: &str) -> String {
    token.replace('~', "~0").replace('/', "~1")
}

fn segments(ptr: &str) -> Vec<&str> {
    ptr.split('/').filter(|s| !s.is_empty()).collect()
}

/// `engine/` and `/engine` both become `/engine`; the empty pointer is `/`.
pub(crate) fn normalize(ptr: &str) -> String {
    format!("/{}", segments(ptr.trim()).join("/"))
}

/// Whole-segment prefix test: `/engine` covers `/engine/mode` but not
/// `/engineering`.
pub(crate) fn covers(prefix: &str, leaf: &str) -> bool {
    let p = segments(prefix);
    let l = segments(leaf);
    p.len() <= l.len() && p.iter().zip(&l).all(|(a, b)| a == b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn prefix_match_is_per_segment() {
        assert!(covers("/engine", "/engine/concurrency"));
        assert!(covers("/engine", "/engine"));
        assert!(!covers("/engine", "/engineering/x"));
        assert!(covers("/", "/anything"));
        assert!(!covers("/engine/mode", "/engine"));
    }

    #[test]
    fn normalize_adds_slash_and_trims() {
        assert_eq!(normalize("engine/"), "/engine");
        assert_eq!(normalize(""), "/");
    }

    #[test]
    fn leaves_walk_arrays_and_escape_keys() {
        let v = json!({"a/b": {"c": [1, {"d": true}]}, "e": {}});
        let ptrs: Vec<String> = leaves(&v).into_iter().map(|(p, _)| p).collect();
        assert_eq!(ptrs, vec!["/a~1b/c/0", "/a~1b/c/1/d"]);
    }
}
