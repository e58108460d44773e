use netrec_schemas::canonical::{canonical_string, sha256_hex};
use serde::Serialize;

/// Content-addressed key: `tool_results/{tool}_{sha256(tool, canonical params)}`.
///
/// Params are canonicalised (keys sorted recursively) first, so maps built
/// in a different insertion order share a key.
pub fn cache_key<P: Serialize>(tool: &str, params: &P) -> Result<String, serde_json::Error> {
    let canonical = canonical_string(params)?;
    let mut material = Vec::with_capacity(tool.len() + 1 + canonical.len());
    material.extend_from_slice(tool.as_bytes());
    material.push(b'\n');
    material.extend_from_slice(canonical.as_bytes());
    Ok(format!(
        "tool_results/{}_{}",
        sanitize(tool),
        sha256_hex(&material)
    ))
}

/// Tool names end up in file names.
fn sanitize(tool: &str) -> String {
    tool.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}
