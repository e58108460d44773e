//! Literal-credential guard.
//!
//! Config stores env var NAMES only. A leaf that looks like a credential
//! aborts the load; the error names the pointer, never the value.

use anyhow::{bail, Result};
use serde_json::Value;

use crate::pointer::leaves;

/// Prefixes of well-known credential formats.
const SECRET_PREFIXES: &[&str] = &[
    "-----BEGIN", // PEM private keys
    "AKIA",       // AWS access key ID
    "ghp_",       // GitHub PAT
    "glpat-",     // GitLab PAT
    "xoxb-",      // Slack bot token
    "xoxp-",      // Slack user token
    "$9$",        // Junos reversible secret
    "$1$",        // crypt-md5 (IOS enable secret 5)
    "Bearer ",    // pasted HTTP auth header
];

/// Shorter values are too ambiguous to call a secret.
const MIN_SECRET_LEN: usize = 8;

pub(crate) fn reject_secret_literals(config: &Value) -> Result<()> {
    let hit = leaves(config)
        .into_iter()
        .find(|(_, v)| v.as_str().is_some_and(looks_like_secret));
    if let Some((ptr, _)) = hit {
        bail!("CONFIG_SECRET_DETECTED leaf={ptr} value=REDACTED");
    }
    Ok(())
}

fn looks_like_secret(s: &str) -> bool {
    let t = s.trim();
    t.len() >= MIN_SECRET_LEN && SECRET_PREFIXES.iter().any(|p| t.starts_with(p))
}
