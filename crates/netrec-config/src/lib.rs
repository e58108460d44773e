//! netrec-config
//!
//! Layered YAML configuration for reconciliation runs.
//!
//! - Documents are merged in order: earlier docs are base, later docs override.
//! - The merged document is canonicalized (keys sorted) and hashed; the hash is
//!   recorded on every run so a report can be tied to the exact settings that
//!   produced it.
//! - Literal secrets are refused. Config stores env var NAMES only.
//! - [`NetrecConfig`] is the typed view every other crate consumes.

mod consumption;
mod pointer;
mod secrets;
mod settings;

use std::fs;

use anyhow::{Context, Result};
use netrec_schemas::canonical::{canonical_string, sha256_hex};
use serde_json::{Map, Value};

pub use consumption::{
    consumed_pointers_for_mode, report_unused_keys, ConfigMode, UnusedKeyPolicy, UnusedKeyReport,
};
pub use settings::*;

#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config_hash: String,
    pub canonical_json: String,
    pub config_json: Value,
}

impl LoadedConfig {
    /// Typed settings view over the merged document.
    pub fn settings(&self) -> Result<NetrecConfig> {
        NetrecConfig::from_config_json(&self.config_json)
    }
}

/// Read and merge YAML files in order.
pub fn load_layered_yaml(paths: &[&str]) -> Result<LoadedConfig> {
    let docs = paths
        .iter()
        .map(|p| fs::read_to_string(p).with_context(|| format!("read config layer: {p}")))
        .collect::<Result<Vec<_>>>()?;
    let refs: Vec<&str> = docs.iter().map(String::as_str).collect();
    load_layered_yaml_from_strings(&refs)
}

pub fn load_layered_yaml_from_strings(yaml_docs: &[&str]) -> Result<LoadedConfig> {
    let mut merged = Value::Object(Map::new());
    for (i, raw) in yaml_docs.iter().enumerate() {
        let layer: serde_yaml::Value =
            serde_yaml::from_str(raw).with_context(|| format!("config layer {i}: invalid yaml"))?;
        // An empty document parses to null and contributes nothing.
        if layer.is_null() {
            continue;
        }
        let layer = serde_json::to_value(layer)
            .with_context(|| format!("config layer {i}: not representable as json"))?;
        overlay(&mut merged, layer);
    }

    secrets::reject_secret_literals(&merged)?;

    let canonical_json = canonical_string(&merged).context("canonicalize merged config")?;
    Ok(LoadedConfig {
        config_hash: sha256_hex(canonical_json.as_bytes()),
        canonical_json,
        config_json: merged,
    })
}

/// Objects merge key by key; anything else in `top` replaces `base`.
fn overlay(base: &mut Value, top: Value) {
    match (base, top) {
        (Value::Object(base_map), Value::Object(top_map)) => {
            for (k, v) in top_map {
                overlay(base_map.entry(k).or_insert(Value::Null), v);
            }
        }
        (slot, top) => *slot = top,
    }
}
