use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use netrec_schemas::{Attributes, EntityKind, Observation, SourceOfTruthRecord};
use serde_json::Value;

/// Attribute map from a `json!` object. Panics on non-objects; fixtures only.
pub fn attrs(v: Value) -> Attributes {
    match v {
        Value::Object(map) => map.into_iter().collect(),
        other => panic!("attrs fixture must be a JSON object, got {other}"),
    }
}

pub fn obs(hostname: &str, kind: EntityKind, timestamp: i64, active: bool, attributes: Value) -> Observation {
    Observation::new("default", hostname, kind, timestamp, active, attrs(attributes))
}

/// Interface observation; `extra` is merged over `{ifName}`.
pub fn interface_obs(hostname: &str, if_name: &str, timestamp: i64, active: bool, extra: Value) -> Observation {
    let mut a = attrs(extra);
    a.insert("ifName".to_string(), Value::String(if_name.to_string()));
    Observation::new("default", hostname, EntityKind::Interface, timestamp, active, a)
}

pub fn record(hostname: &str, kind: EntityKind, attributes: Value) -> SourceOfTruthRecord {
    SourceOfTruthRecord::new(kind, hostname, attrs(attributes))
}

pub fn interface_record(hostname: &str, if_name: &str, extra: Value) -> SourceOfTruthRecord {
    let mut a = attrs(extra);
    a.insert("ifName".to_string(), Value::String(if_name.to_string()));
    SourceOfTruthRecord::new(EntityKind::Interface, hostname, a)
}

/// Write records in the on-disk inventory format (a JSON array).
pub fn write_inventory_json(path: &Path, records: &[SourceOfTruthRecord]) -> Result<()> {
    let body = serde_json::to_string_pretty(records).context("serialize inventory")?;
    fs::write(path, body).with_context(|| format!("write inventory: {}", path.display()))?;
    Ok(())
}
