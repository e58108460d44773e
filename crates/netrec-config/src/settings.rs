//! Typed settings deserialized from the merged config document.
//!
//! Every field has a default so an empty document is a valid (dry-run,
//! in-memory) configuration.

use std::collections::BTreeMap;
use std::time::Duration;

use anyhow::{Context, Result};
use netrec_schemas::{EntityKind, MatchMode, Severity};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    #[default]
    DryRun,
    Live,
}

impl RunMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunMode::DryRun => "dry_run",
            RunMode::Live => "live",
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NetrecConfig {
    pub engine: EngineSettings,
    pub resolver: ResolverSettings,
    pub cache: CacheSettings,
    pub policy: PolicySettings,
    pub comparator: ComparatorSettings,
    pub reconcile: ReconcileSettings,
    pub audit: AuditSettings,
}

impl NetrecConfig {
    pub fn from_config_json(cfg: &Value) -> Result<Self> {
        serde_json::from_value(cfg.clone()).context("config does not match the settings schema")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Upper bound on concurrent (entity kind, device) workers.
    pub concurrency: usize,
    pub mode: RunMode,
    pub kinds: Vec<EntityKind>,
    /// Hostnames to reconcile. Empty = every hostname in the snapshot store.
    pub device_scope: Vec<String>,
    pub namespace: Option<String>,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            concurrency: 4,
            mode: RunMode::DryRun,
            kinds: EntityKind::KNOWN.to_vec(),
            device_scope: Vec::new(),
            namespace: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverSettings {
    /// 0 disables windowing.
    pub max_age_secs: u64,
}

impl ResolverSettings {
    pub fn max_age_ms(&self) -> i64 {
        i64::try_from(self.max_age_secs.saturating_mul(1000)).unwrap_or(i64::MAX)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    pub enabled: bool,
    pub ttl_secs: u64,
    /// Filesystem root for cached results. `None` keeps them in memory.
    pub root: Option<String>,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_secs: 300,
            root: None,
        }
    }
}

impl CacheSettings {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicySettings {
    /// Fields a live run may correct without approval.
    pub auto_correct_fields: Vec<String>,
}

impl Default for PolicySettings {
    fn default() -> Self {
        Self {
            auto_correct_fields: vec!["description".to_string(), "mtu".to_string()],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldRuleSettings {
    pub severity: Severity,
    #[serde(rename = "match", default = "default_match")]
    pub match_mode: MatchMode,
}

fn default_match() -> MatchMode {
    MatchMode::Exact
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ComparatorSettings {
    /// Fields never compared (telemetry bookkeeping, counters).
    pub ignore_fields: Vec<String>,
    /// Per-field overrides layered on top of the built-in rule table.
    pub rules: BTreeMap<String, FieldRuleSettings>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcileSettings {
    /// Pending approvals older than this are rejected with reason `timeout`.
    pub approval_timeout_secs: u64,
    /// Extra apply attempts after a failed correction. 0 = surface for re-run.
    pub retry_budget: u32,
    /// Directory for durable pending approvals. `None` keeps them in memory.
    pub state_dir: Option<String>,
}

impl Default for ReconcileSettings {
    fn default() -> Self {
        Self {
            approval_timeout_secs: 86_400,
            retry_budget: 0,
            state_dir: None,
        }
    }
}

impl ReconcileSettings {
    pub fn approval_timeout_ms(&self) -> i64 {
        i64::try_from(self.approval_timeout_secs.saturating_mul(1000)).unwrap_or(i64::MAX)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditSettings {
    /// JSONL audit log path. `None` disables auditing.
    pub path: Option<String>,
    pub hash_chain: bool,
}

impl Default for AuditSettings {
    fn default() -> Self {
        Self {
            path: None,
            hash_chain: true,
        }
    }
}
