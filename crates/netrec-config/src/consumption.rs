//! Which config keys each mode actually reads.
//!
//! The registries below must track the code. A leaf under a consumed prefix
//! is consumed; anything else is reported as unused (warning in dry-run,
//! error in live).

use std::collections::BTreeSet;

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::pointer::{covers, leaves, normalize};
use crate::RunMode;

/// Which run mode a config is being checked against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigMode {
    DryRun,
    Live,
}

impl ConfigMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConfigMode::DryRun => "DRY_RUN",
            ConfigMode::Live => "LIVE",
        }
    }
}

impl From<RunMode> for ConfigMode {
    fn from(mode: RunMode) -> Self {
        match mode {
            RunMode::DryRun => ConfigMode::DryRun,
            RunMode::Live => ConfigMode::Live,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnusedKeyPolicy {
    Warn,
    Fail,
}

impl UnusedKeyPolicy {
    pub fn for_mode(mode: ConfigMode) -> Self {
        match mode {
            ConfigMode::DryRun => UnusedKeyPolicy::Warn,
            ConfigMode::Live => UnusedKeyPolicy::Fail,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnusedKeyReport {
    pub mode: String,
    /// Normalized, sorted, unique.
    pub consumed_prefixes: Vec<String>,
    /// Sorted.
    pub unused_leaf_pointers: Vec<String>,
}

impl UnusedKeyReport {
    pub fn is_clean(&self) -> bool {
        self.unused_leaf_pointers.is_empty()
    }
}

// Dry-run never writes to the inventory, so the retry budget is not read.
static DRY_RUN: &[&str] = &[
    "/engine",
    "/resolver",
    "/cache",
    "/policy",
    "/comparator",
    "/audit",
    "/reconcile/approval_timeout_secs",
    "/reconcile/state_dir",
];

static LIVE: &[&str] = &[
    "/engine",
    "/resolver",
    "/cache",
    "/policy",
    "/comparator",
    "/audit",
    "/reconcile",
];

pub fn consumed_pointers_for_mode(mode: ConfigMode) -> &'static [&'static str] {
    match mode {
        ConfigMode::DryRun => DRY_RUN,
        ConfigMode::Live => LIVE,
    }
}

/// How many pointers a CONFIG_UNUSED_KEYS error spells out.
const ERROR_PREVIEW: usize = 12;

/// Unused-key report for `mode`. With [`UnusedKeyPolicy::Fail`] a dirty
/// report is an error instead.
pub fn report_unused_keys(
    mode: ConfigMode,
    config_json: &Value,
    policy: UnusedKeyPolicy,
) -> Result<UnusedKeyReport> {
    let consumed: BTreeSet<String> = consumed_pointers_for_mode(mode)
        .iter()
        .map(|p| normalize(p))
        .collect();
    let unused: BTreeSet<String> = leaves(config_json)
        .into_iter()
        .map(|(ptr, _)| ptr)
        .filter(|ptr| !consumed.iter().any(|c| covers(c, ptr)))
        .collect();

    let report = UnusedKeyReport {
        mode: mode.as_str().to_string(),
        consumed_prefixes: consumed.into_iter().collect(),
        unused_leaf_pointers: unused.into_iter().collect(),
    };

    if policy == UnusedKeyPolicy::Fail && !report.is_clean() {
        let shown: Vec<&str> = report
            .unused_leaf_pointers
            .iter()
            .take(ERROR_PREVIEW)
            .map(String::as_str)
            .collect();
        bail!(
            "CONFIG_UNUSED_KEYS mode={} count={}: {}. Remove them or register the reader.",
            report.mode,
            report.unused_leaf_pointers.len(),
            shown.join(", ")
        );
    }
    Ok(report)
}
