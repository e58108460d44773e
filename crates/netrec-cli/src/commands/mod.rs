//! Command handlers for the `netrec` binary.
//!
//! Shared helpers live here; command-specific logic lives in the submodules.

pub mod approvals;
pub mod reconcile;

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use netrec_audit::{verify_hash_chain, VerifyResult};
use netrec_config::{
    load_layered_yaml, report_unused_keys, ConfigMode, LoadedConfig, NetrecConfig, UnusedKeyPolicy,
};
use netrec_reconcile::{FileInventory, InMemoryInventory, Inventory, ReconcileMode};
use netrec_runtime::Orchestrator;
use netrec_schemas::SystemClock;
use netrec_store::{SnapshotStore, TelemetrySource};
use tracing::warn;

// ---------------------------------------------------------------------------
// Shared helpers
// ---------------------------------------------------------------------------

pub fn load_config(paths: &[String]) -> Result<LoadedConfig> {
    let path_refs: Vec<&str> = paths.iter().map(|s| s.as_str()).collect();
    load_layered_yaml(&path_refs)
}

/// Load config, enforce the unused-key policy for `mode`, return typed settings.
pub fn load_settings(paths: &[String], mode: Option<ReconcileMode>) -> Result<(LoadedConfig, NetrecConfig)> {
    let loaded = load_config(paths)?;
    let cfg = loaded.settings()?;

    let effective = mode.unwrap_or_else(|| cfg.engine.mode.into());
    let config_mode = match effective {
        ReconcileMode::DryRun => ConfigMode::DryRun,
        ReconcileMode::Live => ConfigMode::Live,
    };
    let report = report_unused_keys(
        config_mode,
        &loaded.config_json,
        UnusedKeyPolicy::for_mode(config_mode),
    )?;
    for p in &report.unused_leaf_pointers {
        warn!(pointer = %p, mode = %report.mode, "unused config key");
    }
    Ok((loaded, cfg))
}

pub fn open_inventory(path: &str) -> Result<Arc<FileInventory>> {
    let inv = FileInventory::open(path).with_context(|| format!("open inventory: {path}"))?;
    Ok(Arc::new(inv))
}

/// Orchestrator for approval commands. No telemetry is read, so the store
/// is empty; pending approvals must be durable to be found at all.
pub fn approvals_orchestrator(paths: &[String], inventory: Option<&str>) -> Result<Orchestrator> {
    let (loaded, cfg) = load_settings(paths, None)?;
    if cfg.reconcile.state_dir.is_none() {
        bail!(
            "APPROVALS_NEED_STATE_DIR: set reconcile.state_dir so pending approvals survive between invocations"
        );
    }

    let inventory: Arc<dyn Inventory> = match inventory {
        Some(path) => open_inventory(path)?,
        None => Arc::new(InMemoryInventory::default()),
    };
    let source: Arc<dyn TelemetrySource> = Arc::new(SnapshotStore::new());
    let orch = Orchestrator::from_config(
        &cfg,
        Some(loaded.config_hash),
        source,
        inventory,
        Arc::new(SystemClock),
    )?;
    Ok(orch)
}

pub fn verify_audit(path: &str) -> Result<()> {
    match verify_hash_chain(path)? {
        VerifyResult::Valid { lines } => {
            println!("audit_chain=valid lines={lines}");
            Ok(())
        }
        VerifyResult::Broken { line, reason } => {
            bail!("AUDIT_CHAIN_BROKEN line={line} reason={reason}")
        }
    }
}
