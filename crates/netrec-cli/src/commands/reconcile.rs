use std::fs;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use netrec_reconcile::ReconcileMode;
use netrec_runtime::Orchestrator;
use netrec_schemas::SystemClock;
use netrec_store::load_jsonl;
use tracing::info;

use super::{load_settings, open_inventory};

pub struct ReconcileArgs {
    pub config_paths: Vec<String>,
    pub observations: String,
    pub inventory: String,
    pub mode: Option<ReconcileMode>,
    pub json: bool,
    pub out: Option<String>,
    pub run_id: Option<String>,
}

pub async fn run(args: ReconcileArgs) -> Result<()> {
    let (loaded, cfg) = load_settings(&args.config_paths, args.mode)?;

    let store = load_jsonl(&args.observations)
        .with_context(|| format!("load observations: {}", args.observations))?;
    info!(observations = store.len(), partitions = store.partition_count(), "snapshot loaded");
    let inventory = open_inventory(&args.inventory)?;

    let mut orch = Orchestrator::from_config(
        &cfg,
        Some(loaded.config_hash.clone()),
        Arc::new(store),
        inventory,
        Arc::new(SystemClock),
    )?;
    if let Some(mode) = args.mode {
        orch = orch.with_mode(mode);
    }

    let report = orch.run(args.run_id).await?;

    let body = if args.json {
        report.to_json_pretty().context("serialize report")?
    } else {
        report.render_text()
    };

    match args.out {
        Some(path) => {
            if let Some(parent) = Path::new(&path).parent() {
                fs::create_dir_all(parent).with_context(|| format!("create_dir_all {:?}", parent))?;
            }
            fs::write(&path, &body).with_context(|| format!("write report: {path}"))?;
            println!("run_id={}", report.run_id);
            println!("config_hash={}", loaded.config_hash);
            println!("report={path}");
        }
        None => println!("{body}"),
    }
    Ok(())
}
