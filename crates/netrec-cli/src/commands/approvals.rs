use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use netrec_reconcile::{ApprovalDecision, ReconcileOutcome};
use uuid::Uuid;

use super::approvals_orchestrator;

pub fn list(config_paths: &[String]) -> Result<()> {
    let orch = approvals_orchestrator(config_paths, None)?;
    let pending = orch.controller().pending()?;
    println!("pending_count={}", pending.len());
    for p in pending {
        println!(
            "pending_id={} run_id={} kind={} identifier={} expires_at={} justification={}",
            p.pending_id,
            p.run_id,
            p.diff.entity_kind,
            p.diff.identifier,
            rfc3339(p.expires_at_ms),
            p.justification
        );
    }
    Ok(())
}

pub fn decide(
    config_paths: &[String],
    inventory: &str,
    id: &str,
    decision: ApprovalDecision,
) -> Result<()> {
    let pending_id = Uuid::parse_str(id).context("invalid --id uuid")?;
    let orch = approvals_orchestrator(config_paths, Some(inventory))?;
    let outcome = orch.resolve_pending(pending_id, decision)?;
    print_outcome(&outcome);
    Ok(())
}

pub fn expire(config_paths: &[String], inventory: &str) -> Result<()> {
    let orch = approvals_orchestrator(config_paths, Some(inventory))?;
    let expired = orch.expire_pending()?;
    println!("expired_count={}", expired.len());
    for o in &expired {
        print_outcome(o);
    }
    Ok(())
}

fn print_outcome(o: &ReconcileOutcome) {
    println!(
        "pending_id={} identifier={} action={} success={} message={}",
        o.pending_id.map(|id| id.to_string()).unwrap_or_else(|| "-".to_string()),
        o.identifier,
        o.action,
        o.success,
        o.message
    );
}

fn rfc3339(ms: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(ms)
        .map(|t| t.to_rfc3339_opts(SecondsFormat::Secs, true))
        .unwrap_or_else(|| ms.to_string())
}
