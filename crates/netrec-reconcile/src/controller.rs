use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use netrec_config::ReconcileSettings;
use netrec_schemas::{Clock, EntityDiff, KeyedLocks, Severity, SourceOfTruthRecord};
use serde_json::Value;
use tracing::{info, warn};
use uuid::Uuid;

use crate::approval::{pending_id, ApprovalError, ApprovalQueue, PendingApproval};
use crate::inventory::{Inventory, InventoryError};
use crate::types::{ApprovalDecision, OutcomeAction, ReconcileMode, ReconcileOutcome};

pub const TIMEOUT_MESSAGE: &str = "timeout";
pub const ACKNOWLEDGED_MESSAGE: &str = "acknowledged; no corrective write";

#[derive(Debug, thiserror::Error)]
pub enum ControllerError {
    #[error("pending approval {0} not found (never requested or already resolved)")]
    UnknownPending(Uuid),
    #[error(transparent)]
    Approval(#[from] ApprovalError),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ControllerSettings {
    pub approval_timeout_ms: i64,
    /// Extra attempts after a failed apply.
    pub retry_budget: u32,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self::from(&ReconcileSettings::default())
    }
}

impl From<&ReconcileSettings> for ControllerSettings {
    fn from(s: &ReconcileSettings) -> Self {
        Self {
            approval_timeout_ms: s.approval_timeout_ms(),
            retry_budget: s.retry_budget,
        }
    }
}

/// Turns diffs into outcomes.
///
/// The inventory write is the only side effect. Writes are serialized per
/// entity key; different entities proceed concurrently. Every call appends
/// exactly one outcome per diff it touched to an in-process log.
pub struct Controller {
    inventory: Arc<dyn Inventory>,
    approvals: Arc<dyn ApprovalQueue>,
    clock: Arc<dyn Clock>,
    settings: ControllerSettings,
    write_locks: KeyedLocks,
    log: Mutex<Vec<ReconcileOutcome>>,
}

impl Controller {
    pub fn new(
        inventory: Arc<dyn Inventory>,
        approvals: Arc<dyn ApprovalQueue>,
        clock: Arc<dyn Clock>,
        settings: ControllerSettings,
    ) -> Self {
        Self {
            inventory,
            approvals,
            clock,
            settings,
            write_locks: KeyedLocks::new(),
            log: Mutex::new(Vec::new()),
        }
    }

    pub fn settings(&self) -> ControllerSettings {
        self.settings
    }

    // -----------------------------------------------------------------------
    // Entry points
    // -----------------------------------------------------------------------

    /// Act on one diff.
    ///
    /// | diff                         | mode   | outcome                           |
    /// |------------------------------|--------|-----------------------------------|
    /// | nothing to act on            | any    | skipped                           |
    /// | anything                     | dryRun | reportOnly                        |
    /// | auto-correctable, no critical| live   | autoCorrected / error             |
    /// | otherwise                    | live   | hitlPending                       |
    pub fn reconcile(&self, run_id: &str, diff: &EntityDiff, mode: ReconcileMode) -> ReconcileOutcome {
        if !diff.has_differences() {
            return self.record(run_id, diff, OutcomeAction::Skipped, true, "no differences", None);
        }

        if mode == ReconcileMode::DryRun {
            let msg = format!("dry run: {}", summarize(diff));
            return self.record(run_id, diff, OutcomeAction::ReportOnly, true, msg, None);
        }

        if diff.auto_correctable && diff.has_critical() {
            warn!(
                run_id,
                entity_kind = %diff.entity_kind,
                identifier = %diff.identifier,
                "diff flagged auto-correctable carries a critical difference; routing to approval"
            );
        }

        if diff.auto_correctable && !diff.has_critical() && !diff.is_existence_diff() {
            return self.write_locks.with_lock(&diff.entity_key(), || {
                match self.apply_with_retries(diff) {
                    Ok(writes) => {
                        info!(
                            run_id,
                            entity_kind = %diff.entity_kind,
                            identifier = %diff.identifier,
                            writes,
                            "correction applied"
                        );
                        let msg = format!("applied {writes} field(s): {}", summarize(diff));
                        self.record(run_id, diff, OutcomeAction::AutoCorrected, true, msg, None)
                    }
                    Err(e) => self.record(run_id, diff, OutcomeAction::Error, false, e, None),
                }
            });
        }

        let justification = justify(diff);
        match self.request_approval(run_id, diff, &justification) {
            Ok(id) => self.record(run_id, diff, OutcomeAction::HitlPending, true, justification, Some(id)),
            Err(e) => {
                let msg = format!("could not record pending approval: {e}");
                self.record(run_id, diff, OutcomeAction::Error, false, msg, None)
            }
        }
    }

    /// Put `diff` into the approval arena. Idempotent per (run, entity).
    pub fn request_approval(
        &self,
        run_id: &str,
        diff: &EntityDiff,
        justification: &str,
    ) -> Result<Uuid, ControllerError> {
        let id = pending_id(run_id, &diff.entity_kind, &diff.identifier);
        let now = self.clock.now_ms();

        // Re-requesting keeps the original deadline.
        let (requested_at_ms, expires_at_ms) = match self.approvals.get(id)? {
            Some(existing) => (existing.requested_at_ms, existing.expires_at_ms),
            None => (now, now.saturating_add(self.settings.approval_timeout_ms)),
        };

        self.approvals.put(&PendingApproval {
            pending_id: id,
            run_id: run_id.to_string(),
            diff: diff.clone(),
            justification: justification.to_string(),
            requested_at_ms,
            expires_at_ms,
        })?;
        info!(
            run_id,
            pending_id = %id,
            entity_kind = %diff.entity_kind,
            identifier = %diff.identifier,
            "approval requested"
        );
        Ok(id)
    }

    /// Resume a suspended diff with a human decision.
    ///
    /// An approval that arrives after the deadline is treated as a timeout.
    pub fn resolve_pending(
        &self,
        pending_id: Uuid,
        decision: ApprovalDecision,
    ) -> Result<ReconcileOutcome, ControllerError> {
        let Some(peek) = self.approvals.get(pending_id)? else {
            return Err(ControllerError::UnknownPending(pending_id));
        };

        self.write_locks.with_lock(&peek.diff.entity_key(), || {
            let Some(pending) = self.approvals.take(pending_id)? else {
                return Err(ControllerError::UnknownPending(pending_id));
            };
            let (run_id, diff) = (pending.run_id.as_str(), &pending.diff);
            let now = self.clock.now_ms();

            if pending.is_expired(now) {
                info!(run_id, pending_id = %pending_id, "approval arrived after deadline");
                return Ok(self.record(
                    run_id,
                    diff,
                    OutcomeAction::HitlRejected,
                    true,
                    TIMEOUT_MESSAGE,
                    Some(pending_id),
                ));
            }

            let outcome = match decision {
                ApprovalDecision::Reject => self.record(
                    run_id,
                    diff,
                    OutcomeAction::HitlRejected,
                    true,
                    "rejected by approver",
                    Some(pending_id),
                ),
                ApprovalDecision::Approve if diff.is_missing_in_resolved() => self.record(
                    run_id,
                    diff,
                    OutcomeAction::HitlApproved,
                    true,
                    ACKNOWLEDGED_MESSAGE,
                    Some(pending_id),
                ),
                ApprovalDecision::Approve => match self.apply_with_retries(diff) {
                    Ok(writes) => {
                        let mut msg = format!("approved; applied {writes} field(s)");
                        let unobserved = unobserved_fields(diff);
                        if !unobserved.is_empty() {
                            msg.push_str(&format!("; left as declared: {}", unobserved.join(", ")));
                        }
                        self.record(run_id, diff, OutcomeAction::HitlApproved, true, msg, Some(pending_id))
                    }
                    Err(e) => self.record(run_id, diff, OutcomeAction::Error, false, e, Some(pending_id)),
                },
            };
            info!(
                run_id,
                pending_id = %pending_id,
                action = %outcome.action,
                "approval resolved"
            );
            Ok(outcome)
        })
    }

    /// Reject every pending approval whose deadline has passed.
    pub fn expire_pending(&self) -> Result<Vec<ReconcileOutcome>, ControllerError> {
        let now = self.clock.now_ms();
        let mut expired = Vec::new();
        for pending in self.approvals.list()? {
            if !pending.is_expired(now) {
                continue;
            }
            let taken = self.write_locks.with_lock(&pending.diff.entity_key(), || {
                self.approvals.take(pending.pending_id)
            })?;
            // Resolved concurrently; nothing to expire.
            let Some(pending) = taken else { continue };
            info!(
                run_id = %pending.run_id,
                pending_id = %pending.pending_id,
                identifier = %pending.diff.identifier,
                "approval expired"
            );
            expired.push(self.record(
                &pending.run_id,
                &pending.diff,
                OutcomeAction::HitlRejected,
                true,
                TIMEOUT_MESSAGE,
                Some(pending.pending_id),
            ));
        }
        Ok(expired)
    }

    pub fn pending(&self) -> Result<Vec<PendingApproval>, ControllerError> {
        Ok(self.approvals.list()?)
    }

    /// Every outcome produced by this controller, in creation order.
    pub fn outcomes(&self) -> Vec<ReconcileOutcome> {
        self.log_guard().clone()
    }

    pub fn outcomes_for_run(&self, run_id: &str) -> Vec<ReconcileOutcome> {
        self.log_guard()
            .iter()
            .filter(|o| o.run_id == run_id)
            .cloned()
            .collect()
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    fn log_guard(&self) -> MutexGuard<'_, Vec<ReconcileOutcome>> {
        self.log.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record(
        &self,
        run_id: &str,
        diff: &EntityDiff,
        action: OutcomeAction,
        success: bool,
        message: impl Into<String>,
        pending_id: Option<Uuid>,
    ) -> ReconcileOutcome {
        let outcome = ReconcileOutcome {
            run_id: run_id.to_string(),
            entity_kind: diff.entity_kind.clone(),
            identifier: diff.identifier.clone(),
            action,
            success,
            message: message.into(),
            pending_id,
            created_at_ms: self.clock.now_ms(),
        };
        self.log_guard().push(outcome.clone());
        outcome
    }

    /// Up to `1 + retry_budget` attempts. Returns the number of writes of the
    /// successful attempt, or a message naming the last failure.
    fn apply_with_retries(&self, diff: &EntityDiff) -> Result<usize, String> {
        let attempts = self.settings.retry_budget.saturating_add(1);
        let mut last_err = None;
        for attempt in 1..=attempts {
            match self.apply(diff) {
                Ok(n) => return Ok(n),
                Err(e) => {
                    warn!(
                        entity_kind = %diff.entity_kind,
                        identifier = %diff.identifier,
                        attempt,
                        attempts,
                        error = %e,
                        "apply failed"
                    );
                    last_err = Some(e);
                }
            }
        }
        let detail = last_err.map_or_else(|| "no attempt made".to_string(), |e| e.to_string());
        Err(format!("apply failed after {attempts} attempt(s): {detail}"))
    }

    fn apply(&self, diff: &EntityDiff) -> Result<usize, InventoryError> {
        if diff.is_missing_in_truth() {
            let attributes = diff.resolved_attributes.clone().unwrap_or_default();
            let writes = attributes.len();
            let record = SourceOfTruthRecord::new(diff.entity_kind.clone(), diff.hostname.clone(), attributes);
            self.inventory.create_record(&record)?;
            return Ok(writes);
        }

        // Unobserved fields are left as declared, never removed.
        let mut writes = 0;
        for d in diff.reportable_differences().filter(|d| !d.resolved_value.is_null()) {
            self.inventory.apply_correction(
                &diff.entity_kind,
                &diff.key,
                &d.field_name,
                &d.resolved_value,
            )?;
            writes += 1;
        }
        Ok(writes)
    }
}

// ---------------------------------------------------------------------------
// Human-readable text
// ---------------------------------------------------------------------------

fn render_value(v: &Value) -> String {
    match v {
        Value::Null => "<absent>".to_string(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Reportable fields the device does not report.
fn unobserved_fields(diff: &EntityDiff) -> Vec<&str> {
    diff.reportable_differences()
        .filter(|d| d.resolved_value.is_null())
        .map(|d| d.field_name.as_str())
        .collect()
}

fn summarize(diff: &EntityDiff) -> String {
    if diff.is_missing_in_truth() {
        return "observed on device, absent from inventory".to_string();
    }
    if diff.is_missing_in_resolved() {
        return "declared in inventory, not observed".to_string();
    }
    diff.reportable_differences()
        .map(|d| {
            format!(
                "{} {} -> {}",
                d.field_name,
                render_value(&d.truth_value),
                render_value(&d.resolved_value)
            )
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// Why a diff needs a human, in one paragraph.
pub fn justify(diff: &EntityDiff) -> String {
    let head = format!("{} {}", diff.entity_kind, diff.identifier);
    if diff.is_missing_in_truth() {
        let n = diff.resolved_attributes.as_ref().map_or(0, |a| a.len());
        return format!(
            "{head} is observed on {} but absent from the inventory; approving creates the record with {n} observed attribute(s).",
            diff.hostname
        );
    }
    if diff.is_missing_in_resolved() {
        return format!(
            "{head} is declared in the inventory but not observed on {}; approving acknowledges it, nothing is written.",
            diff.hostname
        );
    }

    let mut reasons = Vec::new();
    for d in diff.reportable_differences() {
        let note = if d.resolved_value.is_null() {
            "; not observed, left as declared on approval"
        } else if d.severity == Severity::Critical {
            "; never auto-corrected"
        } else {
            ""
        };
        reasons.push(format!(
            "{} observed {} vs declared {} ({}{note})",
            d.field_name,
            render_value(&d.resolved_value),
            render_value(&d.truth_value),
            d.severity
        ));
    }
    format!(
        "{head}: approving writes the observed value back to the inventory for {}.",
        reasons.join("; ")
    )
}
