use std::fmt;

use netrec_config::RunMode;
use netrec_schemas::EntityKind;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ReconcileMode {
    #[default]
    DryRun,
    Live,
}

impl ReconcileMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReconcileMode::DryRun => "dryRun",
            ReconcileMode::Live => "live",
        }
    }
}

impl From<RunMode> for ReconcileMode {
    fn from(m: RunMode) -> Self {
        match m {
            RunMode::DryRun => ReconcileMode::DryRun,
            RunMode::Live => ReconcileMode::Live,
        }
    }
}

impl fmt::Display for ReconcileMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OutcomeAction {
    AutoCorrected,
    HitlPending,
    HitlApproved,
    HitlRejected,
    ReportOnly,
    Skipped,
    Error,
}

impl OutcomeAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutcomeAction::AutoCorrected => "autoCorrected",
            OutcomeAction::HitlPending => "hitlPending",
            OutcomeAction::HitlApproved => "hitlApproved",
            OutcomeAction::HitlRejected => "hitlRejected",
            OutcomeAction::ReportOnly => "reportOnly",
            OutcomeAction::Skipped => "skipped",
            OutcomeAction::Error => "error",
        }
    }

    /// `hitlPending` is the only state a later call can move out of.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, OutcomeAction::HitlPending)
    }
}

impl fmt::Display for OutcomeAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ApprovalDecision {
    Approve,
    Reject,
}

/// Result of acting on one diff. Never mutated; re-processing the same diff
/// (after approval, timeout, or a re-run) appends a new outcome.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileOutcome {
    pub run_id: String,
    pub entity_kind: EntityKind,
    pub identifier: String,
    pub action: OutcomeAction,
    pub success: bool,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending_id: Option<Uuid>,
    pub created_at_ms: i64,
}

impl ReconcileOutcome {
    /// `kind|identifier`, same shape as `EntityDiff::entity_key`.
    pub fn entity_key(&self) -> String {
        format!("{}|{}", self.entity_kind, self.identifier)
    }
}
