//! netrec-reconcile
//!
//! Reconciliation Controller: turns each `EntityDiff` into an outcome.
//!
//! - dry run never writes; every diff with differences is `reportOnly`
//! - live mode auto-applies only policy-approved, non-critical diffs
//! - everything else suspends as a durable pending approval that a later
//!   call (possibly from another process) resolves
//! - a critical difference is never applied without an approval
//!
//! The report is a pure projection over diffs and the outcome log.

mod approval;
mod controller;
mod inventory;
mod report;
mod types;

pub use approval::{
    pending_id, ApprovalError, ApprovalQueue, FileApprovalQueue, MemoryApprovalQueue,
    PendingApproval,
};
pub use controller::{
    justify, Controller, ControllerError, ControllerSettings, ACKNOWLEDGED_MESSAGE,
    TIMEOUT_MESSAGE,
};
pub use inventory::{FileInventory, InMemoryInventory, Inventory, InventoryError};
pub use report::{ReconciliationReport, ReportContext, UnresolvedEntity, TEXT_ROW_LIMIT};
pub use types::{ApprovalDecision, OutcomeAction, ReconcileMode, ReconcileOutcome};
