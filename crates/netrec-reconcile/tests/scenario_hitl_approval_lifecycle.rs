//! Scenario: human-in-the-loop approvals.
//!
//! # Invariants under test
//!
//! 1. adminState drift in live mode => hitlPending with a justification.
//! 2. reject => hitlRejected, inventory unchanged; the pending id is gone.
//! 3. approve => hitlApproved, observed value written back.
//! 4. No answer within the timeout => expire_pending yields hitlRejected
//!    with message `timeout`; a late approve is also a timeout.
//! 5. Resumption works from a second controller over the same durable
//!    arena (different "process").
//! 6. missingInResolved approved => hitlApproved, nothing written.
//! 7. missingInTruth approved => record created with every observed attribute.
//! 8. Re-requesting the same diff in the same run keeps one pending entry.

use std::sync::Arc;

use netrec_reconcile::{
    ApprovalDecision, ApprovalQueue, Controller, ControllerError, ControllerSettings,
    FileApprovalQueue, InMemoryInventory, MemoryApprovalQueue, OutcomeAction, ReconcileMode,
    ACKNOWLEDGED_MESSAGE, TIMEOUT_MESSAGE,
};
use netrec_schemas::{
    Attributes, EntityDiff, EntityKind, FieldDifference, ManualClock, NaturalKey, Severity,
    SourceOfTruthRecord,
};
use serde_json::json;

const TIMEOUT_MS: i64 = 60_000;

fn inventory() -> Arc<InMemoryInventory> {
    Arc::new(InMemoryInventory::new(vec![SourceOfTruthRecord::new(
        EntityKind::Interface,
        "R1",
        serde_json::from_value(json!({"ifName": "Gi0/0", "adminState": false})).unwrap(),
    )]))
}

fn settings() -> ControllerSettings {
    ControllerSettings {
        approval_timeout_ms: TIMEOUT_MS,
        retry_budget: 0,
    }
}

fn admin_state_diff() -> EntityDiff {
    EntityDiff {
        entity_kind: EntityKind::Interface,
        identifier: "R1.Gi0/0".to_string(),
        key: NaturalKey::from_parts(["R1", "Gi0/0"]),
        hostname: "R1".to_string(),
        exists_in_truth: true,
        exists_in_resolved: true,
        field_differences: vec![FieldDifference {
            field_name: "adminState".to_string(),
            resolved_value: json!(true),
            truth_value: json!(false),
            semantic_match: false,
            severity: Severity::Critical,
            explanation: "adminState: observed true, declared false".to_string(),
        }],
        auto_correctable: false,
        resolved_attributes: None,
    }
}

struct Harness {
    inv: Arc<InMemoryInventory>,
    clock: Arc<ManualClock>,
    ctl: Controller,
}

fn harness() -> Harness {
    let inv = inventory();
    let clock = Arc::new(ManualClock::new(1_000));
    let ctl = Controller::new(
        inv.clone(),
        Arc::new(MemoryApprovalQueue::new()),
        clock.clone(),
        settings(),
    );
    Harness { inv, clock, ctl }
}

fn admin_state(inv: &InMemoryInventory) -> serde_json::Value {
    inv.get(&EntityKind::Interface, "R1.Gi0/0").unwrap().attributes["adminState"].clone()
}

#[test]
fn reject_leaves_inventory_unchanged() {
    let h = harness();
    let pending = h.ctl.reconcile("run-1", &admin_state_diff(), ReconcileMode::Live);
    assert_eq!(pending.action, OutcomeAction::HitlPending);
    assert!(pending.message.contains("adminState"));
    let id = pending.pending_id.unwrap();

    let out = h.ctl.resolve_pending(id, ApprovalDecision::Reject).unwrap();
    assert_eq!(out.action, OutcomeAction::HitlRejected);
    assert_eq!(out.pending_id, Some(id));
    assert_eq!(admin_state(&h.inv), json!(false));

    let again = h.ctl.resolve_pending(id, ApprovalDecision::Approve).unwrap_err();
    assert!(matches!(again, ControllerError::UnknownPending(_)));
    assert_eq!(h.ctl.outcomes().len(), 2, "pending then rejected; nothing mutated in place");
}

#[test]
fn approve_writes_observed_value() {
    let h = harness();
    let id = h
        .ctl
        .reconcile("run-1", &admin_state_diff(), ReconcileMode::Live)
        .pending_id
        .unwrap();

    let out = h.ctl.resolve_pending(id, ApprovalDecision::Approve).unwrap();
    assert_eq!(out.action, OutcomeAction::HitlApproved);
    assert!(out.success);
    assert_eq!(admin_state(&h.inv), json!(true));
}

#[test]
fn unanswered_approval_times_out() {
    let h = harness();
    let id = h
        .ctl
        .reconcile("run-1", &admin_state_diff(), ReconcileMode::Live)
        .pending_id
        .unwrap();

    h.clock.advance_ms(TIMEOUT_MS);
    assert!(h.ctl.expire_pending().unwrap().is_empty(), "deadline itself is still open");

    h.clock.advance_ms(1);
    let expired = h.ctl.expire_pending().unwrap();
    assert_eq!(expired.len(), 1);
    assert_eq!(expired[0].action, OutcomeAction::HitlRejected);
    assert_eq!(expired[0].message, TIMEOUT_MESSAGE);
    assert!(h.ctl.pending().unwrap().is_empty());
    assert!(h.ctl.resolve_pending(id, ApprovalDecision::Approve).is_err());
    assert_eq!(admin_state(&h.inv), json!(false));
}

#[test]
fn late_approval_is_a_timeout() {
    let h = harness();
    let id = h
        .ctl
        .reconcile("run-1", &admin_state_diff(), ReconcileMode::Live)
        .pending_id
        .unwrap();
    h.clock.advance_ms(TIMEOUT_MS + 5);

    let out = h.ctl.resolve_pending(id, ApprovalDecision::Approve).unwrap();
    assert_eq!(out.action, OutcomeAction::HitlRejected);
    assert_eq!(out.message, TIMEOUT_MESSAGE);
    assert_eq!(admin_state(&h.inv), json!(false));
}

#[test]
fn approval_resumes_in_another_controller() {
    let dir = tempfile::tempdir().unwrap();
    let inv = inventory();
    let clock = Arc::new(ManualClock::new(1_000));

    let first = Controller::new(
        inv.clone(),
        Arc::new(FileApprovalQueue::open(dir.path()).unwrap()),
        clock.clone(),
        settings(),
    );
    let id = first
        .reconcile("run-1", &admin_state_diff(), ReconcileMode::Live)
        .pending_id
        .unwrap();
    drop(first);

    let second = Controller::new(
        inv.clone(),
        Arc::new(FileApprovalQueue::open(dir.path()).unwrap()),
        clock,
        settings(),
    );
    let out = second.resolve_pending(id, ApprovalDecision::Approve).unwrap();
    assert_eq!(out.action, OutcomeAction::HitlApproved);
    assert_eq!(out.run_id, "run-1");
    assert_eq!(admin_state(&inv), json!(true));
}

#[test]
fn existence_diffs_go_through_approval() {
    let h = harness();

    let mut missing_in_resolved = admin_state_diff();
    missing_in_resolved.exists_in_resolved = false;
    missing_in_resolved.field_differences.clear();
    let id = h
        .ctl
        .reconcile("run-1", &missing_in_resolved, ReconcileMode::Live)
        .pending_id
        .unwrap();
    let out = h.ctl.resolve_pending(id, ApprovalDecision::Approve).unwrap();
    assert_eq!(out.action, OutcomeAction::HitlApproved);
    assert_eq!(out.message, ACKNOWLEDGED_MESSAGE);
    assert!(h.inv.get(&EntityKind::Interface, "R1.Gi0/0").is_some());

    let observed: Attributes =
        serde_json::from_value(json!({"ifName": "Gi0/7", "mtu": 1500, "description": "new"}))
            .unwrap();
    let missing_in_truth = EntityDiff {
        entity_kind: EntityKind::Interface,
        identifier: "R1.Gi0/7".to_string(),
        key: NaturalKey::from_parts(["R1", "Gi0/7"]),
        hostname: "R1".to_string(),
        exists_in_truth: false,
        exists_in_resolved: true,
        field_differences: Vec::new(),
        auto_correctable: false,
        resolved_attributes: Some(observed.clone()),
    };
    let pending = h.ctl.reconcile("run-1", &missing_in_truth, ReconcileMode::Live);
    assert_eq!(pending.action, OutcomeAction::HitlPending);
    let out = h
        .ctl
        .resolve_pending(pending.pending_id.unwrap(), ApprovalDecision::Approve)
        .unwrap();
    assert_eq!(out.action, OutcomeAction::HitlApproved);
    assert_eq!(
        h.inv.get(&EntityKind::Interface, "R1.Gi0/7").unwrap().attributes,
        observed
    );
}

#[test]
fn re_request_in_same_run_is_idempotent() {
    let queue = Arc::new(MemoryApprovalQueue::new());
    let clock = Arc::new(ManualClock::new(1_000));
    let ctl = Controller::new(inventory(), queue.clone(), clock.clone(), settings());

    let a = ctl.reconcile("run-1", &admin_state_diff(), ReconcileMode::Live);
    clock.advance_ms(10);
    let b = ctl.reconcile("run-1", &admin_state_diff(), ReconcileMode::Live);
    assert_eq!(a.pending_id, b.pending_id);

    let all = queue.list().unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].requested_at_ms, 1_000, "original deadline kept");

    let other_run = ctl.reconcile("run-2", &admin_state_diff(), ReconcileMode::Live);
    assert_ne!(other_run.pending_id, a.pending_id);
}
