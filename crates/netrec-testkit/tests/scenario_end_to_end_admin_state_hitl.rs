//! Scenario: adminState drift needs a human.
//!
//! # Invariants under test
//!
//! 1. adminState observed true vs declared false => not auto-correctable,
//!    live run yields hitlPending.
//! 2. reject => hitlRejected, inventory unchanged.
//! 3. approve => hitlApproved, inventory takes the observed value.
//! 4. An approval nobody answers is rejected with `timeout` by the next run.
//! 5. Unknown entities (missingInTruth) also wait for approval.

use netrec_reconcile::{ApprovalDecision, OutcomeAction, ReconcileMode, TIMEOUT_MESSAGE};
use netrec_schemas::EntityKind;
use netrec_testkit::{interface_obs, interface_record, Harness};
use serde_json::json;

const TIMEOUT_MS: i64 = 10 * 60 * 1000;

fn harness() -> Harness {
    Harness::builder()
        .observe(interface_obs("R1", "Gi0/0", 100, true, json!({"adminState": true})))
        .declare(interface_record("R1", "Gi0/0", json!({"adminState": false})))
        .mode(ReconcileMode::Live)
        .approval_timeout_ms(TIMEOUT_MS)
        .build()
        .unwrap()
}

fn admin_state(h: &Harness) -> Option<serde_json::Value> {
    h.truth_field(&EntityKind::Interface, "R1.Gi0/0", "adminState")
}

#[tokio::test]
async fn reject_keeps_inventory() {
    let h = harness();
    let report = h.run("run-1").await.unwrap();

    let diff = &report.diffs[0];
    assert!(!diff.auto_correctable);
    let pending = report.outcome_for(diff).unwrap();
    assert_eq!(pending.action, OutcomeAction::HitlPending);

    let out = h
        .orchestrator
        .resolve_pending(pending.pending_id.unwrap(), ApprovalDecision::Reject)
        .unwrap();
    assert_eq!(out.action, OutcomeAction::HitlRejected);
    assert_eq!(admin_state(&h), Some(json!(false)));
}

#[tokio::test]
async fn approve_writes_observed_state() {
    let h = harness();
    let report = h.run("run-1").await.unwrap();
    let id = report.outcomes[0].pending_id.unwrap();

    let out = h
        .orchestrator
        .resolve_pending(id, ApprovalDecision::Approve)
        .unwrap();
    assert_eq!(out.action, OutcomeAction::HitlApproved);
    assert_eq!(admin_state(&h), Some(json!(true)));
}

#[tokio::test]
async fn unanswered_approval_times_out_on_next_run() {
    let h = harness();
    h.run("run-1").await.unwrap();
    assert_eq!(h.controller().pending().unwrap().len(), 1);

    h.clock.advance_ms(TIMEOUT_MS + 1);
    let second = h.run("run-2").await.unwrap();

    let run1 = h.controller().outcomes_for_run("run-1");
    let last = run1.last().unwrap();
    assert_eq!(last.action, OutcomeAction::HitlRejected);
    assert_eq!(last.message, TIMEOUT_MESSAGE);
    assert_eq!(admin_state(&h), Some(json!(false)));

    // The drift is still there, so run-2 asks again under its own id.
    assert_eq!(second.outcomes[0].action, OutcomeAction::HitlPending);
    assert_ne!(second.outcomes[0].pending_id, last.pending_id);
}

#[tokio::test]
async fn unknown_entity_waits_for_approval() {
    let h = Harness::builder()
        .observe(interface_obs("R1", "Gi0/9", 100, true, json!({"mtu": 1500})))
        .mode(ReconcileMode::Live)
        .build()
        .unwrap();
    let report = h.run("run-1").await.unwrap();

    assert_eq!(report.missing_in_truth, 1);
    assert_eq!(report.outcomes[0].action, OutcomeAction::HitlPending);

    h.orchestrator
        .resolve_pending(report.outcomes[0].pending_id.unwrap(), ApprovalDecision::Approve)
        .unwrap();
    assert_eq!(
        h.truth_field(&EntityKind::Interface, "R1.Gi0/9", "mtu"),
        Some(json!(1500))
    );
}
