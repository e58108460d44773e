//! Scenario: a declared field the device does not report.
//!
//! # Invariants under test
//!
//! 1. description declared "uplink to core", absent from telemetry, is a
//!    difference with a null resolved value that is NOT auto-correctable,
//!    even though description is on the default allow-list.
//! 2. A live run therefore yields hitlPending and leaves the inventory alone.
//! 3. Approving writes the observed fields only; the unobserved description
//!    stays as declared.

use netrec_reconcile::{ApprovalDecision, OutcomeAction, ReconcileMode};
use netrec_schemas::EntityKind;
use netrec_testkit::{interface_obs, interface_record, Harness};
use serde_json::{json, Value};

fn harness() -> Harness {
    Harness::builder()
        .observe(interface_obs("R1", "Gi0/0", 100, true, json!({"mtu": 1500})))
        .declare(interface_record(
            "R1",
            "Gi0/0",
            json!({"mtu": 9000, "description": "uplink to core"}),
        ))
        .mode(ReconcileMode::Live)
        .build()
        .unwrap()
}

fn field(h: &Harness, name: &str) -> Option<Value> {
    h.truth_field(&EntityKind::Interface, "R1.Gi0/0", name)
}

#[tokio::test]
async fn unobserved_description_waits_for_a_human() {
    let h = harness();
    let report = h.run("run-1").await.unwrap();

    let diff = &report.diffs[0];
    let description = diff
        .field_differences
        .iter()
        .find(|d| d.field_name == "description")
        .unwrap();
    assert_eq!(description.resolved_value, Value::Null);
    assert!(!diff.auto_correctable);

    let outcome = report.outcome_for(diff).unwrap();
    assert_eq!(outcome.action, OutcomeAction::HitlPending);
    assert_eq!(field(&h, "description"), Some(json!("uplink to core")));
    assert_eq!(field(&h, "mtu"), Some(json!(9000)));

    let pending = &h.controller().pending().unwrap()[0];
    assert!(pending.justification.contains("left as declared"));
}

#[tokio::test]
async fn approval_writes_observed_fields_only() {
    let h = harness();
    let report = h.run("run-1").await.unwrap();
    let id = report.outcomes[0].pending_id.unwrap();

    let out = h
        .orchestrator
        .resolve_pending(id, ApprovalDecision::Approve)
        .unwrap();
    assert_eq!(out.action, OutcomeAction::HitlApproved);
    assert!(out.message.contains("applied 1 field(s)"), "{}", out.message);
    assert!(out.message.contains("description"));

    assert_eq!(field(&h, "mtu"), Some(json!(1500)));
    assert_eq!(field(&h, "description"), Some(json!("uplink to core")));
}
