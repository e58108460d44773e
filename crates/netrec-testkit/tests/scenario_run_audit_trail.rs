//! Scenario: a run leaves a verifiable audit trail.
//!
//! # Invariants under test
//!
//! 1. The log holds RUN_START, one OUTCOME per actioned diff, RUN_FINISH.
//! 2. Approval decisions made after the run are appended to the same chain.
//! 3. The chain verifies end to end.

use netrec_audit::{read_events, verify_hash_chain, TOPIC_RECONCILE, TOPIC_RUN};
use netrec_reconcile::{ApprovalDecision, ReconcileMode};
use netrec_testkit::{interface_obs, interface_record, Harness};
use serde_json::json;

#[tokio::test]
async fn run_and_decision_are_chained() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("audit").join("audit.jsonl");

    let h = Harness::builder()
        .observe(interface_obs("R1", "Gi0/0", 100, true, json!({"mtu": 1500})))
        .observe(interface_obs("R1", "Gi0/1", 100, true, json!({"adminState": true})))
        .declare(interface_record("R1", "Gi0/0", json!({"mtu": 9000})))
        .declare(interface_record("R1", "Gi0/1", json!({"adminState": false})))
        .mode(ReconcileMode::Live)
        .audit(&path)
        .build()
        .unwrap();

    let report = h.run("run-1").await.unwrap();
    let pending = report
        .outcomes
        .iter()
        .find_map(|o| o.pending_id)
        .unwrap();
    h.orchestrator
        .resolve_pending(pending, ApprovalDecision::Reject)
        .unwrap();

    let events = read_events(&path).unwrap();
    let kinds: Vec<(&str, &str)> = events
        .iter()
        .map(|e| (e.topic.as_str(), e.event_type.as_str()))
        .collect();
    assert_eq!(
        kinds,
        vec![
            (TOPIC_RUN, "RUN_START"),
            (TOPIC_RECONCILE, "OUTCOME"),
            (TOPIC_RECONCILE, "OUTCOME"),
            (TOPIC_RUN, "RUN_FINISH"),
            (TOPIC_RECONCILE, "OUTCOME"),
        ]
    );
    assert_eq!(events[4].payload["action"], json!("hitlRejected"));
    assert!(events.iter().all(|e| e.run_id == "run-1"));
    assert!(verify_hash_chain(&path).unwrap().is_valid());
}
