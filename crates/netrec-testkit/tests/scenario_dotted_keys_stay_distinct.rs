//! Scenario: two interfaces whose identifiers collide.
//!
//! # Invariants under test
//!
//! 1. Host "R1.a" ifName "b" and host "R1" ifName "a.b" both display as
//!    `R1.a.b` but are compared as separate entities.
//! 2. A live correction for one of them writes that record only.

use netrec_reconcile::{OutcomeAction, ReconcileMode};
use netrec_testkit::{interface_obs, interface_record, Harness};
use serde_json::json;

#[tokio::test]
async fn correction_lands_on_the_observed_record() {
    let h = Harness::builder()
        .observe(interface_obs("R1", "a.b", 100, true, json!({"mtu": 9000})))
        .observe(interface_obs("R1.a", "b", 100, true, json!({"mtu": 1500})))
        .declare(interface_record("R1", "a.b", json!({"mtu": 9000})))
        .declare(interface_record("R1.a", "b", json!({"mtu": 9000})))
        .mode(ReconcileMode::Live)
        .build()
        .unwrap();

    let report = h.run("run-1").await.unwrap();
    assert_eq!(report.total_entities, 2);
    assert_eq!(report.matched, 1);
    assert_eq!(report.diffs.len(), 1);
    assert_eq!(report.diffs[0].hostname, "R1.a");
    assert_eq!(report.outcomes[0].action, OutcomeAction::AutoCorrected);

    let records = h.truth.snapshot();
    let mtu = |host: &str| {
        records
            .iter()
            .find(|r| r.hostname == host)
            .map(|r| r.attributes["mtu"].clone())
    };
    assert_eq!(mtu("R1"), Some(json!(9000)), "R1 / a.b keeps its declared mtu");
    assert_eq!(mtu("R1.a"), Some(json!(1500)));
}
