//! Scenario: mtu drift through the whole pipeline.
//!
//! # Invariants under test
//!
//! 1. Observation `{R1.Gi0/0 mtu=1500 active ts=100}` vs truth
//!    `{R1.Gi0/0 mtu=9000}` yields exactly one field difference: mtu,
//!    resolved 1500, truth 9000, warning, auto-correctable.
//! 2. Live: autoCorrected, inventory now 1500.
//! 3. Dry run: reportOnly, inventory still 9000.
//! 4. matched + mismatched == totalEntities.
//! 5. A clean run after the correction reports nothing to act on.

use netrec_reconcile::{OutcomeAction, ReconcileMode};
use netrec_schemas::{EntityKind, Severity};
use netrec_testkit::{interface_obs, interface_record, Harness};
use serde_json::json;

fn harness(mode: ReconcileMode) -> Harness {
    Harness::builder()
        .observe(interface_obs("R1", "Gi0/0", 100, true, json!({"mtu": 1500})))
        .declare(interface_record("R1", "Gi0/0", json!({"mtu": 9000})))
        .mode(mode)
        .build()
        .unwrap()
}

#[tokio::test]
async fn live_run_auto_corrects_mtu() {
    let h = harness(ReconcileMode::Live);
    let report = h.run("run-1").await.unwrap();

    assert_eq!(report.total_entities, 1);
    assert_eq!(report.matched + report.mismatched, report.total_entities);
    assert_eq!(report.diffs.len(), 1);

    let diff = &report.diffs[0];
    assert_eq!(diff.identifier, "R1.Gi0/0");
    assert!(diff.auto_correctable);
    assert_eq!(diff.field_differences.len(), 1);
    let fd = &diff.field_differences[0];
    assert_eq!(fd.field_name, "mtu");
    assert_eq!(fd.resolved_value, json!(1500));
    assert_eq!(fd.truth_value, json!(9000));
    assert_eq!(fd.severity, Severity::Warning);

    let outcome = report.outcome_for(diff).unwrap();
    assert_eq!(outcome.action, OutcomeAction::AutoCorrected);
    assert!(outcome.success);
    assert_eq!(
        h.truth_field(&EntityKind::Interface, "R1.Gi0/0", "mtu"),
        Some(json!(1500))
    );

    let again = h.run("run-2").await.unwrap();
    assert_eq!(again.matched, 1);
    assert!(again.diffs.is_empty());
    assert!(again.outcomes.is_empty());
}

#[tokio::test]
async fn dry_run_reports_only() {
    let h = harness(ReconcileMode::DryRun);
    let report = h.run("run-1").await.unwrap();

    assert_eq!(report.outcomes.len(), 1);
    assert_eq!(report.outcomes[0].action, OutcomeAction::ReportOnly);
    assert_eq!(report.summary_by_severity[&Severity::Warning], 1);
    assert_eq!(
        h.truth_field(&EntityKind::Interface, "R1.Gi0/0", "mtu"),
        Some(json!(9000))
    );

    let text = report.render_text();
    assert!(text.contains("R1.Gi0/0"));
    assert!(text.contains("reportOnly"));
}
