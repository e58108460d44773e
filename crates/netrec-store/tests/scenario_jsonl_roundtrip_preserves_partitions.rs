//! Scenario: a telemetry dump seeds the store and can be exported again.
//!
//! # Invariants under test
//!
//! 1. Loading a JSONL dump appends every line in order.
//! 2. A malformed line fails with its 1-based line number.
//! 3. A dump that regresses time inside one partition is refused.
//! 4. Exporting and reloading yields the same observations.

use std::io::Cursor;

use netrec_schemas::EntityKind;
use netrec_store::{
    load_jsonl, read_jsonl, write_jsonl, ObservationQuery, StoreError, TelemetrySource,
};

const DUMP: &str = r#"
{"namespace":"dc1","hostname":"R1","entityKind":"interface","timestamp":100,"active":true,"attributes":{"ifName":"Gi0/0","mtu":1500}}
{"namespace":"dc1","hostname":"R1","entityKind":"interface","timestamp":200,"active":false,"attributes":{"ifName":"Gi0/0","mtu":9000}}

{"namespace":"dc1","hostname":"R2","entityKind":"bgpPeer","timestamp":150,"active":true,"attributes":{"peerAddress":"10.0.0.1","addressFamily":"ipv4","state":"Established"}}
"#;

#[test]
fn load_then_query_by_kind() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("obs.jsonl");
    std::fs::write(&path, DUMP).unwrap();

    let store = load_jsonl(&path).unwrap();
    assert_eq!(store.len(), 3);
    assert_eq!(store.partition_count(), 2);

    let rows = store
        .read_observations(&ObservationQuery::kind(EntityKind::Interface).namespace("dc1"))
        .unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].timestamp, 100);
    assert_eq!(rows[1].timestamp, 200);
}

#[test]
fn malformed_line_reports_line_number() {
    let bad = "{\"hostname\":\"R1\",\"entityKind\":\"interface\",\"timestamp\":1}\nnot json\n";
    let err = read_jsonl(Cursor::new(bad)).unwrap_err();
    assert!(matches!(err, StoreError::Parse { line: 2, .. }), "got {err:?}");
}

#[test]
fn regressing_dump_is_refused() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("obs.jsonl");
    std::fs::write(
        &path,
        concat!(
            "{\"hostname\":\"R1\",\"entityKind\":\"vlan\",\"timestamp\":20,\"attributes\":{\"vlan\":10}}\n",
            "{\"hostname\":\"R1\",\"entityKind\":\"vlan\",\"timestamp\":10,\"attributes\":{\"vlan\":10}}\n",
        ),
    )
    .unwrap();

    let err = load_jsonl(&path).unwrap_err();
    assert!(matches!(err, StoreError::NonMonotonic { watermark: 20, got: 10, .. }));
}

#[test]
fn export_and_reload_matches() {
    let dir = tempfile::tempdir().unwrap();
    let src = dir.path().join("in.jsonl");
    let dst = dir.path().join("nested/out.jsonl");
    std::fs::write(&src, DUMP).unwrap();

    let store = load_jsonl(&src).unwrap();
    assert_eq!(write_jsonl(&store, &dst).unwrap(), 3);

    let reloaded = load_jsonl(&dst).unwrap();
    assert_eq!(store.all(), reloaded.all());
}
