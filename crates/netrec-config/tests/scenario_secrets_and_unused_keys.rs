//! Secret literals and unused keys
//!
//! GREEN when:
//! - A literal credential anywhere in the merged config fails with
//!   CONFIG_SECRET_DETECTED and the value is never echoed.
//! - Env var names load fine.
//! - Unused keys warn in dry-run and fail in live; consumed subtrees are clean;
//!   unused pointers are sorted.

use netrec_config::{
    load_layered_yaml_from_strings, report_unused_keys, ConfigMode, UnusedKeyPolicy,
};

#[test]
fn literal_secret_is_rejected_without_echo() {
    let yaml = r#"
audit:
  path: "audit.jsonl"
collector:
  token: "ghp_abcdefghijklmnopqrstuvwxyz"
"#;
    let err = load_layered_yaml_from_strings(&[yaml]).unwrap_err();
    let msg = format!("{err:#}");
    assert!(msg.contains("CONFIG_SECRET_DETECTED"));
    assert!(msg.contains("/collector/token"));
    assert!(!msg.contains("ghp_abcdefghijklmnopqrstuvwxyz"));
}

#[test]
fn secret_in_overlay_array_is_rejected() {
    let base = "engine:\n  concurrency: 2\n";
    let overlay = r#"
devices:
  - host: R1
    enable_secret: "$9$ABCDEFGHIJKLmnop"
"#;
    assert!(load_layered_yaml_from_strings(&[base, overlay]).is_err());
}

#[test]
fn env_var_names_are_accepted() {
    let yaml = "collector:\n  token_env: \"NETREC_COLLECTOR_TOKEN\"\n";
    let loaded = load_layered_yaml_from_strings(&[yaml]).unwrap();
    assert_eq!(
        loaded.config_json.pointer("/collector/token_env").and_then(|v| v.as_str()),
        Some("NETREC_COLLECTOR_TOKEN")
    );
}

#[test]
fn dry_run_warns_on_unused_keys() {
    let yaml = r#"
engine:
  concurrency: 2
reconcile:
  retry_budget: 1
unused_section:
  foo: 123
"#;
    let loaded = load_layered_yaml_from_strings(&[yaml]).unwrap();
    let report = report_unused_keys(
        ConfigMode::DryRun,
        &loaded.config_json,
        UnusedKeyPolicy::for_mode(ConfigMode::DryRun),
    )
    .expect("warn mode must not error");

    assert_eq!(
        report.unused_leaf_pointers,
        vec![
            "/reconcile/retry_budget".to_string(),
            "/unused_section/foo".to_string()
        ],
        "retry budget is not read in dry-run; pointers are sorted"
    );
}

#[test]
fn live_fails_on_unused_keys() {
    let yaml = "engine:\n  mode: live\nmystery: 1\n";
    let loaded = load_layered_yaml_from_strings(&[yaml]).unwrap();
    let result = report_unused_keys(
        ConfigMode::Live,
        &loaded.config_json,
        UnusedKeyPolicy::for_mode(ConfigMode::Live),
    );
    let msg = format!("{:?}", result.unwrap_err());
    assert!(msg.contains("CONFIG_UNUSED_KEYS"));
}

#[test]
fn consumed_subtrees_are_clean_in_live() {
    let yaml = r#"
engine:
  kinds: [interface]
comparator:
  rules:
    speed:
      severity: warning
      match: numeric
reconcile:
  retry_budget: 1
"#;
    let loaded = load_layered_yaml_from_strings(&[yaml]).unwrap();
    let report =
        report_unused_keys(ConfigMode::Live, &loaded.config_json, UnusedKeyPolicy::Fail).unwrap();
    assert!(report.is_clean());
}
