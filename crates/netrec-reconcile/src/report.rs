//! Reconciliation report: a pure projection over diffs and outcomes.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use chrono::{DateTime, SecondsFormat, Utc};
use netrec_schemas::{EntityDiff, EntityKind, Severity, EXISTENCE_SEVERITY};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::{ReconcileMode, ReconcileOutcome};

/// Rows shown by [`ReconciliationReport::render_text`] before truncating.
pub const TEXT_ROW_LIMIT: usize = 50;

/// An entity that could not be compared because its device failed.
/// `identifier` is `*` when even the inventory could not say which
/// entities were affected.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnresolvedEntity {
    pub entity_kind: EntityKind,
    pub hostname: String,
    pub identifier: String,
    pub reason: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconciliationReport {
    pub run_id: String,
    pub mode: ReconcileMode,
    pub generated_at_ms: i64,
    pub device_scope: Vec<String>,
    pub total_entities: usize,
    pub matched: usize,
    pub mismatched: usize,
    pub missing_in_truth: usize,
    pub missing_in_resolved: usize,
    /// Entities with something to act on, sorted by (kind, identifier).
    pub diffs: Vec<EntityDiff>,
    /// Mismatched entities per kind.
    pub summary_by_kind: BTreeMap<String, usize>,
    /// Reportable field differences plus existence differences per severity.
    pub summary_by_severity: BTreeMap<Severity, usize>,
    /// Latest outcome per diff in `diffs`.
    pub outcomes: Vec<ReconcileOutcome>,
    #[serde(default)]
    pub unresolved: Vec<UnresolvedEntity>,
}

/// Run-level facts the report header needs.
#[derive(Clone, Debug)]
pub struct ReportContext {
    pub run_id: String,
    pub mode: ReconcileMode,
    pub generated_at_ms: i64,
    pub device_scope: Vec<String>,
}

impl ReconciliationReport {
    /// Project `diffs` (every compared entity, clean ones included) and the
    /// outcome log into a report. Outcomes of other runs are ignored; for a
    /// diff with several outcomes the last one wins.
    pub fn build(
        ctx: ReportContext,
        diffs: &[EntityDiff],
        outcomes: &[ReconcileOutcome],
        mut unresolved: Vec<UnresolvedEntity>,
    ) -> Self {
        let mut reportable: Vec<EntityDiff> = diffs.iter().filter(|d| d.has_differences()).cloned().collect();
        reportable.sort_by(|a, b| {
            (a.entity_kind.as_str(), &a.identifier).cmp(&(b.entity_kind.as_str(), &b.identifier))
        });

        let mut summary_by_severity: BTreeMap<Severity, usize> =
            Severity::ALL.iter().map(|s| (*s, 0)).collect();
        let mut summary_by_kind: BTreeMap<String, usize> = BTreeMap::new();
        let (mut missing_in_truth, mut missing_in_resolved) = (0, 0);

        for d in &reportable {
            *summary_by_kind.entry(d.entity_kind.to_string()).or_default() += 1;
            if d.is_existence_diff() {
                *summary_by_severity.entry(EXISTENCE_SEVERITY).or_default() += 1;
            }
            if d.is_missing_in_truth() {
                missing_in_truth += 1;
            }
            if d.is_missing_in_resolved() {
                missing_in_resolved += 1;
            }
            for f in d.reportable_differences() {
                *summary_by_severity.entry(f.severity).or_default() += 1;
            }
        }

        let mut latest: BTreeMap<String, &ReconcileOutcome> = BTreeMap::new();
        for o in outcomes.iter().filter(|o| o.run_id == ctx.run_id) {
            latest.insert(o.entity_key(), o);
        }
        let outcomes = reportable
            .iter()
            .filter_map(|d| latest.get(&d.entity_key()).map(|o| (*o).clone()))
            .collect();

        unresolved.sort_by(|a, b| {
            (a.entity_kind.as_str(), &a.hostname, &a.identifier)
                .cmp(&(b.entity_kind.as_str(), &b.hostname, &b.identifier))
        });

        let total_entities = diffs.len();
        let mismatched = reportable.len();
        Self {
            run_id: ctx.run_id,
            mode: ctx.mode,
            generated_at_ms: ctx.generated_at_ms,
            device_scope: ctx.device_scope,
            total_entities,
            matched: total_entities - mismatched,
            mismatched,
            missing_in_truth,
            missing_in_resolved,
            diffs: reportable,
            summary_by_kind,
            summary_by_severity,
            outcomes,
            unresolved,
        }
    }

    pub fn outcome_for(&self, diff: &EntityDiff) -> Option<&ReconcileOutcome> {
        let key = diff.entity_key();
        self.outcomes.iter().find(|o| o.entity_key() == key)
    }

    /// Count of reportable field differences plus existence differences.
    pub fn difference_count(&self) -> usize {
        self.summary_by_severity.values().sum()
    }

    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Operator-facing rendering: header, summary tables, then at most
    /// [`TEXT_ROW_LIMIT`] difference rows with an "N more" footer.
    pub fn render_text(&self) -> String {
        let mut out = String::new();
        let scope = if self.device_scope.is_empty() {
            "(none)".to_string()
        } else {
            self.device_scope.join(", ")
        };

        let _ = writeln!(out, "Reconciliation report {}", self.run_id);
        let _ = writeln!(out, "Generated:    {}", format_ms(self.generated_at_ms));
        let _ = writeln!(out, "Mode:         {}", self.mode);
        let _ = writeln!(out, "Device scope: {scope}");
        let _ = writeln!(out);

        let _ = writeln!(
            out,
            "Entities: {} total, {} matched, {} mismatched ({} missing in truth, {} missing in resolved)",
            self.total_entities,
            self.matched,
            self.mismatched,
            self.missing_in_truth,
            self.missing_in_resolved
        );
        let _ = writeln!(out);

        let _ = writeln!(out, "{:<16} {:>8}", "TYPE", "COUNT");
        for (kind, n) in &self.summary_by_kind {
            let _ = writeln!(out, "{kind:<16} {n:>8}");
        }
        let _ = writeln!(out);
        let _ = writeln!(out, "{:<16} {:>8}", "SEVERITY", "COUNT");
        for (sev, n) in &self.summary_by_severity {
            let _ = writeln!(out, "{:<16} {n:>8}", sev.as_str());
        }
        let _ = writeln!(out);

        let rows = self.difference_rows();
        let _ = writeln!(
            out,
            "{:<10} {:<28} {:<16} {:<18} {:<18} {:<9} {}",
            "KIND", "IDENTIFIER", "FIELD", "RESOLVED", "TRUTH", "SEVERITY", "OUTCOME"
        );
        for row in rows.iter().take(TEXT_ROW_LIMIT) {
            let _ = writeln!(
                out,
                "{:<10} {:<28} {:<16} {:<18} {:<18} {:<9} {}",
                row.kind, row.identifier, row.field, row.resolved, row.truth, row.severity, row.outcome
            );
        }
        if rows.len() > TEXT_ROW_LIMIT {
            let _ = writeln!(out, "... {} more", rows.len() - TEXT_ROW_LIMIT);
        }

        if !self.unresolved.is_empty() {
            let _ = writeln!(out);
            let _ = writeln!(out, "Unresolved ({}):", self.unresolved.len());
            for u in &self.unresolved {
                let _ = writeln!(
                    out,
                    "  {} {} {}: {}",
                    u.entity_kind, u.hostname, u.identifier, u.reason
                );
            }
        }
        out
    }

    fn difference_rows(&self) -> Vec<Row> {
        let mut rows = Vec::new();
        for d in &self.diffs {
            let outcome = self
                .outcome_for(d)
                .map_or_else(|| "-".to_string(), |o| o.action.to_string());
            if d.is_existence_diff() {
                let (field, resolved, truth) = if d.is_missing_in_truth() {
                    ("(entity)", "present", "absent")
                } else {
                    ("(entity)", "absent", "present")
                };
                rows.push(Row {
                    kind: d.entity_kind.to_string(),
                    identifier: d.identifier.clone(),
                    field: field.to_string(),
                    resolved: resolved.to_string(),
                    truth: truth.to_string(),
                    severity: EXISTENCE_SEVERITY.as_str(),
                    outcome: outcome.clone(),
                });
            }
            for f in d.reportable_differences() {
                rows.push(Row {
                    kind: d.entity_kind.to_string(),
                    identifier: d.identifier.clone(),
                    field: f.field_name.clone(),
                    resolved: cell(&f.resolved_value),
                    truth: cell(&f.truth_value),
                    severity: f.severity.as_str(),
                    outcome: outcome.clone(),
                });
            }
        }
        rows
    }
}

struct Row {
    kind: String,
    identifier: String,
    field: String,
    resolved: String,
    truth: String,
    severity: &'static str,
    outcome: String,
}

const CELL_WIDTH: usize = 18;

fn cell(v: &Value) -> String {
    let s = match v {
        Value::Null => "-".to_string(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    if s.chars().count() > CELL_WIDTH {
        let cut: String = s.chars().take(CELL_WIDTH - 1).collect();
        format!("{cut}~")
    } else {
        s
    }
}

fn format_ms(ms: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(ms)
        .map(|t| t.to_rfc3339_opts(SecondsFormat::Millis, true))
        .unwrap_or_else(|| format!("{ms}ms"))
}
