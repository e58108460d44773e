use std::collections::{BTreeMap, BTreeSet};

use netrec_config::ComparatorSettings;
use netrec_schemas::canonical::{canonical_string, sha256_hex};
use netrec_schemas::{Attributes, EntityKind, FieldDifference, MatchMode, Severity};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::Comparator;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldRule {
    pub severity: Severity,
    #[serde(rename = "match")]
    pub match_mode: MatchMode,
}

impl FieldRule {
    pub const fn new(severity: Severity, match_mode: MatchMode) -> Self {
        Self {
            severity,
            match_mode,
        }
    }
}

/// Applied to any field without an explicit rule.
const DEFAULT_RULE: FieldRule = FieldRule::new(Severity::Warning, MatchMode::Exact);

const BUILTIN_RULES: &[(&str, FieldRule)] = &[
    ("mtu", FieldRule::new(Severity::Warning, MatchMode::Numeric)),
    ("speed", FieldRule::new(Severity::Warning, MatchMode::Numeric)),
    ("description", FieldRule::new(Severity::Info, MatchMode::Exact)),
    ("adminState", FieldRule::new(Severity::Critical, MatchMode::Boolean)),
    ("enabled", FieldRule::new(Severity::Critical, MatchMode::Boolean)),
    ("ipAddress", FieldRule::new(Severity::Critical, MatchMode::CaseInsensitive)),
    ("address", FieldRule::new(Severity::Critical, MatchMode::CaseInsensitive)),
    ("vlan", FieldRule::new(Severity::Critical, MatchMode::Set)),
    ("vlans", FieldRule::new(Severity::Critical, MatchMode::Set)),
    ("accessVlan", FieldRule::new(Severity::Critical, MatchMode::Set)),
    ("trunkVlans", FieldRule::new(Severity::Critical, MatchMode::Set)),
];

/// Deterministic field comparator driven by a per-field rule table.
///
/// Only fields the truth record declares are compared; the inventory is
/// allowed to be sparse. A field absent from the resolved side compares as
/// `null`.
#[derive(Clone, Debug, PartialEq)]
pub struct RuleTableComparator {
    rules: BTreeMap<String, FieldRule>,
    ignore: BTreeSet<String>,
}

impl Default for RuleTableComparator {
    fn default() -> Self {
        Self::builtin()
    }
}

impl RuleTableComparator {
    pub fn builtin() -> Self {
        Self {
            rules: BUILTIN_RULES
                .iter()
                .map(|(f, r)| (f.to_string(), *r))
                .collect(),
            ignore: BTreeSet::new(),
        }
    }

    pub fn from_settings(settings: &ComparatorSettings) -> Self {
        let mut cmp = Self::builtin();
        for (field, rule) in &settings.rules {
            cmp = cmp.with_rule(field.clone(), FieldRule::new(rule.severity, rule.match_mode));
        }
        cmp.ignoring(settings.ignore_fields.iter().cloned())
    }

    pub fn with_rule(mut self, field: impl Into<String>, rule: FieldRule) -> Self {
        self.rules.insert(field.into(), rule);
        self
    }

    pub fn ignoring<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ignore.extend(fields.into_iter().map(Into::into));
        self
    }

    pub fn rule_for(&self, field: &str) -> FieldRule {
        self.rules.get(field).copied().unwrap_or(DEFAULT_RULE)
    }

    fn compare_field(&self, field: &str, resolved: &Value, truth: &Value) -> Option<FieldDifference> {
        if resolved == truth {
            return None;
        }
        let rule = self.rule_for(field);
        let semantic_match = equivalent(rule.match_mode, resolved, truth);
        let explanation = if semantic_match {
            format!("{field}: equivalent under {:?} match", rule.match_mode)
        } else if resolved.is_null() {
            format!("{field}: declared {truth} but not observed")
        } else {
            format!("{field}: observed {resolved}, declared {truth}")
        };
        Some(FieldDifference {
            field_name: field.to_string(),
            resolved_value: resolved.clone(),
            truth_value: truth.clone(),
            semantic_match,
            severity: rule.severity,
            explanation,
        })
    }
}

impl Comparator for RuleTableComparator {
    fn name(&self) -> &str {
        "rule_table"
    }

    fn fingerprint(&self) -> String {
        #[derive(Serialize)]
        struct Shape<'a> {
            rules: &'a BTreeMap<String, FieldRule>,
            ignore: &'a BTreeSet<String>,
        }
        let shape = Shape {
            rules: &self.rules,
            ignore: &self.ignore,
        };
        // Serializing plain maps of enums cannot fail; fall back to the name.
        match canonical_string(&shape) {
            Ok(s) => format!("{}:{}", self.name(), sha256_hex(s.as_bytes())),
            Err(_) => self.name().to_string(),
        }
    }

    fn compare_fields(
        &self,
        _entity_kind: &EntityKind,
        resolved: &Attributes,
        truth: &Attributes,
    ) -> Vec<FieldDifference> {
        truth
            .iter()
            .filter(|(field, _)| !self.ignore.contains(field.as_str()))
            .filter_map(|(field, declared)| {
                let observed = resolved.get(field).unwrap_or(&Value::Null);
                self.compare_field(field, observed, declared)
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Match modes
// ---------------------------------------------------------------------------

fn equivalent(mode: MatchMode, a: &Value, b: &Value) -> bool {
    match mode {
        MatchMode::Exact => a == b,
        MatchMode::CaseInsensitive => match (as_text(a), as_text(b)) {
            (Some(x), Some(y)) => x.trim().eq_ignore_ascii_case(y.trim()),
            _ => false,
        },
        MatchMode::Numeric => match (as_number(a), as_number(b)) {
            (Some(x), Some(y)) => x == y,
            _ => false,
        },
        MatchMode::Boolean => match (as_bool(a), as_bool(b)) {
            (Some(x), Some(y)) => x == y,
            _ => false,
        },
        MatchMode::Set => match (as_set(a), as_set(b)) {
            (Some(x), Some(y)) => x == y,
            _ => false,
        },
    }
}

fn as_text(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn as_number(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn as_bool(v: &Value) -> Option<bool> {
    match v {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => n.as_i64().map(|i| i != 0),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "up" | "enabled" | "yes" | "on" | "1" => Some(true),
            "false" | "down" | "disabled" | "no" | "off" | "0" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

/// Lists and comma-separated strings, elements normalised to text.
fn as_set(v: &Value) -> Option<BTreeSet<String>> {
    match v {
        Value::Array(items) => items
            .iter()
            .map(|i| as_text(i).map(|s| s.trim().to_string()))
            .collect(),
        Value::String(s) => Some(
            s.split(',')
                .map(|p| p.trim().to_string())
                .filter(|p| !p.is_empty())
                .collect(),
        ),
        Value::Number(n) => Some(BTreeSet::from([n.to_string()])),
        _ => None,
    }
}
