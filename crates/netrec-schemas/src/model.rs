use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{EntityKind, NaturalKey};

/// Open attribute map. `BTreeMap` so every serialization is key-ordered.
pub type Attributes = BTreeMap<String, Value>;

// ---------------------------------------------------------------------------
// Observation
// ---------------------------------------------------------------------------

/// One timestamped record of an entity as seen by a telemetry producer.
///
/// Immutable once written; the snapshot store only appends.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Observation {
    #[serde(default = "default_namespace")]
    pub namespace: String,
    pub hostname: String,
    pub entity_kind: EntityKind,
    /// Epoch milliseconds, monotonically increasing per producer.
    pub timestamp: i64,
    /// Liveness flag set by the producer.
    #[serde(default)]
    pub active: bool,
    #[serde(default)]
    pub attributes: Attributes,
}

fn default_namespace() -> String {
    "default".to_string()
}

impl Observation {
    pub fn new(
        namespace: impl Into<String>,
        hostname: impl Into<String>,
        entity_kind: EntityKind,
        timestamp: i64,
        active: bool,
        attributes: Attributes,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            hostname: hostname.into(),
            entity_kind,
            timestamp,
            active,
            attributes,
        }
    }

    pub fn natural_key(&self) -> NaturalKey {
        NaturalKey::derive(&self.entity_kind, &self.hostname, &self.attributes)
    }
}

// ---------------------------------------------------------------------------
// Resolved entity / source of truth
// ---------------------------------------------------------------------------

/// The resolver's canonical "current state" for one natural key.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedEntity {
    pub entity_kind: EntityKind,
    pub key: NaturalKey,
    pub namespace: String,
    pub hostname: String,
    /// Timestamp of the observation chosen as current.
    pub timestamp: i64,
    pub active: bool,
    pub attributes: Attributes,
}

impl ResolvedEntity {
    pub fn from_observation(obs: &Observation) -> Self {
        Self {
            entity_kind: obs.entity_kind.clone(),
            key: obs.natural_key(),
            namespace: obs.namespace.clone(),
            hostname: obs.hostname.clone(),
            timestamp: obs.timestamp,
            active: obs.active,
            attributes: obs.attributes.clone(),
        }
    }

    pub fn identifier(&self) -> String {
        self.key.identifier()
    }
}

/// An entity as declared by the inventory of record.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceOfTruthRecord {
    pub entity_kind: EntityKind,
    pub hostname: String,
    #[serde(default)]
    pub attributes: Attributes,
}

impl SourceOfTruthRecord {
    pub fn new(entity_kind: EntityKind, hostname: impl Into<String>, attributes: Attributes) -> Self {
        Self {
            entity_kind,
            hostname: hostname.into(),
            attributes,
        }
    }

    pub fn natural_key(&self) -> NaturalKey {
        NaturalKey::derive(&self.entity_kind, &self.hostname, &self.attributes)
    }

    pub fn identifier(&self) -> String {
        self.natural_key().identifier()
    }
}

// ---------------------------------------------------------------------------
// Differences
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

impl Severity {
    pub const ALL: [Severity; 3] = [Severity::Info, Severity::Warning, Severity::Critical];

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a comparator rule decides two values are equivalent.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMode {
    Exact,
    CaseInsensitive,
    /// `"1500"` and `1500` are the same value.
    Numeric,
    /// `true`, `"up"`, `"enabled"`, `"yes"` are all true.
    Boolean,
    /// Order-insensitive list comparison (VLAN membership and the like).
    Set,
}

/// Severity assigned to an entity that exists on one side only.
pub const EXISTENCE_SEVERITY: Severity = Severity::Warning;

/// One attribute that disagrees between resolved state and the inventory.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldDifference {
    pub field_name: String,
    pub resolved_value: Value,
    pub truth_value: Value,
    /// Comparator judged the values equivalent despite differing
    /// representation. Never reported, never corrected.
    pub semantic_match: bool,
    pub severity: Severity,
    pub explanation: String,
}

impl FieldDifference {
    pub fn is_reportable(&self) -> bool {
        !self.semantic_match
    }
}

/// One entity's comparison result.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityDiff {
    pub entity_kind: EntityKind,
    pub identifier: String,
    /// Natural key behind `identifier`. Writes target the record by key.
    pub key: NaturalKey,
    pub hostname: String,
    pub exists_in_truth: bool,
    pub exists_in_resolved: bool,
    pub field_differences: Vec<FieldDifference>,
    pub auto_correctable: bool,
    /// Resolved attributes, carried so a `missingInTruth` entity can be
    /// written back in full once approved.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_attributes: Option<Attributes>,
}

impl EntityDiff {
    pub fn is_existence_diff(&self) -> bool {
        !(self.exists_in_truth && self.exists_in_resolved)
    }

    pub fn is_missing_in_truth(&self) -> bool {
        self.exists_in_resolved && !self.exists_in_truth
    }

    pub fn is_missing_in_resolved(&self) -> bool {
        self.exists_in_truth && !self.exists_in_resolved
    }

    /// Field differences that are real (not semantic matches).
    pub fn reportable_differences(&self) -> impl Iterator<Item = &FieldDifference> {
        self.field_differences.iter().filter(|d| d.is_reportable())
    }

    /// `true` when there is anything to act on.
    pub fn has_differences(&self) -> bool {
        self.is_existence_diff() || self.reportable_differences().next().is_some()
    }

    pub fn has_critical(&self) -> bool {
        self.reportable_differences()
            .any(|d| d.severity == Severity::Critical)
    }

    /// Highest severity among reportable differences (existence included).
    pub fn max_severity(&self) -> Option<Severity> {
        let field_max = self.reportable_differences().map(|d| d.severity).max();
        if self.is_existence_diff() {
            Some(field_max.map_or(EXISTENCE_SEVERITY, |s| s.max(EXISTENCE_SEVERITY)))
        } else {
            field_max
        }
    }

    /// Stable lock / lookup key: `kind|identifier`.
    pub fn entity_key(&self) -> String {
        format!("{}|{}", self.entity_kind, self.identifier)
    }
}
