use std::collections::BTreeSet;

use netrec_config::PolicySettings;
use netrec_schemas::{EntityDiff, Severity};

/// Fields that are never auto-correctable, whatever the allow-list says:
/// addressing, admin/enabled state and VLAN membership.
pub const NEVER_AUTO_CORRECT: &[&str] = &[
    "ipAddress",
    "address",
    "adminState",
    "enabled",
    "vlan",
    "vlans",
    "accessVlan",
    "trunkVlans",
];

/// Which differences a live run may fix without a human.
///
/// A difference is auto-correctable only if it is real (not a semantic
/// match), not critical, and its field is allow-listed and not deny-listed.
/// An entity is auto-correctable only if every real difference is, and it
/// has no existence difference.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AutoCorrectPolicy {
    allowed: BTreeSet<String>,
}

impl Default for AutoCorrectPolicy {
    fn default() -> Self {
        Self::from_settings(&PolicySettings::default())
    }
}

impl AutoCorrectPolicy {
    pub fn new<I, S>(allowed_fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            allowed: allowed_fields.into_iter().map(Into::into).collect(),
        }
    }

    pub fn from_settings(settings: &PolicySettings) -> Self {
        Self::new(settings.auto_correct_fields.iter().cloned())
    }

    /// Allow-list membership after the fixed deny-list is applied.
    pub fn allows_field(&self, field: &str) -> bool {
        !NEVER_AUTO_CORRECT.contains(&field) && self.allowed.contains(field)
    }

    /// A field the device does not report (resolved value null) is never
    /// auto-corrected; writing it back would delete inventory data.
    pub fn is_auto_correctable(&self, diff: &EntityDiff) -> bool {
        if diff.is_existence_diff() {
            return false;
        }
        let mut any = false;
        for d in diff.reportable_differences() {
            any = true;
            if d.severity == Severity::Critical
                || d.resolved_value.is_null()
                || !self.allows_field(&d.field_name)
            {
                return false;
            }
        }
        any
    }

    /// Effective allow-list, sorted. Part of comparison cache keys.
    pub fn effective_fields(&self) -> Vec<String> {
        self.allowed
            .iter()
            .filter(|f| self.allows_field(f))
            .cloned()
            .collect()
    }
}
