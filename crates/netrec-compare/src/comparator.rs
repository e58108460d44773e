use netrec_schemas::{Attributes, EntityKind, FieldDifference};

/// Field-level comparison capability.
///
/// Given the resolved and declared attribute maps of the same entity, return
/// every field that differs. Values that differ only in representation are
/// returned with `semantic_match = true`. A deterministic rule table and an
/// external semantic judge are both valid implementations.
pub trait Comparator: Send + Sync {
    fn name(&self) -> &str;

    /// Identity of the comparison behaviour, part of cache keys for
    /// comparison results. Implementations with tunable rules must fold the
    /// rules in.
    fn fingerprint(&self) -> String {
        self.name().to_string()
    }

    fn compare_fields(
        &self,
        entity_kind: &EntityKind,
        resolved: &Attributes,
        truth: &Attributes,
    ) -> Vec<FieldDifference>;
}
