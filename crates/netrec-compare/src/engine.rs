use std::collections::BTreeMap;

use netrec_schemas::{
    EntityDiff, EntityKind, FieldDifference, NaturalKey, ResolvedEntity, SourceOfTruthRecord,
};
use tracing::{debug, warn};

use crate::{AutoCorrectPolicy, Comparator};

#[derive(Default)]
struct Pair<'a> {
    resolved: Option<&'a ResolvedEntity>,
    truth: Option<&'a SourceOfTruthRecord>,
}

/// Diff `resolved` against `truth` for one entity kind.
///
/// Both sides are joined on the natural key. Records of another kind are
/// ignored. Entities present on both sides with nothing to report are kept
/// as clean diffs (empty `field_differences`) so callers can count matches.
///
/// Output is sorted by `(entity_kind, identifier)`.
pub fn compare(
    entity_kind: &EntityKind,
    resolved: &[ResolvedEntity],
    truth: &[SourceOfTruthRecord],
    comparator: &dyn Comparator,
    policy: &AutoCorrectPolicy,
) -> Vec<EntityDiff> {
    let mut joined: BTreeMap<NaturalKey, Pair<'_>> = BTreeMap::new();

    for entity in resolved.iter().filter(|e| &e.entity_kind == entity_kind) {
        joined.entry(entity.key.clone()).or_default().resolved = Some(entity);
    }
    for record in truth.iter().filter(|r| &r.entity_kind == entity_kind) {
        let slot = joined.entry(record.natural_key()).or_default();
        if slot.truth.is_some() {
            warn!(
                entity_kind = %entity_kind,
                identifier = %record.identifier(),
                "duplicate source-of-truth record; keeping the first"
            );
            continue;
        }
        slot.truth = Some(record);
    }

    let mut diffs: Vec<EntityDiff> = joined
        .into_iter()
        .filter_map(|(key, pair)| diff_pair(entity_kind, &key, pair, comparator, policy))
        .collect();

    diffs.sort_by(|a, b| {
        (a.entity_kind.as_str(), &a.identifier).cmp(&(b.entity_kind.as_str(), &b.identifier))
    });

    debug!(
        entity_kind = %entity_kind,
        comparator = comparator.name(),
        entities = diffs.len(),
        with_differences = diffs.iter().filter(|d| d.has_differences()).count(),
        "compared"
    );
    diffs
}

fn diff_pair(
    entity_kind: &EntityKind,
    key: &NaturalKey,
    pair: Pair<'_>,
    comparator: &dyn Comparator,
    policy: &AutoCorrectPolicy,
) -> Option<EntityDiff> {
    let (field_differences, resolved_attributes): (Vec<FieldDifference>, _) =
        match (pair.resolved, pair.truth) {
            (Some(r), Some(t)) => (
                comparator.compare_fields(entity_kind, &r.attributes, &t.attributes),
                None,
            ),
            (Some(r), None) => (Vec::new(), Some(r.attributes.clone())),
            (None, Some(_)) => (Vec::new(), None),
            (None, None) => return None,
        };

    let mut diff = EntityDiff {
        entity_kind: entity_kind.clone(),
        identifier: key.identifier(),
        key: key.clone(),
        hostname: key.hostname().to_string(),
        exists_in_truth: pair.truth.is_some(),
        exists_in_resolved: pair.resolved.is_some(),
        field_differences,
        auto_correctable: false,
        resolved_attributes,
    };
    diff.auto_correctable = policy.is_auto_correctable(&diff);
    Some(diff)
}
