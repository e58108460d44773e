//! One (entity kind, device) unit of work. Synchronous; the orchestrator
//! runs it on the blocking pool.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use netrec_cache::ResultCache;
use netrec_compare::{compare, AutoCorrectPolicy, Comparator};
use netrec_reconcile::{Controller, Inventory, ReconcileMode, ReconcileOutcome, UnresolvedEntity};
use netrec_resolve::{Resolution, ResolveError, Resolver, ScopeFilter};
use netrec_schemas::{Clock, EntityDiff, EntityKind, ResolvedEntity, SourceOfTruthRecord};
use serde::Serialize;
use tracing::{debug, info, warn};

pub const RESOLVE_TOOL: &str = "resolve";
pub const COMPARE_TOOL: &str = "compare";

/// Collaborators shared by every worker.
#[derive(Clone)]
pub(crate) struct Deps {
    pub resolver: Resolver,
    pub inventory: Arc<dyn Inventory>,
    pub comparator: Arc<dyn Comparator>,
    pub policy: Arc<AutoCorrectPolicy>,
    pub cache: Arc<ResultCache>,
    pub controller: Arc<Controller>,
    pub clock: Arc<dyn Clock>,
}

#[derive(Clone, Debug)]
pub(crate) struct WorkUnit {
    pub run_id: String,
    pub mode: ReconcileMode,
    pub entity_kind: EntityKind,
    pub hostname: String,
    pub namespace: Option<String>,
    pub max_age_ms: i64,
    pub cache_ttl: Duration,
}

#[derive(Debug, Default)]
pub(crate) struct UnitResult {
    /// Every compared entity, clean ones included.
    pub diffs: Vec<EntityDiff>,
    pub outcomes: Vec<ReconcileOutcome>,
    pub unresolved: Vec<UnresolvedEntity>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ResolveParams<'a> {
    entity_kind: &'a EntityKind,
    namespace: Option<&'a str>,
    hostname: &'a str,
    max_age_ms: i64,
    /// Fingerprint of the windowed rows the resolve would read.
    snapshot: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CompareParams<'a> {
    entity_kind: &'a EntityKind,
    resolved: &'a [ResolvedEntity],
    truth: &'a [SourceOfTruthRecord],
    comparator: String,
    auto_correct_fields: Vec<String>,
}

pub(crate) fn run_unit(deps: &Deps, unit: &WorkUnit) -> UnitResult {
    let resolution = match resolve_cached(deps, unit) {
        Ok(r) => r,
        Err(e) => {
            warn!(
                run_id = %unit.run_id,
                entity_kind = %unit.entity_kind,
                hostname = %unit.hostname,
                error = %e,
                "device unresolved"
            );
            return UnitResult {
                unresolved: unresolved_rows(deps, unit, &e.to_string()),
                ..UnitResult::default()
            };
        }
    };

    let scope = [unit.hostname.clone()];
    let truth = match deps.inventory.list_records(&unit.entity_kind, &scope) {
        Ok(t) => t,
        Err(e) => {
            warn!(
                run_id = %unit.run_id,
                entity_kind = %unit.entity_kind,
                hostname = %unit.hostname,
                error = %e,
                "inventory read failed; device unresolved"
            );
            return UnitResult {
                unresolved: vec![wildcard(unit, &e.to_string())],
                ..UnitResult::default()
            };
        }
    };

    let diffs = compare_cached(deps, unit, &resolution.entities, &truth);
    let outcomes = diffs
        .iter()
        .filter(|d| d.has_differences())
        .map(|d| deps.controller.reconcile(&unit.run_id, d, unit.mode))
        .collect::<Vec<_>>();

    debug!(
        run_id = %unit.run_id,
        entity_kind = %unit.entity_kind,
        hostname = %unit.hostname,
        compared = diffs.len(),
        actioned = outcomes.len(),
        "unit done"
    );
    UnitResult {
        diffs,
        outcomes,
        unresolved: Vec::new(),
    }
}

fn resolve_cached(deps: &Deps, unit: &WorkUnit) -> Result<Resolution, ResolveError> {
    let filter = ScopeFilter::device(unit.hostname.clone()).in_namespace(unit.namespace.clone());
    let now_ms = deps.clock.now_ms();

    // Without a fingerprint nothing ties a cached result to the store's
    // current contents, so the cache is skipped.
    let snapshot = deps
        .resolver
        .fingerprint(&unit.entity_kind, &filter, unit.max_age_ms, now_ms)?;
    let ttl = if snapshot.is_some() { unit.cache_ttl } else { Duration::ZERO };
    let params = ResolveParams {
        entity_kind: &unit.entity_kind,
        namespace: unit.namespace.as_deref(),
        hostname: &unit.hostname,
        max_age_ms: unit.max_age_ms,
        snapshot: snapshot.as_deref().unwrap_or_default(),
    };

    let (resolution, hit) = deps.cache.get_or_compute(RESOLVE_TOOL, &params, ttl, || {
        deps.resolver
            .resolve(&unit.entity_kind, &filter, unit.max_age_ms, now_ms)
    })?;
    if resolution.is_no_data() {
        info!(
            run_id = %unit.run_id,
            entity_kind = %unit.entity_kind,
            hostname = %unit.hostname,
            cache_hit = hit,
            "no observations; every declared entity will be missingInResolved"
        );
    }
    Ok(resolution)
}

fn compare_cached(
    deps: &Deps,
    unit: &WorkUnit,
    resolved: &[ResolvedEntity],
    truth: &[SourceOfTruthRecord],
) -> Vec<EntityDiff> {
    let params = CompareParams {
        entity_kind: &unit.entity_kind,
        resolved,
        truth,
        comparator: deps.comparator.fingerprint(),
        auto_correct_fields: deps.policy.effective_fields(),
    };
    deps.cache
        .get_or_compute(COMPARE_TOOL, &params, unit.cache_ttl, || {
            Ok::<_, Infallible>(compare(
                &unit.entity_kind,
                resolved,
                truth,
                deps.comparator.as_ref(),
                &deps.policy,
            ))
        })
        .map(|(diffs, _)| diffs)
        .unwrap_or_else(|never| match never {})
}

/// One row per declared entity the failure hid, or a wildcard when the
/// inventory cannot say which ones.
fn unresolved_rows(deps: &Deps, unit: &WorkUnit, reason: &str) -> Vec<UnresolvedEntity> {
    let scope = [unit.hostname.clone()];
    match deps.inventory.list_records(&unit.entity_kind, &scope) {
        Ok(records) if !records.is_empty() => records
            .iter()
            .map(|r| UnresolvedEntity {
                entity_kind: unit.entity_kind.clone(),
                hostname: unit.hostname.clone(),
                identifier: r.identifier(),
                reason: reason.to_string(),
            })
            .collect(),
        Ok(_) => vec![wildcard(unit, reason)],
        Err(e) => vec![wildcard(unit, &format!("{reason}; inventory: {e}"))],
    }
}

fn wildcard(unit: &WorkUnit, reason: &str) -> UnresolvedEntity {
    UnresolvedEntity {
        entity_kind: unit.entity_kind.clone(),
        hostname: unit.hostname.clone(),
        identifier: "*".to_string(),
        reason: reason.to_string(),
    }
}
