use std::collections::BTreeMap;
use std::sync::Arc;

use netrec_schemas::{EntityKind, NaturalKey, Observation, ResolvedEntity};
use netrec_store::{ObservationQuery, StoreError, TelemetrySource};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Which slice of the store to resolve.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopeFilter {
    pub namespace: Option<String>,
    /// Empty = every hostname.
    pub hostnames: Vec<String>,
}

impl ScopeFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn device(hostname: impl Into<String>) -> Self {
        Self {
            namespace: None,
            hostnames: vec![hostname.into()],
        }
    }

    pub fn in_namespace(mut self, namespace: Option<String>) -> Self {
        self.namespace = namespace;
        self
    }
}

/// `NoData` is distinct from failure: the read worked and found nothing.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResolveStatus {
    Resolved,
    NoData,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Resolution {
    pub entity_kind: EntityKind,
    pub status: ResolveStatus,
    /// Sorted by natural key.
    pub entities: Vec<ResolvedEntity>,
}

impl Resolution {
    pub fn is_no_data(&self) -> bool {
        self.status == ResolveStatus::NoData
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("resolve {entity_kind} failed: source unavailable for {hostname}: {message}")]
    SourceUnavailable {
        entity_kind: EntityKind,
        hostname: String,
        message: String,
    },
}

impl ResolveError {
    fn from_store(kind: &EntityKind, hostname: Option<&str>, err: StoreError) -> Self {
        match err {
            StoreError::Unavailable {
                entity_kind,
                hostname,
                message,
            } => ResolveError::SourceUnavailable {
                entity_kind,
                hostname,
                message,
            },
            other => ResolveError::SourceUnavailable {
                entity_kind: kind.clone(),
                hostname: hostname.unwrap_or("*").to_string(),
                message: other.to_string(),
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Resolver
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct Resolver {
    source: Arc<dyn TelemetrySource>,
}

impl Resolver {
    pub fn new(source: Arc<dyn TelemetrySource>) -> Self {
        Self { source }
    }

    pub fn source(&self) -> &Arc<dyn TelemetrySource> {
        &self.source
    }

    /// Resolve `entity_kind` within `scope`.
    ///
    /// `max_age_ms == 0` disables windowing; otherwise observations with
    /// `now_ms - timestamp > max_age_ms` are discarded before dedup.
    pub fn resolve(
        &self,
        entity_kind: &EntityKind,
        scope: &ScopeFilter,
        max_age_ms: i64,
        now_ms: i64,
    ) -> Result<Resolution, ResolveError> {
        let cutoff = window_cutoff(max_age_ms, now_ms);

        let mut observations = Vec::new();
        for query in queries(entity_kind, scope, cutoff) {
            observations.extend(
                self.source
                    .read_observations(&query)
                    .map_err(|e| ResolveError::from_store(entity_kind, query.hostname.as_deref(), e))?,
            );
        }

        // The source may not honour `since`; the window is enforced here too.
        if let Some(cutoff) = cutoff {
            observations.retain(|o| o.timestamp >= cutoff);
        }

        let entities = resolve_observations(observations);
        let status = if entities.is_empty() {
            info!(entity_kind = %entity_kind, hostnames = ?scope.hostnames, "NO_DATA");
            ResolveStatus::NoData
        } else {
            debug!(entity_kind = %entity_kind, entities = entities.len(), "resolved");
            ResolveStatus::Resolved
        };

        Ok(Resolution {
            entity_kind: entity_kind.clone(),
            status,
            entities,
        })
    }

    /// Fingerprint of the rows [`Resolver::resolve`] would read for the same
    /// arguments. `None` when the source cannot fingerprint one of them.
    pub fn fingerprint(
        &self,
        entity_kind: &EntityKind,
        scope: &ScopeFilter,
        max_age_ms: i64,
        now_ms: i64,
    ) -> Result<Option<String>, ResolveError> {
        let mut parts = Vec::new();
        for query in queries(entity_kind, scope, window_cutoff(max_age_ms, now_ms)) {
            let fp = self
                .source
                .fingerprint(&query)
                .map_err(|e| ResolveError::from_store(entity_kind, query.hostname.as_deref(), e))?;
            match fp {
                Some(fp) => parts.push(fp),
                None => return Ok(None),
            }
        }
        Ok(Some(parts.join("+")))
    }
}

fn window_cutoff(max_age_ms: i64, now_ms: i64) -> Option<i64> {
    (max_age_ms > 0).then(|| now_ms.saturating_sub(max_age_ms))
}

/// One read per scoped hostname, or a single unscoped read.
fn queries(entity_kind: &EntityKind, scope: &ScopeFilter, since: Option<i64>) -> Vec<ObservationQuery> {
    let base = ObservationQuery {
        entity_kind: entity_kind.clone(),
        namespace: scope.namespace.clone(),
        hostname: None,
        since_timestamp: since,
    };
    if scope.hostnames.is_empty() {
        return vec![base];
    }
    scope
        .hostnames
        .iter()
        .map(|host| base.clone().hostname(host.as_str()))
        .collect()
}

// ---------------------------------------------------------------------------
// Dedup
// ---------------------------------------------------------------------------

#[derive(Default)]
struct Candidates {
    latest_active: Option<Observation>,
    latest_any: Option<Observation>,
}

fn newer_or_equal(candidate: &Observation, current: &Option<Observation>) -> bool {
    current
        .as_ref()
        .map_or(true, |cur| candidate.timestamp >= cur.timestamp)
}

/// Pick the current observation per natural key. Pure; no windowing.
pub fn resolve_observations(
    observations: impl IntoIterator<Item = Observation>,
) -> Vec<ResolvedEntity> {
    let mut by_key: BTreeMap<NaturalKey, Candidates> = BTreeMap::new();

    for obs in observations {
        let slot = by_key.entry(obs.natural_key()).or_default();
        if obs.active && newer_or_equal(&obs, &slot.latest_active) {
            slot.latest_active = Some(obs.clone());
        }
        if newer_or_equal(&obs, &slot.latest_any) {
            slot.latest_any = Some(obs);
        }
    }

    by_key
        .into_values()
        .filter_map(|c| c.latest_active.or(c.latest_any))
        .map(|obs| ResolvedEntity::from_observation(&obs))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use netrec_schemas::Attributes;
    use serde_json::json;

    fn iface(host: &str, if_name: &str, ts: i64, active: bool, mtu: i64) -> Observation {
        let mut attrs = Attributes::new();
        attrs.insert("ifName".to_string(), json!(if_name));
        attrs.insert("mtu".to_string(), json!(mtu));
        Observation::new("default", host, EntityKind::Interface, ts, active, attrs)
    }

    #[test]
    fn latest_active_wins_over_later_inactive() {
        let out = resolve_observations(vec![
            iface("R1", "Gi0/0", 1, true, 1),
            iface("R1", "Gi0/0", 2, false, 2),
            iface("R1", "Gi0/0", 3, true, 3),
        ]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].timestamp, 3);

        let out = resolve_observations(vec![
            iface("R1", "Gi0/0", 1, true, 1),
            iface("R1", "Gi0/0", 5, false, 5),
        ]);
        assert_eq!(out[0].timestamp, 1, "an older active beats a newer inactive");
        assert!(out[0].active);
    }

    #[test]
    fn all_inactive_falls_back_to_latest() {
        let out = resolve_observations(vec![
            iface("R1", "Gi0/0", 1, false, 1),
            iface("R1", "Gi0/0", 2, false, 2),
            iface("R1", "Gi0/0", 3, false, 3),
        ]);
        assert_eq!(out[0].timestamp, 3);
    }

    #[test]
    fn tie_goes_to_later_append() {
        let out = resolve_observations(vec![
            iface("R1", "Gi0/0", 7, true, 1500),
            iface("R1", "Gi0/0", 7, true, 9000),
        ]);
        assert_eq!(out[0].attributes["mtu"], json!(9000));
    }

    #[test]
    fn output_sorted_by_key() {
        let out = resolve_observations(vec![
            iface("R2", "Gi0/0", 1, true, 1),
            iface("R1", "Gi0/1", 1, true, 1),
            iface("R1", "Gi0/0", 1, true, 1),
        ]);
        let ids: Vec<String> = out.iter().map(|e| e.identifier()).collect();
        assert_eq!(ids, vec!["R1.Gi0/0", "R1.Gi0/1", "R2.Gi0/0"]);
    }
}
