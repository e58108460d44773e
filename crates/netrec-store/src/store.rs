use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use netrec_schemas::canonical::{canonical_string, sha256_hex};
use netrec_schemas::{EntityKind, Observation};
use tracing::debug;

use crate::{StoreError, TimestampFreshness, TimestampWatermark};

// ---------------------------------------------------------------------------
// Read interface
// ---------------------------------------------------------------------------

/// Windowed read request against the telemetry source.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ObservationQuery {
    pub entity_kind: EntityKind,
    pub namespace: Option<String>,
    pub hostname: Option<String>,
    /// Inclusive lower bound on `timestamp`.
    pub since_timestamp: Option<i64>,
}

impl ObservationQuery {
    pub fn kind(entity_kind: EntityKind) -> Self {
        Self {
            entity_kind,
            namespace: None,
            hostname: None,
            since_timestamp: None,
        }
    }

    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    pub fn hostname(mut self, hostname: impl Into<String>) -> Self {
        self.hostname = Some(hostname.into());
        self
    }

    pub fn since(mut self, since_timestamp: i64) -> Self {
        self.since_timestamp = Some(since_timestamp);
        self
    }
}

/// Telemetry read interface consumed by the resolver.
///
/// An absent partition is a valid empty answer. `Err` means the read itself
/// failed and must surface as "source unavailable", never as "no data".
pub trait TelemetrySource: Send + Sync {
    fn read_observations(&self, query: &ObservationQuery) -> Result<Vec<Observation>, StoreError>;

    /// Hostnames with at least one partition (optionally of one kind).
    fn hostnames(&self, entity_kind: Option<&EntityKind>) -> Result<Vec<String>, StoreError>;

    /// Content fingerprint of what `read_observations(query)` would return.
    /// Equal fingerprints mean equal rows. `None` means the source cannot
    /// tell, and results derived from it must not be cached.
    fn fingerprint(&self, _query: &ObservationQuery) -> Result<Option<String>, StoreError> {
        Ok(None)
    }
}

// ---------------------------------------------------------------------------
// In-process store
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PartitionKey {
    pub entity_kind: EntityKind,
    pub namespace: String,
    pub hostname: String,
}

impl PartitionKey {
    pub fn of(obs: &Observation) -> Self {
        Self {
            entity_kind: obs.entity_kind.clone(),
            namespace: obs.namespace.clone(),
            hostname: obs.hostname.clone(),
        }
    }
}

impl fmt::Display for PartitionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.entity_kind, self.namespace, self.hostname)
    }
}

#[derive(Debug, Default)]
struct Partition {
    watermark: TimestampWatermark,
    rows: Vec<Observation>,
    /// Running hash over every accepted row.
    digest: String,
}

impl Partition {
    /// Index of the first row inside the window. Rows are timestamp-ordered.
    fn window_start(&self, since: Option<i64>) -> usize {
        since.map_or(0, |since| self.rows.partition_point(|o| o.timestamp < since))
    }
}

/// Append-only, partitioned observation store.
#[derive(Debug, Default)]
pub struct SnapshotStore {
    partitions: RwLock<BTreeMap<PartitionKey, Partition>>,
}

impl SnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one observation. Rejected appends leave the store unchanged.
    pub fn append(&self, obs: Observation) -> Result<(), StoreError> {
        let key = PartitionKey::of(&obs);
        let encoded = canonical_string(&obs)?;
        let mut parts = self.write_guard();
        let partition = parts.entry(key.clone()).or_default();

        match partition.watermark.accept(obs.timestamp) {
            TimestampFreshness::Fresh => {
                partition.digest = sha256_hex(format!("{}|{encoded}", partition.digest).as_bytes());
                partition.rows.push(obs);
                Ok(())
            }
            TimestampFreshness::Stale { watermark, got } => {
                drop_if_empty(&mut parts, &key);
                Err(StoreError::NonMonotonic {
                    partition: key,
                    watermark,
                    got,
                })
            }
            TimestampFreshness::NoTimestamp => {
                drop_if_empty(&mut parts, &key);
                Err(StoreError::MissingTimestamp { partition: key })
            }
        }
    }

    /// Append every observation in order, stopping at the first rejection.
    /// Returns the number appended.
    pub fn append_all(
        &self,
        observations: impl IntoIterator<Item = Observation>,
    ) -> Result<usize, StoreError> {
        let mut n = 0;
        for obs in observations {
            self.append(obs)?;
            n += 1;
        }
        Ok(n)
    }

    pub fn partition_count(&self) -> usize {
        self.read_guard().len()
    }

    /// Total observations across partitions.
    pub fn len(&self) -> usize {
        self.read_guard().values().map(|p| p.rows.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every observation, partition order then append order.
    pub fn all(&self) -> Vec<Observation> {
        self.read_guard()
            .values()
            .flat_map(|p| p.rows.iter().cloned())
            .collect()
    }

    /// Matching partitions in key order.
    fn matching<'a>(
        parts: &'a BTreeMap<PartitionKey, Partition>,
        query: &'a ObservationQuery,
    ) -> impl Iterator<Item = (&'a PartitionKey, &'a Partition)> + 'a {
        parts.iter().filter(move |(key, _)| {
            key.entity_kind == query.entity_kind
                && query.namespace.as_ref().map_or(true, |ns| *ns == key.namespace)
                && query.hostname.as_ref().map_or(true, |h| *h == key.hostname)
        })
    }

    fn read_guard(&self) -> RwLockReadGuard<'_, BTreeMap<PartitionKey, Partition>> {
        self.partitions.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_guard(&self) -> RwLockWriteGuard<'_, BTreeMap<PartitionKey, Partition>> {
        self.partitions.write().unwrap_or_else(PoisonError::into_inner)
    }
}

fn drop_if_empty(parts: &mut BTreeMap<PartitionKey, Partition>, key: &PartitionKey) {
    if parts.get(key).is_some_and(|p| p.rows.is_empty()) {
        parts.remove(key);
    }
}

impl TelemetrySource for SnapshotStore {
    fn read_observations(&self, query: &ObservationQuery) -> Result<Vec<Observation>, StoreError> {
        let parts = self.read_guard();
        let mut out = Vec::new();
        for (_, partition) in Self::matching(&parts, query) {
            let start = partition.window_start(query.since_timestamp);
            out.extend(partition.rows[start..].iter().cloned());
        }
        debug!(
            entity_kind = %query.entity_kind,
            hostname = query.hostname.as_deref().unwrap_or("*"),
            rows = out.len(),
            "snapshot read"
        );
        Ok(out)
    }

    fn hostnames(&self, entity_kind: Option<&EntityKind>) -> Result<Vec<String>, StoreError> {
        let hosts: BTreeSet<String> = self
            .read_guard()
            .keys()
            .filter(|k| entity_kind.map_or(true, |kind| k.entity_kind == *kind))
            .map(|k| k.hostname.clone())
            .collect();
        Ok(hosts.into_iter().collect())
    }

    /// Covers each matching partition's full history plus where the window
    /// starts in it, so both a new append and a window that slides past an
    /// old row change the result.
    fn fingerprint(&self, query: &ObservationQuery) -> Result<Option<String>, StoreError> {
        let parts = self.read_guard();
        let lines: Vec<String> = Self::matching(&parts, query)
            .map(|(key, p)| {
                let start = p.window_start(query.since_timestamp);
                format!("{key}|{}|{start}|{}", p.rows.len(), p.digest)
            })
            .collect();
        Ok(Some(sha256_hex(lines.join("\n").as_bytes())))
    }
}
