use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use netrec_reconcile::{InMemoryInventory, Inventory, InventoryError};
use netrec_schemas::{EntityKind, NaturalKey, Observation, SourceOfTruthRecord};
use netrec_store::{ObservationQuery, SnapshotStore, StoreError, TelemetrySource};
use serde_json::Value;

// ---------------------------------------------------------------------------
// Telemetry
// ---------------------------------------------------------------------------

/// A snapshot store whose reads fail for selected hostnames.
///
/// Hostname discovery still lists the failing devices so a run schedules
/// them and has to isolate the failure.
pub struct FailingSource {
    inner: Arc<SnapshotStore>,
    failing: BTreeSet<String>,
}

impl FailingSource {
    pub fn new<I, S>(inner: Arc<SnapshotStore>, failing_hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            inner,
            failing: failing_hosts.into_iter().map(Into::into).collect(),
        }
    }
}

impl FailingSource {
    fn check(&self, query: &ObservationQuery) -> Result<(), StoreError> {
        let host = query.hostname.as_deref().unwrap_or("*");
        if (query.hostname.is_none() && !self.failing.is_empty()) || self.failing.contains(host) {
            return Err(StoreError::unavailable(&query.entity_kind, host, "connection refused"));
        }
        Ok(())
    }
}

impl TelemetrySource for FailingSource {
    fn read_observations(&self, query: &ObservationQuery) -> Result<Vec<Observation>, StoreError> {
        self.check(query)?;
        self.inner.read_observations(query)
    }

    fn fingerprint(&self, query: &ObservationQuery) -> Result<Option<String>, StoreError> {
        self.check(query)?;
        self.inner.fingerprint(query)
    }

    fn hostnames(&self, entity_kind: Option<&EntityKind>) -> Result<Vec<String>, StoreError> {
        let mut hosts: BTreeSet<String> = self.inner.hostnames(entity_kind)?.into_iter().collect();
        hosts.extend(self.failing.iter().cloned());
        Ok(hosts.into_iter().collect())
    }
}

// ---------------------------------------------------------------------------
// Inventory
// ---------------------------------------------------------------------------

/// In-memory inventory whose first `failures` writes fail.
pub struct FlakyInventory {
    inner: InMemoryInventory,
    failures: usize,
    attempts: AtomicUsize,
}

impl FlakyInventory {
    pub fn new(records: Vec<SourceOfTruthRecord>, failures: usize) -> Self {
        Self {
            inner: InMemoryInventory::new(records),
            failures,
            attempts: AtomicUsize::new(0),
        }
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn get(&self, entity_kind: &EntityKind, identifier: &str) -> Option<SourceOfTruthRecord> {
        self.inner.get(entity_kind, identifier)
    }

    fn gate(&self) -> Result<(), InventoryError> {
        if self.attempts.fetch_add(1, Ordering::SeqCst) < self.failures {
            return Err(InventoryError::Unavailable("503 service unavailable".to_string()));
        }
        Ok(())
    }
}

impl Inventory for FlakyInventory {
    fn list_records(
        &self,
        entity_kind: &EntityKind,
        device_scope: &[String],
    ) -> Result<Vec<SourceOfTruthRecord>, InventoryError> {
        self.inner.list_records(entity_kind, device_scope)
    }

    fn apply_correction(
        &self,
        entity_kind: &EntityKind,
        key: &NaturalKey,
        field_name: &str,
        new_value: &Value,
    ) -> Result<(), InventoryError> {
        self.gate()?;
        self.inner.apply_correction(entity_kind, key, field_name, new_value)
    }

    fn create_record(&self, record: &SourceOfTruthRecord) -> Result<(), InventoryError> {
        self.gate()?;
        self.inner.create_record(record)
    }
}

/// Inventory that cannot be reached at all.
#[derive(Debug, Default)]
pub struct UnavailableInventory;

impl Inventory for UnavailableInventory {
    fn list_records(&self, _: &EntityKind, _: &[String]) -> Result<Vec<SourceOfTruthRecord>, InventoryError> {
        Err(InventoryError::Unavailable("inventory API timed out".to_string()))
    }

    fn apply_correction(&self, _: &EntityKind, _: &NaturalKey, _: &str, _: &Value) -> Result<(), InventoryError> {
        Err(InventoryError::Unavailable("inventory API timed out".to_string()))
    }

    fn create_record(&self, _: &SourceOfTruthRecord) -> Result<(), InventoryError> {
        Err(InventoryError::Unavailable("inventory API timed out".to_string()))
    }
}
