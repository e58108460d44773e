//! Source-of-truth read/write interface.
//!
//! Every write is idempotent: writing a value that is already there is a
//! successful no-op, so a correction can be retried from the start.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError, RwLock};

use netrec_schemas::{EntityKind, NaturalKey, SourceOfTruthRecord};
use serde_json::Value;
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum InventoryError {
    #[error("inventory unavailable: {0}")]
    Unavailable(String),
    #[error("no {entity_kind} record {identifier} in inventory")]
    NotFound {
        entity_kind: EntityKind,
        identifier: String,
    },
    #[error("inventory io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("inventory file {path} is not a record array: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

pub trait Inventory: Send + Sync {
    /// Records of `entity_kind` whose hostname is in `device_scope`
    /// (empty scope = every hostname).
    fn list_records(
        &self,
        entity_kind: &EntityKind,
        device_scope: &[String],
    ) -> Result<Vec<SourceOfTruthRecord>, InventoryError>;

    /// Set one field of the record with natural key `key`. `Value::Null`
    /// removes the field.
    fn apply_correction(
        &self,
        entity_kind: &EntityKind,
        key: &NaturalKey,
        field_name: &str,
        new_value: &Value,
    ) -> Result<(), InventoryError>;

    /// Create `record`, or merge its attributes into the record with the
    /// same natural key.
    fn create_record(&self, record: &SourceOfTruthRecord) -> Result<(), InventoryError>;
}

// ---------------------------------------------------------------------------
// Shared record-set logic
// ---------------------------------------------------------------------------

fn in_scope(record: &SourceOfTruthRecord, entity_kind: &EntityKind, scope: &[String]) -> bool {
    &record.entity_kind == entity_kind && (scope.is_empty() || scope.contains(&record.hostname))
}

/// Returns whether anything changed.
fn set_field(
    records: &mut [SourceOfTruthRecord],
    entity_kind: &EntityKind,
    key: &NaturalKey,
    field_name: &str,
    new_value: &Value,
) -> Result<bool, InventoryError> {
    let record = records
        .iter_mut()
        .find(|r| &r.entity_kind == entity_kind && r.natural_key() == *key)
        .ok_or_else(|| InventoryError::NotFound {
            entity_kind: entity_kind.clone(),
            identifier: key.identifier(),
        })?;

    if new_value.is_null() {
        return Ok(record.attributes.remove(field_name).is_some());
    }
    if record.attributes.get(field_name) == Some(new_value) {
        return Ok(false);
    }
    record
        .attributes
        .insert(field_name.to_string(), new_value.clone());
    Ok(true)
}

fn upsert(records: &mut Vec<SourceOfTruthRecord>, record: &SourceOfTruthRecord) -> bool {
    let key = record.natural_key();
    match records
        .iter_mut()
        .find(|r| r.entity_kind == record.entity_kind && r.natural_key() == key)
    {
        Some(existing) => {
            let mut changed = false;
            for (k, v) in &record.attributes {
                if existing.attributes.get(k) != Some(v) {
                    existing.attributes.insert(k.clone(), v.clone());
                    changed = true;
                }
            }
            changed
        }
        None => {
            records.push(record.clone());
            true
        }
    }
}

// ---------------------------------------------------------------------------
// In-memory
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct InMemoryInventory {
    records: RwLock<Vec<SourceOfTruthRecord>>,
}

impl InMemoryInventory {
    pub fn new(records: Vec<SourceOfTruthRecord>) -> Self {
        Self {
            records: RwLock::new(records),
        }
    }

    pub fn snapshot(&self) -> Vec<SourceOfTruthRecord> {
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// First record whose display identifier matches. Lookup only; writes
    /// go by natural key.
    pub fn get(&self, entity_kind: &EntityKind, identifier: &str) -> Option<SourceOfTruthRecord> {
        self.snapshot()
            .into_iter()
            .find(|r| &r.entity_kind == entity_kind && r.identifier() == identifier)
    }
}

impl Inventory for InMemoryInventory {
    fn list_records(
        &self,
        entity_kind: &EntityKind,
        device_scope: &[String],
    ) -> Result<Vec<SourceOfTruthRecord>, InventoryError> {
        Ok(self
            .records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|r| in_scope(r, entity_kind, device_scope))
            .cloned()
            .collect())
    }

    fn apply_correction(
        &self,
        entity_kind: &EntityKind,
        key: &NaturalKey,
        field_name: &str,
        new_value: &Value,
    ) -> Result<(), InventoryError> {
        let mut records = self.records.write().unwrap_or_else(PoisonError::into_inner);
        set_field(&mut records, entity_kind, key, field_name, new_value).map(|_| ())
    }

    fn create_record(&self, record: &SourceOfTruthRecord) -> Result<(), InventoryError> {
        let mut records = self.records.write().unwrap_or_else(PoisonError::into_inner);
        upsert(&mut records, record);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// File-backed
// ---------------------------------------------------------------------------

/// A JSON array of records on disk. Read on every call so edits made by
/// another process are seen; rewritten atomically (temp file + rename) only
/// when a write changes something.
#[derive(Debug)]
pub struct FileInventory {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileInventory {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, InventoryError> {
        let inv = Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        };
        inv.load()?;
        Ok(inv)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<Vec<SourceOfTruthRecord>, InventoryError> {
        let bytes = fs::read(&self.path).map_err(|source| InventoryError::Io {
            path: self.path.clone(),
            source,
        })?;
        serde_json::from_slice(&bytes).map_err(|source| InventoryError::Parse {
            path: self.path.clone(),
            source,
        })
    }

    fn save(&self, records: &[SourceOfTruthRecord]) -> Result<(), InventoryError> {
        let io_err = |path: &Path| {
            let path = path.to_path_buf();
            move |source: io::Error| InventoryError::Io { path, source }
        };
        let body = serde_json::to_vec_pretty(records).map_err(|source| InventoryError::Parse {
            path: self.path.clone(),
            source,
        })?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, body).map_err(io_err(&tmp))?;
        fs::rename(&tmp, &self.path).map_err(io_err(&self.path))
    }

    fn mutate(
        &self,
        f: impl FnOnce(&mut Vec<SourceOfTruthRecord>) -> Result<bool, InventoryError>,
    ) -> Result<(), InventoryError> {
        let _held = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut records = self.load()?;
        if f(&mut records)? {
            self.save(&records)?;
            debug!(path = %self.path.display(), "inventory rewritten");
        }
        Ok(())
    }
}

impl Inventory for FileInventory {
    fn list_records(
        &self,
        entity_kind: &EntityKind,
        device_scope: &[String],
    ) -> Result<Vec<SourceOfTruthRecord>, InventoryError> {
        Ok(self
            .load()?
            .into_iter()
            .filter(|r| in_scope(r, entity_kind, device_scope))
            .collect())
    }

    fn apply_correction(
        &self,
        entity_kind: &EntityKind,
        key: &NaturalKey,
        field_name: &str,
        new_value: &Value,
    ) -> Result<(), InventoryError> {
        self.mutate(|records| set_field(records, entity_kind, key, field_name, new_value))
    }

    fn create_record(&self, record: &SourceOfTruthRecord) -> Result<(), InventoryError> {
        self.mutate(|records| Ok(upsert(records, record)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rec(host: &str, attrs: Value) -> SourceOfTruthRecord {
        SourceOfTruthRecord::new(EntityKind::Interface, host, serde_json::from_value(attrs).unwrap())
    }

    #[test]
    fn scope_filters_by_kind_and_host() {
        let inv = InMemoryInventory::new(vec![
            rec("R1", json!({"ifName": "Gi0/0"})),
            rec("R2", json!({"ifName": "Gi0/0"})),
        ]);
        assert_eq!(inv.list_records(&EntityKind::Interface, &[]).unwrap().len(), 2);
        assert_eq!(
            inv.list_records(&EntityKind::Interface, &["R2".to_string()])
                .unwrap()
                .len(),
            1
        );
        assert!(inv.list_records(&EntityKind::Vlan, &[]).unwrap().is_empty());
    }

    fn gi(if_name: &str) -> NaturalKey {
        NaturalKey::from_parts(["R1", if_name])
    }

    #[test]
    fn correction_is_idempotent_and_null_removes() {
        let inv = InMemoryInventory::new(vec![rec("R1", json!({"ifName": "Gi0/0", "mtu": 9000}))]);
        let k = EntityKind::Interface;
        inv.apply_correction(&k, &gi("Gi0/0"), "mtu", &json!(1500)).unwrap();
        inv.apply_correction(&k, &gi("Gi0/0"), "mtu", &json!(1500)).unwrap();
        assert_eq!(inv.get(&k, "R1.Gi0/0").unwrap().attributes["mtu"], json!(1500));

        inv.apply_correction(&k, &gi("Gi0/0"), "mtu", &Value::Null).unwrap();
        assert!(!inv.get(&k, "R1.Gi0/0").unwrap().attributes.contains_key("mtu"));

        let err = inv.apply_correction(&k, &gi("Gi9/9"), "mtu", &json!(1)).unwrap_err();
        assert!(matches!(err, InventoryError::NotFound { .. }));
    }

    #[test]
    fn correction_targets_key_parts_not_dotted_identifier() {
        // Both records display as R1.a.b.
        let inv = InMemoryInventory::new(vec![
            rec("R1", json!({"ifName": "a.b", "mtu": 9000})),
            rec("R1.a", json!({"ifName": "b", "mtu": 9000})),
        ]);
        let k = EntityKind::Interface;
        inv.apply_correction(&k, &NaturalKey::from_parts(["R1.a", "b"]), "mtu", &json!(1500))
            .unwrap();

        let records = inv.snapshot();
        assert_eq!(records[0].attributes["mtu"], json!(9000), "R1 / a.b untouched");
        assert_eq!(records[1].attributes["mtu"], json!(1500));
    }

    #[test]
    fn file_inventory_rewrites_atomically() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("inventory.json");
        fs::write(
            &path,
            serde_json::to_vec(&vec![rec("R1", json!({"ifName": "Gi0/0", "mtu": 9000}))]).unwrap(),
        )
        .unwrap();

        let inv = FileInventory::open(&path).unwrap();
        inv.apply_correction(&EntityKind::Interface, &gi("Gi0/0"), "mtu", &json!(1500))
            .unwrap();
        inv.create_record(&rec("R1", json!({"ifName": "Gi0/1", "mtu": 1500})))
            .unwrap();
        inv.create_record(&rec("R1", json!({"ifName": "Gi0/1", "mtu": 1500})))
            .unwrap();

        let reread = FileInventory::open(&path).unwrap().load().unwrap();
        assert_eq!(reread.len(), 2);
        assert_eq!(reread[0].attributes["mtu"], json!(1500));
        assert!(!dir.path().join("inventory.json.tmp").exists());
    }
}
