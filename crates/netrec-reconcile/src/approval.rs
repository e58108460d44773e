//! Arena of pending human decisions.
//!
//! A pending approval is durable state keyed by a deterministic id, not a
//! suspended call: any process that can reach the arena can resolve it.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use netrec_schemas::{EntityDiff, EntityKind};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// UUIDv5 namespace for pending approval ids.
const PENDING_NAMESPACE: Uuid = Uuid::from_u128(0x6e65_7472_6563_4150_5052_4f56_414c_0001);

/// Stable id for `(run_id, entity_kind, identifier)`: requesting approval
/// twice for the same diff in the same run lands on the same entry.
pub fn pending_id(run_id: &str, entity_kind: &EntityKind, identifier: &str) -> Uuid {
    let name = format!("{run_id}|{entity_kind}|{identifier}");
    Uuid::new_v5(&PENDING_NAMESPACE, name.as_bytes())
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingApproval {
    pub pending_id: Uuid,
    pub run_id: String,
    pub diff: EntityDiff,
    pub justification: String,
    pub requested_at_ms: i64,
    pub expires_at_ms: i64,
}

impl PendingApproval {
    pub fn is_expired(&self, now_ms: i64) -> bool {
        now_ms > self.expires_at_ms
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ApprovalError {
    #[error("approval store io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("approval record {path} is corrupt: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

pub trait ApprovalQueue: Send + Sync {
    /// Insert or replace by `pending_id`.
    fn put(&self, pending: &PendingApproval) -> Result<(), ApprovalError>;
    fn get(&self, pending_id: Uuid) -> Result<Option<PendingApproval>, ApprovalError>;
    /// Remove and return. `None` if it was never there or already taken.
    fn take(&self, pending_id: Uuid) -> Result<Option<PendingApproval>, ApprovalError>;
    /// Ordered by request time, then id.
    fn list(&self) -> Result<Vec<PendingApproval>, ApprovalError>;
}

fn sort_pending(v: &mut [PendingApproval]) {
    v.sort_by(|a, b| {
        (a.requested_at_ms, a.pending_id).cmp(&(b.requested_at_ms, b.pending_id))
    });
}

// ---------------------------------------------------------------------------
// Memory
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct MemoryApprovalQueue {
    entries: Mutex<BTreeMap<Uuid, PendingApproval>>,
}

impl MemoryApprovalQueue {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ApprovalQueue for MemoryApprovalQueue {
    fn put(&self, pending: &PendingApproval) -> Result<(), ApprovalError> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(pending.pending_id, pending.clone());
        Ok(())
    }

    fn get(&self, pending_id: Uuid) -> Result<Option<PendingApproval>, ApprovalError> {
        Ok(self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&pending_id)
            .cloned())
    }

    fn take(&self, pending_id: Uuid) -> Result<Option<PendingApproval>, ApprovalError> {
        Ok(self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&pending_id))
    }

    fn list(&self) -> Result<Vec<PendingApproval>, ApprovalError> {
        let mut v: Vec<_> = self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        sort_pending(&mut v);
        Ok(v)
    }
}

// ---------------------------------------------------------------------------
// Filesystem
// ---------------------------------------------------------------------------

/// One JSON file per pending id under `{state_dir}/pending/`.
#[derive(Debug)]
pub struct FileApprovalQueue {
    dir: PathBuf,
    lock: Mutex<()>,
}

impl FileApprovalQueue {
    pub fn open(state_dir: impl AsRef<Path>) -> Result<Self, ApprovalError> {
        let dir = state_dir.as_ref().join("pending");
        fs::create_dir_all(&dir).map_err(io_err(&dir))?;
        Ok(Self {
            dir,
            lock: Mutex::new(()),
        })
    }

    fn path_for(&self, pending_id: Uuid) -> PathBuf {
        self.dir.join(format!("{pending_id}.json"))
    }

    fn read(path: &Path) -> Result<Option<PendingApproval>, ApprovalError> {
        match fs::read(path) {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map(Some)
                .map_err(|source| ApprovalError::Corrupt {
                    path: path.to_path_buf(),
                    source,
                }),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_err(path)(e)),
        }
    }
}

fn io_err(path: &Path) -> impl FnOnce(io::Error) -> ApprovalError {
    let path = path.to_path_buf();
    move |source| ApprovalError::Io { path, source }
}

impl ApprovalQueue for FileApprovalQueue {
    fn put(&self, pending: &PendingApproval) -> Result<(), ApprovalError> {
        let _held = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let path = self.path_for(pending.pending_id);
        let body = serde_json::to_vec_pretty(pending).map_err(|source| ApprovalError::Corrupt {
            path: path.clone(),
            source,
        })?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, body).map_err(io_err(&tmp))?;
        fs::rename(&tmp, &path).map_err(io_err(&path))
    }

    fn get(&self, pending_id: Uuid) -> Result<Option<PendingApproval>, ApprovalError> {
        Self::read(&self.path_for(pending_id))
    }

    fn take(&self, pending_id: Uuid) -> Result<Option<PendingApproval>, ApprovalError> {
        let _held = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let path = self.path_for(pending_id);
        let Some(pending) = Self::read(&path)? else {
            return Ok(None);
        };
        match fs::remove_file(&path) {
            Ok(()) => Ok(Some(pending)),
            // Another process took it between read and remove.
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_err(&path)(e)),
        }
    }

    fn list(&self) -> Result<Vec<PendingApproval>, ApprovalError> {
        let mut out = Vec::new();
        for entry in fs::read_dir(&self.dir).map_err(io_err(&self.dir))? {
            let path = entry.map_err(io_err(&self.dir))?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if let Some(p) = Self::read(&path)? {
                out.push(p);
            }
        }
        sort_pending(&mut out);
        Ok(out)
    }
}
