use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One stored result.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    pub created_at_ms: i64,
    pub payload: Value,
}

#[derive(Debug, thiserror::Error)]
pub enum CacheStorageError {
    #[error("cache io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("cache entry {key} is corrupt: {source}")]
    Corrupt {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Where cache entries live. Keys are `tool_results/...` strings.
pub trait CacheStorage: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<CacheEntry>, CacheStorageError>;
    fn put(&self, key: &str, entry: CacheEntry) -> Result<(), CacheStorageError>;
    fn remove(&self, key: &str) -> Result<(), CacheStorageError>;

    /// Drop every entry created before `cutoff_ms`. Returns how many went.
    fn purge_created_before(&self, cutoff_ms: i64) -> Result<usize, CacheStorageError>;
}

// ---------------------------------------------------------------------------
// Memory
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: RwLock<HashMap<String, CacheEntry>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl CacheStorage for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<CacheEntry>, CacheStorageError> {
        Ok(self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned())
    }

    fn put(&self, key: &str, entry: CacheEntry) -> Result<(), CacheStorageError> {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), entry);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), CacheStorageError> {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
        Ok(())
    }

    fn purge_created_before(&self, cutoff_ms: i64) -> Result<usize, CacheStorageError> {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let before = entries.len();
        entries.retain(|_, e| e.created_at_ms >= cutoff_ms);
        Ok(before - entries.len())
    }
}

// ---------------------------------------------------------------------------
// Filesystem
// ---------------------------------------------------------------------------

/// One JSON file per key: `{root}/{key}.json`. Writes go through a temp
/// file and a rename so readers never see a torn entry.
#[derive(Debug, Clone)]
pub struct FsStorage {
    root: PathBuf,
}

impl FsStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(format!("{key}.json"))
    }

    /// Every entry file under `dir`, recursively. A missing dir has none.
    fn entry_files(dir: &Path, out: &mut Vec<PathBuf>) -> Result<(), CacheStorageError> {
        let rd = match fs::read_dir(dir) {
            Ok(rd) => rd,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(io_err(dir)(e)),
        };
        for item in rd {
            let path = item.map_err(io_err(dir))?.path();
            if path.is_dir() {
                Self::entry_files(&path, out)?;
            } else if path.extension().is_some_and(|ext| ext == "json") {
                out.push(path);
            }
        }
        Ok(())
    }
}

fn io_err(path: &Path) -> impl FnOnce(io::Error) -> CacheStorageError + '_ {
    move |source| CacheStorageError::Io {
        path: path.to_path_buf(),
        source,
    }
}

impl CacheStorage for FsStorage {
    fn get(&self, key: &str) -> Result<Option<CacheEntry>, CacheStorageError> {
        let path = self.path_for(key);
        let bytes = match fs::read(&path) {
            Ok(b) => b,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(io_err(&path)(e)),
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|source| CacheStorageError::Corrupt {
                key: key.to_string(),
                source,
            })
    }

    fn put(&self, key: &str, entry: CacheEntry) -> Result<(), CacheStorageError> {
        let path = self.path_for(key);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(io_err(parent))?;
        }
        let bytes = serde_json::to_vec(&entry).map_err(|source| CacheStorageError::Corrupt {
            key: key.to_string(),
            source,
        })?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, bytes).map_err(io_err(&tmp))?;
        fs::rename(&tmp, &path).map_err(io_err(&path))
    }

    fn remove(&self, key: &str) -> Result<(), CacheStorageError> {
        let path = self.path_for(key);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_err(&path)(e)),
        }
    }

    /// Unreadable or corrupt files are left for `get` to report.
    fn purge_created_before(&self, cutoff_ms: i64) -> Result<usize, CacheStorageError> {
        let mut files = Vec::new();
        Self::entry_files(&self.root, &mut files)?;

        let mut purged = 0;
        for path in files {
            let Ok(bytes) = fs::read(&path) else {
                continue;
            };
            let Ok(entry) = serde_json::from_slice::<CacheEntry>(&bytes) else {
                continue;
            };
            if entry.created_at_ms < cutoff_ms {
                match fs::remove_file(&path) {
                    Ok(()) => purged += 1,
                    Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                    Err(e) => return Err(io_err(&path)(e)),
                }
            }
        }
        Ok(purged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn fs_roundtrip_and_layout() {
        let dir = tempfile::tempdir().unwrap();
        let fs_store = FsStorage::new(dir.path());
        let key = "tool_results/resolve_abc";

        assert!(fs_store.get(key).unwrap().is_none());
        fs_store
            .put(
                key,
                CacheEntry {
                    created_at_ms: 5,
                    payload: json!({"x": 1}),
                },
            )
            .unwrap();

        assert!(dir.path().join("tool_results/resolve_abc.json").exists());
        let got = fs_store.get(key).unwrap().unwrap();
        assert_eq!(got.created_at_ms, 5);
        assert_eq!(got.payload, json!({"x": 1}));

        fs_store.remove(key).unwrap();
        fs_store.remove(key).unwrap();
        assert!(fs_store.get(key).unwrap().is_none());
    }

    #[test]
    fn corrupt_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("tool_results")).unwrap();
        fs::write(dir.path().join("tool_results/t_x.json"), b"{not json").unwrap();
        let err = FsStorage::new(dir.path()).get("tool_results/t_x").unwrap_err();
        assert!(matches!(err, CacheStorageError::Corrupt { .. }));
    }

    fn entry(created_at_ms: i64) -> CacheEntry {
        CacheEntry {
            created_at_ms,
            payload: json!(created_at_ms),
        }
    }

    #[test]
    fn memory_purge_drops_old_entries_only() {
        let mem = MemoryStorage::new();
        mem.put("tool_results/a", entry(100)).unwrap();
        mem.put("tool_results/b", entry(200)).unwrap();
        assert_eq!(mem.purge_created_before(200).unwrap(), 1);
        assert_eq!(mem.len(), 1);
        assert!(mem.get("tool_results/b").unwrap().is_some());
    }

    #[test]
    fn fs_purge_walks_subdirs_and_skips_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let fs_store = FsStorage::new(dir.path());
        fs_store.put("tool_results/old", entry(100)).unwrap();
        fs_store.put("tool_results/new", entry(300)).unwrap();
        fs::write(dir.path().join("tool_results/bad.json"), b"{not json").unwrap();

        assert_eq!(fs_store.purge_created_before(200).unwrap(), 1);
        assert!(fs_store.get("tool_results/old").unwrap().is_none());
        assert!(fs_store.get("tool_results/new").unwrap().is_some());
        assert!(dir.path().join("tool_results/bad.json").exists());

        assert_eq!(FsStorage::new(dir.path().join("absent")).purge_created_before(i64::MAX).unwrap(), 0);
    }
}
