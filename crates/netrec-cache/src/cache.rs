use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use netrec_config::CacheSettings;
use netrec_schemas::{Clock, KeyedLocks};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use crate::key::cache_key;
use crate::storage::{CacheEntry, CacheStorage, FsStorage, MemoryStorage};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    /// Calls that bypassed storage (cache disabled, ttl 0, unkeyable params).
    pub bypassed: u64,
}

pub struct ResultCache {
    storage: Arc<dyn CacheStorage>,
    clock: Arc<dyn Clock>,
    enabled: bool,
    inflight: KeyedLocks,
    hits: AtomicU64,
    misses: AtomicU64,
    bypassed: AtomicU64,
}

impl ResultCache {
    pub fn new(storage: Arc<dyn CacheStorage>, clock: Arc<dyn Clock>) -> Self {
        Self {
            storage,
            clock,
            enabled: true,
            inflight: KeyedLocks::new(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            bypassed: AtomicU64::new(0),
        }
    }

    pub fn in_memory(clock: Arc<dyn Clock>) -> Self {
        Self::new(Arc::new(MemoryStorage::new()), clock)
    }

    /// Always computes; storage is never touched.
    pub fn disabled(clock: Arc<dyn Clock>) -> Self {
        let mut cache = Self::in_memory(clock);
        cache.enabled = false;
        cache
    }

    pub fn from_settings(settings: &CacheSettings, clock: Arc<dyn Clock>) -> Self {
        let storage: Arc<dyn CacheStorage> = match &settings.root {
            Some(root) => Arc::new(FsStorage::new(root)),
            None => Arc::new(MemoryStorage::new()),
        };
        let mut cache = Self::new(storage, clock);
        cache.enabled = settings.enabled;
        cache
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            bypassed: self.bypassed.load(Ordering::Relaxed),
        }
    }

    /// Return the cached result for `(tool, params)` or run `compute`.
    ///
    /// The boolean is `true` on a cache hit. An entry older than `ttl` is a
    /// miss and is overwritten. Errors from `compute` are returned as-is and
    /// never stored. Concurrent callers with the same key wait for the one
    /// in-flight compute and then read its result.
    pub fn get_or_compute<P, T, E, F>(
        &self,
        tool: &str,
        params: &P,
        ttl: Duration,
        compute: F,
    ) -> Result<(T, bool), E>
    where
        P: Serialize,
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Result<T, E>,
    {
        if !self.enabled || ttl.is_zero() {
            self.bypassed.fetch_add(1, Ordering::Relaxed);
            return compute().map(|v| (v, false));
        }

        let key = match cache_key(tool, params) {
            Ok(k) => k,
            Err(e) => {
                warn!(tool, error = %e, "cache key failed; computing uncached");
                self.bypassed.fetch_add(1, Ordering::Relaxed);
                return compute().map(|v| (v, false));
            }
        };
        let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);

        self.inflight.with_lock(&key, || {
            if let Some(value) = self.lookup::<T>(&key, ttl_ms) {
                self.hits.fetch_add(1, Ordering::Relaxed);
                debug!(tool, key = %key, "cache hit");
                return Ok((value, true));
            }

            self.misses.fetch_add(1, Ordering::Relaxed);
            debug!(tool, key = %key, "cache miss");
            let value = compute()?;
            self.store(&key, &value);
            Ok((value, false))
        })
    }

    /// Drop the entry for `(tool, params)`, if any.
    pub fn invalidate<P: Serialize>(&self, tool: &str, params: &P) {
        let Ok(key) = cache_key(tool, params) else {
            return;
        };
        if let Err(e) = self.storage.remove(&key) {
            warn!(key = %key, error = %e, "cache invalidate failed");
        }
    }

    /// Drop every entry older than `ttl`. Entries whose keys never recur
    /// (for instance after the telemetry store changed) only leave this way.
    pub fn purge_expired(&self, ttl: Duration) -> usize {
        if !self.enabled {
            return 0;
        }
        let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
        let cutoff_ms = self.clock.now_ms().saturating_sub(ttl_ms);
        match self.storage.purge_created_before(cutoff_ms) {
            Ok(purged) => {
                debug!(purged, cutoff_ms, "expired cache entries purged");
                purged
            }
            Err(e) => {
                warn!(error = %e, "cache purge failed");
                0
            }
        }
    }

    fn lookup<T: DeserializeOwned>(&self, key: &str, ttl_ms: i64) -> Option<T> {
        let entry = match self.storage.get(key) {
            Ok(Some(entry)) => entry,
            Ok(None) => return None,
            Err(e) => {
                warn!(key = %key, error = %e, "cache read failed; treating as miss");
                return None;
            }
        };

        let age_ms = self.clock.now_ms().saturating_sub(entry.created_at_ms);
        if age_ms > ttl_ms {
            debug!(key = %key, age_ms, ttl_ms, "cache entry expired");
            if let Err(e) = self.storage.remove(key) {
                warn!(key = %key, error = %e, "expired cache entry not removed");
            }
            return None;
        }

        match serde_json::from_value(entry.payload) {
            Ok(v) => Some(v),
            Err(e) => {
                warn!(key = %key, error = %e, "cached payload has a different shape; recomputing");
                None
            }
        }
    }

    fn store<T: Serialize>(&self, key: &str, value: &T) {
        let payload = match serde_json::to_value(value) {
            Ok(p) => p,
            Err(e) => {
                warn!(key = %key, error = %e, "result not serializable; not cached");
                return;
            }
        };
        let entry = CacheEntry {
            created_at_ms: self.clock.now_ms(),
            payload,
        };
        if let Err(e) = self.storage.put(key, entry) {
            warn!(key = %key, error = %e, "cache write failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use netrec_schemas::ManualClock;
    use serde_json::json;

    #[test]
    fn second_call_hits() {
        let cache = ResultCache::in_memory(Arc::new(ManualClock::new(1_000)));
        let ttl = Duration::from_secs(5);

        let (v, hit) = cache
            .get_or_compute("toolX", &json!({"a": 1}), ttl, || Ok::<_, String>(41))
            .unwrap();
        assert_eq!((v, hit), (41, false));

        let (v, hit) = cache
            .get_or_compute("toolX", &json!({"a": 1}), ttl, || Ok::<_, String>(99))
            .unwrap();
        assert_eq!((v, hit), (41, true));
        assert_eq!(
            cache.stats(),
            CacheStats {
                hits: 1,
                misses: 1,
                bypassed: 0
            }
        );
    }

    #[test]
    fn invalidate_forces_recompute() {
        let cache = ResultCache::in_memory(Arc::new(ManualClock::new(0)));
        let ttl = Duration::from_secs(60);
        let p = json!({"k": "v"});
        cache.get_or_compute("t", &p, ttl, || Ok::<_, ()>(1)).unwrap();
        cache.invalidate("t", &p);
        let (v, hit) = cache.get_or_compute("t", &p, ttl, || Ok::<_, ()>(2)).unwrap();
        assert_eq!((v, hit), (2, false));
    }

    #[test]
    fn expired_entries_are_evicted() {
        let clock = Arc::new(ManualClock::new(0));
        let storage = Arc::new(MemoryStorage::new());
        let cache = ResultCache::new(storage.clone(), clock.clone());
        let ttl = Duration::from_secs(10);

        cache.get_or_compute("t", &json!({"k": 1}), ttl, || Ok::<_, ()>(1)).unwrap();
        cache.get_or_compute("t", &json!({"k": 2}), ttl, || Ok::<_, ()>(2)).unwrap();
        assert_eq!(storage.len(), 2);

        clock.advance_ms(10_001);
        // The expired entry goes on lookup even when the recompute fails.
        let res = cache.get_or_compute("t", &json!({"k": 1}), ttl, || Err::<i32, _>("down"));
        assert_eq!(res, Err("down"));
        assert_eq!(storage.len(), 1);

        // Keys nobody asks for again go in a sweep.
        assert_eq!(cache.purge_expired(ttl), 1);
        assert!(storage.is_empty());
    }
}
