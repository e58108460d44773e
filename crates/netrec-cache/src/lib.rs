//! netrec-cache
//!
//! Result Cache: memoizes expensive, deterministic tool calls (resolution,
//! comparison) under content-addressed keys with TTL expiry.
//!
//! The cache is an explicitly constructed object handed to whoever needs
//! it. There is no process-wide instance.
//!
//! Storage failures never fail a call: they are logged and the value is
//! computed as on a miss.

mod cache;
mod key;
mod storage;

pub use cache::{CacheStats, ResultCache};
pub use key::cache_key;
pub use storage::{CacheEntry, CacheStorage, CacheStorageError, FsStorage, MemoryStorage};
