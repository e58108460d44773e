//! netrec-resolve
//!
//! Snapshot Resolver: collapses the snapshot store's time series into one
//! canonical "current state" record per natural key.
//!
//! Order of operations:
//! 1. Window: drop observations older than `max_age` (0 disables).
//! 2. Group by the kind's natural key.
//! 3. Liveness priority: if any observation for a key is active, only active
//!    observations compete; otherwise all of them do.
//! 4. Latest timestamp wins; on a tie the later-appended observation wins.
//!
//! Deterministic given store contents, `max_age` and `now`: output is sorted
//! by natural key and contains no wall-clock reads.

mod engine;

pub use engine::{resolve_observations, Resolution, ResolveError, ResolveStatus, Resolver, ScopeFilter};
