//! netrec-store
//!
//! Snapshot Store: an append-only, partitioned collection of timestamped
//! observations, plus the telemetry read interface the resolver consumes.
//!
//! - Partitions are keyed by `(entity kind, namespace, hostname)`.
//! - Appends are checked against a per-partition timestamp watermark;
//!   producers are monotonic, so a regressing timestamp is refused.
//! - A missing partition is "no data yet", never an error.

mod error;
mod jsonl;
mod store;
mod watermark;

pub use error::StoreError;
pub use jsonl::{load_jsonl, read_jsonl, write_jsonl};
pub use store::{ObservationQuery, PartitionKey, SnapshotStore, TelemetrySource};
pub use watermark::{TimestampFreshness, TimestampWatermark};
