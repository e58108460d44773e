use netrec_schemas::EntityKind;

use crate::PartitionKey;

/// Errors from the snapshot store and telemetry read path.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The telemetry backend could not be read. Callers isolate this per
    /// device; it never aborts other devices' work.
    #[error("telemetry source unavailable for {entity_kind} on {hostname}: {message}")]
    Unavailable {
        entity_kind: EntityKind,
        hostname: String,
        message: String,
    },

    /// Append refused: timestamp is older than the partition's watermark.
    #[error("non-monotonic observation for {partition}: watermark={watermark} got={got}")]
    NonMonotonic {
        partition: PartitionKey,
        watermark: i64,
        got: i64,
    },

    /// Append refused: observations must carry a positive timestamp.
    #[error("observation for {partition} has no timestamp")]
    MissingTimestamp { partition: PartitionKey },

    #[error("malformed observation at line {line}: {message}")]
    Parse { line: usize, message: String },

    #[error("observation not encodable: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("snapshot io error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    pub fn unavailable(
        entity_kind: &EntityKind,
        hostname: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        StoreError::Unavailable {
            entity_kind: entity_kind.clone(),
            hostname: hostname.into(),
            message: message.into(),
        }
    }

    /// `true` for read-path failures (as opposed to rejected appends).
    pub fn is_unavailable(&self) -> bool {
        matches!(self, StoreError::Unavailable { .. } | StoreError::Io(_))
    }
}
