//! JSON Lines import/export: one observation per line.

use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use netrec_schemas::Observation;

use crate::{SnapshotStore, StoreError};

/// Parse observations from JSONL. Blank lines are skipped.
pub fn read_jsonl(reader: impl BufRead) -> Result<Vec<Observation>, StoreError> {
    let mut out = Vec::new();
    for (i, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let obs: Observation = serde_json::from_str(trimmed).map_err(|e| StoreError::Parse {
            line: i + 1,
            message: e.to_string(),
        })?;
        out.push(obs);
    }
    Ok(out)
}

/// Build a store from a JSONL telemetry dump.
///
/// Lines are appended in file order, so the dump must be monotonic per
/// partition (as any producer's output is).
pub fn load_jsonl(path: impl AsRef<Path>) -> Result<SnapshotStore, StoreError> {
    let file = File::open(path.as_ref())?;
    let observations = read_jsonl(BufReader::new(file))?;
    let store = SnapshotStore::new();
    store.append_all(observations)?;
    Ok(store)
}

/// Write every observation in the store to `path`, one per line.
pub fn write_jsonl(store: &SnapshotStore, path: impl AsRef<Path>) -> Result<usize, StoreError> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut w = BufWriter::new(File::create(path)?);
    let rows = store.all();
    for obs in &rows {
        let line = serde_json::to_string(obs).map_err(|e| std::io::Error::other(e.to_string()))?;
        w.write_all(line.as_bytes())?;
        w.write_all(b"\n")?;
    }
    w.flush()?;
    Ok(rows.len())
}
