//! netrec-audit
//!
//! Append-only JSONL audit log of reconciliation runs and outcomes, with an
//! optional SHA-256 hash chain (`hash_prev` / `hash_self`) so after-the-fact
//! edits are detectable.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use netrec_schemas::canonical::{canonical_string, sha256_hex};
use netrec_schemas::Clock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

pub const TOPIC_RUN: &str = "run";
pub const TOPIC_RECONCILE: &str = "reconcile";

/// UUIDv5 namespace for audit event ids.
const EVENT_NAMESPACE: Uuid = Uuid::from_u128(0x6e65_7472_6563_4155_4449_5445_5645_0001);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub event_id: Uuid,
    pub seq: u64,
    pub run_id: String,
    pub ts_utc: DateTime<Utc>,
    pub topic: String,
    pub event_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_hash: Option<String>,
    pub payload: Value,
    pub hash_prev: Option<String>,
    pub hash_self: Option<String>,
}

/// Append-only writer. One event per line, keys sorted.
pub struct AuditWriter {
    path: PathBuf,
    hash_chain: bool,
    clock: Arc<dyn Clock>,
    config_hash: Option<String>,
    last_hash: Option<String>,
    seq: u64,
}

impl AuditWriter {
    /// Open (or create) the log at `path`. An existing log is resumed: the
    /// chain continues from its last event.
    pub fn open(path: impl AsRef<Path>, hash_chain: bool, clock: Arc<dyn Clock>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| format!("create audit dir {}", parent.display()))?;
        }

        let mut writer = Self {
            path,
            hash_chain,
            clock,
            config_hash: None,
            last_hash: None,
            seq: 0,
        };
        if writer.path.exists() {
            writer.resume()?;
        }
        Ok(writer)
    }

    /// Stamp every subsequent event with the run's config hash.
    pub fn with_config_hash(mut self, config_hash: impl Into<String>) -> Self {
        self.config_hash = Some(config_hash.into());
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn last_hash(&self) -> Option<&str> {
        self.last_hash.as_deref()
    }

    /// Number of events in the log, including ones written before `open`.
    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn append(
        &mut self,
        run_id: &str,
        topic: &str,
        event_type: &str,
        payload: Value,
    ) -> Result<AuditEvent> {
        let now_ms = self.clock.now_ms();
        let ts_utc = DateTime::<Utc>::from_timestamp_millis(now_ms)
            .with_context(|| format!("clock value {now_ms}ms is out of range"))?;

        let mut ev = AuditEvent {
            event_id: derive_event_id(self.last_hash.as_deref(), self.seq, &payload)?,
            seq: self.seq,
            run_id: run_id.to_string(),
            ts_utc,
            topic: topic.to_string(),
            event_type: event_type.to_string(),
            config_hash: self.config_hash.clone(),
            payload,
            hash_prev: self.hash_chain.then(|| self.last_hash.clone()).flatten(),
            hash_self: None,
        };
        if self.hash_chain {
            ev.hash_self = Some(compute_event_hash(&ev)?);
        }

        let mut line = canonical_string(&ev).context("serialize audit event")?;
        line.push('\n');
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .and_then(|mut f| f.write_all(line.as_bytes()))
            .with_context(|| format!("append to audit log {}", self.path.display()))?;

        self.seq += 1;
        self.last_hash = ev.hash_self.clone();
        Ok(ev)
    }

    fn resume(&mut self) -> Result<()> {
        let events = read_events(&self.path)?;
        self.seq = events.len() as u64;
        self.last_hash = events.into_iter().last().and_then(|e| e.hash_self);
        Ok(())
    }
}

/// Deterministic id from chain position and content. Same log prefix and
/// payload always yield the same id.
fn derive_event_id(prev_hash: Option<&str>, seq: u64, payload: &Value) -> Result<Uuid> {
    let canonical = canonical_string(payload).context("serialize audit payload")?;
    let name = format!("{}|{seq}|{canonical}", prev_hash.unwrap_or("genesis"));
    Ok(Uuid::new_v5(&EVENT_NAMESPACE, name.as_bytes()))
}

/// Hash of the canonical event with `hash_self` cleared.
pub fn compute_event_hash(ev: &AuditEvent) -> Result<String> {
    let unsealed = AuditEvent {
        hash_self: None,
        ..ev.clone()
    };
    let canonical = canonical_string(&unsealed).context("serialize audit event")?;
    Ok(sha256_hex(canonical.as_bytes()))
}

/// Non-blank lines with their 1-based line numbers.
fn event_lines(content: &str) -> impl Iterator<Item = (usize, &str)> {
    content
        .lines()
        .enumerate()
        .map(|(i, l)| (i + 1, l.trim()))
        .filter(|(_, l)| !l.is_empty())
}

fn read_log(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("read audit log {}", path.display()))
}

/// All events in the log, in order.
pub fn read_events(path: impl AsRef<Path>) -> Result<Vec<AuditEvent>> {
    let content = read_log(path.as_ref())?;
    event_lines(&content)
        .map(|(n, l)| serde_json::from_str(l).with_context(|| format!("parse audit event at line {n}")))
        .collect()
}

// ---------------------------------------------------------------------------
// Verification
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyResult {
    Valid { lines: usize },
    /// First line (1-based) where the chain does not hold.
    Broken { line: usize, reason: String },
}

impl VerifyResult {
    pub fn is_valid(&self) -> bool {
        matches!(self, VerifyResult::Valid { .. })
    }
}

pub fn verify_hash_chain(path: impl AsRef<Path>) -> Result<VerifyResult> {
    verify_hash_chain_str(&read_log(path.as_ref())?)
}

pub fn verify_hash_chain_str(content: &str) -> Result<VerifyResult> {
    let mut expected_prev: Option<String> = None;
    let mut lines = 0usize;

    for (line, raw) in event_lines(content) {
        let ev: AuditEvent = match serde_json::from_str(raw) {
            Ok(ev) => ev,
            Err(e) => {
                let reason = format!("unparseable event: {e}");
                return Ok(VerifyResult::Broken { line, reason });
            }
        };
        if let Some(reason) = broken_link(&ev, expected_prev.as_deref())? {
            return Ok(VerifyResult::Broken { line, reason });
        }
        expected_prev = ev.hash_self;
        lines += 1;
    }
    Ok(VerifyResult::Valid { lines })
}

/// Why `ev` does not extend a chain whose last seal is `expected_prev`.
fn broken_link(ev: &AuditEvent, expected_prev: Option<&str>) -> Result<Option<String>> {
    if ev.hash_prev.as_deref() != expected_prev {
        return Ok(Some(format!(
            "hash_prev mismatch: expected {expected_prev:?}, got {:?}",
            ev.hash_prev
        )));
    }
    let Some(claimed) = ev.hash_self.as_deref() else {
        return Ok(None);
    };
    let recomputed = compute_event_hash(ev)?;
    Ok((claimed != recomputed)
        .then(|| format!("hash_self mismatch: claimed {claimed}, recomputed {recomputed}")))
}
