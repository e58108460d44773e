use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use netrec_audit::AuditWriter;
use netrec_reconcile::{
    Controller, ControllerSettings, InMemoryInventory, Inventory, MemoryApprovalQueue,
    ReconcileMode, ReconciliationReport,
};
use netrec_runtime::{Orchestrator, RunSettings};
use netrec_schemas::{EntityKind, ManualClock, Observation, SourceOfTruthRecord};
use netrec_store::{SnapshotStore, TelemetrySource};
use serde_json::Value;

use crate::FailingSource;

/// Clock value every harness starts at.
pub const START_MS: i64 = 1_700_000_000_000;

/// A fully wired run over in-memory collaborators and a manual clock.
pub struct Harness {
    pub store: Arc<SnapshotStore>,
    /// Backing records when no custom inventory was supplied.
    pub truth: Arc<InMemoryInventory>,
    pub clock: Arc<ManualClock>,
    pub orchestrator: Orchestrator,
}

impl Harness {
    pub fn builder() -> HarnessBuilder {
        HarnessBuilder::default()
    }

    pub async fn run(&self, run_id: &str) -> Result<ReconciliationReport> {
        self.orchestrator
            .run(Some(run_id.to_string()))
            .await
            .with_context(|| format!("run {run_id}"))
    }

    pub fn controller(&self) -> &Arc<Controller> {
        self.orchestrator.controller()
    }

    /// Current inventory value of one field, if the record and field exist.
    pub fn truth_field(&self, kind: &EntityKind, identifier: &str, field: &str) -> Option<Value> {
        self.truth
            .get(kind, identifier)
            .and_then(|r| r.attributes.get(field).cloned())
    }
}

pub struct HarnessBuilder {
    observations: Vec<Observation>,
    records: Vec<SourceOfTruthRecord>,
    failing_hosts: Vec<String>,
    inventory: Option<Arc<dyn Inventory>>,
    settings: RunSettings,
    controller: ControllerSettings,
    audit: Option<PathBuf>,
}

impl Default for HarnessBuilder {
    fn default() -> Self {
        Self {
            observations: Vec::new(),
            records: Vec::new(),
            failing_hosts: Vec::new(),
            inventory: None,
            settings: RunSettings::default().with_kinds([EntityKind::Interface]),
            controller: ControllerSettings::default(),
            audit: None,
        }
    }
}

impl HarnessBuilder {
    pub fn observe(mut self, obs: Observation) -> Self {
        self.observations.push(obs);
        self
    }

    pub fn declare(mut self, record: SourceOfTruthRecord) -> Self {
        self.records.push(record);
        self
    }

    pub fn failing_hosts<I, S>(mut self, hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.failing_hosts = hosts.into_iter().map(Into::into).collect();
        self
    }

    /// Replace the in-memory inventory the run reads and writes.
    pub fn inventory(mut self, inventory: Arc<dyn Inventory>) -> Self {
        self.inventory = Some(inventory);
        self
    }

    pub fn mode(mut self, mode: ReconcileMode) -> Self {
        self.settings = self.settings.with_mode(mode);
        self
    }

    pub fn kinds(mut self, kinds: impl IntoIterator<Item = EntityKind>) -> Self {
        self.settings = self.settings.with_kinds(kinds);
        self
    }

    pub fn settings(mut self, f: impl FnOnce(&mut RunSettings)) -> Self {
        f(&mut self.settings);
        self
    }

    pub fn retry_budget(mut self, retry_budget: u32) -> Self {
        self.controller.retry_budget = retry_budget;
        self
    }

    pub fn approval_timeout_ms(mut self, timeout_ms: i64) -> Self {
        self.controller.approval_timeout_ms = timeout_ms;
        self
    }

    pub fn audit(mut self, path: impl Into<PathBuf>) -> Self {
        self.audit = Some(path.into());
        self
    }

    pub fn build(self) -> Result<Harness> {
        let store = Arc::new(SnapshotStore::new());
        store
            .append_all(self.observations)
            .context("seed snapshot store")?;

        let source: Arc<dyn TelemetrySource> = if self.failing_hosts.is_empty() {
            store.clone()
        } else {
            Arc::new(FailingSource::new(store.clone(), self.failing_hosts))
        };

        let truth = Arc::new(InMemoryInventory::new(self.records));
        let inventory: Arc<dyn Inventory> = match self.inventory {
            Some(custom) => custom,
            None => truth.clone(),
        };

        let clock = Arc::new(ManualClock::new(START_MS));
        let controller = Arc::new(Controller::new(
            inventory.clone(),
            Arc::new(MemoryApprovalQueue::new()),
            clock.clone(),
            self.controller,
        ));

        let mut orchestrator =
            Orchestrator::new(source, inventory, controller, clock.clone(), self.settings);
        if let Some(path) = self.audit {
            let writer = AuditWriter::open(&path, true, clock.clone())?;
            orchestrator = orchestrator.with_audit(writer);
        }

        Ok(Harness {
            store,
            truth,
            clock,
            orchestrator,
        })
    }
}
