use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};

use netrec_audit::{AuditWriter, TOPIC_RECONCILE, TOPIC_RUN};
use netrec_cache::ResultCache;
use netrec_compare::{AutoCorrectPolicy, Comparator, RuleTableComparator};
use netrec_config::NetrecConfig;
use netrec_reconcile::{
    ApprovalDecision, ApprovalQueue, Controller, ControllerSettings, FileApprovalQueue, Inventory,
    MemoryApprovalQueue, ReconcileMode, ReconcileOutcome, ReconciliationReport, ReportContext,
};
use netrec_resolve::Resolver;
use netrec_schemas::{Clock, EntityDiff};
use netrec_store::TelemetrySource;
use serde_json::json;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{info, warn};
use uuid::Uuid;

use crate::worker::{run_unit, Deps, UnitResult, WorkUnit};
use crate::{RunError, RunSettings};

/// Owns the collaborators of a reconciliation run.
///
/// Cheap to share behind an `Arc`; a single orchestrator can drive many runs
/// and answer approvals between them.
pub struct Orchestrator {
    deps: Deps,
    settings: RunSettings,
    audit: Option<Mutex<AuditWriter>>,
}

impl Orchestrator {
    /// Orchestrator with the built-in comparator, the default policy, an
    /// in-memory cache and no audit log.
    pub fn new(
        source: Arc<dyn TelemetrySource>,
        inventory: Arc<dyn Inventory>,
        controller: Arc<Controller>,
        clock: Arc<dyn Clock>,
        settings: RunSettings,
    ) -> Self {
        let cache = Arc::new(ResultCache::in_memory(clock.clone()));
        Self {
            deps: Deps {
                resolver: Resolver::new(source),
                inventory,
                comparator: Arc::new(RuleTableComparator::builtin()),
                policy: Arc::new(AutoCorrectPolicy::default()),
                cache,
                controller,
                clock,
            },
            settings,
            audit: None,
        }
    }

    /// Build every collaborator from a loaded config.
    pub fn from_config(
        cfg: &NetrecConfig,
        config_hash: Option<String>,
        source: Arc<dyn TelemetrySource>,
        inventory: Arc<dyn Inventory>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, RunError> {
        let approvals: Arc<dyn ApprovalQueue> = match cfg.reconcile.state_dir.as_deref() {
            Some(dir) => Arc::new(FileApprovalQueue::open(dir)?),
            None => Arc::new(MemoryApprovalQueue::new()),
        };
        let controller = Arc::new(Controller::new(
            inventory.clone(),
            approvals,
            clock.clone(),
            ControllerSettings::from(&cfg.reconcile),
        ));

        let audit = match cfg.audit.path.as_deref() {
            Some(path) => {
                let mut writer = AuditWriter::open(path, cfg.audit.hash_chain, clock.clone())?;
                if let Some(hash) = &config_hash {
                    writer = writer.with_config_hash(hash.clone());
                }
                Some(writer)
            }
            None => None,
        };

        let settings = RunSettings::from_config(cfg, config_hash);
        let mut orch = Self::new(source, inventory, controller, clock.clone(), settings)
            .with_comparator(Arc::new(RuleTableComparator::from_settings(&cfg.comparator)))
            .with_policy(AutoCorrectPolicy::from_settings(&cfg.policy))
            .with_cache(Arc::new(ResultCache::from_settings(&cfg.cache, clock)));
        orch.audit = audit.map(Mutex::new);
        Ok(orch)
    }

    pub fn with_comparator(mut self, comparator: Arc<dyn Comparator>) -> Self {
        self.deps.comparator = comparator;
        self
    }

    pub fn with_policy(mut self, policy: AutoCorrectPolicy) -> Self {
        self.deps.policy = Arc::new(policy);
        self
    }

    pub fn with_cache(mut self, cache: Arc<ResultCache>) -> Self {
        self.deps.cache = cache;
        self
    }

    /// Override the configured mode (e.g. a `--mode` flag).
    pub fn with_mode(mut self, mode: ReconcileMode) -> Self {
        self.settings = self.settings.with_mode(mode);
        self
    }

    pub fn with_audit(mut self, writer: AuditWriter) -> Self {
        self.audit = Some(Mutex::new(writer));
        self
    }

    pub fn settings(&self) -> &RunSettings {
        &self.settings
    }

    pub fn controller(&self) -> &Arc<Controller> {
        &self.deps.controller
    }

    pub fn cache(&self) -> &Arc<ResultCache> {
        &self.deps.cache
    }

    // -----------------------------------------------------------------------
    // Runs
    // -----------------------------------------------------------------------

    /// Execute one reconciliation run. `run_id` defaults to a fresh UUID.
    pub async fn run(&self, run_id: Option<String>) -> Result<ReconciliationReport, RunError> {
        let run_id = run_id.unwrap_or_else(|| Uuid::new_v4().to_string());
        let mode = self.settings.mode;

        for outcome in self.expire_pending()? {
            info!(run_id = %outcome.run_id, identifier = %outcome.identifier, "expired before run");
        }
        if !self.settings.cache_ttl.is_zero() {
            self.deps.cache.purge_expired(self.settings.cache_ttl);
        }

        let scope = self.device_scope().await?;
        info!(
            run_id = %run_id,
            mode = %mode,
            devices = scope.len(),
            kinds = self.settings.kinds.len(),
            "RUN_START"
        );
        self.audit_event(
            &run_id,
            TOPIC_RUN,
            "RUN_START",
            json!({
                "mode": mode,
                "deviceScope": scope,
                "kinds": self.settings.kinds,
                "configHash": self.settings.config_hash,
            }),
        )?;

        let results = self.fan_out(&run_id, &scope).await?;

        let mut diffs: Vec<EntityDiff> = Vec::new();
        let mut outcomes: Vec<ReconcileOutcome> = Vec::new();
        let mut unresolved = Vec::new();
        for r in results.into_values() {
            diffs.extend(r.diffs);
            outcomes.extend(r.outcomes);
            unresolved.extend(r.unresolved);
        }

        for o in &outcomes {
            self.audit_outcome(o)?;
        }

        let report = ReconciliationReport::build(
            ReportContext {
                run_id: run_id.clone(),
                mode,
                generated_at_ms: self.deps.clock.now_ms(),
                device_scope: scope,
            },
            &diffs,
            &outcomes,
            unresolved,
        );

        let mut actions: BTreeMap<&str, usize> = BTreeMap::new();
        for o in &report.outcomes {
            *actions.entry(o.action.as_str()).or_default() += 1;
        }
        self.audit_event(
            &run_id,
            TOPIC_RUN,
            "RUN_FINISH",
            json!({
                "totalEntities": report.total_entities,
                "matched": report.matched,
                "mismatched": report.mismatched,
                "unresolved": report.unresolved.len(),
                "outcomes": actions,
            }),
        )?;
        info!(
            run_id = %run_id,
            total = report.total_entities,
            mismatched = report.mismatched,
            unresolved = report.unresolved.len(),
            "RUN_FINISH"
        );
        Ok(report)
    }

    /// Answer a pending approval and audit the outcome.
    pub fn resolve_pending(
        &self,
        pending_id: Uuid,
        decision: ApprovalDecision,
    ) -> Result<ReconcileOutcome, RunError> {
        let outcome = self.deps.controller.resolve_pending(pending_id, decision)?;
        self.audit_outcome(&outcome)?;
        Ok(outcome)
    }

    /// Time out overdue approvals and audit each one.
    pub fn expire_pending(&self) -> Result<Vec<ReconcileOutcome>, RunError> {
        let expired = self.deps.controller.expire_pending()?;
        for o in &expired {
            self.audit_outcome(o)?;
        }
        Ok(expired)
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    async fn device_scope(&self) -> Result<Vec<String>, RunError> {
        if !self.settings.device_scope.is_empty() {
            let mut scope = self.settings.device_scope.clone();
            scope.sort();
            scope.dedup();
            return Ok(scope);
        }

        let resolver = self.deps.resolver.clone();
        let hosts = tokio::task::spawn_blocking(move || resolver.source().hostnames(None))
            .await
            .map_err(|e| RunError::Worker {
                entity_kind: "*".to_string(),
                hostname: "*".to_string(),
                message: e.to_string(),
            })?
            .map_err(RunError::Scope)?;
        let mut scope = hosts;
        scope.sort();
        scope.dedup();
        Ok(scope)
    }

    /// One worker per (kind, device). Results are keyed by unit index so the
    /// merged output does not depend on completion order.
    async fn fan_out(
        &self,
        run_id: &str,
        scope: &[String],
    ) -> Result<BTreeMap<usize, UnitResult>, RunError> {
        let permits = Arc::new(Semaphore::new(self.settings.permits()));
        let mut set: JoinSet<(usize, WorkUnit, Result<UnitResult, tokio::task::JoinError>)> =
            JoinSet::new();

        let units = self.settings.kinds.iter().flat_map(|kind| {
            scope.iter().map(move |host| WorkUnit {
                run_id: run_id.to_string(),
                mode: self.settings.mode,
                entity_kind: kind.clone(),
                hostname: host.clone(),
                namespace: self.settings.namespace.clone(),
                max_age_ms: self.settings.max_age_ms,
                cache_ttl: self.settings.cache_ttl,
            })
        });

        for (idx, unit) in units.enumerate() {
            let permit = permits.clone().acquire_owned().await.map_err(|e| RunError::Worker {
                entity_kind: unit.entity_kind.to_string(),
                hostname: unit.hostname.clone(),
                message: e.to_string(),
            })?;
            let deps = self.deps.clone();
            set.spawn(async move {
                let for_worker = unit.clone();
                let res =
                    tokio::task::spawn_blocking(move || run_unit(&deps, &for_worker)).await;
                drop(permit);
                (idx, unit, res)
            });
        }

        let mut results = BTreeMap::new();
        while let Some(joined) = set.join_next().await {
            let (idx, unit, res) = joined.map_err(|e| RunError::Worker {
                entity_kind: "*".to_string(),
                hostname: "*".to_string(),
                message: e.to_string(),
            })?;
            let result = res.map_err(|e| RunError::Worker {
                entity_kind: unit.entity_kind.to_string(),
                hostname: unit.hostname.clone(),
                message: e.to_string(),
            })?;
            results.insert(idx, result);
        }
        Ok(results)
    }

    fn audit_outcome(&self, outcome: &ReconcileOutcome) -> Result<(), RunError> {
        let payload = serde_json::to_value(outcome).map_err(anyhow::Error::from)?;
        self.audit_event(&outcome.run_id, TOPIC_RECONCILE, "OUTCOME", payload)
    }

    fn audit_event(
        &self,
        run_id: &str,
        topic: &str,
        event_type: &str,
        payload: serde_json::Value,
    ) -> Result<(), RunError> {
        let Some(audit) = &self.audit else {
            return Ok(());
        };
        let mut writer = audit.lock().unwrap_or_else(PoisonError::into_inner);
        if let Err(e) = writer.append(run_id, topic, event_type, payload) {
            warn!(run_id, topic, event_type, error = %e, "audit append failed");
            return Err(RunError::Audit(e));
        }
        Ok(())
    }
}
