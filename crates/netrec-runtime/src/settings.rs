use std::time::Duration;

use netrec_config::NetrecConfig;
use netrec_reconcile::ReconcileMode;
use netrec_schemas::EntityKind;

/// Everything a run reads from configuration, flattened.
#[derive(Clone, Debug, PartialEq)]
pub struct RunSettings {
    pub mode: ReconcileMode,
    pub kinds: Vec<EntityKind>,
    /// Empty = every hostname present in the store.
    pub device_scope: Vec<String>,
    pub namespace: Option<String>,
    pub concurrency: usize,
    pub max_age_ms: i64,
    pub cache_ttl: Duration,
    pub config_hash: Option<String>,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self::from_config(&NetrecConfig::default(), None)
    }
}

impl RunSettings {
    pub fn from_config(cfg: &NetrecConfig, config_hash: Option<String>) -> Self {
        Self {
            mode: cfg.engine.mode.into(),
            kinds: cfg.engine.kinds.clone(),
            device_scope: cfg.engine.device_scope.clone(),
            namespace: cfg.engine.namespace.clone(),
            concurrency: cfg.engine.concurrency,
            max_age_ms: cfg.resolver.max_age_ms(),
            cache_ttl: if cfg.cache.enabled {
                cfg.cache.ttl()
            } else {
                Duration::ZERO
            },
            config_hash,
        }
    }

    pub fn with_mode(mut self, mode: ReconcileMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_kinds(mut self, kinds: impl IntoIterator<Item = EntityKind>) -> Self {
        self.kinds = kinds.into_iter().collect();
        self
    }

    pub fn with_device_scope<I, S>(mut self, hostnames: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.device_scope = hostnames.into_iter().map(Into::into).collect();
        self
    }

    /// Worker permits. Zero would deadlock the fan-out, so it counts as one.
    pub fn permits(&self) -> usize {
        self.concurrency.max(1)
    }
}
