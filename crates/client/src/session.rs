use std::sync::{Arc, RwLock};

use fdq_common::{EngineConfig, FdqError, MetricsRegistry, Result};
use fdq_execution::{SharedTaskContext, TaskContext};
use fdq_planner::ReportCatalog;
use fdq_storage::schema::{canonical_schema, CUSTOMERS, DELIVERY_PARTNERS, ORDERS, RESTAURANTS};
use fdq_storage::{MemTable, Snapshot};

pub type SharedSession = Arc<Session>;

#[derive(Debug)]
pub struct Session {
    pub config: EngineConfig,
    pub ctx: SharedTaskContext,
    pub reports: ReportCatalog,
    pub metrics: MetricsRegistry,
    /// Replaced wholesale on every registration; readers keep their `Arc`.
    snapshot: RwLock<Arc<Snapshot>>,
}

impl Session {
    pub fn new(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        let mut snapshot = Snapshot::new();
        for name in [ORDERS, CUSTOMERS, RESTAURANTS, DELIVERY_PARTNERS] {
            if let Some(schema) = canonical_schema(name) {
                snapshot.register(name, MemTable::empty(schema));
            }
        }
        Ok(Self {
            ctx: Arc::new(TaskContext::new(config.clone())),
            config,
            reports: ReportCatalog::builtin(),
            metrics: MetricsRegistry::new(),
            snapshot: RwLock::new(Arc::new(snapshot)),
        })
    }

    pub fn snapshot(&self) -> Result<Arc<Snapshot>> {
        self.snapshot
            .read()
            .map(|s| Arc::clone(&*s))
            .map_err(|_| FdqError::Execution("snapshot lock poisoned".to_string()))
    }

    /// Apply `f` to a copy of the current snapshot and publish the result.
    pub fn update_snapshot<T>(&self, f: impl FnOnce(&mut Snapshot) -> Result<T>) -> Result<T> {
        let mut guard = self
            .snapshot
            .write()
            .map_err(|_| FdqError::Execution("snapshot lock poisoned".to_string()))?;
        let mut next = guard.as_ref().clone();
        let out = f(&mut next)?;
        *guard = Arc::new(next);
        Ok(out)
    }
}
