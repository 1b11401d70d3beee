//! Read-mostly snapshot of the workflow reference data used by resolution.

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use parking_lot::RwLock;

use crate::{
    domain::models::{ApprovalWorkflow, WorkflowCategory},
    infrastructure::store::{ApprovalStore, StoreResult},
};

#[derive(Debug)]
pub struct WorkflowSnapshot {
    pub workflows: Vec<ApprovalWorkflow>,
    pub categories: Vec<WorkflowCategory>,
    loaded_at: Instant,
}

pub struct WorkflowCache {
    ttl: Duration,
    current: RwLock<Option<Arc<WorkflowSnapshot>>>,
}

impl WorkflowCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            current: RwLock::new(None),
        }
    }

    /// Active workflows and all categories, reloaded from `store` once the
    /// cached copy is older than the TTL. A zero TTL always reloads.
    pub async fn snapshot(&self, store: &dyn ApprovalStore) -> StoreResult<Arc<WorkflowSnapshot>> {
        if let Some(snapshot) = self.fresh() {
            return Ok(snapshot);
        }

        let workflows = store.list_workflows(true).await?;
        let categories = store.list_categories().await?;
        let snapshot = Arc::new(WorkflowSnapshot {
            workflows,
            categories,
            loaded_at: Instant::now(),
        });
        *self.current.write() = Some(Arc::clone(&snapshot));
        Ok(snapshot)
    }

    pub fn invalidate(&self) {
        *self.current.write() = None;
    }

    fn fresh(&self) -> Option<Arc<WorkflowSnapshot>> {
        self.current
            .read()
            .as_ref()
            .filter(|snapshot| snapshot.loaded_at.elapsed() < self.ttl)
            .map(Arc::clone)
    }
}
