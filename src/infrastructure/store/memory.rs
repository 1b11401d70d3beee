use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use uuid::Uuid;

use crate::domain::{
    catalog::{default_approver_types, default_levels},
    models::{
        Actor, ApprovalWorkflow, ApproverType, LeaveRequest, Role, WorkflowCategory,
        WorkflowLevel,
    },
};

use super::{ApprovalStore, StoreError, StoreResult};

/// Process-local store. Version checks on leave requests happen under the
/// write lock, which serialises competing decisions on the same request.
#[derive(Default)]
pub struct MemoryApprovalStore {
    requests: RwLock<HashMap<Uuid, LeaveRequest>>,
    actors: RwLock<HashMap<Uuid, Actor>>,
    workflows: RwLock<HashMap<Uuid, ApprovalWorkflow>>,
    approver_types: RwLock<HashMap<Uuid, ApproverType>>,
    categories: RwLock<HashMap<Uuid, WorkflowCategory>>,
    levels: RwLock<HashMap<Uuid, WorkflowLevel>>,
}

impl MemoryApprovalStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-seeded with the default approver types and level catalog.
    pub fn with_defaults() -> Self {
        let store = Self::default();
        {
            let mut types = store.approver_types.write();
            for approver_type in default_approver_types(Utc::now()) {
                types.insert(approver_type.id, approver_type);
            }
        }
        {
            let mut levels = store.levels.write();
            for level in default_levels() {
                levels.insert(level.id, level);
            }
        }
        store
    }
}

fn insert_new<T: Clone>(map: &RwLock<HashMap<Uuid, T>>, id: Uuid, value: &T) -> StoreResult<()> {
    let mut guard = map.write();
    if guard.contains_key(&id) {
        return Err(StoreError::Duplicate(id.to_string()));
    }
    guard.insert(id, value.clone());
    Ok(())
}

fn replace_existing<T: Clone>(
    map: &RwLock<HashMap<Uuid, T>>,
    id: Uuid,
    value: &T,
) -> StoreResult<()> {
    let mut guard = map.write();
    let Some(slot) = guard.get_mut(&id) else {
        return Err(StoreError::NotFound);
    };
    *slot = value.clone();
    Ok(())
}

#[async_trait]
impl ApprovalStore for MemoryApprovalStore {
    async fn get_leave_request(&self, id: Uuid) -> StoreResult<Option<LeaveRequest>> {
        Ok(self.requests.read().get(&id).cloned())
    }

    async fn insert_leave_request(&self, request: &LeaveRequest) -> StoreResult<()> {
        insert_new(&self.requests, request.id, request)
    }

    async fn update_leave_request(
        &self,
        request: &LeaveRequest,
        expected_version: i32,
    ) -> StoreResult<LeaveRequest> {
        let mut guard = self.requests.write();
        let Some(stored) = guard.get_mut(&request.id) else {
            return Err(StoreError::NotFound);
        };
        if stored.version != expected_version {
            return Err(StoreError::Conflict);
        }
        stored.status = request.status;
        stored.metadata = request.metadata.clone();
        stored.balance_restored_at = request.balance_restored_at;
        stored.updated_at = request.updated_at;
        stored.version = expected_version + 1;
        Ok(stored.clone())
    }

    async fn get_actor(&self, id: Uuid) -> StoreResult<Option<Actor>> {
        Ok(self.actors.read().get(&id).cloned())
    }

    async fn insert_actor(&self, actor: &Actor) -> StoreResult<()> {
        insert_new(&self.actors, actor.id, actor)
    }

    async fn find_available_approvers(
        &self,
        roles: &[Role],
        department: Option<&str>,
        exclude: Uuid,
    ) -> StoreResult<Vec<Actor>> {
        let actors = self.actors.read();
        Ok(actors
            .values()
            .filter(|actor| actor.is_active && actor.id != exclude)
            .filter(|actor| roles.contains(&actor.role))
            .filter(|actor| match department {
                Some(department) => actor
                    .department
                    .as_deref()
                    .is_some_and(|own| own.eq_ignore_ascii_case(department)),
                None => true,
            })
            .cloned()
            .collect())
    }

    async fn list_workflows(&self, active_only: bool) -> StoreResult<Vec<ApprovalWorkflow>> {
        let mut workflows: Vec<ApprovalWorkflow> = self
            .workflows
            .read()
            .values()
            .filter(|workflow| !active_only || workflow.is_active)
            .cloned()
            .collect();
        workflows.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        Ok(workflows)
    }

    async fn get_workflow(&self, id: Uuid) -> StoreResult<Option<ApprovalWorkflow>> {
        Ok(self.workflows.read().get(&id).cloned())
    }

    async fn insert_workflow(&self, workflow: &ApprovalWorkflow) -> StoreResult<()> {
        insert_new(&self.workflows, workflow.id, workflow)
    }

    async fn update_workflow(&self, workflow: &ApprovalWorkflow) -> StoreResult<()> {
        replace_existing(&self.workflows, workflow.id, workflow)
    }

    async fn list_approver_types(&self, active_only: bool) -> StoreResult<Vec<ApproverType>> {
        let mut types: Vec<ApproverType> = self
            .approver_types
            .read()
            .values()
            .filter(|approver_type| !active_only || approver_type.is_active)
            .cloned()
            .collect();
        types.sort_by(|a, b| a.code.cmp(&b.code));
        Ok(types)
    }

    async fn get_approver_type(&self, id: Uuid) -> StoreResult<Option<ApproverType>> {
        Ok(self.approver_types.read().get(&id).cloned())
    }

    async fn insert_approver_type(&self, approver_type: &ApproverType) -> StoreResult<()> {
        let mut guard = self.approver_types.write();
        if guard.values().any(|existing| existing.code == approver_type.code) {
            return Err(StoreError::Duplicate(approver_type.code.to_string()));
        }
        guard.insert(approver_type.id, approver_type.clone());
        Ok(())
    }

    async fn update_approver_type(&self, approver_type: &ApproverType) -> StoreResult<()> {
        replace_existing(&self.approver_types, approver_type.id, approver_type)
    }

    async fn delete_approver_type(&self, id: Uuid) -> StoreResult<()> {
        self.approver_types
            .write()
            .remove(&id)
            .map(|_| ())
            .ok_or(StoreError::NotFound)
    }

    async fn list_categories(&self) -> StoreResult<Vec<WorkflowCategory>> {
        let mut categories: Vec<WorkflowCategory> =
            self.categories.read().values().cloned().collect();
        categories.sort_by(|a, b| a.min_days.total_cmp(&b.min_days).then(a.id.cmp(&b.id)));
        Ok(categories)
    }

    async fn get_category(&self, id: Uuid) -> StoreResult<Option<WorkflowCategory>> {
        Ok(self.categories.read().get(&id).cloned())
    }

    async fn insert_category(&self, category: &WorkflowCategory) -> StoreResult<()> {
        insert_new(&self.categories, category.id, category)
    }

    async fn update_category(&self, category: &WorkflowCategory) -> StoreResult<()> {
        replace_existing(&self.categories, category.id, category)
    }

    async fn list_levels(&self) -> StoreResult<Vec<WorkflowLevel>> {
        let mut levels: Vec<WorkflowLevel> = self.levels.read().values().cloned().collect();
        levels.sort_by_key(|level| level.level);
        Ok(levels)
    }

    async fn insert_level(&self, level: &WorkflowLevel) -> StoreResult<()> {
        let mut guard = self.levels.write();
        if guard.values().any(|existing| existing.level == level.level) {
            return Err(StoreError::Duplicate(format!("level {}", level.level)));
        }
        guard.insert(level.id, level.clone());
        Ok(())
    }

    async fn update_level(&self, level: &WorkflowLevel) -> StoreResult<()> {
        replace_existing(&self.levels, level.id, level)
    }

    async fn replace_levels(&self, levels: &[WorkflowLevel]) -> StoreResult<()> {
        let mut guard = self.levels.write();
        guard.clear();
        for level in levels {
            guard.insert(level.id, level.clone());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{ApprovalMetadata, LeaveRequestStatus};
    use std::collections::BTreeSet;

    fn request() -> LeaveRequest {
        let now = Utc::now();
        LeaveRequest {
            id: Uuid::new_v4(),
            employee_id: Uuid::new_v4(),
            employee_name: "Requester".to_string(),
            author_role: Role::Employee,
            department: None,
            duration_days: 1.0,
            status: LeaveRequestStatus::Pending,
            metadata: ApprovalMetadata::default(),
            version: 1,
            balance_restored_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn stale_version_is_rejected() {
        let store = MemoryApprovalStore::new();
        let original = request();
        store.insert_leave_request(&original).await.unwrap();

        let mut first = original.clone();
        first.status = LeaveRequestStatus::PartiallyApproved;
        let saved = store.update_leave_request(&first, 1).await.unwrap();
        assert_eq!(saved.version, 2);

        let mut second = original.clone();
        second.status = LeaveRequestStatus::Rejected;
        let err = store.update_leave_request(&second, 1).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict));

        let stored = store.get_leave_request(original.id).await.unwrap().unwrap();
        assert_eq!(stored.status, LeaveRequestStatus::PartiallyApproved);
    }

    #[tokio::test]
    async fn available_approvers_respect_department_and_exclusion() {
        let store = MemoryApprovalStore::new();
        let lead = Actor {
            id: Uuid::new_v4(),
            name: "Lead".to_string(),
            role: Role::TeamLead,
            custom_permissions: BTreeSet::new(),
            department: Some("Operations".to_string()),
            is_active: true,
        };
        store.insert_actor(&lead).await.unwrap();

        let found = store
            .find_available_approvers(&[Role::TeamLead], Some("operations"), Uuid::new_v4())
            .await
            .unwrap();
        assert_eq!(found.len(), 1);

        let excluded = store
            .find_available_approvers(&[Role::TeamLead], None, lead.id)
            .await
            .unwrap();
        assert!(excluded.is_empty());

        let elsewhere = store
            .find_available_approvers(&[Role::TeamLead], Some("Finance"), Uuid::new_v4())
            .await
            .unwrap();
        assert!(elsewhere.is_empty());
    }

    #[tokio::test]
    async fn defaults_seed_types_and_levels() {
        let store = MemoryApprovalStore::with_defaults();
        assert_eq!(store.list_approver_types(true).await.unwrap().len(), 5);
        let levels = store.list_levels().await.unwrap();
        assert_eq!(levels.first().map(|level| level.level), Some(1));
    }
}
