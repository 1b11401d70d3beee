//! Persistence boundary for the approval engine.
//!
//! Leave requests, actors and the workflow reference data live in an external
//! store; the engine only reaches them through [`ApprovalStore`].

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::{
    domain::models::{
        Actor, ApprovalWorkflow, ApproverType, LeaveRequest, Role, WorkflowCategory,
        WorkflowLevel,
    },
    infrastructure::{config::Config, db},
};

pub mod memory;
pub mod postgres;

pub use memory::MemoryApprovalStore;
pub use postgres::PgApprovalStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record not found")]
    NotFound,
    #[error("record was modified concurrently")]
    Conflict,
    #[error("duplicate record: {0}")]
    Duplicate(String),
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => StoreError::NotFound,
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                StoreError::Duplicate(db_err.message().to_string())
            }
            other => StoreError::Backend(other.into()),
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait ApprovalStore: Send + Sync {
    async fn get_leave_request(&self, id: Uuid) -> StoreResult<Option<LeaveRequest>>;

    async fn insert_leave_request(&self, request: &LeaveRequest) -> StoreResult<()>;

    /// Writes status, metadata and the restoration stamp of `request` only if
    /// the stored version still equals `expected_version`, returning the
    /// stored row with its version bumped. A stale version yields
    /// `StoreError::Conflict`.
    async fn update_leave_request(
        &self,
        request: &LeaveRequest,
        expected_version: i32,
    ) -> StoreResult<LeaveRequest>;

    async fn get_actor(&self, id: Uuid) -> StoreResult<Option<Actor>>;

    async fn insert_actor(&self, actor: &Actor) -> StoreResult<()>;

    /// Active actors holding one of `roles`, optionally limited to a
    /// department, excluding `exclude`.
    async fn find_available_approvers(
        &self,
        roles: &[Role],
        department: Option<&str>,
        exclude: Uuid,
    ) -> StoreResult<Vec<Actor>>;

    async fn list_workflows(&self, active_only: bool) -> StoreResult<Vec<ApprovalWorkflow>>;

    async fn get_workflow(&self, id: Uuid) -> StoreResult<Option<ApprovalWorkflow>>;

    async fn insert_workflow(&self, workflow: &ApprovalWorkflow) -> StoreResult<()>;

    async fn update_workflow(&self, workflow: &ApprovalWorkflow) -> StoreResult<()>;

    async fn list_approver_types(&self, active_only: bool) -> StoreResult<Vec<ApproverType>>;

    async fn get_approver_type(&self, id: Uuid) -> StoreResult<Option<ApproverType>>;

    async fn insert_approver_type(&self, approver_type: &ApproverType) -> StoreResult<()>;

    async fn update_approver_type(&self, approver_type: &ApproverType) -> StoreResult<()>;

    async fn delete_approver_type(&self, id: Uuid) -> StoreResult<()>;

    async fn list_categories(&self) -> StoreResult<Vec<WorkflowCategory>>;

    async fn get_category(&self, id: Uuid) -> StoreResult<Option<WorkflowCategory>>;

    async fn insert_category(&self, category: &WorkflowCategory) -> StoreResult<()>;

    async fn update_category(&self, category: &WorkflowCategory) -> StoreResult<()>;

    async fn list_levels(&self) -> StoreResult<Vec<WorkflowLevel>>;

    async fn insert_level(&self, level: &WorkflowLevel) -> StoreResult<()>;

    async fn update_level(&self, level: &WorkflowLevel) -> StoreResult<()>;

    /// Replaces the whole level catalog in one step.
    async fn replace_levels(&self, levels: &[WorkflowLevel]) -> StoreResult<()>;
}

pub async fn build_store(config: &Config) -> anyhow::Result<Arc<dyn ApprovalStore>> {
    match config.store.provider.as_str() {
        "postgres" => {
            let pool = db::connect(&config.database).await?;
            db::run_migrations(&pool).await?;
            Ok(Arc::new(PgApprovalStore::new(pool)))
        }
        "memory" => Ok(Arc::new(MemoryApprovalStore::with_defaults())),
        other => anyhow::bail!("unsupported store provider: {other}"),
    }
}
