//! Authoring and resolution of approval workflows.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;
use validator::Validate;

use crate::{
    domain::{
        models::{ApprovalStep, ApprovalWorkflow},
        resolver::{resolve_workflow, Resolution},
    },
    infrastructure::{auth::AuthenticatedUser, state::AppState},
    validation::rules::validate_workflow,
};

use super::{ensure_admin, errors::ServiceError};

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowInput {
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    pub description: Option<String>,
    pub category_id: Option<Uuid>,
    pub min_days: f64,
    pub max_days: f64,
    #[validate(length(min = 1, message = "at least one approval step is required"))]
    pub approval_levels: Vec<ApprovalStep>,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

/// Answer of `GET /api/workflows/resolve`.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ResolvedWorkflow {
    Workflow {
        workflow: ApprovalWorkflow,
    },
    AutoApprove {
        #[serde(rename = "categoryId")]
        category_id: Uuid,
    },
}

pub struct WorkflowService {
    pub state: Arc<AppState>,
}

impl WorkflowService {
    pub fn new(state: Arc<AppState>) -> Self {
        Self { state }
    }

    /// Workflow governing a leave of `duration_days`, read from the cached
    /// snapshot.
    pub async fn resolve(&self, duration_days: f64) -> Result<ResolvedWorkflow, ServiceError> {
        if !duration_days.is_finite() || duration_days <= 0.0 {
            return Err(ServiceError::validation(
                "durationDays must be a positive number",
            ));
        }
        let snapshot = self
            .state
            .workflow_cache
            .snapshot(self.state.store.as_ref())
            .await?;
        match resolve_workflow(&snapshot.workflows, &snapshot.categories, duration_days) {
            Resolution::Workflow(workflow) => Ok(ResolvedWorkflow::Workflow {
                workflow: workflow.clone(),
            }),
            Resolution::AutoApprove { category_id } => {
                Ok(ResolvedWorkflow::AutoApprove { category_id })
            }
            Resolution::NotFound => Err(ServiceError::NotFound),
        }
    }

    pub async fn list(&self, include_inactive: bool) -> Result<Vec<ApprovalWorkflow>, ServiceError> {
        Ok(self.state.store.list_workflows(!include_inactive).await?)
    }

    pub async fn get(&self, id: Uuid) -> Result<ApprovalWorkflow, ServiceError> {
        self.state
            .store
            .get_workflow(id)
            .await?
            .ok_or(ServiceError::NotFound)
    }

    pub async fn create(
        &self,
        user: &AuthenticatedUser,
        input: WorkflowInput,
    ) -> Result<ApprovalWorkflow, ServiceError> {
        ensure_admin(user)?;
        input.validate()?;
        let now = Utc::now();
        let workflow = ApprovalWorkflow {
            id: Uuid::new_v4(),
            name: input.name.trim().to_string(),
            description: input.description,
            category_id: input.category_id,
            min_days: input.min_days,
            max_days: input.max_days,
            approval_levels: input.approval_levels,
            is_active: input.is_active,
            created_at: now,
            updated_at: now,
        };
        self.check(&workflow).await?;
        self.state.store.insert_workflow(&workflow).await?;
        self.state.workflow_cache.invalidate();
        info!(workflow_id = %workflow.id, name = %workflow.name, "workflow created");
        Ok(workflow)
    }

    pub async fn update(
        &self,
        user: &AuthenticatedUser,
        id: Uuid,
        input: WorkflowInput,
    ) -> Result<ApprovalWorkflow, ServiceError> {
        ensure_admin(user)?;
        input.validate()?;
        let existing = self.get(id).await?;
        let workflow = ApprovalWorkflow {
            name: input.name.trim().to_string(),
            description: input.description,
            category_id: input.category_id,
            min_days: input.min_days,
            max_days: input.max_days,
            approval_levels: input.approval_levels,
            is_active: input.is_active,
            updated_at: Utc::now(),
            ..existing
        };
        self.check(&workflow).await?;
        self.state.store.update_workflow(&workflow).await?;
        self.state.workflow_cache.invalidate();
        info!(workflow_id = %workflow.id, "workflow updated");
        Ok(workflow)
    }

    /// In-flight requests keep their frozen steps; only new submissions stop
    /// resolving to the workflow.
    pub async fn deactivate(
        &self,
        user: &AuthenticatedUser,
        id: Uuid,
    ) -> Result<ApprovalWorkflow, ServiceError> {
        ensure_admin(user)?;
        let mut workflow = self.get(id).await?;
        workflow.is_active = false;
        workflow.updated_at = Utc::now();
        self.state.store.update_workflow(&workflow).await?;
        self.state.workflow_cache.invalidate();
        info!(workflow_id = %workflow.id, "workflow deactivated");
        Ok(workflow)
    }

    async fn check(&self, workflow: &ApprovalWorkflow) -> Result<(), ServiceError> {
        let category = match workflow.category_id {
            Some(category_id) => self.state.store.get_category(category_id).await?,
            None => None,
        };
        let approver_types = self.state.store.list_approver_types(false).await?;
        validate_workflow(workflow, category.as_ref(), &approver_types)
            .into_result()
            .map_err(ServiceError::Validation)
    }
}
