use std::sync::Arc;

use chrono::Utc;
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;
use validator::Validate;

use crate::{
    domain::models::{ApproverType, ApproverTypeCode},
    infrastructure::{auth::AuthenticatedUser, state::AppState},
    validation::rules::validate_approver_type,
};

use super::{ensure_admin, errors::ServiceError};

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ApproverTypeInput {
    #[validate(length(min = 1, max = 120))]
    pub name: String,
    #[validate(length(min = 1, max = 64))]
    pub code: String,
    pub description: Option<String>,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

pub struct ApproverTypeService {
    pub state: Arc<AppState>,
}

impl ApproverTypeService {
    pub fn new(state: Arc<AppState>) -> Self {
        Self { state }
    }

    pub async fn list(&self, include_inactive: bool) -> Result<Vec<ApproverType>, ServiceError> {
        Ok(self.state.store.list_approver_types(!include_inactive).await?)
    }

    pub async fn create(
        &self,
        user: &AuthenticatedUser,
        input: ApproverTypeInput,
    ) -> Result<ApproverType, ServiceError> {
        ensure_admin(user)?;
        input.validate()?;
        let now = Utc::now();
        let approver_type = ApproverType {
            id: Uuid::new_v4(),
            name: input.name.trim().to_string(),
            code: parse_code(&input.code)?,
            description: input.description,
            is_active: input.is_active,
            created_at: now,
            updated_at: now,
        };
        self.check(&approver_type).await?;
        self.state.store.insert_approver_type(&approver_type).await?;
        info!(approver_type_id = %approver_type.id, code = %approver_type.code, "approver type created");
        Ok(approver_type)
    }

    /// Renaming a code that workflow steps still reference is refused.
    pub async fn update(
        &self,
        user: &AuthenticatedUser,
        id: Uuid,
        input: ApproverTypeInput,
    ) -> Result<ApproverType, ServiceError> {
        ensure_admin(user)?;
        input.validate()?;
        let existing = self.get(id).await?;
        let code = parse_code(&input.code)?;
        if code != existing.code && self.is_referenced(&existing.code).await? {
            return Err(ServiceError::validation(format!(
                "approver type `{}` is used by workflow steps; its code cannot change",
                existing.code
            )));
        }
        let approver_type = ApproverType {
            name: input.name.trim().to_string(),
            code,
            description: input.description,
            is_active: input.is_active,
            updated_at: Utc::now(),
            ..existing
        };
        self.check(&approver_type).await?;
        self.state.store.update_approver_type(&approver_type).await?;
        info!(approver_type_id = %approver_type.id, "approver type updated");
        Ok(approver_type)
    }

    pub async fn deactivate(
        &self,
        user: &AuthenticatedUser,
        id: Uuid,
    ) -> Result<ApproverType, ServiceError> {
        ensure_admin(user)?;
        let mut approver_type = self.get(id).await?;
        approver_type.is_active = false;
        approver_type.updated_at = Utc::now();
        self.state.store.update_approver_type(&approver_type).await?;
        info!(approver_type_id = %approver_type.id, "approver type deactivated");
        Ok(approver_type)
    }

    /// Hard delete, only for types no workflow step references. Referenced
    /// types have to be deactivated instead.
    pub async fn delete(&self, user: &AuthenticatedUser, id: Uuid) -> Result<(), ServiceError> {
        ensure_admin(user)?;
        let approver_type = self.get(id).await?;
        if self.is_referenced(&approver_type.code).await? {
            return Err(ServiceError::validation(format!(
                "approver type `{}` is used by workflow steps; deactivate it instead",
                approver_type.code
            )));
        }
        self.state.store.delete_approver_type(id).await?;
        info!(approver_type_id = %id, code = %approver_type.code, "approver type deleted");
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<ApproverType, ServiceError> {
        self.state
            .store
            .get_approver_type(id)
            .await?
            .ok_or(ServiceError::NotFound)
    }

    async fn is_referenced(&self, code: &ApproverTypeCode) -> Result<bool, ServiceError> {
        let workflows = self.state.store.list_workflows(false).await?;
        Ok(workflows
            .iter()
            .any(|workflow| workflow.references_approver_type(code)))
    }

    async fn check(&self, approver_type: &ApproverType) -> Result<(), ServiceError> {
        let existing = self.state.store.list_approver_types(false).await?;
        validate_approver_type(approver_type, &existing)
            .into_result()
            .map_err(ServiceError::Validation)
    }
}

fn parse_code(raw: &str) -> Result<ApproverTypeCode, ServiceError> {
    ApproverTypeCode::parse(raw).map_err(|err| ServiceError::validation(err.to_string()))
}
