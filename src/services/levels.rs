use std::{collections::BTreeSet, sync::Arc};

use serde::Deserialize;
use tracing::info;
use uuid::Uuid;
use validator::Validate;

use crate::{
    domain::{
        catalog::{default_levels, steps_from_catalog},
        models::{ApprovalStep, ApproverTypeCode, Role, WorkflowLevel},
    },
    infrastructure::{auth::AuthenticatedUser, state::AppState},
    validation::rules::validate_level_entry,
};

use super::{ensure_admin, errors::ServiceError};

/// Largest step count `defaults` will produce.
const MAX_DEFAULT_STEPS: usize = 20;

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct LevelInput {
    #[validate(range(min = 1))]
    pub level: u32,
    #[validate(length(min = 1, max = 120))]
    pub name: String,
    pub description: Option<String>,
    pub approver_type: String,
    #[serde(default)]
    pub fallback_roles: BTreeSet<Role>,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

pub struct LevelService {
    pub state: Arc<AppState>,
}

impl LevelService {
    pub fn new(state: Arc<AppState>) -> Self {
        Self { state }
    }

    pub async fn list(&self) -> Result<Vec<WorkflowLevel>, ServiceError> {
        Ok(self.state.store.list_levels().await?)
    }

    pub async fn create(
        &self,
        user: &AuthenticatedUser,
        input: LevelInput,
    ) -> Result<WorkflowLevel, ServiceError> {
        ensure_admin(user)?;
        input.validate()?;
        let entry = WorkflowLevel {
            id: Uuid::new_v4(),
            level: input.level,
            name: input.name.trim().to_string(),
            description: input.description,
            approver_type: self.known_code(&input.approver_type).await?,
            fallback_roles: input.fallback_roles,
            is_active: input.is_active,
        };
        self.check(&entry).await?;
        self.state.store.insert_level(&entry).await?;
        info!(level_id = %entry.id, level = entry.level, "catalog level created");
        Ok(entry)
    }

    pub async fn update(
        &self,
        user: &AuthenticatedUser,
        id: Uuid,
        input: LevelInput,
    ) -> Result<WorkflowLevel, ServiceError> {
        ensure_admin(user)?;
        input.validate()?;
        let levels = self.state.store.list_levels().await?;
        if !levels.iter().any(|entry| entry.id == id) {
            return Err(ServiceError::NotFound);
        }
        let entry = WorkflowLevel {
            id,
            level: input.level,
            name: input.name.trim().to_string(),
            description: input.description,
            approver_type: self.known_code(&input.approver_type).await?,
            fallback_roles: input.fallback_roles,
            is_active: input.is_active,
        };
        validate_level_entry(&entry, &levels)
            .into_result()
            .map_err(ServiceError::Validation)?;
        self.state.store.update_level(&entry).await?;
        info!(level_id = %entry.id, level = entry.level, "catalog level updated");
        Ok(entry)
    }

    /// Replaces the whole catalog with the built-in seed.
    pub async fn reset(&self, user: &AuthenticatedUser) -> Result<Vec<WorkflowLevel>, ServiceError> {
        ensure_admin(user)?;
        let levels = default_levels();
        self.state.store.replace_levels(&levels).await?;
        info!(count = levels.len(), "catalog levels reset to defaults");
        Ok(levels)
    }

    /// Default steps for authoring a workflow with `steps` levels.
    pub async fn defaults(&self, steps: usize) -> Result<Vec<ApprovalStep>, ServiceError> {
        if steps == 0 || steps > MAX_DEFAULT_STEPS {
            return Err(ServiceError::validation(format!(
                "steps must be between 1 and {MAX_DEFAULT_STEPS}"
            )));
        }
        let levels = self.state.store.list_levels().await?;
        Ok(steps_from_catalog(&levels, steps))
    }

    async fn known_code(&self, raw: &str) -> Result<ApproverTypeCode, ServiceError> {
        let code =
            ApproverTypeCode::parse(raw).map_err(|err| ServiceError::validation(err.to_string()))?;
        let approver_types = self.state.store.list_approver_types(true).await?;
        if approver_types.iter().any(|known| known.code == code) {
            Ok(code)
        } else {
            Err(ServiceError::validation(format!(
                "unknown or inactive approver type `{code}`"
            )))
        }
    }

    async fn check(&self, entry: &WorkflowLevel) -> Result<(), ServiceError> {
        let levels = self.state.store.list_levels().await?;
        validate_level_entry(entry, &levels)
            .into_result()
            .map_err(ServiceError::Validation)
    }
}
