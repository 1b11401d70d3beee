use std::sync::Arc;

use chrono::Utc;
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;
use validator::Validate;

use crate::{
    domain::models::WorkflowCategory,
    infrastructure::{auth::AuthenticatedUser, state::AppState},
    validation::rules::{validate_category, validate_category_update},
};

use super::{ensure_admin, errors::ServiceError};

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CategoryInput {
    #[validate(length(min = 1, max = 120))]
    pub name: String,
    pub description: Option<String>,
    pub min_days: f64,
    pub max_days: f64,
    #[validate(range(max = 50))]
    pub max_steps: u32,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

pub struct CategoryService {
    pub state: Arc<AppState>,
}

impl CategoryService {
    pub fn new(state: Arc<AppState>) -> Self {
        Self { state }
    }

    pub async fn list(&self) -> Result<Vec<WorkflowCategory>, ServiceError> {
        Ok(self.state.store.list_categories().await?)
    }

    pub async fn create(
        &self,
        user: &AuthenticatedUser,
        input: CategoryInput,
    ) -> Result<WorkflowCategory, ServiceError> {
        ensure_admin(user)?;
        input.validate()?;
        let now = Utc::now();
        let category = WorkflowCategory {
            id: Uuid::new_v4(),
            name: input.name.trim().to_string(),
            description: input.description,
            min_days: input.min_days,
            max_days: input.max_days,
            max_steps: input.max_steps,
            is_active: input.is_active,
            created_at: now,
            updated_at: now,
        };
        validate_category(&category)
            .into_result()
            .map_err(ServiceError::Validation)?;
        self.state.store.insert_category(&category).await?;
        self.state.workflow_cache.invalidate();
        info!(category_id = %category.id, name = %category.name, "workflow category created");
        Ok(category)
    }

    /// Checked against every workflow attached to the category, so `maxSteps`
    /// cannot drop below an attached workflow's step count.
    pub async fn update(
        &self,
        user: &AuthenticatedUser,
        id: Uuid,
        input: CategoryInput,
    ) -> Result<WorkflowCategory, ServiceError> {
        ensure_admin(user)?;
        input.validate()?;
        let existing = self.get(id).await?;
        let category = WorkflowCategory {
            name: input.name.trim().to_string(),
            description: input.description,
            min_days: input.min_days,
            max_days: input.max_days,
            max_steps: input.max_steps,
            is_active: input.is_active,
            updated_at: Utc::now(),
            ..existing
        };
        let workflows = self.state.store.list_workflows(false).await?;
        validate_category_update(&category, &workflows)
            .into_result()
            .map_err(ServiceError::Validation)?;
        self.state.store.update_category(&category).await?;
        self.state.workflow_cache.invalidate();
        info!(category_id = %category.id, max_steps = category.max_steps, "workflow category updated");
        Ok(category)
    }

    pub async fn deactivate(
        &self,
        user: &AuthenticatedUser,
        id: Uuid,
    ) -> Result<WorkflowCategory, ServiceError> {
        ensure_admin(user)?;
        let mut category = self.get(id).await?;
        category.is_active = false;
        category.updated_at = Utc::now();
        self.state.store.update_category(&category).await?;
        self.state.workflow_cache.invalidate();
        info!(category_id = %category.id, "workflow category deactivated");
        Ok(category)
    }

    async fn get(&self, id: Uuid) -> Result<WorkflowCategory, ServiceError> {
        self.state
            .store
            .get_category(id)
            .await?
            .ok_or(ServiceError::NotFound)
    }
}
