use std::sync::Arc;

use anyhow::{anyhow, Context};

use crate::{
    domain::permissions::{authority_for, ApprovalAuthority},
    infrastructure::{
        auth::{AuthenticatedUser, JwtKeys},
        balance::LeaveBalanceClient,
        cache::WorkflowCache,
        config::Config,
        store::ApprovalStore,
    },
};

pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<dyn ApprovalStore>,
    pub balances: Arc<dyn LeaveBalanceClient>,
    pub authority: Arc<dyn ApprovalAuthority>,
    pub workflow_cache: WorkflowCache,
    pub jwt_keys: JwtKeys,
}

impl AppState {
    pub fn new(
        config: Arc<Config>,
        store: Arc<dyn ApprovalStore>,
        balances: Arc<dyn LeaveBalanceClient>,
    ) -> Self {
        let jwt_keys = JwtKeys::new(&config.auth.jwt_secret);
        let authority = authority_for(config.approvals.permission_mode);
        let workflow_cache = WorkflowCache::new(config.workflow_cache_ttl());
        Self {
            config,
            store,
            balances,
            authority,
            workflow_cache,
            jwt_keys,
        }
    }

    /// Identity every request runs as when `auth.bypass_auth` is on.
    pub async fn resolve_bypass_user(&self) -> anyhow::Result<Option<AuthenticatedUser>> {
        if !self.config.auth.bypass_auth {
            return Ok(None);
        }
        let employee_id = self
            .config
            .auth
            .bypass_employee_id
            .ok_or_else(|| anyhow!("auth.bypass_employee_id must be set when bypass_auth is on"))?;
        let actor = self
            .store
            .get_actor(employee_id)
            .await
            .context("failed to load bypass employee")?
            .ok_or_else(|| anyhow!("bypass employee {employee_id} does not exist"))?;
        Ok(Some(AuthenticatedUser::from_actor(&actor)))
    }
}
