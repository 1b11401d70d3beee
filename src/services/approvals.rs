//! Drives leave requests through their approval workflow.
//!
//! Backs the `/api/leave-requests/:id/*` routes. Every operation loads the
//! request, runs the pure transition from `domain::approval_flow`, consults the
//! configured `ApprovalAuthority` and writes the result back with an
//! optimistic version check, so a failed call never leaves a partial write.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use uuid::Uuid;
use validator::Validate;

use crate::{
    domain::{
        approval_flow::{self, Decision, Submission, TransitionError, TransitionOutcome},
        models::{
            Actor, ApprovalAction, ApprovalMetadata, ApprovalWorkflow, LeaveRequest,
            LeaveRequestStatus, Role, StepApprover,
        },
        permissions::{PermissionContext, PermissionMode},
        resolver::{resolve_workflow, NoWorkflowPolicy, Resolution},
    },
    infrastructure::{auth::AuthenticatedUser, state::AppState, store::StoreError},
};

use super::errors::ServiceError;

/// Body of `POST /api/leave-requests/:id/submit` when the request does not
/// exist yet. The requester's name, role and department come from the
/// employee record, never from the caller.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct NewLeaveRequest {
    pub employee_id: Option<Uuid>,
    #[validate(range(min = 0.5, message = "durationDays must be at least 0.5"))]
    pub duration_days: f64,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct DecisionRequest {
    pub action: ApprovalAction,
    /// Level the approver is acting on; omitted means the pending level.
    pub level: Option<u32>,
    #[validate(length(max = 2000))]
    pub comments: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct DeletionDecisionRequest {
    pub action: ApprovalAction,
    #[validate(length(max = 2000))]
    pub comments: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CanActResponse {
    pub allowed: bool,
    pub action: ApprovalAction,
    pub status: LeaveRequestStatus,
    pub pending_level: Option<u32>,
}

/// Routing chosen for a submission after resolution and re-validation.
enum Routing {
    Workflow(ApprovalWorkflow),
    AutoApprove,
    NotFound,
}

pub struct ApprovalService {
    pub state: Arc<AppState>,
}

impl ApprovalService {
    pub fn new(state: Arc<AppState>) -> Self {
        Self { state }
    }

    /// Visible to the requester and to anyone holding an approver role.
    pub async fn get(
        &self,
        user: &AuthenticatedUser,
        request_id: Uuid,
    ) -> Result<LeaveRequest, ServiceError> {
        let request = self.load_request(request_id).await?;
        if request.employee_id != user.employee_id
            && user.role.approval_rank() == 0
            && !user.is_administrator()
        {
            return Err(ServiceError::Forbidden);
        }
        Ok(request)
    }

    /// Resolves the workflow for the request's duration, freezes its steps
    /// into the request metadata and moves the request out of
    /// `not_submitted`.
    ///
    /// When the request is unknown and `new_request` is given, it is created
    /// first for the named employee (the caller by default). Only the
    /// requester or an administrator may submit.
    pub async fn submit_for_approval(
        &self,
        user: &AuthenticatedUser,
        request_id: Uuid,
        new_request: Option<NewLeaveRequest>,
    ) -> Result<LeaveRequest, ServiceError> {
        let request = match self.state.store.get_leave_request(request_id).await? {
            Some(request) => request,
            None => {
                let Some(new_request) = new_request else {
                    return Err(ServiceError::NotFound);
                };
                self.create_request(user, request_id, new_request).await?
            }
        };

        if request.employee_id != user.employee_id && !user.is_administrator() {
            return Err(ServiceError::Forbidden);
        }
        if request.status != LeaveRequestStatus::NotSubmitted {
            return Err(ServiceError::from(TransitionError::InvalidState {
                action: "submit",
                status: request.status,
            }));
        }

        let now = Utc::now();
        let outcome = match self.route(request.duration_days).await? {
            Routing::Workflow(workflow) => {
                approval_flow::submit(&request, Submission::Workflow(&workflow), now)?
            }
            Routing::AutoApprove => approval_flow::submit(&request, Submission::AutoApprove, now)?,
            Routing::NotFound => match self.state.config.no_workflow_policy() {
                NoWorkflowPolicy::AutoApprove => {
                    approval_flow::submit(&request, Submission::AutoApprove, now)?
                }
                NoWorkflowPolicy::Block => {
                    warn!(
                        request_id = %request.id,
                        duration_days = request.duration_days,
                        "no workflow covers duration; request blocked until an operator acts"
                    );
                    approval_flow::submit(&request, Submission::Blocked, now)?
                }
                NoWorkflowPolicy::Error => {
                    warn!(
                        request_id = %request.id,
                        duration_days = request.duration_days,
                        "no workflow covers duration; submission refused"
                    );
                    return Err(ServiceError::NotFound);
                }
            },
        };

        self.persist(&request, outcome, user.employee_id).await
    }

    /// Applies an approve or reject decision at the request's pending level.
    ///
    /// Order of checks: request state, attempted level, actor permission. The
    /// state checks come first so a replayed decision reports
    /// `OutOfOrderApproval` instead of `Forbidden`. When no level is sent and
    /// the caller may not act, their own earlier approval supplies it.
    pub async fn decide(
        &self,
        user: &AuthenticatedUser,
        request_id: Uuid,
        payload: DecisionRequest,
    ) -> Result<LeaveRequest, ServiceError> {
        payload.validate()?;
        let request = self.load_request(request_id).await?;
        let actor = self.load_active_actor(user.employee_id).await?;

        let allowed = request.status.awaiting_decision()
            && self.evaluate(&actor, &request, payload.action).await?;
        // A level-less repeat of the caller's own approval targets the level
        // they already passed.
        let attempted_level = match payload.level {
            Some(level) => Some(level),
            None if !allowed => approval_flow::approved_level_by(&request, actor.id),
            None => None,
        };

        approval_flow::ensure_awaiting_decision(&request, attempted_level)
            .and_then(|_| approval_flow::ensure_expected_level(&request, attempted_level))
            .map_err(|err| {
                warn!(
                    request_id = %request.id,
                    actor_id = %actor.id,
                    attempted_level = ?attempted_level,
                    status = %request.status,
                    error = %err,
                    "decision refused by request state"
                );
                ServiceError::from(err)
            })?;

        if !allowed {
            warn!(
                request_id = %request.id,
                actor_id = %actor.id,
                role = %actor.role,
                action = payload.action.as_str(),
                pending_level = ?request.metadata.next_required_level(),
                "approval permission denied"
            );
            return Err(ServiceError::Forbidden);
        }

        let decision = Decision {
            approver: &actor,
            level: payload.level,
            comments: payload.comments,
            at: Utc::now(),
        };
        let outcome = match payload.action {
            ApprovalAction::Approve => approval_flow::approve(&request, decision)?,
            ApprovalAction::Reject => approval_flow::reject(&request, decision)?,
        };

        self.persist(&request, outcome, actor.id).await
    }

    /// Withdraws a request still awaiting approval. Requester only.
    pub async fn cancel(
        &self,
        user: &AuthenticatedUser,
        request_id: Uuid,
    ) -> Result<LeaveRequest, ServiceError> {
        let request = self.load_request(request_id).await?;
        if request.employee_id != user.employee_id {
            return Err(ServiceError::Forbidden);
        }
        let outcome = approval_flow::cancel(&request, Utc::now())?;
        self.persist(&request, outcome, user.employee_id).await
    }

    /// Asks for an approved request to be deleted. Requester only.
    pub async fn request_deletion(
        &self,
        user: &AuthenticatedUser,
        request_id: Uuid,
    ) -> Result<LeaveRequest, ServiceError> {
        let request = self.load_request(request_id).await?;
        if request.employee_id != user.employee_id {
            return Err(ServiceError::Forbidden);
        }
        let outcome = approval_flow::request_deletion(&request, Utc::now())?;
        self.persist(&request, outcome, user.employee_id).await
    }

    /// Approves or rejects a pending deletion. Approval restores the leave
    /// balance after the new state is stored; if the ledger call fails the
    /// stored state is rolled back to `pending_deletion`.
    pub async fn decide_deletion(
        &self,
        user: &AuthenticatedUser,
        request_id: Uuid,
        payload: DeletionDecisionRequest,
    ) -> Result<LeaveRequest, ServiceError> {
        payload.validate()?;
        let request = self.load_request(request_id).await?;
        let actor = self.load_active_actor(user.employee_id).await?;

        let now = Utc::now();
        let outcome = match payload.action {
            ApprovalAction::Approve => approval_flow::approve_deletion(&request, now)?,
            ApprovalAction::Reject => approval_flow::reject_deletion(&request, now)?,
        };

        if !self.state.authority.can_decide_deletion(&actor, &request) {
            warn!(
                request_id = %request.id,
                actor_id = %actor.id,
                role = %actor.role,
                action = payload.action.as_str(),
                "deletion permission denied"
            );
            return Err(ServiceError::Forbidden);
        }

        if let Some(comments) = payload.comments.as_deref() {
            info!(request_id = %request.id, actor_id = %actor.id, comments, "deletion decision comments");
        }

        let restore = payload.action == ApprovalAction::Approve;
        let saved = self.persist(&request, outcome, actor.id).await?;
        if !restore {
            return Ok(saved);
        }

        match self.state.balances.restore_leave_balance(saved.id).await {
            Ok(()) => Ok(saved),
            Err(err) => {
                warn!(request_id = %saved.id, error = ?err, "leave balance restoration failed; reverting deletion approval");
                let mut reverted = saved.clone();
                reverted.status = request.status;
                reverted.balance_restored_at = request.balance_restored_at;
                reverted.updated_at = Utc::now();
                match self
                    .state
                    .store
                    .update_leave_request(&reverted, saved.version)
                    .await
                {
                    Ok(_) => Err(ServiceError::Internal(format!(
                        "failed to restore leave balance: {err}"
                    ))),
                    Err(revert_err) => {
                        error!(
                            request_id = %saved.id,
                            error = ?err,
                            revert_error = %revert_err,
                            "deletion approval could not be reverted; request needs manual repair"
                        );
                        Err(ServiceError::Internal(format!(
                            "failed to restore leave balance: {err}; reverting the deletion approval also failed: {revert_err}"
                        )))
                    }
                }
            }
        }
    }

    /// Read-only preview of whether the caller may act on the request now.
    /// Pending deletions are answered with the deletion hierarchy.
    pub async fn can_act(
        &self,
        user: &AuthenticatedUser,
        request_id: Uuid,
        action: ApprovalAction,
    ) -> Result<CanActResponse, ServiceError> {
        let request = self.load_request(request_id).await?;
        let actor = self
            .state
            .store
            .get_actor(user.employee_id)
            .await?
            .filter(|actor| actor.is_active);

        let allowed = match actor {
            None => false,
            Some(actor) if request.status == LeaveRequestStatus::PendingDeletion => {
                self.state.authority.can_decide_deletion(&actor, &request)
            }
            Some(actor) if request.status.awaiting_decision() => {
                self.evaluate(&actor, &request, action).await?
            }
            Some(_) => false,
        };

        Ok(CanActResponse {
            allowed,
            action,
            status: request.status,
            pending_level: request.metadata.next_required_level(),
        })
    }

    async fn create_request(
        &self,
        user: &AuthenticatedUser,
        request_id: Uuid,
        new_request: NewLeaveRequest,
    ) -> Result<LeaveRequest, ServiceError> {
        new_request.validate()?;
        let employee_id = new_request.employee_id.unwrap_or(user.employee_id);
        if employee_id != user.employee_id && !user.is_administrator() {
            return Err(ServiceError::Forbidden);
        }
        let employee = self
            .state
            .store
            .get_actor(employee_id)
            .await?
            .ok_or_else(|| ServiceError::validation(format!("unknown employee {employee_id}")))?;

        let now = Utc::now();
        let request = LeaveRequest {
            id: request_id,
            employee_id,
            employee_name: employee.name,
            author_role: employee.role,
            department: employee.department,
            duration_days: new_request.duration_days,
            status: LeaveRequestStatus::NotSubmitted,
            metadata: ApprovalMetadata::default(),
            version: 1,
            balance_restored_at: None,
            created_at: now,
            updated_at: now,
        };
        self.state.store.insert_leave_request(&request).await?;
        info!(request_id = %request.id, employee_id = %employee_id, "leave request created");
        Ok(request)
    }

    /// Resolves against the cached snapshot, then re-reads the winner. A
    /// workflow deactivated or edited since the snapshot was taken forces one
    /// refresh of the cache and a second resolution.
    async fn route(&self, duration_days: f64) -> Result<Routing, ServiceError> {
        for attempt in 0..2 {
            let snapshot = self
                .state
                .workflow_cache
                .snapshot(self.state.store.as_ref())
                .await?;
            let candidate = match resolve_workflow(
                &snapshot.workflows,
                &snapshot.categories,
                duration_days,
            ) {
                Resolution::Workflow(workflow) => workflow.id,
                Resolution::AutoApprove { .. } => return Ok(Routing::AutoApprove),
                Resolution::NotFound => return Ok(Routing::NotFound),
            };

            match self.state.store.get_workflow(candidate).await? {
                Some(current) if current.is_active && current.contains(duration_days) => {
                    return Ok(Routing::Workflow(current));
                }
                _ => {
                    warn!(workflow_id = %candidate, attempt, "cached workflow is stale; refreshing");
                    self.state.workflow_cache.invalidate();
                }
            }
        }
        Err(ServiceError::Conflict)
    }

    async fn evaluate(
        &self,
        actor: &Actor,
        request: &LeaveRequest,
        action: ApprovalAction,
    ) -> Result<bool, ServiceError> {
        if actor.id == request.employee_id {
            return Ok(false);
        }
        let primary_available = match self.state.authority.mode() {
            PermissionMode::StepBound => self.primary_available(request).await?,
            PermissionMode::RoleRanking => true,
        };
        let ctx = PermissionContext {
            actor,
            request,
            action,
            primary_available,
        };
        Ok(self.state.authority.can_decide(&ctx))
    }

    /// Whether someone other than the requester can fill the pending step's
    /// primary slot. Steps without fallback roles skip the lookup.
    async fn primary_available(&self, request: &LeaveRequest) -> Result<bool, ServiceError> {
        let Some(step) = request
            .metadata
            .next_required_level()
            .and_then(|level| request.metadata.step(level))
        else {
            return Ok(true);
        };
        if step.fallback_roles.is_empty() {
            return Ok(true);
        }

        match &step.approver {
            StepApprover::SpecificUser { user_id } => {
                if *user_id == request.employee_id {
                    return Ok(false);
                }
                Ok(self
                    .state
                    .store
                    .get_actor(*user_id)
                    .await?
                    .is_some_and(|actor| actor.is_active))
            }
            StepApprover::ApproverType { .. } => {
                let department = if step.department_specific {
                    match request.department.as_deref() {
                        Some(department) => Some(department),
                        None => return Ok(false),
                    }
                } else {
                    None
                };
                let roles: Vec<Role> = step.primary_roles().into_iter().collect();
                let approvers = self
                    .state
                    .store
                    .find_available_approvers(&roles, department, request.employee_id)
                    .await?;
                Ok(!approvers.is_empty())
            }
        }
    }

    async fn load_request(&self, request_id: Uuid) -> Result<LeaveRequest, ServiceError> {
        self.state
            .store
            .get_leave_request(request_id)
            .await?
            .ok_or(ServiceError::NotFound)
    }

    async fn load_active_actor(&self, actor_id: Uuid) -> Result<Actor, ServiceError> {
        match self.state.store.get_actor(actor_id).await? {
            Some(actor) if actor.is_active => Ok(actor),
            _ => Err(ServiceError::Forbidden),
        }
    }

    async fn persist(
        &self,
        previous: &LeaveRequest,
        outcome: TransitionOutcome,
        actor_id: Uuid,
    ) -> Result<LeaveRequest, ServiceError> {
        let saved = self
            .state
            .store
            .update_leave_request(&outcome.request, previous.version)
            .await
            .map_err(|err| {
                if matches!(err, StoreError::Conflict) {
                    warn!(
                        request_id = %previous.id,
                        actor_id = %actor_id,
                        expected_version = previous.version,
                        "leave request changed concurrently"
                    );
                }
                ServiceError::from(err)
            })?;

        info!(
            request_id = %saved.id,
            actor_id = %actor_id,
            level = ?outcome.level,
            from = %outcome.from,
            to = %outcome.to,
            "leave request transitioned"
        );
        Ok(saved)
    }
}
