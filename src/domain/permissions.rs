//! Decides whether an actor may approve or reject a leave request right now.
//!
//! Two strategies share the `ApprovalAuthority` seam:
//!
//! * [`StepBoundAuthority`] checks the actor against the frozen step the
//!   request is waiting on (approver type, listed roles, specific user,
//!   fallback roles, department scope).
//! * [`RoleRankingAuthority`] keeps the flat role ranking (team lead 1 through
//!   super admin 5) for deployments that have not modelled their steps yet.
//!
//! Both honour the administrator bypass and the escalation shortcuts that keep
//! approvers from signing off at their own level.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::domain::models::{
    Actor, ApprovalAction, ApprovalStep, LeaveRequest, LeaveRequestStatus, Role, StepApprover,
};

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PermissionMode {
    #[default]
    StepBound,
    RoleRanking,
}

/// Inputs for a single permission check.
#[derive(Debug, Clone, Copy)]
pub struct PermissionContext<'a> {
    pub actor: &'a Actor,
    pub request: &'a LeaveRequest,
    pub action: ApprovalAction,
    /// Whether anyone other than the requester can fill the pending step's
    /// primary approver slot. Fallback roles only count when this is false.
    pub primary_available: bool,
}

pub trait ApprovalAuthority: Send + Sync {
    fn mode(&self) -> PermissionMode;

    fn can_decide(&self, ctx: &PermissionContext<'_>) -> bool;

    /// Deletion requests are gated by the approver hierarchy alone, never by
    /// the workflow steps.
    fn can_decide_deletion(&self, actor: &Actor, request: &LeaveRequest) -> bool {
        if actor.id == request.employee_id || !actor.is_active {
            return false;
        }
        let level = actor_approval_level(actor);
        if level == 0 {
            return false;
        }
        if actor.is_administrator() || escalation_shortcut(request.author_role, actor.role) {
            return true;
        }
        level > request.author_role.approval_rank()
    }
}

pub fn authority_for(mode: PermissionMode) -> Arc<dyn ApprovalAuthority> {
    match mode {
        PermissionMode::StepBound => Arc::new(StepBoundAuthority),
        PermissionMode::RoleRanking => Arc::new(RoleRankingAuthority),
    }
}

/// Rank of the actor in the flat hierarchy; the `admin` custom permission
/// lifts anyone below admin to admin rank.
pub fn actor_approval_level(actor: &Actor) -> u8 {
    let rank = actor.role.approval_rank();
    if actor.has_admin_permission() {
        rank.max(Role::Admin.approval_rank())
    } else {
        rank
    }
}

/// Lets the next role up approve a request authored by an approver, skipping
/// the author's own level.
pub fn escalation_shortcut(author: Role, actor: Role) -> bool {
    matches!(
        (author, actor),
        (Role::TeamLead, Role::Manager)
            | (Role::Manager, Role::Hr)
            | (Role::Hr, Role::Admin)
            | (Role::Hr, Role::SuperAdmin)
    )
}

fn in_first_pending_step(request: &LeaveRequest) -> bool {
    request.status == LeaveRequestStatus::Pending && request.metadata.current_approval_level == 0
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RoleRankingAuthority;

impl ApprovalAuthority for RoleRankingAuthority {
    fn mode(&self) -> PermissionMode {
        PermissionMode::RoleRanking
    }

    fn can_decide(&self, ctx: &PermissionContext<'_>) -> bool {
        let actor = ctx.actor;
        let request = ctx.request;
        let level = actor_approval_level(actor);
        if level == 0 {
            return false;
        }
        if actor.is_administrator() {
            return true;
        }
        if in_first_pending_step(request) && escalation_shortcut(request.author_role, actor.role)
        {
            return true;
        }
        match request.status {
            LeaveRequestStatus::Pending => level == 1,
            LeaveRequestStatus::PartiallyApproved => {
                u32::from(level) == request.metadata.current_approval_level + 1
            }
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct StepBoundAuthority;

impl StepBoundAuthority {
    fn matches_step(ctx: &PermissionContext<'_>, step: &ApprovalStep) -> bool {
        let actor = ctx.actor;
        let fallback = !ctx.primary_available && step.fallback_roles.contains(&actor.role);

        match &step.approver {
            StepApprover::SpecificUser { user_id } => *user_id == actor.id || fallback,
            StepApprover::ApproverType { .. } => {
                if step.department_specific && !same_department(actor, ctx.request) {
                    return false;
                }
                step.primary_roles().contains(&actor.role) || fallback
            }
        }
    }
}

impl ApprovalAuthority for StepBoundAuthority {
    fn mode(&self) -> PermissionMode {
        PermissionMode::StepBound
    }

    fn can_decide(&self, ctx: &PermissionContext<'_>) -> bool {
        let actor = ctx.actor;
        let request = ctx.request;
        if !actor.is_active || actor.id == request.employee_id {
            return false;
        }
        if !request.status.awaiting_decision() {
            return false;
        }
        if actor.is_administrator() {
            return true;
        }
        if in_first_pending_step(request) && escalation_shortcut(request.author_role, actor.role)
        {
            return true;
        }

        let Some(level) = request.metadata.next_required_level() else {
            return false;
        };
        request
            .metadata
            .step(level)
            .is_some_and(|step| Self::matches_step(ctx, step))
    }
}

fn same_department(actor: &Actor, request: &LeaveRequest) -> bool {
    match (&actor.department, &request.department) {
        (Some(actor_department), Some(request_department)) => {
            actor_department.eq_ignore_ascii_case(request_department)
        }
        _ => false,
    }
}
