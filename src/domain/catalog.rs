//! Built-in reference data: the default approver types and the default
//! approval level catalog used when authoring workflows.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::models::{
    ApprovalStep, ApproverType, ApproverTypeCode, Role, StepApprover, WorkflowLevel,
};

pub fn default_approver_types(now: DateTime<Utc>) -> Vec<ApproverType> {
    [
        ("Team Lead", ApproverTypeCode::from(Role::TeamLead), "Direct team lead of the requester"),
        ("Manager", ApproverTypeCode::from(Role::Manager), "Line manager of the requester"),
        ("HR", ApproverTypeCode::from(Role::Hr), "Human resources"),
        (
            "Department Head",
            ApproverTypeCode::from(Role::DepartmentHead),
            "Head of the requester's department",
        ),
        (
            "Specific User",
            ApproverTypeCode::specific_user(),
            "A named individual chosen per workflow step",
        ),
    ]
    .into_iter()
    .map(|(name, code, description)| ApproverType {
        id: Uuid::new_v4(),
        name: name.to_string(),
        code,
        description: Some(description.to_string()),
        is_active: true,
        created_at: now,
        updated_at: now,
    })
    .collect()
}

/// Seed used by "reset to default" on the level catalog.
pub fn default_levels() -> Vec<WorkflowLevel> {
    [
        (1, "Team Lead Approval", Role::TeamLead, vec![Role::Manager]),
        (2, "Manager Approval", Role::Manager, vec![Role::DepartmentHead, Role::Hr]),
        (3, "HR Approval", Role::Hr, vec![Role::Admin]),
        (
            4,
            "Department Head Approval",
            Role::DepartmentHead,
            vec![Role::Admin, Role::SuperAdmin],
        ),
    ]
    .into_iter()
    .map(|(level, name, role, fallback)| WorkflowLevel {
        id: Uuid::new_v4(),
        level,
        name: name.to_string(),
        description: None,
        approver_type: ApproverTypeCode::from(role),
        fallback_roles: fallback.into_iter().collect(),
        is_active: true,
    })
    .collect()
}

/// Default steps for a new workflow: the first `count` active catalog levels,
/// renumbered from 1 so the result is always contiguous.
pub fn steps_from_catalog(levels: &[WorkflowLevel], count: usize) -> Vec<ApprovalStep> {
    let mut active: Vec<&WorkflowLevel> = levels.iter().filter(|level| level.is_active).collect();
    active.sort_by_key(|level| level.level);

    active
        .into_iter()
        .take(count)
        .zip(1u32..)
        .map(|(entry, position)| ApprovalStep {
            level: position,
            approver: StepApprover::ApproverType {
                code: entry.approver_type.clone(),
                roles: BTreeSet::new(),
            },
            fallback_roles: entry.fallback_roles.clone(),
            department_specific: false,
            required: true,
        })
        .collect()
}
