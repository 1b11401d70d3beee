//! Leave request approval state machine.
//!
//! Every transition takes the current request by reference and returns the
//! next version of it, so a failed transition leaves the caller's copy
//! untouched. Persisting the result (with its optimistic version check) is the
//! caller's job.

use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::models::{
    Actor, ApprovalDecision, ApprovalHistoryEntry, ApprovalMetadata, ApprovalWorkflow,
    LeaveRequest, LeaveRequestStatus,
};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransitionError {
    #[error("approval at level {attempted} is out of order (next required level: {})", describe_level(.expected))]
    OutOfOrderApproval { expected: Option<u32>, attempted: u32 },
    #[error("leave request is already {0}")]
    TerminalState(LeaveRequestStatus),
    #[error("cannot {action} a leave request that is {status}")]
    InvalidState {
        action: &'static str,
        status: LeaveRequestStatus,
    },
    #[error("leave request has no pending approval level")]
    NoPendingLevel,
}

fn describe_level(level: &Option<u32>) -> String {
    level
        .map(|level| level.to_string())
        .unwrap_or_else(|| "none".to_string())
}

/// How a submission is routed once resolution has run.
#[derive(Debug, Clone, Copy)]
pub enum Submission<'a> {
    Workflow(&'a ApprovalWorkflow),
    AutoApprove,
    /// No workflow applies and the request waits until an operator steps in.
    Blocked,
}

#[derive(Debug, Clone)]
pub struct Decision<'a> {
    pub approver: &'a Actor,
    /// Level the approver believes they are acting on. `None` targets the
    /// next required level.
    pub level: Option<u32>,
    pub comments: Option<String>,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct TransitionOutcome {
    pub from: LeaveRequestStatus,
    pub to: LeaveRequestStatus,
    pub level: Option<u32>,
    pub request: LeaveRequest,
}

impl TransitionOutcome {
    fn new(from: LeaveRequestStatus, level: Option<u32>, request: LeaveRequest) -> Self {
        Self {
            from,
            to: request.status,
            level,
            request,
        }
    }
}

pub fn submit(
    request: &LeaveRequest,
    submission: Submission<'_>,
    at: DateTime<Utc>,
) -> Result<TransitionOutcome, TransitionError> {
    if request.status != LeaveRequestStatus::NotSubmitted {
        return Err(TransitionError::InvalidState {
            action: "submit",
            status: request.status,
        });
    }

    let mut next = request.clone();
    next.metadata = match submission {
        Submission::Workflow(workflow) => ApprovalMetadata {
            workflow_id: Some(workflow.id),
            workflow_name: Some(workflow.name.clone()),
            current_approval_level: 0,
            required_approval_levels: workflow.required_levels(),
            steps: workflow.approval_levels.clone(),
            approval_history: Vec::new(),
        },
        Submission::AutoApprove | Submission::Blocked => ApprovalMetadata::default(),
    };
    next.status = match submission {
        Submission::Workflow(_) if next.metadata.required_approval_levels.is_empty() => {
            LeaveRequestStatus::Approved
        }
        Submission::Workflow(_) | Submission::Blocked => LeaveRequestStatus::Pending,
        Submission::AutoApprove => LeaveRequestStatus::Approved,
    };
    next.updated_at = at;

    Ok(TransitionOutcome::new(request.status, None, next))
}

pub fn approve(
    request: &LeaveRequest,
    decision: Decision<'_>,
) -> Result<TransitionOutcome, TransitionError> {
    ensure_awaiting_decision(request, decision.level)?;

    let expected = request.metadata.next_required_level();
    let Some(level) = expected else {
        return Err(TransitionError::NoPendingLevel);
    };
    let attempted = decision.level.unwrap_or(level);
    if attempted != level {
        return Err(TransitionError::OutOfOrderApproval {
            expected,
            attempted,
        });
    }

    let mut next = request.clone();
    next.metadata
        .approval_history
        .push(history_entry(&decision, level, ApprovalDecision::Approved));
    next.metadata.current_approval_level = level;
    next.status = if next.metadata.next_required_level().is_none() {
        LeaveRequestStatus::Approved
    } else {
        LeaveRequestStatus::PartiallyApproved
    };
    next.updated_at = decision.at;

    Ok(TransitionOutcome::new(request.status, Some(level), next))
}

/// Rejects at the pending level. The request becomes terminal and the level
/// counter does not move.
pub fn reject(
    request: &LeaveRequest,
    decision: Decision<'_>,
) -> Result<TransitionOutcome, TransitionError> {
    ensure_awaiting_decision(request, decision.level)?;

    let pending = request
        .metadata
        .next_required_level()
        .unwrap_or(request.metadata.current_approval_level + 1);
    if let Some(attempted) = decision.level {
        if attempted != pending {
            return Err(TransitionError::OutOfOrderApproval {
                expected: Some(pending),
                attempted,
            });
        }
    }

    let mut next = request.clone();
    next.metadata
        .approval_history
        .push(history_entry(&decision, pending, ApprovalDecision::Rejected));
    next.status = LeaveRequestStatus::Rejected;
    next.updated_at = decision.at;

    Ok(TransitionOutcome::new(request.status, Some(pending), next))
}

pub fn cancel(
    request: &LeaveRequest,
    at: DateTime<Utc>,
) -> Result<TransitionOutcome, TransitionError> {
    if !request.status.awaiting_decision() {
        return Err(match request.status {
            LeaveRequestStatus::NotSubmitted => TransitionError::InvalidState {
                action: "cancel",
                status: request.status,
            },
            status => TransitionError::TerminalState(status),
        });
    }

    let mut next = request.clone();
    next.status = LeaveRequestStatus::Cancelled;
    next.updated_at = at;
    Ok(TransitionOutcome::new(request.status, None, next))
}

pub fn request_deletion(
    request: &LeaveRequest,
    at: DateTime<Utc>,
) -> Result<TransitionOutcome, TransitionError> {
    if request.status != LeaveRequestStatus::Approved || request.balance_restored_at.is_some() {
        return Err(TransitionError::InvalidState {
            action: "request deletion of",
            status: request.status,
        });
    }

    let mut next = request.clone();
    next.status = LeaveRequestStatus::PendingDeletion;
    next.updated_at = at;
    Ok(TransitionOutcome::new(request.status, None, next))
}

/// Accepts a pending deletion: the request returns to approved and is stamped
/// as having had its leave balance restored.
pub fn approve_deletion(
    request: &LeaveRequest,
    at: DateTime<Utc>,
) -> Result<TransitionOutcome, TransitionError> {
    ensure_pending_deletion(request)?;

    let mut next = request.clone();
    next.status = LeaveRequestStatus::Approved;
    next.balance_restored_at = Some(at);
    next.updated_at = at;
    Ok(TransitionOutcome::new(request.status, None, next))
}

/// Declines a pending deletion. Metadata is left exactly as it was.
pub fn reject_deletion(
    request: &LeaveRequest,
    at: DateTime<Utc>,
) -> Result<TransitionOutcome, TransitionError> {
    ensure_pending_deletion(request)?;

    let mut next = request.clone();
    next.status = LeaveRequestStatus::Approved;
    next.updated_at = at;
    Ok(TransitionOutcome::new(request.status, None, next))
}

/// Fails unless the request is waiting on an approval decision.
///
/// A replayed decision for a level that an approved request already passed
/// reports `OutOfOrderApproval` rather than `TerminalState` so clients can
/// tell a duplicate apart from a late action.
pub fn ensure_awaiting_decision(
    request: &LeaveRequest,
    attempted_level: Option<u32>,
) -> Result<(), TransitionError> {
    match request.status {
        status if status.awaiting_decision() => Ok(()),
        LeaveRequestStatus::NotSubmitted => Err(TransitionError::InvalidState {
            action: "decide on",
            status: request.status,
        }),
        LeaveRequestStatus::Approved => match attempted_level {
            Some(attempted) if attempted <= request.metadata.current_approval_level => {
                Err(TransitionError::OutOfOrderApproval {
                    expected: None,
                    attempted,
                })
            }
            _ => Err(TransitionError::TerminalState(request.status)),
        },
        status => Err(TransitionError::TerminalState(status)),
    }
}

/// Fails when the caller named a level other than the one the request is
/// waiting on. Requests without a pending required level are left to the
/// transition itself.
pub fn ensure_expected_level(
    request: &LeaveRequest,
    attempted_level: Option<u32>,
) -> Result<(), TransitionError> {
    let (Some(attempted), Some(expected)) =
        (attempted_level, request.metadata.next_required_level())
    else {
        return Ok(());
    };
    if attempted == expected {
        Ok(())
    } else {
        Err(TransitionError::OutOfOrderApproval {
            expected: Some(expected),
            attempted,
        })
    }
}

/// Level already approved by `approver_id` and passed by the request, if
/// any. Lets a level-less repeat of an earlier approval be reported as out
/// of order instead of as a permission or terminal-state failure.
pub fn approved_level_by(request: &LeaveRequest, approver_id: Uuid) -> Option<u32> {
    request
        .metadata
        .approval_history
        .iter()
        .rev()
        .find(|entry| {
            entry.approver_id == approver_id
                && entry.decision == ApprovalDecision::Approved
                && entry.level <= request.metadata.current_approval_level
        })
        .map(|entry| entry.level)
}

fn ensure_pending_deletion(request: &LeaveRequest) -> Result<(), TransitionError> {
    if request.status == LeaveRequestStatus::PendingDeletion {
        Ok(())
    } else {
        Err(TransitionError::InvalidState {
            action: "decide the deletion of",
            status: request.status,
        })
    }
}

fn history_entry(
    decision: &Decision<'_>,
    level: u32,
    outcome: ApprovalDecision,
) -> ApprovalHistoryEntry {
    ApprovalHistoryEntry {
        level,
        approver_id: decision.approver.id,
        approver_name: decision.approver.name.clone(),
        decision: outcome,
        decided_at: decision.at,
        comments: decision.comments.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{ApprovalStep, ApproverTypeCode, Role, StepApprover};
    use std::collections::BTreeSet;
    use uuid::Uuid;

    fn step(level: u32, role: Role, required: bool) -> ApprovalStep {
        ApprovalStep {
            level,
            approver: StepApprover::ApproverType {
                code: ApproverTypeCode::from(role),
                roles: BTreeSet::new(),
            },
            fallback_roles: BTreeSet::new(),
            department_specific: false,
            required,
        }
    }

    fn workflow(steps: Vec<ApprovalStep>) -> ApprovalWorkflow {
        let now = Utc::now();
        ApprovalWorkflow {
            id: Uuid::new_v4(),
            name: "standard".to_string(),
            description: None,
            category_id: None,
            min_days: 0.5,
            max_days: 10.0,
            approval_levels: steps,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    fn draft() -> LeaveRequest {
        let now = Utc::now();
        LeaveRequest {
            id: Uuid::new_v4(),
            employee_id: Uuid::new_v4(),
            employee_name: "Dana Requester".to_string(),
            author_role: Role::Employee,
            department: Some("Operations".to_string()),
            duration_days: 3.0,
            status: LeaveRequestStatus::NotSubmitted,
            metadata: ApprovalMetadata::default(),
            version: 1,
            balance_restored_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn approver(role: Role) -> Actor {
        Actor {
            id: Uuid::new_v4(),
            name: format!("{role} approver"),
            role,
            custom_permissions: BTreeSet::new(),
            department: Some("Operations".to_string()),
            is_active: true,
        }
    }

    fn decision(actor: &Actor, level: Option<u32>) -> Decision<'_> {
        Decision {
            approver: actor,
            level,
            comments: Some("ok".to_string()),
            at: Utc::now(),
        }
    }

    fn submitted(steps: Vec<ApprovalStep>) -> LeaveRequest {
        let workflow = workflow(steps);
        submit(&draft(), Submission::Workflow(&workflow), Utc::now())
            .expect("submit")
            .request
    }

    #[test]
    fn submission_freezes_required_levels_and_steps() {
        let workflow = workflow(vec![
            step(1, Role::TeamLead, true),
            step(2, Role::Manager, false),
            step(3, Role::Hr, true),
        ]);
        let outcome = submit(&draft(), Submission::Workflow(&workflow), Utc::now()).unwrap();

        assert_eq!(outcome.to, LeaveRequestStatus::Pending);
        assert_eq!(outcome.request.metadata.required_approval_levels, vec![1, 3]);
        assert_eq!(outcome.request.metadata.steps.len(), 3);
        assert_eq!(outcome.request.metadata.current_approval_level, 0);
        assert_eq!(outcome.request.metadata.workflow_id, Some(workflow.id));
    }

    #[test]
    fn submission_without_required_levels_approves_immediately() {
        let workflow = workflow(vec![step(1, Role::TeamLead, false)]);
        let outcome = submit(&draft(), Submission::Workflow(&workflow), Utc::now()).unwrap();
        assert_eq!(outcome.to, LeaveRequestStatus::Approved);

        let blocked = submit(&draft(), Submission::Blocked, Utc::now()).unwrap();
        assert_eq!(blocked.to, LeaveRequestStatus::Pending);
        assert_eq!(blocked.request.metadata.next_required_level(), None);
    }

    #[test]
    fn two_level_request_approves_in_order() {
        let request = submitted(vec![step(1, Role::TeamLead, true), step(2, Role::Manager, true)]);
        let lead = approver(Role::TeamLead);
        let manager = approver(Role::Manager);

        let first = approve(&request, decision(&lead, Some(1))).unwrap();
        assert_eq!(first.to, LeaveRequestStatus::PartiallyApproved);
        assert_eq!(first.request.metadata.current_approval_level, 1);

        let second = approve(&first.request, decision(&manager, Some(2))).unwrap();
        assert_eq!(second.to, LeaveRequestStatus::Approved);
        let levels: Vec<u32> = second
            .request
            .metadata
            .approval_history
            .iter()
            .map(|entry| entry.level)
            .collect();
        assert_eq!(levels, vec![1, 2]);
    }

    #[test]
    fn reversed_order_fails_without_mutation() {
        let request = submitted(vec![step(1, Role::TeamLead, true), step(2, Role::Manager, true)]);
        let manager = approver(Role::Manager);

        let err = approve(&request, decision(&manager, Some(2))).unwrap_err();
        assert_eq!(
            err,
            TransitionError::OutOfOrderApproval {
                expected: Some(1),
                attempted: 2
            }
        );
        assert!(request.metadata.approval_history.is_empty());
        assert_eq!(request.status, LeaveRequestStatus::Pending);
    }

    #[test]
    fn replayed_decision_is_out_of_order() {
        let request = submitted(vec![step(1, Role::TeamLead, true), step(2, Role::Manager, true)]);
        let lead = approver(Role::TeamLead);

        let first = approve(&request, decision(&lead, Some(1))).unwrap();
        let err = approve(&first.request, decision(&lead, Some(1))).unwrap_err();
        assert!(matches!(err, TransitionError::OutOfOrderApproval { .. }));
        assert_eq!(first.request.metadata.approval_history.len(), 1);

        let single = submitted(vec![step(1, Role::TeamLead, true)]);
        let done = approve(&single, decision(&lead, Some(1))).unwrap();
        let replay = approve(&done.request, decision(&lead, Some(1))).unwrap_err();
        assert!(matches!(replay, TransitionError::OutOfOrderApproval { .. }));
        let late = approve(&done.request, decision(&lead, None)).unwrap_err();
        assert_eq!(
            late,
            TransitionError::TerminalState(LeaveRequestStatus::Approved)
        );
    }

    #[test]
    fn rejection_is_terminal_at_any_level() {
        let request = submitted(vec![
            step(1, Role::TeamLead, true),
            step(2, Role::Manager, true),
            step(3, Role::Hr, true),
        ]);
        let lead = approver(Role::TeamLead);
        let manager = approver(Role::Manager);

        let first = approve(&request, decision(&lead, None)).unwrap();
        let rejected = reject(&first.request, decision(&manager, None)).unwrap();

        assert_eq!(rejected.to, LeaveRequestStatus::Rejected);
        assert_eq!(rejected.request.metadata.current_approval_level, 1);
        let last = rejected.request.metadata.approval_history.last().unwrap();
        assert_eq!(last.level, 2);
        assert_eq!(last.decision, ApprovalDecision::Rejected);

        let err = approve(&rejected.request, decision(&manager, None)).unwrap_err();
        assert_eq!(
            err,
            TransitionError::TerminalState(LeaveRequestStatus::Rejected)
        );
    }

    #[test]
    fn cancellation_only_while_pending() {
        let request = submitted(vec![step(1, Role::TeamLead, true)]);
        let cancelled = cancel(&request, Utc::now()).unwrap();
        assert_eq!(cancelled.to, LeaveRequestStatus::Cancelled);

        let err = cancel(&cancelled.request, Utc::now()).unwrap_err();
        assert_eq!(
            err,
            TransitionError::TerminalState(LeaveRequestStatus::Cancelled)
        );
    }

    #[test]
    fn deletion_rejection_restores_identical_metadata() {
        let request = submitted(vec![step(1, Role::TeamLead, true)]);
        let lead = approver(Role::TeamLead);
        let approved = approve(&request, decision(&lead, None)).unwrap().request;

        let pending = request_deletion(&approved, Utc::now()).unwrap();
        assert_eq!(pending.to, LeaveRequestStatus::PendingDeletion);

        let reverted = reject_deletion(&pending.request, Utc::now()).unwrap();
        assert_eq!(reverted.to, LeaveRequestStatus::Approved);
        assert_eq!(reverted.request.metadata, approved.metadata);
        assert!(reverted.request.balance_restored_at.is_none());
    }

    #[test]
    fn approved_deletion_cannot_be_requested_twice() {
        let request = submitted(vec![step(1, Role::TeamLead, true)]);
        let lead = approver(Role::TeamLead);
        let approved = approve(&request, decision(&lead, None)).unwrap().request;

        let pending = request_deletion(&approved, Utc::now()).unwrap().request;
        let restored = approve_deletion(&pending, Utc::now()).unwrap().request;
        assert_eq!(restored.status, LeaveRequestStatus::Approved);
        assert!(restored.balance_restored_at.is_some());

        assert!(matches!(
            request_deletion(&restored, Utc::now()),
            Err(TransitionError::InvalidState { .. })
        ));
    }

    #[test]
    fn expected_level_guard_flags_stale_levels() {
        let request = submitted(vec![step(1, Role::TeamLead, true), step(2, Role::Manager, true)]);
        let lead = approver(Role::TeamLead);
        let partial = approve(&request, decision(&lead, None)).unwrap().request;

        assert!(ensure_expected_level(&partial, None).is_ok());
        assert!(ensure_expected_level(&partial, Some(2)).is_ok());
        assert_eq!(
            ensure_expected_level(&partial, Some(1)),
            Err(TransitionError::OutOfOrderApproval {
                expected: Some(2),
                attempted: 1
            })
        );
    }

    #[test]
    fn approved_level_by_finds_passed_levels_of_the_same_approver() {
        let request = submitted(vec![step(1, Role::TeamLead, true), step(2, Role::Manager, true)]);
        let lead = approver(Role::TeamLead);
        let manager = approver(Role::Manager);
        assert_eq!(approved_level_by(&request, lead.id), None);

        let partial = approve(&request, decision(&lead, None)).unwrap().request;
        assert_eq!(approved_level_by(&partial, lead.id), Some(1));
        assert_eq!(approved_level_by(&partial, manager.id), None);

        let done = approve(&partial, decision(&manager, None)).unwrap().request;
        assert_eq!(approved_level_by(&done, manager.id), Some(2));
        assert_eq!(approved_level_by(&done, lead.id), Some(1));
    }
}
