//! Selects the approval workflow that governs a leave request of a given
//! duration.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::models::{ApprovalWorkflow, WorkflowCategory};

/// What to do with a submission when no active workflow covers its duration.
///
/// There is no default: integrators must pick one in configuration.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NoWorkflowPolicy {
    AutoApprove,
    Block,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Resolution<'a> {
    Workflow(&'a ApprovalWorkflow),
    /// No workflow matched but an active category forbidding approval steps
    /// covers the duration.
    AutoApprove { category_id: Uuid },
    NotFound,
}

/// Picks the single active workflow whose `[min_days, max_days]` range
/// contains `duration_days`.
///
/// Overlaps resolve to the narrowest range, then the most recently updated
/// workflow; the id breaks any remaining tie so the choice never depends on
/// input order.
pub fn select_workflow(
    workflows: &[ApprovalWorkflow],
    duration_days: f64,
) -> Option<&ApprovalWorkflow> {
    workflows
        .iter()
        .filter(|workflow| workflow.is_active && workflow.contains(duration_days))
        .min_by(|a, b| compare_candidates(a, b))
}

pub fn resolve_workflow<'a>(
    workflows: &'a [ApprovalWorkflow],
    categories: &[WorkflowCategory],
    duration_days: f64,
) -> Resolution<'a> {
    if let Some(workflow) = select_workflow(workflows, duration_days) {
        return Resolution::Workflow(workflow);
    }

    categories
        .iter()
        .find(|category| {
            category.is_active && category.auto_approves() && category.contains(duration_days)
        })
        .map(|category| Resolution::AutoApprove {
            category_id: category.id,
        })
        .unwrap_or(Resolution::NotFound)
}

fn compare_candidates(a: &ApprovalWorkflow, b: &ApprovalWorkflow) -> Ordering {
    a.range_width()
        .total_cmp(&b.range_width())
        .then_with(|| b.updated_at.cmp(&a.updated_at))
        .then_with(|| a.id.cmp(&b.id))
}
