//! Authoring-time rules for approver types, categories, catalog levels and
//! workflows. Violations are collected rather than short-circuited so a
//! single response can list everything wrong with a definition.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::models::{
    ApprovalStep, ApprovalWorkflow, ApproverType, StepApprover, WorkflowCategory, WorkflowLevel,
};

/// Smallest bookable leave duration in days.
pub const MIN_DURATION_DAYS: f64 = 0.5;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RuleEvaluation {
    pub is_valid: bool,
    pub violations: Vec<String>,
}

impl RuleEvaluation {
    pub fn ok() -> Self {
        Self {
            is_valid: true,
            violations: Vec::new(),
        }
    }

    pub fn with_violation(message: impl Into<String>) -> Self {
        Self {
            is_valid: false,
            violations: vec![message.into()],
        }
    }

    pub fn push(&mut self, message: impl Into<String>) {
        self.is_valid = false;
        self.violations.push(message.into());
    }

    pub fn merge(&mut self, other: RuleEvaluation) {
        self.is_valid &= other.is_valid;
        self.violations.extend(other.violations);
    }

    pub fn into_result(self) -> Result<(), Vec<String>> {
        if self.is_valid {
            Ok(())
        } else {
            Err(self.violations)
        }
    }
}

fn check_range(evaluation: &mut RuleEvaluation, min_days: f64, max_days: f64) {
    if !min_days.is_finite() || !max_days.is_finite() {
        evaluation.push("minDays and maxDays must be finite numbers");
        return;
    }
    if min_days < MIN_DURATION_DAYS {
        evaluation.push(format!("minDays must be at least {MIN_DURATION_DAYS}"));
    }
    if min_days > max_days {
        evaluation.push("minDays must not exceed maxDays");
    }
}

pub fn validate_approver_type(candidate: &ApproverType, existing: &[ApproverType]) -> RuleEvaluation {
    let mut evaluation = RuleEvaluation::ok();
    if candidate.name.trim().is_empty() {
        evaluation.push("approver type name is required");
    }
    if existing
        .iter()
        .any(|other| other.id != candidate.id && other.code == candidate.code)
    {
        evaluation.push(format!("approver type code `{}` already exists", candidate.code));
    }
    evaluation
}

pub fn validate_category(category: &WorkflowCategory) -> RuleEvaluation {
    let mut evaluation = RuleEvaluation::ok();
    if category.name.trim().is_empty() {
        evaluation.push("category name is required");
    }
    check_range(&mut evaluation, category.min_days, category.max_days);
    evaluation
}

/// Validates a category edit against the workflows already attached to it.
/// Shrinking `maxSteps` below an attached workflow's step count, or moving the
/// range away from an attached workflow's range, is refused.
pub fn validate_category_update(
    updated: &WorkflowCategory,
    attached: &[ApprovalWorkflow],
) -> RuleEvaluation {
    let mut evaluation = validate_category(updated);
    for workflow in attached_workflows(updated.id, attached) {
        let steps = workflow.approval_levels.len();
        if steps > updated.max_steps as usize {
            evaluation.push(format!(
                "workflow `{}` has {steps} steps, above the new maxSteps of {}",
                workflow.name, updated.max_steps
            ));
        }
        if workflow.min_days != updated.min_days || workflow.max_days != updated.max_days {
            evaluation.push(format!(
                "workflow `{}` covers {}-{} days; detach it before changing the category range",
                workflow.name, workflow.min_days, workflow.max_days
            ));
        }
    }
    evaluation
}

pub fn validate_level_entry(entry: &WorkflowLevel, existing: &[WorkflowLevel]) -> RuleEvaluation {
    let mut evaluation = RuleEvaluation::ok();
    if entry.level == 0 {
        evaluation.push("catalog level must be a positive integer");
    }
    if entry.name.trim().is_empty() {
        evaluation.push("catalog level name is required");
    }
    if existing
        .iter()
        .any(|other| other.id != entry.id && other.level == entry.level)
    {
        evaluation.push(format!("catalog level {} already exists", entry.level));
    }
    evaluation
}

/// Full structural check of a workflow definition.
///
/// `approver_types` is the registry the step codes are checked against; only
/// active types may be referenced by new or edited workflows.
pub fn validate_workflow(
    workflow: &ApprovalWorkflow,
    category: Option<&WorkflowCategory>,
    approver_types: &[ApproverType],
) -> RuleEvaluation {
    let mut evaluation = RuleEvaluation::ok();
    if workflow.name.trim().is_empty() {
        evaluation.push("workflow name is required");
    }
    check_range(&mut evaluation, workflow.min_days, workflow.max_days);
    evaluation.merge(validate_levels(&workflow.approval_levels));

    for step in &workflow.approval_levels {
        evaluation.merge(validate_step(step, approver_types));
    }

    match (workflow.category_id, category) {
        (Some(category_id), Some(category)) if category.id == category_id => {
            if !category.is_active {
                evaluation.push(format!("category `{}` is inactive", category.name));
            }
            if workflow.min_days != category.min_days || workflow.max_days != category.max_days {
                evaluation.push(format!(
                    "workflow range must match category `{}` ({}-{} days)",
                    category.name, category.min_days, category.max_days
                ));
            }
            if workflow.approval_levels.len() > category.max_steps as usize {
                evaluation.push(format!(
                    "category `{}` allows at most {} approval steps",
                    category.name, category.max_steps
                ));
            }
        }
        (Some(category_id), _) => {
            evaluation.push(format!("unknown workflow category {category_id}"));
        }
        (None, _) => {}
    }

    evaluation
}

/// Steps must be non-empty and numbered 1..=N with no gaps or duplicates.
pub fn validate_levels(steps: &[ApprovalStep]) -> RuleEvaluation {
    if steps.is_empty() {
        return RuleEvaluation::with_violation("workflow needs at least one approval step");
    }

    let mut evaluation = RuleEvaluation::ok();
    let mut seen = BTreeSet::new();
    for step in steps {
        if !seen.insert(step.level) {
            evaluation.push(format!("approval level {} is defined twice", step.level));
        }
    }
    let expected: BTreeSet<u32> = (1..=steps.len() as u32).collect();
    if seen != expected {
        evaluation.push(format!(
            "approval levels must run contiguously from 1 to {}",
            steps.len()
        ));
    }
    evaluation
}

fn validate_step(step: &ApprovalStep, approver_types: &[ApproverType]) -> RuleEvaluation {
    let mut evaluation = RuleEvaluation::ok();
    match &step.approver {
        StepApprover::ApproverType { code, .. } if code.is_specific_user() => {
            evaluation.push(format!(
                "level {}: use a specific_user approver with a user id instead of the `{code}` code",
                step.level
            ));
        }
        StepApprover::ApproverType { code, roles } => {
            match approver_types.iter().find(|known| &known.code == code) {
                Some(known) if known.is_active => {}
                Some(_) => evaluation.push(format!(
                    "level {}: approver type `{code}` is inactive",
                    step.level
                )),
                None => evaluation.push(format!(
                    "level {}: unknown approver type `{code}`",
                    step.level
                )),
            }
            if code.role().is_none() && roles.is_empty() {
                evaluation.push(format!(
                    "level {}: approver type `{code}` does not name a role; list the roles allowed to approve",
                    step.level
                ));
            }
        }
        StepApprover::SpecificUser { user_id } => {
            if user_id.is_nil() {
                evaluation.push(format!("level {}: specific user id is required", step.level));
            }
        }
    }
    evaluation
}

pub fn attached_workflows<'a>(
    category_id: Uuid,
    workflows: &'a [ApprovalWorkflow],
) -> impl Iterator<Item = &'a ApprovalWorkflow> {
    workflows
        .iter()
        .filter(move |workflow| workflow.category_id == Some(category_id))
}
