use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use axum::http::{Method, StatusCode};
use leave_approvals::{
    domain::{models::Role, permissions::PermissionMode, resolver::NoWorkflowPolicy},
    infrastructure::{
        balance::LeaveBalanceClient,
        store::{ApprovalStore, MemoryApprovalStore},
    },
};
use serde_json::{json, Value};
use uuid::Uuid;

#[path = "test_harness.rs"]
mod test_harness;

use test_harness::{
    app_with, memory_app, memory_app_with_balances, role_step, test_config, RecordingBalanceClient,
    TestApp,
};

async fn submit(app: &TestApp, token: &str, duration_days: f64) -> Result<(Uuid, StatusCode, Value)> {
    let id = Uuid::new_v4();
    let (status, body) = app
        .send(
            Method::POST,
            &format!("/api/leave-requests/{id}/submit"),
            Some(token),
            Some(json!({ "durationDays": duration_days })),
        )
        .await?;
    Ok((id, status, body))
}

async fn decide(
    app: &TestApp,
    token: &str,
    id: Uuid,
    action: &str,
    level: Option<u32>,
) -> Result<(StatusCode, Value)> {
    let mut body = json!({ "action": action, "comments": "reviewed" });
    if let Some(level) = level {
        body["level"] = json!(level);
    }
    app.send(
        Method::POST,
        &format!("/api/leave-requests/{id}/decision"),
        Some(token),
        Some(body),
    )
    .await
}

async fn can_act(app: &TestApp, token: &str, id: Uuid, action: &str) -> Result<bool> {
    let (status, body) = app
        .send(
            Method::GET,
            &format!("/api/leave-requests/{id}/can-act?action={action}"),
            Some(token),
            None,
        )
        .await?;
    assert_eq!(status, StatusCode::OK, "{body}");
    Ok(body["allowed"].as_bool().unwrap_or(false))
}

#[tokio::test]
async fn two_level_request_needs_both_levels_in_order() -> Result<()> {
    let app = memory_app(NoWorkflowPolicy::Error, PermissionMode::StepBound);
    app.workflow(
        "Standard",
        0.5,
        5.0,
        vec![role_step(1, Role::TeamLead), role_step(2, Role::Manager)],
    )
    .await?;
    let employee = app.actor(Role::Employee, Some("Operations")).await?;
    let lead = app.actor(Role::TeamLead, Some("Operations")).await?;
    let manager = app.actor(Role::Manager, Some("Operations")).await?;

    let (id, status, body) = submit(&app, &app.token(&employee)?, 3.0).await?;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["leaveRequest"]["status"], "pending");
    assert_eq!(
        body["leaveRequest"]["metadata"]["requiredApprovalLevels"],
        json!([1, 2])
    );

    let manager_token = app.token(&manager)?;
    let (status, body) = decide(&app, &manager_token, id, "approve", Some(2)).await?;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "out_of_order_approval");

    let lead_token = app.token(&lead)?;
    let (status, body) = decide(&app, &lead_token, id, "approve", Some(1)).await?;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["leaveRequest"]["status"], "partially_approved");
    assert_eq!(body["leaveRequest"]["metadata"]["currentApprovalLevel"], 1);

    let (status, body) = decide(&app, &lead_token, id, "approve", Some(1)).await?;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "out_of_order_approval");

    let (status, body) = decide(&app, &manager_token, id, "approve", None).await?;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["leaveRequest"]["status"], "approved");
    let history = body["leaveRequest"]["metadata"]["approvalHistory"]
        .as_array()
        .cloned()
        .unwrap_or_default();
    let levels: Vec<u64> = history
        .iter()
        .filter_map(|entry| entry["level"].as_u64())
        .collect();
    assert_eq!(levels, vec![1, 2]);
    assert_eq!(history[0]["decision"], "approved");

    Ok(())
}

#[tokio::test]
async fn rejection_is_terminal() -> Result<()> {
    let app = memory_app(NoWorkflowPolicy::Error, PermissionMode::StepBound);
    app.workflow(
        "Long leave",
        0.5,
        30.0,
        vec![
            role_step(1, Role::TeamLead),
            role_step(2, Role::Manager),
            role_step(3, Role::Hr),
        ],
    )
    .await?;
    let employee = app.actor(Role::Employee, None).await?;
    let lead = app.actor(Role::TeamLead, None).await?;
    let manager = app.actor(Role::Manager, None).await?;
    let hr = app.actor(Role::Hr, None).await?;

    let (id, _, _) = submit(&app, &app.token(&employee)?, 10.0).await?;
    decide(&app, &app.token(&lead)?, id, "approve", None).await?;

    let (status, body) = decide(&app, &app.token(&manager)?, id, "reject", None).await?;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["leaveRequest"]["status"], "rejected");
    assert_eq!(body["leaveRequest"]["metadata"]["currentApprovalLevel"], 1);
    assert_eq!(
        body["leaveRequest"]["metadata"]["approvalHistory"][1]["decision"],
        "rejected"
    );

    let (status, body) = decide(&app, &app.token(&hr)?, id, "approve", None).await?;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "terminal_state");
    assert!(!can_act(&app, &app.token(&hr)?, id, "approve").await?);

    Ok(())
}

#[tokio::test]
async fn escalation_shortcut_lets_manager_approve_team_lead_request() -> Result<()> {
    let app = memory_app(NoWorkflowPolicy::Error, PermissionMode::StepBound);
    app.workflow("Short", 0.5, 2.0, vec![role_step(1, Role::TeamLead)])
        .await?;
    let requester = app.actor(Role::TeamLead, Some("Operations")).await?;
    let manager = app.actor(Role::Manager, Some("Operations")).await?;

    let requester_token = app.token(&requester)?;
    let (id, status, _) = submit(&app, &requester_token, 1.0).await?;
    assert_eq!(status, StatusCode::OK);

    assert!(!can_act(&app, &requester_token, id, "approve").await?);
    let (status, _) = decide(&app, &requester_token, id, "approve", None).await?;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let manager_token = app.token(&manager)?;
    assert!(can_act(&app, &manager_token, id, "approve").await?);
    let (status, body) = decide(&app, &manager_token, id, "approve", None).await?;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["leaveRequest"]["status"], "approved");

    Ok(())
}

#[tokio::test]
async fn fallback_roles_apply_only_without_primary_approver() -> Result<()> {
    let app = memory_app(NoWorkflowPolicy::Error, PermissionMode::StepBound);
    let mut step = role_step(1, Role::TeamLead);
    step.department_specific = true;
    step.fallback_roles.insert(Role::Manager);
    app.workflow("Department scoped", 0.5, 5.0, vec![step]).await?;

    let employee = app.actor(Role::Employee, Some("Operations")).await?;
    let foreign_lead = app.actor(Role::TeamLead, Some("Finance")).await?;
    let manager = app.actor(Role::Manager, Some("Operations")).await?;

    let (id, _, _) = submit(&app, &app.token(&employee)?, 2.0).await?;

    assert!(!can_act(&app, &app.token(&foreign_lead)?, id, "approve").await?);
    assert!(can_act(&app, &app.token(&manager)?, id, "approve").await?);

    let local_lead = app.actor(Role::TeamLead, Some("operations")).await?;
    assert!(!can_act(&app, &app.token(&manager)?, id, "approve").await?);
    assert!(can_act(&app, &app.token(&local_lead)?, id, "reject").await?);

    Ok(())
}

#[tokio::test]
async fn only_requester_can_cancel_pending_request() -> Result<()> {
    let app = memory_app(NoWorkflowPolicy::Error, PermissionMode::StepBound);
    app.workflow("Standard", 0.5, 5.0, vec![role_step(1, Role::TeamLead)])
        .await?;
    let employee = app.actor(Role::Employee, None).await?;
    let lead = app.actor(Role::TeamLead, None).await?;

    let employee_token = app.token(&employee)?;
    let (id, _, _) = submit(&app, &employee_token, 1.0).await?;
    let cancel_uri = format!("/api/leave-requests/{id}/cancel");

    let (status, _) = app
        .send(Method::POST, &cancel_uri, Some(&app.token(&lead)?), None)
        .await?;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = app
        .send(Method::POST, &cancel_uri, Some(&employee_token), None)
        .await?;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["leaveRequest"]["status"], "cancelled");

    let (status, body) = app
        .send(Method::POST, &cancel_uri, Some(&employee_token), None)
        .await?;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "terminal_state");

    Ok(())
}

#[tokio::test]
async fn deletion_flow_restores_balance_once() -> Result<()> {
    let app = memory_app(NoWorkflowPolicy::Error, PermissionMode::StepBound);
    app.workflow("Standard", 0.5, 5.0, vec![role_step(1, Role::TeamLead)])
        .await?;
    let employee = app.actor(Role::Employee, None).await?;
    let lead = app.actor(Role::TeamLead, None).await?;
    let employee_token = app.token(&employee)?;
    let lead_token = app.token(&lead)?;

    let (id, _, _) = submit(&app, &employee_token, 2.0).await?;
    let (_, approved) = decide(&app, &lead_token, id, "approve", None).await?;
    let approved_metadata = approved["leaveRequest"]["metadata"].clone();

    let deletion_uri = format!("/api/leave-requests/{id}/deletion");
    let decision_uri = format!("/api/leave-requests/{id}/deletion/decision");

    let (status, body) = app
        .send(Method::POST, &deletion_uri, Some(&employee_token), None)
        .await?;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["leaveRequest"]["status"], "pending_deletion");
    assert!(can_act(&app, &lead_token, id, "approve").await?);
    assert!(!can_act(&app, &employee_token, id, "approve").await?);

    let (status, body) = app
        .send(
            Method::POST,
            &decision_uri,
            Some(&lead_token),
            Some(json!({ "action": "reject" })),
        )
        .await?;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["leaveRequest"]["status"], "approved");
    assert_eq!(body["leaveRequest"]["metadata"], approved_metadata);
    assert!(body["leaveRequest"].get("balanceRestoredAt").is_none());
    assert!(app.balances.restored.lock().is_empty());

    app.send(Method::POST, &deletion_uri, Some(&employee_token), None)
        .await?;
    let (status, body) = app
        .send(
            Method::POST,
            &decision_uri,
            Some(&lead_token),
            Some(json!({ "action": "approve", "comments": "booked by mistake" })),
        )
        .await?;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["leaveRequest"]["status"], "approved");
    assert!(body["leaveRequest"]["balanceRestoredAt"].is_string());
    assert_eq!(app.balances.restored.lock().as_slice(), &[id]);

    let (status, body) = app
        .send(Method::POST, &deletion_uri, Some(&employee_token), None)
        .await?;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "invalid_transition");

    Ok(())
}

#[tokio::test]
async fn failed_balance_restoration_keeps_deletion_pending() -> Result<()> {
    let app = memory_app_with_balances(
        NoWorkflowPolicy::Error,
        PermissionMode::StepBound,
        RecordingBalanceClient {
            fail: true,
            ..Default::default()
        },
    );
    app.workflow("Standard", 0.5, 5.0, vec![role_step(1, Role::TeamLead)])
        .await?;
    let employee = app.actor(Role::Employee, None).await?;
    let hr = app.actor(Role::Hr, None).await?;
    let employee_token = app.token(&employee)?;
    let hr_token = app.token(&hr)?;

    let (id, _, _) = submit(&app, &employee_token, 2.0).await?;
    let lead = app.actor(Role::TeamLead, None).await?;
    decide(&app, &app.token(&lead)?, id, "approve", None).await?;
    app.send(
        Method::POST,
        &format!("/api/leave-requests/{id}/deletion"),
        Some(&employee_token),
        None,
    )
    .await?;

    let (status, _) = app
        .send(
            Method::POST,
            &format!("/api/leave-requests/{id}/deletion/decision"),
            Some(&hr_token),
            Some(json!({ "action": "approve" })),
        )
        .await?;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);

    let (status, body) = app
        .send(
            Method::GET,
            &format!("/api/leave-requests/{id}"),
            Some(&employee_token),
            None,
        )
        .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["leaveRequest"]["status"], "pending_deletion");
    assert!(body["leaveRequest"].get("balanceRestoredAt").is_none());

    Ok(())
}

/// Ledger that fails after someone else has already written the request.
struct RacedBalanceClient {
    store: Arc<dyn ApprovalStore>,
}

#[async_trait]
impl LeaveBalanceClient for RacedBalanceClient {
    async fn restore_leave_balance(&self, request_id: Uuid) -> anyhow::Result<()> {
        if let Some(request) = self.store.get_leave_request(request_id).await? {
            self.store
                .update_leave_request(&request, request.version)
                .await?;
        }
        anyhow::bail!("ledger unavailable")
    }
}

#[tokio::test]
async fn lost_rollback_after_failed_restoration_reports_both_errors() -> Result<()> {
    let store: Arc<dyn ApprovalStore> = Arc::new(MemoryApprovalStore::with_defaults());
    let app = app_with(
        test_config(NoWorkflowPolicy::Error, PermissionMode::StepBound),
        Arc::clone(&store),
        Arc::new(RacedBalanceClient {
            store: Arc::clone(&store),
        }),
    );
    app.workflow("Standard", 0.5, 5.0, vec![role_step(1, Role::TeamLead)])
        .await?;
    let employee = app.actor(Role::Employee, None).await?;
    let lead = app.actor(Role::TeamLead, None).await?;
    let hr = app.actor(Role::Hr, None).await?;
    let employee_token = app.token(&employee)?;

    let (id, _, _) = submit(&app, &employee_token, 2.0).await?;
    decide(&app, &app.token(&lead)?, id, "approve", None).await?;
    app.send(
        Method::POST,
        &format!("/api/leave-requests/{id}/deletion"),
        Some(&employee_token),
        None,
    )
    .await?;

    let (status, body) = app
        .send(
            Method::POST,
            &format!("/api/leave-requests/{id}/deletion/decision"),
            Some(&app.token(&hr)?),
            Some(json!({ "action": "approve" })),
        )
        .await?;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["code"], "internal_error");
    let message = body["error"].as_str().unwrap_or_default();
    assert!(message.contains("ledger unavailable"), "{message}");
    assert!(message.contains("reverting"), "{message}");

    Ok(())
}

#[tokio::test]
async fn no_workflow_policy_is_honoured() -> Result<()> {
    let erroring = memory_app(NoWorkflowPolicy::Error, PermissionMode::StepBound);
    let employee = erroring.actor(Role::Employee, None).await?;
    let (_, status, _) = submit(&erroring, &erroring.token(&employee)?, 4.0).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);

    erroring.category(0.5, 1.0, 0).await?;
    let (_, status, body) = submit(&erroring, &erroring.token(&employee)?, 1.0).await?;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["leaveRequest"]["status"], "approved");

    let auto = memory_app(NoWorkflowPolicy::AutoApprove, PermissionMode::StepBound);
    let employee = auto.actor(Role::Employee, None).await?;
    let (_, status, body) = submit(&auto, &auto.token(&employee)?, 4.0).await?;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["leaveRequest"]["status"], "approved");

    let blocking = memory_app(NoWorkflowPolicy::Block, PermissionMode::StepBound);
    let employee = blocking.actor(Role::Employee, None).await?;
    let lead = blocking.actor(Role::TeamLead, None).await?;
    let (id, status, body) = submit(&blocking, &blocking.token(&employee)?, 4.0).await?;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["leaveRequest"]["status"], "pending");
    assert!(!can_act(&blocking, &blocking.token(&lead)?, id, "approve").await?);

    Ok(())
}

#[tokio::test]
async fn role_ranking_mode_uses_flat_levels() -> Result<()> {
    let app = memory_app(NoWorkflowPolicy::Error, PermissionMode::RoleRanking);
    app.workflow(
        "Standard",
        0.5,
        5.0,
        vec![role_step(1, Role::TeamLead), role_step(2, Role::Manager)],
    )
    .await?;
    let employee = app.actor(Role::Employee, None).await?;
    let lead = app.actor(Role::TeamLead, None).await?;
    let manager = app.actor(Role::Manager, None).await?;
    let hr = app.actor(Role::Hr, None).await?;
    let admin = app.actor(Role::Admin, None).await?;

    let employee_token = app.token(&employee)?;
    let (id, _, _) = submit(&app, &employee_token, 2.0).await?;

    assert!(!can_act(&app, &app.token(&hr)?, id, "approve").await?);
    assert!(!can_act(&app, &app.token(&manager)?, id, "approve").await?);
    assert!(can_act(&app, &app.token(&lead)?, id, "approve").await?);

    decide(&app, &app.token(&lead)?, id, "approve", None).await?;
    assert!(can_act(&app, &app.token(&manager)?, id, "approve").await?);
    assert!(!can_act(&app, &app.token(&hr)?, id, "approve").await?);

    let (other, _, _) = submit(&app, &employee_token, 2.0).await?;
    let (status, body) = decide(&app, &app.token(&admin)?, other, "approve", None).await?;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["leaveRequest"]["status"], "partially_approved");

    Ok(())
}

#[tokio::test]
async fn decisions_require_a_token() -> Result<()> {
    let app = memory_app(NoWorkflowPolicy::Error, PermissionMode::StepBound);
    let (status, _) = app
        .send(
            Method::POST,
            &format!("/api/leave-requests/{}/decision", Uuid::new_v4()),
            None,
            Some(json!({ "action": "approve" })),
        )
        .await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    Ok(())
}
