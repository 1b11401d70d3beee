use std::collections::BTreeSet;

use anyhow::Result;
use chrono::Utc;
use leave_approvals::{
    domain::models::{Actor, ApprovalMetadata, LeaveRequest, LeaveRequestStatus, Role},
    infrastructure::store::{ApprovalStore, PgApprovalStore, StoreError},
};
use serial_test::serial;
use uuid::Uuid;

#[path = "test_harness.rs"]
mod test_harness;

use test_harness::run_test;

fn actor(role: Role, department: &str) -> Actor {
    Actor {
        id: Uuid::new_v4(),
        name: format!("{role} {}", Uuid::new_v4().simple()),
        role,
        custom_permissions: BTreeSet::new(),
        department: Some(department.to_string()),
        is_active: true,
    }
}

#[tokio::test]
#[serial]
async fn leave_request_updates_check_version() -> Result<()> {
    run_test(|pool| async move {
        let store = PgApprovalStore::new(pool.clone());
        let department = format!("dept-{}", Uuid::new_v4().simple());
        let employee = actor(Role::Employee, &department);
        store.insert_actor(&employee).await?;

        let now = Utc::now();
        let request = LeaveRequest {
            id: Uuid::new_v4(),
            employee_id: employee.id,
            employee_name: employee.name.clone(),
            author_role: employee.role,
            department: employee.department.clone(),
            duration_days: 2.5,
            status: LeaveRequestStatus::NotSubmitted,
            metadata: ApprovalMetadata::default(),
            version: 1,
            balance_restored_at: None,
            created_at: now,
            updated_at: now,
        };
        store.insert_leave_request(&request).await?;

        let mut pending = request.clone();
        pending.status = LeaveRequestStatus::Pending;
        pending.metadata.required_approval_levels = vec![1];
        let saved = store.update_leave_request(&pending, 1).await?;
        assert_eq!(saved.version, 2);
        assert_eq!(saved.status, LeaveRequestStatus::Pending);
        assert_eq!(saved.metadata.required_approval_levels, vec![1]);

        let mut stale = request.clone();
        stale.status = LeaveRequestStatus::Cancelled;
        let err = store.update_leave_request(&stale, 1).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict), "{err:?}");

        let mut missing = request.clone();
        missing.id = Uuid::new_v4();
        let err = store.update_leave_request(&missing, 1).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound), "{err:?}");

        let stored = store
            .get_leave_request(request.id)
            .await?
            .expect("request persisted");
        assert_eq!(stored.status, LeaveRequestStatus::Pending);
        assert_eq!(stored.employee_name, employee.name);

        sqlx::query("DELETE FROM leave_requests WHERE id = $1")
            .bind(request.id)
            .execute(&pool)
            .await?;
        sqlx::query("DELETE FROM employees WHERE id = $1")
            .bind(employee.id)
            .execute(&pool)
            .await?;
        Ok(())
    })
    .await
}

#[tokio::test]
#[serial]
async fn available_approvers_match_department_case_insensitively() -> Result<()> {
    run_test(|pool| async move {
        let store = PgApprovalStore::new(pool.clone());
        let department = format!("Dept-{}", Uuid::new_v4().simple());
        let lead = actor(Role::TeamLead, &department);
        let mut inactive = actor(Role::TeamLead, &department);
        inactive.is_active = false;
        let manager = actor(Role::Manager, &department);
        for entry in [&lead, &inactive, &manager] {
            store.insert_actor(entry).await?;
        }

        let found = store
            .find_available_approvers(
                &[Role::TeamLead],
                Some(&department.to_lowercase()),
                Uuid::new_v4(),
            )
            .await?;
        assert_eq!(found.iter().map(|a| a.id).collect::<Vec<_>>(), vec![lead.id]);

        let excluding_lead = store
            .find_available_approvers(&[Role::TeamLead, Role::Manager], Some(&department), lead.id)
            .await?;
        assert_eq!(
            excluding_lead.iter().map(|a| a.id).collect::<Vec<_>>(),
            vec![manager.id]
        );

        sqlx::query("DELETE FROM employees WHERE department = $1")
            .bind(&department)
            .execute(&pool)
            .await?;
        Ok(())
    })
    .await
}
