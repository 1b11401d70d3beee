use std::collections::BTreeSet;

use anyhow::anyhow;
use async_trait::async_trait;
use sqlx::{postgres::PgRow, types::Json, Row};
use uuid::Uuid;

use crate::{
    domain::models::{
        Actor, ApprovalMetadata, ApprovalStep, ApprovalWorkflow, ApproverType, ApproverTypeCode,
        LeaveRequest, LeaveRequestStatus, Role, WorkflowCategory, WorkflowLevel,
    },
    infrastructure::db::PgPool,
};

use super::{ApprovalStore, StoreError, StoreResult};

pub struct PgApprovalStore {
    pool: PgPool,
}

impl PgApprovalStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

const LEAVE_REQUEST_COLUMNS: &str = "id, employee_id, employee_name, author_role, department, duration_days, status, metadata, version, balance_restored_at, created_at, updated_at";
const WORKFLOW_COLUMNS: &str = "id, name, description, category_id, min_days, max_days, approval_levels, is_active, created_at, updated_at";
const APPROVER_TYPE_COLUMNS: &str = "id, name, code, description, is_active, created_at, updated_at";
const CATEGORY_COLUMNS: &str = "id, name, description, min_days, max_days, max_steps, is_active, created_at, updated_at";
const LEVEL_COLUMNS: &str = "id, level, name, description, approver_type, fallback_roles, is_active";
const ACTOR_COLUMNS: &str = "id, name, role, custom_permissions, department, is_active";

#[async_trait]
impl ApprovalStore for PgApprovalStore {
    async fn get_leave_request(&self, id: Uuid) -> StoreResult<Option<LeaveRequest>> {
        let row = sqlx::query(&format!(
            "SELECT {LEAVE_REQUEST_COLUMNS} FROM leave_requests WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(|row| map_leave_request(&row)).transpose()
    }

    async fn insert_leave_request(&self, request: &LeaveRequest) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO leave_requests
                 (id, employee_id, employee_name, author_role, department, duration_days, status,
                  metadata, version, balance_restored_at, created_at, updated_at)
             VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12)",
        )
        .bind(request.id)
        .bind(request.employee_id)
        .bind(&request.employee_name)
        .bind(request.author_role)
        .bind(&request.department)
        .bind(request.duration_days)
        .bind(request.status.as_str())
        .bind(Json(&request.metadata))
        .bind(request.version)
        .bind(request.balance_restored_at)
        .bind(request.created_at)
        .bind(request.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_leave_request(
        &self,
        request: &LeaveRequest,
        expected_version: i32,
    ) -> StoreResult<LeaveRequest> {
        let row = sqlx::query(&format!(
            "UPDATE leave_requests
             SET status = $1, metadata = $2, balance_restored_at = $3, updated_at = $4,
                 version = version + 1
             WHERE id = $5 AND version = $6
             RETURNING {LEAVE_REQUEST_COLUMNS}"
        ))
        .bind(request.status.as_str())
        .bind(Json(&request.metadata))
        .bind(request.balance_restored_at)
        .bind(request.updated_at)
        .bind(request.id)
        .bind(expected_version)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(row) = row {
            return map_leave_request(&row);
        }

        let exists =
            sqlx::query_scalar::<_, i64>("SELECT COUNT(1) FROM leave_requests WHERE id = $1")
                .bind(request.id)
                .fetch_one(&self.pool)
                .await?;

        if exists == 0 {
            Err(StoreError::NotFound)
        } else {
            Err(StoreError::Conflict)
        }
    }

    async fn get_actor(&self, id: Uuid) -> StoreResult<Option<Actor>> {
        let row = sqlx::query(&format!("SELECT {ACTOR_COLUMNS} FROM employees WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|row| map_actor(&row)).transpose()
    }

    async fn insert_actor(&self, actor: &Actor) -> StoreResult<()> {
        let permissions: Vec<String> = actor.custom_permissions.iter().cloned().collect();
        sqlx::query(
            "INSERT INTO employees (id, name, role, custom_permissions, department, is_active)
             VALUES ($1,$2,$3,$4,$5,$6)",
        )
        .bind(actor.id)
        .bind(&actor.name)
        .bind(actor.role)
        .bind(&permissions)
        .bind(&actor.department)
        .bind(actor.is_active)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_available_approvers(
        &self,
        roles: &[Role],
        department: Option<&str>,
        exclude: Uuid,
    ) -> StoreResult<Vec<Actor>> {
        let role_codes: Vec<&str> = roles.iter().map(Role::as_str).collect();
        let rows = sqlx::query(&format!(
            "SELECT {ACTOR_COLUMNS} FROM employees
             WHERE is_active
               AND id <> $1
               AND role = ANY($2)
               AND ($3::TEXT IS NULL OR LOWER(department) = LOWER($3))"
        ))
        .bind(exclude)
        .bind(&role_codes)
        .bind(department)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(map_actor).collect()
    }

    async fn list_workflows(&self, active_only: bool) -> StoreResult<Vec<ApprovalWorkflow>> {
        let rows = sqlx::query(&format!(
            "SELECT {WORKFLOW_COLUMNS} FROM approval_workflows
             WHERE ($1 = FALSE OR is_active)
             ORDER BY name ASC, id ASC"
        ))
        .bind(active_only)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(map_workflow).collect()
    }

    async fn get_workflow(&self, id: Uuid) -> StoreResult<Option<ApprovalWorkflow>> {
        let row = sqlx::query(&format!(
            "SELECT {WORKFLOW_COLUMNS} FROM approval_workflows WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(|row| map_workflow(&row)).transpose()
    }

    async fn insert_workflow(&self, workflow: &ApprovalWorkflow) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO approval_workflows
                 (id, name, description, category_id, min_days, max_days, approval_levels,
                  is_active, created_at, updated_at)
             VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10)",
        )
        .bind(workflow.id)
        .bind(&workflow.name)
        .bind(&workflow.description)
        .bind(workflow.category_id)
        .bind(workflow.min_days)
        .bind(workflow.max_days)
        .bind(Json(&workflow.approval_levels))
        .bind(workflow.is_active)
        .bind(workflow.created_at)
        .bind(workflow.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_workflow(&self, workflow: &ApprovalWorkflow) -> StoreResult<()> {
        let result = sqlx::query(
            "UPDATE approval_workflows
             SET name = $1, description = $2, category_id = $3, min_days = $4, max_days = $5,
                 approval_levels = $6, is_active = $7, updated_at = $8
             WHERE id = $9",
        )
        .bind(&workflow.name)
        .bind(&workflow.description)
        .bind(workflow.category_id)
        .bind(workflow.min_days)
        .bind(workflow.max_days)
        .bind(Json(&workflow.approval_levels))
        .bind(workflow.is_active)
        .bind(workflow.updated_at)
        .bind(workflow.id)
        .execute(&self.pool)
        .await?;
        ensure_affected(result.rows_affected())
    }

    async fn list_approver_types(&self, active_only: bool) -> StoreResult<Vec<ApproverType>> {
        let rows = sqlx::query(&format!(
            "SELECT {APPROVER_TYPE_COLUMNS} FROM approver_types
             WHERE ($1 = FALSE OR is_active)
             ORDER BY code ASC"
        ))
        .bind(active_only)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(map_approver_type).collect()
    }

    async fn get_approver_type(&self, id: Uuid) -> StoreResult<Option<ApproverType>> {
        let row = sqlx::query(&format!(
            "SELECT {APPROVER_TYPE_COLUMNS} FROM approver_types WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(|row| map_approver_type(&row)).transpose()
    }

    async fn insert_approver_type(&self, approver_type: &ApproverType) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO approver_types (id, name, code, description, is_active, created_at, updated_at)
             VALUES ($1,$2,$3,$4,$5,$6,$7)",
        )
        .bind(approver_type.id)
        .bind(&approver_type.name)
        .bind(approver_type.code.as_str())
        .bind(&approver_type.description)
        .bind(approver_type.is_active)
        .bind(approver_type.created_at)
        .bind(approver_type.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_approver_type(&self, approver_type: &ApproverType) -> StoreResult<()> {
        let result = sqlx::query(
            "UPDATE approver_types
             SET name = $1, code = $2, description = $3, is_active = $4, updated_at = $5
             WHERE id = $6",
        )
        .bind(&approver_type.name)
        .bind(approver_type.code.as_str())
        .bind(&approver_type.description)
        .bind(approver_type.is_active)
        .bind(approver_type.updated_at)
        .bind(approver_type.id)
        .execute(&self.pool)
        .await?;
        ensure_affected(result.rows_affected())
    }

    async fn delete_approver_type(&self, id: Uuid) -> StoreResult<()> {
        let result = sqlx::query("DELETE FROM approver_types WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        ensure_affected(result.rows_affected())
    }

    async fn list_categories(&self) -> StoreResult<Vec<WorkflowCategory>> {
        let rows = sqlx::query(&format!(
            "SELECT {CATEGORY_COLUMNS} FROM workflow_categories ORDER BY min_days ASC, id ASC"
        ))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(map_category).collect()
    }

    async fn get_category(&self, id: Uuid) -> StoreResult<Option<WorkflowCategory>> {
        let row = sqlx::query(&format!(
            "SELECT {CATEGORY_COLUMNS} FROM workflow_categories WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(|row| map_category(&row)).transpose()
    }

    async fn insert_category(&self, category: &WorkflowCategory) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO workflow_categories
                 (id, name, description, min_days, max_days, max_steps, is_active, created_at, updated_at)
             VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9)",
        )
        .bind(category.id)
        .bind(&category.name)
        .bind(&category.description)
        .bind(category.min_days)
        .bind(category.max_days)
        .bind(to_i32(category.max_steps)?)
        .bind(category.is_active)
        .bind(category.created_at)
        .bind(category.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_category(&self, category: &WorkflowCategory) -> StoreResult<()> {
        let result = sqlx::query(
            "UPDATE workflow_categories
             SET name = $1, description = $2, min_days = $3, max_days = $4, max_steps = $5,
                 is_active = $6, updated_at = $7
             WHERE id = $8",
        )
        .bind(&category.name)
        .bind(&category.description)
        .bind(category.min_days)
        .bind(category.max_days)
        .bind(to_i32(category.max_steps)?)
        .bind(category.is_active)
        .bind(category.updated_at)
        .bind(category.id)
        .execute(&self.pool)
        .await?;
        ensure_affected(result.rows_affected())
    }

    async fn list_levels(&self) -> StoreResult<Vec<WorkflowLevel>> {
        let rows = sqlx::query(&format!(
            "SELECT {LEVEL_COLUMNS} FROM workflow_levels ORDER BY level ASC"
        ))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(map_level).collect()
    }

    async fn insert_level(&self, level: &WorkflowLevel) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO workflow_levels (id, level, name, description, approver_type, fallback_roles, is_active)
             VALUES ($1,$2,$3,$4,$5,$6,$7)",
        )
        .bind(level.id)
        .bind(to_i32(level.level)?)
        .bind(&level.name)
        .bind(&level.description)
        .bind(level.approver_type.as_str())
        .bind(Json(&level.fallback_roles))
        .bind(level.is_active)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_level(&self, level: &WorkflowLevel) -> StoreResult<()> {
        let result = sqlx::query(
            "UPDATE workflow_levels
             SET level = $1, name = $2, description = $3, approver_type = $4,
                 fallback_roles = $5, is_active = $6
             WHERE id = $7",
        )
        .bind(to_i32(level.level)?)
        .bind(&level.name)
        .bind(&level.description)
        .bind(level.approver_type.as_str())
        .bind(Json(&level.fallback_roles))
        .bind(level.is_active)
        .bind(level.id)
        .execute(&self.pool)
        .await?;
        ensure_affected(result.rows_affected())
    }

    async fn replace_levels(&self, levels: &[WorkflowLevel]) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM workflow_levels")
            .execute(&mut *tx)
            .await?;
        for level in levels {
            sqlx::query(
                "INSERT INTO workflow_levels (id, level, name, description, approver_type, fallback_roles, is_active)
                 VALUES ($1,$2,$3,$4,$5,$6,$7)",
            )
            .bind(level.id)
            .bind(to_i32(level.level)?)
            .bind(&level.name)
            .bind(&level.description)
            .bind(level.approver_type.as_str())
            .bind(Json(&level.fallback_roles))
            .bind(level.is_active)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }
}

fn ensure_affected(rows: u64) -> StoreResult<()> {
    if rows == 0 {
        Err(StoreError::NotFound)
    } else {
        Ok(())
    }
}

fn to_i32(value: u32) -> StoreResult<i32> {
    i32::try_from(value).map_err(|_| StoreError::Backend(anyhow!("value {value} out of range")))
}

fn to_u32(value: i32, column: &str) -> StoreResult<u32> {
    u32::try_from(value)
        .map_err(|_| StoreError::Backend(anyhow!("negative value {value} in column {column}")))
}

fn parse_code(value: String) -> StoreResult<ApproverTypeCode> {
    ApproverTypeCode::parse(&value).map_err(|err| StoreError::Backend(anyhow!(err.to_string())))
}

fn map_leave_request(row: &PgRow) -> StoreResult<LeaveRequest> {
    let status = row
        .try_get::<String, _>("status")?
        .parse::<LeaveRequestStatus>()
        .map_err(|err| StoreError::Backend(anyhow!(err)))?;
    let Json(metadata): Json<ApprovalMetadata> = row.try_get("metadata")?;
    Ok(LeaveRequest {
        id: row.try_get("id")?,
        employee_id: row.try_get("employee_id")?,
        employee_name: row.try_get("employee_name")?,
        author_role: row.try_get::<Role, _>("author_role")?,
        department: row.try_get("department")?,
        duration_days: row.try_get("duration_days")?,
        status,
        metadata,
        version: row.try_get("version")?,
        balance_restored_at: row.try_get("balance_restored_at")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn map_actor(row: &PgRow) -> StoreResult<Actor> {
    let permissions: Vec<String> = row.try_get("custom_permissions")?;
    Ok(Actor {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        role: row.try_get::<Role, _>("role")?,
        custom_permissions: permissions.into_iter().collect(),
        department: row.try_get("department")?,
        is_active: row.try_get("is_active")?,
    })
}

fn map_workflow(row: &PgRow) -> StoreResult<ApprovalWorkflow> {
    let Json(approval_levels): Json<Vec<ApprovalStep>> = row.try_get("approval_levels")?;
    Ok(ApprovalWorkflow {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        category_id: row.try_get("category_id")?,
        min_days: row.try_get("min_days")?,
        max_days: row.try_get("max_days")?,
        approval_levels,
        is_active: row.try_get("is_active")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn map_approver_type(row: &PgRow) -> StoreResult<ApproverType> {
    Ok(ApproverType {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        code: parse_code(row.try_get("code")?)?,
        description: row.try_get("description")?,
        is_active: row.try_get("is_active")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn map_category(row: &PgRow) -> StoreResult<WorkflowCategory> {
    Ok(WorkflowCategory {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        min_days: row.try_get("min_days")?,
        max_days: row.try_get("max_days")?,
        max_steps: to_u32(row.try_get("max_steps")?, "max_steps")?,
        is_active: row.try_get("is_active")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn map_level(row: &PgRow) -> StoreResult<WorkflowLevel> {
    let Json(fallback_roles): Json<BTreeSet<Role>> = row.try_get("fallback_roles")?;
    Ok(WorkflowLevel {
        id: row.try_get("id")?,
        level: to_u32(row.try_get("level")?, "level")?,
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        approver_type: parse_code(row.try_get("approver_type")?)?,
        fallback_roles,
        is_active: row.try_get("is_active")?,
    })
}
