use std::{collections::BTreeSet, convert::TryFrom, fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use sqlx::{
    decode::Decode,
    encode::{Encode, IsNull},
    error::BoxDynError,
    postgres::{PgArgumentBuffer, PgHasArrayType, PgTypeInfo, PgValueRef},
    Postgres, Type, TypeInfo,
};
use uuid::Uuid;

/// Custom permission that grants administrator authority regardless of role.
pub const ADMIN_PERMISSION: &str = "admin";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(try_from = "String", into = "String")]
pub enum Role {
    Employee,
    TeamLead,
    Manager,
    DepartmentHead,
    Hr,
    Admin,
    SuperAdmin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Employee => "employee",
            Role::TeamLead => "team_lead",
            Role::Manager => "manager",
            Role::DepartmentHead => "department_head",
            Role::Hr => "hr",
            Role::Admin => "admin",
            Role::SuperAdmin => "super_admin",
        }
    }

    /// Position in the flat approver ranking. Roles outside the ranking are 0.
    pub fn approval_rank(&self) -> u8 {
        match self {
            Role::TeamLead => 1,
            Role::Manager => 2,
            Role::Hr => 3,
            Role::Admin => 4,
            Role::SuperAdmin => 5,
            Role::Employee | Role::DepartmentHead => 0,
        }
    }

    pub fn is_administrator(&self) -> bool {
        matches!(self, Role::Admin | Role::SuperAdmin)
    }

    // Accepts `team_lead`, `teamLead`, `team-lead` and `TEAM LEAD` alike.
    fn parse_normalized(value: &str) -> Result<Self, RoleParseError> {
        match value {
            "employee" => Ok(Role::Employee),
            "teamlead" => Ok(Role::TeamLead),
            "manager" => Ok(Role::Manager),
            "departmenthead" => Ok(Role::DepartmentHead),
            "hr" => Ok(Role::Hr),
            "admin" => Ok(Role::Admin),
            "superadmin" => Ok(Role::SuperAdmin),
            _ => Err(RoleParseError::new(value)),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for Role {
    type Error = RoleParseError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let normalized: String = value
            .trim()
            .chars()
            .filter(|c| !matches!(c, '_' | '-' | ' '))
            .map(|c| c.to_ascii_lowercase())
            .collect();
        Role::parse_normalized(&normalized).map_err(|_| RoleParseError::new(value))
    }
}

impl TryFrom<String> for Role {
    type Error = RoleParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Role::try_from(value.as_str())
    }
}

impl FromStr for Role {
    type Err = RoleParseError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Role::try_from(value)
    }
}

impl From<Role> for String {
    fn from(value: Role) -> Self {
        value.as_str().to_string()
    }
}

impl Type<Postgres> for Role {
    fn type_info() -> PgTypeInfo {
        PgTypeInfo::with_name("text")
    }

    fn compatible(ty: &PgTypeInfo) -> bool {
        matches!(ty.name(), "text" | "varchar" | "bpchar")
    }
}

impl PgHasArrayType for Role {
    fn array_type_info() -> PgTypeInfo {
        PgTypeInfo::with_name("_text")
    }
}

impl<'q> Encode<'q, Postgres> for Role {
    fn encode_by_ref(&self, buf: &mut PgArgumentBuffer) -> Result<IsNull, BoxDynError> {
        let value = self.as_str();
        <&str as Encode<Postgres>>::encode_by_ref(&value, buf)
    }

    fn size_hint(&self) -> usize {
        let value = self.as_str();
        <&str as Encode<Postgres>>::size_hint(&value)
    }
}

impl<'r> Decode<'r, Postgres> for Role {
    fn decode(value: PgValueRef<'r>) -> Result<Self, BoxDynError> {
        let raw = <&str as Decode<Postgres>>::decode(value)?;
        Role::try_from(raw).map_err(|err| Box::new(err) as BoxDynError)
    }
}

#[derive(Debug, Clone)]
pub struct RoleParseError {
    value: String,
}

impl RoleParseError {
    fn new(value: &str) -> Self {
        Self {
            value: value.to_owned(),
        }
    }
}

impl fmt::Display for RoleParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unsupported role value: {}", self.value)
    }
}

impl std::error::Error for RoleParseError {}

/// Validated approver-type code: lowercase ASCII letters, digits and
/// underscores, starting with a letter. camelCase and kebab-case input is
/// folded into snake_case before validation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ApproverTypeCode(String);

impl ApproverTypeCode {
    pub const SPECIFIC_USER: &'static str = "specific_user";
    const MAX_LEN: usize = 64;

    pub fn parse(value: &str) -> Result<Self, CodeParseError> {
        let mut code = String::with_capacity(value.len() + 4);
        let mut prev_lower = false;
        for c in value.trim().chars() {
            if c.is_ascii_uppercase() {
                if prev_lower {
                    code.push('_');
                }
                code.push(c.to_ascii_lowercase());
                prev_lower = false;
            } else if c == '-' || c == ' ' {
                code.push('_');
                prev_lower = false;
            } else {
                code.push(c);
                prev_lower = c.is_ascii_lowercase() || c.is_ascii_digit();
            }
        }

        let valid_chars = code
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');
        let starts_with_letter = code.chars().next().is_some_and(|c| c.is_ascii_lowercase());
        if !valid_chars || !starts_with_letter || code.len() > Self::MAX_LEN {
            return Err(CodeParseError {
                value: value.to_owned(),
            });
        }
        Ok(Self(code))
    }

    pub fn specific_user() -> Self {
        Self(Self::SPECIFIC_USER.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_specific_user(&self) -> bool {
        self.0 == Self::SPECIFIC_USER
    }

    /// Role whose holders satisfy this approver type, when the code names one.
    pub fn role(&self) -> Option<Role> {
        Role::try_from(self.0.as_str()).ok()
    }
}

impl fmt::Display for ApproverTypeCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for ApproverTypeCode {
    type Error = CodeParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        ApproverTypeCode::parse(&value)
    }
}

impl From<ApproverTypeCode> for String {
    fn from(value: ApproverTypeCode) -> Self {
        value.0
    }
}

impl From<Role> for ApproverTypeCode {
    fn from(value: Role) -> Self {
        Self(value.as_str().to_string())
    }
}

#[derive(Debug, Clone)]
pub struct CodeParseError {
    value: String,
}

impl fmt::Display for CodeParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "invalid approver type code `{}`: expected lowercase letters, digits and underscores",
            self.value
        )
    }
}

impl std::error::Error for CodeParseError {}

#[skip_serializing_none]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ApproverType {
    pub id: Uuid,
    pub name: String,
    pub code: ApproverTypeCode,
    pub description: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[skip_serializing_none]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowCategory {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub min_days: f64,
    pub max_days: f64,
    pub max_steps: u32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WorkflowCategory {
    pub fn contains(&self, duration_days: f64) -> bool {
        self.min_days <= duration_days && duration_days <= self.max_days
    }

    /// A category with no permitted steps approves automatically.
    pub fn auto_approves(&self) -> bool {
        self.max_steps == 0
    }
}

#[skip_serializing_none]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowLevel {
    pub id: Uuid,
    pub level: u32,
    pub name: String,
    pub description: Option<String>,
    pub approver_type: ApproverTypeCode,
    #[serde(default)]
    pub fallback_roles: BTreeSet<Role>,
    pub is_active: bool,
}

/// Who may act on a workflow step.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StepApprover {
    ApproverType {
        code: ApproverTypeCode,
        #[serde(default)]
        roles: BTreeSet<Role>,
    },
    SpecificUser {
        #[serde(rename = "userId")]
        user_id: Uuid,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalStep {
    pub level: u32,
    pub approver: StepApprover,
    #[serde(default)]
    pub fallback_roles: BTreeSet<Role>,
    #[serde(default)]
    pub department_specific: bool,
    #[serde(default = "default_required")]
    pub required: bool,
}

fn default_required() -> bool {
    true
}

impl ApprovalStep {
    pub fn approver_type_code(&self) -> &str {
        match &self.approver {
            StepApprover::ApproverType { code, .. } => code.as_str(),
            StepApprover::SpecificUser { .. } => ApproverTypeCode::SPECIFIC_USER,
        }
    }

    /// Roles that satisfy the step directly: the listed roles plus the role
    /// named by the approver type code.
    pub fn primary_roles(&self) -> BTreeSet<Role> {
        match &self.approver {
            StepApprover::ApproverType { code, roles } => {
                let mut all = roles.clone();
                all.extend(code.role());
                all
            }
            StepApprover::SpecificUser { .. } => BTreeSet::new(),
        }
    }
}

#[skip_serializing_none]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalWorkflow {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub category_id: Option<Uuid>,
    pub min_days: f64,
    pub max_days: f64,
    pub approval_levels: Vec<ApprovalStep>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ApprovalWorkflow {
    pub fn contains(&self, duration_days: f64) -> bool {
        self.min_days <= duration_days && duration_days <= self.max_days
    }

    pub fn range_width(&self) -> f64 {
        self.max_days - self.min_days
    }

    /// Levels that block approval, in ascending order.
    pub fn required_levels(&self) -> Vec<u32> {
        let mut levels: Vec<u32> = self
            .approval_levels
            .iter()
            .filter(|step| step.required)
            .map(|step| step.level)
            .collect();
        levels.sort_unstable();
        levels
    }

    pub fn references_approver_type(&self, code: &ApproverTypeCode) -> bool {
        self.approval_levels.iter().any(|step| match &step.approver {
            StepApprover::ApproverType { code: step_code, .. } => step_code == code,
            StepApprover::SpecificUser { .. } => code.is_specific_user(),
        })
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum LeaveRequestStatus {
    NotSubmitted,
    Pending,
    PartiallyApproved,
    Approved,
    Rejected,
    Cancelled,
    PendingDeletion,
}

impl LeaveRequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LeaveRequestStatus::NotSubmitted => "not_submitted",
            LeaveRequestStatus::Pending => "pending",
            LeaveRequestStatus::PartiallyApproved => "partially_approved",
            LeaveRequestStatus::Approved => "approved",
            LeaveRequestStatus::Rejected => "rejected",
            LeaveRequestStatus::Cancelled => "cancelled",
            LeaveRequestStatus::PendingDeletion => "pending_deletion",
        }
    }

    pub fn awaiting_decision(&self) -> bool {
        matches!(
            self,
            LeaveRequestStatus::Pending | LeaveRequestStatus::PartiallyApproved
        )
    }

    /// States from which no approval decision can move the request.
    pub fn is_decided(&self) -> bool {
        matches!(
            self,
            LeaveRequestStatus::Approved
                | LeaveRequestStatus::Rejected
                | LeaveRequestStatus::Cancelled
                | LeaveRequestStatus::PendingDeletion
        )
    }
}

impl fmt::Display for LeaveRequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LeaveRequestStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "not_submitted" => Ok(LeaveRequestStatus::NotSubmitted),
            "pending" => Ok(LeaveRequestStatus::Pending),
            "partially_approved" => Ok(LeaveRequestStatus::PartiallyApproved),
            "approved" => Ok(LeaveRequestStatus::Approved),
            "rejected" => Ok(LeaveRequestStatus::Rejected),
            "cancelled" => Ok(LeaveRequestStatus::Cancelled),
            "pending_deletion" => Ok(LeaveRequestStatus::PendingDeletion),
            other => Err(format!("unsupported leave request status: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalAction {
    Approve,
    Reject,
}

impl ApprovalAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApprovalAction::Approve => "approve",
            ApprovalAction::Reject => "reject",
        }
    }
}

impl FromStr for ApprovalAction {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "approve" => Ok(ApprovalAction::Approve),
            "reject" => Ok(ApprovalAction::Reject),
            other => Err(format!("unsupported approval action: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalDecision {
    Approved,
    Rejected,
}

#[skip_serializing_none]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalHistoryEntry {
    pub level: u32,
    pub approver_id: Uuid,
    pub approver_name: String,
    pub decision: ApprovalDecision,
    #[serde(alias = "approvedAt")]
    pub decided_at: DateTime<Utc>,
    pub comments: Option<String>,
}

/// Approval progress owned by a leave request. The workflow fields are a copy
/// taken at submission; later edits to the workflow never reach it.
#[skip_serializing_none]
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalMetadata {
    pub workflow_id: Option<Uuid>,
    pub workflow_name: Option<String>,
    pub current_approval_level: u32,
    #[serde(default)]
    pub required_approval_levels: Vec<u32>,
    #[serde(default)]
    pub steps: Vec<ApprovalStep>,
    #[serde(default)]
    pub approval_history: Vec<ApprovalHistoryEntry>,
}

impl ApprovalMetadata {
    /// Lowest required level not yet satisfied.
    pub fn next_required_level(&self) -> Option<u32> {
        self.required_approval_levels
            .iter()
            .copied()
            .filter(|level| *level > self.current_approval_level)
            .min()
    }

    pub fn step(&self, level: u32) -> Option<&ApprovalStep> {
        self.steps.iter().find(|step| step.level == level)
    }
}

#[skip_serializing_none]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LeaveRequest {
    pub id: Uuid,
    pub employee_id: Uuid,
    pub employee_name: String,
    pub author_role: Role,
    pub department: Option<String>,
    pub duration_days: f64,
    pub status: LeaveRequestStatus,
    pub metadata: ApprovalMetadata,
    pub version: i32,
    pub balance_restored_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[skip_serializing_none]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Actor {
    pub id: Uuid,
    pub name: String,
    pub role: Role,
    #[serde(default)]
    pub custom_permissions: BTreeSet<String>,
    pub department: Option<String>,
    pub is_active: bool,
}

impl Actor {
    pub fn has_admin_permission(&self) -> bool {
        self.custom_permissions
            .iter()
            .any(|permission| permission.eq_ignore_ascii_case(ADMIN_PERMISSION))
    }

    pub fn is_administrator(&self) -> bool {
        self.role.is_administrator() || self.has_admin_permission()
    }
}
