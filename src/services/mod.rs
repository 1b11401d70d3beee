pub mod approvals;
pub mod approver_types;
pub mod categories;
pub mod errors;
pub mod levels;
pub mod workflows;

use crate::infrastructure::auth::AuthenticatedUser;

use self::errors::ServiceError;

/// Registry writes are reserved to administrators.
fn ensure_admin(user: &AuthenticatedUser) -> Result<(), ServiceError> {
    if user.is_administrator() {
        Ok(())
    } else {
        Err(ServiceError::Forbidden)
    }
}
