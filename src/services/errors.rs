use axum::http::StatusCode;
use thiserror::Error;

use crate::{
    domain::{approval_flow::TransitionError, models::LeaveRequestStatus},
    infrastructure::store::StoreError,
};

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("not found")]
    NotFound,
    #[error("forbidden")]
    Forbidden,
    #[error("validation error: {}", .0.join("; "))]
    Validation(Vec<String>),
    #[error("{0}")]
    OutOfOrderApproval(TransitionError),
    #[error("leave request is already {0}")]
    TerminalState(LeaveRequestStatus),
    #[error("{0}")]
    InvalidTransition(TransitionError),
    #[error("conflict")]
    Conflict,
    #[error("internal error: {0}")]
    Internal(String),
}

impl ServiceError {
    pub fn validation(message: impl Into<String>) -> Self {
        ServiceError::Validation(vec![message.into()])
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ServiceError::NotFound => StatusCode::NOT_FOUND,
            ServiceError::Forbidden => StatusCode::FORBIDDEN,
            ServiceError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ServiceError::OutOfOrderApproval(_)
            | ServiceError::TerminalState(_)
            | ServiceError::InvalidTransition(_)
            | ServiceError::Conflict => StatusCode::CONFLICT,
            ServiceError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable machine-readable code returned next to the message.
    pub fn code(&self) -> &'static str {
        match self {
            ServiceError::NotFound => "not_found",
            ServiceError::Forbidden => "permission_denied",
            ServiceError::Validation(_) => "validation_error",
            ServiceError::OutOfOrderApproval(_) => "out_of_order_approval",
            ServiceError::TerminalState(_) => "terminal_state",
            ServiceError::InvalidTransition(_) => "invalid_transition",
            ServiceError::Conflict => "concurrent_modification",
            ServiceError::Internal(_) => "internal_error",
        }
    }

    /// Only a lost optimistic version race is safe to retry after a re-read.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ServiceError::Conflict)
    }
}

impl From<TransitionError> for ServiceError {
    fn from(err: TransitionError) -> Self {
        match err {
            TransitionError::OutOfOrderApproval { .. } => ServiceError::OutOfOrderApproval(err),
            TransitionError::TerminalState(status) => ServiceError::TerminalState(status),
            TransitionError::InvalidState { .. } | TransitionError::NoPendingLevel => {
                ServiceError::InvalidTransition(err)
            }
        }
    }
}

impl From<StoreError> for ServiceError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => ServiceError::NotFound,
            StoreError::Conflict => ServiceError::Conflict,
            StoreError::Duplicate(detail) => {
                ServiceError::validation(format!("duplicate record: {detail}"))
            }
            StoreError::Backend(err) => ServiceError::Internal(err.to_string()),
        }
    }
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let mut messages: Vec<String> = errors
            .field_errors()
            .into_iter()
            .flat_map(|(field, failures)| {
                failures.iter().map(move |failure| match &failure.message {
                    Some(message) => format!("{field}: {message}"),
                    None => format!("{field}: {}", failure.code),
                })
            })
            .collect();
        messages.sort();
        ServiceError::Validation(messages)
    }
}
