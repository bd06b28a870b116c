//! Error handling for the civic portal
//!
//! Every operation returns [`PortalResult`]. The top-level [`PortalError`]
//! wraps one enum per failure family so callers can match on the family
//! (validation, authorization, state conflict, not-found, external service)
//! without caring which component raised it.

use std::fmt;

use rust_decimal::Decimal;
use thiserror::Error;

use crate::models::{ComplaintStatus, Role};

/// Main error type for the portal
#[derive(Error, Debug)]
pub enum PortalError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Authorization error: {0}")]
    Authorization(#[from] AuthorizationError),

    #[error("State conflict: {0}")]
    Conflict(#[from] ConflictError),

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    #[error("External service error: {0}")]
    External(#[from] ExternalServiceError),

    #[error("Storage error: {0}")]
    Storage(#[from] anyhow::Error),
}

/// Malformed input, reported against the offending field
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Role, ownership, or session failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthorizationError {
    #[error("Authentication required")]
    Unauthenticated,

    #[error("Operation requires role {required}, caller is {actual}")]
    RoleMismatch { required: String, actual: Role },

    #[error("Not permitted to {operation}: {reason}")]
    NotPermitted { operation: String, reason: String },
}

/// Requests that are well-formed but clash with the current state
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConflictError {
    #[error("Complaint can only be changed by its owner while SUBMITTED (currently {status})")]
    ComplaintLocked { status: ComplaintStatus },

    #[error("Complaint is {status} and can no longer be changed")]
    TerminalComplaint { status: ComplaintStatus },

    #[error("Cannot move complaint from {from} to {to}")]
    InvalidTransition {
        from: ComplaintStatus,
        to: ComplaintStatus,
    },

    #[error("Bill is already paid")]
    AlreadyPaid,

    #[error("Maximum installments already used ({used} of {max})")]
    InstallmentLimitReached { used: i32, max: i32 },

    #[error("Pay amount {requested} exceeds remaining balance {remaining}")]
    AmountExceedsBalance {
        requested: Decimal,
        remaining: Decimal,
    },
}

/// Failure talking to the payment provider or another collaborator
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{service}: {message}")]
pub struct ExternalServiceError {
    pub service: &'static str,
    pub message: String,
    /// Retrying the same call later may succeed; no local state was changed.
    pub retryable: bool,
}

/// Coarse classification used by the HTTP layer and by logging
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Unauthenticated,
    Authorization,
    StateConflict,
    NotFound,
    ExternalService,
    Internal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ErrorKind::Validation => "validation",
            ErrorKind::Unauthenticated => "unauthenticated",
            ErrorKind::Authorization => "authorization",
            ErrorKind::StateConflict => "state_conflict",
            ErrorKind::NotFound => "not_found",
            ErrorKind::ExternalService => "external_service",
            ErrorKind::Internal => "internal",
        };
        f.write_str(label)
    }
}

impl PortalError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PortalError::Validation(_) => ErrorKind::Validation,
            PortalError::Authorization(AuthorizationError::Unauthenticated) => {
                ErrorKind::Unauthenticated
            }
            PortalError::Authorization(_) => ErrorKind::Authorization,
            PortalError::Conflict(_) => ErrorKind::StateConflict,
            PortalError::NotFound { .. } => ErrorKind::NotFound,
            PortalError::External(_) => ErrorKind::ExternalService,
            PortalError::Storage(_) => ErrorKind::Internal,
        }
    }

    /// Out-of-scope records are reported exactly like missing ones.
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        PortalError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        PortalError::Validation(ValidationError::new(field, message))
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, PortalError::External(e) if e.retryable)
    }
}

/// Result type alias for convenience
pub type PortalResult<T> = Result<T, PortalError>;
