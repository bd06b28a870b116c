//! Complaint state machine and per-operation authorization
//!
//! ```text
//! SUBMITTED -> ACKNOWLEDGED -> IN_PROGRESS -> RESOLVED
//!     \______________\_______________\______-> REJECTED
//! ```
//!
//! RESOLVED and REJECTED are terminal. [`authorize`] is the single decision
//! point for who may view, change or delete a complaint.

use crate::error::{AuthorizationError, ConflictError, PortalError};
use crate::identity::Actor;
use crate::models::{ComplaintId, ComplaintStatus, ComplaintView, Role};
use crate::scoping::ComplaintScope;

use super::ComplaintPatch;

/// Whether `from -> to` is an edge of the state machine.
pub fn can_transition(from: ComplaintStatus, to: ComplaintStatus) -> bool {
    use ComplaintStatus::*;
    match (from, to) {
        (Submitted, Acknowledged) | (Acknowledged, InProgress) | (InProgress, Resolved) => true,
        (from, Rejected) => !from.is_terminal(),
        _ => false,
    }
}

#[derive(Debug, Clone, Copy)]
pub enum ComplaintOperation<'a> {
    View,
    Update(&'a ComplaintPatch),
    Delete,
}

impl ComplaintOperation<'_> {
    fn name(&self) -> &'static str {
        match self {
            ComplaintOperation::View => "view complaint",
            ComplaintOperation::Update(_) => "update complaint",
            ComplaintOperation::Delete => "delete complaint",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny(DenyReason),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DenyReason {
    /// The actor may not see the complaint at all.
    OutOfScope,
    RoleNotPermitted {
        operation: &'static str,
        reason: &'static str,
    },
    /// Owner edits are only allowed while SUBMITTED.
    Locked(ComplaintStatus),
    Terminal(ComplaintStatus),
    InvalidTransition {
        from: ComplaintStatus,
        to: ComplaintStatus,
    },
}

impl DenyReason {
    /// Out-of-scope is reported as not-found so existence is never confirmed.
    pub fn into_error(self, complaint_id: ComplaintId) -> PortalError {
        match self {
            DenyReason::OutOfScope => PortalError::not_found("complaint", complaint_id),
            DenyReason::RoleNotPermitted { operation, reason } => AuthorizationError::NotPermitted {
                operation: operation.to_string(),
                reason: reason.to_string(),
            }
            .into(),
            DenyReason::Locked(status) => ConflictError::ComplaintLocked { status }.into(),
            DenyReason::Terminal(status) => ConflictError::TerminalComplaint { status }.into(),
            DenyReason::InvalidTransition { from, to } => {
                ConflictError::InvalidTransition { from, to }.into()
            }
        }
    }
}

pub fn authorize(actor: &Actor, operation: ComplaintOperation<'_>, view: &ComplaintView) -> Decision {
    if !ComplaintScope::for_actor(actor).admits(view) {
        return Decision::Deny(DenyReason::OutOfScope);
    }
    let status = view.complaint.status;

    match (actor.role, operation) {
        (_, ComplaintOperation::View) => Decision::Allow,

        (Role::Admin, ComplaintOperation::Delete) => Decision::Allow,
        (Role::Staff, ComplaintOperation::Delete) => Decision::Deny(DenyReason::RoleNotPermitted {
            operation: operation.name(),
            reason: "council staff cannot delete complaints",
        }),
        (Role::Citizen, ComplaintOperation::Delete) => {
            if status == ComplaintStatus::Submitted {
                Decision::Allow
            } else {
                Decision::Deny(DenyReason::Locked(status))
            }
        }

        (role, ComplaintOperation::Update(patch)) => {
            if status.is_terminal() {
                return Decision::Deny(DenyReason::Terminal(status));
            }
            match role {
                Role::Citizen => {
                    if status != ComplaintStatus::Submitted {
                        return Decision::Deny(DenyReason::Locked(status));
                    }
                    if patch.touches_triage() {
                        return Decision::Deny(DenyReason::RoleNotPermitted {
                            operation: operation.name(),
                            reason: "status and priority are read-only for citizens",
                        });
                    }
                }
                Role::Staff => {
                    if patch.touches_content() {
                        return Decision::Deny(DenyReason::RoleNotPermitted {
                            operation: operation.name(),
                            reason: "council staff may only change status and priority",
                        });
                    }
                }
                Role::Admin => {}
            }
            match patch.status {
                Some(to) if to != status && !can_transition(status, to) => {
                    Decision::Deny(DenyReason::InvalidTransition { from: status, to })
                }
                _ => Decision::Allow,
            }
        }
    }
}
