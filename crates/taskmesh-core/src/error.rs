//! Core domain errors.

use thiserror::Error;

use crate::TaskStatus;

/// Core domain errors for TaskMesh.
///
/// Every variant carries a stable machine-readable [`code`](CoreError::code)
/// that travels in the API envelope next to the human message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    /// A required request field was empty or absent.
    #[error("{0} is required")]
    MissingField(&'static str),

    /// Request was malformed in some other way.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Node not found.
    #[error("node not found: {0}")]
    NodeNotFound(String),

    /// Registration handle is unknown or stale.
    #[error("registration not found: {0}")]
    RegistrationNotFound(String),

    /// Task not found.
    #[error("task not found: {0}")]
    TaskNotFound(String),

    /// Agent not found.
    #[error("agent not found: {repo}/{name}")]
    AgentNotFound { repo: String, name: String },

    /// Transition not present in the task state table.
    #[error("invalid transition from {from} to {to}")]
    InvalidTransition { from: TaskStatus, to: TaskStatus },

    /// Claim lost to another worker.
    #[error("task {task_id} already claimed by {claimed_by}")]
    AlreadyClaimed { task_id: String, claimed_by: String },

    /// Claim attempted on a task that is not pending and has no claimant.
    #[error("task {task_id} is not pending (status: {status})")]
    NotPending { task_id: String, status: TaskStatus },
}

impl CoreError {
    /// Stable error code used in API responses.
    pub fn code(&self) -> &'static str {
        match self {
            Self::MissingField(_) => "MISSING_FIELD",
            Self::InvalidRequest(_) => "INVALID_REQUEST",
            Self::NodeNotFound(_)
            | Self::RegistrationNotFound(_)
            | Self::TaskNotFound(_)
            | Self::AgentNotFound { .. } => "NOT_FOUND",
            Self::InvalidTransition { .. } => "INVALID_TRANSITION",
            Self::AlreadyClaimed { .. } => "ALREADY_CLAIMED",
            Self::NotPending { .. } => "NOT_PENDING",
        }
    }

    /// Returns true for errors that mean "the thing does not exist".
    pub fn is_not_found(&self) -> bool {
        self.code() == "NOT_FOUND"
    }

    /// Returns true for claim conflicts, which callers treat as data.
    pub fn is_claim_conflict(&self) -> bool {
        matches!(self, Self::AlreadyClaimed { .. } | Self::NotPending { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transition_message() {
        let err = CoreError::InvalidTransition {
            from: TaskStatus::Completed,
            to: TaskStatus::Pending,
        };
        assert_eq!(err.to_string(), "invalid transition from completed to pending");
        assert_eq!(err.code(), "INVALID_TRANSITION");
    }

    #[test]
    fn test_claim_conflict_messages_differ() {
        let claimed = CoreError::AlreadyClaimed {
            task_id: "t1".into(),
            claimed_by: "w1@n1".into(),
        };
        let not_pending = CoreError::NotPending {
            task_id: "t1".into(),
            status: TaskStatus::Completed,
        };
        assert!(claimed.to_string().contains("already claimed by w1@n1"));
        assert!(not_pending.to_string().contains("not pending"));
        assert!(claimed.is_claim_conflict() && not_pending.is_claim_conflict());
    }
}
