use std::time::Duration;

use thiserror::Error;
use uuid::Uuid;

use crate::task::FailureKind;

/// Why a dispatch ended in `FAILED`.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("No worker found for role {role}")]
    Unroutable { role: String },

    #[error("{role} ({id}) failed: {message}")]
    Execution {
        role: String,
        id: Uuid,
        message: String,
    },

    #[error("{role} ({id}) timed out after {after:?}")]
    Timeout {
        role: String,
        id: Uuid,
        after: Duration,
    },

    #[error("Internal fault: {0}")]
    Internal(String),
}

impl DispatchError {
    pub fn kind(&self) -> FailureKind {
        match self {
            DispatchError::Unroutable { .. } => FailureKind::UnroutableTask,
            DispatchError::Execution { .. } => FailureKind::ExecutionError,
            DispatchError::Timeout { .. } => FailureKind::Timeout,
            DispatchError::Internal(_) => FailureKind::InternalFault,
        }
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum RegistryError {
    #[error("role name must not be empty")]
    EmptyRole,

    #[error("worker {id} already serves role {existing}")]
    SharedInstance { id: Uuid, existing: String },
}
