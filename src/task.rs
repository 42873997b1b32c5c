use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::DispatchError;

/// Payloads and results are always JSON objects.
pub type Payload = Map<String, Value>;

/// A caller-supplied work request.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct Task {
    #[serde(rename = "type")]
    pub task_type: String,
    pub payload: Payload,
}

impl Task {
    pub fn new(task_type: impl Into<String>, payload: Payload) -> Self {
        Task {
            task_type: task_type.into(),
            payload,
        }
    }
}

#[derive(Serialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailureKind {
    UnroutableTask,
    ExecutionError,
    Timeout,
    InternalFault,
    BadRequest,
}

/// The envelope every dispatch hands back to the caller.
#[derive(Serialize, Clone, Debug, PartialEq)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum DispatchResult {
    Success {
        result: Payload,
    },
    Error {
        message: String,
        kind: FailureKind,
        #[serde(skip_serializing_if = "Option::is_none")]
        code: Option<u16>,
    },
}

impl DispatchResult {
    pub fn success(result: Payload) -> Self {
        DispatchResult::Success { result }
    }

    pub fn failure(err: &DispatchError) -> Self {
        DispatchResult::Error {
            message: err.to_string(),
            kind: err.kind(),
            code: None,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, DispatchResult::Success { .. })
    }
}
