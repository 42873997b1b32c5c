//! Boundary checks for raw task bodies, applied before anything reaches the Foreman.

use serde_json::Value;
use thiserror::Error;

use crate::task::{DispatchResult, FailureKind, Payload, Task};

#[derive(Debug, Error, PartialEq)]
pub enum IntakeError {
    #[error("Malformed task body: {0}")]
    Malformed(String),

    #[error("Task body must be a JSON object")]
    NotAnObject,

    #[error("Task type required")]
    MissingType,

    #[error("Task payload required")]
    MissingPayload,

    #[error("Task payload must be a JSON object")]
    InvalidPayload,
}

impl IntakeError {
    /// HTTP-equivalent status for the rejection.
    pub fn status_code(&self) -> u16 {
        400
    }

    pub fn into_envelope(self) -> DispatchResult {
        DispatchResult::Error {
            code: Some(self.status_code()),
            message: self.to_string(),
            kind: FailureKind::BadRequest,
        }
    }
}

#[cfg(test)]
pub fn parse_task(body: &str) -> Result<Task, IntakeError> {
    parse_request(body).1
}

/// Parse one request line. The caller's optional `id` is handed back
/// alongside the task so replies can be matched to requests.
pub fn parse_request(body: &str) -> (Option<Value>, Result<Task, IntakeError>) {
    let value: Value = match serde_json::from_str(body) {
        Ok(value) => value,
        Err(e) => return (None, Err(IntakeError::Malformed(e.to_string()))),
    };
    let id = value.get("id").filter(|id| !id.is_null()).cloned();
    (id, validate(value))
}

/// `type` must be a non-empty string and `payload` must be present.
/// A `null` payload counts as an empty one.
pub fn validate(body: Value) -> Result<Task, IntakeError> {
    let Value::Object(mut body) = body else {
        return Err(IntakeError::NotAnObject);
    };

    let task_type = match body.remove("type") {
        Some(Value::String(t)) if !t.is_empty() => t,
        _ => return Err(IntakeError::MissingType),
    };

    let payload = match body.remove("payload") {
        None => return Err(IntakeError::MissingPayload),
        Some(Value::Null) => Payload::new(),
        Some(Value::Object(map)) => map,
        Some(_) => return Err(IntakeError::InvalidPayload),
    };

    Ok(Task::new(task_type, payload))
}
