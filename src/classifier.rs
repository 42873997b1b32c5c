//! Rule-based task classification.
//!
//! Rules are checked in order and the first match wins:
//! 1. `text`, `doc` or `write` in the task type → documentation role
//! 2. `code` in the task type → code role (may not be registered yet)
//! 3. anything else → documentation role

use crate::task::Task;

/// Documentation and synthesis specialist.
pub const DOC_ROLE: &str = "DocBee";

/// Code specialist. No worker ships for it yet.
pub const CODE_ROLE: &str = "CodeBee";

const DEFAULT_ROLE: &str = DOC_ROLE;

const RULES: &[(&[&str], &str)] = &[
    (&["text", "doc", "write"], DOC_ROLE),
    (&["code"], CODE_ROLE),
];

/// Role required to handle `task`.
pub fn classify(task: &Task) -> &'static str {
    classify_type(&task.task_type)
}

pub fn classify_type(task_type: &str) -> &'static str {
    let task_type = task_type.to_lowercase();

    RULES
        .iter()
        .find(|(keywords, _)| keywords.iter().any(|kw| task_type.contains(kw)))
        .map(|(_, role)| *role)
        .unwrap_or(DEFAULT_ROLE)
}
