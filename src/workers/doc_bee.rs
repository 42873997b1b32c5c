use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use phf::phf_map;
use serde_json::{Value, json};

use crate::classifier::DOC_ROLE;
use crate::task::Payload;
use crate::traits::{Vitals, Worker, WorkerFactory};

inventory::submit! {
    WorkerFactory(|| Arc::new(DocBee::default()))
}

type Action = fn(&str) -> Payload;

static ACTIONS: phf::Map<&'static str, Action> = phf_map! {
    "summarize" => summarize as Action,
    "draft" => draft as Action,
    "edit" => edit as Action,
};

const DRAFT_PREVIEW_CHARS: usize = 20;

/// Text, documentation and synthesis specialist.
pub struct DocBee {
    vitals: Vitals,
}

#[async_trait]
impl Worker for DocBee {
    fn role(&self) -> &'static str {
        DOC_ROLE
    }

    fn description(&self) -> &'static str {
        "Summarizes, drafts and edits text and documentation."
    }

    fn skills(&self) -> &'static [&'static str] {
        &["summarize", "draft", "edit"]
    }

    fn vitals(&self) -> &Vitals {
        &self.vitals
    }

    async fn process(&self, payload: &Payload) -> Result<Payload> {
        let action = payload.get("action").and_then(Value::as_str);
        tracing::debug!(role = DOC_ROLE, action = ?action, "received task");

        let Some(run) = action.and_then(|a| ACTIONS.get(a)) else {
            return Ok(rejection("Unknown action", action));
        };
        let Some(content) = payload.get("content").and_then(Value::as_str) else {
            return Ok(rejection("Missing content", action));
        };

        Ok(run(content))
    }
}

impl DocBee {
    pub fn new() -> Self {
        DocBee {
            vitals: Vitals::new("Scribe-Alpha"),
        }
    }
}

impl Default for DocBee {
    fn default() -> Self {
        Self::new()
    }
}

fn summarize(content: &str) -> Payload {
    let chars = content.chars().count();
    let words = content.split_whitespace().count();
    object(json!({
        "summary": format!("Processed {chars} chars. Content has {words} words."),
    }))
}

fn draft(content: &str) -> Payload {
    let preview: String = content.chars().take(DRAFT_PREVIEW_CHARS).collect();
    object(json!({
        "draft": format!("# Draft\nGenerated content based on: {preview}..."),
    }))
}

fn edit(content: &str) -> Payload {
    let edited = content.split_whitespace().collect::<Vec<_>>().join(" ");
    object(json!({ "edited": edited }))
}

/// Payload problems come back as data so the dispatch still succeeds.
fn rejection(reason: &str, action: Option<&str>) -> Payload {
    object(json!({
        "error": reason,
        "action": action,
        "kind": "ValidationError",
    }))
}

fn object(value: Value) -> Payload {
    match value {
        Value::Object(map) => map,
        _ => Payload::new(),
    }
}
