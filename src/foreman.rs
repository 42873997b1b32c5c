use std::sync::Arc;
use std::time::Duration;

use serde_json::{Value, json};
use tracing::{debug, error, info, warn};

use crate::classifier::classify;
use crate::error::DispatchError;
use crate::registry::Registry;
use crate::task::{DispatchResult, Payload, Task};
use crate::traits::{Execution, StatusSink, Worker, WorkerSnapshot};

/// How the Foreman treats routing misses, slow workers and shared workers.
#[derive(Clone, Debug)]
pub struct DispatchPolicy {
    /// Role to use when the classified role has no worker. `None` fails the task.
    pub fallback_role: Option<String>,
    pub timeout: Option<Duration>,
    /// Queue dispatches so each worker runs one task at a time.
    pub exclusive: bool,
}

impl Default for DispatchPolicy {
    fn default() -> Self {
        DispatchPolicy {
            fallback_role: None,
            timeout: None,
            exclusive: true,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Stage {
    Received,
    Classified,
    WorkerResolved,
    Executing,
    Completed,
    Failed,
}

/// The task router. Classifies each task and hands it to the worker for its role.
pub struct Foreman {
    registry: Registry,
    sink: Arc<dyn StatusSink>,
    policy: DispatchPolicy,
}

impl Foreman {
    pub fn new(registry: Registry, sink: Arc<dyn StatusSink>, policy: DispatchPolicy) -> Foreman {
        if let Some(role) = &policy.fallback_role {
            if !registry.contains(role) {
                warn!(role = %role, "fallback role has no registered worker");
            }
        }

        Foreman {
            registry,
            sink,
            policy,
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Route one task. Always produces an envelope; failures never escape.
    pub async fn dispatch(&self, task: &Task) -> DispatchResult {
        stage(task, Stage::Received);

        match self.run(task).await {
            Ok(result) => {
                stage(task, Stage::Completed);
                DispatchResult::success(result)
            }
            Err(e) => {
                stage(task, Stage::Failed);
                match &e {
                    DispatchError::Unroutable { .. } => info!(task_type = %task.task_type, error = %e, "task not routed"),
                    _ => error!(task_type = %task.task_type, kind = ?e.kind(), error = %e, "dispatch failed"),
                }
                DispatchResult::failure(&e)
            }
        }
    }

    async fn run(&self, task: &Task) -> Result<Payload, DispatchError> {
        let role = classify(task);
        stage(task, Stage::Classified);

        let worker = self.resolve(role)?;
        stage(task, Stage::WorkerResolved);
        info!(task_type = %task.task_type, role = worker.role(), worker = worker.vitals().name(), "assigning task");

        stage(task, Stage::Executing);
        self.execute(worker, task.payload.clone()).await
    }

    fn resolve(&self, role: &str) -> Result<Arc<dyn Worker>, DispatchError> {
        if let Some(worker) = self.registry.lookup(role) {
            return Ok(worker);
        }

        let fallback = self
            .policy
            .fallback_role
            .as_deref()
            .and_then(|fallback| self.registry.lookup(fallback).map(|w| (fallback, w)));

        match fallback {
            Some((fallback, worker)) => {
                warn!(role, fallback, "no worker for role, using fallback");
                Ok(worker)
            }
            None => Err(DispatchError::Unroutable {
                role: role.to_string(),
            }),
        }
    }

    /// Runs the worker on its own task so a panic is contained here.
    async fn execute(&self, worker: Arc<dyn Worker>, payload: Payload) -> Result<Payload, DispatchError> {
        let role = worker.role().to_string();
        let id = worker.vitals().id();
        let exclusive = self.policy.exclusive;
        let limit = self.policy.timeout;

        let handle = {
            let worker = worker.clone();
            let sink = self.sink.clone();
            tokio::spawn(async move {
                let _slot = match exclusive {
                    true => Some(worker.vitals().gate().lock().await),
                    false => None,
                };

                match limit {
                    Some(_) => worker.execute_within(&payload, sink.as_ref(), limit).await,
                    None => Execution::Finished(worker.execute(&payload, sink.as_ref()).await),
                }
            })
        };

        let joined = handle.await;
        if !matches!(joined, Ok(Execution::Finished(_))) {
            worker.vitals().force_idle();
        }
        if joined.is_err() {
            // The worker never got to publish its idle state.
            worker.report_status(self.sink.as_ref()).await;
        }

        match joined {
            Ok(Execution::Finished(Ok(result))) => Ok(result),
            Ok(Execution::Finished(Err(e))) => Err(DispatchError::Execution {
                role,
                id,
                message: format!("{e:#}"),
            }),
            Ok(Execution::TimedOut(after)) => Err(DispatchError::Timeout { role, id, after }),
            Err(join) if join.is_panic() => Err(DispatchError::Execution {
                role,
                id,
                message: panic_message(join.into_panic()),
            }),
            Err(join) => Err(DispatchError::Internal(format!("execution task for {role} ended: {join}"))),
        }
    }

    pub fn roster(&self) -> Vec<WorkerSnapshot> {
        self.registry.snapshot()
    }

    pub fn system_info(&self) -> Value {
        json!({
            "system": "hive-foreman",
            "status": "online",
            "mode": if self.policy.fallback_role.is_some() { "fallback" } else { "strict" },
            "workers": self.roster(),
        })
    }
}

fn stage(task: &Task, stage: Stage) {
    debug!(task_type = %task.task_type, stage = ?stage, "dispatch stage");
}

fn panic_message(panic: Box<dyn std::any::Any + Send>) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        format!("worker panicked: {message}")
    } else if let Some(message) = panic.downcast_ref::<String>() {
        format!("worker panicked: {message}")
    } else {
        "worker panicked".to_string()
    }
}
