use std::collections::HashMap;
use std::sync::Arc;

use crate::error::RegistryError;
use crate::traits::{Worker, WorkerFactory, WorkerSnapshot};

/// Owns one live worker per role.
#[derive(Default)]
pub struct Registry {
    workers: HashMap<String, Arc<dyn Worker>>,
}

impl Registry {
    pub fn new() -> Registry {
        Registry::default()
    }

    /// One worker per submitted factory, keyed by the role it declares.
    pub fn from_factories() -> Registry {
        let mut registry = Registry::new();

        for factory in inventory::iter::<WorkerFactory> {
            let worker = (factory.0)();
            let role = worker.role();
            match registry.register(role, worker) {
                Ok(Some(_)) => tracing::warn!(role, "duplicate worker factory, keeping the last one"),
                Ok(None) => {}
                Err(e) => tracing::error!(role, error = %e, "worker factory rejected"),
            }
        }

        registry
    }

    /// Insert or hot-swap the worker for `role`, handing back the one it replaced.
    pub fn register(
        &mut self,
        role: impl Into<String>,
        worker: Arc<dyn Worker>,
    ) -> Result<Option<Arc<dyn Worker>>, RegistryError> {
        let role = role.into();
        if role.is_empty() {
            return Err(RegistryError::EmptyRole);
        }

        let id = worker.vitals().id();
        if let Some((existing, _)) = self
            .workers
            .iter()
            .find(|(r, w)| **r != role && w.vitals().id() == id)
        {
            return Err(RegistryError::SharedInstance {
                id,
                existing: existing.clone(),
            });
        }

        tracing::debug!(role = %role, worker = worker.vitals().name(), %id, "worker registered");
        Ok(self.workers.insert(role, worker))
    }

    pub fn lookup(&self, role: &str) -> Option<Arc<dyn Worker>> {
        self.workers.get(role).cloned()
    }

    #[cfg(test)]
    pub fn remove(&mut self, role: &str) -> Option<Arc<dyn Worker>> {
        self.workers.remove(role)
    }

    pub fn contains(&self, role: &str) -> bool {
        self.workers.contains_key(role)
    }

    /// Registered roles, sorted.
    pub fn roles(&self) -> Vec<&str> {
        let mut roles: Vec<&str> = self.workers.keys().map(String::as_str).collect();
        roles.sort_unstable();
        roles
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    pub fn snapshot(&self) -> Vec<WorkerSnapshot> {
        let mut snapshots: Vec<WorkerSnapshot> =
            self.workers.values().map(|w| w.snapshot()).collect();
        snapshots.sort_by(|a, b| a.role.cmp(&b.role));
        snapshots
    }
}
