//! Fake workers and sinks shared by the unit tests.

use std::sync::Mutex;
use std::time::Duration;

use anyhow::{Result, anyhow};
use async_trait::async_trait;

use crate::task::Payload;
use crate::traits::{Status, StatusObservation, StatusSink, Vitals, Worker};

pub enum Behavior {
    Echo,
    Fail,
    Panic,
    Sleep(Duration),
}

pub struct FakeWorker {
    role: &'static str,
    behavior: Behavior,
    vitals: Vitals,
    max_seen_busy: Mutex<usize>,
    in_flight: Mutex<usize>,
    started: Mutex<Vec<Payload>>,
}

impl FakeWorker {
    pub fn new(role: &'static str, behavior: Behavior) -> Self {
        FakeWorker {
            role,
            behavior,
            vitals: Vitals::new(format!("fake-{}", role.to_lowercase())),
            max_seen_busy: Mutex::new(0),
            in_flight: Mutex::new(0),
            started: Mutex::new(Vec::new()),
        }
    }

    pub fn echo(role: &'static str) -> Self {
        Self::new(role, Behavior::Echo)
    }

    pub fn failing(role: &'static str) -> Self {
        Self::new(role, Behavior::Fail)
    }

    pub fn panicking(role: &'static str) -> Self {
        Self::new(role, Behavior::Panic)
    }

    pub fn sleepy(role: &'static str, nap: Duration) -> Self {
        Self::new(role, Behavior::Sleep(nap))
    }

    /// Payloads in the order `process` picked them up.
    pub fn started(&self) -> Vec<Payload> {
        self.started.lock().unwrap().clone()
    }

    /// Highest number of overlapping `process` calls observed.
    pub fn max_overlap(&self) -> usize {
        *self.max_seen_busy.lock().unwrap()
    }
}

#[async_trait]
impl Worker for FakeWorker {
    fn role(&self) -> &'static str {
        self.role
    }

    fn description(&self) -> &'static str {
        "Test double"
    }

    fn skills(&self) -> &'static [&'static str] {
        &["echo"]
    }

    fn vitals(&self) -> &Vitals {
        &self.vitals
    }

    async fn process(&self, payload: &Payload) -> Result<Payload> {
        self.started.lock().unwrap().push(payload.clone());
        {
            let mut in_flight = self.in_flight.lock().unwrap();
            *in_flight += 1;
            let mut max = self.max_seen_busy.lock().unwrap();
            *max = (*max).max(*in_flight);
        }

        let outcome = match &self.behavior {
            Behavior::Echo => Ok(payload.clone()),
            Behavior::Fail => Err(anyhow!("backend unavailable")),
            Behavior::Panic => panic!("worker blew up"),
            Behavior::Sleep(nap) => {
                tokio::time::sleep(*nap).await;
                Ok(payload.clone())
            }
        };

        *self.in_flight.lock().unwrap() -= 1;
        outcome
    }
}

/// Sink that keeps every observation, or refuses them all.
#[derive(Default)]
pub struct Recorder {
    refuse: bool,
    delay: Option<Duration>,
    seen: Mutex<Vec<StatusObservation>>,
}

impl Recorder {
    /// Takes `delay` to accept each observation.
    pub fn slow(delay: Duration) -> Self {
        Recorder {
            delay: Some(delay),
            ..Default::default()
        }
    }

    pub fn refusing() -> Self {
        Recorder {
            refuse: true,
            ..Default::default()
        }
    }

    pub fn observations(&self) -> Vec<StatusObservation> {
        self.seen.lock().unwrap().clone()
    }

    pub fn count(&self, status: Status) -> usize {
        self.seen
            .lock()
            .unwrap()
            .iter()
            .filter(|o| o.status == status)
            .count()
    }
}

#[async_trait]
impl StatusSink for Recorder {
    async fn emit(&self, observation: &StatusObservation) -> Result<()> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.refuse {
            return Err(anyhow!("collector offline"));
        }
        self.seen.lock().unwrap().push(observation.clone());
        Ok(())
    }
}
