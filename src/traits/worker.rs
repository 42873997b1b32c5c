use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use jiff::Timestamp;
use serde::Serialize;
use tokio::sync::Mutex as Gate;
use uuid::Uuid;

use crate::task::Payload;
use crate::traits::sink::{REPORT_TIMEOUT, StatusObservation, StatusSink};

#[derive(Serialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum Status {
    Idle = 0,
    Busy = 1,
    Offline = 2,
}

impl Status {
    fn from_u8(value: u8) -> Status {
        match value {
            0 => Status::Idle,
            1 => Status::Busy,
            _ => Status::Offline,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Idle => "idle",
            Status::Busy => "busy",
            Status::Offline => "offline",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity and lifecycle state every worker carries.
///
/// Status and heartbeat are written through `&self` so a worker shared
/// between in-flight dispatches can still track itself.
pub struct Vitals {
    id: Uuid,
    name: String,
    status: AtomicU8,
    last_heartbeat: Mutex<Timestamp>,
    gate: Gate<()>,
}

impl Vitals {
    pub fn new(name: impl Into<String>) -> Self {
        Vitals {
            id: Uuid::new_v4(),
            name: name.into(),
            status: AtomicU8::new(Status::Idle as u8),
            last_heartbeat: Mutex::new(Timestamp::now()),
            gate: Gate::new(()),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn status(&self) -> Status {
        Status::from_u8(self.status.load(Ordering::Acquire))
    }

    pub fn set_status(&self, status: Status) {
        self.status.store(status as u8, Ordering::Release);
    }

    /// External reset hook, used when a dispatcher gives up on a worker.
    pub fn force_idle(&self) {
        self.set_status(Status::Idle);
    }

    pub fn last_heartbeat(&self) -> Timestamp {
        *self.last_heartbeat.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Refresh the heartbeat and return the new value.
    pub fn beat(&self) -> Timestamp {
        let now = Timestamp::now();
        *self.last_heartbeat.lock().unwrap_or_else(|e| e.into_inner()) = now;
        now
    }

    /// FIFO slot for callers that want one task at a time on this worker.
    pub fn gate(&self) -> &Gate<()> {
        &self.gate
    }
}

/// Holds a worker at `busy`; dropping it (return, error, panic or
/// cancellation) puts the worker back to `idle`.
struct BusyGuard<'a>(&'a Vitals);

impl<'a> BusyGuard<'a> {
    fn enter(vitals: &'a Vitals) -> Self {
        vitals.set_status(Status::Busy);
        BusyGuard(vitals)
    }
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.set_status(Status::Idle);
    }
}

/// How a time-limited execution ended.
pub enum Execution {
    Finished(Result<Payload>),
    TimedOut(Duration),
}

#[derive(Serialize, Clone, Debug)]
pub struct WorkerSnapshot {
    pub role: String,
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub status: Status,
    pub skills: Vec<String>,
    pub last_heartbeat: Timestamp,
}

#[async_trait]
pub trait Worker: Send + Sync {
    /// Role this worker serves in the registry
    fn role(&self) -> &'static str;

    /// Human-readable description of what this worker does
    fn description(&self) -> &'static str;

    /// Declared capabilities, fixed at creation
    fn skills(&self) -> &'static [&'static str];

    fn vitals(&self) -> &Vitals;

    /// Do the actual work for one payload.
    /// Unsupported actions come back as data, not as `Err`.
    async fn process(&self, payload: &Payload) -> Result<Payload>;

    fn status(&self) -> Status {
        self.vitals().status()
    }

    /// Run one payload, keeping `status` accurate around the call.
    async fn execute(&self, payload: &Payload, sink: &dyn StatusSink) -> Result<Payload> {
        match self.execute_within(payload, sink, None).await {
            Execution::Finished(outcome) => outcome,
            Execution::TimedOut(after) => Err(anyhow!("timed out after {after:?}")),
        }
    }

    /// Like `execute`, but gives up on `process` once `limit` has passed.
    ///
    /// Only the work itself is timed. Status reports happen outside the limit,
    /// and the `idle` report is sent however `process` ended.
    async fn execute_within(
        &self,
        payload: &Payload,
        sink: &dyn StatusSink,
        limit: Option<Duration>,
    ) -> Execution {
        let outcome = {
            let _busy = BusyGuard::enter(self.vitals());
            self.report_status(sink).await;
            match limit {
                Some(limit) => match tokio::time::timeout(limit, self.process(payload)).await {
                    Ok(outcome) => Execution::Finished(outcome),
                    Err(_) => Execution::TimedOut(limit),
                },
                None => Execution::Finished(self.process(payload).await),
            }
        };
        self.report_status(sink).await;
        outcome
    }

    /// Refresh the heartbeat and publish the current status. Never fails,
    /// and never waits on the sink longer than `REPORT_TIMEOUT`.
    async fn report_status(&self, sink: &dyn StatusSink) {
        let vitals = self.vitals();
        let observation = StatusObservation {
            role: self.role().to_string(),
            id: vitals.id(),
            name: vitals.name().to_string(),
            status: vitals.status(),
            timestamp: vitals.beat(),
        };

        match tokio::time::timeout(REPORT_TIMEOUT, sink.emit(&observation)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::warn!(role = self.role(), id = %vitals.id(), error = %e, "status report dropped")
            }
            Err(_) => {
                tracing::warn!(role = self.role(), id = %vitals.id(), "status report timed out")
            }
        }
    }

    fn snapshot(&self) -> WorkerSnapshot {
        let vitals = self.vitals();
        WorkerSnapshot {
            role: self.role().to_string(),
            id: vitals.id(),
            name: vitals.name().to_string(),
            description: self.description().to_string(),
            status: self.status(),
            skills: self.skills().iter().map(|s| s.to_string()).collect(),
            last_heartbeat: vitals.last_heartbeat(),
        }
    }
}

/// Factory function type for creating workers
pub struct WorkerFactory(pub fn() -> Arc<dyn Worker>);

inventory::collect!(WorkerFactory);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeWorker, Recorder};
    use serde_json::json;

    #[tokio::test]
    async fn execute_returns_to_idle_after_success() {
        let worker = FakeWorker::echo("Echo");
        let sink = Recorder::default();
        let mut payload = Payload::new();
        payload.insert("n".into(), json!(1));

        let result = worker.execute(&payload, &sink).await.unwrap();

        assert_eq!(result["n"], 1);
        assert_eq!(worker.status(), Status::Idle);
    }

    #[tokio::test]
    async fn execute_returns_to_idle_after_failure() {
        let worker = FakeWorker::failing("Broken");
        let sink = Recorder::default();

        let result = worker.execute(&Payload::new(), &sink).await;

        assert!(result.is_err());
        assert_eq!(worker.status(), Status::Idle);
    }

    #[tokio::test]
    async fn execute_reports_busy_then_idle() {
        let worker = FakeWorker::echo("Echo");
        let sink = Recorder::default();

        worker.execute(&Payload::new(), &sink).await.unwrap();

        let seen: Vec<Status> = sink.observations().iter().map(|o| o.status).collect();
        assert_eq!(seen, vec![Status::Busy, Status::Idle]);
    }

    #[tokio::test]
    async fn sink_failure_does_not_fail_execution() {
        let worker = FakeWorker::echo("Echo");
        let sink = Recorder::refusing();

        assert!(worker.execute(&Payload::new(), &sink).await.is_ok());
        assert_eq!(worker.status(), Status::Idle);
    }

    #[tokio::test]
    async fn report_status_refreshes_heartbeat() {
        let worker = FakeWorker::echo("Echo");
        let before = worker.vitals().last_heartbeat();
        tokio::time::sleep(Duration::from_millis(2)).await;

        worker.report_status(&Recorder::default()).await;

        assert!(worker.vitals().last_heartbeat() > before);
    }

    #[tokio::test]
    async fn slow_sink_does_not_count_against_the_limit() {
        let worker = FakeWorker::echo("Echo");
        let sink = Recorder::slow(Duration::from_millis(200));

        let outcome = worker
            .execute_within(&Payload::new(), &sink, Some(Duration::from_millis(100)))
            .await;

        assert!(matches!(outcome, Execution::Finished(Ok(_))));
        assert_eq!(sink.count(Status::Busy), 1);
        assert_eq!(sink.count(Status::Idle), 1);
    }

    #[tokio::test]
    async fn hung_sink_is_abandoned() {
        let worker = FakeWorker::echo("Echo");
        let sink = Recorder::slow(Duration::from_secs(60));

        let outcome = tokio::time::timeout(
            REPORT_TIMEOUT * 3,
            worker.execute(&Payload::new(), &sink),
        )
        .await
        .expect("execution must not wait on the sink");

        assert!(outcome.is_ok());
        assert_eq!(worker.status(), Status::Idle);
    }

    #[tokio::test]
    async fn timed_out_execution_reports_idle() {
        let worker = FakeWorker::sleepy("Sleepy", Duration::from_secs(30));
        let sink = Recorder::default();

        let outcome = worker
            .execute_within(&Payload::new(), &sink, Some(Duration::from_millis(20)))
            .await;

        assert!(matches!(outcome, Execution::TimedOut(_)));
        assert_eq!(worker.status(), Status::Idle);
        let seen: Vec<Status> = sink.observations().iter().map(|o| o.status).collect();
        assert_eq!(seen, vec![Status::Busy, Status::Idle]);
    }

    #[test]
    fn force_idle_resets_busy_worker() {
        let vitals = Vitals::new("stuck");
        vitals.set_status(Status::Busy);
        vitals.force_idle();
        assert_eq!(vitals.status(), Status::Idle);
    }

    #[test]
    fn snapshot_carries_identity() {
        let worker = FakeWorker::echo("Echo");
        let snap = worker.snapshot();
        assert_eq!(snap.role, "Echo");
        assert_eq!(snap.id, worker.vitals().id());
        assert_eq!(snap.status, Status::Idle);
        assert_eq!(serde_json::to_value(&snap).unwrap()["status"], "idle");
    }
}
