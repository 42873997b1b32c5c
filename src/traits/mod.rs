mod sink;
mod worker;

#[cfg(test)]
pub use sink::StatusObservation;
pub use sink::{HttpSink, StatusSink, TracingSink};
#[cfg(test)]
pub use worker::Status;
pub use worker::{Execution, Vitals, Worker, WorkerFactory, WorkerSnapshot};
