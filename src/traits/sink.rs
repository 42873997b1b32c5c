use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use jiff::Timestamp;
use reqwest::Client;
use serde::Serialize;
use uuid::Uuid;

use crate::traits::worker::Status;

/// Longest a worker waits on a sink before dropping the report.
pub const REPORT_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Serialize, Clone, Debug)]
pub struct StatusObservation {
    pub role: String,
    pub id: Uuid,
    pub name: String,
    pub status: Status,
    pub timestamp: Timestamp,
}

/// Where workers publish their heartbeats.
#[async_trait]
pub trait StatusSink: Send + Sync {
    async fn emit(&self, observation: &StatusObservation) -> Result<()>;
}

/// Default sink: heartbeats go to the log.
pub struct TracingSink;

#[async_trait]
impl StatusSink for TracingSink {
    async fn emit(&self, observation: &StatusObservation) -> Result<()> {
        tracing::info!(
            role = %observation.role,
            id = %observation.id,
            status = %observation.status,
            at = %observation.timestamp,
            "heartbeat"
        );
        Ok(())
    }
}

/// Posts each observation as JSON to a collector endpoint.
pub struct HttpSink {
    url: String,
    client: Client,
}

impl HttpSink {
    pub fn new(url: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(REPORT_TIMEOUT)
            .build()
            .context("building telemetry client")?;

        Ok(HttpSink {
            url: url.into(),
            client,
        })
    }
}

#[async_trait]
impl StatusSink for HttpSink {
    async fn emit(&self, observation: &StatusObservation) -> Result<()> {
        self.client
            .post(&self.url)
            .json(observation)
            .send()
            .await?
            .error_for_status()?;

        Ok(())
    }
}
