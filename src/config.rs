//! Runtime settings, read from the environment (after `.env` is loaded).
//!
//! - `FOREMAN_DISPATCH_TIMEOUT_SECS`: per-dispatch execution limit; unset or `0` disables it
//! - `FOREMAN_FALLBACK_ROLE`: role used when a task's role has no worker; unset fails the task
//! - `FOREMAN_EXCLUSIVE_WORKERS`: one task at a time per worker (default `true`)
//! - `FOREMAN_TELEMETRY_URL`: collector for heartbeats; unset logs them instead

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};

use crate::foreman::DispatchPolicy;
use crate::traits::{HttpSink, StatusSink, TracingSink};

const TIMEOUT_VAR: &str = "FOREMAN_DISPATCH_TIMEOUT_SECS";
const FALLBACK_VAR: &str = "FOREMAN_FALLBACK_ROLE";
const EXCLUSIVE_VAR: &str = "FOREMAN_EXCLUSIVE_WORKERS";
const TELEMETRY_VAR: &str = "FOREMAN_TELEMETRY_URL";

#[derive(Clone, Debug, PartialEq)]
pub struct Settings {
    pub dispatch_timeout: Option<Duration>,
    pub fallback_role: Option<String>,
    pub exclusive_workers: bool,
    pub telemetry_url: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            dispatch_timeout: None,
            fallback_role: None,
            exclusive_workers: true,
            telemetry_url: None,
        }
    }
}

impl Settings {
    pub fn from_env() -> Result<Settings> {
        Settings::from_lookup(|key| std::env::var(key).ok())
    }

    /// Empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Settings> {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let dispatch_timeout = match get(TIMEOUT_VAR) {
            Some(raw) => {
                let secs: u64 = raw
                    .parse()
                    .with_context(|| format!("{TIMEOUT_VAR} must be a whole number of seconds, got {raw:?}"))?;
                (secs > 0).then(|| Duration::from_secs(secs))
            }
            None => None,
        };

        let exclusive_workers = match get(EXCLUSIVE_VAR) {
            Some(raw) => parse_flag(&raw).with_context(|| format!("invalid {EXCLUSIVE_VAR}"))?,
            None => true,
        };

        Ok(Settings {
            dispatch_timeout,
            fallback_role: get(FALLBACK_VAR),
            exclusive_workers,
            telemetry_url: get(TELEMETRY_VAR),
        })
    }

    pub fn policy(&self) -> DispatchPolicy {
        DispatchPolicy {
            fallback_role: self.fallback_role.clone(),
            timeout: self.dispatch_timeout,
            exclusive: self.exclusive_workers,
        }
    }

    pub fn sink(&self) -> Result<Arc<dyn StatusSink>> {
        let sink: Arc<dyn StatusSink> = match &self.telemetry_url {
            Some(url) => Arc::new(HttpSink::new(url.clone())?),
            None => Arc::new(TracingSink),
        };
        Ok(sink)
    }
}

fn parse_flag(raw: &str) -> Result<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => bail!("expected a boolean, got {other:?}"),
    }
}
