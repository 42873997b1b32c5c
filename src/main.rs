use std::sync::Arc;

use anyhow::Result;
use serde::Serialize;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

mod classifier;
mod config;
mod error;
mod foreman;
mod intake;
mod registry;
mod task;
mod traits;
mod workers;

#[cfg(test)]
mod testing;

use config::Settings;
use foreman::Foreman;
use registry::Registry;
use task::DispatchResult;

/// One output line. `id` echoes the request's own `id` so replies can be
/// matched when dispatches finish out of order.
#[derive(Serialize)]
struct Reply {
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<Value>,
    #[serde(flatten)]
    envelope: DispatchResult,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let settings = Settings::from_env()?;
    let foreman = Arc::new(Foreman::new(
        Registry::from_factories(),
        settings.sink()?,
        settings.policy(),
    ));

    if foreman.registry().is_empty() {
        tracing::warn!("no workers registered; every task will be unroutable");
    }
    tracing::info!(
        workers = foreman.registry().len(),
        roles = ?foreman.registry().roles(),
        ?settings,
        "foreman is ready"
    );

    let (replies, outbox) = mpsc::unbounded_channel::<Vec<u8>>();
    let writer = tokio::spawn(write_replies(outbox));
    let mut in_flight = JoinSet::new();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    // One JSON task per line in, one JSON reply per line out, in completion order.
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();

        if line.is_empty() {
            continue;
        }

        if line.eq_ignore_ascii_case("quit") {
            break;
        }

        if line.eq_ignore_ascii_case("status") {
            send(&replies, &foreman.system_info());
            continue;
        }

        let (id, parsed) = intake::parse_request(line);
        match parsed {
            Ok(task) => {
                tracing::info!(task_type = %task.task_type, ?id, "task received");
                let foreman = Arc::clone(&foreman);
                let replies = replies.clone();
                in_flight.spawn(async move {
                    let envelope = foreman.dispatch(&task).await;
                    if envelope.is_success() {
                        tracing::info!(task_type = %task.task_type, ?id, "task completed");
                    } else {
                        tracing::warn!(task_type = %task.task_type, ?id, "task failed");
                    }
                    send(&replies, &Reply { id, envelope });
                });
            }
            Err(e) => {
                tracing::warn!(error = %e, "task rejected");
                send(
                    &replies,
                    &Reply {
                        id,
                        envelope: e.into_envelope(),
                    },
                );
            }
        }

        // Reap whatever has already finished so the set does not grow unbounded.
        while let Some(joined) = in_flight.try_join_next() {
            if let Err(e) = joined {
                tracing::error!(error = %e, "dispatch task aborted");
            }
        }
    }

    tracing::info!(pending = in_flight.len(), "foreman shutting down");
    while let Some(joined) = in_flight.join_next().await {
        if let Err(e) = joined {
            tracing::error!(error = %e, "dispatch task aborted");
        }
    }
    drop(replies);
    writer.await??;
    Ok(())
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "hive_foreman=info".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn send(replies: &mpsc::UnboundedSender<Vec<u8>>, body: &impl Serialize) {
    match serde_json::to_vec(body) {
        Ok(mut line) => {
            line.push(b'\n');
            if replies.send(line).is_err() {
                tracing::error!("reply writer is gone; dropping reply");
            }
        }
        Err(e) => tracing::error!(error = %e, "could not serialize reply"),
    }
}

/// Sole owner of stdout, so concurrent replies never interleave mid-line.
async fn write_replies(mut outbox: mpsc::UnboundedReceiver<Vec<u8>>) -> Result<()> {
    let mut stdout = tokio::io::stdout();
    while let Some(line) = outbox.recv().await {
        stdout.write_all(&line).await?;
        stdout.flush().await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn reply_echoes_request_id() {
        let reply = Reply {
            id: Some(json!("req-1")),
            envelope: DispatchResult::success(task::Payload::new()),
        };
        let value = serde_json::to_value(&reply).unwrap();
        assert_eq!(value["id"], "req-1");
        assert_eq!(value["status"], "success");
    }

    #[test]
    fn reply_without_id_omits_it() {
        let reply = Reply {
            id: None,
            envelope: intake::IntakeError::MissingType.into_envelope(),
        };
        let value = serde_json::to_value(&reply).unwrap();
        assert!(value.get("id").is_none());
        assert_eq!(value["code"], 400);
    }
}
