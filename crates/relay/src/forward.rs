//! Trigger forwarding to the pipeline host
//!
//! The relay never interprets trigger payloads; it POSTs them to the
//! pipeline host's own submission endpoint. The synchronous path relays the
//! upstream response to the caller. The background path (auto-forward after
//! an input push) runs on a single supervised worker fed through a bounded
//! queue, retrying a fixed number of times and reporting every outcome on
//! an observable results channel.

use std::time::Duration;

use serde_json::{Map, Value};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::error::RelayError;

/// Per-attempt timeout for the pipeline host's submission endpoint.
pub const FORWARD_TIMEOUT: Duration = Duration::from_secs(12);

/// Attempts the background worker makes before giving up on a payload.
pub const FORWARD_ATTEMPTS: u32 = 3;

const RETRY_DELAY: Duration = Duration::from_millis(500);
const QUEUE_DEPTH: usize = 8;

/// Upstream response, relayed verbatim to the `/trigger` caller.
#[derive(Debug)]
pub struct ForwardOutcome {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: String,
}

impl ForwardOutcome {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Terminal result of one background forward job.
#[derive(Debug)]
pub enum ForwardResult {
    Delivered { status: u16 },
    Failed { attempts: u32, detail: String },
}

/// POST a payload to `{base_url}/prompt` and capture the response.
///
/// A non-2xx upstream status is still an `Ok` outcome here; only transport
/// failures become errors. Callers decide how to surface the status.
pub async fn forward_payload(
    client: &reqwest::Client,
    base_url: &str,
    payload: &Map<String, Value>,
) -> Result<ForwardOutcome, RelayError> {
    let url = format!("{}/prompt", base_url.trim_end_matches('/'));
    let response = client
        .post(url)
        .timeout(FORWARD_TIMEOUT)
        .json(payload)
        .send()
        .await
        .map_err(|err| RelayError::Upstream(err.to_string()))?;

    let status = response.status().as_u16();
    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.to_string());
    let body = response
        .text()
        .await
        .map_err(|err| RelayError::Upstream(err.to_string()))?;

    Ok(ForwardOutcome {
        status,
        content_type,
        body,
    })
}

/// Cloneable handle for enqueueing background forward jobs.
#[derive(Clone)]
pub struct ForwardQueue {
    tx: mpsc::Sender<Map<String, Value>>,
}

impl ForwardQueue {
    /// Queue a payload for delivery. A full queue drops the job with a
    /// warning; the ingestion caller is never blocked on upstream latency.
    pub fn enqueue(&self, payload: Map<String, Value>) {
        if self.tx.try_send(payload).is_err() {
            warn!("Forward queue full, dropping trigger payload");
        }
    }
}

/// Start the background forward worker.
///
/// Returns the queue handle plus the results channel; the composition root
/// drains the latter into the log.
pub fn spawn_forwarder(
    client: reqwest::Client,
    base_url: String,
    max_attempts: u32,
) -> (ForwardQueue, mpsc::Receiver<ForwardResult>) {
    let (tx, mut rx) = mpsc::channel::<Map<String, Value>>(QUEUE_DEPTH);
    let (result_tx, result_rx) = mpsc::channel::<ForwardResult>(QUEUE_DEPTH);

    tokio::spawn(async move {
        while let Some(payload) = rx.recv().await {
            let result = deliver(&client, &base_url, &payload, max_attempts).await;
            // The receiver may have been dropped; the log above already
            // recorded the outcome in that case.
            let _ = result_tx.send(result).await;
        }
        debug!("Forward worker stopped, queue closed");
    });

    (ForwardQueue { tx }, result_rx)
}

async fn deliver(
    client: &reqwest::Client,
    base_url: &str,
    payload: &Map<String, Value>,
    max_attempts: u32,
) -> ForwardResult {
    let mut last_error = String::new();
    for attempt in 1..=max_attempts {
        match forward_payload(client, base_url, payload).await {
            Ok(outcome) if outcome.is_success() => {
                debug!("Trigger forwarded, upstream status {}", outcome.status);
                return ForwardResult::Delivered {
                    status: outcome.status,
                };
            }
            Ok(outcome) => {
                last_error = format!("upstream status {}", outcome.status);
            }
            Err(err) => {
                last_error = err.to_string();
            }
        }
        warn!("Trigger forward attempt {attempt}/{max_attempts} failed: {last_error}");
        if attempt < max_attempts {
            tokio::time::sleep(RETRY_DELAY * attempt).await;
        }
    }
    ForwardResult::Failed {
        attempts: max_attempts,
        detail: last_error,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    /// Bind then drop a listener so the port is free but almost certainly
    /// unassigned for the duration of the test.
    fn closed_port_url() -> String {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        format!("http://127.0.0.1:{port}")
    }

    fn payload() -> Map<String, Value> {
        json!({"prompt": {"1": {"class_type": "LoadImage"}}})
            .as_object()
            .unwrap()
            .clone()
    }

    #[tokio::test]
    async fn test_forward_unreachable_is_upstream_error() {
        let client = reqwest::Client::new();
        let result = forward_payload(&client, &closed_port_url(), &payload()).await;
        assert!(matches!(result, Err(RelayError::Upstream(_))));
    }

    #[tokio::test]
    async fn test_worker_reports_bounded_retry_failure() {
        let client = reqwest::Client::new();
        let (queue, mut results) = spawn_forwarder(client, closed_port_url(), 2);

        queue.enqueue(payload());

        let result = tokio::time::timeout(Duration::from_secs(30), results.recv())
            .await
            .expect("worker should report within the retry budget")
            .expect("results channel open");
        match result {
            ForwardResult::Failed { attempts, .. } => assert_eq!(attempts, 2),
            other => panic!("expected failure, got {other:?}"),
        }
    }
}
