//! Resilient push subscriptions
//!
//! A subscription owns one WebSocket at a time. On disconnect it retries
//! the same endpoint a configured number of times, then fails over to the
//! next-ranked endpoint. Every connection loss surfaces a `StreamEvent::Gap`
//! so downstream consumers can reconcile missed data.

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::rpc::failover::FailoverClient;

/// What to subscribe to on the chain's WebSocket interface
#[derive(Debug, Clone)]
pub struct StreamSpec {
    /// Human-readable tag used in logs and gap events
    pub label: String,
    /// Subscription method, e.g. `logsSubscribe` or `blockSubscribe`
    pub method: String,
    pub params: Value,
}

impl StreamSpec {
    /// Subscribe to transaction logs mentioning a program
    pub fn logs_mentioning(label: &str, program: &str) -> Self {
        Self {
            label: label.to_string(),
            method: "logsSubscribe".to_string(),
            params: json!([{"mentions": [program]}, {"commitment": "processed"}]),
        }
    }

    /// Subscribe to confirmed block summaries for a program
    pub fn blocks_mentioning(label: &str, program: &str) -> Self {
        Self {
            label: label.to_string(),
            method: "blockSubscribe".to_string(),
            params: json!([
                {"mentionsAccountOrProgram": program},
                {"commitment": "confirmed", "transactionDetails": "full", "showRewards": false}
            ]),
        }
    }
}

/// One message from a subscription
#[derive(Debug, Clone)]
pub enum StreamEvent {
    /// A notification payload (the `params.result` of the notification)
    Payload(Value),
    /// The stream lost its connection; data may have been missed
    Gap { label: String, reason: String },
}

/// Handle to a running subscription task
pub struct SubscriptionHandle {
    pub events: mpsc::Receiver<StreamEvent>,
    task: tokio::task::JoinHandle<()>,
}

impl SubscriptionHandle {
    pub fn abort(&self) {
        self.task.abort();
    }
}

/// Open a persistent subscription with reconnect-then-failover semantics.
///
/// The returned channel yields payloads and gaps until the handle is
/// dropped or aborted. The task rotates through the client's ranked
/// endpoints, trying each `reconnect_attempts` times.
pub fn subscribe(
    client: Arc<FailoverClient>,
    spec: StreamSpec,
    reconnect_attempts: u32,
    reconnect_delay: Duration,
) -> SubscriptionHandle {
    let (tx, rx) = mpsc::channel(256);

    let task = tokio::spawn(async move {
        let mut endpoint_cursor = 0usize;

        loop {
            let urls = client.ranked_ws_urls().await;
            if urls.is_empty() {
                warn!(label = %spec.label, "no WebSocket endpoints available");
                return;
            }
            let url = urls[endpoint_cursor % urls.len()].clone();

            let mut attempts = 0u32;
            while attempts < reconnect_attempts {
                match run_connection(&url, &spec, &tx).await {
                    Ok(()) => {
                        // Receiver dropped: subscription is finished
                        return;
                    }
                    Err(e) => {
                        attempts += 1;
                        warn!(
                            label = %spec.label,
                            attempt = attempts,
                            "subscription dropped: {e}"
                        );
                        let gap = StreamEvent::Gap {
                            label: spec.label.clone(),
                            reason: e.to_string(),
                        };
                        if tx.send(gap).await.is_err() {
                            return;
                        }
                        tokio::time::sleep(reconnect_delay * attempts).await;
                    }
                }
            }

            // Same endpoint kept failing: fail over to the next one
            endpoint_cursor += 1;
            info!(label = %spec.label, "failing over to next WebSocket endpoint");
        }
    });

    SubscriptionHandle { events: rx, task }
}

/// Drive one WebSocket connection until it breaks (Err) or the consumer
/// goes away (Ok).
async fn run_connection(
    url: &str,
    spec: &StreamSpec,
    tx: &mpsc::Sender<StreamEvent>,
) -> Result<()> {
    debug!(label = %spec.label, "connecting subscription to {url}");

    let (ws_stream, _) = connect_async(url)
        .await
        .map_err(|e| Error::StreamConnection(format!("WebSocket connect failed: {e}")))?;

    let (mut write, mut read) = ws_stream.split();

    let request = json!({
        "jsonrpc": "2.0",
        "id": 1,
        "method": spec.method,
        "params": spec.params,
    });
    write
        .send(Message::Text(request.to_string()))
        .await
        .map_err(|e| Error::StreamConnection(format!("subscribe send failed: {e}")))?;

    info!(label = %spec.label, "subscription established");

    while let Some(msg) = read.next().await {
        match msg {
            Ok(Message::Text(text)) => {
                let value: Value = match serde_json::from_str(&text) {
                    Ok(v) => v,
                    Err(e) => {
                        debug!(label = %spec.label, "unparseable frame: {e}");
                        continue;
                    }
                };

                // Subscription confirmation carries a bare `result`
                if value.get("method").is_none() {
                    debug!(label = %spec.label, "subscription confirmed: {}", value["result"]);
                    continue;
                }

                let payload = value["params"]["result"].clone();
                if payload.is_null() {
                    continue;
                }
                if tx.send(StreamEvent::Payload(payload)).await.is_err() {
                    return Ok(());
                }
            }
            Ok(Message::Ping(data)) => {
                write
                    .send(Message::Pong(data))
                    .await
                    .map_err(|e| Error::StreamDisconnected(format!("pong failed: {e}")))?;
            }
            Ok(Message::Close(_)) => {
                return Err(Error::StreamDisconnected("closed by server".into()));
            }
            Ok(_) => {}
            Err(e) => {
                return Err(Error::StreamDisconnected(e.to_string()));
            }
        }
    }

    Err(Error::StreamDisconnected("stream ended".into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_logs_spec_shape() {
        let spec = StreamSpec::logs_mentioning("launchpad", "ProgramAddr111");
        assert_eq!(spec.method, "logsSubscribe");
        assert_eq!(spec.params[0]["mentions"][0], "ProgramAddr111");
    }

    #[test]
    fn test_blocks_spec_shape() {
        let spec = StreamSpec::blocks_mentioning("amm", "AmmProgram111");
        assert_eq!(spec.method, "blockSubscribe");
        assert_eq!(spec.params[0]["mentionsAccountOrProgram"], "AmmProgram111");
    }
}
