//! Transaction-log adapter for the curve launchpad
//!
//! Subscribes to logs mentioning the launchpad program and decodes the
//! anchor-style create event carried in `Program data:` lines. This is
//! the lowest-latency push source for brand-new mints.

use base64::Engine;
use borsh::BorshDeserialize;
use serde_json::Value;
use solana_sdk::pubkey::Pubkey;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::rpc::{subscribe, FailoverClient, StreamEvent, StreamSpec};

use super::{EventSource, Platform, SharedMetrics, TokenEvent};

/// Curve launchpad program id
pub const CURVE_PROGRAM: &str = "6EF8rrecthR5Dkzon8Nwu78hRvfCKubJ14M5uBEwF6P";

/// Anchor event discriminator for token creation
const CREATE_EVENT_DISCRIMINATOR: [u8; 8] = [27, 114, 169, 77, 222, 235, 99, 118];

/// Create event payload as emitted by the launchpad program
#[derive(Debug, BorshDeserialize)]
struct CreateEventPayload {
    name: String,
    symbol: String,
    uri: String,
    mint: [u8; 32],
    bonding_curve: [u8; 32],
    user: [u8; 32],
}

/// Spawn the tx-log adapter task
pub fn spawn(
    client: Arc<FailoverClient>,
    reconnect_attempts: u32,
    raw_tx: mpsc::Sender<TokenEvent>,
    metrics: SharedMetrics,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let spec = StreamSpec::logs_mentioning("curve-logs", CURVE_PROGRAM);
        let mut handle = subscribe(client, spec, reconnect_attempts, Duration::from_secs(1));

        info!("tx-log listener started for {CURVE_PROGRAM}");

        while let Some(event) = handle.events.recv().await {
            match event {
                StreamEvent::Payload(payload) => {
                    if let Some(token) = parse_log_payload(&payload, &metrics) {
                        if raw_tx.send(token).await.is_err() {
                            break;
                        }
                    }
                }
                StreamEvent::Gap { label, reason } => {
                    metrics
                        .stream_gaps
                        .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                    debug!(label, reason, "tx-log stream gap");
                }
            }
        }

        info!("tx-log listener stopped");
    })
}

/// Parse one logsNotification payload into a TokenEvent
fn parse_log_payload(payload: &Value, metrics: &SharedMetrics) -> Option<TokenEvent> {
    let value = &payload["value"];
    if !value["err"].is_null() {
        return None; // failed transaction, nothing launched
    }

    let logs = value["logs"].as_array()?;

    // Only create instructions carry a launch
    let is_create = logs
        .iter()
        .filter_map(|l| l.as_str())
        .any(|l| l.contains("Instruction: Create"));
    if !is_create {
        return None;
    }

    for line in logs.iter().filter_map(|l| l.as_str()) {
        let Some(data) = line.strip_prefix("Program data: ") else {
            continue;
        };

        let bytes = match base64::engine::general_purpose::STANDARD.decode(data) {
            Ok(b) => b,
            Err(_) => continue,
        };

        if bytes.len() < 8 || bytes[..8] != CREATE_EVENT_DISCRIMINATOR {
            continue;
        }

        match CreateEventPayload::try_from_slice(&bytes[8..]) {
            Ok(ev) => {
                return Some(TokenEvent {
                    mint: Pubkey::new_from_array(ev.mint),
                    creator: Pubkey::new_from_array(ev.user),
                    discovered_at: Instant::now(),
                    source: EventSource::TxLogs,
                    // The create event does not carry the dev buy; the
                    // market heuristics read live curve reserves instead.
                    initial_liquidity_lamports: 0,
                    platform: Platform::Pump,
                    name: ev.name,
                    symbol: ev.symbol,
                    metadata_uri: ev.uri,
                    bonding_curve: Some(Pubkey::new_from_array(ev.bonding_curve)),
                });
            }
            Err(e) => {
                metrics.record_unparseable(
                    EventSource::TxLogs,
                    &format!("create event decode: {e}"),
                    line,
                );
            }
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::listener::ListenerMetrics;
    use borsh::BorshSerialize;
    use serde_json::json;

    #[derive(BorshSerialize)]
    struct TestEvent {
        name: String,
        symbol: String,
        uri: String,
        mint: [u8; 32],
        bonding_curve: [u8; 32],
        user: [u8; 32],
    }

    fn encoded_create_event(mint: Pubkey, creator: Pubkey) -> String {
        let ev = TestEvent {
            name: "Test Token".into(),
            symbol: "TST".into(),
            uri: "https://meta.example/t.json".into(),
            mint: mint.to_bytes(),
            bonding_curve: Pubkey::new_unique().to_bytes(),
            user: creator.to_bytes(),
        };
        let mut bytes = CREATE_EVENT_DISCRIMINATOR.to_vec();
        bytes.extend(borsh::to_vec(&ev).unwrap());
        base64::engine::general_purpose::STANDARD.encode(bytes)
    }

    #[test]
    fn test_parse_create_event() {
        let metrics = Arc::new(ListenerMetrics::default());
        let mint = Pubkey::new_unique();
        let creator = Pubkey::new_unique();

        let payload = json!({
            "value": {
                "signature": "sig",
                "err": null,
                "logs": [
                    "Program log: Instruction: Create",
                    format!("Program data: {}", encoded_create_event(mint, creator)),
                ]
            }
        });

        let event = parse_log_payload(&payload, &metrics).unwrap();
        assert_eq!(event.mint, mint);
        assert_eq!(event.creator, creator);
        assert_eq!(event.symbol, "TST");
        assert_eq!(event.platform, Platform::Pump);
    }

    #[test]
    fn test_non_create_logs_ignored() {
        let metrics = Arc::new(ListenerMetrics::default());
        let payload = json!({
            "value": {
                "signature": "sig",
                "err": null,
                "logs": ["Program log: Instruction: Buy"]
            }
        });
        assert!(parse_log_payload(&payload, &metrics).is_none());
    }

    #[test]
    fn test_failed_tx_ignored() {
        let metrics = Arc::new(ListenerMetrics::default());
        let payload = json!({
            "value": {
                "signature": "sig",
                "err": {"InstructionError": [0, "Custom"]},
                "logs": ["Program log: Instruction: Create"]
            }
        });
        assert!(parse_log_payload(&payload, &metrics).is_none());
    }
}
