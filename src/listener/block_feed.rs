//! Block-confirmation adapter for graduated AMM pools
//!
//! Subscribes to confirmed blocks mentioning the AMM program and scans
//! each transaction for pool initializations. Slower than the log feed
//! but confirmed, so it doubles as a correctness check on the push path.

use serde_json::Value;
use solana_sdk::pubkey::Pubkey;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::rpc::{subscribe, FailoverClient, StreamEvent, StreamSpec};

use super::{EventSource, Platform, SharedMetrics, TokenEvent};

/// Graduated AMM program id
pub const AMM_PROGRAM: &str = "675kPX9MHTjS2zt1qfr1NYHuzeLXfQM9H24wFSUt1Mp8";

/// Wrapped native mint, excluded when picking the launched token side
const WRAPPED_NATIVE_MINT: &str = "So11111111111111111111111111111111111111112";

/// Spawn the block-feed adapter task
pub fn spawn(
    client: Arc<FailoverClient>,
    reconnect_attempts: u32,
    raw_tx: mpsc::Sender<TokenEvent>,
    metrics: SharedMetrics,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let spec = StreamSpec::blocks_mentioning("amm-blocks", AMM_PROGRAM);
        let mut handle = subscribe(client, spec, reconnect_attempts, Duration::from_secs(1));

        info!("block-feed listener started for {AMM_PROGRAM}");

        while let Some(event) = handle.events.recv().await {
            match event {
                StreamEvent::Payload(payload) => {
                    for token in parse_block_payload(&payload, &metrics) {
                        if raw_tx.send(token).await.is_err() {
                            return;
                        }
                    }
                }
                StreamEvent::Gap { label, reason } => {
                    metrics
                        .stream_gaps
                        .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                    debug!(label, reason, "block stream gap");
                }
            }
        }

        info!("block-feed listener stopped");
    })
}

/// Scan a blockNotification payload for pool initializations
fn parse_block_payload(payload: &Value, metrics: &SharedMetrics) -> Vec<TokenEvent> {
    let mut events = Vec::new();

    let Some(transactions) = payload["value"]["block"]["transactions"].as_array() else {
        return events;
    };

    for tx in transactions {
        if !tx["meta"]["err"].is_null() {
            continue;
        }

        let logs = tx["meta"]["logMessages"]
            .as_array()
            .map(|a| a.iter().filter_map(|l| l.as_str()).collect::<Vec<_>>())
            .unwrap_or_default();

        let is_pool_init = logs
            .iter()
            .any(|l| l.contains("initialize2") || l.contains("InitializePool"));
        if !is_pool_init {
            continue;
        }

        match parse_pool_init(tx) {
            Some(event) => events.push(event),
            None => {
                metrics.record_unparseable(
                    EventSource::BlockFeed,
                    "pool init without resolvable mint",
                    &tx["transaction"]["signatures"][0].to_string(),
                );
            }
        }
    }

    events
}

/// Extract the launched token and seed liquidity from a pool-init tx
fn parse_pool_init(tx: &Value) -> Option<TokenEvent> {
    let balances = tx["meta"]["postTokenBalances"].as_array()?;

    let mut launched_mint: Option<Pubkey> = None;
    let mut native_liquidity: u64 = 0;

    for balance in balances {
        let mint_str = balance["mint"].as_str()?;
        if mint_str == WRAPPED_NATIVE_MINT {
            native_liquidity = balance["uiTokenAmount"]["amount"]
                .as_str()
                .and_then(|s| s.parse::<u64>().ok())
                .unwrap_or(0)
                .max(native_liquidity);
        } else if launched_mint.is_none() {
            launched_mint = Pubkey::from_str(mint_str).ok();
        }
    }

    let mint = launched_mint?;
    let creator = tx["transaction"]["message"]["accountKeys"][0]
        .as_str()
        .and_then(|s| Pubkey::from_str(s).ok())?;

    Some(TokenEvent {
        mint,
        creator,
        discovered_at: Instant::now(),
        source: EventSource::BlockFeed,
        initial_liquidity_lamports: native_liquidity,
        platform: Platform::GraduatedAmm,
        name: String::new(),
        symbol: String::new(),
        metadata_uri: String::new(),
        bonding_curve: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::listener::ListenerMetrics;
    use serde_json::json;

    fn pool_init_tx(mint: &Pubkey, creator: &Pubkey, liquidity: u64) -> Value {
        json!({
            "transaction": {
                "signatures": ["sig1"],
                "message": {"accountKeys": [creator.to_string()]}
            },
            "meta": {
                "err": null,
                "logMessages": ["Program log: initialize2: InitializeInstruction2"],
                "postTokenBalances": [
                    {
                        "mint": WRAPPED_NATIVE_MINT,
                        "uiTokenAmount": {"amount": liquidity.to_string()}
                    },
                    {
                        "mint": mint.to_string(),
                        "uiTokenAmount": {"amount": "1000000000000"}
                    }
                ]
            }
        })
    }

    #[test]
    fn test_parse_pool_init() {
        let metrics = Arc::new(ListenerMetrics::default());
        let mint = Pubkey::new_unique();
        let creator = Pubkey::new_unique();

        let payload = json!({
            "value": {"block": {"transactions": [pool_init_tx(&mint, &creator, 25_000_000_000u64)]}}
        });

        let events = parse_block_payload(&payload, &metrics);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].mint, mint);
        assert_eq!(events[0].creator, creator);
        assert_eq!(events[0].platform, Platform::GraduatedAmm);
        assert_eq!(events[0].initial_liquidity_lamports, 25_000_000_000);
    }

    #[test]
    fn test_non_init_transactions_skipped() {
        let metrics = Arc::new(ListenerMetrics::default());
        let payload = json!({
            "value": {"block": {"transactions": [{
                "transaction": {"signatures": ["s"], "message": {"accountKeys": []}},
                "meta": {"err": null, "logMessages": ["Program log: swap"], "postTokenBalances": []}
            }]}}
        });
        assert!(parse_block_payload(&payload, &metrics).is_empty());
    }
}
