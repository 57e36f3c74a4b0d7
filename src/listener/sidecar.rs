//! Sidecar index feed adapter
//!
//! A sidecar indexer pre-parses launchpad activity and pushes typed JSON
//! over WebSocket. Faster to consume than raw logs and covers the
//! secondary launchpad, at the cost of trusting an extra hop.
//!
//! The payload shape is versioned and pinned; unknown fields are
//! ignored, missing required fields count as unparseable.

use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::json;
use solana_sdk::pubkey::Pubkey;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};

use crate::config::SidecarSourceConfig;
use crate::error::{Error, Result};
use crate::strategy::{MarketDataHub, WhaleTrade};

use super::{EventSource, Platform, SharedMetrics, TokenEvent};

/// New launch message from the sidecar index (v1 shape)
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SidecarLaunchMessage {
    mint: String,
    creator: String,
    #[serde(default)]
    v_sol_in_bonding_curve: u64,
    #[serde(default)]
    name: String,
    #[serde(default)]
    symbol: String,
    #[serde(default)]
    uri: String,
    #[serde(default)]
    bonding_curve_key: String,
    /// Which launchpad the indexer saw: "pump" or "moonshot"
    #[serde(default)]
    pool: String,
}

/// Trade message from the sidecar index, used for whale mirroring
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SidecarTradeMessage {
    mint: String,
    trader_public_key: String,
    tx_type: String,
    #[serde(default)]
    sol_amount: u64,
}

/// Spawn the sidecar adapter with its own reconnect loop.
///
/// When `whale_wallets` is non-empty the adapter also subscribes to
/// those accounts' trades and feeds them into the market-data hub.
pub fn spawn(
    config: SidecarSourceConfig,
    reconnect_attempts: u32,
    raw_tx: mpsc::Sender<TokenEvent>,
    metrics: SharedMetrics,
    whale_wallets: Vec<String>,
    hub: Arc<MarketDataHub>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut attempts = 0u32;

        loop {
            match run_connection(&config.ws_url, &raw_tx, &metrics, &whale_wallets, &hub).await {
                Ok(()) => break, // consumer gone
                Err(e) => {
                    attempts += 1;
                    metrics
                        .stream_gaps
                        .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                    warn!("sidecar feed dropped (attempt {attempts}): {e}");

                    if reconnect_attempts > 0 && attempts >= reconnect_attempts * 10 {
                        warn!("sidecar feed giving up after {attempts} attempts");
                        break;
                    }
                    tokio::time::sleep(Duration::from_millis(500 * attempts.min(10) as u64)).await;
                }
            }
        }

        info!("sidecar listener stopped");
    })
}

async fn run_connection(
    ws_url: &str,
    raw_tx: &mpsc::Sender<TokenEvent>,
    metrics: &SharedMetrics,
    whale_wallets: &[String],
    hub: &Arc<MarketDataHub>,
) -> Result<()> {
    let (ws_stream, _) = connect_async(ws_url)
        .await
        .map_err(|e| Error::StreamConnection(format!("sidecar connect failed: {e}")))?;

    info!("connected to sidecar index feed");

    let (mut write, mut read) = ws_stream.split();

    let subscribe_msg = json!({"method": "subscribeNewToken"});
    write
        .send(Message::Text(subscribe_msg.to_string()))
        .await
        .map_err(|e| Error::StreamConnection(format!("sidecar subscribe failed: {e}")))?;

    if !whale_wallets.is_empty() {
        let msg = json!({"method": "subscribeAccountTrade", "keys": whale_wallets});
        write
            .send(Message::Text(msg.to_string()))
            .await
            .map_err(|e| Error::StreamConnection(format!("sidecar subscribe failed: {e}")))?;
        info!("subscribed to {} tracked wallet(s)", whale_wallets.len());
    }

    while let Some(msg) = read.next().await {
        match msg {
            Ok(Message::Text(text)) => {
                if let Some(trade) = parse_whale_trade(&text) {
                    hub.record_whale_trade(trade);
                    continue;
                }
                match parse_launch_message(&text) {
                    Ok(Some(event)) => {
                        if raw_tx.send(event).await.is_err() {
                            return Ok(());
                        }
                    }
                    Ok(None) => {} // heartbeat or subscription ack
                    Err(detail) => {
                        metrics.record_unparseable(EventSource::SidecarIndex, &detail, &text);
                    }
                }
            }
            Ok(Message::Ping(data)) => {
                write
                    .send(Message::Pong(data))
                    .await
                    .map_err(|e| Error::StreamDisconnected(format!("pong failed: {e}")))?;
            }
            Ok(Message::Close(_)) => {
                return Err(Error::StreamDisconnected("sidecar closed".into()));
            }
            Ok(_) => {}
            Err(e) => return Err(Error::StreamDisconnected(e.to_string())),
        }
    }

    Err(Error::StreamDisconnected("sidecar stream ended".into()))
}

/// Parse a tracked-wallet trade frame, if that is what this is
fn parse_whale_trade(text: &str) -> Option<WhaleTrade> {
    let value: serde_json::Value = serde_json::from_str(text).ok()?;
    let tx_type = value.get("txType")?.as_str()?;
    if tx_type != "buy" && tx_type != "sell" {
        return None;
    }

    let msg: SidecarTradeMessage = serde_json::from_value(value).ok()?;
    Some(WhaleTrade {
        wallet: msg.trader_public_key,
        mint: Pubkey::from_str(&msg.mint).ok()?,
        is_buy: msg.tx_type == "buy",
        sol_amount: msg.sol_amount as f64 / 1e9,
        observed_at: chrono::Utc::now(),
    })
}

/// Parse one frame. Ok(None) for non-launch frames, Err for frames that
/// look like launches but fail required-field validation.
fn parse_launch_message(text: &str) -> std::result::Result<Option<TokenEvent>, String> {
    let value: serde_json::Value = match serde_json::from_str(text) {
        Ok(v) => v,
        Err(e) => return Err(format!("invalid JSON: {e}")),
    };

    // Subscription acks and heartbeats have no mint field
    if value.get("mint").is_none() {
        debug!("sidecar non-launch frame");
        return Ok(None);
    }

    let msg: SidecarLaunchMessage =
        serde_json::from_value(value).map_err(|e| format!("launch shape mismatch: {e}"))?;

    let mint = Pubkey::from_str(&msg.mint).map_err(|e| format!("bad mint: {e}"))?;
    let creator = Pubkey::from_str(&msg.creator).map_err(|e| format!("bad creator: {e}"))?;

    let platform = match msg.pool.as_str() {
        "moonshot" => Platform::Moonshot,
        _ => Platform::Pump,
    };

    Ok(Some(TokenEvent {
        mint,
        creator,
        discovered_at: Instant::now(),
        source: EventSource::SidecarIndex,
        initial_liquidity_lamports: msg.v_sol_in_bonding_curve,
        platform,
        name: msg.name,
        symbol: msg.symbol,
        metadata_uri: msg.uri,
        bonding_curve: Pubkey::from_str(&msg.bonding_curve_key).ok(),
    }))
}
