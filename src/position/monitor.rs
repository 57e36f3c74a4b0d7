//! Price monitor for open positions
//!
//! Polls every tracked curve at the push cadence and feeds each mint's
//! lifecycle task plus the shared market-data hub. A mint whose curve
//! keeps failing to read degrades to the slower pull cadence instead of
//! hammering a dead account.

use dashmap::DashMap;
use solana_sdk::pubkey::Pubkey;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::chain::CurveState;
use crate::config::PositionConfig;
use crate::rpc::FailoverClient;
use crate::strategy::MarketDataHub;

use super::manager::{MintMsg, TrackedMint};

/// Consecutive read failures before a mint drops to the slow cadence
const DEGRADE_AFTER_FAILURES: u32 = 3;

/// Spawn the monitor loop
pub fn spawn_monitor(
    client: Arc<FailoverClient>,
    tracked: Arc<DashMap<Pubkey, TrackedMint>>,
    hub: Arc<MarketDataHub>,
    config: PositionConfig,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let push_interval = Duration::from_millis(config.price_push_interval_ms);
        let poll_interval = Duration::from_millis(config.price_poll_interval_ms);
        let slow_every = (poll_interval.as_millis() / push_interval.as_millis()).max(1) as u64;

        let mut ticker = tokio::time::interval(push_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        let mut failures: HashMap<Pubkey, u32> = HashMap::new();
        let mut cycle: u64 = 0;

        info!(
            "price monitor started: {}ms push, {}ms fallback",
            config.price_push_interval_ms, config.price_poll_interval_ms
        );

        loop {
            ticker.tick().await;
            cycle += 1;

            let watched: Vec<(Pubkey, TrackedMint)> = tracked
                .iter()
                .map(|e| (*e.key(), e.value().clone()))
                .collect();

            if watched.is_empty() {
                failures.retain(|_, _| false);
                continue;
            }

            for (mint, entry) in watched {
                let degraded =
                    failures.get(&mint).copied().unwrap_or(0) >= DEGRADE_AFTER_FAILURES;
                if degraded && cycle % slow_every != 0 {
                    continue;
                }

                let Some(curve_key) = entry.bonding_curve else {
                    continue; // graduated venue; no curve to read
                };

                match read_price(&client, &curve_key).await {
                    Some(price) => {
                        failures.remove(&mint);
                        hub.record_price(mint, price);
                        let _ = entry.tx.try_send(MintMsg::Price(price));
                    }
                    None => {
                        let count = failures.entry(mint).or_insert(0);
                        *count += 1;
                        if *count == DEGRADE_AFTER_FAILURES {
                            debug!(%mint, "price reads failing, degrading to pull cadence");
                        }
                    }
                }
            }

            // Forget mints that are no longer tracked
            failures.retain(|mint, _| tracked.contains_key(mint));
        }
    })
}

async fn read_price(client: &FailoverClient, curve_key: &Pubkey) -> Option<f64> {
    let data = client.get_account_data(curve_key).await.ok()??;
    let curve = CurveState::decode(&data).ok()?;
    curve.spot_price().ok()
}
