//! Polled third-party listing feed
//!
//! The slowest source: a REST endpoint listing recent launches. Useful
//! as a catch-all for anything the push feeds missed and as a second
//! observation for cross-source confirmation. The adapter remembers what
//! it already emitted so each poll only forwards new listings.

use serde::Deserialize;
use solana_sdk::pubkey::Pubkey;
use std::collections::{HashSet, VecDeque};
use std::str::FromStr;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::ListingPollConfig;

use super::{EventSource, Platform, SharedMetrics, TokenEvent};

/// Listings remembered to avoid re-emitting on every poll
const SEEN_CAPACITY: usize = 4096;

/// One listing in the feed response (v1 shape)
#[derive(Debug, Clone, Deserialize)]
struct Listing {
    address: String,
    #[serde(default)]
    creator: String,
    #[serde(default)]
    liquidity_lamports: u64,
    #[serde(default)]
    name: String,
    #[serde(default)]
    symbol: String,
    #[serde(default)]
    uri: String,
    #[serde(default)]
    platform: String,
}

/// Spawn the polling adapter task
pub fn spawn(
    config: ListingPollConfig,
    raw_tx: mpsc::Sender<TokenEvent>,
    metrics: SharedMetrics,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let http = match reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
        {
            Ok(c) => c,
            Err(e) => {
                warn!("listing poll disabled, HTTP client failed: {e}");
                return;
            }
        };

        let mut seen: HashSet<String> = HashSet::with_capacity(SEEN_CAPACITY);
        let mut seen_order: VecDeque<String> = VecDeque::with_capacity(SEEN_CAPACITY);
        let mut ticker = tokio::time::interval(Duration::from_millis(config.poll_interval_ms));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        info!("listing poll started: {}", config.url);

        loop {
            ticker.tick().await;

            let body = match http.get(&config.url).send().await {
                Ok(resp) => match resp.error_for_status() {
                    Ok(resp) => match resp.text().await {
                        Ok(t) => t,
                        Err(e) => {
                            debug!("listing poll body read failed: {e}");
                            continue;
                        }
                    },
                    Err(e) => {
                        debug!("listing poll HTTP error: {e}");
                        continue;
                    }
                },
                Err(e) => {
                    debug!("listing poll request failed: {e}");
                    continue;
                }
            };

            let listings: Vec<Listing> = match serde_json::from_str(&body) {
                Ok(l) => l,
                Err(e) => {
                    metrics.record_unparseable(
                        EventSource::ListingPoll,
                        &format!("feed shape mismatch: {e}"),
                        &body,
                    );
                    continue;
                }
            };

            for listing in listings {
                if seen.contains(&listing.address) {
                    continue;
                }
                seen.insert(listing.address.clone());
                seen_order.push_back(listing.address.clone());
                while seen_order.len() > SEEN_CAPACITY {
                    if let Some(old) = seen_order.pop_front() {
                        seen.remove(&old);
                    }
                }

                match to_token_event(&listing) {
                    Ok(event) => {
                        if raw_tx.send(event).await.is_err() {
                            return;
                        }
                    }
                    Err(detail) => {
                        metrics.record_unparseable(
                            EventSource::ListingPoll,
                            &detail,
                            &listing.address,
                        );
                    }
                }
            }
        }
    })
}

fn to_token_event(listing: &Listing) -> std::result::Result<TokenEvent, String> {
    let mint = Pubkey::from_str(&listing.address).map_err(|e| format!("bad address: {e}"))?;
    let creator = Pubkey::from_str(&listing.creator).map_err(|e| format!("bad creator: {e}"))?;

    let platform = match listing.platform.as_str() {
        "moonshot" => Platform::Moonshot,
        "amm" | "raydium" => Platform::GraduatedAmm,
        _ => Platform::Pump,
    };

    Ok(TokenEvent {
        mint,
        creator,
        discovered_at: Instant::now(),
        source: EventSource::ListingPoll,
        initial_liquidity_lamports: listing.liquidity_lamports,
        platform,
        name: listing.name.clone(),
        symbol: listing.symbol.clone(),
        metadata_uri: listing.uri.clone(),
        bonding_curve: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_listing_conversion() {
        let listing = Listing {
            address: Pubkey::new_unique().to_string(),
            creator: Pubkey::new_unique().to_string(),
            liquidity_lamports: 10_000_000_000,
            name: "Feed Token".into(),
            symbol: "FEED".into(),
            uri: String::new(),
            platform: "amm".into(),
        };

        let event = to_token_event(&listing).unwrap();
        assert_eq!(event.platform, Platform::GraduatedAmm);
        assert_eq!(event.source, EventSource::ListingPoll);
    }

    #[test]
    fn test_bad_creator_rejected() {
        let listing = Listing {
            address: Pubkey::new_unique().to_string(),
            creator: "not-a-key".into(),
            liquidity_lamports: 0,
            name: String::new(),
            symbol: String::new(),
            uri: String::new(),
            platform: String::new(),
        };
        assert!(to_token_event(&listing).is_err());
    }
}
