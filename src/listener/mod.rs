//! Listener module - Token-event ingestion from multiple sources
//!
//! Four source adapters feed one deduped `TokenEvent` channel:
//! - transaction-log subscription on the curve launchpad program
//! - confirmed-block subscription on the graduated AMM program
//! - sidecar index WebSocket feed
//! - polled third-party listing feed
//!
//! Events are best-effort ordered by arrival; downstream consumers must
//! tolerate out-of-order mints.

pub mod block_feed;
pub mod dedup;
pub mod fanin;
pub mod listing_poll;
pub mod sidecar;
pub mod tx_logs;

use serde::Serialize;
use solana_sdk::pubkey::Pubkey;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

pub use dedup::{DedupWindow, Observation};
pub use fanin::{FanIn, FanInSender};

/// Which venue launched the token
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    /// Primary bonding-curve launchpad
    Pump,
    /// Secondary bonding-curve launchpad
    Moonshot,
    /// Token already graduated to an AMM pool
    GraduatedAmm,
}

/// Which listener produced an event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventSource {
    TxLogs,
    BlockFeed,
    SidecarIndex,
    ListingPoll,
}

/// One newly observed token
#[derive(Debug, Clone)]
pub struct TokenEvent {
    pub mint: Pubkey,
    pub creator: Pubkey,
    /// Monotonic discovery timestamp, used for age math
    pub discovered_at: Instant,
    pub source: EventSource,
    /// Native-asset liquidity at discovery, in lamports
    pub initial_liquidity_lamports: u64,
    pub platform: Platform,
    pub name: String,
    pub symbol: String,
    pub metadata_uri: String,
    /// Curve account when the token is still on a launchpad
    pub bonding_curve: Option<Pubkey>,
}

impl TokenEvent {
    pub fn age_secs(&self) -> f64 {
        self.discovered_at.elapsed().as_secs_f64()
    }

    pub fn initial_liquidity_sol(&self) -> f64 {
        self.initial_liquidity_lamports as f64 / 1e9
    }
}

/// Counters shared by the adapters and the fan-in task.
///
/// Unparseable payloads are logged and counted here, never propagated.
#[derive(Debug, Default)]
pub struct ListenerMetrics {
    pub events_in: AtomicU64,
    pub events_out: AtomicU64,
    pub duplicates: AtomicU64,
    pub dropped: AtomicU64,
    pub unparseable: AtomicU64,
    pub stream_gaps: AtomicU64,
}

impl ListenerMetrics {
    pub fn record_unparseable(&self, source: EventSource, detail: &str, payload: &str) {
        self.unparseable.fetch_add(1, Ordering::Relaxed);
        tracing::warn!(
            source = ?source,
            detail,
            payload = %payload.chars().take(200).collect::<String>(),
            "unparseable event"
        );
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            events_in: self.events_in.load(Ordering::Relaxed),
            events_out: self.events_out.load(Ordering::Relaxed),
            duplicates: self.duplicates.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            unparseable: self.unparseable.load(Ordering::Relaxed),
            stream_gaps: self.stream_gaps.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of the listener counters
#[derive(Debug, Clone, Copy, Serialize)]
pub struct MetricsSnapshot {
    pub events_in: u64,
    pub events_out: u64,
    pub duplicates: u64,
    pub dropped: u64,
    pub unparseable: u64,
    pub stream_gaps: u64,
}

/// Shared handle the adapters push through
pub type SharedMetrics = Arc<ListenerMetrics>;

/// Spawn the merge task sitting between the raw adapter channel and the
/// deduped fan-in. Sole writer of the dedup window.
pub fn spawn_merge_task(
    mut raw_rx: tokio::sync::mpsc::Receiver<TokenEvent>,
    mut dedup: DedupWindow,
    out: FanInSender,
    metrics: SharedMetrics,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = raw_rx.recv().await {
            metrics.events_in.fetch_add(1, Ordering::Relaxed);
            match dedup.observe(event.mint) {
                Observation::First => out.send(event),
                Observation::Duplicate(count) => {
                    metrics.duplicates.fetch_add(1, Ordering::Relaxed);
                    tracing::debug!(
                        mint = %event.mint,
                        source = ?event.source,
                        count,
                        "duplicate observation suppressed"
                    );
                }
            }
        }
        tracing::info!("listener merge task stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant as StdInstant;

    fn event(mint: Pubkey, source: EventSource) -> TokenEvent {
        TokenEvent {
            mint,
            creator: Pubkey::new_unique(),
            discovered_at: StdInstant::now(),
            source,
            initial_liquidity_lamports: 0,
            platform: Platform::Pump,
            name: String::new(),
            symbol: String::new(),
            metadata_uri: String::new(),
            bonding_curve: None,
        }
    }

    #[tokio::test]
    async fn test_merge_dedups_across_sources() {
        let metrics: SharedMetrics = Arc::new(ListenerMetrics::default());
        let (raw_tx, raw_rx) = tokio::sync::mpsc::channel(16);
        let dedup = DedupWindow::new(100);
        let counts = dedup.counts_handle();
        let (fan_tx, mut fan_rx) = FanIn::new(16, Arc::clone(&metrics));

        let task = spawn_merge_task(raw_rx, dedup, fan_tx, Arc::clone(&metrics));

        let mint = Pubkey::new_unique();
        raw_tx.send(event(mint, EventSource::TxLogs)).await.unwrap();
        raw_tx
            .send(event(mint, EventSource::SidecarIndex))
            .await
            .unwrap();
        drop(raw_tx);
        task.await.unwrap();

        // Exactly one downstream event, observation counter at 2
        let first = fan_rx.recv().await.unwrap();
        assert_eq!(first.mint, mint);
        assert_eq!(first.source, EventSource::TxLogs);
        assert!(fan_rx.recv().await.is_none());
        assert_eq!(*counts.get(&mint).unwrap(), 2);
        assert_eq!(metrics.duplicates.load(Ordering::Relaxed), 1);
    }
}
