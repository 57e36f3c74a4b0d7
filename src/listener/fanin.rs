//! Bounded fan-in channel with drop-oldest backpressure
//!
//! The merged token-event stream prefers freshness over completeness:
//! when the buffer is full the oldest unread event is discarded and the
//! drop counter incremented. A stale launch is a worthless launch.

use std::collections::VecDeque;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

use super::{SharedMetrics, TokenEvent};

/// Sending half handed to each source adapter (after dedup)
#[derive(Clone)]
pub struct FanInSender {
    buffer: Arc<Mutex<VecDeque<TokenEvent>>>,
    capacity: usize,
    notify: mpsc::Sender<()>,
    metrics: SharedMetrics,
}

impl FanInSender {
    /// Enqueue an event, evicting the oldest if the buffer is full
    pub fn send(&self, event: TokenEvent) {
        {
            let mut buffer = match self.buffer.lock() {
                Ok(g) => g,
                Err(poisoned) => poisoned.into_inner(),
            };

            if buffer.len() >= self.capacity {
                buffer.pop_front();
                self.metrics.dropped.fetch_add(1, Ordering::Relaxed);
                tracing::debug!("fan-in full, dropped oldest token event");
            }
            buffer.push_back(event);
        }

        // Wake the consumer; a full notify queue already guarantees a wakeup
        let _ = self.notify.try_send(());
    }
}

/// Receiving half owned by the pipeline task
pub struct FanIn {
    buffer: Arc<Mutex<VecDeque<TokenEvent>>>,
    notify_rx: mpsc::Receiver<()>,
    metrics: SharedMetrics,
}

impl FanIn {
    pub fn new(capacity: usize, metrics: SharedMetrics) -> (FanInSender, FanIn) {
        let buffer = Arc::new(Mutex::new(VecDeque::with_capacity(capacity)));
        let (notify, notify_rx) = mpsc::channel(capacity.max(1));

        let sender = FanInSender {
            buffer: Arc::clone(&buffer),
            capacity,
            notify,
            metrics: Arc::clone(&metrics),
        };

        let receiver = FanIn {
            buffer,
            notify_rx,
            metrics,
        };

        (sender, receiver)
    }

    /// Wait for the next event. Returns None when every sender is gone
    /// and the buffer has drained.
    pub async fn recv(&mut self) -> Option<TokenEvent> {
        loop {
            if let Some(event) = self.pop() {
                self.metrics.events_out.fetch_add(1, Ordering::Relaxed);
                return Some(event);
            }
            self.notify_rx.recv().await?;
        }
    }

    fn pop(&self) -> Option<TokenEvent> {
        let mut buffer = match self.buffer.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        buffer.pop_front()
    }

    pub fn len(&self) -> usize {
        self.buffer.lock().map(|b| b.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::listener::{EventSource, ListenerMetrics, Platform};
    use solana_sdk::pubkey::Pubkey;
    use std::time::Instant;

    fn event(n: &str) -> TokenEvent {
        TokenEvent {
            mint: Pubkey::new_unique(),
            creator: Pubkey::new_unique(),
            discovered_at: Instant::now(),
            source: EventSource::TxLogs,
            initial_liquidity_lamports: 1_000_000_000,
            platform: Platform::Pump,
            name: n.to_string(),
            symbol: "TST".to_string(),
            metadata_uri: String::new(),
            bonding_curve: None,
        }
    }

    #[tokio::test]
    async fn test_send_recv_order() {
        let metrics = Arc::new(ListenerMetrics::default());
        let (tx, mut rx) = FanIn::new(8, metrics);

        tx.send(event("a"));
        tx.send(event("b"));

        assert_eq!(rx.recv().await.unwrap().name, "a");
        assert_eq!(rx.recv().await.unwrap().name, "b");
    }

    #[tokio::test]
    async fn test_full_buffer_drops_oldest() {
        let metrics = Arc::new(ListenerMetrics::default());
        let (tx, mut rx) = FanIn::new(2, Arc::clone(&metrics));

        tx.send(event("a"));
        tx.send(event("b"));
        tx.send(event("c")); // evicts "a"

        assert_eq!(metrics.dropped.load(Ordering::Relaxed), 1);
        assert_eq!(rx.recv().await.unwrap().name, "b");
        assert_eq!(rx.recv().await.unwrap().name, "c");
    }

    #[tokio::test]
    async fn test_recv_returns_none_when_senders_dropped() {
        let metrics = Arc::new(ListenerMetrics::default());
        let (tx, mut rx) = FanIn::new(2, metrics);

        tx.send(event("a"));
        drop(tx);

        assert_eq!(rx.recv().await.unwrap().name, "a");
        assert!(rx.recv().await.is_none());
    }
}
