//! Mint-address dedup window
//!
//! A size-bounded LRU over the last N mints (50,000 by default, roughly a
//! minute at realistic launch rates). The first observation of a mint
//! passes; later observations within the window only bump a per-mint
//! counter, which the threat engine reads as cross-source confirmation.
//!
//! Written only by the fan-in task; the observation table is shared
//! read-only with scoring.

use dashmap::DashMap;
use solana_sdk::pubkey::Pubkey;
use std::collections::VecDeque;
use std::sync::Arc;

/// Outcome of offering a mint to the window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Observation {
    /// First time inside the window: propagate downstream
    First,
    /// Seen before: suppressed, counter now at the contained value
    Duplicate(u32),
}

pub struct DedupWindow {
    capacity: usize,
    order: VecDeque<Pubkey>,
    counts: Arc<DashMap<Pubkey, u32>>,
}

impl DedupWindow {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            order: VecDeque::with_capacity(capacity),
            counts: Arc::new(DashMap::new()),
        }
    }

    /// Offer a mint; returns whether it is new inside the window
    pub fn observe(&mut self, mint: Pubkey) -> Observation {
        if let Some(mut entry) = self.counts.get_mut(&mint) {
            *entry += 1;
            return Observation::Duplicate(*entry);
        }

        self.counts.insert(mint, 1);
        self.order.push_back(mint);

        while self.order.len() > self.capacity {
            if let Some(evicted) = self.order.pop_front() {
                self.counts.remove(&evicted);
            }
        }

        Observation::First
    }

    /// How many times a mint has been observed inside the window
    pub fn observation_count(&self, mint: &Pubkey) -> u32 {
        self.counts.get(mint).map(|e| *e).unwrap_or(0)
    }

    /// Shared read handle for cross-source confirmation scoring
    pub fn counts_handle(&self) -> Arc<DashMap<Pubkey, u32>> {
        Arc::clone(&self.counts)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}
