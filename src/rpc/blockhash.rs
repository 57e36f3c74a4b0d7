//! Shared blockhash cache
//!
//! Read by every component that builds transactions; written only by the
//! failover client. TTL is one block interval, so a cached read is never
//! staler than the chain tip by more than one block.

use solana_sdk::hash::Hash;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

#[derive(Debug, Clone, Copy)]
struct CachedBlockhash {
    hash: Hash,
    slot: u64,
    fetched_at: Instant,
}

/// Single-writer blockhash cache with a one-block TTL
pub struct BlockhashCache {
    inner: RwLock<Option<CachedBlockhash>>,
    ttl: Duration,
}

impl BlockhashCache {
    pub fn new(block_interval: Duration) -> Self {
        Self {
            inner: RwLock::new(None),
            ttl: block_interval,
        }
    }

    /// Return the cached value if it is still within the TTL
    pub async fn get(&self) -> Option<(Hash, u64)> {
        let guard = self.inner.read().await;
        guard
            .filter(|c| c.fetched_at.elapsed() < self.ttl)
            .map(|c| (c.hash, c.slot))
    }

    /// Store a freshly fetched value. A new hash replaces the old entry
    /// immediately; re-storing the same hash only refreshes the TTL.
    pub async fn store(&self, hash: Hash, slot: u64) {
        let mut guard = self.inner.write().await;
        *guard = Some(CachedBlockhash {
            hash,
            slot,
            fetched_at: Instant::now(),
        });
    }

    /// Drop the cached value (used when a submit fails with stale state)
    pub async fn invalidate(&self) {
        let mut guard = self.inner.write().await;
        *guard = None;
    }
}
