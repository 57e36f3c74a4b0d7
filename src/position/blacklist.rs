//! Session blacklist
//!
//! Mints whose positions FAILED are banned for an hour. Cleared on
//! restart by construction; the seed set must be passed explicitly so
//! no hidden default sneaks in.

use dashmap::DashMap;
use solana_sdk::pubkey::Pubkey;
use std::time::{Duration, Instant};

/// Ban duration after a FAILED position
const BAN_DURATION: Duration = Duration::from_secs(3600);

/// Written by the position manager on FAILED transitions; read by the
/// decision pipeline.
pub struct SessionBlacklist {
    entries: DashMap<Pubkey, Instant>,
    ban_duration: Duration,
}

impl SessionBlacklist {
    /// Requires the seed set explicitly, even when empty
    pub fn new(seed: Vec<Pubkey>) -> Self {
        let entries = DashMap::new();
        let now = Instant::now();
        for mint in seed {
            entries.insert(mint, now);
        }
        Self {
            entries,
            ban_duration: BAN_DURATION,
        }
    }

    #[cfg(test)]
    fn with_ban_duration(seed: Vec<Pubkey>, ban_duration: Duration) -> Self {
        let mut this = Self::new(seed);
        this.ban_duration = ban_duration;
        this
    }

    pub fn ban(&self, mint: Pubkey) {
        self.entries.insert(mint, Instant::now());
    }

    /// Check and lazily expire
    pub fn is_banned(&self, mint: &Pubkey) -> bool {
        // Drop the shard guard before removing, or the remove deadlocks
        let expired = {
            match self.entries.get(mint) {
                Some(entry) => {
                    if entry.elapsed() < self.ban_duration {
                        return true;
                    }
                    true
                }
                None => false,
            }
        };

        if expired {
            self.entries.remove(mint);
        }
        false
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ban_and_check() {
        let blacklist = SessionBlacklist::new(vec![]);
        let mint = Pubkey::new_unique();
        assert!(!blacklist.is_banned(&mint));
        blacklist.ban(mint);
        assert!(blacklist.is_banned(&mint));
    }

    #[test]
    fn test_ban_expires() {
        let blacklist =
            SessionBlacklist::with_ban_duration(vec![], Duration::from_millis(1));
        let mint = Pubkey::new_unique();
        blacklist.ban(mint);
        std::thread::sleep(Duration::from_millis(5));
        assert!(!blacklist.is_banned(&mint));
        assert!(blacklist.is_empty());
    }

    #[test]
    fn test_explicit_seed() {
        let mint = Pubkey::new_unique();
        let blacklist = SessionBlacklist::new(vec![mint]);
        assert!(blacklist.is_banned(&mint));
    }
}
