//! Per-strategy performance tracking
//!
//! Fed by the position manager on every close; read by sizing (Kelly
//! clamp) and the status surfaces.

use dashmap::DashMap;
use serde::Serialize;

/// Trades required before realized stats influence sizing
pub const KELLY_MIN_SAMPLES: u32 = 20;

/// Fractional-Kelly cap as a share of the strategy's allocation
pub const KELLY_FRACTION_CAP: f64 = 0.25;

/// Running record for one strategy
#[derive(Debug, Clone, Default, Serialize)]
pub struct StrategyStats {
    pub trades: u32,
    pub wins: u32,
    pub losses: u32,
    pub total_pnl_sol: f64,
    pub total_hold_secs: f64,
    pub total_confidence: f64,
}

impl StrategyStats {
    pub fn win_rate(&self) -> f64 {
        if self.trades == 0 {
            return 0.0;
        }
        self.wins as f64 / self.trades as f64
    }

    pub fn avg_hold_secs(&self) -> f64 {
        if self.trades == 0 {
            return 0.0;
        }
        self.total_hold_secs / self.trades as f64
    }

    pub fn avg_confidence(&self) -> f64 {
        if self.trades == 0 {
            return 0.0;
        }
        self.total_confidence / self.trades as f64
    }

    /// Half-Kelly fraction from the realized win rate, assuming roughly
    /// symmetric win/loss sizes. None until enough samples exist.
    pub fn kelly_fraction(&self) -> Option<f64> {
        if self.trades < KELLY_MIN_SAMPLES {
            return None;
        }
        let p = self.win_rate();
        let kelly = 2.0 * p - 1.0;
        Some((kelly * 0.5).clamp(0.0, KELLY_FRACTION_CAP))
    }
}

/// Stats for all strategies, keyed by tag
#[derive(Default)]
pub struct StatsBook {
    book: DashMap<String, StrategyStats>,
}

impl StatsBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_close(&self, tag: &str, pnl_sol: f64, hold_secs: f64, confidence: f64) {
        let mut stats = self.book.entry(tag.to_string()).or_default();
        stats.trades += 1;
        if pnl_sol >= 0.0 {
            stats.wins += 1;
        } else {
            stats.losses += 1;
        }
        stats.total_pnl_sol += pnl_sol;
        stats.total_hold_secs += hold_secs;
        stats.total_confidence += confidence;
    }

    pub fn get(&self, tag: &str) -> Option<StrategyStats> {
        self.book.get(tag).map(|s| s.clone())
    }

    /// Snapshot for the status surfaces
    pub fn snapshot(&self) -> Vec<(String, StrategyStats)> {
        self.book
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect()
    }
}
