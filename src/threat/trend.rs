//! Per-mint composite score trend
//!
//! A 16-slot ring of (timestamp, composite) per mint. The trend is the
//! linear-regression slope over the last 8 points in score-per-minute;
//! acceleration is the slope difference between the two halves of that
//! window. Rising, accelerating risk fires a warning before the level
//! itself crosses a threshold.

use solana_sdk::pubkey::Pubkey;
use std::collections::{HashMap, VecDeque};

/// Ring capacity per mint
const HISTORY_SIZE: usize = 16;

/// Points used for the slope
const TREND_WINDOW: usize = 8;

/// Minimum points before any trend is reported
const MIN_POINTS: usize = 3;

/// Trend analysis for one mint
#[derive(Debug, Clone, Default)]
pub struct TrendAnalysis {
    /// Composite change per minute
    pub trend: f64,
    /// Change in trend between window halves
    pub acceleration: f64,
    pub direction: TrendDirection,
    pub data_points: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TrendDirection {
    #[default]
    Unknown,
    Increasing,
    Decreasing,
    Stable,
}

/// Tracks composite history and answers trend queries
pub struct TrendTracker {
    history: HashMap<Pubkey, VecDeque<(f64, f64)>>,
}

impl TrendTracker {
    pub fn new() -> Self {
        Self {
            history: HashMap::new(),
        }
    }

    /// Record a composite score at a timestamp (seconds, any monotonic base)
    pub fn update(&mut self, mint: Pubkey, timestamp_secs: f64, composite: f64) {
        let ring = self.history.entry(mint).or_default();
        ring.push_back((timestamp_secs, composite));
        while ring.len() > HISTORY_SIZE {
            ring.pop_front();
        }
    }

    /// Analyze the recorded history for a mint
    pub fn analyze(&self, mint: &Pubkey) -> TrendAnalysis {
        let Some(ring) = self.history.get(mint) else {
            return TrendAnalysis::default();
        };

        let data_points = ring.len();
        if data_points < MIN_POINTS {
            return TrendAnalysis {
                data_points,
                ..Default::default()
            };
        }

        let window: Vec<(f64, f64)> = ring
            .iter()
            .skip(ring.len().saturating_sub(TREND_WINDOW))
            .copied()
            .collect();

        let trend = slope_per_minute(&window);

        let mid = window.len() / 2;
        let acceleration = if window.len() >= 4 {
            slope_per_minute(&window[mid..]) - slope_per_minute(&window[..=mid])
        } else {
            0.0
        };

        let direction = if trend.abs() < 0.01 {
            TrendDirection::Stable
        } else if trend > 0.0 {
            TrendDirection::Increasing
        } else {
            TrendDirection::Decreasing
        };

        TrendAnalysis {
            trend,
            acceleration,
            direction,
            data_points,
        }
    }

    /// Drop mints whose latest sample is older than the cutoff
    pub fn evict_stale(&mut self, now_secs: f64, max_age_secs: f64) -> usize {
        let before = self.history.len();
        self.history
            .retain(|_, ring| match ring.back() {
                Some((ts, _)) => now_secs - ts <= max_age_secs,
                None => false,
            });
        before - self.history.len()
    }

    pub fn tracked_mints(&self) -> usize {
        self.history.len()
    }
}

impl Default for TrendTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Least-squares slope in composite-per-minute
fn slope_per_minute(points: &[(f64, f64)]) -> f64 {
    if points.len() < 2 {
        return 0.0;
    }

    let n = points.len() as f64;
    let mean_t = points.iter().map(|(t, _)| t).sum::<f64>() / n;
    let mean_s = points.iter().map(|(_, s)| s).sum::<f64>() / n;

    let numerator: f64 = points
        .iter()
        .map(|(t, s)| (t - mean_t) * (s - mean_s))
        .sum();
    let denominator: f64 = points.iter().map(|(t, _)| (t - mean_t).powi(2)).sum();

    if denominator < 1e-9 {
        return 0.0;
    }

    // Slope is per second; report per minute
    (numerator / denominator) * 60.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_history_is_unknown() {
        let tracker = TrendTracker::new();
        let analysis = tracker.analyze(&Pubkey::new_unique());
        assert_eq!(analysis.direction, TrendDirection::Unknown);
        assert_eq!(analysis.data_points, 0);
    }

    #[test]
    fn test_too_few_points_no_trend() {
        let mut tracker = TrendTracker::new();
        let mint = Pubkey::new_unique();
        tracker.update(mint, 0.0, 0.2);
        tracker.update(mint, 10.0, 0.4);

        let analysis = tracker.analyze(&mint);
        assert_eq!(analysis.direction, TrendDirection::Unknown);
        assert_eq!(analysis.data_points, 2);
    }

    #[test]
    fn test_rising_risk_detected() {
        let mut tracker = TrendTracker::new();
        let mint = Pubkey::new_unique();
        // +0.1 per 10 seconds = +0.6/minute
        for i in 0..6 {
            tracker.update(mint, i as f64 * 10.0, 0.2 + i as f64 * 0.1);
        }

        let analysis = tracker.analyze(&mint);
        assert_eq!(analysis.direction, TrendDirection::Increasing);
        assert!((analysis.trend - 0.6).abs() < 0.01, "trend {}", analysis.trend);
    }

    #[test]
    fn test_acceleration_positive_when_speeding_up() {
        let mut tracker = TrendTracker::new();
        let mint = Pubkey::new_unique();
        // Flat first half, steep second half
        let scores = [0.2, 0.2, 0.2, 0.2, 0.3, 0.5, 0.7, 0.9];
        for (i, s) in scores.iter().enumerate() {
            tracker.update(mint, i as f64 * 10.0, *s);
        }

        let analysis = tracker.analyze(&mint);
        assert!(analysis.acceleration > 0.0);
        assert_eq!(analysis.direction, TrendDirection::Increasing);
    }

    #[test]
    fn test_ring_caps_at_capacity() {
        let mut tracker = TrendTracker::new();
        let mint = Pubkey::new_unique();
        for i in 0..40 {
            tracker.update(mint, i as f64, 0.5);
        }
        assert_eq!(tracker.history.get(&mint).unwrap().len(), HISTORY_SIZE);
    }

    #[test]
    fn test_stale_eviction() {
        let mut tracker = TrendTracker::new();
        let old = Pubkey::new_unique();
        let fresh = Pubkey::new_unique();
        tracker.update(old, 0.0, 0.5);
        tracker.update(fresh, 3500.0, 0.5);

        let evicted = tracker.evict_stale(3600.0, 3600.0);
        assert_eq!(evicted, 1);
        assert_eq!(tracker.tracked_mints(), 1);
    }
}
