//! Per-endpoint health metrics
//!
//! Each provider carries latency and success-rate EMAs plus a recency
//! factor, combined into a score in [0, 1]. The score decides routing:
//! HEALTHY endpoints are preferred, DEGRADED are fallback, UNHEALTHY are
//! last resort.

use serde::Serialize;
use std::time::Instant;

/// Latency considered "very bad" when normalizing into the score
const LATENCY_CEILING_MS: f64 = 1000.0;

/// Horizon over which the recency factor decays to zero
const RECENCY_HORIZON_SECS: f64 = 60.0;

/// EMA smoothing for latency
const LATENCY_ALPHA: f64 = 0.2;

/// EMA smoothing for success rate (slower: ~100-request window)
const SUCCESS_ALPHA: f64 = 0.05;

/// RPC provider health status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderStatus {
    Healthy,
    Degraded,
    Unhealthy,
    Unknown,
}

/// Health metrics for one RPC endpoint.
///
/// Owned by the failover client; nothing else writes these.
#[derive(Debug, Clone)]
pub struct ProviderHealth {
    pub endpoint_url: String,
    pub status: ProviderStatus,
    pub latency_ema_ms: f64,
    pub success_rate: f64,
    pub consecutive_failures: u32,
    pub last_success_at: Option<Instant>,
    pub score: f64,
    pub last_error: Option<String>,
    max_consecutive_failures: u32,
}

impl ProviderHealth {
    pub fn new(endpoint_url: String, max_consecutive_failures: u32) -> Self {
        Self {
            endpoint_url,
            status: ProviderStatus::Unknown,
            latency_ema_ms: 0.0,
            success_rate: 1.0,
            consecutive_failures: 0,
            last_success_at: None,
            score: 0.5,
            last_error: None,
            max_consecutive_failures,
        }
    }

    /// Update metrics after a successful request
    pub fn record_success(&mut self, latency_ms: f64) {
        self.latency_ema_ms = if self.last_success_at.is_none() && self.latency_ema_ms == 0.0 {
            latency_ms
        } else {
            LATENCY_ALPHA * latency_ms + (1.0 - LATENCY_ALPHA) * self.latency_ema_ms
        };
        self.success_rate = SUCCESS_ALPHA + (1.0 - SUCCESS_ALPHA) * self.success_rate;
        self.consecutive_failures = 0;
        self.last_success_at = Some(Instant::now());
        self.last_error = None;
        self.recompute();
    }

    /// Update metrics after a failed request
    pub fn record_failure(&mut self, error: &str) {
        self.success_rate *= 1.0 - SUCCESS_ALPHA;
        self.consecutive_failures += 1;
        self.last_error = Some(error.to_string());
        self.recompute();
    }

    /// Recompute score and status from current metrics
    fn recompute(&mut self) {
        let normalized_latency = (self.latency_ema_ms / LATENCY_CEILING_MS).min(1.0);
        let recency = match self.last_success_at {
            Some(at) => (1.0 - at.elapsed().as_secs_f64() / RECENCY_HORIZON_SECS).max(0.0),
            None => 0.0,
        };

        self.score = 0.4 * (1.0 - normalized_latency) + 0.4 * self.success_rate + 0.2 * recency;

        // Consecutive failures force UNHEALTHY regardless of the score
        self.status = if self.consecutive_failures >= self.max_consecutive_failures
            || self.score < 0.3
        {
            ProviderStatus::Unhealthy
        } else if self.score < 0.7 {
            ProviderStatus::Degraded
        } else {
            ProviderStatus::Healthy
        };
    }

    /// Routing rank: lower is preferred. Status buckets first, then score.
    pub fn routing_rank(&self) -> (u8, i64) {
        let bucket = match self.status {
            ProviderStatus::Healthy => 0,
            ProviderStatus::Degraded => 1,
            ProviderStatus::Unknown => 2,
            ProviderStatus::Unhealthy => 3,
        };
        // Negate score so ascending sort puts the best first
        (bucket, -(self.score * 1e6) as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_provider_is_unknown() {
        let h = ProviderHealth::new("https://a".into(), 3);
        assert_eq!(h.status, ProviderStatus::Unknown);
        assert_eq!(h.score, 0.5);
    }

    #[test]
    fn test_success_marks_healthy() {
        let mut h = ProviderHealth::new("https://a".into(), 3);
        h.record_success(50.0);
        assert_eq!(h.status, ProviderStatus::Healthy);
        assert!(h.score > 0.7, "score was {}", h.score);
        assert_eq!(h.consecutive_failures, 0);
    }

    #[test]
    fn test_consecutive_failures_force_unhealthy() {
        let mut h = ProviderHealth::new("https://a".into(), 3);
        h.record_success(50.0);
        h.record_failure("timeout");
        h.record_failure("timeout");
        assert_ne!(h.status, ProviderStatus::Unhealthy);
        h.record_failure("timeout");
        assert_eq!(h.status, ProviderStatus::Unhealthy);
    }

    #[test]
    fn test_latency_ema() {
        let mut h = ProviderHealth::new("https://a".into(), 3);
        h.record_success(100.0);
        assert!((h.latency_ema_ms - 100.0).abs() < f64::EPSILON);
        h.record_success(200.0);
        // 0.2 * 200 + 0.8 * 100 = 120
        assert!((h.latency_ema_ms - 120.0).abs() < 1e-9);
    }

    #[test]
    fn test_routing_rank_prefers_healthy_over_degraded() {
        let mut healthy = ProviderHealth::new("https://a".into(), 3);
        healthy.record_success(50.0);

        let mut degraded = ProviderHealth::new("https://b".into(), 3);
        degraded.record_success(50.0);
        for _ in 0..2 {
            degraded.record_failure("5xx");
        }

        assert!(healthy.routing_rank() < degraded.routing_rank());
    }

    #[test]
    fn test_slow_endpoint_scores_below_fast() {
        let mut fast = ProviderHealth::new("https://a".into(), 3);
        fast.record_success(30.0);
        let mut slow = ProviderHealth::new("https://b".into(), 3);
        slow.record_success(900.0);
        assert!(fast.score > slow.score);
    }
}
