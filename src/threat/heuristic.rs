//! Heuristic trait and concurrent dispatch
//!
//! A heuristic answers one question about a token with a score in
//! [0, 1] (0 safe, 1 hostile) or `Unknown` when it cannot tell. The
//! engine runs all of them concurrently under one deadline; overruns
//! and failures both degrade to `Unknown`, never to an error.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::listener::TokenEvent;
use crate::rpc::FailoverClient;

use super::reputation::CreatorReputationStore;
use super::snapshot::TokenSnapshot;

/// Which weighted bucket a heuristic feeds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Bucket {
    Risk,
    Technical,
    Market,
}

impl Bucket {
    /// Fixed composite weights: 40/30/30
    pub fn weight(&self) -> f64 {
        match self {
            Bucket::Risk => 0.4,
            Bucket::Technical => 0.3,
            Bucket::Market => 0.3,
        }
    }
}

/// Result of one heuristic
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// 0.0 safe .. 1.0 hostile
    Score(f64),
    /// The heuristic could not produce evidence (missing data, deadline)
    Unknown(&'static str),
}

/// Everything a heuristic may look at
pub struct HeuristicInput<'a> {
    pub event: &'a TokenEvent,
    pub snapshot: &'a TokenSnapshot,
    pub client: &'a FailoverClient,
    pub reputation: &'a CreatorReputationStore,
}

/// One question about a token
#[async_trait]
pub trait Heuristic: Send + Sync {
    fn name(&self) -> &'static str;
    fn bucket(&self) -> Bucket;
    async fn evaluate(&self, input: &HeuristicInput<'_>) -> Outcome;
}

/// Named outcome after the sweep
#[derive(Debug, Clone)]
pub struct SweepResult {
    pub name: &'static str,
    pub bucket: Bucket,
    pub outcome: Outcome,
}

/// Run every heuristic concurrently; each gets the same deadline, so
/// wall time for the sweep is one deadline, not a sum.
pub async fn run_sweep(
    registry: &[Arc<dyn Heuristic>],
    input: &HeuristicInput<'_>,
    deadline: Duration,
) -> Vec<SweepResult> {
    let futures = registry.iter().map(|h| {
        let heuristic = Arc::clone(h);
        async move {
            let outcome = match tokio::time::timeout(deadline, heuristic.evaluate(input)).await {
                Ok(outcome) => outcome,
                Err(_) => Outcome::Unknown("deadline exceeded"),
            };
            SweepResult {
                name: heuristic.name(),
                bucket: heuristic.bucket(),
                outcome,
            }
        }
    });

    futures_util::future::join_all(futures).await
}

#[cfg(test)]
pub(crate) fn test_event() -> TokenEvent {
    use crate::listener::{EventSource, Platform};
    use solana_sdk::pubkey::Pubkey;

    TokenEvent {
        mint: Pubkey::new_unique(),
        creator: Pubkey::new_unique(),
        discovered_at: std::time::Instant::now(),
        source: EventSource::TxLogs,
        initial_liquidity_lamports: 10_000_000_000,
        platform: Platform::Pump,
        name: "Test Token".into(),
        symbol: "TST".into(),
        metadata_uri: "https://meta.example/t.json".into(),
        bonding_curve: Some(Pubkey::new_unique()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    struct FastHeuristic;

    #[async_trait]
    impl Heuristic for FastHeuristic {
        fn name(&self) -> &'static str {
            "fast"
        }
        fn bucket(&self) -> Bucket {
            Bucket::Market
        }
        async fn evaluate(&self, _input: &HeuristicInput<'_>) -> Outcome {
            Outcome::Score(0.2)
        }
    }

    struct SlowHeuristic;

    #[async_trait]
    impl Heuristic for SlowHeuristic {
        fn name(&self) -> &'static str {
            "slow"
        }
        fn bucket(&self) -> Bucket {
            Bucket::Risk
        }
        async fn evaluate(&self, _input: &HeuristicInput<'_>) -> Outcome {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Outcome::Score(1.0)
        }
    }

    #[tokio::test]
    async fn test_sweep_times_out_slow_heuristics() {
        let registry: Vec<Arc<dyn Heuristic>> =
            vec![Arc::new(FastHeuristic), Arc::new(SlowHeuristic)];

        let event = test_event();
        let snapshot = TokenSnapshot::default();
        let client = crate::rpc::FailoverClient::new(&crate::config::Config::default().rpc).unwrap();
        let reputation = CreatorReputationStore::in_memory();
        let input = HeuristicInput {
            event: &event,
            snapshot: &snapshot,
            client: &client,
            reputation: &reputation,
        };

        let started = Instant::now();
        let results = run_sweep(&registry, &input, Duration::from_millis(50)).await;
        assert!(started.elapsed() < Duration::from_secs(1));

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].outcome, Outcome::Score(0.2));
        assert!(matches!(results[1].outcome, Outcome::Unknown(_)));
    }

    #[test]
    fn test_bucket_weights_sum_to_one() {
        let sum = Bucket::Risk.weight() + Bucket::Technical.weight() + Bucket::Market.weight();
        assert!((sum - 1.0).abs() < f64::EPSILON);
    }
}
