//! Market-health heuristics (30% of the composite)
//!
//! Thin books, dead flow, and single-digit holder counts kill more
//! positions than outright scams do. These score the venue, not the
//! token's intent.

use async_trait::async_trait;

use super::heuristic::{Bucket, Heuristic, HeuristicInput, Outcome};

/// Native-asset depth actually available to trade against
pub struct LiquidityDepthCheck;

#[async_trait]
impl Heuristic for LiquidityDepthCheck {
    fn name(&self) -> &'static str {
        "liquidity_depth"
    }
    fn bucket(&self) -> Bucket {
        Bucket::Market
    }

    async fn evaluate(&self, input: &HeuristicInput<'_>) -> Outcome {
        // Live curve reserves beat the liquidity snapshot from discovery
        let lamports = match &input.snapshot.curve {
            Some(curve) => curve.real_sol_reserves + curve.virtual_sol_reserves / 10,
            None => input.event.initial_liquidity_lamports,
        };

        if lamports == 0 {
            return Outcome::Unknown("no liquidity data");
        }

        let sol = lamports as f64 / 1e9;
        // Under 1 SOL nothing exits cleanly; 30+ SOL is a real book
        Outcome::Score((1.0 - (sol / 30.0)).clamp(0.0, 1.0) * 0.9)
    }
}

/// Recent trade flow against an age-normalized baseline
pub struct VolumeProfileCheck;

#[async_trait]
impl Heuristic for VolumeProfileCheck {
    fn name(&self) -> &'static str {
        "volume_profile"
    }
    fn bucket(&self) -> Bucket {
        Bucket::Market
    }

    async fn evaluate(&self, input: &HeuristicInput<'_>) -> Outcome {
        let Some(signatures) = &input.snapshot.signatures else {
            return Outcome::Unknown("signature history unavailable");
        };

        let age_mins = (input.event.age_secs() / 60.0).max(0.5);
        let tx_per_min = signatures.len() as f64 / age_mins;

        // Dead flow and botted flow are both bad; the healthy band for a
        // fresh launch is single-digit organic trades per minute
        let score = if tx_per_min < 0.5 {
            0.7
        } else if tx_per_min > 120.0 {
            0.6
        } else if tx_per_min > 40.0 {
            0.35
        } else {
            0.15
        };

        Outcome::Score(score)
    }
}

/// New tokens are risky by default; the factor decays with age
pub struct AgeMaturityCheck;

#[async_trait]
impl Heuristic for AgeMaturityCheck {
    fn name(&self) -> &'static str {
        "age_maturity"
    }
    fn bucket(&self) -> Bucket {
        Bucket::Market
    }

    async fn evaluate(&self, input: &HeuristicInput<'_>) -> Outcome {
        let age = input.event.age_secs();
        let score = if age < 60.0 {
            0.8
        } else if age < 600.0 {
            0.5
        } else if age < 3600.0 {
            0.3
        } else {
            0.15
        };
        Outcome::Score(score)
    }
}

/// Breadth of the holder base
pub struct HolderCountCheck;

#[async_trait]
impl Heuristic for HolderCountCheck {
    fn name(&self) -> &'static str {
        "holder_count"
    }
    fn bucket(&self) -> Bucket {
        Bucket::Market
    }

    async fn evaluate(&self, input: &HeuristicInput<'_>) -> Outcome {
        let Some(holders) = &input.snapshot.holders else {
            return Outcome::Unknown("holder list unavailable");
        };

        // The largest-accounts call returns at most 20 entries; fewer
        // than that IS the holder count, a full page means "20 or more"
        let count = holders.iter().filter(|(_, ui)| *ui > 0.0).count();
        let score = match count {
            0..=3 => 0.85,
            4..=9 => 0.6,
            10..=19 => 0.35,
            _ => 0.15,
        };
        Outcome::Score(score)
    }
}

/// How many independent sources reported this launch
pub struct CrossSourceConfirmation;

#[async_trait]
impl Heuristic for CrossSourceConfirmation {
    fn name(&self) -> &'static str {
        "cross_source_confirmation"
    }
    fn bucket(&self) -> Bucket {
        Bucket::Market
    }

    async fn evaluate(&self, input: &HeuristicInput<'_>) -> Outcome {
        let score = match input.snapshot.observations {
            0 | 1 => 0.55,
            2 => 0.3,
            _ => 0.1,
        };
        Outcome::Score(score)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::SignatureInfo;
    use crate::threat::heuristic::test_event;
    use crate::threat::reputation::CreatorReputationStore;
    use crate::threat::snapshot::TokenSnapshot;

    async fn run(heuristic: &dyn Heuristic, snapshot: &TokenSnapshot) -> Outcome {
        let event = test_event();
        let client = crate::rpc::FailoverClient::new(&crate::config::Config::default().rpc).unwrap();
        let reputation = CreatorReputationStore::in_memory();
        let input = HeuristicInput {
            event: &event,
            snapshot,
            client: &client,
            reputation: &reputation,
        };
        heuristic.evaluate(&input).await
    }

    #[tokio::test]
    async fn test_deep_liquidity_scores_low() {
        let mut snapshot = TokenSnapshot::default();
        let mut curve = crate::chain::curve::test_curve();
        curve.real_sol_reserves = 40_000_000_000; // 40 SOL
        snapshot.curve = Some(curve);

        match run(&LiquidityDepthCheck, &snapshot).await {
            Outcome::Score(s) => assert!(s < 0.1, "score was {s}"),
            other => panic!("expected score, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_thin_liquidity_scores_high() {
        let mut snapshot = TokenSnapshot::default();
        let mut curve = crate::chain::curve::test_curve();
        curve.real_sol_reserves = 200_000_000; // 0.2 SOL
        curve.virtual_sol_reserves = 1_000_000_000;
        snapshot.curve = Some(curve);

        match run(&LiquidityDepthCheck, &snapshot).await {
            Outcome::Score(s) => assert!(s > 0.7, "score was {s}"),
            other => panic!("expected score, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_few_holders_scores_high() {
        let snapshot = TokenSnapshot {
            holders: Some(vec![("a".into(), 100.0), ("b".into(), 50.0)]),
            ..Default::default()
        };
        match run(&HolderCountCheck, &snapshot).await {
            Outcome::Score(s) => assert!(s > 0.8),
            other => panic!("expected score, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_cross_source_confirmation_tiers() {
        let single = TokenSnapshot {
            observations: 1,
            ..Default::default()
        };
        let triple = TokenSnapshot {
            observations: 3,
            ..Default::default()
        };

        let Outcome::Score(s1) = run(&CrossSourceConfirmation, &single).await else {
            panic!()
        };
        let Outcome::Score(s3) = run(&CrossSourceConfirmation, &triple).await else {
            panic!()
        };
        assert!(s1 > s3);
    }

    #[tokio::test]
    async fn test_dead_flow_scores_high() {
        let snapshot = TokenSnapshot {
            signatures: Some(Vec::<SignatureInfo>::new()),
            ..Default::default()
        };
        match run(&VolumeProfileCheck, &snapshot).await {
            Outcome::Score(s) => assert!(s >= 0.7),
            other => panic!("expected score, got {other:?}"),
        }
    }
}
