//! Risk-bucket heuristics (40% of the composite)
//!
//! Rug-shaped signals: authority configuration, holder concentration,
//! creator history and exit behavior, liquidity drain, and
//! trading-pattern analysis over the token's early transactions.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use crate::chain::mint::MintExtension;

use super::heuristic::{Bucket, Heuristic, HeuristicInput, Outcome};

/// Early transactions fetched for pattern heuristics
const PATTERN_TX_FETCH: usize = 8;

/// Sell-probe size used against the curve quote, in token base units
const PROBE_SELL_AMOUNT: u64 = 1_000_000;

/// Can the token actually be sold back to the venue
pub struct HoneypotProbe;

#[async_trait]
impl Heuristic for HoneypotProbe {
    fn name(&self) -> &'static str {
        "honeypot_probe"
    }
    fn bucket(&self) -> Bucket {
        Bucket::Risk
    }

    async fn evaluate(&self, input: &HeuristicInput<'_>) -> Outcome {
        let Some(curve) = &input.snapshot.curve else {
            return Outcome::Unknown("no curve state");
        };

        if curve.complete {
            // Curve closed: sells only work if the AMM pool exists, which
            // we have not observed yet at discovery time
            return Outcome::Score(0.8);
        }

        match curve.quote_sell(PROBE_SELL_AMOUNT) {
            Ok(0) => Outcome::Score(0.95),
            Ok(_) => Outcome::Score(0.05),
            Err(_) => Outcome::Score(0.9),
        }
    }
}

/// Mint authority still present: supply can be inflated at will
pub struct MintAuthorityCheck;

#[async_trait]
impl Heuristic for MintAuthorityCheck {
    fn name(&self) -> &'static str {
        "mint_authority"
    }
    fn bucket(&self) -> Bucket {
        Bucket::Risk
    }

    async fn evaluate(&self, input: &HeuristicInput<'_>) -> Outcome {
        match &input.snapshot.mint_summary {
            Some(summary) => Outcome::Score(if summary.mint_authority.is_some() {
                0.8
            } else {
                0.0
            }),
            None => Outcome::Unknown("mint account unavailable"),
        }
    }
}

/// Freeze authority still present: holders can be frozen out of selling
pub struct FreezeAuthorityCheck;

#[async_trait]
impl Heuristic for FreezeAuthorityCheck {
    fn name(&self) -> &'static str {
        "freeze_authority"
    }
    fn bucket(&self) -> Bucket {
        Bucket::Risk
    }

    async fn evaluate(&self, input: &HeuristicInput<'_>) -> Outcome {
        match &input.snapshot.mint_summary {
            Some(summary) => Outcome::Score(if summary.freeze_authority.is_some() {
                0.9
            } else {
                0.0
            }),
            None => Outcome::Unknown("mint account unavailable"),
        }
    }
}

/// Permanent delegate extension: issuer can move anyone's tokens
pub struct PermanentDelegateCheck;

#[async_trait]
impl Heuristic for PermanentDelegateCheck {
    fn name(&self) -> &'static str {
        "permanent_delegate"
    }
    fn bucket(&self) -> Bucket {
        Bucket::Risk
    }

    async fn evaluate(&self, input: &HeuristicInput<'_>) -> Outcome {
        match &input.snapshot.mint_summary {
            Some(summary) => {
                let present = summary
                    .extensions
                    .contains(&MintExtension::PermanentDelegate);
                Outcome::Score(if present { 1.0 } else { 0.0 })
            }
            None => Outcome::Unknown("mint account unavailable"),
        }
    }
}

/// Transfer hook extension: arbitrary code runs on every transfer
pub struct TransferHookCheck;

#[async_trait]
impl Heuristic for TransferHookCheck {
    fn name(&self) -> &'static str {
        "transfer_hook"
    }
    fn bucket(&self) -> Bucket {
        Bucket::Risk
    }

    async fn evaluate(&self, input: &HeuristicInput<'_>) -> Outcome {
        match &input.snapshot.mint_summary {
            Some(summary) => {
                let present = summary.extensions.contains(&MintExtension::TransferHook);
                Outcome::Score(if present { 0.9 } else { 0.0 })
            }
            None => Outcome::Unknown("mint account unavailable"),
        }
    }
}

/// Share of supply held by the top holders outside the curve
pub struct HolderConcentration;

#[async_trait]
impl Heuristic for HolderConcentration {
    fn name(&self) -> &'static str {
        "holder_concentration"
    }
    fn bucket(&self) -> Bucket {
        Bucket::Risk
    }

    async fn evaluate(&self, input: &HeuristicInput<'_>) -> Outcome {
        let Some(holders) = &input.snapshot.holders else {
            return Outcome::Unknown("holder list unavailable");
        };
        let Some(summary) = &input.snapshot.mint_summary else {
            return Outcome::Unknown("mint account unavailable");
        };
        if summary.supply == 0 || holders.is_empty() {
            return Outcome::Unknown("no supply data");
        }

        let supply_ui = summary.supply as f64 / 10f64.powi(summary.decimals as i32);

        // The curve account itself is always the largest holder at launch;
        // concentration risk is about the next tier.
        let top5_excluding_largest: f64 = holders.iter().skip(1).take(5).map(|(_, ui)| ui).sum();
        let share = (top5_excluding_largest / supply_ui).clamp(0.0, 1.0);

        // Under 10% is organic, over half is a dump waiting to happen
        Outcome::Score(((share - 0.10) / 0.40).clamp(0.0, 1.0))
    }
}

/// Is the pool liquidity locked away from the creator
pub struct LiquidityLockCheck;

#[async_trait]
impl Heuristic for LiquidityLockCheck {
    fn name(&self) -> &'static str {
        "liquidity_lock"
    }
    fn bucket(&self) -> Bucket {
        Bucket::Risk
    }

    async fn evaluate(&self, input: &HeuristicInput<'_>) -> Outcome {
        match &input.snapshot.curve {
            // Curve reserves are program-owned by construction
            Some(curve) if !curve.complete => Outcome::Score(0.1),
            // Graduated: LP lock status needs the pool account, which is
            // not part of the discovery snapshot
            _ => Outcome::Unknown("LP lock status unavailable"),
        }
    }
}

/// Creator track record from the persistent reputation store
pub struct CreatorReputationCheck;

#[async_trait]
impl Heuristic for CreatorReputationCheck {
    fn name(&self) -> &'static str {
        "creator_reputation"
    }
    fn bucket(&self) -> Bucket {
        Bucket::Risk
    }

    async fn evaluate(&self, input: &HeuristicInput<'_>) -> Outcome {
        let creator = input.event.creator.to_string();
        Outcome::Score(input.reputation.risk_score(&creator))
    }
}

/// Fee payer and spend of an early trade, used by pattern heuristics
#[derive(Debug, Clone)]
pub struct EarlyTrade {
    pub payer: String,
    pub lamports: u64,
    pub block_time: Option<i64>,
}

/// Fetch the earliest confirmed trades on the mint. Shared by the two
/// pattern heuristics; each call re-fetches because they run in
/// parallel against a bounded deadline anyway.
async fn fetch_early_trades(input: &HeuristicInput<'_>) -> Option<Vec<EarlyTrade>> {
    let signatures = input.snapshot.signatures.as_ref()?;
    if signatures.is_empty() {
        return Some(Vec::new());
    }

    // Oldest first, skip failed transactions
    let oldest: Vec<_> = signatures
        .iter()
        .rev()
        .filter(|s| !s.failed)
        .take(PATTERN_TX_FETCH)
        .collect();

    let fetches = oldest.iter().map(|info| async {
        input
            .client
            .get_transaction_summary(&info.signature)
            .await
            .ok()
            .flatten()
            .map(|tx| EarlyTrade {
                payer: tx.fee_payer,
                lamports: tx.lamports_spent,
                block_time: tx.block_time.or(info.block_time),
            })
    });

    let trades: Vec<EarlyTrade> = futures_util::future::join_all(fetches)
        .await
        .into_iter()
        .flatten()
        .collect();

    Some(trades)
}

/// Wash-trading detection via cycle counting on the trader graph.
///
/// The cycle scan is CPU work and runs on the blocking pool so the
/// event loop never stalls on it.
pub struct WashTradingCheck;

#[async_trait]
impl Heuristic for WashTradingCheck {
    fn name(&self) -> &'static str {
        "wash_trading"
    }
    fn bucket(&self) -> Bucket {
        Bucket::Risk
    }

    async fn evaluate(&self, input: &HeuristicInput<'_>) -> Outcome {
        let Some(trades) = fetch_early_trades(input).await else {
            return Outcome::Unknown("signature history unavailable");
        };
        if trades.len() < 4 {
            return Outcome::Unknown("too few trades to analyze");
        }

        let payers: Vec<String> = trades.iter().map(|t| t.payer.clone()).collect();

        let score = tokio::task::spawn_blocking(move || cycle_score(&payers))
            .await
            .unwrap_or(0.0);

        debug!(mint = %input.event.mint, score, "wash trading scan");
        Outcome::Score(score)
    }
}

/// Fraction of trade flow trapped in tight A→B→A cycles.
///
/// Sorted by arrival; a wallet pair ping-ponging trades dominates the
/// sequence when volume is being manufactured.
pub(crate) fn cycle_score(payers: &[String]) -> f64 {
    if payers.len() < 4 {
        return 0.0;
    }

    let mut transitions: HashMap<(&str, &str), u32> = HashMap::new();
    for window in payers.windows(2) {
        let from = window[0].as_str();
        let to = window[1].as_str();
        if from != to {
            *transitions.entry((from, to)).or_insert(0) += 1;
        }
    }

    let mut cycles = 0u32;
    let mut total = 0u32;
    for ((from, to), count) in &transitions {
        total += count;
        if let Some(reverse) = transitions.get(&(to, from)) {
            cycles += count.min(reverse);
        }
    }

    if total == 0 {
        return 0.0;
    }

    // Distinct wallets dampen the score: ping-pong between two wallets
    // is damning, the same ratio across twenty wallets is market noise
    let distinct = payers
        .iter()
        .map(String::as_str)
        .collect::<std::collections::HashSet<_>>()
        .len();
    let wallet_factor = (8.0 - distinct as f64).max(0.0) / 8.0;

    ((cycles as f64 / total as f64) * (0.5 + 0.5 * wallet_factor)).clamp(0.0, 1.0)
}

/// Coordinated buying: near-identical sizes at near-regular intervals
/// across the earliest fills point at a funding-cluster operation.
pub struct CoordinatedBuyingCheck;

#[async_trait]
impl Heuristic for CoordinatedBuyingCheck {
    fn name(&self) -> &'static str {
        "coordinated_buying"
    }
    fn bucket(&self) -> Bucket {
        Bucket::Risk
    }

    async fn evaluate(&self, input: &HeuristicInput<'_>) -> Outcome {
        let Some(trades) = fetch_early_trades(input).await else {
            return Outcome::Unknown("signature history unavailable");
        };
        if trades.len() < 4 {
            return Outcome::Unknown("too few trades to analyze");
        }

        Outcome::Score(coordination_score(&trades))
    }
}

pub(crate) fn coordination_score(trades: &[EarlyTrade]) -> f64 {
    // Same-amount clustering: what fraction of buys share a size bucket
    let mut size_buckets: HashMap<u64, u32> = HashMap::new();
    for t in trades {
        // 0.01 SOL buckets
        *size_buckets.entry(t.lamports / 10_000_000).or_insert(0) += 1;
    }
    let largest_bucket = size_buckets.values().copied().max().unwrap_or(0);
    let same_size_ratio = largest_bucket as f64 / trades.len() as f64;

    // Regular-interval check over available block times
    let mut times: Vec<i64> = trades.iter().filter_map(|t| t.block_time).collect();
    times.sort_unstable();
    let interval_regularity = if times.len() >= 3 {
        let intervals: Vec<i64> = times.windows(2).map(|w| w[1] - w[0]).collect();
        let mean = intervals.iter().sum::<i64>() as f64 / intervals.len() as f64;
        if mean <= 0.0 {
            1.0 // everything in the same block
        } else {
            let var = intervals
                .iter()
                .map(|&i| (i as f64 - mean).powi(2))
                .sum::<f64>()
                / intervals.len() as f64;
            let cv = var.sqrt() / mean;
            (1.0 - cv).clamp(0.0, 1.0)
        }
    } else {
        0.0
    };

    (0.6 * same_size_ratio + 0.4 * interval_regularity).clamp(0.0, 1.0)
}

/// Liquidity walking out the door after launch.
///
/// Compares the curve's live native reserves against what was seeded at
/// discovery; a book that shrank hard is being drained.
pub struct LiquidityRemovalCheck;

#[async_trait]
impl Heuristic for LiquidityRemovalCheck {
    fn name(&self) -> &'static str {
        "liquidity_removal"
    }
    fn bucket(&self) -> Bucket {
        Bucket::Risk
    }

    async fn evaluate(&self, input: &HeuristicInput<'_>) -> Outcome {
        let Some(curve) = &input.snapshot.curve else {
            return Outcome::Unknown("no curve state");
        };
        let initial = input.event.initial_liquidity_lamports;
        if initial == 0 {
            return Outcome::Unknown("no liquidity baseline from discovery");
        }

        Outcome::Score(liquidity_removal_score(initial, curve.real_sol_reserves))
    }
}

pub(crate) fn liquidity_removal_score(initial_lamports: u64, live_lamports: u64) -> f64 {
    if live_lamports >= initial_lamports {
        return 0.05; // liquidity grew or held
    }
    let retained = live_lamports as f64 / initial_lamports as f64;
    // Losing half the book is alarming; losing 80%+ is a drain in progress
    ((1.0 - retained - 0.2) / 0.6).clamp(0.0, 1.0)
}

/// Creator walking away from their own token.
///
/// A creator whose wallet holds nothing minutes after launch has already
/// taken their exit; one still sitting on a fifth of the supply is an
/// overhang waiting to be sold into every bid.
pub struct CreatorExitCheck;

#[async_trait]
impl Heuristic for CreatorExitCheck {
    fn name(&self) -> &'static str {
        "creator_exit"
    }
    fn bucket(&self) -> Bucket {
        Bucket::Risk
    }

    async fn evaluate(&self, input: &HeuristicInput<'_>) -> Outcome {
        let Some(summary) = &input.snapshot.mint_summary else {
            return Outcome::Unknown("mint account unavailable");
        };
        if summary.supply == 0 {
            return Outcome::Unknown("no supply data");
        }

        let creator_account = spl_associated_token_account::get_associated_token_address(
            &input.event.creator,
            &input.event.mint,
        );
        let balance = match input.client.get_token_account_balance(&creator_account).await {
            Ok(balance) => balance,
            // A missing token account is a real answer: the creator
            // holds nothing
            Err(e) if e.is_transient() => {
                return Outcome::Unknown("creator balance unavailable")
            }
            Err(_) => 0,
        };

        Outcome::Score(creator_exit_score(balance, summary.supply))
    }
}

pub(crate) fn creator_exit_score(creator_balance: u64, supply: u64) -> f64 {
    if supply == 0 {
        return 0.5;
    }
    let share = creator_balance as f64 / supply as f64;
    if creator_balance == 0 {
        // Fully out this early in the token's life
        0.75
    } else if share > 0.20 {
        // Heavy overhang
        0.55 + ((share - 0.20) / 0.30).clamp(0.0, 1.0) * 0.35
    } else {
        0.15
    }
}

/// Pump-and-dump scaffolding: a burst of manufactured activity at launch
/// that dies as soon as the operators stop feeding it.
pub struct PumpAndDumpCheck;

#[async_trait]
impl Heuristic for PumpAndDumpCheck {
    fn name(&self) -> &'static str {
        "pump_and_dump"
    }
    fn bucket(&self) -> Bucket {
        Bucket::Risk
    }

    async fn evaluate(&self, input: &HeuristicInput<'_>) -> Outcome {
        let Some(signatures) = &input.snapshot.signatures else {
            return Outcome::Unknown("signature history unavailable");
        };

        let mut times: Vec<i64> = signatures
            .iter()
            .filter(|s| !s.failed)
            .filter_map(|s| s.block_time)
            .collect();
        times.sort_unstable();

        match pump_dump_score(input.event.age_secs(), &times) {
            Some(score) => Outcome::Score(score),
            None => Outcome::Unknown("too few timestamped trades"),
        }
    }
}

pub(crate) fn pump_dump_score(age_secs: f64, times: &[i64]) -> Option<f64> {
    if times.len() < 6 {
        return None;
    }

    let first = *times.first()?;
    let last = *times.last()?;
    let span = (last - first) as f64;

    if span <= 0.0 {
        // The whole tape landed in one block
        return Some(0.7);
    }

    // How much of the token's life the tape actually covers. A tape
    // confined to an early sliver means the activity died afterward.
    let coverage = (span / age_secs.max(1.0)).clamp(0.0, 1.0);

    // How much of the trading sat in the first quarter of the span
    let cutoff = first + (span / 4.0) as i64;
    let front_loaded = times.iter().filter(|&&t| t <= cutoff).count() as f64
        / times.len() as f64;

    let score = if age_secs > 120.0 && coverage < 0.3 {
        // Burst, then silence: the pump already happened
        0.8
    } else if front_loaded > 0.8 {
        0.5
    } else {
        0.15
    };
    Some(score)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cycle_score_ping_pong() {
        let payers: Vec<String> = ["a", "b", "a", "b", "a", "b"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert!(cycle_score(&payers) > 0.8);
    }

    #[test]
    fn test_cycle_score_organic_flow() {
        let payers: Vec<String> = ["a", "b", "c", "d", "e", "f", "g", "h"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert!(cycle_score(&payers) < 0.1);
    }

    #[test]
    fn test_cycle_score_short_sequence() {
        let payers: Vec<String> = vec!["a".into(), "b".into()];
        assert_eq!(cycle_score(&payers), 0.0);
    }

    fn trade(payer: &str, lamports: u64, t: i64) -> EarlyTrade {
        EarlyTrade {
            payer: payer.into(),
            lamports,
            block_time: Some(t),
        }
    }

    #[test]
    fn test_coordination_identical_sizes_regular_intervals() {
        let trades = vec![
            trade("a", 100_000_000, 100),
            trade("b", 100_000_000, 102),
            trade("c", 101_000_000, 104),
            trade("d", 100_000_000, 106),
        ];
        assert!(coordination_score(&trades) > 0.7);
    }

    #[test]
    fn test_coordination_organic_trades() {
        let trades = vec![
            trade("a", 50_000_000, 100),
            trade("b", 420_000_000, 101),
            trade("c", 1_310_000_000, 130),
            trade("d", 90_000_000, 190),
        ];
        assert!(coordination_score(&trades) < 0.5);
    }

    #[test]
    fn test_liquidity_removal_drain() {
        // 80% of the book gone
        assert!(liquidity_removal_score(10_000_000_000, 2_000_000_000) > 0.9);
        // Book grew
        assert!(liquidity_removal_score(10_000_000_000, 12_000_000_000) < 0.1);
        // Small dip stays calm
        assert!(liquidity_removal_score(10_000_000_000, 9_000_000_000) < 0.1);
    }

    #[test]
    fn test_creator_exit_tiers() {
        let supply = 1_000_000_000_000u64;
        // Creator gone entirely
        assert!((creator_exit_score(0, supply) - 0.75).abs() < 1e-9);
        // Heavy overhang: 40% of supply
        assert!(creator_exit_score(supply * 2 / 5, supply) > 0.7);
        // Modest holding
        assert!(creator_exit_score(supply / 20, supply) < 0.2);
    }

    #[test]
    fn test_pump_dump_front_loaded_then_dead() {
        // All trades in the first 30s of a 10-minute-old token
        let times: Vec<i64> = (0..10).map(|i| 1000 + i * 3).collect();
        assert_eq!(pump_dump_score(600.0, &times), Some(0.8));
    }

    #[test]
    fn test_pump_dump_steady_tape() {
        // Even trading across the token's whole life
        let times: Vec<i64> = (0..12).map(|i| 1000 + i * 50).collect();
        assert_eq!(pump_dump_score(600.0, &times), Some(0.15));
    }

    #[test]
    fn test_pump_dump_single_block_burst() {
        let times = vec![1000; 8];
        assert_eq!(pump_dump_score(300.0, &times), Some(0.7));
    }

    #[test]
    fn test_pump_dump_needs_samples() {
        assert!(pump_dump_score(300.0, &[1000, 1001]).is_none());
    }
}
