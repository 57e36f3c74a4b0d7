//! Strategy combinator - one trade intent per mint per decision cycle
//!
//! Runs every enabled strategy concurrently, then aggregates:
//! confidence gate, risk veto (BUY only, never SELL), SELL-beats-BUY
//! conflict rule, and capped, risk-damped sizing against the shared
//! capital pool.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::config::{CapitalConfig, StrategiesConfig};
use crate::console::ControlState;
use crate::error::{Error, Result};
use crate::listener::TokenEvent;
use crate::position::capital::CapitalPool;
use crate::threat::ThreatReport;

use super::momentum::MomentumStrategy;
use super::reversal::ReversalStrategy;
use super::snipe::SnipeStrategy;
use super::social::SocialStrategy;
use super::stats::StatsBook;
use super::traits::{Strategy, StrategyContext};
use super::types::{MarketView, SignalAction, StrategySignal, TradeIntent};
use super::whale_copy::WhaleCopyStrategy;

/// Live strategy parameters with an override/reset snapshot.
///
/// STRATEGY_OVERRIDE swaps values in atomically and retains the prior
/// config; STRATEGY_RESET restores exactly that snapshot.
pub struct ParamStore {
    current: RwLock<StrategiesConfig>,
    snapshot: Mutex<Option<StrategiesConfig>>,
}

impl ParamStore {
    pub fn new(config: StrategiesConfig) -> Self {
        Self {
            current: RwLock::new(config),
            snapshot: Mutex::new(None),
        }
    }

    pub async fn read(&self) -> StrategiesConfig {
        self.current.read().await.clone()
    }

    /// Apply a typed parameter map. The first unknown key rejects the
    /// whole map; no partial application.
    pub async fn apply_override(&self, params: &HashMap<String, f64>) -> Result<()> {
        let mut next = self.current.read().await.clone();

        for (key, &value) in params {
            apply_param(&mut next, key, value)?;
        }

        let mut current = self.current.write().await;
        let mut snapshot = lock_snapshot(&self.snapshot);
        // Keep the oldest pre-override state across stacked overrides
        if snapshot.is_none() {
            *snapshot = Some(current.clone());
        }
        *current = next;
        info!("strategy parameters overridden: {} key(s)", params.len());
        Ok(())
    }

    /// Restore the pre-override snapshot. Returns false when there is
    /// nothing to restore.
    pub async fn reset(&self) -> bool {
        let restored = lock_snapshot(&self.snapshot).take();
        match restored {
            Some(config) => {
                *self.current.write().await = config;
                info!("strategy parameters reset to pre-override snapshot");
                true
            }
            None => false,
        }
    }
}

fn lock_snapshot(
    snapshot: &Mutex<Option<StrategiesConfig>>,
) -> std::sync::MutexGuard<'_, Option<StrategiesConfig>> {
    match snapshot.lock() {
        Ok(g) => g,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Route one override key into the typed config
fn apply_param(config: &mut StrategiesConfig, key: &str, value: f64) -> Result<()> {
    let enabled = value > 0.5;
    match key {
        "snipe.enabled" => config.snipe.common.enabled = enabled,
        "snipe.capital_allocation" => config.snipe.common.capital_allocation = value,
        "snipe.min_confidence" => config.snipe.common.min_confidence = value,
        "snipe.max_position_sol" => config.snipe.common.max_position_sol = value,
        "snipe.min_liquidity_sol" => config.snipe.min_liquidity_sol = value,
        "snipe.max_age_secs" => config.snipe.max_age_secs = value as u64,
        "snipe.base_size_sol" => config.snipe.base_size_sol = value,
        "momentum.enabled" => config.momentum.common.enabled = enabled,
        "momentum.capital_allocation" => config.momentum.common.capital_allocation = value,
        "momentum.min_confidence" => config.momentum.common.min_confidence = value,
        "momentum.max_position_sol" => config.momentum.common.max_position_sol = value,
        "momentum.base_size_sol" => config.momentum.base_size_sol = value,
        "momentum.rsi_overbought" => config.momentum.rsi_overbought = value,
        "momentum.rsi_oversold" => config.momentum.rsi_oversold = value,
        "reversal.enabled" => config.reversal.common.enabled = enabled,
        "reversal.capital_allocation" => config.reversal.common.capital_allocation = value,
        "reversal.min_confidence" => config.reversal.common.min_confidence = value,
        "reversal.max_position_sol" => config.reversal.common.max_position_sol = value,
        "reversal.band_sigma" => config.reversal.band_sigma = value,
        "reversal.base_size_sol" => config.reversal.base_size_sol = value,
        "whale_copy.enabled" => config.whale_copy.common.enabled = enabled,
        "whale_copy.capital_allocation" => config.whale_copy.common.capital_allocation = value,
        "whale_copy.min_confidence" => config.whale_copy.common.min_confidence = value,
        "whale_copy.max_position_sol" => config.whale_copy.common.max_position_sol = value,
        "whale_copy.copy_fraction" => config.whale_copy.copy_fraction = value,
        "whale_copy.min_whale_trade_sol" => config.whale_copy.min_whale_trade_sol = value,
        "social.enabled" => config.social.common.enabled = enabled,
        "social.capital_allocation" => config.social.common.capital_allocation = value,
        "social.min_confidence" => config.social.common.min_confidence = value,
        "social.max_position_sol" => config.social.common.max_position_sol = value,
        "social.min_virality" => config.social.min_virality = value,
        "social.min_sentiment" => config.social.min_sentiment = value,
        "social.max_bot_ratio" => config.social.max_bot_ratio = value,
        _ => {
            return Err(Error::PolicyReject(format!(
                "unknown strategy parameter: {key}"
            )))
        }
    }
    Ok(())
}

/// The combinator itself
pub struct StrategyCombinator {
    registry: Vec<Arc<dyn Strategy>>,
    params: Arc<ParamStore>,
    capital: Arc<CapitalPool>,
    caps: CapitalConfig,
    stats: Arc<StatsBook>,
    control: Arc<ControlState>,
}

impl StrategyCombinator {
    pub fn new(
        config: StrategiesConfig,
        caps: CapitalConfig,
        capital: Arc<CapitalPool>,
        stats: Arc<StatsBook>,
        control: Arc<ControlState>,
    ) -> Self {
        Self {
            registry: default_registry(),
            params: Arc::new(ParamStore::new(config)),
            capital,
            caps,
            stats,
            control,
        }
    }

    /// Shared parameter store handle for the override console
    pub fn params(&self) -> Arc<ParamStore> {
        Arc::clone(&self.params)
    }

    pub fn registry(&self) -> &[Arc<dyn Strategy>] {
        &self.registry
    }

    /// Aggregate all strategy opinions into at most one intent.
    ///
    /// Returns None when nothing survives the gates; that is normal
    /// operation, not an error.
    pub async fn decide(
        &self,
        event: &TokenEvent,
        report: &ThreatReport,
        view: &MarketView,
    ) -> Option<TradeIntent> {
        // EMERGENCY_STOP and PAUSE block new work entirely
        if !self.control.allows_entries() {
            debug!(mint = %event.mint, "entries blocked by control state");
            return None;
        }

        let params = self.params.read().await;
        let ctx = StrategyContext {
            event,
            report,
            view,
            params: &params,
        };

        let raw = futures_util::future::join_all(
            self.registry.iter().map(|s| s.analyze(&ctx)),
        )
        .await;

        // Gate: per-strategy confidence threshold
        let mut signals: Vec<StrategySignal> = Vec::new();
        for (strategy, signal) in self.registry.iter().zip(raw) {
            let Some(signal) = signal else { continue };
            let threshold = strategy.common(&params).min_confidence;
            if signal.confidence < threshold {
                debug!(
                    strategy = signal.strategy_tag,
                    confidence = signal.confidence,
                    threshold,
                    "signal below confidence gate"
                );
                continue;
            }
            signals.push(signal);
        }

        if signals.is_empty() {
            return None;
        }

        // Veto: HIGH/CRITICAL risk drops every BUY; SELLs always pass
        let vetoed = report.risk_level.vetoes_entry();
        if vetoed {
            let dropped = signals
                .iter()
                .filter(|s| s.action == SignalAction::Buy)
                .count();
            if dropped > 0 {
                info!(
                    mint = %event.mint,
                    level = ?report.risk_level,
                    dropped,
                    "risk veto dropped buy signals"
                );
            }
            signals.retain(|s| s.action != SignalAction::Buy);
        }

        let sells: Vec<&StrategySignal> = signals
            .iter()
            .filter(|s| s.action == SignalAction::Sell)
            .collect();

        // Conflict rule: getting out safely dominates getting in early
        if !sells.is_empty() {
            let mut intent = TradeIntent::new(event.mint, SignalAction::Sell, 0.0);
            intent.contributors = sells
                .iter()
                .map(|s| (s.strategy_tag.to_string(), s.reason.clone()))
                .collect();
            return Some(intent);
        }

        let buys: Vec<&StrategySignal> = signals
            .iter()
            .filter(|s| s.action == SignalAction::Buy)
            .collect();
        if buys.is_empty() {
            return None;
        }

        let size = self.size_buys(&buys, &params, report)?;

        let mut intent = TradeIntent::new(event.mint, SignalAction::Buy, size);
        intent.confidence =
            buys.iter().map(|s| s.confidence).sum::<f64>() / buys.len() as f64;
        intent.contributors = buys
            .iter()
            .map(|s| (s.strategy_tag.to_string(), s.reason.clone()))
            .collect();
        Some(intent)
    }

    /// Sizing ladder: per-signal caps, Kelly clamp from realized stats,
    /// per-mint and portfolio ceilings, risk damping, capital scaling,
    /// minimum-trade floor.
    fn size_buys(
        &self,
        buys: &[&StrategySignal],
        params: &StrategiesConfig,
        report: &ThreatReport,
    ) -> Option<f64> {
        let pool = self.capital.snapshot();

        let mut raw_size = 0.0;
        for signal in buys {
            let strategy = self
                .registry
                .iter()
                .find(|s| s.tag() == signal.strategy_tag)?;
            let common = strategy.common(params);

            // Per-strategy allocation ceiling against the whole pool
            let mut allocation_cap = common.capital_allocation * pool.total_sol;

            // Realized-stats Kelly clamp once a strategy has history
            if let Some(stats) = self.stats.get(signal.strategy_tag) {
                if let Some(kelly) = stats.kelly_fraction() {
                    allocation_cap = allocation_cap.min(kelly * pool.total_sol);
                }
            }

            let contribution = (signal.suggested_size_sol * signal.confidence)
                .min(common.max_position_sol)
                .min(allocation_cap);
            raw_size += contribution;
        }

        // Per-mint and portfolio ceilings
        let portfolio_headroom =
            (self.caps.portfolio_exposure_cap_sol - pool.committed_sol).max(0.0);
        let mut size = raw_size
            .min(self.caps.per_mint_cap_sol)
            .min(portfolio_headroom);

        // Kelly-style damping on the threat composite
        size *= 1.0 - report.composite;

        // Scale down to what the pool can actually cover
        size = size.min(pool.available_sol);

        if size < self.caps.min_trade_sol {
            debug!(size, floor = self.caps.min_trade_sol, "sized below minimum trade");
            return None;
        }
        Some(size)
    }
}

/// All five strategies; disabled ones are filtered by their params
pub fn default_registry() -> Vec<Arc<dyn Strategy>> {
    vec![
        Arc::new(SnipeStrategy),
        Arc::new(MomentumStrategy),
        Arc::new(ReversalStrategy),
        Arc::new(WhaleCopyStrategy),
        Arc::new(SocialStrategy),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CapitalConfig;
    use crate::threat::heuristic::test_event;
    use crate::threat::report::test_report;
    use crate::threat::RiskLevel;

    fn combinator() -> StrategyCombinator {
        let control = Arc::new(ControlState::new());
        StrategyCombinator::new(
            StrategiesConfig::default(),
            CapitalConfig::default(),
            Arc::new(CapitalPool::new(2.0)),
            Arc::new(StatsBook::new()),
            control,
        )
    }

    #[tokio::test]
    async fn test_happy_path_snipe_with_damping() {
        let comb = combinator();
        let event = test_event(); // 10 SOL liquidity, fresh
        let report = test_report(RiskLevel::Safe, 0.25);
        let view = MarketView::empty();

        let intent = comb.decide(&event, &report, &view).await.unwrap();
        assert_eq!(intent.action, SignalAction::Buy);
        // Snipe base 0.1 × confidence ≈0.95, damped by (1 − 0.25)
        assert!(intent.size_sol > 0.05 && intent.size_sol < 0.1, "size {}", intent.size_sol);
        assert_eq!(intent.contributors.len(), 1);
        assert_eq!(intent.contributors[0].0, "snipe");
    }

    #[tokio::test]
    async fn test_high_risk_vetoes_buy() {
        let comb = combinator();
        let event = test_event();
        let report = test_report(RiskLevel::High, 0.8);
        let view = MarketView::empty();

        assert!(comb.decide(&event, &report, &view).await.is_none());
    }

    #[tokio::test]
    async fn test_sell_survives_critical_risk() {
        let comb = combinator();
        let event = test_event();
        let report = test_report(RiskLevel::Critical, 0.9);

        // Bot-heavy social stats produce a SELL from the social strategy
        comb.params
            .apply_override(
                &[("social.enabled".to_string(), 1.0)]
                    .into_iter()
                    .collect(),
            )
            .await
            .unwrap();
        let view = MarketView {
            prices: vec![],
            whale_trades: vec![],
            social: Some(crate::strategy::types::SocialStats {
                virality: 0.9,
                sentiment: 0.9,
                bot_ratio: 0.9,
            }),
        };

        let intent = comb.decide(&event, &report, &view).await.unwrap();
        assert_eq!(intent.action, SignalAction::Sell);
    }

    #[tokio::test]
    async fn test_sell_beats_buy_conflict() {
        let comb = combinator();
        let event = test_event();
        let report = test_report(RiskLevel::Safe, 0.2);

        comb.params
            .apply_override(
                &[("social.enabled".to_string(), 1.0)]
                    .into_iter()
                    .collect(),
            )
            .await
            .unwrap();

        // Snipe wants in; botted social feed wants out
        let view = MarketView {
            prices: vec![],
            whale_trades: vec![],
            social: Some(crate::strategy::types::SocialStats {
                virality: 0.9,
                sentiment: 0.9,
                bot_ratio: 0.9,
            }),
        };

        let intent = comb.decide(&event, &report, &view).await.unwrap();
        assert_eq!(intent.action, SignalAction::Sell);
    }

    #[tokio::test]
    async fn test_emergency_stop_blocks_entries() {
        let control = Arc::new(ControlState::new());
        control.set_emergency(true);
        let comb = StrategyCombinator::new(
            StrategiesConfig::default(),
            CapitalConfig::default(),
            Arc::new(CapitalPool::new(2.0)),
            Arc::new(StatsBook::new()),
            control,
        );

        let event = test_event();
        let report = test_report(RiskLevel::Safe, 0.1);
        assert!(comb.decide(&event, &report, &MarketView::empty()).await.is_none());
    }

    #[tokio::test]
    async fn test_tiny_size_dropped() {
        let comb = combinator();
        let event = test_event();
        // Composite 0.99 leaves ~1% of the raw size
        let report = test_report(RiskLevel::Monitor, 0.99);
        // Monitor does not veto, but the damped size lands under 0.005
        assert!(comb.decide(&event, &report, &MarketView::empty()).await.is_none());
    }

    #[tokio::test]
    async fn test_override_and_reset_round_trip() {
        let comb = combinator();
        let before = comb.params.read().await;

        let mut map = HashMap::new();
        map.insert("snipe.min_liquidity_sol".to_string(), 9.0);
        map.insert("momentum.enabled".to_string(), 0.0);
        comb.params.apply_override(&map).await.unwrap();

        let overridden = comb.params.read().await;
        assert!((overridden.snipe.min_liquidity_sol - 9.0).abs() < 1e-9);
        assert!(!overridden.momentum.common.enabled);

        assert!(comb.params.reset().await);
        let after = comb.params.read().await;
        assert_eq!(after, before);

        // Second reset has nothing to restore
        assert!(!comb.params.reset().await);
    }

    #[tokio::test]
    async fn test_unknown_override_key_rejected_atomically() {
        let comb = combinator();
        let before = comb.params.read().await;

        let mut map = HashMap::new();
        map.insert("snipe.min_liquidity_sol".to_string(), 9.0);
        map.insert("nonsense.key".to_string(), 1.0);
        assert!(comb.params.apply_override(&map).await.is_err());

        // Nothing applied
        assert_eq!(comb.params.read().await, before);
    }
}
