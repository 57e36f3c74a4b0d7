//! Snipe strategy - very new mints, gated on liquidity and age
//!
//! The only strategy that acts on a token's first appearance. Entries
//! lean entirely on the threat report and seed liquidity; exits are the
//! position manager's stops, not ours.

use async_trait::async_trait;

use crate::config::{StrategiesConfig, StrategyCommonParams};
use crate::listener::Platform;
use crate::threat::RiskLevel;

use super::traits::{PositionView, Strategy, StrategyContext};
use super::types::{MarketView, SignalAction, StrategySignal};

pub struct SnipeStrategy;

pub const TAG: &str = "snipe";

#[async_trait]
impl Strategy for SnipeStrategy {
    fn tag(&self) -> &'static str {
        TAG
    }

    fn common<'a>(&self, params: &'a StrategiesConfig) -> &'a StrategyCommonParams {
        &params.snipe.common
    }

    async fn analyze(&self, ctx: &StrategyContext<'_>) -> Option<StrategySignal> {
        let p = &ctx.params.snipe;
        if !p.common.enabled {
            return None;
        }

        // Graduated pools are someone else's game
        if ctx.event.platform == Platform::GraduatedAmm {
            return None;
        }

        let age = ctx.event.age_secs();
        if age > p.max_age_secs as f64 {
            return None;
        }

        let liquidity = ctx.event.initial_liquidity_sol();
        if liquidity < p.min_liquidity_sol {
            return None;
        }

        // Confidence: safe report and deep seed liquidity. The veto for
        // HIGH/CRITICAL lives in the combinator; we only shade within
        // the allowed band here.
        let risk_factor = match ctx.report.risk_level {
            RiskLevel::Safe => 1.0,
            RiskLevel::Monitor => 0.8,
            _ => 0.5,
        };
        let liquidity_factor = (liquidity / (p.min_liquidity_sol * 4.0)).clamp(0.5, 1.0);
        let confidence = (0.95 * risk_factor * liquidity_factor).clamp(0.0, 1.0);

        Some(StrategySignal {
            action: SignalAction::Buy,
            confidence,
            suggested_size_sol: p.base_size_sol,
            strategy_tag: TAG,
            reason: format!("fresh launch, {liquidity:.2} SOL seeded, {age:.0}s old"),
        })
    }

    async fn should_exit(
        &self,
        position: &PositionView,
        _view: &MarketView,
        params: &StrategiesConfig,
    ) -> bool {
        // A snipe that outlived its edge window without moving is dead
        // capital; everything price-shaped is the manager's job
        let p = &params.snipe;
        position.held_secs > (p.max_age_secs as f64) * 4.0
            && position.current_price <= position.entry_price
    }
}
