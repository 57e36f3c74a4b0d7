//! Strategy capability set
//!
//! A strategy is a value implementing three operations over a shared
//! parameter store, registered under a tag. No inheritance hierarchy:
//! adding a strategy means adding a value to the registry.

use async_trait::async_trait;

use crate::config::{StrategiesConfig, StrategyCommonParams};
use crate::listener::TokenEvent;
use crate::threat::ThreatReport;

use super::types::{MarketView, StrategySignal};

/// What a strategy sees when asked about an open position
#[derive(Debug, Clone)]
pub struct PositionView {
    pub mint: solana_sdk::pubkey::Pubkey,
    pub strategy_tag: String,
    pub entry_price: f64,
    pub current_price: f64,
    pub held_secs: f64,
}

/// Everything a strategy may consult for one decision
pub struct StrategyContext<'a> {
    pub event: &'a TokenEvent,
    pub report: &'a ThreatReport,
    pub view: &'a MarketView,
    pub params: &'a StrategiesConfig,
}

/// The capability set every strategy implements
#[async_trait]
pub trait Strategy: Send + Sync {
    /// Registry key; also used for stats and position attribution
    fn tag(&self) -> &'static str;

    /// The strategy's shared knobs under the given parameter snapshot
    fn common<'a>(&self, params: &'a StrategiesConfig) -> &'a StrategyCommonParams;

    /// Produce a signal for a token, or None when it has no opinion
    async fn analyze(&self, ctx: &StrategyContext<'_>) -> Option<StrategySignal>;

    /// Whether an entry is currently warranted (gates MANUAL reuse of a
    /// strategy; the combinator itself gates on `analyze`)
    async fn should_enter(&self, ctx: &StrategyContext<'_>) -> bool {
        matches!(
            self.analyze(ctx).await,
            Some(StrategySignal {
                action: super::types::SignalAction::Buy,
                ..
            })
        )
    }

    /// Whether the owning strategy wants out of an open position
    async fn should_exit(
        &self,
        position: &PositionView,
        view: &MarketView,
        params: &StrategiesConfig,
    ) -> bool;
}
