//! Social-signals strategy - gated on the external scraper feed
//!
//! The feed is an opaque collaborator; this strategy only applies
//! thresholds to its aggregates. No feed data, no opinion.

use async_trait::async_trait;

use crate::config::{StrategiesConfig, StrategyCommonParams};

use super::traits::{PositionView, Strategy, StrategyContext};
use super::types::{MarketView, SignalAction, StrategySignal};

pub struct SocialStrategy;

pub const TAG: &str = "social";

#[async_trait]
impl Strategy for SocialStrategy {
    fn tag(&self) -> &'static str {
        TAG
    }

    fn common<'a>(&self, params: &'a StrategiesConfig) -> &'a StrategyCommonParams {
        &params.social.common
    }

    async fn analyze(&self, ctx: &StrategyContext<'_>) -> Option<StrategySignal> {
        let p = &ctx.params.social;
        if !p.common.enabled {
            return None;
        }

        let stats = ctx.view.social?;

        if stats.bot_ratio > p.max_bot_ratio {
            // Manufactured hype is a SELL for anything we hold
            return Some(StrategySignal {
                action: SignalAction::Sell,
                confidence: 0.75,
                suggested_size_sol: 0.0,
                strategy_tag: TAG,
                reason: format!("bot ratio {:.0}%", stats.bot_ratio * 100.0),
            });
        }

        if stats.virality < p.min_virality || stats.sentiment < p.min_sentiment {
            return None;
        }

        let confidence =
            (0.55 + 0.25 * stats.virality + 0.15 * stats.sentiment).clamp(0.0, 0.95);

        Some(StrategySignal {
            action: SignalAction::Buy,
            confidence,
            suggested_size_sol: p.base_size_sol,
            strategy_tag: TAG,
            reason: format!(
                "virality {:.2}, sentiment {:.2}, bots {:.0}%",
                stats.virality,
                stats.sentiment,
                stats.bot_ratio * 100.0
            ),
        })
    }

    async fn should_exit(
        &self,
        _position: &PositionView,
        view: &MarketView,
        params: &StrategiesConfig,
    ) -> bool {
        let p = &params.social;
        match view.social {
            // The narrative died or turned out to be bots
            Some(stats) => {
                stats.bot_ratio > p.max_bot_ratio || stats.virality < p.min_virality * 0.5
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::types::SocialStats;
    use crate::threat::heuristic::test_event;
    use crate::threat::report::test_report;
    use crate::threat::RiskLevel;

    fn enabled_params() -> StrategiesConfig {
        let mut params = StrategiesConfig::default();
        params.social.common.enabled = true;
        params
    }

    fn view_with(stats: SocialStats) -> MarketView {
        MarketView {
            prices: vec![],
            whale_trades: vec![],
            social: Some(stats),
        }
    }

    #[tokio::test]
    async fn test_viral_organic_token_buys() {
        let event = test_event();
        let report = test_report(RiskLevel::Safe, 0.2);
        let params = enabled_params();
        let view = view_with(SocialStats {
            virality: 0.8,
            sentiment: 0.7,
            bot_ratio: 0.1,
        });
        let ctx = StrategyContext {
            event: &event,
            report: &report,
            view: &view,
            params: &params,
        };

        let signal = SocialStrategy.analyze(&ctx).await.unwrap();
        assert_eq!(signal.action, SignalAction::Buy);
        assert!(signal.confidence >= 0.7);
    }

    #[tokio::test]
    async fn test_bot_hype_sells() {
        let event = test_event();
        let report = test_report(RiskLevel::Safe, 0.2);
        let params = enabled_params();
        let view = view_with(SocialStats {
            virality: 0.9,
            sentiment: 0.9,
            bot_ratio: 0.8,
        });
        let ctx = StrategyContext {
            event: &event,
            report: &report,
            view: &view,
            params: &params,
        };

        let signal = SocialStrategy.analyze(&ctx).await.unwrap();
        assert_eq!(signal.action, SignalAction::Sell);
    }

    #[tokio::test]
    async fn test_no_feed_no_opinion() {
        let event = test_event();
        let report = test_report(RiskLevel::Safe, 0.2);
        let params = enabled_params();
        let view = MarketView::empty();
        let ctx = StrategyContext {
            event: &event,
            report: &report,
            view: &view,
            params: &params,
        };

        assert!(SocialStrategy.analyze(&ctx).await.is_none());
    }

    #[tokio::test]
    async fn test_low_virality_filtered() {
        let event = test_event();
        let report = test_report(RiskLevel::Safe, 0.2);
        let params = enabled_params();
        let view = view_with(SocialStats {
            virality: 0.2,
            sentiment: 0.9,
            bot_ratio: 0.1,
        });
        let ctx = StrategyContext {
            event: &event,
            report: &report,
            view: &view,
            params: &params,
        };

        assert!(SocialStrategy.analyze(&ctx).await.is_none());
    }
}
