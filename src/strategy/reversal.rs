//! Reversal strategy - dip/peak detection inside a volatility band
//!
//! Buys washouts below the rolling band, sells blow-offs above it.
//! The band is mean ± sigma·std over a short window.

use async_trait::async_trait;

use crate::config::{StrategiesConfig, StrategyCommonParams};

use super::traits::{PositionView, Strategy, StrategyContext};
use super::types::{MarketView, SignalAction, StrategySignal};

pub struct ReversalStrategy;

pub const TAG: &str = "reversal";

/// Rolling mean and standard deviation over the last `window` prices
pub(crate) fn band(prices: &[f64], window: usize) -> Option<(f64, f64)> {
    if prices.len() < window {
        return None;
    }
    let slice = &prices[prices.len() - window..];
    let n = slice.len() as f64;
    let mean = slice.iter().sum::<f64>() / n;
    let var = slice.iter().map(|p| (p - mean).powi(2)).sum::<f64>() / n;
    Some((mean, var.sqrt()))
}

#[async_trait]
impl Strategy for ReversalStrategy {
    fn tag(&self) -> &'static str {
        TAG
    }

    fn common<'a>(&self, params: &'a StrategiesConfig) -> &'a StrategyCommonParams {
        &params.reversal.common
    }

    async fn analyze(&self, ctx: &StrategyContext<'_>) -> Option<StrategySignal> {
        let p = &ctx.params.reversal;
        if !p.common.enabled {
            return None;
        }

        let prices: Vec<f64> = ctx.view.prices.iter().map(|pt| pt.price).collect();
        let (mean, std) = band(&prices, p.band_window)?;
        if std < f64::EPSILON {
            return None; // flat tape, no band to trade
        }

        let last = *prices.last()?;
        let lower = mean - p.band_sigma * std;
        let upper = mean + p.band_sigma * std;

        if last < lower {
            let depth = ((lower - last) / std).min(2.0);
            return Some(StrategySignal {
                action: SignalAction::Buy,
                confidence: (0.65 + 0.15 * depth).clamp(0.0, 0.95),
                suggested_size_sol: p.base_size_sol,
                strategy_tag: TAG,
                reason: format!("dip {:.1} sigma below band", (mean - last) / std),
            });
        }

        if last > upper {
            let height = ((last - upper) / std).min(2.0);
            return Some(StrategySignal {
                action: SignalAction::Sell,
                confidence: (0.65 + 0.15 * height).clamp(0.0, 0.95),
                suggested_size_sol: 0.0,
                strategy_tag: TAG,
                reason: format!("peak {:.1} sigma above band", (last - mean) / std),
            });
        }

        None
    }

    async fn should_exit(
        &self,
        position: &PositionView,
        view: &MarketView,
        params: &StrategiesConfig,
    ) -> bool {
        let p = &params.reversal;
        let prices: Vec<f64> = view.prices.iter().map(|pt| pt.price).collect();
        let Some((mean, _)) = band(&prices, p.band_window) else {
            return false;
        };

        // A dip entry exits once price has reverted to the mean
        position.current_price >= mean && position.current_price > position.entry_price
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::threat::heuristic::test_event;
    use crate::threat::report::test_report;
    use crate::threat::RiskLevel;
    use chrono::Utc;

    fn view_from(prices: &[f64]) -> MarketView {
        MarketView {
            prices: prices
                .iter()
                .map(|&price| super::super::types::PricePoint {
                    timestamp: Utc::now(),
                    price,
                })
                .collect(),
            whale_trades: vec![],
            social: None,
        }
    }

    #[test]
    fn test_band_math() {
        let prices = vec![1.0; 20];
        let (mean, std) = band(&prices, 20).unwrap();
        assert!((mean - 1.0).abs() < f64::EPSILON);
        assert!(std < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_reversal_buys_washout() {
        // Stable tape with noise, then a hard dump
        let mut prices: Vec<f64> = (0..24)
            .map(|i| 1.0 + if i % 2 == 0 { 0.01 } else { -0.01 })
            .collect();
        prices.push(0.85);

        let event = test_event();
        let report = test_report(RiskLevel::Safe, 0.2);
        let view = view_from(&prices);
        let params = StrategiesConfig::default();
        let ctx = StrategyContext {
            event: &event,
            report: &report,
            view: &view,
            params: &params,
        };

        let signal = ReversalStrategy.analyze(&ctx).await.unwrap();
        assert_eq!(signal.action, SignalAction::Buy);
    }

    #[tokio::test]
    async fn test_reversal_sells_blowoff() {
        let mut prices: Vec<f64> = (0..24)
            .map(|i| 1.0 + if i % 2 == 0 { 0.01 } else { -0.01 })
            .collect();
        prices.push(1.2);

        let event = test_event();
        let report = test_report(RiskLevel::Safe, 0.2);
        let view = view_from(&prices);
        let params = StrategiesConfig::default();
        let ctx = StrategyContext {
            event: &event,
            report: &report,
            view: &view,
            params: &params,
        };

        let signal = ReversalStrategy.analyze(&ctx).await.unwrap();
        assert_eq!(signal.action, SignalAction::Sell);
    }

    #[tokio::test]
    async fn test_reversal_silent_inside_band() {
        let prices: Vec<f64> = (0..30)
            .map(|i| 1.0 + if i % 2 == 0 { 0.005 } else { -0.005 })
            .collect();

        let event = test_event();
        let report = test_report(RiskLevel::Safe, 0.2);
        let view = view_from(&prices);
        let params = StrategiesConfig::default();
        let ctx = StrategyContext {
            event: &event,
            report: &report,
            view: &view,
            params: &params,
        };

        assert!(ReversalStrategy.analyze(&ctx).await.is_none());
    }

    #[tokio::test]
    async fn test_exit_after_mean_reversion() {
        let prices: Vec<f64> = (0..30)
            .map(|i| 1.0 + if i % 2 == 0 { 0.01 } else { -0.01 })
            .collect();
        let view = view_from(&prices);
        let params = StrategiesConfig::default();

        let position = PositionView {
            mint: solana_sdk::pubkey::Pubkey::new_unique(),
            strategy_tag: TAG.into(),
            entry_price: 0.9,
            current_price: 1.01,
            held_secs: 120.0,
        };

        assert!(ReversalStrategy.should_exit(&position, &view, &params).await);
    }
}
