//! Momentum strategy - RSI/MACD over the short price history
//!
//! Rides strength, steps aside on exhaustion. Needs a warm price
//! history, so it is silent for the first seconds of a token's life.

use async_trait::async_trait;

use crate::config::{StrategiesConfig, StrategyCommonParams};

use super::traits::{PositionView, Strategy, StrategyContext};
use super::types::{MarketView, PricePoint, SignalAction, StrategySignal};

pub struct MomentumStrategy;

pub const TAG: &str = "momentum";

/// Wilder-style RSI over the last `period` deltas
pub(crate) fn rsi(prices: &[f64], period: usize) -> Option<f64> {
    if prices.len() < period + 1 {
        return None;
    }

    let deltas: Vec<f64> = prices.windows(2).map(|w| w[1] - w[0]).collect();
    let recent = &deltas[deltas.len() - period..];

    let gains: f64 = recent.iter().filter(|d| **d > 0.0).sum();
    let losses: f64 = recent.iter().filter(|d| **d < 0.0).map(|d| -d).sum();

    if losses < f64::EPSILON {
        return Some(100.0);
    }
    let rs = (gains / period as f64) / (losses / period as f64);
    Some(100.0 - 100.0 / (1.0 + rs))
}

/// Exponential moving average over the whole slice
pub(crate) fn ema(prices: &[f64], period: usize) -> Option<f64> {
    if prices.is_empty() || period == 0 {
        return None;
    }
    let alpha = 2.0 / (period as f64 + 1.0);
    let mut value = prices[0];
    for p in &prices[1..] {
        value = alpha * p + (1.0 - alpha) * value;
    }
    Some(value)
}

/// MACD line (fast EMA minus slow EMA)
pub(crate) fn macd_line(prices: &[f64], fast: usize, slow: usize) -> Option<f64> {
    if prices.len() < slow {
        return None;
    }
    Some(ema(prices, fast)? - ema(prices, slow)?)
}

fn closes(points: &[PricePoint]) -> Vec<f64> {
    points.iter().map(|p| p.price).collect()
}

#[async_trait]
impl Strategy for MomentumStrategy {
    fn tag(&self) -> &'static str {
        TAG
    }

    fn common<'a>(&self, params: &'a StrategiesConfig) -> &'a StrategyCommonParams {
        &params.momentum.common
    }

    async fn analyze(&self, ctx: &StrategyContext<'_>) -> Option<StrategySignal> {
        let p = &ctx.params.momentum;
        if !p.common.enabled {
            return None;
        }

        let prices = closes(&ctx.view.prices);
        let rsi_value = rsi(&prices, p.rsi_period)?;
        let macd = macd_line(&prices, p.macd_fast, p.macd_slow)?;

        if rsi_value >= p.rsi_overbought {
            return Some(StrategySignal {
                action: SignalAction::Sell,
                confidence: ((rsi_value - p.rsi_overbought) / 15.0 + 0.75).clamp(0.0, 1.0),
                suggested_size_sol: 0.0,
                strategy_tag: TAG,
                reason: format!("RSI {rsi_value:.0} overbought"),
            });
        }

        // Strength without exhaustion: rising RSI band plus positive MACD
        if rsi_value > 55.0 && macd > 0.0 {
            let confidence = (0.6 + (rsi_value - 55.0) / 40.0).clamp(0.0, 0.95);
            return Some(StrategySignal {
                action: SignalAction::Buy,
                confidence,
                suggested_size_sol: p.base_size_sol,
                strategy_tag: TAG,
                reason: format!("RSI {rsi_value:.0}, MACD positive"),
            });
        }

        None
    }

    async fn should_exit(
        &self,
        _position: &PositionView,
        view: &MarketView,
        params: &StrategiesConfig,
    ) -> bool {
        let p = &params.momentum;
        let prices = closes(&view.prices);

        let Some(rsi_value) = rsi(&prices, p.rsi_period) else {
            return false;
        };
        let macd = macd_line(&prices, p.macd_fast, p.macd_slow).unwrap_or(0.0);

        // Momentum is gone when RSI breaks down or MACD flips negative
        rsi_value < 45.0 || macd < 0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::threat::report::test_report;
    use crate::threat::heuristic::test_event;
    use crate::threat::RiskLevel;
    use chrono::Utc;

    fn view_from(prices: &[f64]) -> MarketView {
        MarketView {
            prices: prices
                .iter()
                .map(|&price| PricePoint {
                    timestamp: Utc::now(),
                    price,
                })
                .collect(),
            whale_trades: vec![],
            social: None,
        }
    }

    #[test]
    fn test_rsi_all_gains_is_100() {
        let prices: Vec<f64> = (0..20).map(|i| 1.0 + i as f64 * 0.01).collect();
        assert_eq!(rsi(&prices, 14), Some(100.0));
    }

    #[test]
    fn test_rsi_insufficient_history() {
        assert!(rsi(&[1.0, 2.0], 14).is_none());
    }

    #[test]
    fn test_macd_positive_in_uptrend() {
        let prices: Vec<f64> = (0..40).map(|i| 1.0 * 1.02f64.powi(i)).collect();
        assert!(macd_line(&prices, 12, 26).unwrap() > 0.0);
    }

    #[tokio::test]
    async fn test_momentum_buys_steady_uptrend() {
        let prices: Vec<f64> = (0..40).map(|i| 1.0 + i as f64 * 0.02).collect();
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

        let signal = MomentumStrategy.analyze(&ctx).await.unwrap();
        // A one-way uptrend pegs RSI at 100, which reads as overbought
        assert_eq!(signal.action, SignalAction::Sell);
    }

    #[tokio::test]
    async fn test_momentum_buys_mixed_uptrend() {
        // Up two, down one: strong but not parabolic
        let mut prices = Vec::new();
        let mut p = 1.0;
        for i in 0..45 {
            p += if i % 3 == 2 { -0.01 } else { 0.02 };
            prices.push(p);
        }
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

        let signal = MomentumStrategy.analyze(&ctx).await.unwrap();
        assert_eq!(signal.action, SignalAction::Buy);
        assert!(signal.confidence >= 0.6);
    }

    #[tokio::test]
    async fn test_momentum_silent_without_history() {
        let event = test_event();
        let report = test_report(RiskLevel::Safe, 0.2);
        let view = MarketView::empty();
        let params = StrategiesConfig::default();
        let ctx = StrategyContext {
            event: &event,
            report: &report,
            view: &view,
            params: &params,
        };

        assert!(MomentumStrategy.analyze(&ctx).await.is_none());
    }

    #[tokio::test]
    async fn test_should_exit_on_breakdown() {
        let mut prices: Vec<f64> = (0..30).map(|i| 1.0 + i as f64 * 0.02).collect();
        // Sharp reversal
        for i in 0..15 {
            prices.push(1.6 - i as f64 * 0.05);
        }
        let view = view_from(&prices);
        let params = StrategiesConfig::default();
        let position = PositionView {
            mint: solana_sdk::pubkey::Pubkey::new_unique(),
            strategy_tag: TAG.into(),
            entry_price: 1.0,
            current_price: 0.9,
            held_secs: 60.0,
        };

        assert!(MomentumStrategy.should_exit(&position, &view, &params).await);
    }
}
