//! Whale-copy strategy - mirror trades from a curated wallet set
//!
//! Copies with a delay (the whale's own fill moves the price first) and
//! at a fraction of the whale's size. Several whales agreeing within
//! the window raises confidence.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashSet;

use crate::config::{StrategiesConfig, StrategyCommonParams};

use super::traits::{PositionView, Strategy, StrategyContext};
use super::types::{MarketView, SignalAction, StrategySignal, WhaleTrade};

pub struct WhaleCopyStrategy;

pub const TAG: &str = "whale_copy";

/// Trades older than this no longer carry information
const TRADE_STALENESS_SECS: i64 = 120;

/// Mirror-eligible trades: curated wallet, recent, past the copy delay
fn eligible<'a>(
    trades: &'a [WhaleTrade],
    wallets: &HashSet<&str>,
    delay_ms: u64,
    min_sol: f64,
) -> Vec<&'a WhaleTrade> {
    let now = Utc::now();
    trades
        .iter()
        .filter(|t| wallets.contains(t.wallet.as_str()))
        .filter(|t| t.sol_amount >= min_sol)
        .filter(|t| {
            let age_ms = (now - t.observed_at).num_milliseconds();
            age_ms >= delay_ms as i64 && age_ms <= TRADE_STALENESS_SECS * 1000
        })
        .collect()
}

#[async_trait]
impl Strategy for WhaleCopyStrategy {
    fn tag(&self) -> &'static str {
        TAG
    }

    fn common<'a>(&self, params: &'a StrategiesConfig) -> &'a StrategyCommonParams {
        &params.whale_copy.common
    }

    async fn analyze(&self, ctx: &StrategyContext<'_>) -> Option<StrategySignal> {
        let p = &ctx.params.whale_copy;
        if !p.common.enabled || p.wallets.is_empty() {
            return None;
        }

        let wallets: HashSet<&str> = p.wallets.iter().map(String::as_str).collect();
        let trades = eligible(
            &ctx.view.whale_trades,
            &wallets,
            p.copy_delay_ms,
            p.min_whale_trade_sol,
        );
        if trades.is_empty() {
            return None;
        }

        let sells: Vec<_> = trades.iter().filter(|t| !t.is_buy).collect();
        if !sells.is_empty() {
            let wallet = &sells[0].wallet;
            return Some(StrategySignal {
                action: SignalAction::Sell,
                confidence: 0.85,
                suggested_size_sol: 0.0,
                strategy_tag: TAG,
                reason: format!("tracked wallet {wallet} sold"),
            });
        }

        let buys: Vec<_> = trades.iter().filter(|t| t.is_buy).collect();
        let distinct_wallets: HashSet<&str> =
            buys.iter().map(|t| t.wallet.as_str()).collect();
        let total_sol: f64 = buys.iter().map(|t| t.sol_amount).sum();

        // One whale is a lead, three is a move
        let confidence = match distinct_wallets.len() {
            0 => return None,
            1 => 0.72,
            2 => 0.82,
            _ => 0.9,
        };

        let size = (total_sol * p.copy_fraction).min(p.common.max_position_sol);

        Some(StrategySignal {
            action: SignalAction::Buy,
            confidence,
            suggested_size_sol: size,
            strategy_tag: TAG,
            reason: format!(
                "{} tracked wallet(s) bought {total_sol:.2} SOL",
                distinct_wallets.len()
            ),
        })
    }

    async fn should_exit(
        &self,
        position: &PositionView,
        view: &MarketView,
        params: &StrategiesConfig,
    ) -> bool {
        let p = &params.whale_copy;
        let wallets: HashSet<&str> = p.wallets.iter().map(String::as_str).collect();

        // Exit when any tracked wallet exits; no delay on the way out
        view.whale_trades
            .iter()
            .filter(|t| t.mint == position.mint)
            .filter(|t| wallets.contains(t.wallet.as_str()))
            .any(|t| !t.is_buy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::threat::heuristic::test_event;
    use crate::threat::report::test_report;
    use crate::threat::RiskLevel;
    use chrono::Duration;
    use solana_sdk::pubkey::Pubkey;

    const W1: &str = "whale1111111111111111111111111111111111111";
    const W2: &str = "whale2222222222222222222222222222222222222";

    fn whale_trade(wallet: &str, mint: Pubkey, is_buy: bool, sol: f64, age_ms: i64) -> WhaleTrade {
        WhaleTrade {
            wallet: wallet.to_string(),
            mint,
            is_buy,
            sol_amount: sol,
            observed_at: Utc::now() - Duration::milliseconds(age_ms),
        }
    }

    fn params_with_wallets() -> StrategiesConfig {
        let mut params = StrategiesConfig::default();
        params.whale_copy.common.enabled = true;
        params.whale_copy.wallets = vec![W1.to_string(), W2.to_string()];
        params
    }

    #[tokio::test]
    async fn test_copies_whale_buy_after_delay() {
        let event = test_event();
        let report = test_report(RiskLevel::Safe, 0.2);
        let params = params_with_wallets();
        let view = MarketView {
            prices: vec![],
            whale_trades: vec![whale_trade(W1, event.mint, true, 5.0, 2000)],
            social: None,
        };
        let ctx = StrategyContext {
            event: &event,
            report: &report,
            view: &view,
            params: &params,
        };

        let signal = WhaleCopyStrategy.analyze(&ctx).await.unwrap();
        assert_eq!(signal.action, SignalAction::Buy);
        // 5.0 SOL * 0.1 fraction
        assert!((signal.suggested_size_sol - 0.5).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_ignores_trade_inside_delay_window() {
        let event = test_event();
        let report = test_report(RiskLevel::Safe, 0.2);
        let params = params_with_wallets();
        let view = MarketView {
            prices: vec![],
            whale_trades: vec![whale_trade(W1, event.mint, true, 5.0, 100)],
            social: None,
        };
        let ctx = StrategyContext {
            event: &event,
            report: &report,
            view: &view,
            params: &params,
        };

        assert!(WhaleCopyStrategy.analyze(&ctx).await.is_none());
    }

    #[tokio::test]
    async fn test_whale_sell_beats_buys() {
        let event = test_event();
        let report = test_report(RiskLevel::Safe, 0.2);
        let params = params_with_wallets();
        let view = MarketView {
            prices: vec![],
            whale_trades: vec![
                whale_trade(W1, event.mint, true, 5.0, 2000),
                whale_trade(W2, event.mint, false, 3.0, 1500),
            ],
            social: None,
        };
        let ctx = StrategyContext {
            event: &event,
            report: &report,
            view: &view,
            params: &params,
        };

        let signal = WhaleCopyStrategy.analyze(&ctx).await.unwrap();
        assert_eq!(signal.action, SignalAction::Sell);
    }

    #[tokio::test]
    async fn test_untracked_wallet_ignored() {
        let event = test_event();
        let report = test_report(RiskLevel::Safe, 0.2);
        let params = params_with_wallets();
        let view = MarketView {
            prices: vec![],
            whale_trades: vec![whale_trade(
                "stranger11111111111111111111111111111111111",
                event.mint,
                true,
                50.0,
                2000,
            )],
            social: None,
        };
        let ctx = StrategyContext {
            event: &event,
            report: &report,
            view: &view,
            params: &params,
        };

        assert!(WhaleCopyStrategy.analyze(&ctx).await.is_none());
    }

    #[tokio::test]
    async fn test_should_exit_on_whale_sell() {
        let params = params_with_wallets();
        let mint = Pubkey::new_unique();
        let view = MarketView {
            prices: vec![],
            whale_trades: vec![whale_trade(W1, mint, false, 2.0, 50)],
            social: None,
        };
        let position = PositionView {
            mint,
            strategy_tag: TAG.into(),
            entry_price: 1.0,
            current_price: 1.1,
            held_secs: 30.0,
        };

        assert!(WhaleCopyStrategy.should_exit(&position, &view, &params).await);
    }
}
