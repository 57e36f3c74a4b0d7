//! Position state and exit-trigger evaluation
//!
//! The trigger ladder is ordered; the first match wins. Emergency paths
//! outrank every price-based trigger, and the trailing high only ever
//! ratchets up.

use chrono::{DateTime, Utc};
use serde::Serialize;
use solana_sdk::pubkey::Pubkey;

use crate::config::PositionConfig;

/// Lifecycle state of one position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PositionState {
    Opening,
    Open,
    Closing,
    Closed,
    Failed,
}

impl PositionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, PositionState::Closed | PositionState::Failed)
    }
}

/// Why a position is being closed, in evaluation order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitTrigger {
    Emergency,
    StopLoss,
    TrailingStop,
    TakeProfit,
    MaxHold,
    StrategyExit,
}

/// One holding, keyed by mint (at most one per mint)
#[derive(Debug, Clone, Serialize)]
pub struct Position {
    #[serde(serialize_with = "serialize_pubkey")]
    pub mint: Pubkey,
    pub strategy_tag: String,
    pub entry_price: f64,
    pub entry_time: DateTime<Utc>,
    /// Token quantity in base units
    pub quantity: u64,
    pub capital_committed_sol: f64,
    pub stop_loss_price: f64,
    pub take_profit_price: f64,
    pub max_hold_deadline: DateTime<Utc>,
    /// High-water mark for the trailing stop; monotone
    pub trailing_high: f64,
    pub state: PositionState,
    pub current_price: f64,
    pub realized_pnl_sol: Option<f64>,
    /// Set when the close was an emergency path, for reputation records
    pub emergency_exited: bool,
}

fn serialize_pubkey<S: serde::Serializer>(key: &Pubkey, ser: S) -> Result<S::Ok, S::Error> {
    ser.serialize_str(&key.to_string())
}

impl Position {
    /// Build an OPEN position from a confirmed fill
    pub fn from_fill(
        mint: Pubkey,
        strategy_tag: String,
        entry_price: f64,
        quantity: u64,
        capital_committed_sol: f64,
        config: &PositionConfig,
    ) -> Self {
        let now = Utc::now();
        Self {
            mint,
            strategy_tag,
            entry_price,
            entry_time: now,
            quantity,
            capital_committed_sol,
            stop_loss_price: entry_price * (1.0 - config.stop_loss_pct / 100.0),
            take_profit_price: entry_price * (1.0 + config.take_profit_pct / 100.0),
            max_hold_deadline: now + chrono::Duration::seconds(config.max_hold_secs as i64),
            trailing_high: entry_price,
            state: PositionState::Open,
            current_price: entry_price,
            realized_pnl_sol: None,
            emergency_exited: false,
        }
    }

    /// Record a price observation; the trailing high only moves up
    pub fn observe_price(&mut self, price: f64) {
        self.current_price = price;
        if price > self.trailing_high {
            self.trailing_high = price;
        }
    }

    pub fn unrealized_pnl_sol(&self) -> f64 {
        if self.entry_price <= 0.0 {
            return 0.0;
        }
        self.capital_committed_sol * (self.current_price / self.entry_price - 1.0)
    }

    pub fn held_secs(&self, now: DateTime<Utc>) -> f64 {
        (now - self.entry_time).num_milliseconds() as f64 / 1000.0
    }

    /// Evaluate the exit ladder. First match wins.
    pub fn evaluate_exit(
        &self,
        now: DateTime<Utc>,
        emergency: bool,
        strategy_wants_out: bool,
        trailing_pct: f64,
    ) -> Option<ExitTrigger> {
        if emergency {
            return Some(ExitTrigger::Emergency);
        }
        if self.current_price <= self.stop_loss_price {
            return Some(ExitTrigger::StopLoss);
        }
        if self.current_price <= self.trailing_high * (1.0 - trailing_pct / 100.0)
            && self.trailing_high > self.entry_price
        {
            return Some(ExitTrigger::TrailingStop);
        }
        if self.current_price >= self.take_profit_price {
            return Some(ExitTrigger::TakeProfit);
        }
        if now >= self.max_hold_deadline {
            return Some(ExitTrigger::MaxHold);
        }
        if strategy_wants_out {
            return Some(ExitTrigger::StrategyExit);
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_position() -> Position {
        Position::from_fill(
            Pubkey::new_unique(),
            "snipe".into(),
            100.0,
            1_000_000,
            0.5,
            &PositionConfig::default(), // SL 20%, TP 50%, trail 15%
        )
    }

    #[test]
    fn test_from_fill_trigger_prices() {
        let p = test_position();
        assert!((p.stop_loss_price - 80.0).abs() < 1e-9);
        assert!((p.take_profit_price - 150.0).abs() < 1e-9);
        assert_eq!(p.state, PositionState::Open);
        assert!((p.trailing_high - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_trailing_high_is_monotone() {
        let mut p = test_position();
        p.observe_price(130.0);
        p.observe_price(110.0);
        assert!((p.trailing_high - 130.0).abs() < 1e-9);
        assert!((p.current_price - 110.0).abs() < 1e-9);
    }

    #[test]
    fn test_emergency_outranks_everything() {
        let mut p = test_position();
        p.observe_price(10.0); // deep below stop loss
        let trigger = p.evaluate_exit(Utc::now(), true, true, 15.0);
        assert_eq!(trigger, Some(ExitTrigger::Emergency));
    }

    #[test]
    fn test_stop_loss_trigger() {
        let mut p = test_position();
        p.observe_price(79.0);
        assert_eq!(
            p.evaluate_exit(Utc::now(), false, false, 15.0),
            Some(ExitTrigger::StopLoss)
        );
    }

    #[test]
    fn test_trailing_stop_needs_profit_first() {
        let mut p = test_position();
        // Never above entry: a 15% drawdown from entry is the stop loss's
        // business, not the trailing stop's
        p.observe_price(85.0);
        assert_eq!(
            p.evaluate_exit(Utc::now(), false, false, 15.0),
            None
        );

        // Run up, then give back 15% from the high
        p.observe_price(140.0);
        p.observe_price(118.0);
        assert_eq!(
            p.evaluate_exit(Utc::now(), false, false, 15.0),
            Some(ExitTrigger::TrailingStop)
        );
    }

    #[test]
    fn test_take_profit_trigger() {
        let mut p = test_position();
        p.observe_price(151.0);
        // 151 > 150 TP, but 151 is also the trailing high so no trail hit
        assert_eq!(
            p.evaluate_exit(Utc::now(), false, false, 15.0),
            Some(ExitTrigger::TakeProfit)
        );
    }

    #[test]
    fn test_max_hold_trigger() {
        let p = test_position();
        let later = p.max_hold_deadline + chrono::Duration::seconds(1);
        assert_eq!(
            p.evaluate_exit(later, false, false, 15.0),
            Some(ExitTrigger::MaxHold)
        );
    }

    #[test]
    fn test_strategy_exit_is_last() {
        let p = test_position();
        assert_eq!(
            p.evaluate_exit(Utc::now(), false, true, 15.0),
            Some(ExitTrigger::StrategyExit)
        );
    }

    #[test]
    fn test_no_trigger_in_band() {
        let mut p = test_position();
        p.observe_price(105.0);
        assert_eq!(p.evaluate_exit(Utc::now(), false, false, 15.0), None);
    }

    #[test]
    fn test_unrealized_pnl() {
        let mut p = test_position();
        p.observe_price(120.0);
        assert!((p.unrealized_pnl_sol() - 0.1).abs() < 1e-9); // 0.5 × 20%
    }
}
