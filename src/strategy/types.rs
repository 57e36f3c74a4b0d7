//! Signal and intent types shared across strategies
//!
//! Each strategy consumes a typed slice of the market view; there is no
//! free-form metadata map. What a strategy needs is a field here.

use chrono::{DateTime, Utc};
use serde::Serialize;
use solana_sdk::pubkey::Pubkey;
use std::collections::VecDeque;
use uuid::Uuid;

use dashmap::DashMap;

/// What a strategy wants done
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalAction {
    Buy,
    Sell,
    Hold,
}

/// One strategy's opinion on one token
#[derive(Debug, Clone, Serialize)]
pub struct StrategySignal {
    pub action: SignalAction,
    /// 0.0 to 1.0
    pub confidence: f64,
    /// Suggested size in SOL (ignored for SELL)
    pub suggested_size_sol: f64,
    pub strategy_tag: &'static str,
    pub reason: String,
}

/// The single aggregated decision forwarded to the position manager
#[derive(Debug, Clone, Serialize)]
pub struct TradeIntent {
    pub id: Uuid,
    #[serde(serialize_with = "serialize_pubkey")]
    pub mint: Pubkey,
    pub action: SignalAction,
    /// Final size in SOL after every cap and damping
    pub size_sol: f64,
    /// Strategies that survived aggregation, with their reasons
    pub contributors: Vec<(String, String)>,
    /// Slippage override for manual trades; None uses configured defaults
    pub slippage_bps: Option<u32>,
    /// Manual intents bypass strategy stats on close
    pub manual: bool,
    /// Mean confidence of the surviving signals (1.0 for manual)
    pub confidence: f64,
    /// Curve account when known, for execution routing
    #[serde(skip)]
    pub bonding_curve: Option<Pubkey>,
    /// Creator address for reputation bookkeeping
    #[serde(skip)]
    pub creator: Option<Pubkey>,
    pub created_at: DateTime<Utc>,
}

impl TradeIntent {
    pub fn new(mint: Pubkey, action: SignalAction, size_sol: f64) -> Self {
        Self {
            id: Uuid::new_v4(),
            mint,
            action,
            size_sol,
            contributors: Vec::new(),
            slippage_bps: None,
            manual: false,
            confidence: 1.0,
            bonding_curve: None,
            creator: None,
            created_at: Utc::now(),
        }
    }

    /// Attach discovery context used by execution and reputation
    pub fn with_event_context(
        mut self,
        bonding_curve: Option<Pubkey>,
        creator: Pubkey,
    ) -> Self {
        self.bonding_curve = bonding_curve;
        self.creator = Some(creator);
        self
    }
}

fn serialize_pubkey<S: serde::Serializer>(key: &Pubkey, ser: S) -> Result<S::Ok, S::Error> {
    ser.serialize_str(&key.to_string())
}

/// One observed price
#[derive(Debug, Clone, Copy)]
pub struct PricePoint {
    pub timestamp: DateTime<Utc>,
    pub price: f64,
}

/// A trade by a curated wallet, mirrored by the whale-copy strategy
#[derive(Debug, Clone)]
pub struct WhaleTrade {
    pub wallet: String,
    pub mint: Pubkey,
    pub is_buy: bool,
    pub sol_amount: f64,
    pub observed_at: DateTime<Utc>,
}

/// Aggregates from the external social-signal feed
#[derive(Debug, Clone, Copy, Default)]
pub struct SocialStats {
    /// 0.0 to 1.0: spread velocity across platforms
    pub virality: f64,
    /// -1.0 to 1.0
    pub sentiment: f64,
    /// Fraction of engagement judged bot-driven
    pub bot_ratio: f64,
}

/// Read view handed to every strategy for one decision cycle
pub struct MarketView {
    pub prices: Vec<PricePoint>,
    pub whale_trades: Vec<WhaleTrade>,
    pub social: Option<SocialStats>,
}

impl MarketView {
    pub fn empty() -> Self {
        Self {
            prices: Vec::new(),
            whale_trades: Vec::new(),
            social: None,
        }
    }
}

/// Price points retained per mint
const PRICE_HISTORY_CAP: usize = 120;

/// Whale trades retained per mint
const WHALE_TRADE_CAP: usize = 32;

/// Rolling market data shared between the monitor (writer) and the
/// combinator (reader)
#[derive(Default)]
pub struct MarketDataHub {
    prices: DashMap<Pubkey, VecDeque<PricePoint>>,
    whale_trades: DashMap<Pubkey, VecDeque<WhaleTrade>>,
    social: DashMap<Pubkey, SocialStats>,
}

impl MarketDataHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_price(&self, mint: Pubkey, price: f64) {
        let mut ring = self.prices.entry(mint).or_default();
        ring.push_back(PricePoint {
            timestamp: Utc::now(),
            price,
        });
        while ring.len() > PRICE_HISTORY_CAP {
            ring.pop_front();
        }
    }

    pub fn record_whale_trade(&self, trade: WhaleTrade) {
        let mut ring = self.whale_trades.entry(trade.mint).or_default();
        ring.push_back(trade);
        while ring.len() > WHALE_TRADE_CAP {
            ring.pop_front();
        }
    }

    pub fn record_social(&self, mint: Pubkey, stats: SocialStats) {
        self.social.insert(mint, stats);
    }

    pub fn latest_price(&self, mint: &Pubkey) -> Option<f64> {
        self.prices.get(mint).and_then(|r| r.back().map(|p| p.price))
    }

    /// Assemble the read view for one decision cycle
    pub fn view(&self, mint: &Pubkey) -> MarketView {
        MarketView {
            prices: self
                .prices
                .get(mint)
                .map(|r| r.iter().copied().collect())
                .unwrap_or_default(),
            whale_trades: self
                .whale_trades
                .get(mint)
                .map(|r| r.iter().cloned().collect())
                .unwrap_or_default(),
            social: self.social.get(mint).map(|s| *s),
        }
    }

    /// Drop per-mint state once a position is closed and the mint aged out
    pub fn forget(&self, mint: &Pubkey) {
        self.prices.remove(mint);
        self.whale_trades.remove(mint);
        self.social.remove(mint);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_price_ring_caps() {
        let hub = MarketDataHub::new();
        let mint = Pubkey::new_unique();
        for i in 0..200 {
            hub.record_price(mint, i as f64);
        }
        let view = hub.view(&mint);
        assert_eq!(view.prices.len(), PRICE_HISTORY_CAP);
        assert_eq!(hub.latest_price(&mint), Some(199.0));
    }

    #[test]
    fn test_view_of_unknown_mint_is_empty() {
        let hub = MarketDataHub::new();
        let view = hub.view(&Pubkey::new_unique());
        assert!(view.prices.is_empty());
        assert!(view.whale_trades.is_empty());
        assert!(view.social.is_none());
    }

    #[test]
    fn test_forget_clears_state() {
        let hub = MarketDataHub::new();
        let mint = Pubkey::new_unique();
        hub.record_price(mint, 1.0);
        hub.record_social(mint, SocialStats::default());
        hub.forget(&mint);
        assert!(hub.latest_price(&mint).is_none());
    }
}
