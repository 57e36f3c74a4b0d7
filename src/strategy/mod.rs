//! Strategy module - signal generation and aggregation
//!
//! Five strategies over a shared capability set (analyze, should_enter,
//! should_exit), combined by the aggregation pipeline into at most one
//! trade intent per mint per cycle.

pub mod combinator;
pub mod momentum;
pub mod reversal;
pub mod snipe;
pub mod social;
pub mod stats;
pub mod traits;
pub mod types;
pub mod whale_copy;

pub use combinator::{default_registry, ParamStore, StrategyCombinator};
pub use stats::{StatsBook, StrategyStats};
pub use traits::{PositionView, Strategy, StrategyContext};
pub use types::{
    MarketDataHub, MarketView, SignalAction, SocialStats, StrategySignal, TradeIntent, WhaleTrade,
};
