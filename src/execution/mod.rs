//! Execution module - build, sign, and submit transactions
//!
//! The signing key lives inside a dedicated task and never crosses its
//! channel; everything else sends message bytes and gets signatures
//! back, behind a rate cap. Submission goes through a bundle relay with
//! classified-error retries.

pub mod builder;
pub mod bundler;
pub mod executor;
pub mod signer;

use async_trait::async_trait;
use solana_sdk::pubkey::Pubkey;

use crate::error::Result;

pub use bundler::{BundleClient, BundleStats};
pub use executor::LiveExecutor;
pub use signer::{SigningHandle, SigningService};

/// A confirmed (or simulated) fill
#[derive(Debug, Clone)]
pub struct Fill {
    /// SOL per UI token
    pub price: f64,
    /// Token quantity in base units
    pub quantity: u64,
    /// SOL actually moved
    pub sol_amount: f64,
    pub signature: String,
}

/// The position manager's port onto execution. Live trading implements
/// it against the chain; tests implement it in memory.
#[async_trait]
pub trait TradeExecutor: Send + Sync {
    /// Buy `size_sol` of a mint; resolves on confirmation
    async fn execute_buy(
        &self,
        mint: &Pubkey,
        bonding_curve: Option<&Pubkey>,
        size_sol: f64,
        slippage_bps: u32,
    ) -> Result<Fill>;

    /// Sell a token quantity. `escalation` counts exit retries: each
    /// step doubles slippage (to a cap) and raises the priority fee.
    async fn execute_sell(
        &self,
        mint: &Pubkey,
        bonding_curve: Option<&Pubkey>,
        quantity: u64,
        slippage_bps: u32,
        escalation: u32,
    ) -> Result<Fill>;

    /// Probe whether we actually hold the token (OPENING deadline path).
    /// Returns the held quantity in base units.
    async fn probe_holding(&self, mint: &Pubkey) -> Result<u64>;
}
