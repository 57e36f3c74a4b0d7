//! Bonding curve state and price math
//!
//! The launchpad prices tokens on a constant-product curve over virtual
//! reserves. Quotes here must match what the program computes or swaps
//! revert on slippage.

use borsh::{BorshDeserialize, BorshSerialize};

use super::program::ACCOUNT_DISCRIMINATORS;
use crate::error::{Error, Result};

/// Launchpad tokens use 6 decimals (not the chain's native 9)
pub const CURVE_TOKEN_DECIMALS: u8 = 6;

/// Bonding curve state account
#[derive(Debug, Clone, BorshDeserialize, BorshSerialize)]
pub struct CurveState {
    _discriminator: [u8; 8],

    /// Virtual SOL reserves used for pricing
    pub virtual_sol_reserves: u64,

    /// Virtual token reserves used for pricing
    pub virtual_token_reserves: u64,

    /// Real SOL held by the curve
    pub real_sol_reserves: u64,

    /// Real tokens held by the curve
    pub real_token_reserves: u64,

    /// Total token supply
    pub token_total_supply: u64,

    /// True once the curve has graduated to the AMM
    pub complete: bool,
}

impl CurveState {
    /// Decode from raw account data, checking the discriminator
    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() < 8 {
            return Err(Error::Serialization("curve account data too short".into()));
        }

        let discriminator: [u8; 8] = data[..8]
            .try_into()
            .map_err(|_| Error::Serialization("invalid curve discriminator".into()))?;

        if discriminator != ACCOUNT_DISCRIMINATORS::BONDING_CURVE {
            return Err(Error::Serialization(format!(
                "wrong curve discriminator: {discriminator:?}"
            )));
        }

        CurveState::try_from_slice(data)
            .map_err(|e| Error::Serialization(format!("curve decode: {e}")))
    }

    /// Spot price in SOL per token
    pub fn spot_price(&self) -> Result<f64> {
        if self.virtual_token_reserves == 0 {
            return Err(Error::Internal("curve has zero virtual token reserves".into()));
        }
        let sol = self.virtual_sol_reserves as f64 / 1e9;
        let tokens = self.virtual_token_reserves as f64 / 10f64.powi(CURVE_TOKEN_DECIMALS as i32);
        Ok(sol / tokens)
    }

    /// Tokens received for a SOL amount (constant product over virtual
    /// reserves, before fees)
    pub fn quote_buy(&self, lamports: u64) -> Result<u64> {
        if self.complete {
            return Err(Error::PolicyReject("curve is complete; trade on the AMM".into()));
        }
        let k = self.virtual_sol_reserves as u128 * self.virtual_token_reserves as u128;
        let new_sol = self.virtual_sol_reserves as u128 + lamports as u128;
        if new_sol == 0 {
            return Err(Error::Internal("zero reserves".into()));
        }
        let new_tokens = k / new_sol;
        let out = self.virtual_token_reserves as u128 - new_tokens;
        u64::try_from(out).map_err(|_| Error::Internal("buy quote overflow".into()))
    }

    /// SOL received for a token amount (before fees)
    pub fn quote_sell(&self, token_amount: u64) -> Result<u64> {
        let k = self.virtual_sol_reserves as u128 * self.virtual_token_reserves as u128;
        let new_tokens = self.virtual_token_reserves as u128 + token_amount as u128;
        if new_tokens == 0 {
            return Err(Error::Internal("zero reserves".into()));
        }
        let new_sol = k / new_tokens;
        let out = self.virtual_sol_reserves as u128 - new_sol;
        u64::try_from(out).map_err(|_| Error::Internal("sell quote overflow".into()))
    }

    /// How far along the curve is toward graduation, 0.0 to 1.0
    pub fn progress(&self) -> f64 {
        if self.token_total_supply == 0 {
            return 0.0;
        }
        let sold = self
            .token_total_supply
            .saturating_sub(self.real_token_reserves);
        (sold as f64 / self.token_total_supply as f64).clamp(0.0, 1.0)
    }
}

/// Max SOL to spend on a buy given a slippage tolerance
pub fn max_sol_with_slippage(expected_lamports: u64, slippage_bps: u32) -> u64 {
    let factor = 1.0 + slippage_bps as f64 / 10_000.0;
    (expected_lamports as f64 * factor) as u64
}

/// Min SOL to accept on a sell given a slippage tolerance
pub fn min_sol_with_slippage(expected_lamports: u64, slippage_bps: u32) -> u64 {
    let factor = 1.0 - (slippage_bps as f64 / 10_000.0).min(1.0);
    (expected_lamports as f64 * factor) as u64
}

#[cfg(test)]
pub(crate) fn test_curve() -> CurveState {
    CurveState {
        _discriminator: ACCOUNT_DISCRIMINATORS::BONDING_CURVE,
        virtual_sol_reserves: 30_000_000_000,          // 30 SOL
        virtual_token_reserves: 1_073_000_000_000_000, // 1.073B tokens (6 dp)
        real_sol_reserves: 0,
        real_token_reserves: 793_100_000_000_000,
        token_total_supply: 1_000_000_000_000_000,
        complete: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_round_trip() {
        let curve = test_curve();
        let bytes = borsh::to_vec(&curve).unwrap();
        let decoded = CurveState::decode(&bytes).unwrap();
        assert_eq!(decoded.virtual_sol_reserves, curve.virtual_sol_reserves);
        assert!(!decoded.complete);
    }

    #[test]
    fn test_decode_rejects_wrong_discriminator() {
        let mut curve = test_curve();
        curve._discriminator = [0; 8];
        let bytes = borsh::to_vec(&curve).unwrap();
        assert!(CurveState::decode(&bytes).is_err());
    }

    #[test]
    fn test_spot_price() {
        let curve = test_curve();
        // 30 SOL / 1.073e9 tokens ≈ 2.796e-8 SOL per token
        let price = curve.spot_price().unwrap();
        assert!((price - 2.796e-8).abs() < 1e-10);
    }

    #[test]
    fn test_buy_quote_moves_price_up() {
        let curve = test_curve();
        let one_sol = 1_000_000_000u64;
        let tokens = curve.quote_buy(one_sol).unwrap();
        let effective = one_sol as f64 / 1e9 / (tokens as f64 / 1e6);
        assert!(effective > curve.spot_price().unwrap());
    }

    #[test]
    fn test_sell_quote_below_spot() {
        let curve = test_curve();
        let amount = 1_000_000_000u64; // 1000 tokens at 6 dp
        let lamports = curve.quote_sell(amount).unwrap();
        let effective = lamports as f64 / 1e9 / (amount as f64 / 1e6);
        assert!(effective <= curve.spot_price().unwrap());
    }

    #[test]
    fn test_complete_curve_rejects_buy() {
        let mut curve = test_curve();
        curve.complete = true;
        assert!(matches!(
            curve.quote_buy(1_000_000),
            Err(Error::PolicyReject(_))
        ));
    }

    #[test]
    fn test_slippage_bounds() {
        assert_eq!(max_sol_with_slippage(1_000_000_000, 2500), 1_250_000_000);
        assert_eq!(min_sol_with_slippage(1_000_000_000, 2500), 750_000_000);
    }

    #[test]
    fn test_progress() {
        let curve = test_curve();
        // (1000e12 - 793.1e12) / 1000e12 ≈ 0.2069
        assert!((curve.progress() - 0.2069).abs() < 0.001);
    }
}
