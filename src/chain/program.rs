//! Program constants and instruction discriminators
//!
//! # How discriminators are calculated
//! Anchor uses the first 8 bytes of SHA-256("global:<instruction_name>")
//! as the instruction discriminator.

use solana_sdk::pubkey::Pubkey;
use std::str::FromStr;

/// Curve launchpad program ID
pub const CURVE_PROGRAM_ID_STR: &str = "6EF8rrecthR5Dkzon8Nwu78hRvfCKubJ14M5uBEwF6P";

/// Graduated AMM program ID
pub const AMM_PROGRAM_ID_STR: &str = "675kPX9MHTjS2zt1qfr1NYHuzeLXfQM9H24wFSUt1Mp8";

/// Token-2022 program ID (extension-bearing mints)
pub const TOKEN_2022_PROGRAM_ID_STR: &str = "TokenzQdBNbLqP5VEhdkAS6EPFLC1PHnBqCXEpPxuEb";

lazy_static::lazy_static! {
    pub static ref CURVE_PROGRAM_ID: Pubkey =
        Pubkey::from_str(CURVE_PROGRAM_ID_STR).expect("Invalid curve program ID");

    pub static ref AMM_PROGRAM_ID: Pubkey =
        Pubkey::from_str(AMM_PROGRAM_ID_STR).expect("Invalid AMM program ID");

    pub static ref TOKEN_2022_PROGRAM_ID: Pubkey =
        Pubkey::from_str(TOKEN_2022_PROGRAM_ID_STR).expect("Invalid token-2022 program ID");
}

/// Instruction discriminators (first 8 bytes of instruction data)
#[allow(non_snake_case)]
pub mod DISCRIMINATORS {
    /// SHA-256("global:buy")[0..8]
    pub const BUY: [u8; 8] = [102, 6, 61, 18, 1, 218, 235, 234];

    /// SHA-256("global:sell")[0..8]
    pub const SELL: [u8; 8] = [51, 230, 133, 164, 1, 127, 131, 173];
}

/// Account discriminators (first 8 bytes of account data)
#[allow(non_snake_case)]
pub mod ACCOUNT_DISCRIMINATORS {
    /// Bonding curve state account
    pub const BONDING_CURVE: [u8; 8] = [23, 183, 248, 55, 96, 216, 172, 96];
}

/// Bundle relay tip accounts - the tip goes in the LAST transaction of a
/// bundle. Do NOT route tip accounts through address lookup tables.
pub const TIP_ACCOUNTS: [&str; 8] = [
    "96gYZGLnJYVFmbjzopPSU6QiEV5fGqZNyN9nmNhvrZU5",
    "HFqU5x63VTqvQss8hp11i4wVV8bD44PvwucfZ2bU7gRe",
    "Cw8CFyM9FkoMi7K7Crf6HNQqf4uEMzpKw6QNghXLvLkY",
    "ADaUMid9yfUytqMBgopwjb2DTLSokTSzL1zt6iGPaS49",
    "DfXygSm4jCyNCybVYYK6DwvWqjKee8pbDmJGcLWNDXjh",
    "ADuUkR4vqLUMWXxW9gh6D6L8pMSawimctcNZ5pGwDcEt",
    "DttWaMuVvTiduZRnguLF7jNxTgiMBZ1hyAumKUiL2KRL",
    "3AVi9Tg9Uo68tJfuvoKvqKNWKkC5wPdSSdeBnizKZ6jT",
];

/// Pick a random tip account for a bundle
pub fn random_tip_account() -> Pubkey {
    use rand::Rng;
    let idx = rand::thread_rng().gen_range(0..TIP_ACCOUNTS.len());
    Pubkey::from_str(TIP_ACCOUNTS[idx]).expect("Invalid tip account")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_program_ids_parse() {
        assert_eq!(CURVE_PROGRAM_ID.to_string(), CURVE_PROGRAM_ID_STR);
        assert_eq!(AMM_PROGRAM_ID.to_string(), AMM_PROGRAM_ID_STR);
    }

    #[test]
    fn test_tip_accounts_parse() {
        for account in TIP_ACCOUNTS {
            Pubkey::from_str(account).unwrap();
        }
    }
}
