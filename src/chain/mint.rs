//! Mint account parsing
//!
//! Reads authorities and token-2022 extensions straight from account
//! data. The extension list is what the hostile-extension heuristic
//! cross-checks.

use solana_sdk::pubkey::Pubkey;

use crate::error::{Error, Result};

/// Base SPL mint layout size
const MINT_BASE_LEN: usize = 82;

/// Token-2022 account-type byte sits at this offset, extensions follow
const EXTENSION_START: usize = 166;

/// Token-2022 extension discriminants observed in the wild
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MintExtension {
    TransferFee,
    DefaultAccountState,
    NonTransferable,
    PermanentDelegate,
    TransferHook,
    ConfidentialTransfer,
    Other(u16),
}

impl MintExtension {
    fn from_discriminant(d: u16) -> Self {
        match d {
            1 => MintExtension::TransferFee,
            6 => MintExtension::DefaultAccountState,
            9 => MintExtension::NonTransferable,
            12 => MintExtension::PermanentDelegate,
            14 => MintExtension::TransferHook,
            3 => MintExtension::ConfidentialTransfer,
            other => MintExtension::Other(other),
        }
    }

    /// Extensions that let the issuer confiscate, freeze-by-default,
    /// intercept transfers, or hide them from inspection
    pub fn is_hostile(&self) -> bool {
        matches!(
            self,
            MintExtension::PermanentDelegate
                | MintExtension::TransferHook
                | MintExtension::DefaultAccountState
                | MintExtension::NonTransferable
                | MintExtension::ConfidentialTransfer
        )
    }
}

/// Parsed view of a mint account
#[derive(Debug, Clone)]
pub struct MintSummary {
    pub mint_authority: Option<Pubkey>,
    pub freeze_authority: Option<Pubkey>,
    pub supply: u64,
    pub decimals: u8,
    pub extensions: Vec<MintExtension>,
}

impl MintSummary {
    /// Parse from raw account data.
    ///
    /// Layout: mint_authority COption (36), supply u64 (8), decimals u8,
    /// is_initialized u8, freeze_authority COption (36); token-2022
    /// extensions are TLV entries after the account-type byte.
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < MINT_BASE_LEN {
            return Err(Error::Serialization("mint account data too short".into()));
        }

        let mint_authority = parse_coption_pubkey(&data[0..36])?;
        let supply = u64::from_le_bytes(
            data[36..44]
                .try_into()
                .map_err(|_| Error::Serialization("bad supply bytes".into()))?,
        );
        let decimals = data[44];
        let freeze_authority = parse_coption_pubkey(&data[46..82])?;

        let extensions = parse_extensions(data);

        Ok(Self {
            mint_authority,
            freeze_authority,
            supply,
            decimals,
            extensions,
        })
    }

    pub fn hostile_extensions(&self) -> Vec<MintExtension> {
        self.extensions
            .iter()
            .copied()
            .filter(|e| e.is_hostile())
            .collect()
    }
}

fn parse_coption_pubkey(bytes: &[u8]) -> Result<Option<Pubkey>> {
    let tag = u32::from_le_bytes(
        bytes[0..4]
            .try_into()
            .map_err(|_| Error::Serialization("bad COption tag".into()))?,
    );
    if tag == 0 {
        return Ok(None);
    }
    let key: [u8; 32] = bytes[4..36]
        .try_into()
        .map_err(|_| Error::Serialization("bad COption pubkey".into()))?;
    Ok(Some(Pubkey::new_from_array(key)))
}

/// Walk the TLV extension list. Malformed trailers end the walk rather
/// than erroring; partial data is still useful.
fn parse_extensions(data: &[u8]) -> Vec<MintExtension> {
    let mut extensions = Vec::new();
    let mut offset = EXTENSION_START;

    while offset + 4 <= data.len() {
        let ext_type = u16::from_le_bytes([data[offset], data[offset + 1]]);
        let ext_len = u16::from_le_bytes([data[offset + 2], data[offset + 3]]) as usize;

        if ext_type == 0 {
            break; // Uninitialized padding
        }

        extensions.push(MintExtension::from_discriminant(ext_type));
        offset += 4 + ext_len;
    }

    extensions
}
