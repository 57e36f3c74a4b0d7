//! Transaction building for curve swaps
//!
//! Account ordering must match the launchpad program exactly or the
//! instruction fails at runtime, not at build time.

use solana_sdk::compute_budget::ComputeBudgetInstruction;
use solana_sdk::hash::Hash;
use solana_sdk::instruction::{AccountMeta, Instruction};
use solana_sdk::message::Message;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;
use solana_sdk::system_program;
use solana_sdk::transaction::Transaction;
use std::str::FromStr;

use crate::chain::program::{random_tip_account, CURVE_PROGRAM_ID, DISCRIMINATORS};
use crate::error::{Error, Result};

/// Launchpad global config PDA
const GLOBAL_ACCOUNT: &str = "4wTV1YmiEkRvAtNtsSGPtUrqRYQMe5SKy2uB4Jjaxnjf";

/// Launchpad fee recipient
const FEE_RECIPIENT: &str = "CebN5WGQ4jvEPvsVU4EoHEpgzq1VV7AbicfhtW4xC9iM";

/// Event authority PDA
const EVENT_AUTHORITY: &str = "Ce6TQqeHC9p8KetsN6JsjHK7UTZk7nasjjnr7XxXp9F1";

fn known_account(addr: &str) -> Result<Pubkey> {
    Pubkey::from_str(addr).map_err(|e| Error::Config(format!("bad known account {addr}: {e}")))
}

/// Builds unsigned swap messages and assembles signed transactions
pub struct TradeBuilder {
    payer: Pubkey,
}

impl TradeBuilder {
    pub fn new(payer: Pubkey) -> Self {
        Self { payer }
    }

    /// Buy: spend up to `max_sol_lamports` for `token_amount` tokens
    pub fn buy_message(
        &self,
        mint: &Pubkey,
        bonding_curve: &Pubkey,
        token_amount: u64,
        max_sol_lamports: u64,
        priority_fee_microlamports: u64,
        tip_lamports: u64,
        recent_blockhash: Hash,
    ) -> Result<Message> {
        let mut data = Vec::with_capacity(24);
        data.extend_from_slice(&DISCRIMINATORS::BUY);
        data.extend_from_slice(&token_amount.to_le_bytes());
        data.extend_from_slice(&max_sol_lamports.to_le_bytes());

        let swap = Instruction {
            program_id: *CURVE_PROGRAM_ID,
            accounts: self.swap_accounts(mint, bonding_curve, true)?,
            data,
        };

        self.assemble(swap, priority_fee_microlamports, tip_lamports, recent_blockhash)
    }

    /// Sell: give `token_amount` tokens for at least `min_sol_lamports`
    pub fn sell_message(
        &self,
        mint: &Pubkey,
        bonding_curve: &Pubkey,
        token_amount: u64,
        min_sol_lamports: u64,
        priority_fee_microlamports: u64,
        tip_lamports: u64,
        recent_blockhash: Hash,
    ) -> Result<Message> {
        let mut data = Vec::with_capacity(24);
        data.extend_from_slice(&DISCRIMINATORS::SELL);
        data.extend_from_slice(&token_amount.to_le_bytes());
        data.extend_from_slice(&min_sol_lamports.to_le_bytes());

        let swap = Instruction {
            program_id: *CURVE_PROGRAM_ID,
            accounts: self.swap_accounts(mint, bonding_curve, false)?,
            data,
        };

        self.assemble(swap, priority_fee_microlamports, tip_lamports, recent_blockhash)
    }

    /// Shared account list. Order matters.
    fn swap_accounts(
        &self,
        mint: &Pubkey,
        bonding_curve: &Pubkey,
        is_buy: bool,
    ) -> Result<Vec<AccountMeta>> {
        let associated_bonding_curve =
            spl_associated_token_account::get_associated_token_address(bonding_curve, mint);
        let user_token_account =
            spl_associated_token_account::get_associated_token_address(&self.payer, mint);

        let mut accounts = vec![
            AccountMeta::new_readonly(known_account(GLOBAL_ACCOUNT)?, false),
            AccountMeta::new(known_account(FEE_RECIPIENT)?, false),
            AccountMeta::new_readonly(*mint, false),
            AccountMeta::new(*bonding_curve, false),
            AccountMeta::new(associated_bonding_curve, false),
            AccountMeta::new(user_token_account, false),
            AccountMeta::new(self.payer, true),
            AccountMeta::new_readonly(system_program::ID, false),
        ];

        if is_buy {
            accounts.push(AccountMeta::new_readonly(spl_token::ID, false));
            accounts.push(AccountMeta::new_readonly(
                solana_sdk::sysvar::rent::ID,
                false,
            ));
        } else {
            accounts.push(AccountMeta::new_readonly(
                spl_associated_token_account::ID,
                false,
            ));
            accounts.push(AccountMeta::new_readonly(spl_token::ID, false));
        }

        accounts.push(AccountMeta::new_readonly(known_account(EVENT_AUTHORITY)?, false));
        accounts.push(AccountMeta::new_readonly(*CURVE_PROGRAM_ID, false));

        Ok(accounts)
    }

    /// Compute budget + swap + relay tip in one message
    fn assemble(
        &self,
        swap: Instruction,
        priority_fee_microlamports: u64,
        tip_lamports: u64,
        recent_blockhash: Hash,
    ) -> Result<Message> {
        let mut instructions = vec![
            ComputeBudgetInstruction::set_compute_unit_limit(120_000),
            ComputeBudgetInstruction::set_compute_unit_price(priority_fee_microlamports),
            swap,
        ];

        if tip_lamports > 0 {
            instructions.push(solana_sdk::system_instruction::transfer(
                &self.payer,
                &random_tip_account(),
                tip_lamports,
            ));
        }

        Ok(Message::new_with_blockhash(
            &instructions,
            Some(&self.payer),
            &recent_blockhash,
        ))
    }

    /// Attach an externally produced signature to a message
    pub fn into_signed_transaction(message: Message, signature: Signature) -> Transaction {
        let mut tx = Transaction::new_unsigned(message);
        if !tx.signatures.is_empty() {
            tx.signatures[0] = signature;
        } else {
            tx.signatures = vec![signature];
        }
        tx
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buy_message_shape() {
        let payer = Pubkey::new_unique();
        let mint = Pubkey::new_unique();
        let curve = Pubkey::new_unique();
        let builder = TradeBuilder::new(payer);

        let message = builder
            .buy_message(
                &mint,
                &curve,
                1_000_000,
                500_000_000,
                100_000,
                50_000,
                Hash::new_unique(),
            )
            .unwrap();

        // compute limit, compute price, swap, tip
        assert_eq!(message.instructions.len(), 4);
        assert_eq!(message.header.num_required_signatures, 1);
        assert_eq!(message.account_keys[0], payer);
    }

    #[test]
    fn test_sell_without_tip_has_three_instructions() {
        let builder = TradeBuilder::new(Pubkey::new_unique());
        let message = builder
            .sell_message(
                &Pubkey::new_unique(),
                &Pubkey::new_unique(),
                1_000_000,
                100_000_000,
                100_000,
                0,
                Hash::new_unique(),
            )
            .unwrap();
        assert_eq!(message.instructions.len(), 3);
    }

    #[test]
    fn test_instruction_data_layout() {
        let builder = TradeBuilder::new(Pubkey::new_unique());
        let mint = Pubkey::new_unique();
        let curve = Pubkey::new_unique();
        let message = builder
            .buy_message(&mint, &curve, 42, 77, 1, 0, Hash::new_unique())
            .unwrap();

        // Swap is the third instruction; verify discriminator and amounts
        let swap_data = &message.instructions[2].data;
        assert_eq!(&swap_data[..8], &DISCRIMINATORS::BUY);
        assert_eq!(u64::from_le_bytes(swap_data[8..16].try_into().unwrap()), 42);
        assert_eq!(u64::from_le_bytes(swap_data[16..24].try_into().unwrap()), 77);
    }

    #[test]
    fn test_signature_attachment() {
        let builder = TradeBuilder::new(Pubkey::new_unique());
        let message = builder
            .sell_message(
                &Pubkey::new_unique(),
                &Pubkey::new_unique(),
                1,
                1,
                1,
                0,
                Hash::new_unique(),
            )
            .unwrap();

        let sig = Signature::default();
        let tx = TradeBuilder::into_signed_transaction(message, sig);
        assert_eq!(tx.signatures.len(), 1);
    }
}
