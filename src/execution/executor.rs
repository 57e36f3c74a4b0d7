//! Live trade executor
//!
//! Quotes against the curve, builds and signs the swap, submits through
//! the bundle client, and polls to confirmation. Simulation mode is a
//! logging overlay: the same path minus the submit, with a synthetic
//! fill at the quoted price.

use async_trait::async_trait;
use solana_sdk::pubkey::Pubkey;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::chain::curve::{max_sol_with_slippage, min_sol_with_slippage, CurveState};
use crate::config::ExecutionConfig;
use crate::error::{Error, Result};
use crate::rpc::FailoverClient;

use super::builder::TradeBuilder;
use super::bundler::BundleClient;
use super::signer::SigningHandle;
use super::{Fill, TradeExecutor};

/// Confirmation poll budget per submit
const CONFIRM_DEADLINE: Duration = Duration::from_secs(20);

/// Relay tip in lamports, escalated alongside the priority fee
const BASE_TIP_LAMPORTS: u64 = 50_000;

pub struct LiveExecutor {
    client: Arc<FailoverClient>,
    signer: SigningHandle,
    bundler: BundleClient,
    config: ExecutionConfig,
    simulate: bool,
}

impl LiveExecutor {
    pub fn new(
        client: Arc<FailoverClient>,
        signer: SigningHandle,
        bundler: BundleClient,
        config: ExecutionConfig,
        simulate: bool,
    ) -> Self {
        if simulate {
            info!("executor running in simulation mode: intents will be logged, not submitted");
        }
        Self {
            client,
            signer,
            bundler,
            config,
            simulate,
        }
    }

    async fn fetch_curve(&self, bonding_curve: &Pubkey) -> Result<CurveState> {
        let data = self
            .client
            .get_account_data(bonding_curve)
            .await?
            .ok_or_else(|| {
                Error::DefinitiveTransport(format!("curve account {bonding_curve} not found"))
            })?;
        CurveState::decode(&data)
    }

    /// Sign a message and submit it, returning the signature string
    async fn sign_and_submit(&self, message: solana_sdk::message::Message) -> Result<String> {
        let signature = self.signer.sign(message.serialize()).await?;
        let tx = TradeBuilder::into_signed_transaction(message, signature);
        self.bundler.submit(&tx).await
    }
}

#[async_trait]
impl TradeExecutor for LiveExecutor {
    async fn execute_buy(
        &self,
        mint: &Pubkey,
        bonding_curve: Option<&Pubkey>,
        size_sol: f64,
        slippage_bps: u32,
    ) -> Result<Fill> {
        let curve_key = bonding_curve.ok_or_else(|| {
            Error::PolicyReject("buys need a curve account; graduated venues unsupported".into())
        })?;

        let curve = self.fetch_curve(curve_key).await?;
        let lamports = (size_sol * 1e9) as u64;
        let token_amount = curve.quote_buy(lamports)?;
        let max_sol = max_sol_with_slippage(lamports, slippage_bps);
        let price = size_sol / (token_amount as f64 / 1e6);

        if self.simulate {
            info!(
                "[SIM] buy {mint}: {size_sol} SOL for {token_amount} tokens at {price:.10}"
            );
            return Ok(Fill {
                price,
                quantity: token_amount,
                sol_amount: size_sol,
                signature: format!("sim-buy-{mint}"),
            });
        }

        let (blockhash, _) = self.client.get_latest_blockhash().await?;
        let builder = TradeBuilder::new(self.signer.pubkey());
        let message = builder.buy_message(
            mint,
            curve_key,
            token_amount,
            max_sol,
            self.config.priority_fee_lamports,
            BASE_TIP_LAMPORTS,
            blockhash,
        )?;

        let signature = self.sign_and_submit(message).await?;
        info!(%mint, %signature, "buy submitted");

        match self
            .bundler
            .await_confirmation(&signature, CONFIRM_DEADLINE)
            .await?
        {
            true => Ok(Fill {
                price,
                quantity: token_amount,
                sol_amount: size_sol,
                signature,
            }),
            false => Err(Error::RpcTimeout(CONFIRM_DEADLINE.as_millis() as u64)),
        }
    }

    async fn execute_sell(
        &self,
        mint: &Pubkey,
        bonding_curve: Option<&Pubkey>,
        quantity: u64,
        slippage_bps: u32,
        escalation: u32,
    ) -> Result<Fill> {
        let curve_key = bonding_curve.ok_or_else(|| {
            Error::PolicyReject("sells need a curve account; graduated venues unsupported".into())
        })?;

        let curve = self.fetch_curve(curve_key).await?;
        let expected_lamports = curve.quote_sell(quantity)?;

        let slippage = self.bundler.escalated_slippage(slippage_bps, escalation);
        let min_sol = min_sol_with_slippage(expected_lamports, slippage);
        let priority_fee = self.bundler.escalated_priority_fee(escalation);
        let sol_amount = expected_lamports as f64 / 1e9;
        let price = sol_amount / (quantity as f64 / 1e6);

        if escalation > 0 {
            warn!(
                %mint,
                escalation,
                slippage_bps = slippage,
                priority_fee,
                "escalated exit attempt"
            );
        }

        if self.simulate {
            info!("[SIM] sell {mint}: {quantity} tokens for {sol_amount} SOL");
            return Ok(Fill {
                price,
                quantity,
                sol_amount,
                signature: format!("sim-sell-{mint}-{escalation}"),
            });
        }

        let (blockhash, _) = self.client.get_latest_blockhash().await?;
        let builder = TradeBuilder::new(self.signer.pubkey());
        let message = builder.sell_message(
            mint,
            curve_key,
            quantity,
            min_sol,
            priority_fee,
            BASE_TIP_LAMPORTS << escalation.min(6),
            blockhash,
        )?;

        let signature = self.sign_and_submit(message).await?;
        info!(%mint, %signature, "sell submitted");

        match self
            .bundler
            .await_confirmation(&signature, CONFIRM_DEADLINE)
            .await?
        {
            true => Ok(Fill {
                price,
                quantity,
                sol_amount,
                signature,
            }),
            false => Err(Error::RpcTimeout(CONFIRM_DEADLINE.as_millis() as u64)),
        }
    }

    async fn probe_holding(&self, mint: &Pubkey) -> Result<u64> {
        let token_account = spl_associated_token_account::get_associated_token_address(
            &self.signer.pubkey(),
            mint,
        );
        match self.client.get_token_account_balance(&token_account).await {
            Ok(balance) => Ok(balance),
            // A missing token account means we hold nothing
            Err(e) if e.is_transient() => Err(e),
            Err(_) => Ok(0),
        }
    }
}
