//! Bundle submission with retry policy
//!
//! Sends signed transactions to the bundle relay, falling back to plain
//! RPC submission when the relay is down. Transient failures retry with
//! linear backoff; definitive ones surface immediately.

use serde::{Deserialize, Serialize};
use serde_json::json;
use solana_sdk::transaction::Transaction;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::ExecutionConfig;
use crate::error::{Error, Result};
use crate::rpc::FailoverClient;

#[derive(Serialize)]
struct JsonRpcRequest<T> {
    jsonrpc: &'static str,
    id: u64,
    method: &'static str,
    params: T,
}

#[derive(Deserialize)]
struct JsonRpcResponse<T> {
    result: Option<T>,
    error: Option<JsonRpcError>,
}

#[derive(Deserialize, Debug)]
struct JsonRpcError {
    code: i64,
    message: String,
}

/// Submission counters for the status surfaces
#[derive(Debug, Default)]
pub struct BundleStats {
    pub submitted: AtomicU64,
    pub landed: AtomicU64,
    pub failed: AtomicU64,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct BundleStatsSnapshot {
    pub submitted: u64,
    pub landed: u64,
    pub failed: u64,
    pub land_rate: f64,
}

impl BundleStats {
    pub fn snapshot(&self) -> BundleStatsSnapshot {
        let submitted = self.submitted.load(Ordering::Relaxed);
        let landed = self.landed.load(Ordering::Relaxed);
        BundleStatsSnapshot {
            submitted,
            landed,
            failed: self.failed.load(Ordering::Relaxed),
            land_rate: if submitted > 0 {
                landed as f64 / submitted as f64
            } else {
                0.0
            },
        }
    }
}

/// Relay client plus RPC fallback
pub struct BundleClient {
    config: ExecutionConfig,
    http: reqwest::Client,
    rpc: Arc<FailoverClient>,
    stats: Arc<BundleStats>,
}

impl BundleClient {
    pub fn new(config: ExecutionConfig, rpc: Arc<FailoverClient>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| Error::Config(format!("bundle HTTP client: {e}")))?;

        info!("bundle client initialized for {}", config.bundle_url);

        Ok(Self {
            config,
            http,
            rpc,
            stats: Arc::new(BundleStats::default()),
        })
    }

    pub fn stats(&self) -> Arc<BundleStats> {
        Arc::clone(&self.stats)
    }

    /// Submit one signed transaction, relay first, RPC fallback, with
    /// linearly backed-off retries on transient failure.
    pub async fn submit(&self, tx: &Transaction) -> Result<String> {
        self.stats.submitted.fetch_add(1, Ordering::Relaxed);

        let mut last_error: Option<Error> = None;
        for attempt in 0..self.config.retry_attempts.max(1) {
            if attempt > 0 {
                let backoff = Duration::from_millis(
                    self.config.retry_base_delay_ms * attempt as u64,
                );
                tokio::time::sleep(backoff).await;
            }

            match self.submit_once(tx).await {
                Ok(signature) => {
                    self.stats.landed.fetch_add(1, Ordering::Relaxed);
                    return Ok(signature);
                }
                Err(e) if e.is_transient() => {
                    warn!(attempt, "bundle submit failed: {e}");
                    last_error = Some(e);
                }
                Err(e) => {
                    self.stats.failed.fetch_add(1, Ordering::Relaxed);
                    return Err(e);
                }
            }
        }

        self.stats.failed.fetch_add(1, Ordering::Relaxed);
        Err(last_error.unwrap_or_else(|| Error::BundleSubmission("no attempts made".into())))
    }

    async fn submit_once(&self, tx: &Transaction) -> Result<String> {
        match self.submit_to_relay(tx).await {
            Ok(signature) => Ok(signature),
            Err(e) if e.is_transient() => {
                debug!("relay unavailable ({e}), falling back to RPC submission");
                self.rpc.send_transaction(tx).await.map(|s| s.to_string())
            }
            Err(e) => Err(e),
        }
    }

    /// Relay wants an array of base58 transactions per bundle
    async fn submit_to_relay(&self, tx: &Transaction) -> Result<String> {
        let serialized = bincode::serialize(tx)
            .map_err(|e| Error::Serialization(format!("bundle encode: {e}")))?;
        let encoded = bs58::encode(&serialized).into_string();

        let request = JsonRpcRequest {
            jsonrpc: "2.0",
            id: 1,
            method: "sendBundle",
            params: json!([[encoded]]),
        };

        let url = format!("{}/api/v1/bundles", self.config.bundle_url);
        let response = self
            .http
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(Error::from)?
            .error_for_status()
            .map_err(Error::from)?;

        let envelope: JsonRpcResponse<String> = response.json().await.map_err(Error::from)?;

        if let Some(err) = envelope.error {
            // Relay rejections about the bundle itself are definitive
            return if err.code == -32602 {
                Err(Error::BundleRejected(err.message))
            } else {
                Err(Error::from_rpc_code(err.code, err.message))
            };
        }

        let bundle_id = envelope
            .result
            .ok_or_else(|| Error::TransientTransport("empty bundle response".into()))?;

        // The tx signature is what downstream confirmation polls on
        let signature = tx
            .signatures
            .first()
            .map(|s| s.to_string())
            .unwrap_or(bundle_id);
        Ok(signature)
    }

    /// Poll signature status until confirmed, failed, or deadline
    pub async fn await_confirmation(
        &self,
        signature: &str,
        deadline: Duration,
    ) -> Result<bool> {
        let sig = signature
            .parse()
            .map_err(|e| Error::DefinitiveTransport(format!("bad signature: {e}")))?;

        let started = std::time::Instant::now();
        let mut poll = tokio::time::interval(Duration::from_millis(400));
        poll.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        while started.elapsed() < deadline {
            poll.tick().await;
            match self.rpc.get_signature_status(&sig).await {
                Ok(Some(true)) => return Ok(true),
                Ok(Some(false)) => {
                    return Err(Error::DefinitiveTransport(format!(
                        "transaction {signature} failed on-chain"
                    )))
                }
                Ok(None) => continue,
                Err(e) if e.is_transient() => continue,
                Err(e) => return Err(e),
            }
        }

        Ok(false) // unknown: caller probes
    }

    /// Priority fee for an exit escalation step
    pub fn escalated_priority_fee(&self, escalation: u32) -> u64 {
        let fee = self.config.priority_fee_lamports << escalation.min(8);
        fee.min(self.config.max_priority_fee_lamports)
    }

    /// Slippage for an exit escalation step: doubles per retry up to cap
    pub fn escalated_slippage(&self, base_bps: u32, escalation: u32) -> u32 {
        let slippage = (base_bps as u64) << escalation.min(8);
        slippage.min(self.config.max_slippage_bps as u64) as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ExecutionConfig;

    fn client() -> BundleClient {
        let rpc_config = crate::config::Config::default().rpc;
        let rpc = Arc::new(FailoverClient::new(&rpc_config).unwrap());
        BundleClient::new(ExecutionConfig::default(), rpc).unwrap()
    }

    #[test]
    fn test_slippage_escalation_ladder() {
        let c = client();
        // base 2500, cap 5000
        assert_eq!(c.escalated_slippage(2500, 0), 2500);
        assert_eq!(c.escalated_slippage(2500, 1), 5000);
        assert_eq!(c.escalated_slippage(2500, 4), 5000);
    }

    #[test]
    fn test_priority_fee_escalation_capped() {
        let c = client();
        // base 100k, cap 2M
        assert_eq!(c.escalated_priority_fee(0), 100_000);
        assert_eq!(c.escalated_priority_fee(1), 200_000);
        assert_eq!(c.escalated_priority_fee(6), 2_000_000);
    }

    #[test]
    fn test_stats_snapshot_land_rate() {
        let stats = BundleStats::default();
        stats.submitted.store(10, Ordering::Relaxed);
        stats.landed.store(7, Ordering::Relaxed);
        stats.failed.store(3, Ordering::Relaxed);
        let snap = stats.snapshot();
        assert!((snap.land_rate - 0.7).abs() < 1e-9);
    }
}
