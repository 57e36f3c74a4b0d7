//! Failover client over a pool of RPC endpoints
//!
//! Requests go to the best-scored endpoint first and fall through the
//! ranked list on transient failure, each endpoint tried at most once per
//! call. Definitive failures (malformed request, signature rejection) are
//! returned immediately without burning the remaining endpoints.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use solana_sdk::hash::Hash;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;
use solana_sdk::transaction::Transaction;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, info, warn};

use crate::config::RpcConfig;
use crate::error::{Error, Result};
use crate::rpc::blockhash::BlockhashCache;
use crate::rpc::health::{ProviderHealth, ProviderStatus};

/// Backoff step between in-call retries; grows linearly with the attempt
const RETRY_BACKOFF_STEP_MS: u64 = 25;

/// Deadline for the lightweight health-probe ping
const HEALTH_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// One resolved endpoint in the pool
#[derive(Debug, Clone)]
pub struct Endpoint {
    pub url: String,
    pub ws_url: String,
}

#[derive(Serialize)]
struct JsonRpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: Value,
}

#[derive(Deserialize)]
struct JsonRpcResponse {
    #[allow(dead_code)]
    jsonrpc: Option<String>,
    #[allow(dead_code)]
    id: Option<u64>,
    result: Option<Value>,
    error: Option<JsonRpcError>,
}

#[derive(Deserialize, Debug)]
struct JsonRpcError {
    code: i64,
    message: String,
}

/// One entry from a signature listing
#[derive(Debug, Clone)]
pub struct SignatureInfo {
    pub signature: String,
    pub block_time: Option<i64>,
    pub failed: bool,
}

/// Fee payer and spend of one confirmed transaction
#[derive(Debug, Clone)]
pub struct TxSummary {
    pub fee_payer: String,
    pub lamports_spent: u64,
    pub block_time: Option<i64>,
}

/// Serializable per-endpoint health snapshot for status surfaces
#[derive(Debug, Clone, Serialize)]
pub struct HealthSummary {
    pub endpoint_url: String,
    pub status: ProviderStatus,
    pub latency_ema_ms: f64,
    pub success_rate: f64,
    pub consecutive_failures: u32,
    pub score: f64,
    pub last_error: Option<String>,
}

/// Multi-provider RPC client with health-scored failover
pub struct FailoverClient {
    endpoints: Vec<Endpoint>,
    health: RwLock<Vec<ProviderHealth>>,
    http: reqwest::Client,
    request_timeout: Duration,
    health_check_interval: Duration,
    blockhash_cache: Arc<BlockhashCache>,
    request_id: AtomicU64,
    shutdown: broadcast::Sender<()>,
}

impl FailoverClient {
    /// Build the client from config, resolving per-endpoint auth tokens.
    ///
    /// Fails when any configured `auth_token_env` variable is missing, so
    /// a misconfigured pool is caught at startup rather than mid-trade.
    pub fn new(config: &RpcConfig) -> Result<Self> {
        if config.endpoints.is_empty() {
            return Err(Error::Config("at least one RPC endpoint is required".into()));
        }

        let mut endpoints = Vec::with_capacity(config.endpoints.len());
        for ep in &config.endpoints {
            let mut url = ep.url.clone();
            if let Some(env_name) = &ep.auth_token_env {
                let token = std::env::var(env_name)
                    .map_err(|_| Error::MissingEnvVar(env_name.clone()))?;
                let sep = if url.contains('?') { '&' } else { '?' };
                url = format!("{url}{sep}api-key={token}");
            }
            let ws_url = match &ep.ws_url {
                Some(ws) => ws.clone(),
                None => url
                    .replacen("https://", "wss://", 1)
                    .replacen("http://", "ws://", 1),
            };
            endpoints.push(Endpoint { url, ws_url });
        }

        let health = endpoints
            .iter()
            .map(|e| ProviderHealth::new(e.url.clone(), config.max_consecutive_failures))
            .collect();

        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()
            .map_err(|e| Error::Config(format!("failed to build HTTP client: {e}")))?;

        let (shutdown, _) = broadcast::channel(1);

        info!("Failover client initialized with {} endpoint(s)", endpoints.len());

        Ok(Self {
            endpoints,
            health: RwLock::new(health),
            http,
            request_timeout: Duration::from_millis(config.request_timeout_ms),
            health_check_interval: Duration::from_secs(config.health_check_interval_secs),
            blockhash_cache: Arc::new(BlockhashCache::new(Duration::from_millis(
                config.block_interval_ms,
            ))),
            request_id: AtomicU64::new(1),
            shutdown,
        })
    }

    /// Shared blockhash cache handle
    pub fn blockhash_cache(&self) -> Arc<BlockhashCache> {
        Arc::clone(&self.blockhash_cache)
    }

    /// WebSocket URLs in current routing order, for subscriptions
    pub async fn ranked_ws_urls(&self) -> Vec<String> {
        self.ranked()
            .await
            .into_iter()
            .map(|i| self.endpoints[i].ws_url.clone())
            .collect()
    }

    /// Endpoint indices ordered best-first: HEALTHY by score, then
    /// DEGRADED, then UNKNOWN, then UNHEALTHY as last resort.
    async fn ranked(&self) -> Vec<usize> {
        let health = self.health.read().await;
        let mut order: Vec<usize> = (0..self.endpoints.len()).collect();
        order.sort_by_key(|&i| health[i].routing_rank());
        order
    }

    /// Issue one JSON-RPC call with failover.
    ///
    /// Every endpoint is tried at most once within the per-call deadline;
    /// the backoff between attempts grows linearly. When all attempts
    /// fail the per-endpoint errors are surfaced in `TransportExhausted`.
    pub async fn call(&self, method: &str, params: Value) -> Result<Value> {
        let deadline = Instant::now() + self.request_timeout;
        let order = self.ranked().await;
        let mut attempts: Vec<(String, String)> = Vec::new();

        for (attempt, &idx) in order.iter().enumerate() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                attempts.push((self.endpoints[idx].url.clone(), "call deadline exhausted".into()));
                break;
            }

            let started = Instant::now();
            match self.post_endpoint(idx, method, params.clone(), remaining).await {
                Ok(value) => {
                    let latency = started.elapsed().as_secs_f64() * 1000.0;
                    self.record_success(idx, latency).await;
                    return Ok(value);
                }
                Err(e) if e.is_transient() => {
                    warn!(
                        endpoint = %self.endpoints[idx].url,
                        attempt = attempt + 1,
                        "RPC {method} failed: {e}"
                    );
                    self.record_failure(idx, &e).await;
                    attempts.push((self.endpoints[idx].url.clone(), e.to_string()));

                    let backoff =
                        Duration::from_millis(RETRY_BACKOFF_STEP_MS * (attempt as u64 + 1));
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    if !remaining.is_zero() && attempt + 1 < order.len() {
                        tokio::time::sleep(backoff.min(remaining)).await;
                    }
                }
                Err(e) => {
                    // Definitive: record and surface without trying the rest
                    self.record_failure(idx, &e).await;
                    return Err(e);
                }
            }
        }

        Err(Error::TransportExhausted { attempts })
    }

    /// POST one request to one endpoint under the remaining deadline
    async fn post_endpoint(
        &self,
        idx: usize,
        method: &str,
        params: Value,
        remaining: Duration,
    ) -> Result<Value> {
        let body = JsonRpcRequest {
            jsonrpc: "2.0",
            id: self.request_id.fetch_add(1, Ordering::Relaxed),
            method,
            params,
        };

        let send = self.http.post(&self.endpoints[idx].url).json(&body).send();
        let response = tokio::time::timeout(remaining, send)
            .await
            .map_err(|_| Error::RpcTimeout(remaining.as_millis() as u64))??;

        let response = response.error_for_status().map_err(Error::from)?;

        let envelope: JsonRpcResponse = tokio::time::timeout(remaining, response.json())
            .await
            .map_err(|_| Error::RpcTimeout(remaining.as_millis() as u64))?
            .map_err(Error::from)?;

        if let Some(err) = envelope.error {
            return Err(Error::from_rpc_code(err.code, err.message));
        }

        envelope
            .result
            .ok_or_else(|| Error::TransientTransport("empty JSON-RPC result".into()))
    }

    async fn record_success(&self, idx: usize, latency_ms: f64) {
        let mut health = self.health.write().await;
        health[idx].record_success(latency_ms);
    }

    async fn record_failure(&self, idx: usize, error: &Error) {
        let mut health = self.health.write().await;
        health[idx].record_failure(&error.to_string());
    }

    // ==================== Typed helpers ====================

    /// Current slot (also the health-probe request)
    pub async fn get_slot(&self) -> Result<u64> {
        let v = self.call("getSlot", json!([{"commitment": "processed"}])).await?;
        v.as_u64()
            .ok_or_else(|| Error::TransientTransport("getSlot returned non-integer".into()))
    }

    /// Latest blockhash with slot, served from the shared cache within
    /// one block interval of the last fetch.
    pub async fn get_latest_blockhash(&self) -> Result<(Hash, u64)> {
        if let Some(cached) = self.blockhash_cache.get().await {
            return Ok(cached);
        }

        let v = self
            .call("getLatestBlockhash", json!([{"commitment": "processed"}]))
            .await?;

        let slot = v["context"]["slot"].as_u64().unwrap_or_default();
        let hash_str = v["value"]["blockhash"]
            .as_str()
            .ok_or_else(|| Error::TransientTransport("missing blockhash in response".into()))?;
        let hash = Hash::from_str(hash_str)
            .map_err(|e| Error::TransientTransport(format!("unparseable blockhash: {e}")))?;

        self.blockhash_cache.store(hash, slot).await;
        Ok((hash, slot))
    }

    /// Native balance in lamports
    pub async fn get_balance(&self, pubkey: &Pubkey) -> Result<u64> {
        let v = self
            .call("getBalance", json!([pubkey.to_string(), {"commitment": "confirmed"}]))
            .await?;
        v["value"]
            .as_u64()
            .ok_or_else(|| Error::TransientTransport("getBalance returned non-integer".into()))
    }

    /// Raw account data, or None when the account does not exist
    pub async fn get_account_data(&self, pubkey: &Pubkey) -> Result<Option<Vec<u8>>> {
        let v = self
            .call(
                "getAccountInfo",
                json!([pubkey.to_string(), {"encoding": "base58", "commitment": "processed"}]),
            )
            .await?;

        if v["value"].is_null() {
            return Ok(None);
        }

        let data_str = v["value"]["data"][0]
            .as_str()
            .ok_or_else(|| Error::TransientTransport("missing account data".into()))?;
        let bytes = bs58::decode(data_str)
            .into_vec()
            .map_err(|e| Error::Serialization(format!("account data decode: {e}")))?;
        Ok(Some(bytes))
    }

    /// Owner program of an account, when it exists
    pub async fn get_account_owner(&self, pubkey: &Pubkey) -> Result<Option<Pubkey>> {
        let v = self
            .call(
                "getAccountInfo",
                json!([pubkey.to_string(), {"encoding": "base58", "commitment": "processed"}]),
            )
            .await?;

        if v["value"].is_null() {
            return Ok(None);
        }

        let owner = v["value"]["owner"]
            .as_str()
            .and_then(|s| Pubkey::from_str(s).ok())
            .ok_or_else(|| Error::TransientTransport("missing account owner".into()))?;
        Ok(Some(owner))
    }

    /// Token balance of an SPL token account, in base units
    pub async fn get_token_account_balance(&self, account: &Pubkey) -> Result<u64> {
        let v = self
            .call(
                "getTokenAccountBalance",
                json!([account.to_string(), {"commitment": "confirmed"}]),
            )
            .await?;
        v["value"]["amount"]
            .as_str()
            .and_then(|s| s.parse::<u64>().ok())
            .ok_or_else(|| Error::TransientTransport("unparseable token balance".into()))
    }

    /// Largest token holders: (address, ui amount) pairs
    pub async fn get_token_largest_accounts(&self, mint: &Pubkey) -> Result<Vec<(String, f64)>> {
        let v = self
            .call(
                "getTokenLargestAccounts",
                json!([mint.to_string(), {"commitment": "confirmed"}]),
            )
            .await?;
        let holders = v["value"]
            .as_array()
            .map(|arr| {
                arr.iter()
                    .filter_map(|h| {
                        let addr = h["address"].as_str()?.to_string();
                        let amount = h["uiAmount"].as_f64()?;
                        Some((addr, amount))
                    })
                    .collect()
            })
            .unwrap_or_default();
        Ok(holders)
    }

    /// Recent transaction signatures for an address, newest first
    pub async fn get_signatures_for_address(
        &self,
        address: &Pubkey,
        limit: usize,
    ) -> Result<Vec<SignatureInfo>> {
        let v = self
            .call(
                "getSignaturesForAddress",
                json!([address.to_string(), {"limit": limit, "commitment": "confirmed"}]),
            )
            .await?;
        let sigs = v
            .as_array()
            .map(|arr| {
                arr.iter()
                    .filter_map(|e| {
                        Some(SignatureInfo {
                            signature: e["signature"].as_str()?.to_string(),
                            block_time: e["blockTime"].as_i64(),
                            failed: !e["err"].is_null(),
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();
        Ok(sigs)
    }

    /// Fetch a confirmed transaction: fee payer and the lamports it spent
    pub async fn get_transaction_summary(&self, signature: &str) -> Result<Option<TxSummary>> {
        let v = self
            .call(
                "getTransaction",
                json!([signature, {"encoding": "json", "commitment": "confirmed", "maxSupportedTransactionVersion": 0}]),
            )
            .await?;

        if v.is_null() {
            return Ok(None);
        }

        let payer = v["transaction"]["message"]["accountKeys"][0]
            .as_str()
            .map(String::from);
        let pre = v["meta"]["preBalances"][0].as_u64().unwrap_or(0);
        let post = v["meta"]["postBalances"][0].as_u64().unwrap_or(0);

        Ok(payer.map(|fee_payer| TxSummary {
            fee_payer,
            lamports_spent: pre.saturating_sub(post),
            block_time: v["blockTime"].as_i64(),
        }))
    }

    /// Submit a signed transaction; stale-state errors invalidate the
    /// blockhash cache so the retry path refetches.
    pub async fn send_transaction(&self, tx: &Transaction) -> Result<Signature> {
        let serialized = bincode::serialize(tx)
            .map_err(|e| Error::Serialization(format!("transaction encode: {e}")))?;
        let encoded = bs58::encode(&serialized).into_string();

        let result = self
            .call(
                "sendTransaction",
                json!([encoded, {"encoding": "base58", "skipPreflight": true, "maxRetries": 0}]),
            )
            .await;

        match result {
            Ok(v) => {
                let sig_str = v.as_str().ok_or_else(|| {
                    Error::TransientTransport("sendTransaction returned non-string".into())
                })?;
                Signature::from_str(sig_str)
                    .map_err(|e| Error::DefinitiveTransport(format!("bad signature: {e}")))
            }
            Err(e) => {
                if e.needs_fresh_state() {
                    self.blockhash_cache.invalidate().await;
                }
                Err(e)
            }
        }
    }

    /// Confirmation status of a signature: Some(true) finalized/confirmed,
    /// Some(false) seen but failed, None unknown to the cluster.
    pub async fn get_signature_status(&self, signature: &Signature) -> Result<Option<bool>> {
        let v = self
            .call(
                "getSignatureStatuses",
                json!([[signature.to_string()], {"searchTransactionHistory": true}]),
            )
            .await?;

        let status = &v["value"][0];
        if status.is_null() {
            return Ok(None);
        }
        if !status["err"].is_null() {
            return Ok(Some(false));
        }
        let confirmed = status["confirmationStatus"]
            .as_str()
            .map(|s| s == "confirmed" || s == "finalized")
            .unwrap_or(false);
        Ok(Some(confirmed))
    }

    // ==================== Health loop ====================

    /// Spawn the 30s health loop: pings every endpoint with `getSlot`,
    /// updating the score table used for routing.
    pub fn spawn_health_loop(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let client = Arc::clone(self);
        let mut shutdown_rx = self.shutdown.subscribe();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(client.health_check_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        client.probe_all().await;
                    }
                    _ = shutdown_rx.recv() => {
                        debug!("Health loop shutting down");
                        break;
                    }
                }
            }
        })
    }

    /// Probe all endpoints once and refresh their scores
    async fn probe_all(&self) {
        for idx in 0..self.endpoints.len() {
            let started = Instant::now();
            let outcome = self
                .post_endpoint(idx, "getSlot", json!([]), HEALTH_PROBE_TIMEOUT)
                .await;

            match outcome {
                Ok(_) => {
                    let latency = started.elapsed().as_secs_f64() * 1000.0;
                    self.record_success(idx, latency).await;
                }
                Err(e) => {
                    debug!(endpoint = %self.endpoints[idx].url, "health probe failed: {e}");
                    self.record_failure(idx, &e).await;
                }
            }
        }

        let health = self.health.read().await;
        let healthy = health
            .iter()
            .filter(|h| h.status == ProviderStatus::Healthy)
            .count();
        debug!("Health probe complete: {healthy}/{} healthy", health.len());
    }

    /// Snapshot of all endpoint health for status surfaces
    pub async fn health_summary(&self) -> Vec<HealthSummary> {
        let health = self.health.read().await;
        health
            .iter()
            .map(|h| HealthSummary {
                endpoint_url: h.endpoint_url.clone(),
                status: h.status,
                latency_ema_ms: h.latency_ema_ms,
                success_rate: h.success_rate,
                consecutive_failures: h.consecutive_failures,
                score: h.score,
                last_error: h.last_error.clone(),
            })
            .collect()
    }

    /// True when at least one endpoint answered its last probe
    pub async fn any_reachable(&self) -> bool {
        let health = self.health.read().await;
        health.iter().any(|h| {
            matches!(h.status, ProviderStatus::Healthy | ProviderStatus::Degraded)
        })
    }

    /// Run one immediate probe sweep (startup reachability check)
    pub async fn probe_now(&self) {
        self.probe_all().await;
    }

    /// Signal background tasks to stop
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RpcEndpointConfig;

    fn test_config(urls: &[&str]) -> RpcConfig {
        RpcConfig {
            endpoints: urls
                .iter()
                .map(|u| RpcEndpointConfig {
                    url: u.to_string(),
                    ws_url: None,
                    auth_token_env: None,
                })
                .collect(),
            request_timeout_ms: 200,
            health_check_interval_secs: 30,
            max_consecutive_failures: 3,
            block_interval_ms: 400,
            subscribe_reconnect_attempts: 3,
        }
    }

    #[test]
    fn test_requires_at_least_one_endpoint() {
        let config = test_config(&[]);
        assert!(FailoverClient::new(&config).is_err());
    }

    #[test]
    fn test_ws_url_derived_from_http() {
        let config = test_config(&["https://rpc.example.com"]);
        let client = FailoverClient::new(&config).unwrap();
        assert_eq!(client.endpoints[0].ws_url, "wss://rpc.example.com");
    }

    #[tokio::test]
    async fn test_ranked_prefers_successful_endpoint() {
        let config = test_config(&["https://a.example.com", "https://b.example.com"]);
        let client = FailoverClient::new(&config).unwrap();

        client.record_failure(0, &Error::RpcTimeout(200)).await;
        client.record_failure(0, &Error::RpcTimeout(200)).await;
        client.record_success(1, 40.0).await;

        let order = client.ranked().await;
        assert_eq!(order[0], 1);
    }

    #[tokio::test]
    async fn test_call_exhausts_unreachable_pool_within_deadline() {
        // Reserved TEST-NET-1 address: connections fail fast or time out
        let config = test_config(&["http://192.0.2.1:8899"]);
        let client = FailoverClient::new(&config).unwrap();

        let started = Instant::now();
        let result = client.call("getSlot", json!([])).await;
        assert!(started.elapsed() < Duration::from_secs(2));
        match result {
            Err(Error::TransportExhausted { attempts }) => {
                assert_eq!(attempts.len(), 1);
            }
            other => panic!("expected TransportExhausted, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_health_summary_shape() {
        let config = test_config(&["https://a.example.com"]);
        let client = FailoverClient::new(&config).unwrap();
        client.record_success(0, 55.0).await;

        let summary = client.health_summary().await;
        assert_eq!(summary.len(), 1);
        assert_eq!(summary[0].status, ProviderStatus::Healthy);
        assert!(summary[0].score > 0.7);
    }
}
