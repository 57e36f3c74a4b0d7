//! Configuration loading and validation

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub rpc: RpcConfig,
    pub listeners: ListenerConfig,
    pub threat: ThreatConfig,
    pub strategies: StrategiesConfig,
    pub capital: CapitalConfig,
    pub positions: PositionConfig,
    pub execution: ExecutionConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub simulation: SimulationConfig,
}

/// One RPC endpoint in the provider pool
#[derive(Debug, Clone, Deserialize)]
pub struct RpcEndpointConfig {
    pub url: String,
    /// WebSocket URL for subscriptions (derived from `url` when absent)
    #[serde(default)]
    pub ws_url: Option<String>,
    /// Name of an environment variable holding the endpoint's auth token
    #[serde(default)]
    pub auth_token_env: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RpcConfig {
    pub endpoints: Vec<RpcEndpointConfig>,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    #[serde(default = "default_health_check_interval_secs")]
    pub health_check_interval_secs: u64,
    #[serde(default = "default_max_consecutive_failures")]
    pub max_consecutive_failures: u32,
    /// One block interval; also the blockhash cache TTL
    #[serde(default = "default_block_interval_ms")]
    pub block_interval_ms: u64,
    /// Reconnect attempts on the same endpoint before failing over
    #[serde(default = "default_subscribe_reconnect_attempts")]
    pub subscribe_reconnect_attempts: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ListenerConfig {
    /// Fan-in channel capacity; oldest events are dropped when full
    #[serde(default = "default_fanin_capacity")]
    pub channel_capacity: usize,
    /// Mints remembered by the dedup window
    #[serde(default = "default_dedup_capacity")]
    pub dedup_capacity: usize,
    #[serde(default)]
    pub tx_logs: SourceToggle,
    #[serde(default)]
    pub block_feed: SourceToggle,
    #[serde(default)]
    pub sidecar: SidecarSourceConfig,
    #[serde(default)]
    pub listing_poll: ListingPollConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourceToggle {
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for SourceToggle {
    fn default() -> Self {
        Self { enabled: true }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SidecarSourceConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub ws_url: String,
}

impl Default for SidecarSourceConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            ws_url: String::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ListingPollConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub url: String,
    #[serde(default = "default_listing_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl Default for ListingPollConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            url: String::new(),
            poll_interval_ms: default_listing_poll_interval_ms(),
        }
    }
}

/// Risk tolerance presets shift the SAFE/MONITOR/HIGH/CRITICAL cut-points
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskTolerance {
    Conservative,
    Medium,
    Aggressive,
}

impl Default for RiskTolerance {
    fn default() -> Self {
        RiskTolerance::Medium
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ThreatConfig {
    /// Deadline for the concurrent heuristic sweep
    #[serde(default = "default_heuristic_deadline_ms")]
    pub heuristic_deadline_ms: u64,
    /// Report memoization TTL per mint
    #[serde(default = "default_report_cache_secs")]
    pub cache_ttl_secs: u64,
    #[serde(default)]
    pub risk_tolerance: RiskTolerance,
    /// Path of the persistent creator-reputation store
    #[serde(default = "default_reputation_path")]
    pub reputation_store_path: String,
    /// Minimum interval between repeated alerts for the same mint
    #[serde(default = "default_alert_cooldown_secs")]
    pub alert_cooldown_secs: u64,
}

impl Default for ThreatConfig {
    fn default() -> Self {
        Self {
            heuristic_deadline_ms: default_heuristic_deadline_ms(),
            cache_ttl_secs: default_report_cache_secs(),
            risk_tolerance: RiskTolerance::Medium,
            reputation_store_path: default_reputation_path(),
            alert_cooldown_secs: default_alert_cooldown_secs(),
        }
    }
}

/// Parameters shared by every strategy
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct StrategyCommonParams {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Fraction of total capital this strategy may deploy (0.0 to 1.0)
    #[serde(default = "default_capital_allocation")]
    pub capital_allocation: f64,
    /// Signals below this confidence are dropped at aggregation
    #[serde(default = "default_min_confidence")]
    pub min_confidence: f64,
    /// Hard cap on a single suggested position
    #[serde(default = "default_max_position_sol")]
    pub max_position_sol: f64,
}

impl Default for StrategyCommonParams {
    fn default() -> Self {
        Self {
            enabled: true,
            capital_allocation: default_capital_allocation(),
            min_confidence: default_min_confidence(),
            max_position_sol: default_max_position_sol(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct SnipeParams {
    #[serde(flatten)]
    pub common: StrategyCommonParams,
    /// Minimum pool liquidity to consider an entry
    #[serde(default = "default_snipe_min_liquidity")]
    pub min_liquidity_sol: f64,
    /// Tokens older than this are no longer snipe candidates
    #[serde(default = "default_snipe_max_age_secs")]
    pub max_age_secs: u64,
    #[serde(default = "default_snipe_base_size")]
    pub base_size_sol: f64,
}

impl Default for SnipeParams {
    fn default() -> Self {
        Self {
            common: StrategyCommonParams::default(),
            min_liquidity_sol: default_snipe_min_liquidity(),
            max_age_secs: default_snipe_max_age_secs(),
            base_size_sol: default_snipe_base_size(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct MomentumParams {
    #[serde(flatten)]
    pub common: StrategyCommonParams,
    #[serde(default = "default_rsi_period")]
    pub rsi_period: usize,
    #[serde(default = "default_rsi_overbought")]
    pub rsi_overbought: f64,
    #[serde(default = "default_rsi_oversold")]
    pub rsi_oversold: f64,
    #[serde(default = "default_macd_fast")]
    pub macd_fast: usize,
    #[serde(default = "default_macd_slow")]
    pub macd_slow: usize,
    #[serde(default = "default_momentum_base_size")]
    pub base_size_sol: f64,
}

impl Default for MomentumParams {
    fn default() -> Self {
        Self {
            common: StrategyCommonParams::default(),
            rsi_period: default_rsi_period(),
            rsi_overbought: default_rsi_overbought(),
            rsi_oversold: default_rsi_oversold(),
            macd_fast: default_macd_fast(),
            macd_slow: default_macd_slow(),
            base_size_sol: default_momentum_base_size(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ReversalParams {
    #[serde(flatten)]
    pub common: StrategyCommonParams,
    /// Window for the rolling volatility band
    #[serde(default = "default_reversal_window")]
    pub band_window: usize,
    /// Band width in standard deviations
    #[serde(default = "default_reversal_sigma")]
    pub band_sigma: f64,
    #[serde(default = "default_reversal_base_size")]
    pub base_size_sol: f64,
}

impl Default for ReversalParams {
    fn default() -> Self {
        Self {
            common: StrategyCommonParams::default(),
            band_window: default_reversal_window(),
            band_sigma: default_reversal_sigma(),
            base_size_sol: default_reversal_base_size(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct WhaleCopyParams {
    #[serde(flatten)]
    pub common: StrategyCommonParams,
    /// Curated wallet set to mirror
    #[serde(default)]
    pub wallets: Vec<String>,
    /// Delay before mirroring, to dodge the whale's own price impact
    #[serde(default = "default_whale_delay_ms")]
    pub copy_delay_ms: u64,
    /// Fraction of the whale's size to copy
    #[serde(default = "default_whale_fraction")]
    pub copy_fraction: f64,
    /// Ignore whale trades below this size
    #[serde(default = "default_whale_min_trade")]
    pub min_whale_trade_sol: f64,
}

impl Default for WhaleCopyParams {
    fn default() -> Self {
        Self {
            common: StrategyCommonParams {
                enabled: false,
                ..Default::default()
            },
            wallets: vec![],
            copy_delay_ms: default_whale_delay_ms(),
            copy_fraction: default_whale_fraction(),
            min_whale_trade_sol: default_whale_min_trade(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct SocialParams {
    #[serde(flatten)]
    pub common: StrategyCommonParams,
    #[serde(default = "default_social_min_virality")]
    pub min_virality: f64,
    #[serde(default = "default_social_min_sentiment")]
    pub min_sentiment: f64,
    #[serde(default = "default_social_max_bot_ratio")]
    pub max_bot_ratio: f64,
    #[serde(default = "default_social_base_size")]
    pub base_size_sol: f64,
}

impl Default for SocialParams {
    fn default() -> Self {
        Self {
            common: StrategyCommonParams {
                enabled: false,
                ..Default::default()
            },
            min_virality: default_social_min_virality(),
            min_sentiment: default_social_min_sentiment(),
            max_bot_ratio: default_social_max_bot_ratio(),
            base_size_sol: default_social_base_size(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct StrategiesConfig {
    #[serde(default)]
    pub snipe: SnipeParams,
    #[serde(default)]
    pub momentum: MomentumParams,
    #[serde(default)]
    pub reversal: ReversalParams,
    #[serde(default)]
    pub whale_copy: WhaleCopyParams,
    #[serde(default)]
    pub social: SocialParams,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CapitalConfig {
    /// Total capital the engine may deploy
    #[serde(default = "default_total_capital")]
    pub total_sol: f64,
    /// Per-mint ceiling across all strategies
    #[serde(default = "default_per_mint_cap")]
    pub per_mint_cap_sol: f64,
    /// Portfolio-level exposure ceiling
    #[serde(default = "default_portfolio_cap")]
    pub portfolio_exposure_cap_sol: f64,
    /// Intents smaller than this are dropped
    #[serde(default = "default_min_trade")]
    pub min_trade_sol: f64,
}

impl Default for CapitalConfig {
    fn default() -> Self {
        Self {
            total_sol: default_total_capital(),
            per_mint_cap_sol: default_per_mint_cap(),
            portfolio_exposure_cap_sol: default_portfolio_cap(),
            min_trade_sol: default_min_trade(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PositionConfig {
    #[serde(default = "default_stop_loss_pct")]
    pub stop_loss_pct: f64,
    #[serde(default = "default_take_profit_pct")]
    pub take_profit_pct: f64,
    #[serde(default = "default_trailing_pct")]
    pub trailing_stop_pct: f64,
    #[serde(default = "default_max_hold_secs")]
    pub max_hold_secs: u64,
    /// Push-subscription monitoring cadence
    #[serde(default = "default_push_interval_ms")]
    pub price_push_interval_ms: u64,
    /// Pull fallback cadence when the subscription is gapped
    #[serde(default = "default_poll_interval_ms")]
    pub price_poll_interval_ms: u64,
    /// Exit retries before backing off to the slow path
    #[serde(default = "default_max_exit_retries")]
    pub max_exit_retries: u32,
    /// Deadline for OPENING before we probe on-chain and decide
    #[serde(default = "default_open_deadline_secs")]
    pub open_deadline_secs: u64,
}

impl Default for PositionConfig {
    fn default() -> Self {
        Self {
            stop_loss_pct: default_stop_loss_pct(),
            take_profit_pct: default_take_profit_pct(),
            trailing_stop_pct: default_trailing_pct(),
            max_hold_secs: default_max_hold_secs(),
            price_push_interval_ms: default_push_interval_ms(),
            price_poll_interval_ms: default_poll_interval_ms(),
            max_exit_retries: default_max_exit_retries(),
            open_deadline_secs: default_open_deadline_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExecutionConfig {
    #[serde(default = "default_buy_slippage_bps")]
    pub buy_slippage_bps: u32,
    #[serde(default = "default_sell_slippage_bps")]
    pub sell_slippage_bps: u32,
    /// Hard cap for the exit escalation ladder
    #[serde(default = "default_max_slippage_bps")]
    pub max_slippage_bps: u32,
    #[serde(default = "default_priority_fee")]
    pub priority_fee_lamports: u64,
    #[serde(default = "default_max_priority_fee")]
    pub max_priority_fee_lamports: u64,
    /// Bundle relay endpoint
    #[serde(default = "default_bundle_url")]
    pub bundle_url: String,
    #[serde(default = "default_submit_retry_attempts")]
    pub retry_attempts: u32,
    #[serde(default = "default_submit_retry_delay_ms")]
    pub retry_base_delay_ms: u64,
    /// Signing requests allowed per second (flood guard)
    #[serde(default = "default_signing_rate_cap")]
    pub signing_rate_cap: u32,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            buy_slippage_bps: default_buy_slippage_bps(),
            sell_slippage_bps: default_sell_slippage_bps(),
            max_slippage_bps: default_max_slippage_bps(),
            priority_fee_lamports: default_priority_fee(),
            max_priority_fee_lamports: default_max_priority_fee(),
            bundle_url: default_bundle_url(),
            retry_attempts: default_submit_retry_attempts(),
            retry_base_delay_ms: default_submit_retry_delay_ms(),
            signing_rate_cap: default_signing_rate_cap(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_api_bind")]
    pub bind: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind: default_api_bind(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SimulationConfig {
    /// Log intents instead of submitting bundles
    #[serde(default)]
    pub enabled: bool,
}

// Default value functions

fn default_request_timeout_ms() -> u64 {
    2000
}

fn default_health_check_interval_secs() -> u64 {
    30
}

fn default_max_consecutive_failures() -> u32 {
    3
}

fn default_block_interval_ms() -> u64 {
    400
}

fn default_subscribe_reconnect_attempts() -> u32 {
    3
}

fn default_fanin_capacity() -> usize {
    1024
}

fn default_dedup_capacity() -> usize {
    50_000
}

fn default_listing_poll_interval_ms() -> u64 {
    2000
}

fn default_heuristic_deadline_ms() -> u64 {
    1500
}

fn default_report_cache_secs() -> u64 {
    60
}

fn default_reputation_path() -> String {
    "data/creator_reputation.json".to_string()
}

fn default_alert_cooldown_secs() -> u64 {
    30
}

fn default_capital_allocation() -> f64 {
    0.2
}

fn default_min_confidence() -> f64 {
    0.7
}

fn default_max_position_sol() -> f64 {
    0.5
}

fn default_snipe_min_liquidity() -> f64 {
    5.0
}

fn default_snipe_max_age_secs() -> u64 {
    120
}

fn default_snipe_base_size() -> f64 {
    0.1
}

fn default_rsi_period() -> usize {
    14
}

fn default_rsi_overbought() -> f64 {
    70.0
}

fn default_rsi_oversold() -> f64 {
    30.0
}

fn default_macd_fast() -> usize {
    12
}

fn default_macd_slow() -> usize {
    26
}

fn default_momentum_base_size() -> f64 {
    0.08
}

fn default_reversal_window() -> usize {
    20
}

fn default_reversal_sigma() -> f64 {
    2.0
}

fn default_reversal_base_size() -> f64 {
    0.08
}

fn default_whale_delay_ms() -> u64 {
    800
}

fn default_whale_fraction() -> f64 {
    0.1
}

fn default_whale_min_trade() -> f64 {
    1.0
}

fn default_social_min_virality() -> f64 {
    0.6
}

fn default_social_min_sentiment() -> f64 {
    0.5
}

fn default_social_max_bot_ratio() -> f64 {
    0.4
}

fn default_social_base_size() -> f64 {
    0.05
}

fn default_total_capital() -> f64 {
    2.0
}

fn default_per_mint_cap() -> f64 {
    0.5
}

fn default_portfolio_cap() -> f64 {
    1.5
}

fn default_min_trade() -> f64 {
    0.005
}

fn default_stop_loss_pct() -> f64 {
    20.0
}

fn default_take_profit_pct() -> f64 {
    50.0
}

fn default_trailing_pct() -> f64 {
    15.0
}

fn default_max_hold_secs() -> u64 {
    900
}

fn default_push_interval_ms() -> u64 {
    1000
}

fn default_poll_interval_ms() -> u64 {
    5000
}

fn default_max_exit_retries() -> u32 {
    3
}

fn default_open_deadline_secs() -> u64 {
    30
}

fn default_buy_slippage_bps() -> u32 {
    2500
}

fn default_sell_slippage_bps() -> u32 {
    2500
}

fn default_max_slippage_bps() -> u32 {
    5000
}

fn default_priority_fee() -> u64 {
    100_000
}

fn default_max_priority_fee() -> u64 {
    2_000_000
}

fn default_bundle_url() -> String {
    std::env::var("BUNDLE_RELAY_URL")
        .unwrap_or_else(|_| "https://ny.mainnet.block-engine.jito.wtf".into())
}

fn default_submit_retry_attempts() -> u32 {
    3
}

fn default_submit_retry_delay_ms() -> u64 {
    50
}

fn default_signing_rate_cap() -> u32 {
    10
}

fn default_api_bind() -> String {
    "127.0.0.1:8787".to_string()
}

fn default_true() -> bool {
    true
}

impl Config {
    /// Load configuration from file and environment variables
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let settings = config::Config::builder()
            .add_source(config::File::from(path).required(false))
            // Override with environment variables (prefix WARDEN_)
            .add_source(
                config::Environment::with_prefix("WARDEN")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to build configuration")?;

        let config: Config = settings
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values
    fn validate(&self) -> Result<()> {
        if self.rpc.endpoints.is_empty() {
            anyhow::bail!("At least one RPC endpoint is required");
        }

        for ep in &self.rpc.endpoints {
            url::Url::parse(&ep.url)
                .with_context(|| format!("Invalid RPC endpoint URL: {}", ep.url))?;
        }

        if self.capital.total_sol <= 0.0 {
            anyhow::bail!("capital.total_sol must be positive");
        }

        if self.capital.per_mint_cap_sol > self.capital.total_sol {
            anyhow::bail!("capital.per_mint_cap_sol cannot exceed total_sol");
        }

        if self.capital.portfolio_exposure_cap_sol > self.capital.total_sol {
            anyhow::bail!("capital.portfolio_exposure_cap_sol cannot exceed total_sol");
        }

        if self.execution.buy_slippage_bps > 10_000 || self.execution.max_slippage_bps > 10_000 {
            anyhow::bail!("slippage cannot exceed 10000 bps (100%)");
        }

        let allocations = [
            (&self.strategies.snipe.common, "snipe"),
            (&self.strategies.momentum.common, "momentum"),
            (&self.strategies.reversal.common, "reversal"),
            (&self.strategies.whale_copy.common, "whale_copy"),
            (&self.strategies.social.common, "social"),
        ];

        let total_allocation: f64 = allocations
            .iter()
            .filter(|(c, _)| c.enabled)
            .map(|(c, _)| c.capital_allocation)
            .sum();
        if total_allocation > 1.0 {
            tracing::warn!(
                "Total strategy capital allocation exceeds 100%: {:.0}%",
                total_allocation * 100.0
            );
        }

        for (common, name) in &allocations {
            if !(0.0..=1.0).contains(&common.min_confidence) {
                anyhow::bail!("strategies.{name}.min_confidence must be within [0, 1]");
            }
            if !(0.0..=1.0).contains(&common.capital_allocation) {
                anyhow::bail!("strategies.{name}.capital_allocation must be within [0, 1]");
            }
        }

        for wallet in &self.strategies.whale_copy.wallets {
            if wallet.len() < 32 || wallet.len() > 44 {
                anyhow::bail!("Invalid whale wallet address: {}", wallet);
            }
        }

        if self.listeners.sidecar.enabled && self.listeners.sidecar.ws_url.is_empty() {
            anyhow::bail!("listeners.sidecar.ws_url is required when the sidecar feed is enabled");
        }

        if self.listeners.listing_poll.enabled && self.listeners.listing_poll.url.is_empty() {
            anyhow::bail!("listeners.listing_poll.url is required when the polled feed is enabled");
        }

        Ok(())
    }

    /// Get masked configuration for display (hide secrets)
    pub fn masked_display(&self) -> String {
        let endpoints: Vec<String> = self
            .rpc
            .endpoints
            .iter()
            .map(|e| mask_url(&e.url))
            .collect();

        format!(
            r#"Configuration:
  RPC:
    endpoints: {:?}
    request_timeout: {}ms
    health_check_interval: {}s
  Listeners:
    fan-in capacity: {}
    dedup window: {} mints
  Threat:
    heuristic_deadline: {}ms
    cache_ttl: {}s
    risk_tolerance: {:?}
  Capital:
    total: {} SOL
    per_mint_cap: {} SOL
    portfolio_cap: {} SOL
  Positions:
    stop_loss: {}%  take_profit: {}%  trailing: {}%
    max_hold: {}s
  Execution:
    buy_slippage: {}bps  sell_slippage: {}bps (cap {}bps)
    bundle_relay: {}
  Simulation: {}
"#,
            endpoints,
            self.rpc.request_timeout_ms,
            self.rpc.health_check_interval_secs,
            self.listeners.channel_capacity,
            self.listeners.dedup_capacity,
            self.threat.heuristic_deadline_ms,
            self.threat.cache_ttl_secs,
            self.threat.risk_tolerance,
            self.capital.total_sol,
            self.capital.per_mint_cap_sol,
            self.capital.portfolio_exposure_cap_sol,
            self.positions.stop_loss_pct,
            self.positions.take_profit_pct,
            self.positions.trailing_stop_pct,
            self.positions.max_hold_secs,
            self.execution.buy_slippage_bps,
            self.execution.sell_slippage_bps,
            self.execution.max_slippage_bps,
            mask_url(&self.execution.bundle_url),
            self.simulation.enabled,
        )
    }
}

/// Mask URL for display (hide API keys in query params)
fn mask_url(url: &str) -> String {
    if let Some(idx) = url.find('?') {
        format!("{}?***", &url[..idx])
    } else {
        url.to_string()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            rpc: RpcConfig {
                endpoints: vec![RpcEndpointConfig {
                    url: "https://api.mainnet-beta.solana.com".into(),
                    ws_url: None,
                    auth_token_env: None,
                }],
                request_timeout_ms: default_request_timeout_ms(),
                health_check_interval_secs: default_health_check_interval_secs(),
                max_consecutive_failures: default_max_consecutive_failures(),
                block_interval_ms: default_block_interval_ms(),
                subscribe_reconnect_attempts: default_subscribe_reconnect_attempts(),
            },
            listeners: ListenerConfig {
                channel_capacity: default_fanin_capacity(),
                dedup_capacity: default_dedup_capacity(),
                tx_logs: SourceToggle::default(),
                block_feed: SourceToggle::default(),
                sidecar: SidecarSourceConfig::default(),
                listing_poll: ListingPollConfig::default(),
            },
            threat: ThreatConfig::default(),
            strategies: StrategiesConfig::default(),
            capital: CapitalConfig::default(),
            positions: PositionConfig::default(),
            execution: ExecutionConfig::default(),
            api: ApiConfig::default(),
            simulation: SimulationConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        config.validate().unwrap();
        assert_eq!(config.rpc.request_timeout_ms, 2000);
        assert_eq!(config.listeners.channel_capacity, 1024);
        assert_eq!(config.capital.min_trade_sol, 0.005);
    }

    #[test]
    fn test_per_mint_cap_cannot_exceed_total() {
        let mut config = Config::default();
        config.capital.per_mint_cap_sol = config.capital.total_sol + 1.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_sidecar_requires_url() {
        let mut config = Config::default();
        config.listeners.sidecar.enabled = true;
        assert!(config.validate().is_err());
        config.listeners.sidecar.ws_url = "wss://sidecar.example.com/feed".into();
        config.validate().unwrap();
    }

    #[test]
    fn test_risk_tolerance_deserialize() {
        let t: RiskTolerance = serde_json::from_str(r#""aggressive""#).unwrap();
        assert_eq!(t, RiskTolerance::Aggressive);
    }

    #[test]
    fn test_mask_url() {
        assert_eq!(
            mask_url("https://rpc.example.com?api-key=secret"),
            "https://rpc.example.com?***"
        );
        assert_eq!(mask_url("https://rpc.example.com"), "https://rpc.example.com");
    }
}
