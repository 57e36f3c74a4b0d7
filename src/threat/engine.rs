//! Threat engine - sweep dispatch, fusion, caching, alerts
//!
//! One entry point: `report()` returns the memoized assessment for a
//! mint, computing a fresh one when the 60s cache has expired.
//! `confirm()` always recomputes; the combinator calls it immediately
//! before committing capital.

use dashmap::DashMap;
use solana_sdk::pubkey::Pubkey;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::ThreatConfig;
use crate::listener::TokenEvent;
use crate::rpc::FailoverClient;

use super::heuristic::{run_sweep, Bucket, Heuristic, HeuristicInput, Outcome, SweepResult};
use super::market::{
    AgeMaturityCheck, CrossSourceConfirmation, HolderCountCheck, LiquidityDepthCheck,
    VolumeProfileCheck,
};
use super::report::{
    ConfidenceInterval, FactorContribution, RiskLevel, RiskThresholds, ThreatReport,
};
use super::reputation::CreatorReputationStore;
use super::risk::{
    CoordinatedBuyingCheck, CreatorExitCheck, CreatorReputationCheck, FreezeAuthorityCheck,
    HolderConcentration, HoneypotProbe, LiquidityLockCheck, LiquidityRemovalCheck,
    MintAuthorityCheck, PermanentDelegateCheck, PumpAndDumpCheck, TransferHookCheck,
    WashTradingCheck,
};
use super::snapshot::TokenSnapshot;
use super::technical::{
    CurveSanityCheck, HostileExtensionCheck, IdentityCoherenceCheck, MetadataCoherenceCheck,
    ProgramOwnerCheck,
};
use super::trend::TrendTracker;
use super::{AlertSeverity, ThreatAlert};

/// Neutral score assigned to a bucket with no evidence at all
const EMPTY_BUCKET_SCORE: f64 = 0.5;

/// Factors surfaced in the report
const TOP_FACTOR_COUNT: usize = 5;

struct CachedReport {
    report: ThreatReport,
    stored_at: Instant,
}

/// The threat scoring engine
pub struct ThreatEngine {
    config: ThreatConfig,
    thresholds: RiskThresholds,
    client: Arc<FailoverClient>,
    http: reqwest::Client,
    registry: Vec<Arc<dyn Heuristic>>,
    cache: DashMap<Pubkey, CachedReport>,
    trend: Mutex<TrendTracker>,
    reputation: Arc<CreatorReputationStore>,
    observations: Arc<DashMap<Pubkey, u32>>,
    alert_tx: mpsc::Sender<ThreatAlert>,
    last_alert: DashMap<Pubkey, Instant>,
    epoch: Instant,
}

impl ThreatEngine {
    pub fn new(
        config: ThreatConfig,
        client: Arc<FailoverClient>,
        reputation: Arc<CreatorReputationStore>,
        observations: Arc<DashMap<Pubkey, u32>>,
        alert_tx: mpsc::Sender<ThreatAlert>,
    ) -> Self {
        let thresholds = RiskThresholds::for_tolerance(config.risk_tolerance);
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(2))
            .build()
            .unwrap_or_default();

        Self {
            config,
            thresholds,
            client,
            http,
            registry: default_registry(),
            cache: DashMap::new(),
            trend: Mutex::new(TrendTracker::new()),
            reputation,
            observations,
            alert_tx,
            last_alert: DashMap::new(),
            epoch: Instant::now(),
        }
    }

    /// Number of registered heuristics
    pub fn heuristic_count(&self) -> usize {
        self.registry.len()
    }

    /// Assess a token, serving from the per-mint cache within its TTL
    pub async fn report(&self, event: &TokenEvent) -> ThreatReport {
        let ttl = Duration::from_secs(self.config.cache_ttl_secs);
        if let Some(cached) = self.cache.get(&event.mint) {
            if cached.stored_at.elapsed() < ttl {
                debug!(mint = %event.mint, "threat cache hit");
                return cached.report.clone();
            }
        }

        // First sight of this mint counts as a launch on the creator's record
        if !self.cache.contains_key(&event.mint) {
            self.reputation.record_launch(&event.creator.to_string());
        }

        self.compute_and_store(event).await
    }

    /// Pre-trade confirmation: always recompute, never trust the cache
    pub async fn confirm(&self, event: &TokenEvent) -> ThreatReport {
        debug!(mint = %event.mint, "forced fresh threat report");
        self.compute_and_store(event).await
    }

    async fn compute_and_store(&self, event: &TokenEvent) -> ThreatReport {
        let deadline = Duration::from_millis(self.config.heuristic_deadline_ms);

        let observations = self
            .observations
            .get(&event.mint)
            .map(|e| *e)
            .unwrap_or(1);

        // The snapshot prefetch shares the sweep deadline: heuristics
        // left without data degrade to Unknown rather than blocking.
        let snapshot =
            match tokio::time::timeout(deadline, TokenSnapshot::collect(
                &self.client,
                &self.http,
                event,
                observations,
            ))
            .await
            {
                Ok(snapshot) => snapshot,
                Err(_) => {
                    warn!(mint = %event.mint, "snapshot prefetch missed the deadline");
                    TokenSnapshot {
                        observations,
                        ..Default::default()
                    }
                }
            };

        let input = HeuristicInput {
            event,
            snapshot: &snapshot,
            client: &self.client,
            reputation: &self.reputation,
        };

        let results = run_sweep(&self.registry, &input, deadline).await;
        let report = fuse(&event.mint, &results, &self.thresholds);

        info!(
            mint = %event.mint,
            composite = format!("{:.3}", report.composite),
            level = ?report.risk_level,
            unknown = report.heuristics_unknown,
            "threat report"
        );

        self.track_and_alert(event.mint, &report);

        let previous = self.cache.insert(
            event.mint,
            CachedReport {
                report: report.clone(),
                stored_at: Instant::now(),
            },
        );

        // Crossing into CRITICAL fires immediately
        if report.risk_level == RiskLevel::Critical
            && previous.map(|p| p.report.risk_level) != Some(RiskLevel::Critical)
        {
            self.send_alert(
                event.mint,
                AlertSeverity::Critical,
                report.composite,
                "composite crossed into critical".to_string(),
            );
        }

        report
    }

    /// Update trend history and fire a warning on accelerating risk
    fn track_and_alert(&self, mint: Pubkey, report: &ThreatReport) {
        let now = self.epoch.elapsed().as_secs_f64();

        let analysis = {
            let mut trend = match self.trend.lock() {
                Ok(g) => g,
                Err(poisoned) => poisoned.into_inner(),
            };
            trend.update(mint, now, report.composite);
            trend.evict_stale(now, 3600.0);
            trend.analyze(&mint)
        };

        if analysis.trend > 0.05 && analysis.acceleration > 0.0 {
            self.send_alert(
                mint,
                AlertSeverity::Warning,
                report.composite,
                format!(
                    "risk rising {:.3}/min and accelerating",
                    analysis.trend
                ),
            );
        }
    }

    /// Fire-and-forget, rate-limited per mint
    fn send_alert(&self, mint: Pubkey, severity: AlertSeverity, composite: f64, reason: String) {
        let cooldown = Duration::from_secs(self.config.alert_cooldown_secs);
        if let Some(last) = self.last_alert.get(&mint) {
            if last.elapsed() < cooldown {
                return;
            }
        }
        self.last_alert.insert(mint, Instant::now());

        let alert = ThreatAlert {
            mint,
            severity,
            composite,
            reason,
        };
        if self.alert_tx.try_send(alert).is_err() {
            warn!(mint = %mint, "alert channel full, alert dropped");
        }
    }
}

/// The full heuristic registry: 13 risk, 5 technical, 5 market (the
/// authority block alone fans out into four separate answers)
pub fn default_registry() -> Vec<Arc<dyn Heuristic>> {
    vec![
        // Risk signals
        Arc::new(HoneypotProbe),
        Arc::new(MintAuthorityCheck),
        Arc::new(FreezeAuthorityCheck),
        Arc::new(PermanentDelegateCheck),
        Arc::new(TransferHookCheck),
        Arc::new(HolderConcentration),
        Arc::new(LiquidityLockCheck),
        Arc::new(LiquidityRemovalCheck),
        Arc::new(CreatorReputationCheck),
        Arc::new(CreatorExitCheck),
        Arc::new(WashTradingCheck),
        Arc::new(CoordinatedBuyingCheck),
        Arc::new(PumpAndDumpCheck),
        // Technical integrity
        Arc::new(ProgramOwnerCheck),
        Arc::new(HostileExtensionCheck),
        Arc::new(MetadataCoherenceCheck),
        Arc::new(CurveSanityCheck),
        Arc::new(IdentityCoherenceCheck),
        // Market health
        Arc::new(LiquidityDepthCheck),
        Arc::new(VolumeProfileCheck),
        Arc::new(AgeMaturityCheck),
        Arc::new(HolderCountCheck),
        Arc::new(CrossSourceConfirmation),
    ]
}

/// Fuse sweep results into a report.
///
/// Bucket scores are the mean over known outcomes; a bucket with no
/// evidence sits at neutral. An entirely unknown sweep classifies
/// CRITICAL regardless of the neutral composite: absence of evidence is
/// evidence of risk.
pub(crate) fn fuse(
    mint: &Pubkey,
    results: &[SweepResult],
    thresholds: &RiskThresholds,
) -> ThreatReport {
    let mut sums: std::collections::HashMap<Bucket, (f64, usize)> = Default::default();
    let mut unknown = 0usize;

    for result in results {
        match result.outcome {
            Outcome::Score(value) => {
                let entry = sums.entry(result.bucket).or_insert((0.0, 0));
                entry.0 += value;
                entry.1 += 1;
            }
            Outcome::Unknown(reason) => {
                unknown += 1;
                debug!(heuristic = result.name, reason, "unknown outcome");
            }
        }
    }

    let bucket_score = |bucket: Bucket| -> f64 {
        match sums.get(&bucket) {
            Some((sum, count)) if *count > 0 => sum / *count as f64,
            _ => EMPTY_BUCKET_SCORE,
        }
    };

    let score_risk = bucket_score(Bucket::Risk);
    let score_technical = bucket_score(Bucket::Technical);
    let score_market = bucket_score(Bucket::Market);

    let composite = (Bucket::Risk.weight() * score_risk
        + Bucket::Technical.weight() * score_technical
        + Bucket::Market.weight() * score_market)
        .clamp(0.0, 1.0);

    let all_unknown = results.is_empty() || unknown == results.len();
    let risk_level = if all_unknown {
        RiskLevel::Critical
    } else {
        thresholds.classify(composite)
    };

    // Width of the interval reflects both missing answers and bucket
    // disagreement
    let known_scores = [score_risk, score_technical, score_market];
    let spread = known_scores
        .iter()
        .fold(f64::MIN, |a, &b| a.max(b))
        - known_scores.iter().fold(f64::MAX, |a, &b| a.min(b));
    let unknown_ratio = if results.is_empty() {
        1.0
    } else {
        unknown as f64 / results.len() as f64
    };
    let confidence_interval = ConfidenceInterval::compute(composite, unknown_ratio, spread);

    // Rank each known heuristic by its share of the composite
    let mut top_factors: Vec<FactorContribution> = results
        .iter()
        .filter_map(|r| match r.outcome {
            Outcome::Score(value) => {
                let count = sums.get(&r.bucket).map(|(_, c)| *c).unwrap_or(1).max(1);
                Some(FactorContribution {
                    bucket: r.bucket,
                    name: r.name.to_string(),
                    contribution: value * r.bucket.weight() / count as f64,
                })
            }
            Outcome::Unknown(_) => None,
        })
        .collect();
    top_factors.sort_by(|a, b| {
        b.contribution
            .partial_cmp(&a.contribution)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    top_factors.truncate(TOP_FACTOR_COUNT);

    ThreatReport {
        mint: mint.to_string(),
        score_risk,
        score_technical,
        score_market,
        composite,
        risk_level,
        confidence_interval,
        top_factors,
        heuristics_total: results.len(),
        heuristics_unknown: unknown,
        generated_at: chrono::Utc::now(),
    }
}
