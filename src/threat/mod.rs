//! Threat module - unified risk index over concurrent heuristics
//!
//! Every new token gets a sweep of 23 heuristics dispatched in parallel
//! under one deadline, fused into three weighted buckets (risk 40%,
//! technical 30%, market 30%) and a composite score with confidence
//! bounds. A per-mint trend tracker turns score history into early
//! warnings. Absence of evidence is evidence of risk: an all-unknown
//! sweep classifies CRITICAL.

pub mod engine;
pub mod heuristic;
pub mod market;
pub mod report;
pub mod reputation;
pub mod risk;
pub mod snapshot;
pub mod technical;
pub mod trend;

use serde::Serialize;
use solana_sdk::pubkey::Pubkey;

pub use engine::ThreatEngine;
pub use heuristic::{Bucket, Heuristic, HeuristicInput, Outcome};
pub use report::{ConfidenceInterval, RiskLevel, RiskThresholds, ThreatReport, UncertaintyClass};
pub use reputation::CreatorReputationStore;
pub use snapshot::TokenSnapshot;
pub use trend::TrendTracker;

/// Severity of a reactive alert
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertSeverity {
    Warning,
    Critical,
}

/// Fire-and-forget alert sent to the position manager for fast exits
#[derive(Debug, Clone)]
pub struct ThreatAlert {
    pub mint: Pubkey,
    pub severity: AlertSeverity,
    pub composite: f64,
    pub reason: String,
}
