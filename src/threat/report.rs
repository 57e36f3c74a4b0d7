//! Threat report types
//!
//! The report is the engine's only output: bucket scores, the weighted
//! composite, a risk level under the configured tolerance preset, and a
//! confidence interval describing how much of the sweep actually ran.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::RiskTolerance;

use super::heuristic::Bucket;

/// Risk classification of a composite score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Safe,
    Monitor,
    High,
    Critical,
}

impl RiskLevel {
    /// Levels that veto BUY signals
    pub fn vetoes_entry(&self) -> bool {
        matches!(self, RiskLevel::High | RiskLevel::Critical)
    }
}

/// Cut-points between risk levels; anything at or above `high` is CRITICAL
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RiskThresholds {
    pub safe: f64,
    pub monitor: f64,
    pub high: f64,
}

impl RiskThresholds {
    pub fn for_tolerance(tolerance: RiskTolerance) -> Self {
        match tolerance {
            RiskTolerance::Conservative => Self {
                safe: 0.15,
                monitor: 0.40,
                high: 0.65,
            },
            RiskTolerance::Medium => Self {
                safe: 0.30,
                monitor: 0.60,
                high: 0.85,
            },
            RiskTolerance::Aggressive => Self {
                safe: 0.45,
                monitor: 0.75,
                high: 0.90,
            },
        }
    }

    pub fn classify(&self, score: f64) -> RiskLevel {
        if score < self.safe {
            RiskLevel::Safe
        } else if score < self.monitor {
            RiskLevel::Monitor
        } else if score < self.high {
            RiskLevel::High
        } else {
            RiskLevel::Critical
        }
    }
}

/// How much of the sweep went unanswered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UncertaintyClass {
    Low,
    Med,
    High,
}

/// Bounds on the composite given missing heuristics and bucket spread
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceInterval {
    pub lower: f64,
    pub upper: f64,
    pub uncertainty: UncertaintyClass,
}

impl ConfidenceInterval {
    /// Width grows with the unknown ratio and with disagreement between
    /// buckets; the class depends only on the unknown ratio.
    pub fn compute(composite: f64, unknown_ratio: f64, bucket_spread: f64) -> Self {
        let width = 0.2 * unknown_ratio + 0.1 * bucket_spread;

        let uncertainty = if unknown_ratio > 0.30 {
            UncertaintyClass::High
        } else if unknown_ratio >= 0.10 {
            UncertaintyClass::Med
        } else {
            UncertaintyClass::Low
        };

        Self {
            lower: (composite - width).max(0.0),
            upper: (composite + width).min(1.0),
            uncertainty,
        }
    }
}

/// One ranked contributor to the composite
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactorContribution {
    pub bucket: Bucket,
    pub name: String,
    pub contribution: f64,
}

/// Full threat assessment for one mint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreatReport {
    pub mint: String,
    pub score_risk: f64,
    pub score_technical: f64,
    pub score_market: f64,
    /// 0.4·risk + 0.3·technical + 0.3·market
    pub composite: f64,
    pub risk_level: RiskLevel,
    pub confidence_interval: ConfidenceInterval,
    /// Highest contributors first
    pub top_factors: Vec<FactorContribution>,
    pub heuristics_total: usize,
    pub heuristics_unknown: usize,
    pub generated_at: DateTime<Utc>,
}

impl ThreatReport {
    pub fn unknown_ratio(&self) -> f64 {
        if self.heuristics_total == 0 {
            return 1.0;
        }
        self.heuristics_unknown as f64 / self.heuristics_total as f64
    }
}

/// Synthetic report for strategy and pipeline tests
#[cfg(test)]
pub(crate) fn test_report(risk_level: RiskLevel, composite: f64) -> ThreatReport {
    ThreatReport {
        mint: "test-mint".into(),
        score_risk: composite,
        score_technical: composite,
        score_market: composite,
        composite,
        risk_level,
        confidence_interval: ConfidenceInterval::compute(composite, 0.0, 0.0),
        top_factors: vec![],
        heuristics_total: 23,
        heuristics_unknown: 0,
        generated_at: Utc::now(),
    }
}
