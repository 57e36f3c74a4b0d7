//! Technical-integrity heuristics (30% of the composite)
//!
//! Is the token what it claims to be: owned by a real token program,
//! free of hostile extensions, with coherent metadata and a curve that
//! prices the way the formula says it should.

use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use solana_sdk::pubkey::Pubkey;

use crate::chain::program::TOKEN_2022_PROGRAM_ID;

use super::heuristic::{Bucket, Heuristic, HeuristicInput, Outcome};

lazy_static! {
    /// Symbols are short tickers; anything else is trying to look like
    /// something it is not
    static ref SYMBOL_RE: Regex = Regex::new(r"^[A-Za-z0-9$.\-_]{1,12}$").unwrap();
    static ref URL_IN_NAME_RE: Regex = Regex::new(r"(?i)(https?://|www\.|t\.me/)").unwrap();
}

/// The mint must be owned by one of the two token programs
pub struct ProgramOwnerCheck;

#[async_trait]
impl Heuristic for ProgramOwnerCheck {
    fn name(&self) -> &'static str {
        "program_owner"
    }
    fn bucket(&self) -> Bucket {
        Bucket::Technical
    }

    async fn evaluate(&self, input: &HeuristicInput<'_>) -> Outcome {
        let Some(owner) = input.snapshot.mint_owner else {
            return Outcome::Unknown("mint owner unavailable");
        };

        if owner == spl_token::ID {
            Outcome::Score(0.0)
        } else if owner == *TOKEN_2022_PROGRAM_ID {
            // Legitimate, but the extension surface warrants a closer look
            Outcome::Score(0.2)
        } else {
            Outcome::Score(1.0)
        }
    }
}

/// Cross-check declared extensions against the known-hostile set
pub struct HostileExtensionCheck;

#[async_trait]
impl Heuristic for HostileExtensionCheck {
    fn name(&self) -> &'static str {
        "hostile_extensions"
    }
    fn bucket(&self) -> Bucket {
        Bucket::Technical
    }

    async fn evaluate(&self, input: &HeuristicInput<'_>) -> Outcome {
        let Some(summary) = &input.snapshot.mint_summary else {
            return Outcome::Unknown("mint account unavailable");
        };

        let hostile = summary.hostile_extensions().len();
        Outcome::Score((hostile as f64 * 0.45).min(1.0))
    }
}

/// Symbol/name sanity, URI reachability, and mime-type sanity
pub struct MetadataCoherenceCheck;

#[async_trait]
impl Heuristic for MetadataCoherenceCheck {
    fn name(&self) -> &'static str {
        "metadata_coherence"
    }
    fn bucket(&self) -> Bucket {
        Bucket::Technical
    }

    async fn evaluate(&self, input: &HeuristicInput<'_>) -> Outcome {
        let event = input.event;

        // Block-feed discoveries carry no metadata at all
        if event.name.is_empty() && event.symbol.is_empty() && event.metadata_uri.is_empty() {
            return Outcome::Unknown("no metadata on this source");
        }

        let mut score = 0.0f64;

        if event.symbol.is_empty() || !SYMBOL_RE.is_match(&event.symbol) {
            score += 0.3;
        }
        if event.name.is_empty() || event.name.len() > 64 || URL_IN_NAME_RE.is_match(&event.name) {
            score += 0.3;
        }

        match &input.snapshot.metadata_probe {
            Some(probe) => {
                if !probe.reachable {
                    score += 0.3;
                }
                if let Some(mime) = &probe.content_type {
                    let sane = mime.starts_with("application/json")
                        || mime.starts_with("image/")
                        || mime.starts_with("text/plain");
                    if !sane {
                        score += 0.1;
                    }
                }
            }
            None => score += 0.15, // URI missing or probe never completed
        }

        Outcome::Score(score.min(1.0))
    }
}

/// The curve's observed price must match what its reserves imply
pub struct CurveSanityCheck;

#[async_trait]
impl Heuristic for CurveSanityCheck {
    fn name(&self) -> &'static str {
        "curve_sanity"
    }
    fn bucket(&self) -> Bucket {
        Bucket::Technical
    }

    async fn evaluate(&self, input: &HeuristicInput<'_>) -> Outcome {
        let Some(curve) = &input.snapshot.curve else {
            return Outcome::Unknown("no curve state");
        };

        // Virtual reserves bound the real ones on an honest curve
        if curve.real_sol_reserves > curve.virtual_sol_reserves
            || curve.real_token_reserves > curve.virtual_token_reserves
        {
            return Outcome::Score(0.95);
        }

        let Ok(price) = curve.spot_price() else {
            return Outcome::Score(0.9);
        };

        // Fresh launchpad curves price within a narrow envelope; orders
        // of magnitude outside it means doctored reserves
        if !(1e-10..=1e-4).contains(&price) {
            return Outcome::Score(0.85);
        }

        Outcome::Score(0.05)
    }
}

/// Non-Pubkey creator or mint mismatch slips through some feeds; a mint
/// that equals its creator is malformed by construction
pub struct IdentityCoherenceCheck;

#[async_trait]
impl Heuristic for IdentityCoherenceCheck {
    fn name(&self) -> &'static str {
        "identity_coherence"
    }
    fn bucket(&self) -> Bucket {
        Bucket::Technical
    }

    async fn evaluate(&self, input: &HeuristicInput<'_>) -> Outcome {
        let event = input.event;
        if event.mint == Pubkey::default() || event.creator == Pubkey::default() {
            return Outcome::Score(1.0);
        }
        if event.mint == event.creator {
            return Outcome::Score(1.0);
        }
        Outcome::Score(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::threat::heuristic::test_event;
    use crate::threat::reputation::CreatorReputationStore;
    use crate::threat::snapshot::{MetadataProbe, TokenSnapshot};

    async fn run(
        heuristic: &dyn Heuristic,
        event: &crate::listener::TokenEvent,
        snapshot: &TokenSnapshot,
    ) -> Outcome {
        let client = crate::rpc::FailoverClient::new(&crate::config::Config::default().rpc).unwrap();
        let reputation = CreatorReputationStore::in_memory();
        let input = HeuristicInput {
            event,
            snapshot,
            client: &client,
            reputation: &reputation,
        };
        heuristic.evaluate(&input).await
    }

    #[tokio::test]
    async fn test_metadata_sane_token_scores_low() {
        let event = test_event();
        let snapshot = TokenSnapshot {
            metadata_probe: Some(MetadataProbe {
                reachable: true,
                content_type: Some("application/json".into()),
            }),
            ..Default::default()
        };

        match run(&MetadataCoherenceCheck, &event, &snapshot).await {
            Outcome::Score(s) => assert!(s < 0.2, "score was {s}"),
            other => panic!("expected score, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_metadata_url_in_name_penalized() {
        let mut event = test_event();
        event.name = "BUY NOW https://scam.example".into();
        let snapshot = TokenSnapshot {
            metadata_probe: Some(MetadataProbe {
                reachable: false,
                content_type: None,
            }),
            ..Default::default()
        };

        match run(&MetadataCoherenceCheck, &event, &snapshot).await {
            Outcome::Score(s) => assert!(s >= 0.5, "score was {s}"),
            other => panic!("expected score, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_identity_mint_equals_creator() {
        let mut event = test_event();
        event.creator = event.mint;
        let snapshot = TokenSnapshot::default();

        assert_eq!(
            run(&IdentityCoherenceCheck, &event, &snapshot).await,
            Outcome::Score(1.0)
        );
    }

    #[tokio::test]
    async fn test_curve_sanity_honest_curve() {
        let event = test_event();
        let snapshot = TokenSnapshot {
            curve: Some(crate::chain::curve::test_curve()),
            ..Default::default()
        };

        match run(&CurveSanityCheck, &event, &snapshot).await {
            Outcome::Score(s) => assert!(s < 0.1),
            other => panic!("expected score, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_missing_mint_is_unknown() {
        let event = test_event();
        let snapshot = TokenSnapshot::default();
        assert!(matches!(
            run(&HostileExtensionCheck, &event, &snapshot).await,
            Outcome::Unknown(_)
        ));
    }
}
