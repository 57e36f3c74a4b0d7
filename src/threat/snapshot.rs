//! Shared per-token data fetched once per sweep
//!
//! Most heuristics read the same handful of accounts. The engine
//! prefetches them concurrently and hands every heuristic the same
//! snapshot; individual fetch failures leave fields `None`, which
//! downstream heuristics report as `Unknown` rather than guessing.

use solana_sdk::pubkey::Pubkey;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::chain::{CurveState, MintSummary};
use crate::listener::TokenEvent;
use crate::rpc::{FailoverClient, SignatureInfo};

/// HTTP probe deadline for metadata reachability
const METADATA_PROBE_TIMEOUT: Duration = Duration::from_millis(800);

/// Signature history fetched for activity heuristics
const SIGNATURE_FETCH_LIMIT: usize = 50;

/// Result of probing the metadata URI
#[derive(Debug, Clone, Default)]
pub struct MetadataProbe {
    pub reachable: bool,
    pub content_type: Option<String>,
}

/// Everything prefetched for one sweep
#[derive(Default)]
pub struct TokenSnapshot {
    pub mint_summary: Option<MintSummary>,
    pub mint_owner: Option<Pubkey>,
    pub curve: Option<CurveState>,
    /// Largest holders as (address, ui amount)
    pub holders: Option<Vec<(String, f64)>>,
    /// Recent activity on the mint, newest first
    pub signatures: Option<Vec<SignatureInfo>>,
    pub metadata_probe: Option<MetadataProbe>,
    /// Cross-source observation count from the dedup window
    pub observations: u32,
}

impl TokenSnapshot {
    /// Prefetch all shared inputs concurrently. Every fetch degrades to
    /// None on failure; the sweep itself never fails here.
    pub async fn collect(
        client: &Arc<FailoverClient>,
        http: &reqwest::Client,
        event: &TokenEvent,
        observations: u32,
    ) -> Self {
        let mint = event.mint;

        let mint_fetch = async {
            match client.get_account_data(&mint).await {
                Ok(Some(data)) => MintSummary::parse(&data).ok(),
                _ => None,
            }
        };

        let owner_fetch = async { client.get_account_owner(&mint).await.ok().flatten() };

        let curve_fetch = async {
            let curve_key = event.bonding_curve?;
            match client.get_account_data(&curve_key).await {
                Ok(Some(data)) => CurveState::decode(&data).ok(),
                _ => None,
            }
        };

        let holders_fetch = async { client.get_token_largest_accounts(&mint).await.ok() };

        let signatures_fetch = async {
            client
                .get_signatures_for_address(&mint, SIGNATURE_FETCH_LIMIT)
                .await
                .ok()
        };

        let metadata_fetch = async {
            if event.metadata_uri.is_empty() {
                return None;
            }
            probe_metadata(http, &event.metadata_uri).await
        };

        let (mint_summary, mint_owner, curve, holders, signatures, metadata_probe) = tokio::join!(
            mint_fetch,
            owner_fetch,
            curve_fetch,
            holders_fetch,
            signatures_fetch,
            metadata_fetch
        );

        debug!(
            mint = %mint,
            have_mint = mint_summary.is_some(),
            have_curve = curve.is_some(),
            have_holders = holders.is_some(),
            "snapshot collected"
        );

        Self {
            mint_summary,
            mint_owner,
            curve,
            holders,
            signatures,
            metadata_probe,
            observations,
        }
    }
}

async fn probe_metadata(http: &reqwest::Client, uri: &str) -> Option<MetadataProbe> {
    let response = tokio::time::timeout(METADATA_PROBE_TIMEOUT, http.head(uri).send())
        .await
        .ok()?
        .ok()?;

    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(String::from);

    Some(MetadataProbe {
        reachable: response.status().is_success(),
        content_type,
    })
}
