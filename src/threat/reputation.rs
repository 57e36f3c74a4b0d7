//! Persistent creator-reputation store
//!
//! Append-mostly key-value store keyed by creator address. Mint records
//! elsewhere hold only the creator address, never a back-pointer, which
//! keeps the creator/mint reference cycle broken.
//!
//! Persistence is a JSON file rewritten atomically via a temp file.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};

/// Track record of one creator address
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreatorRecord {
    pub launches: u32,
    /// Positions on this creator's tokens closed at a profit
    pub profitable_exits: u32,
    /// Positions force-closed by emergency exits (rug-shaped endings)
    pub emergency_exits: u32,
    pub last_seen: chrono::DateTime<chrono::Utc>,
}

impl CreatorRecord {
    /// Risk contribution in [0, 1]. Unknown creators sit at neutral 0.5;
    /// emergency-heavy histories push toward 1, profitable ones toward 0.
    pub fn risk_score(&self) -> f64 {
        let outcomes = self.profitable_exits + self.emergency_exits;
        if outcomes == 0 {
            // Serial launchers with no surviving tokens are their own signal
            return if self.launches >= 10 { 0.75 } else { 0.5 };
        }

        let rug_ratio = self.emergency_exits as f64 / outcomes as f64;
        // Blend toward the observed ratio as evidence accumulates
        let evidence = (outcomes as f64 / 5.0).min(1.0);
        0.5 * (1.0 - evidence) + rug_ratio * evidence
    }
}

/// Creator reputation store, persisted as a JSON map
pub struct CreatorReputationStore {
    records: DashMap<String, CreatorRecord>,
    path: Option<PathBuf>,
}

impl CreatorReputationStore {
    /// Ephemeral store for tests and simulation
    pub fn in_memory() -> Self {
        Self {
            records: DashMap::new(),
            path: None,
        }
    }

    /// Load from disk, starting empty when the file does not exist
    pub async fn load(path: &str) -> Result<Self> {
        let path_buf = PathBuf::from(path);

        let records = if path_buf.exists() {
            let data = tokio::fs::read_to_string(&path_buf)
                .await
                .map_err(|e| Error::Persistence(format!("read reputation store: {e}")))?;
            let map: HashMap<String, CreatorRecord> = serde_json::from_str(&data)
                .map_err(|e| Error::Persistence(format!("parse reputation store: {e}")))?;
            info!("Loaded {} creator records from {path}", map.len());
            map.into_iter().collect()
        } else {
            debug!("No reputation store at {path}, starting empty");
            DashMap::new()
        };

        Ok(Self {
            records,
            path: Some(path_buf),
        })
    }

    /// Write the store to disk atomically
    pub async fn save(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| Error::Persistence(format!("create store dir: {e}")))?;
            }
        }

        let map: HashMap<String, CreatorRecord> = self
            .records
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect();
        let data = serde_json::to_string_pretty(&map)
            .map_err(|e| Error::Persistence(format!("serialize reputation store: {e}")))?;

        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, data)
            .await
            .map_err(|e| Error::Persistence(format!("write reputation store: {e}")))?;
        tokio::fs::rename(&tmp, path)
            .await
            .map_err(|e| Error::Persistence(format!("rename reputation store: {e}")))?;

        debug!("Saved {} creator records", self.records.len());
        Ok(())
    }

    /// Record that a creator launched a new token
    pub fn record_launch(&self, creator: &str) {
        let mut record = self.records.entry(creator.to_string()).or_default();
        record.launches += 1;
        record.last_seen = chrono::Utc::now();
    }

    /// Record how a position on this creator's token ended
    pub fn record_outcome(&self, creator: &str, profitable: bool, emergency: bool) {
        let mut record = self.records.entry(creator.to_string()).or_default();
        if emergency {
            record.emergency_exits += 1;
        } else if profitable {
            record.profitable_exits += 1;
        }
        record.last_seen = chrono::Utc::now();
    }

    /// Risk contribution for a creator, neutral when unseen
    pub fn risk_score(&self, creator: &str) -> f64 {
        self.records
            .get(creator)
            .map(|r| r.risk_score())
            .unwrap_or(0.5)
    }

    pub fn get(&self, creator: &str) -> Option<CreatorRecord> {
        self.records.get(creator).map(|r| r.clone())
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Flush on shutdown; failure is logged, not propagated
    pub async fn flush(&self) {
        if let Err(e) = self.save().await {
            warn!("reputation store flush failed: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_creator_is_neutral() {
        let store = CreatorReputationStore::in_memory();
        assert!((store.risk_score("nobody") - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_emergency_history_raises_risk() {
        let store = CreatorReputationStore::in_memory();
        store.record_launch("rugger");
        for _ in 0..5 {
            store.record_outcome("rugger", false, true);
        }
        assert!(store.risk_score("rugger") > 0.9);
    }

    #[test]
    fn test_profitable_history_lowers_risk() {
        let store = CreatorReputationStore::in_memory();
        store.record_launch("builder");
        for _ in 0..5 {
            store.record_outcome("builder", true, false);
        }
        assert!(store.risk_score("builder") < 0.1);
    }

    #[test]
    fn test_serial_launcher_without_outcomes() {
        let store = CreatorReputationStore::in_memory();
        for _ in 0..12 {
            store.record_launch("spammer");
        }
        assert!(store.risk_score("spammer") > 0.7);
    }

    #[tokio::test]
    async fn test_save_and_load_round_trip() {
        let dir = std::env::temp_dir().join(format!("warden-rep-{}", std::process::id()));
        tokio::fs::create_dir_all(&dir).await.unwrap();
        let path = dir.join("reputation.json");
        let path_str = path.to_str().unwrap().to_string();

        {
            let store = CreatorReputationStore::load(&path_str).await.unwrap();
            store.record_launch("creator1");
            store.record_outcome("creator1", true, false);
            store.save().await.unwrap();
        }

        let reloaded = CreatorReputationStore::load(&path_str).await.unwrap();
        let record = reloaded.get("creator1").unwrap();
        assert_eq!(record.launches, 1);
        assert_eq!(record.profitable_exits, 1);

        tokio::fs::remove_dir_all(&dir).await.ok();
    }
}
