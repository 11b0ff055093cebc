use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use tokio::sync::Mutex;
use tracing::warn;

use crate::decisions::model::Decision;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("decision store I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("decision store encoding error: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Result of persisting a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    /// The stored decision changed materially (or none existed).
    Replaced,
    /// An equal decision was already stored; only its timestamp advanced.
    Refreshed,
}

/// Durable per-node decision map backed by a single JSON document. Exactly
/// one live decision per node. The whole read-compare-write sequence runs
/// under one lock because the HTTP read path reads concurrently.
pub struct DecisionStore {
    file_path: PathBuf,
    lock: Mutex<()>,
}

impl DecisionStore {
    pub fn new(file_path: impl Into<PathBuf>) -> Self {
        Self {
            file_path: file_path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn file_path(&self) -> &Path {
        &self.file_path
    }

    /// Reads the backing document. A missing file is empty state; a corrupt
    /// document is logged and treated as empty; any other I/O failure is
    /// surfaced to the caller.
    async fn read_map(&self) -> Result<BTreeMap<String, Decision>, StoreError> {
        match fs::read(&self.file_path).await {
            Ok(bytes) => match serde_json::from_slice(&bytes) {
                Ok(map) => Ok(map),
                Err(e) => {
                    warn!(
                        path = %self.file_path.display(),
                        error = %e,
                        "Decision store document is corrupt; treating as empty."
                    );
                    Ok(BTreeMap::new())
                }
            },
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    /// Writes through a sibling temp file and renames it into place so a
    /// crash mid-write cannot leave a truncated document.
    async fn write_map(&self, map: &BTreeMap<String, Decision>) -> Result<(), StoreError> {
        if let Some(parent) = self.file_path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let bytes = serde_json::to_vec_pretty(map)?;
        let tmp_path = self.file_path.with_extension("json.tmp");
        fs::write(&tmp_path, &bytes).await?;
        fs::rename(&tmp_path, &self.file_path).await?;
        Ok(())
    }

    /// Persists a decision for its node. An existing materially-equal
    /// decision only has its timestamp advanced; anything else replaces the
    /// stored entry wholesale. Unreadable state on this path degrades to
    /// empty so ingestion keeps going.
    pub async fn save(&self, decision: Decision) -> Result<SaveOutcome, StoreError> {
        let _guard = self.lock.lock().await;
        let mut map = match self.read_map().await {
            Ok(map) => map,
            Err(e) => {
                warn!(
                    path = %self.file_path.display(),
                    error = %e,
                    "Decision store unreadable; starting from an empty document."
                );
                BTreeMap::new()
            }
        };

        let outcome = match map.get_mut(&decision.node_id) {
            Some(existing) if existing.same_outcome(&decision) => {
                existing.timestamp = decision.timestamp;
                SaveOutcome::Refreshed
            }
            _ => {
                map.insert(decision.node_id.clone(), decision);
                SaveOutcome::Replaced
            }
        };

        self.write_map(&map).await?;
        Ok(outcome)
    }

    /// All live decisions, one per node. I/O failures propagate so the read
    /// API can surface them.
    pub async fn list(&self) -> Result<Vec<Decision>, StoreError> {
        let _guard = self.lock.lock().await;
        Ok(self.read_map().await?.into_values().collect())
    }

    /// Removes every stored decision, returning how many were cleared.
    pub async fn clear(&self) -> Result<usize, StoreError> {
        let _guard = self.lock.lock().await;
        let count = self.read_map().await.map(|m| m.len()).unwrap_or(0);
        self.write_map(&BTreeMap::new()).await?;
        Ok(count)
    }
}
