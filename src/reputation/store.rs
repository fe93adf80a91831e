use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Mutex;
use thiserror::Error;

use super::ledger::ReputationRecord;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("reputation store I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("reputation store is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),
}

/// Optional persistence collaborator for reputation records.
///
/// The ledger itself is in-memory; a store only seeds it at startup and
/// receives snapshots afterwards. Implementations are injectable so tests
/// and deployments choose their own backend.
#[async_trait]
pub trait ReputationStore: Send + Sync {
    async fn load(&self) -> Result<Vec<ReputationRecord>, StoreError>;
    async fn save(&self, records: &[ReputationRecord]) -> Result<(), StoreError>;
}

/// In-memory store for tests and single-process deployments.
#[derive(Debug, Default)]
pub struct MemoryReputationStore {
    records: Mutex<Vec<ReputationRecord>>,
}

impl MemoryReputationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ReputationStore for MemoryReputationStore {
    async fn load(&self) -> Result<Vec<ReputationRecord>, StoreError> {
        Ok(self.records.lock().unwrap().clone())
    }

    async fn save(&self, records: &[ReputationRecord]) -> Result<(), StoreError> {
        *self.records.lock().unwrap() = records.to_vec();
        Ok(())
    }
}

/// JSON-file-backed store. A missing file is an empty ledger, not an error;
/// a corrupt file surfaces as `StoreError::Corrupt` so the caller can fall
/// back to cold-start defaults.
#[derive(Debug, Clone)]
pub struct JsonFileReputationStore {
    path: PathBuf,
}

impl JsonFileReputationStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl ReputationStore for JsonFileReputationStore {
    async fn load(&self) -> Result<Vec<ReputationRecord>, StoreError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn save(&self, records: &[ReputationRecord]) -> Result<(), StoreError> {
        let json = serde_json::to_vec_pretty(records)?;
        tokio::fs::write(&self.path, json).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn record(node_id: &str, score: f64) -> ReputationRecord {
        ReputationRecord {
            node_id: node_id.to_string(),
            score,
            successful_rounds: 3,
            flagged_rounds: 1,
            last_updated: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_memory_store_round_trip() {
        let store = MemoryReputationStore::new();
        store
            .save(&[record("gateway_1", 0.7), record("gateway_2", 0.4)])
            .await
            .unwrap();

        let loaded = store.load().await.unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].node_id, "gateway_1");
        assert_eq!(loaded[0].score, 0.7);
    }

    #[tokio::test]
    async fn test_json_file_round_trip() {
        let dir = std::env::temp_dir();
        let path = dir.join(format!("reputation-{}.json", uuid::Uuid::new_v4()));
        let store = JsonFileReputationStore::new(&path);

        store.save(&[record("gateway_1", 0.65)]).await.unwrap();
        let loaded = store.load().await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert!((loaded[0].score - 0.65).abs() < 1e-12);

        tokio::fs::remove_file(&path).await.unwrap();
    }

    #[tokio::test]
    async fn test_missing_file_is_empty_ledger() {
        let store = JsonFileReputationStore::new("/nonexistent/never-created.json");
        let loaded = store.load().await.unwrap();
        assert!(loaded.is_empty());
    }

    #[tokio::test]
    async fn test_corrupt_file_reported_as_corrupt() {
        let dir = std::env::temp_dir();
        let path = dir.join(format!("reputation-corrupt-{}.json", uuid::Uuid::new_v4()));
        tokio::fs::write(&path, b"{not json").await.unwrap();

        let store = JsonFileReputationStore::new(&path);
        let err = store.load().await.unwrap_err();
        assert!(matches!(err, StoreError::Corrupt(_)));

        tokio::fs::remove_file(&path).await.unwrap();
    }
}
