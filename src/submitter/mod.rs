use anyhow::Result;
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Mutex;

use crate::oracle::types::AgreedValue;

/// Push contract toward the external ledger-submission client.
///
/// The coordinator invokes `on_finalized` exactly once per finalized round.
/// Signing and posting are the collaborator's concern; the core only hands
/// over the already-agreed value.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LedgerSubmitter: Send + Sync {
    async fn on_finalized(&self, agreed: &AgreedValue) -> Result<()>;
}

/// Default submitter when no ledger client is wired in: logs the agreed
/// value and counts hand-offs.
#[derive(Debug, Default)]
pub struct LoggingLedgerSubmitter {
    submitted: AtomicU64,
}

impl LoggingLedgerSubmitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn submitted_count(&self) -> u64 {
        self.submitted.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl LedgerSubmitter for LoggingLedgerSubmitter {
    async fn on_finalized(&self, agreed: &AgreedValue) -> Result<()> {
        self.submitted.fetch_add(1, Ordering::Relaxed);
        tracing::info!(
            "📤 Agreed value ready for ledger: {}={:.4} {} (round {}, {} nodes, rate {:.2})",
            agreed.sensor_type,
            agreed.value,
            agreed.unit,
            agreed.round_id,
            agreed.contributing_nodes.len(),
            agreed.consensus_rate
        );
        Ok(())
    }
}

/// In-memory submitter fake for tests: records every hand-off.
#[derive(Debug, Default)]
pub struct RecordingLedgerSubmitter {
    received: Mutex<Vec<AgreedValue>>,
}

impl RecordingLedgerSubmitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn received(&self) -> Vec<AgreedValue> {
        self.received.lock().await.clone()
    }

    pub async fn count(&self) -> usize {
        self.received.lock().await.len()
    }
}

#[async_trait]
impl LedgerSubmitter for RecordingLedgerSubmitter {
    async fn on_finalized(&self, agreed: &AgreedValue) -> Result<()> {
        self.received.lock().await.push(agreed.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::collections::BTreeSet;
    use uuid::Uuid;

    fn agreed_value() -> AgreedValue {
        AgreedValue {
            sensor_type: "temperature".to_string(),
            value: 20.01,
            unit: "celsius".to_string(),
            round_id: Uuid::new_v4(),
            contributing_nodes: BTreeSet::from(["gateway_1".to_string()]),
            consensus_rate: 0.8,
            confidence: 0.97,
            finalized_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_logging_submitter_counts_handoffs() {
        let submitter = LoggingLedgerSubmitter::new();
        submitter.on_finalized(&agreed_value()).await.unwrap();
        submitter.on_finalized(&agreed_value()).await.unwrap();
        assert_eq!(submitter.submitted_count(), 2);
    }

    #[tokio::test]
    async fn test_recording_submitter_keeps_values() {
        let submitter = RecordingLedgerSubmitter::new();
        let agreed = agreed_value();
        submitter.on_finalized(&agreed).await.unwrap();

        let received = submitter.received().await;
        assert_eq!(received.len(), 1);
        assert_eq!(received[0], agreed);
    }
}
