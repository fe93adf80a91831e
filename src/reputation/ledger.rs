use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::core::clock::Clock;
use crate::core::config::ReputationConfig;

use super::store::ReputationStore;

/// Trust state of one gateway node. Mutated only by round finalization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReputationRecord {
    pub node_id: String,
    pub score: f64,
    pub successful_rounds: u64,
    pub flagged_rounds: u64,
    pub last_updated: DateTime<Utc>,
}

impl ReputationRecord {
    fn new(node_id: &str, score: f64, now: DateTime<Utc>) -> Self {
        Self {
            node_id: node_id.to_string(),
            score,
            successful_rounds: 0,
            flagged_rounds: 0,
            last_updated: now,
        }
    }
}

/// Process-wide trust scores, shared by every concurrently active round.
///
/// Entries sit behind their own lock under a briefly-held outer map lock, so
/// finalizations touching different nodes never serialize on each other and
/// unrelated sensor types never contend on a global write lock.
pub struct ReputationLedger {
    params: ReputationConfig,
    clock: Arc<dyn Clock>,
    entries: RwLock<HashMap<String, Arc<RwLock<ReputationRecord>>>>,
}

impl ReputationLedger {
    pub fn new(params: ReputationConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            params,
            clock,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Effective consensus weight for a node: its score, or 0.0 once the
    /// score falls under the minimum cutoff. Exclusion is a weighting
    /// decision only; the node stays a member and keeps submitting.
    pub async fn weight(&self, node_id: &str) -> f64 {
        let score = self.score(node_id).await;
        if score < self.params.min_weight_score {
            0.0
        } else {
            score
        }
    }

    /// Current raw score; unseen nodes get the neutral cold-start default.
    pub async fn score(&self, node_id: &str) -> f64 {
        let entries = self.entries.read().await;
        match entries.get(node_id) {
            Some(entry) => entry.read().await.score,
            None => self.params.default_score,
        }
    }

    /// EMA update from a round outcome: `score' = score*(1-α) + outcome*α`.
    /// With α < 1 a single round can never slam a score to exactly 0 or 1.
    pub async fn record_outcome(&self, node_id: &str, agreed: bool) -> f64 {
        let entry = self.entry(node_id).await;
        let mut record = entry.write().await;

        let outcome = if agreed { 1.0 } else { 0.0 };
        let previous = record.score;
        record.score =
            (previous * (1.0 - self.params.alpha) + outcome * self.params.alpha).clamp(0.0, 1.0);
        if agreed {
            record.successful_rounds += 1;
        } else {
            record.flagged_rounds += 1;
        }
        record.last_updated = self.clock.now();

        tracing::debug!(
            "📈 Reputation {}: {:.3} -> {:.3} ({})",
            node_id,
            previous,
            record.score,
            if agreed { "agreed" } else { "disagreed" }
        );

        record.score
    }

    async fn entry(&self, node_id: &str) -> Arc<RwLock<ReputationRecord>> {
        {
            let entries = self.entries.read().await;
            if let Some(entry) = entries.get(node_id) {
                return entry.clone();
            }
        }

        let mut entries = self.entries.write().await;
        entries
            .entry(node_id.to_string())
            .or_insert_with(|| {
                tracing::info!(
                    "🆕 New node {} starts at reputation {:.2}",
                    node_id,
                    self.params.default_score
                );
                Arc::new(RwLock::new(ReputationRecord::new(
                    node_id,
                    self.params.default_score,
                    self.clock.now(),
                )))
            })
            .clone()
    }

    pub async fn get_record(&self, node_id: &str) -> Option<ReputationRecord> {
        let entries = self.entries.read().await;
        match entries.get(node_id) {
            Some(entry) => Some(entry.read().await.clone()),
            None => None,
        }
    }

    pub async fn node_count(&self) -> usize {
        self.entries.read().await.len()
    }

    /// All records, sorted by node_id for stable output.
    pub async fn snapshot(&self) -> Vec<ReputationRecord> {
        let entries = self.entries.read().await;
        let mut records = Vec::with_capacity(entries.len());
        for entry in entries.values() {
            records.push(entry.read().await.clone());
        }
        drop(entries);

        records.sort_by(|a, b| a.node_id.cmp(&b.node_id));
        records
    }

    pub async fn report(&self) -> ReputationReport {
        let records = self.snapshot().await;

        let mut report = ReputationReport {
            total_nodes: records.len(),
            average_score: 0.0,
            trusted_nodes: Vec::new(),
            suspicious_nodes: Vec::new(),
            distribution: ScoreDistribution::default(),
        };

        if records.is_empty() {
            return report;
        }

        let mut sum = 0.0;
        for record in &records {
            sum += record.score;
            if record.score >= self.params.trusted_threshold {
                report.trusted_nodes.push(record.node_id.clone());
            }
            if record.score <= self.params.suspicious_threshold {
                report.suspicious_nodes.push(record.node_id.clone());
            }
            report.distribution.bucket_mut(record.score);
        }
        report.average_score = sum / records.len() as f64;

        if !report.suspicious_nodes.is_empty() {
            tracing::warn!(
                "🚨 {} node(s) under the suspicion threshold",
                report.suspicious_nodes.len()
            );
        }

        report
    }

    /// Seeds the ledger from persisted records, clamping scores defensively.
    /// Unreadable stores degrade to cold-start defaults with a warning; the
    /// core keeps running either way.
    pub async fn load_from(&self, store: &dyn ReputationStore) -> usize {
        match store.load().await {
            Ok(records) => {
                let count = records.len();
                let mut entries = self.entries.write().await;
                for mut record in records {
                    record.score = record.score.clamp(0.0, 1.0);
                    entries.insert(
                        record.node_id.clone(),
                        Arc::new(RwLock::new(record)),
                    );
                }
                tracing::info!("📂 Loaded {} reputation record(s)", count);
                count
            }
            Err(e) => {
                tracing::warn!(
                    "⚠️ Reputation store unreadable ({}); starting from cold-start defaults",
                    e
                );
                0
            }
        }
    }

    pub async fn persist_to(
        &self,
        store: &dyn ReputationStore,
    ) -> Result<(), super::store::StoreError> {
        let records = self.snapshot().await;
        store.save(&records).await?;
        tracing::debug!("💾 Persisted {} reputation record(s)", records.len());
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ReputationReport {
    pub total_nodes: usize,
    pub average_score: f64,
    pub trusted_nodes: Vec<String>,
    pub suspicious_nodes: Vec<String>,
    pub distribution: ScoreDistribution,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ScoreDistribution {
    pub excellent: usize,
    pub good: usize,
    pub average: usize,
    pub poor: usize,
    pub very_poor: usize,
}

impl ScoreDistribution {
    fn bucket_mut(&mut self, score: f64) {
        if score >= 0.9 {
            self.excellent += 1;
        } else if score >= 0.7 {
            self.good += 1;
        } else if score >= 0.5 {
            self.average += 1;
        } else if score >= 0.3 {
            self.poor += 1;
        } else {
            self.very_poor += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::clock::SystemClock;
    use crate::reputation::store::MemoryReputationStore;

    fn test_ledger() -> ReputationLedger {
        ReputationLedger::new(ReputationConfig::default(), Arc::new(SystemClock))
    }

    #[tokio::test]
    async fn test_unseen_node_gets_neutral_weight() {
        let ledger = test_ledger();
        assert_eq!(ledger.weight("gateway_new").await, 0.5);
        assert_eq!(ledger.node_count().await, 0);
    }

    #[tokio::test]
    async fn test_ema_moves_gradually() {
        let ledger = test_ledger();

        let score = ledger.record_outcome("gateway_1", true).await;
        assert!((score - 0.55).abs() < 1e-9);

        let score = ledger.record_outcome("gateway_1", false).await;
        assert!((score - 0.495).abs() < 1e-9);

        let record = ledger.get_record("gateway_1").await.unwrap();
        assert_eq!(record.successful_rounds, 1);
        assert_eq!(record.flagged_rounds, 1);
    }

    #[tokio::test]
    async fn test_score_stays_clamped_under_repetition() {
        let ledger = test_ledger();

        for _ in 0..500 {
            let score = ledger.record_outcome("gateway_liar", false).await;
            assert!((0.0..=1.0).contains(&score));
        }
        // Converges toward 0 but a single round never reaches it exactly.
        assert!(ledger.score("gateway_liar").await < 0.01);

        for _ in 0..500 {
            let score = ledger.record_outcome("gateway_saint", true).await;
            assert!((0.0..=1.0).contains(&score));
        }
        assert!(ledger.score("gateway_saint").await > 0.99);
    }

    #[tokio::test]
    async fn test_low_score_yields_zero_weight_but_keeps_membership() {
        let ledger = test_ledger();

        for _ in 0..30 {
            ledger.record_outcome("gateway_bad", false).await;
        }

        assert_eq!(ledger.weight("gateway_bad").await, 0.0);
        // Still on the roster with a real (nonzero-history) record.
        let record = ledger.get_record("gateway_bad").await.unwrap();
        assert_eq!(record.flagged_rounds, 30);
        assert!(record.score > 0.0);
    }

    #[tokio::test]
    async fn test_larger_alpha_converges_faster() {
        let slow = test_ledger();
        let fast = ReputationLedger::new(
            ReputationConfig {
                alpha: 0.5,
                ..ReputationConfig::default()
            },
            Arc::new(SystemClock),
        );

        for _ in 0..5 {
            slow.record_outcome("gateway_1", true).await;
            fast.record_outcome("gateway_1", true).await;
        }

        assert!(fast.score("gateway_1").await > slow.score("gateway_1").await);
    }

    #[tokio::test]
    async fn test_report_buckets_and_thresholds() {
        let ledger = test_ledger();

        for _ in 0..20 {
            ledger.record_outcome("gateway_good", true).await;
        }
        for _ in 0..20 {
            ledger.record_outcome("gateway_bad", false).await;
        }

        let report = ledger.report().await;
        assert_eq!(report.total_nodes, 2);
        assert_eq!(report.trusted_nodes, vec!["gateway_good".to_string()]);
        assert_eq!(report.suspicious_nodes, vec!["gateway_bad".to_string()]);
        assert_eq!(report.distribution.excellent, 1);
        assert_eq!(report.distribution.very_poor, 1);
    }

    #[tokio::test]
    async fn test_round_trip_through_store() {
        let ledger = test_ledger();
        ledger.record_outcome("gateway_1", true).await;
        ledger.record_outcome("gateway_2", false).await;

        let store = MemoryReputationStore::new();
        ledger.persist_to(&store).await.unwrap();

        let restored = test_ledger();
        assert_eq!(restored.load_from(&store).await, 2);
        assert_eq!(
            restored.score("gateway_1").await,
            ledger.score("gateway_1").await
        );
    }

    #[test]
    fn test_weight_from_sync_context() {
        // Callers embedded in sync code paths drive the ledger via block_on.
        let ledger = test_ledger();
        let weight = tokio_test::block_on(ledger.weight("gateway_1"));
        assert_eq!(weight, 0.5);
    }
}
