use serde::Serialize;
use std::collections::HashMap;

use super::outlier::MIN_FILTER_SAMPLE;
use super::types::{FailureReason, Submission};

/// Outcome of a successful aggregation.
#[derive(Debug, Clone, Serialize)]
pub struct AggregateResult {
    /// Reputation-weighted average of the kept submission values.
    pub value: f64,
    /// Kept weight over total participant weight.
    pub consensus_rate: f64,
    /// Dispersion-based confidence in [0, 1].
    pub confidence: f64,
}

/// Combines filtered submissions into one agreed value, or reports why the
/// round cannot reach consensus.
#[derive(Debug, Clone)]
pub struct ConsensusAggregator {
    min_nodes: usize,
    consensus_threshold: f64,
}

impl ConsensusAggregator {
    pub fn new(min_nodes: usize, consensus_threshold: f64) -> Self {
        Self {
            min_nodes,
            consensus_threshold,
        }
    }

    /// `participant_weights` must cover every node that submitted to the
    /// round, kept or rejected, with its effective weight (0.0 for nodes
    /// under the minimum reputation cutoff).
    pub fn aggregate(
        &self,
        kept: &[Submission],
        participant_weights: &HashMap<String, f64>,
        filter_applied: bool,
    ) -> Result<AggregateResult, FailureReason> {
        // An unfiltered set (fewer than 3 submissions) has no statistical
        // backing; agreement among 1-2 nodes is never reported as consensus.
        let quorum = if filter_applied {
            self.min_nodes
        } else {
            self.min_nodes.max(MIN_FILTER_SAMPLE)
        };

        if kept.len() < quorum {
            return Err(FailureReason::InsufficientNodes);
        }

        let weight_of = |submission: &Submission| -> f64 {
            participant_weights
                .get(&submission.node_id)
                .copied()
                .unwrap_or(0.0)
        };

        let kept_weight: f64 = kept.iter().map(weight_of).sum();
        if kept_weight <= 0.0 {
            return Err(FailureReason::InsufficientWeight);
        }

        let total_weight: f64 = participant_weights.values().sum();
        let consensus_rate = kept_weight / total_weight;
        if consensus_rate < self.consensus_threshold {
            return Err(FailureReason::BelowThreshold);
        }

        let weighted_sum: f64 = kept.iter().map(|s| weight_of(s) * s.value).sum();
        let value = weighted_sum / kept_weight;

        let values: Vec<f64> = kept.iter().map(|s| s.value).collect();

        Ok(AggregateResult {
            value,
            consensus_rate,
            confidence: confidence_score(&values),
        })
    }
}

/// Confidence from the coefficient of variation of the kept values: tight
/// agreement scores near 1.0, wide dispersion decays toward 0.0.
fn confidence_score(values: &[f64]) -> f64 {
    if values.len() <= 1 {
        return 1.0;
    }

    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);

    if mean == 0.0 {
        return 1.0;
    }

    let cv = variance.sqrt() / mean.abs();
    (1.0 - cv).clamp(0.0, 1.0)
}
