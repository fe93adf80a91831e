use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use thiserror::Error;
use uuid::Uuid;

/// A single gateway reading, normalized and timestamped by the intake.
///
/// Immutable once recorded into a round; a later submission from the same
/// node replaces the earlier one wholesale rather than mutating it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Submission {
    pub node_id: String,
    pub sensor_type: String,
    pub value: f64,
    pub unit: String,
    pub measured_at: DateTime<Utc>,
    pub received_at: DateTime<Utc>,
}

/// The single agreed value produced by a finalized round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgreedValue {
    pub sensor_type: String,
    pub value: f64,
    pub unit: String,
    pub round_id: Uuid,
    pub contributing_nodes: BTreeSet<String>,
    /// Fraction of total participant weight that survived outlier filtering.
    pub consensus_rate: f64,
    /// Dispersion-based confidence in [0, 1]; 1.0 means perfect agreement.
    pub confidence: f64,
    pub finalized_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundState {
    /// Created, waiting for its first submission to be recorded.
    Open,
    /// Accepting submissions until deadline or early close.
    Collecting,
    /// No new submissions; filtering and aggregation in progress.
    Closing,
    Finalized,
    Failed,
}

impl RoundState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RoundState::Finalized | RoundState::Failed)
    }

    pub fn accepts_submissions(&self) -> bool {
        matches!(self, RoundState::Open | RoundState::Collecting)
    }
}

/// Terminal failure reason of a round. Not an error: callers receive it as
/// the round's recorded outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    InsufficientNodes,
    InsufficientWeight,
    BelowThreshold,
    /// Operator-forced abort; never produced by aggregation itself.
    Aborted,
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            FailureReason::InsufficientNodes => "insufficient_nodes",
            FailureReason::InsufficientWeight => "insufficient_weight",
            FailureReason::BelowThreshold => "below_threshold",
            FailureReason::Aborted => "aborted",
        };
        write!(f, "{}", name)
    }
}

/// Typed rejection returned to callers of `submit`.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SubmitError {
    #[error("invalid reading: {0}")]
    InvalidReading(String),
    #[error("no open round for sensor '{0}' and new rounds may not be opened")]
    NoOpenRound(String),
    #[error("round {0} no longer accepts submissions")]
    RoundClosed(Uuid),
}

/// Acknowledgement returned to callers on an accepted submission.
#[derive(Debug, Clone, Serialize)]
pub struct RoundHandle {
    pub round_id: Uuid,
    pub sensor_type: String,
    pub state: RoundState,
    /// Distinct nodes recorded in the round so far.
    pub submission_count: usize,
    pub deadline: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_predicates() {
        assert!(RoundState::Open.accepts_submissions());
        assert!(RoundState::Collecting.accepts_submissions());
        assert!(!RoundState::Closing.accepts_submissions());
        assert!(RoundState::Finalized.is_terminal());
        assert!(RoundState::Failed.is_terminal());
        assert!(!RoundState::Closing.is_terminal());
    }

    #[test]
    fn test_failure_reason_display() {
        assert_eq!(FailureReason::InsufficientNodes.to_string(), "insufficient_nodes");
        assert_eq!(FailureReason::BelowThreshold.to_string(), "below_threshold");
    }

    #[test]
    fn test_submit_error_messages_are_typed() {
        let err = SubmitError::InvalidReading("non-finite value".to_string());
        assert!(err.to_string().contains("non-finite"));

        let err = SubmitError::NoOpenRound("temperature".to_string());
        assert!(err.to_string().contains("temperature"));
    }
}
