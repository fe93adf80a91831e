use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::core::config::OracleConfig;

use super::types::{AgreedValue, FailureReason, RoundState, SubmitError, Submission};

/// A bounded collection window for one sensor measurement.
///
/// Owned exclusively by the round coordinator behind a per-round mutex;
/// submission upserts and state transitions never interleave.
#[derive(Debug)]
pub struct Round {
    pub round_id: Uuid,
    pub sensor_type: String,
    pub unit: String,
    pub opened_at: DateTime<Utc>,
    pub deadline: DateTime<Utc>,
    pub min_nodes: usize,
    pub consensus_threshold: f64,
    pub outlier_tolerance: f64,
    state: RoundState,
    submissions: Vec<Submission>,
    result: Option<AgreedValue>,
    failure: Option<FailureReason>,
}

impl Round {
    pub fn open(
        sensor_type: &str,
        unit: &str,
        opened_at: DateTime<Utc>,
        config: &OracleConfig,
    ) -> Self {
        Self {
            round_id: Uuid::new_v4(),
            sensor_type: sensor_type.to_string(),
            unit: unit.to_string(),
            opened_at,
            deadline: opened_at + Duration::seconds(config.collection_window_secs as i64),
            min_nodes: config.min_nodes,
            consensus_threshold: config.consensus_threshold,
            outlier_tolerance: config.outlier_tolerance,
            state: RoundState::Open,
            submissions: Vec::new(),
            result: None,
            failure: None,
        }
    }

    pub fn state(&self) -> RoundState {
        self.state
    }

    pub fn submissions(&self) -> &[Submission] {
        &self.submissions
    }

    /// Distinct nodes recorded so far. Equal to the submission count because
    /// upserts replace by node_id.
    pub fn distinct_nodes(&self) -> usize {
        self.submissions.len()
    }

    pub fn result(&self) -> Option<&AgreedValue> {
        self.result.as_ref()
    }

    pub fn failure(&self) -> Option<FailureReason> {
        self.failure
    }

    /// Records a submission, replacing any earlier one from the same node.
    /// Returns the distinct node count after the upsert.
    pub fn upsert_submission(&mut self, submission: Submission) -> Result<usize, SubmitError> {
        debug_assert_eq!(submission.sensor_type, self.sensor_type);

        match self.state {
            RoundState::Open => self.state = RoundState::Collecting,
            RoundState::Collecting => {}
            _ => return Err(SubmitError::RoundClosed(self.round_id)),
        }

        if let Some(existing) = self
            .submissions
            .iter_mut()
            .find(|s| s.node_id == submission.node_id)
        {
            *existing = submission;
        } else {
            self.submissions.push(submission);
        }

        Ok(self.submissions.len())
    }

    /// Whether the deadline sweep should close this round.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.state.accepts_submissions() && now >= self.deadline
    }

    /// `collecting → closing`. Returns false if the round already left the
    /// collecting phase, so racing close triggers resolve to one closer.
    pub fn begin_closing(&mut self) -> bool {
        if self.state.accepts_submissions() {
            self.state = RoundState::Closing;
            true
        } else {
            false
        }
    }

    /// `closing → finalized`, recording the agreed value.
    pub fn finalize(&mut self, agreed: AgreedValue) {
        debug_assert_eq!(self.state, RoundState::Closing);
        self.state = RoundState::Finalized;
        self.result = Some(agreed);
    }

    /// Any non-terminal state → `failed`. Returns false on a terminal round
    /// (terminal rounds are never reopened or re-failed).
    pub fn fail(&mut self, reason: FailureReason) -> bool {
        if self.state.is_terminal() {
            return false;
        }
        self.state = RoundState::Failed;
        self.failure = Some(reason);
        true
    }

    pub fn summary(&self) -> RoundSummary {
        RoundSummary {
            round_id: self.round_id,
            sensor_type: self.sensor_type.clone(),
            state: self.state,
            submission_count: self.submissions.len(),
            result: self.result.clone(),
            failure: self.failure,
            opened_at: self.opened_at,
            deadline: self.deadline,
        }
    }
}

/// Immutable view of a round, kept in the terminal history and returned from
/// the statistics queries.
#[derive(Debug, Clone, Serialize)]
pub struct RoundSummary {
    pub round_id: Uuid,
    pub sensor_type: String,
    pub state: RoundState,
    pub submission_count: usize,
    pub result: Option<AgreedValue>,
    pub failure: Option<FailureReason>,
    pub opened_at: DateTime<Utc>,
    pub deadline: DateTime<Utc>,
}
