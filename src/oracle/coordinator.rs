use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

use crate::core::clock::Clock;
use crate::core::config::OracleConfig;
use crate::monitoring::OracleMetrics;
use crate::reputation::ReputationLedger;
use crate::submitter::LedgerSubmitter;

use super::aggregator::ConsensusAggregator;
use super::outlier::{filter_outliers, relative_deviation};
use super::round::{Round, RoundSummary};
use super::types::{
    AgreedValue, FailureReason, RoundHandle, RoundState, SubmitError, Submission,
};

/// Read-only consensus statistics for the metrics/health collaborator.
#[derive(Debug, Clone, Serialize)]
pub struct ConsensusStatus {
    pub active_rounds: usize,
    pub finalized_rounds: u64,
    pub failed_rounds: u64,
    pub success_rate: f64,
    pub last_finalized_at: Option<DateTime<Utc>>,
    pub accepting: bool,
}

/// Drives round lifecycles: opens rounds on first submission, closes them on
/// deadline or early-close, runs filter + aggregation, feeds outcomes back
/// into the reputation ledger, and hands finalized values to the submitter.
///
/// One open round per sensor type at a time. Each round sits behind its own
/// mutex; the outer table lock is held only for lookup and insert, so work
/// on one sensor never blocks another.
pub struct RoundCoordinator {
    config: OracleConfig,
    clock: Arc<dyn Clock>,
    ledger: Arc<ReputationLedger>,
    submitter: Arc<dyn LedgerSubmitter>,
    metrics: Arc<OracleMetrics>,
    rounds: RwLock<HashMap<String, Arc<Mutex<Round>>>>,
    history: RwLock<VecDeque<RoundSummary>>,
    accepting: AtomicBool,
    last_finalized_at: RwLock<Option<DateTime<Utc>>>,
}

impl RoundCoordinator {
    pub fn new(
        config: OracleConfig,
        clock: Arc<dyn Clock>,
        ledger: Arc<ReputationLedger>,
        submitter: Arc<dyn LedgerSubmitter>,
        metrics: Arc<OracleMetrics>,
    ) -> Self {
        Self {
            config,
            clock,
            ledger,
            submitter,
            metrics,
            rounds: RwLock::new(HashMap::new()),
            history: RwLock::new(VecDeque::new()),
            accepting: AtomicBool::new(true),
            last_finalized_at: RwLock::new(None),
        }
    }

    /// Records a validated submission into the open round for its sensor
    /// type, opening one if permitted. Returns the round acknowledgement.
    pub async fn place(&self, submission: Submission) -> Result<RoundHandle, SubmitError> {
        let sensor_type = submission.sensor_type.clone();
        let round_arc = self.open_round_for(&sensor_type, &submission.unit).await?;

        let (handle, early_close) = {
            let mut round = round_arc.lock().await;
            let node_id = submission.node_id.clone();
            let count = round.upsert_submission(submission)?;

            tracing::debug!(
                "📥 Submission recorded: round={} node={} ({}/{} nodes)",
                round.round_id,
                node_id,
                count,
                round.min_nodes
            );

            let early = self.config.early_close_enabled
                && round.state() == RoundState::Collecting
                && count >= round.min_nodes;

            (
                RoundHandle {
                    round_id: round.round_id,
                    sensor_type: round.sensor_type.clone(),
                    state: round.state(),
                    submission_count: count,
                    deadline: round.deadline,
                },
                early,
            )
        };

        if early_close {
            tracing::info!(
                "⏩ Early close: round {} reached {} participant(s)",
                handle.round_id,
                handle.submission_count
            );
            self.resolve_round(&sensor_type, &round_arc).await;
        }

        Ok(handle)
    }

    async fn open_round_for(
        &self,
        sensor_type: &str,
        unit: &str,
    ) -> Result<Arc<Mutex<Round>>, SubmitError> {
        {
            let rounds = self.rounds.read().await;
            if let Some(existing) = rounds.get(sensor_type) {
                return Ok(existing.clone());
            }
        }

        if !self.accepting.load(Ordering::SeqCst) {
            return Err(SubmitError::NoOpenRound(sensor_type.to_string()));
        }

        let mut rounds = self.rounds.write().await;
        let round_arc = rounds
            .entry(sensor_type.to_string())
            .or_insert_with(|| {
                let round = Round::open(sensor_type, unit, self.clock.now(), &self.config);
                self.metrics.increment_rounds_opened();
                tracing::info!(
                    "🗳️ Round {} opened for '{}' (deadline {})",
                    round.round_id,
                    sensor_type,
                    round.deadline
                );
                Arc::new(Mutex::new(round))
            })
            .clone();

        Ok(round_arc)
    }

    /// Timer-driven deadline check. Invoked by the spawned sweeper task in
    /// production and directly (with a manual clock) in tests. Returns the
    /// number of rounds taken to a terminal state.
    pub async fn sweep(&self) -> usize {
        let now = self.clock.now();
        let snapshot: Vec<(String, Arc<Mutex<Round>>)> = {
            let rounds = self.rounds.read().await;
            rounds
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect()
        };

        let mut closed = 0;
        for (sensor_type, round_arc) in snapshot {
            let due = { round_arc.lock().await.is_due(now) };
            if due {
                self.resolve_round(&sensor_type, &round_arc).await;
                closed += 1;
            }
        }

        closed
    }

    /// Runs the closing pipeline: outlier filter, weighted aggregation,
    /// reputation feedback, exactly-once submitter hand-off.
    async fn resolve_round(&self, sensor_type: &str, round_arc: &Arc<Mutex<Round>>) {
        let mut round = round_arc.lock().await;
        if !round.begin_closing() {
            // Lost the race against another close trigger; nothing to do.
            return;
        }

        let round_id = round.round_id;
        let tolerance = round.outlier_tolerance;
        let submissions = round.submissions().to_vec();
        tracing::info!(
            "🔒 Round {} closing with {} submission(s)",
            round_id,
            submissions.len()
        );

        let verdict = filter_outliers(submissions.clone(), tolerance);
        self.metrics.add_outliers_rejected(verdict.rejected.len());

        let mut weights = HashMap::with_capacity(submissions.len());
        for submission in &submissions {
            let weight = self.ledger.weight(&submission.node_id).await;
            weights.insert(submission.node_id.clone(), weight);
        }

        let aggregator = ConsensusAggregator::new(round.min_nodes, round.consensus_threshold);
        match aggregator.aggregate(&verdict.kept, &weights, verdict.filter_applied) {
            Ok(result) => {
                let agreed = AgreedValue {
                    sensor_type: round.sensor_type.clone(),
                    value: result.value,
                    unit: round.unit.clone(),
                    round_id,
                    contributing_nodes: verdict
                        .kept
                        .iter()
                        .map(|s| s.node_id.clone())
                        .collect::<BTreeSet<_>>(),
                    consensus_rate: result.consensus_rate,
                    confidence: result.confidence,
                    finalized_at: self.clock.now(),
                };
                round.finalize(agreed.clone());
                drop(round);

                // Finalization is the only place reputation moves: every
                // submitter is scored against the agreed value, kept or not.
                for submission in &submissions {
                    let agreed_match =
                        relative_deviation(submission.value, agreed.value) <= tolerance;
                    self.ledger
                        .record_outcome(&submission.node_id, agreed_match)
                        .await;
                }

                self.metrics.increment_rounds_finalized();
                *self.last_finalized_at.write().await = Some(agreed.finalized_at);
                self.retire_round(sensor_type, round_arc).await;

                tracing::info!(
                    "✅ Round {} finalized: {}={:.4} {} (rate {:.2}, confidence {:.2}, {} nodes)",
                    round_id,
                    agreed.sensor_type,
                    agreed.value,
                    agreed.unit,
                    agreed.consensus_rate,
                    agreed.confidence,
                    agreed.contributing_nodes.len()
                );

                match self.submitter.on_finalized(&agreed).await {
                    Ok(()) => self.metrics.increment_values_submitted(),
                    Err(e) => {
                        self.metrics.increment_submit_errors();
                        tracing::error!(
                            "❌ Ledger submitter failed for round {}: {:#}",
                            round_id,
                            e
                        );
                    }
                }
            }
            Err(reason) => {
                round.fail(reason);
                drop(round);

                // A failed round reflects insufficient data, not dishonesty:
                // no reputation change for any participant.
                self.metrics.increment_rounds_failed();
                self.retire_round(sensor_type, round_arc).await;

                tracing::warn!(
                    "⚠️ Round {} failed: {} ({} submission(s), {} outlier(s))",
                    round_id,
                    reason,
                    submissions.len(),
                    verdict.rejected.len()
                );
            }
        }
    }

    async fn retire_round(&self, sensor_type: &str, round_arc: &Arc<Mutex<Round>>) {
        {
            let mut rounds = self.rounds.write().await;
            if let Some(current) = rounds.get(sensor_type) {
                if Arc::ptr_eq(current, round_arc) {
                    rounds.remove(sensor_type);
                }
            }
        }

        let summary = round_arc.lock().await.summary();
        let mut history = self.history.write().await;
        history.push_back(summary);
        while history.len() > self.config.round_history_limit {
            history.pop_front();
        }
    }

    /// Operator control: force-fail the open round for a sensor type. No
    /// AgreedValue is produced and no reputation changes.
    pub async fn abort_round(&self, sensor_type: &str) -> bool {
        let round_arc = {
            let rounds = self.rounds.read().await;
            rounds.get(sensor_type).cloned()
        };
        let Some(round_arc) = round_arc else {
            return false;
        };

        let aborted = {
            let mut round = round_arc.lock().await;
            let aborted = round.fail(FailureReason::Aborted);
            if aborted {
                tracing::warn!("🛑 Round {} aborted by operator", round.round_id);
            }
            aborted
        };

        if aborted {
            self.metrics.increment_rounds_failed();
            self.retire_round(sensor_type, &round_arc).await;
        }
        aborted
    }

    /// Stop opening new rounds. Rounds already collecting keep running to
    /// their deadline; fresh sensor types get `NoOpenRound`.
    pub fn pause_intake(&self) {
        self.accepting.store(false, Ordering::SeqCst);
        tracing::warn!("⏸️ Intake paused - no new rounds will be opened");
    }

    pub fn resume_intake(&self) {
        self.accepting.store(true, Ordering::SeqCst);
        tracing::info!("▶️ Intake resumed - rounds may be opened again");
    }

    pub fn is_accepting(&self) -> bool {
        self.accepting.load(Ordering::SeqCst)
    }

    /// Spawns the periodic sweeper driving deadline expiry.
    pub fn spawn_sweeper(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let coordinator = Arc::clone(self);
        let interval_secs = coordinator.config.sweep_interval_secs;

        tokio::spawn(async move {
            let mut interval =
                tokio::time::interval(tokio::time::Duration::from_secs(interval_secs));

            loop {
                interval.tick().await;
                let closed = coordinator.sweep().await;
                if closed > 0 {
                    tracing::debug!("🧹 Sweep closed {} round(s)", closed);
                }
            }
        })
    }

    pub async fn consensus_status(&self) -> ConsensusStatus {
        ConsensusStatus {
            active_rounds: self.rounds.read().await.len(),
            finalized_rounds: self.metrics.get_rounds_finalized(),
            failed_rounds: self.metrics.get_rounds_failed(),
            success_rate: self.metrics.success_rate(),
            last_finalized_at: *self.last_finalized_at.read().await,
            accepting: self.is_accepting(),
        }
    }

    pub async fn active_round(&self, sensor_type: &str) -> Option<RoundSummary> {
        let round_arc = {
            let rounds = self.rounds.read().await;
            rounds.get(sensor_type).cloned()
        };
        match round_arc {
            Some(round_arc) => Some(round_arc.lock().await.summary()),
            None => None,
        }
    }

    /// Terminal rounds, most recent first.
    pub async fn recent_rounds(&self, limit: usize) -> Vec<RoundSummary> {
        let history = self.history.read().await;
        history.iter().rev().take(limit).cloned().collect()
    }
}
