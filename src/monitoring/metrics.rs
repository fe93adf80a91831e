use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Process-wide consensus counters, shared across rounds and sensor types.
#[derive(Debug)]
pub struct OracleMetrics {
    submissions_accepted: AtomicU64,
    submissions_invalid: AtomicU64,
    submissions_rejected_closed: AtomicU64,
    rounds_opened: AtomicU64,
    rounds_finalized: AtomicU64,
    rounds_failed: AtomicU64,
    outliers_rejected: AtomicU64,
    values_submitted: AtomicU64,
    submit_errors: AtomicU64,
    start_time: Instant,
}

impl OracleMetrics {
    pub fn new() -> Self {
        Self {
            submissions_accepted: AtomicU64::new(0),
            submissions_invalid: AtomicU64::new(0),
            submissions_rejected_closed: AtomicU64::new(0),
            rounds_opened: AtomicU64::new(0),
            rounds_finalized: AtomicU64::new(0),
            rounds_failed: AtomicU64::new(0),
            outliers_rejected: AtomicU64::new(0),
            values_submitted: AtomicU64::new(0),
            submit_errors: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    pub fn increment_submissions_accepted(&self) {
        self.submissions_accepted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_submissions_invalid(&self) {
        self.submissions_invalid.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_submissions_rejected_closed(&self) {
        self.submissions_rejected_closed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_rounds_opened(&self) {
        self.rounds_opened.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_rounds_finalized(&self) {
        self.rounds_finalized.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_rounds_failed(&self) {
        self.rounds_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_outliers_rejected(&self, count: usize) {
        self.outliers_rejected.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn increment_values_submitted(&self) {
        self.values_submitted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_submit_errors(&self) {
        self.submit_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get_submissions_accepted(&self) -> u64 {
        self.submissions_accepted.load(Ordering::Relaxed)
    }

    pub fn get_submissions_invalid(&self) -> u64 {
        self.submissions_invalid.load(Ordering::Relaxed)
    }

    pub fn get_submissions_rejected_closed(&self) -> u64 {
        self.submissions_rejected_closed.load(Ordering::Relaxed)
    }

    pub fn get_rounds_opened(&self) -> u64 {
        self.rounds_opened.load(Ordering::Relaxed)
    }

    pub fn get_rounds_finalized(&self) -> u64 {
        self.rounds_finalized.load(Ordering::Relaxed)
    }

    pub fn get_rounds_failed(&self) -> u64 {
        self.rounds_failed.load(Ordering::Relaxed)
    }

    pub fn get_outliers_rejected(&self) -> u64 {
        self.outliers_rejected.load(Ordering::Relaxed)
    }

    pub fn get_values_submitted(&self) -> u64 {
        self.values_submitted.load(Ordering::Relaxed)
    }

    pub fn get_submit_errors(&self) -> u64 {
        self.submit_errors.load(Ordering::Relaxed)
    }

    pub fn get_uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Finalized over all terminal rounds; 0.0 before any round closes.
    pub fn success_rate(&self) -> f64 {
        let finalized = self.get_rounds_finalized();
        let terminal = finalized + self.get_rounds_failed();
        if terminal == 0 {
            0.0
        } else {
            finalized as f64 / terminal as f64
        }
    }

    pub fn snapshot(&self) -> HashMap<String, serde_json::Value> {
        let mut snapshot = HashMap::new();

        snapshot.insert(
            "submissions_accepted".to_string(),
            serde_json::json!(self.get_submissions_accepted()),
        );
        snapshot.insert(
            "submissions_invalid".to_string(),
            serde_json::json!(self.get_submissions_invalid()),
        );
        snapshot.insert(
            "submissions_rejected_closed".to_string(),
            serde_json::json!(self.get_submissions_rejected_closed()),
        );
        snapshot.insert(
            "rounds_opened".to_string(),
            serde_json::json!(self.get_rounds_opened()),
        );
        snapshot.insert(
            "rounds_finalized".to_string(),
            serde_json::json!(self.get_rounds_finalized()),
        );
        snapshot.insert(
            "rounds_failed".to_string(),
            serde_json::json!(self.get_rounds_failed()),
        );
        snapshot.insert(
            "outliers_rejected".to_string(),
            serde_json::json!(self.get_outliers_rejected()),
        );
        snapshot.insert(
            "values_submitted".to_string(),
            serde_json::json!(self.get_values_submitted()),
        );
        snapshot.insert(
            "submit_errors".to_string(),
            serde_json::json!(self.get_submit_errors()),
        );
        snapshot.insert(
            "success_rate".to_string(),
            serde_json::json!(self.success_rate()),
        );
        snapshot.insert(
            "uptime_secs".to_string(),
            serde_json::json!(self.get_uptime_secs()),
        );

        snapshot
    }

    pub fn print_report(&self) {
        tracing::info!(
            "
╔══════════════════════════════════════════════════════════════════════╗
║                    CONSENSUS ORACLE METRICS                          ║
╚══════════════════════════════════════════════════════════════════════╝

📊 Submissions:
   • Accepted:           {}
   • Rejected (invalid): {}
   • Rejected (closed):  {}

🗳️  Rounds:
   • Opened:             {}
   • Finalized:          {}
   • Failed:             {}
   • Outliers removed:   {}
   • Success rate:       {:.1}%

📤 Ledger hand-offs:
   • Submitted:          {}
   • Errors:             {}

🔧 Uptime: {} seconds
━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
",
            self.get_submissions_accepted(),
            self.get_submissions_invalid(),
            self.get_submissions_rejected_closed(),
            self.get_rounds_opened(),
            self.get_rounds_finalized(),
            self.get_rounds_failed(),
            self.get_outliers_rejected(),
            self.success_rate() * 100.0,
            self.get_values_submitted(),
            self.get_submit_errors(),
            self.get_uptime_secs(),
        );
    }
}

impl Default for OracleMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_start_at_zero() {
        let metrics = OracleMetrics::new();
        assert_eq!(metrics.get_submissions_accepted(), 0);
        assert_eq!(metrics.success_rate(), 0.0);
    }

    #[test]
    fn test_success_rate() {
        let metrics = OracleMetrics::new();
        metrics.increment_rounds_finalized();
        metrics.increment_rounds_finalized();
        metrics.increment_rounds_finalized();
        metrics.increment_rounds_failed();

        assert_eq!(metrics.success_rate(), 0.75);
    }

    #[test]
    fn test_snapshot_carries_counters() {
        let metrics = OracleMetrics::new();
        metrics.increment_submissions_accepted();
        metrics.add_outliers_rejected(3);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot["submissions_accepted"], serde_json::json!(1));
        assert_eq!(snapshot["outliers_rejected"], serde_json::json!(3));
    }
}
