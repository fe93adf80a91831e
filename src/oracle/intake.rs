use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;

use crate::core::clock::Clock;
use crate::core::config::OracleConfig;
use crate::monitoring::OracleMetrics;

use super::coordinator::RoundCoordinator;
use super::types::{RoundHandle, SubmitError, Submission};

/// Validation profile for one sensor type: the unit adapters must report in
/// and the physically plausible value range.
#[derive(Debug, Clone)]
pub struct SensorProfile {
    pub sensor_type: String,
    pub unit: String,
    pub min_value: f64,
    pub max_value: f64,
}

impl SensorProfile {
    pub fn new(sensor_type: &str, unit: &str, min_value: f64, max_value: f64) -> Self {
        Self {
            sensor_type: sensor_type.to_string(),
            unit: unit.to_string(),
            min_value,
            max_value,
        }
    }

    fn default_profiles() -> Vec<SensorProfile> {
        vec![
            SensorProfile::new("temperature", "celsius", -50.0, 100.0),
            SensorProfile::new("humidity", "percent", 0.0, 100.0),
            SensorProfile::new("gps_altitude", "meters", -500.0, 9000.0),
        ]
    }
}

/// Entry point for gateway submissions.
///
/// Adapters have already authenticated and protocol-decoded the reading;
/// the intake checks it makes sense (finite, right unit, plausible value,
/// fresh timestamp), stamps `received_at`, and records it into the open
/// round for its sensor type.
pub struct ReadingIntake {
    coordinator: Arc<RoundCoordinator>,
    clock: Arc<dyn Clock>,
    metrics: Arc<OracleMetrics>,
    profiles: HashMap<String, SensorProfile>,
    max_reading_age: Duration,
    max_clock_skew: Duration,
}

impl ReadingIntake {
    pub fn new(
        config: &OracleConfig,
        coordinator: Arc<RoundCoordinator>,
        clock: Arc<dyn Clock>,
        metrics: Arc<OracleMetrics>,
    ) -> Self {
        let mut intake = Self {
            coordinator,
            clock,
            metrics,
            profiles: HashMap::new(),
            max_reading_age: Duration::seconds(config.max_reading_age_secs),
            max_clock_skew: Duration::seconds(config.max_clock_skew_secs),
        };
        for profile in SensorProfile::default_profiles() {
            intake.register_profile(profile);
        }
        intake
    }

    /// Registers (or replaces) a sensor profile. Called at startup before
    /// adapters begin pushing readings.
    pub fn register_profile(&mut self, profile: SensorProfile) {
        self.profiles.insert(profile.sensor_type.clone(), profile);
    }

    pub async fn submit(
        &self,
        node_id: &str,
        sensor_type: &str,
        value: f64,
        unit: &str,
        measured_at: DateTime<Utc>,
    ) -> Result<RoundHandle, SubmitError> {
        let received_at = self.clock.now();

        if let Err(reason) = self.validate(node_id, sensor_type, value, unit, measured_at) {
            self.metrics.increment_submissions_invalid();
            tracing::warn!(
                "⚠️ Invalid reading from {}: {} (sensor={}, value={})",
                node_id,
                reason,
                sensor_type,
                value
            );
            return Err(SubmitError::InvalidReading(reason));
        }

        let submission = Submission {
            node_id: node_id.to_string(),
            sensor_type: sensor_type.to_string(),
            value,
            unit: unit.to_ascii_lowercase(),
            measured_at,
            received_at,
        };

        let result = self.coordinator.place(submission).await;
        match &result {
            Ok(handle) => {
                self.metrics.increment_submissions_accepted();
                tracing::debug!(
                    "📊 {}: {} {} from {} (round {})",
                    sensor_type,
                    value,
                    unit,
                    node_id,
                    handle.round_id
                );
            }
            Err(_) => {
                self.metrics.increment_submissions_rejected_closed();
            }
        }

        result
    }

    fn validate(
        &self,
        node_id: &str,
        sensor_type: &str,
        value: f64,
        unit: &str,
        measured_at: DateTime<Utc>,
    ) -> Result<(), String> {
        if node_id.is_empty() {
            return Err("empty node id".to_string());
        }

        if !value.is_finite() {
            return Err("non-finite value".to_string());
        }

        let profile = self
            .profiles
            .get(sensor_type)
            .ok_or_else(|| format!("unknown sensor type '{}'", sensor_type))?;

        if !unit.eq_ignore_ascii_case(&profile.unit) {
            return Err(format!(
                "unit '{}' does not match expected '{}' for {}",
                unit, profile.unit, sensor_type
            ));
        }

        if value < profile.min_value || value > profile.max_value {
            return Err(format!(
                "value {} outside plausible range [{}, {}]",
                value, profile.min_value, profile.max_value
            ));
        }

        let now = self.clock.now();
        if measured_at < now - self.max_reading_age {
            return Err(format!(
                "stale reading: measured {}s ago",
                (now - measured_at).num_seconds()
            ));
        }
        if measured_at > now + self.max_clock_skew {
            return Err("reading timestamped in the future".to_string());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::clock::ManualClock;
    use crate::core::config::ReputationConfig;
    use crate::reputation::ReputationLedger;
    use crate::submitter::RecordingLedgerSubmitter;

    fn intake_with_clock() -> (ReadingIntake, Arc<ManualClock>) {
        let config = OracleConfig::default();
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let metrics = Arc::new(OracleMetrics::new());
        let ledger = Arc::new(ReputationLedger::new(
            ReputationConfig::default(),
            clock.clone(),
        ));
        let coordinator = Arc::new(RoundCoordinator::new(
            config.clone(),
            clock.clone(),
            ledger,
            Arc::new(RecordingLedgerSubmitter::new()),
            metrics.clone(),
        ));
        (
            ReadingIntake::new(&config, coordinator, clock.clone(), metrics),
            clock,
        )
    }

    #[tokio::test]
    async fn test_valid_reading_accepted() {
        let (intake, clock) = intake_with_clock();

        let handle = intake
            .submit("gateway_1", "temperature", 21.5, "celsius", clock.now())
            .await
            .unwrap();
        assert_eq!(handle.submission_count, 1);
        assert_eq!(handle.sensor_type, "temperature");
    }

    #[tokio::test]
    async fn test_non_finite_value_rejected() {
        let (intake, clock) = intake_with_clock();

        let err = intake
            .submit("gateway_1", "temperature", f64::NAN, "celsius", clock.now())
            .await
            .unwrap_err();
        assert!(matches!(err, SubmitError::InvalidReading(_)));

        let err = intake
            .submit("gateway_1", "temperature", f64::INFINITY, "celsius", clock.now())
            .await
            .unwrap_err();
        assert!(matches!(err, SubmitError::InvalidReading(_)));
    }

    #[tokio::test]
    async fn test_unit_mismatch_rejected() {
        let (intake, clock) = intake_with_clock();

        let err = intake
            .submit("gateway_1", "temperature", 70.0, "fahrenheit", clock.now())
            .await
            .unwrap_err();
        assert!(matches!(err, SubmitError::InvalidReading(_)));
    }

    #[tokio::test]
    async fn test_unit_comparison_ignores_case() {
        let (intake, clock) = intake_with_clock();

        let handle = intake
            .submit("gateway_1", "temperature", 21.5, "Celsius", clock.now())
            .await
            .unwrap();
        assert_eq!(handle.submission_count, 1);
    }

    #[tokio::test]
    async fn test_implausible_value_rejected() {
        let (intake, clock) = intake_with_clock();

        let err = intake
            .submit("gateway_1", "temperature", 250.0, "celsius", clock.now())
            .await
            .unwrap_err();
        assert!(matches!(err, SubmitError::InvalidReading(_)));

        let err = intake
            .submit("gateway_1", "humidity", -5.0, "percent", clock.now())
            .await
            .unwrap_err();
        assert!(matches!(err, SubmitError::InvalidReading(_)));
    }

    #[tokio::test]
    async fn test_unknown_sensor_type_rejected() {
        let (intake, clock) = intake_with_clock();

        let err = intake
            .submit("gateway_1", "barometric", 1013.0, "hpa", clock.now())
            .await
            .unwrap_err();
        assert!(matches!(err, SubmitError::InvalidReading(_)));
    }

    #[tokio::test]
    async fn test_registered_profile_extends_intake() {
        let (mut intake, clock) = intake_with_clock();
        intake.register_profile(SensorProfile::new("barometric", "hpa", 300.0, 1100.0));

        assert!(intake
            .submit("gateway_1", "barometric", 1013.0, "hpa", clock.now())
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_stale_and_future_readings_rejected() {
        let (intake, clock) = intake_with_clock();
        let now = clock.now();

        let err = intake
            .submit(
                "gateway_1",
                "temperature",
                21.5,
                "celsius",
                now - Duration::seconds(OracleConfig::default().max_reading_age_secs + 10),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, SubmitError::InvalidReading(_)));

        let err = intake
            .submit(
                "gateway_1",
                "temperature",
                21.5,
                "celsius",
                now + Duration::seconds(60),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, SubmitError::InvalidReading(_)));
    }
}
