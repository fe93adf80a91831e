use anyhow::{ensure, Result};
use serde::Deserialize;
use std::env;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub oracle: OracleConfig,
    pub reputation: ReputationConfig,
    pub monitoring: MonitoringConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OracleConfig {
    /// Collection window per round, from first submission to deadline.
    pub collection_window_secs: u64,
    /// Quorum: minimum distinct nodes required to finalize a round.
    pub min_nodes: usize,
    /// Fraction of total participant weight that must survive filtering.
    pub consensus_threshold: f64,
    /// Maximum relative deviation from the median before exclusion.
    pub outlier_tolerance: f64,
    /// Close a round as soon as `min_nodes` distinct nodes have submitted.
    pub early_close_enabled: bool,
    /// How often the deadline sweep runs.
    pub sweep_interval_secs: u64,
    /// Readings with `measured_at` older than this are rejected.
    pub max_reading_age_secs: i64,
    /// Allowance for gateway clocks running ahead of ours.
    pub max_clock_skew_secs: i64,
    /// Terminal rounds kept in memory for the statistics queries.
    pub round_history_limit: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReputationConfig {
    /// EMA smoothing factor for score updates.
    pub alpha: f64,
    /// Cold-start score for nodes never seen before.
    pub default_score: f64,
    /// Nodes below this score contribute zero weight.
    pub min_weight_score: f64,
    pub trusted_threshold: f64,
    pub suspicious_threshold: f64,
    /// JSON file to load/save reputation records; in-memory only when unset.
    pub store_path: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MonitoringConfig {
    pub health_port: u16,
    pub log_level: String,
    pub status_interval_secs: u64,
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();

        let config = Config {
            oracle: OracleConfig {
                collection_window_secs: env_parse("ORACLE_COLLECTION_WINDOW_SECS", 30),
                min_nodes: env_parse("ORACLE_MIN_NODES", 3),
                consensus_threshold: env_parse("ORACLE_CONSENSUS_THRESHOLD", 0.8),
                outlier_tolerance: env_parse("ORACLE_OUTLIER_TOLERANCE", 0.05),
                early_close_enabled: env_parse("ORACLE_EARLY_CLOSE", false),
                sweep_interval_secs: env_parse("ORACLE_SWEEP_INTERVAL_SECS", 5),
                max_reading_age_secs: env_parse("ORACLE_MAX_READING_AGE_SECS", 120),
                max_clock_skew_secs: env_parse("ORACLE_MAX_CLOCK_SKEW_SECS", 5),
                round_history_limit: env_parse("ORACLE_ROUND_HISTORY", 100),
            },
            reputation: ReputationConfig {
                alpha: env_parse("REPUTATION_ALPHA", 0.1),
                default_score: env_parse("REPUTATION_DEFAULT_SCORE", 0.5),
                min_weight_score: env_parse("REPUTATION_MIN_WEIGHT_SCORE", 0.2),
                trusted_threshold: env_parse("REPUTATION_TRUSTED_THRESHOLD", 0.7),
                suspicious_threshold: env_parse("REPUTATION_SUSPICIOUS_THRESHOLD", 0.3),
                store_path: env::var("REPUTATION_STORE_PATH").ok(),
            },
            monitoring: MonitoringConfig {
                health_port: env_parse("HEALTH_PORT", 3000),
                log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
                status_interval_secs: env_parse("STATUS_INTERVAL_SECS", 60),
            },
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let oracle = &self.oracle;
        ensure!(
            oracle.consensus_threshold > 0.0 && oracle.consensus_threshold <= 1.0,
            "ORACLE_CONSENSUS_THRESHOLD must be in (0, 1], got {}",
            oracle.consensus_threshold
        );
        ensure!(
            oracle.outlier_tolerance >= 0.0,
            "ORACLE_OUTLIER_TOLERANCE must be >= 0, got {}",
            oracle.outlier_tolerance
        );
        ensure!(oracle.min_nodes >= 1, "ORACLE_MIN_NODES must be >= 1");
        ensure!(
            oracle.collection_window_secs >= 1,
            "ORACLE_COLLECTION_WINDOW_SECS must be >= 1"
        );

        let reputation = &self.reputation;
        ensure!(
            reputation.alpha > 0.0 && reputation.alpha <= 1.0,
            "REPUTATION_ALPHA must be in (0, 1], got {}",
            reputation.alpha
        );
        ensure!(
            (0.0..=1.0).contains(&reputation.default_score),
            "REPUTATION_DEFAULT_SCORE must be in [0, 1], got {}",
            reputation.default_score
        );
        ensure!(
            (0.0..=1.0).contains(&reputation.min_weight_score),
            "REPUTATION_MIN_WEIGHT_SCORE must be in [0, 1], got {}",
            reputation.min_weight_score
        );

        Ok(())
    }
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            collection_window_secs: 30,
            min_nodes: 3,
            consensus_threshold: 0.8,
            outlier_tolerance: 0.05,
            early_close_enabled: false,
            sweep_interval_secs: 5,
            max_reading_age_secs: 120,
            max_clock_skew_secs: 5,
            round_history_limit: 100,
        }
    }
}

impl Default for ReputationConfig {
    fn default() -> Self {
        Self {
            alpha: 0.1,
            default_score: 0.5,
            min_weight_score: 0.2,
            trusted_threshold: 0.7,
            suspicious_threshold: 0.3,
            store_path: None,
        }
    }
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            health_port: 3000,
            log_level: "info".to_string(),
            status_interval_secs: 60,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> Config {
        Config {
            oracle: OracleConfig::default(),
            reputation: ReputationConfig::default(),
            monitoring: MonitoringConfig::default(),
        }
    }

    #[test]
    fn test_defaults_are_valid() {
        assert!(base_config().validate().is_ok());
    }

    #[test]
    fn test_threshold_out_of_range_rejected() {
        let mut config = base_config();
        config.oracle.consensus_threshold = 1.5;
        assert!(config.validate().is_err());

        config.oracle.consensus_threshold = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_negative_tolerance_rejected() {
        let mut config = base_config();
        config.oracle.outlier_tolerance = -0.01;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_alpha_bounds_rejected() {
        let mut config = base_config();
        config.reputation.alpha = 0.0;
        assert!(config.validate().is_err());

        config.reputation.alpha = 1.1;
        assert!(config.validate().is_err());
    }
}
