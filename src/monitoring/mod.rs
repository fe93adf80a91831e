pub mod metrics;

pub use metrics::OracleMetrics;
