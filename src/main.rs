use anyhow::Result;
use std::sync::Arc;

use sensor_consensus_oracle::core::{self, Config, HealthChecker, SystemClock};
use sensor_consensus_oracle::monitoring::OracleMetrics;
use sensor_consensus_oracle::oracle::{ReadingIntake, RoundCoordinator};
use sensor_consensus_oracle::reputation::{
    JsonFileReputationStore, ReputationLedger, ReputationStore,
};
use sensor_consensus_oracle::submitter::LoggingLedgerSubmitter;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = Config::from_env()?;

    // Initialize logging
    core::logging::init_logging(&config.monitoring.log_level);

    tracing::info!("🚀 Sensor Consensus Oracle starting...");
    tracing::info!("Version: {}", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        "Consensus: min_nodes={}, threshold={}, tolerance={}, window={}s",
        config.oracle.min_nodes,
        config.oracle.consensus_threshold,
        config.oracle.outlier_tolerance,
        config.oracle.collection_window_secs
    );

    // Initialize health checker
    let health_checker = Arc::new(HealthChecker::new());

    let clock = Arc::new(SystemClock);
    let metrics = Arc::new(OracleMetrics::new());
    let ledger = Arc::new(ReputationLedger::new(
        config.reputation.clone(),
        clock.clone(),
    ));

    // Seed reputation from the persistence collaborator when configured;
    // an unreadable store degrades to cold-start defaults.
    let store: Option<Arc<dyn ReputationStore>> = config
        .reputation
        .store_path
        .as_ref()
        .map(|path| Arc::new(JsonFileReputationStore::new(path)) as Arc<dyn ReputationStore>);

    if let Some(store) = &store {
        let loaded = ledger.load_from(store.as_ref()).await;
        health_checker
            .update_component("reputation_store", true)
            .await;
        tracing::info!("📂 Reputation store attached ({} record(s) loaded)", loaded);
    }
    health_checker
        .update_component("reputation_ledger", true)
        .await;

    let submitter = Arc::new(LoggingLedgerSubmitter::new());
    health_checker
        .update_component("ledger_submitter", true)
        .await;

    let coordinator = Arc::new(RoundCoordinator::new(
        config.oracle.clone(),
        clock.clone(),
        ledger.clone(),
        submitter,
        metrics.clone(),
    ));
    // Sensor adapters push readings through this intake; the adapter layer
    // itself lives outside this process core.
    let _intake = Arc::new(ReadingIntake::new(
        &config.oracle,
        coordinator.clone(),
        clock,
        metrics.clone(),
    ));

    // Start the deadline sweeper
    coordinator.spawn_sweeper();
    health_checker.update_component("coordinator", true).await;
    health_checker.update_component("intake", true).await;
    tracing::info!(
        "✅ Round coordinator active (sweep every {}s)",
        config.oracle.sweep_interval_secs
    );

    // Periodically persist reputation snapshots
    if let Some(store) = store {
        let ledger_persist = ledger.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(tokio::time::Duration::from_secs(60));
            loop {
                interval.tick().await;
                if let Err(e) = ledger_persist.persist_to(store.as_ref()).await {
                    tracing::error!("❌ Failed to persist reputation records: {}", e);
                }
            }
        });
    }

    // Start health check endpoint
    let health_clone = health_checker.clone();
    let health_port = config.monitoring.health_port;
    tokio::spawn(async move { start_health_server(health_clone, health_port).await });
    tracing::info!("✅ Health endpoint running on port {}", health_port);

    // Keep running
    let status_interval = config.monitoring.status_interval_secs;
    loop {
        tokio::time::sleep(tokio::time::Duration::from_secs(status_interval)).await;

        let status = coordinator.consensus_status().await;
        let report = ledger.report().await;
        tracing::info!(
            "Oracle status: {} active round(s), {} finalized, {} failed (success rate {:.1}%), {} known node(s)",
            status.active_rounds,
            status.finalized_rounds,
            status.failed_rounds,
            status.success_rate * 100.0,
            report.total_nodes
        );
        metrics.print_report();
    }
}

async fn start_health_server(health_checker: Arc<HealthChecker>, port: u16) {
    use warp::Filter;

    let health = warp::path("health")
        .and(warp::any().map(move || health_checker.clone()))
        .and_then(|checker: Arc<HealthChecker>| async move {
            let status = checker.get_status().await;
            Ok::<_, warp::Rejection>(warp::reply::json(&status))
        });

    warp::serve(health).run(([0, 0, 0, 0], port)).await;
}
