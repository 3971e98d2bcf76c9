use anyhow::Context;
use std::sync::Arc;
use tracing::{info, warn};

use tablesync::orchestrator::SyncOrchestrator;
use tablesync::state::table::TableSyncPhase;
use tablesync_config::shared::{ControllerConfig, DbEndpointConfig, OrchestratorConfig};

use crate::stats::MySqlStatsProvider;

/// Drives one full sync run over the configured catalog.
pub async fn start_controller(config: ControllerConfig) -> anyhow::Result<()> {
    info!("starting tablesync controller");
    log_config(&config);

    let schema = tokio::fs::read_to_string(&config.schema_path)
        .await
        .with_context(|| format!("failed to read schema file at `{}`", config.schema_path))?;

    let stats = MySqlStatsProvider::new(config.sync.source.clone());
    let orchestrator = Arc::new(SyncOrchestrator::new(config.sync, &schema, stats));

    orchestrator.start(None, config.dry_run).await?;

    // SIGINT and SIGTERM stop the run cooperatively: the current table is
    // terminated, the remaining ones are never started.
    let stopper = orchestrator.clone();
    let signal_task = tokio::spawn(async move {
        use tokio::signal::unix::{SignalKind, signal};

        let mut sigterm =
            signal(SignalKind::terminate()).expect("failed to register SIGTERM handler");

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("SIGINT (Ctrl+C) received, stopping sync run");
            }
            _ = sigterm.recv() => {
                info!("SIGTERM received, stopping sync run");
            }
        }

        if let Err(err) = stopper.stop().await {
            warn!("failed to stop sync run: {}", err);
        }
    });

    // Wait for the driver loop to finish, either normally or after a stop.
    orchestrator.wait().await;

    // If the run finished before any signal arrived, the signal task is
    // still waiting; it has nothing left to stop.
    signal_task.abort();
    let _ = signal_task.await;

    report_outcome(&orchestrator).await;

    info!("tablesync controller finished");
    Ok(())
}

fn log_config(config: &ControllerConfig) {
    info!(
        schema_path = config.schema_path,
        dry_run = config.dry_run,
        "controller config"
    );
    log_sync_config(&config.sync);
}

fn log_sync_config(config: &OrchestratorConfig) {
    info!(
        tool_path = config.tool.path,
        termination_grace_secs = config.tool.termination_grace_secs,
        "sync tool config"
    );

    match &config.source {
        Some(endpoint) => log_endpoint_config("source", endpoint),
        None => warn!("source endpoint is not configured"),
    }
    match &config.target {
        Some(endpoint) => log_endpoint_config("target", endpoint),
        None => warn!("target endpoint is not configured"),
    }
}

fn log_endpoint_config(side: &str, config: &DbEndpointConfig) {
    info!(
        side,
        host = config.host,
        port = config.port,
        database = config.database,
        username = config.username,
        "endpoint config",
    );
}

async fn report_outcome(orchestrator: &SyncOrchestrator<MySqlStatsProvider>) {
    let snapshot = orchestrator.state().await;

    info!(
        completed = snapshot.run.completed_tables,
        total = snapshot.run.total_tables,
        "sync run outcome"
    );

    for (table, status) in &snapshot.tables {
        if status.phase == TableSyncPhase::Error {
            warn!(
                table,
                error = status.error.as_deref().unwrap_or("unknown"),
                "table failed to sync"
            );
        }
    }
}
