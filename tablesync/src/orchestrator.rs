//! Run-level state machine driving a batch of table syncs.
//!
//! A run moves `Idle → Running → Stopping → Idle`; within a run each table
//! cycles `Todo → Busy → {Done, Error}`. Tables are processed strictly
//! sequentially in topological order, one external process at a time, and a
//! single table's failure never halts the batch.

use chrono::Utc;
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use tablesync_config::shared::{DbEndpointConfig, OrchestratorConfig};

use crate::bail;
use crate::concurrency::stop::{StopRx, StopTx, create_stop_channel};
use crate::error::{ErrorKind, SyncError, SyncResult};
use crate::process::command::build_sync_command;
use crate::process::controller::{ProcessController, SyncOutcome};
use crate::process::output::SyncEvent;
use crate::schema::graph::TableDependencyGraph;
use crate::schema::order::sort_tables;
use crate::schema::parser::parse_schema;
use crate::state::log::LogLevel;
use crate::state::stats::TableStatsProvider;
use crate::state::store::{StateSnapshot, SyncStateStore};
use crate::state::table::{TableStatusPatch, TableSyncPhase};

/// Orchestrates dependency-ordered sync runs over the table catalog.
///
/// Constructed explicitly by the hosting application's composition root and
/// shared behind [`Arc`]; all observable state is exposed through snapshots
/// of the injected store rather than ambient globals. Generic over the
/// statistics provider the run decorates its status map with.
#[derive(Debug)]
pub struct SyncOrchestrator<P> {
    config: Arc<OrchestratorConfig>,
    graph: Arc<TableDependencyGraph>,
    catalog: Vec<String>,
    store: SyncStateStore,
    controller: ProcessController,
    stats: P,
    stop_tx: StopTx,
    driver: Mutex<Option<JoinHandle<()>>>,
}

/// Everything the driver loop needs, detached from the orchestrator so the
/// loop can run on its own task.
struct RunContext {
    store: SyncStateStore,
    controller: ProcessController,
    source: DbEndpointConfig,
    target: DbEndpointConfig,
    ordered: Vec<String>,
    dry_run: bool,
    stop_rx: StopRx,
}

impl<P> SyncOrchestrator<P>
where
    P: TableStatsProvider + Send + Sync + 'static,
{
    /// Creates a new orchestrator over the given schema text.
    ///
    /// The dependency graph is extracted here, once; its key set is the
    /// table catalog every selection is validated against. An unparseable
    /// schema degrades to an empty catalog: explicit selections then run in
    /// the order they are given.
    pub fn new(config: OrchestratorConfig, schema: &str, stats: P) -> Self {
        let graph = parse_schema(schema);
        let catalog: Vec<String> = graph.tables().map(str::to_owned).collect();
        if catalog.is_empty() {
            warn!("no tables found in the schema, selections will run in the order they are given");
        } else {
            info!("schema catalog holds {} tables", catalog.len());
        }

        let controller = ProcessController::new(config.tool.clone());
        let (stop_tx, _) = create_stop_channel();

        Self {
            config: Arc::new(config),
            graph: Arc::new(graph),
            catalog,
            store: SyncStateStore::new(),
            controller,
            stats,
            stop_tx,
            driver: Mutex::new(None),
        }
    }

    /// Returns the table catalog extracted from the schema.
    pub fn catalog(&self) -> &[String] {
        &self.catalog
    }

    /// Returns a read-only copy of the current run state, per-table
    /// statuses, and logs.
    pub async fn state(&self) -> StateSnapshot {
        self.store.snapshot().await
    }

    /// Empties the run log buffer.
    pub async fn clear_logs(&self) {
        self.store.clear_logs().await;
    }

    /// Starts a run over the given table selection, or the full catalog.
    ///
    /// Fails fast, before any table is touched, when connection config is
    /// missing, the external tool is unreachable, a run is already in
    /// progress, or the selection names an unknown table. Once the driver
    /// loop is launched this call returns immediately; per-table failures
    /// are only ever visible through table status and logs.
    pub async fn start(&self, selection: Option<Vec<String>>, dry_run: bool) -> SyncResult<()> {
        if self.store.is_running().await {
            bail!(
                ErrorKind::AlreadyRunning,
                "Sync already running",
                "a run is in progress; stop it or wait for it to finish"
            );
        }

        let (Some(source), Some(target)) = (self.config.source.clone(), self.config.target.clone())
        else {
            bail!(
                ErrorKind::ConfigError,
                "Missing connection config",
                "both `source` and `target` endpoints must be configured before starting a run"
            );
        };

        let version = self.controller.probe_version().await?;

        let tables = self.effective_tables(selection)?;
        let ordered = sort_tables(&tables, &self.graph);

        // The flag check above is advisory; this gate is the atomic one.
        if !self.store.try_begin_run(&ordered).await {
            bail!(
                ErrorKind::AlreadyRunning,
                "Sync already running",
                "a run is in progress; stop it or wait for it to finish"
            );
        }

        if let Err(err) = self.store.ensure_statistics(&ordered, &self.stats).await {
            self.store
                .record_log(
                    LogLevel::Warning,
                    format!("table statistics unavailable: {err}"),
                    None,
                )
                .await;
        }

        let mode = if dry_run { "dry-run" } else { "execute" };
        self.store
            .record_log(
                LogLevel::Info,
                format!(
                    "sync run started in {mode} mode over {} tables ({version})",
                    ordered.len()
                ),
                None,
            )
            .await;
        info!(
            "sync run started in {} mode over {} tables",
            mode,
            ordered.len()
        );

        let context = RunContext {
            store: self.store.clone(),
            controller: self.controller.clone(),
            source,
            target,
            ordered,
            dry_run,
            stop_rx: self.stop_tx.subscribe(),
        };

        let driver = tokio::spawn(run_sync_loop(context));
        *self.driver.lock().await = Some(driver);

        Ok(())
    }

    /// Requests cooperative cancellation of the in-flight run.
    ///
    /// The driver loop observes the flag before starting its next table; the
    /// currently syncing table gets an explicit termination request but may
    /// still finish naturally within the grace period.
    pub async fn stop(&self) -> SyncResult<()> {
        if !self.store.request_stop().await {
            bail!(
                ErrorKind::NotRunning,
                "Sync not running",
                "there is no run in progress to stop"
            );
        }

        self.store
            .record_log(
                LogLevel::Info,
                "stop requested, finishing current table",
                None,
            )
            .await;
        let _ = self.stop_tx.stop();

        Ok(())
    }

    /// Waits for the in-flight run's driver loop to finish.
    ///
    /// Returns immediately if no run was started.
    pub async fn wait(&self) {
        let driver = self.driver.lock().await.take();
        if let Some(driver) = driver {
            let _ = driver.await;
        }
    }

    /// Resolves the effective table set for a run: a validated selection, or
    /// the full catalog.
    fn effective_tables(&self, selection: Option<Vec<String>>) -> SyncResult<Vec<String>> {
        let Some(selection) = selection else {
            return Ok(self.catalog.clone());
        };

        // With an empty catalog there is nothing to validate against; the
        // selection is taken as given so a broken schema never blocks runs.
        if !self.catalog.is_empty() {
            for table in &selection {
                if !self.graph.contains(table) {
                    bail!(
                        ErrorKind::UnknownTable,
                        "Unknown table requested",
                        format!("table '{table}' is not part of the schema catalog")
                    );
                }
            }
        }

        Ok(selection)
    }
}

/// The sequential driver loop: one table at a time, in topological order.
async fn run_sync_loop(context: RunContext) {
    let RunContext {
        store,
        controller,
        source,
        target,
        ordered,
        dry_run,
        mut stop_rx,
    } = context;

    let total = ordered.len();
    let mut completed = 0usize;
    let mut failed = 0usize;

    for table in &ordered {
        if store.is_stopping().await {
            store
                .record_log(LogLevel::Info, "sync stopped by user", None)
                .await;
            info!("sync run stopped by user, {} tables left", total - completed - failed);
            break;
        }

        store.set_current_table(Some(table)).await;
        store
            .upsert_table_status(
                table,
                TableStatusPatch {
                    phase: Some(TableSyncPhase::Busy),
                    started_at: Some(Utc::now()),
                    ..Default::default()
                },
            )
            .await;

        let command = build_sync_command(controller.tool(), &source, &target, table, dry_run);
        store
            .record_log(LogLevel::Info, format!("running {command}"), Some(table))
            .await;

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let applier = tokio::spawn(apply_events(store.clone(), table.clone(), events_rx));

        let outcome = match controller.spawn_sync(&command, events_tx) {
            Ok(process) => process.complete(&mut stop_rx).await,
            // An OS-level launch failure settles the same way as a failing
            // exit code: recorded against this table only.
            Err(err) => SyncOutcome::Failed {
                exit_code: None,
                output: err.to_string(),
            },
        };

        // Row counters are fully applied before the terminal status is
        // stamped; the applier ends once the process closes its streams.
        let _ = applier.await;

        match outcome {
            SyncOutcome::Completed {
                exit_code,
                recovered,
            } => {
                if recovered {
                    store
                        .record_log(
                            LogLevel::Warning,
                            format!(
                                "sync completed with recoverable errors (exit code {exit_code})"
                            ),
                            Some(table),
                        )
                        .await;
                }
                store
                    .upsert_table_status(
                        table,
                        TableStatusPatch {
                            phase: Some(TableSyncPhase::Done),
                            completed_at: Some(Utc::now()),
                            ..Default::default()
                        },
                    )
                    .await;
                store.increment_completed().await;
                completed += 1;
                store
                    .record_log(LogLevel::Info, "table synced", Some(table))
                    .await;
            }
            SyncOutcome::Failed { exit_code, output } => {
                let mut message = match exit_code {
                    Some(code) => format!("sync tool exited with code {code}"),
                    None => "sync tool did not finish".to_string(),
                };
                if !output.is_empty() {
                    message.push_str(": ");
                    message.push_str(&output);
                }

                store
                    .upsert_table_status(
                        table,
                        TableStatusPatch {
                            phase: Some(TableSyncPhase::Error),
                            completed_at: Some(Utc::now()),
                            error: Some(message.clone()),
                            ..Default::default()
                        },
                    )
                    .await;
                store
                    .record_log(LogLevel::Error, message, Some(table))
                    .await;
                failed += 1;
            }
        }

        store.set_current_table(None).await;
    }

    store.finish_run().await;
    store
        .record_log(
            LogLevel::Info,
            format!(
                "sync run finished: {completed} synced, {failed} failed, {} not reached",
                total - completed - failed
            ),
            None,
        )
        .await;
    info!(
        "sync run finished: {} synced, {} failed out of {}",
        completed, failed, total
    );
}

/// Applies classified tool output to the state store.
///
/// Runs concurrently with the process so snapshots taken mid-table observe
/// live row counters; ends when the process closes its output streams.
async fn apply_events(
    store: SyncStateStore,
    table: String,
    mut events: mpsc::UnboundedReceiver<SyncEvent>,
) {
    let mut rows_applied: u64 = 0;

    while let Some(event) = events.recv().await {
        match event {
            SyncEvent::RowApplied => {
                rows_applied += 1;
                store
                    .upsert_table_status(
                        &table,
                        TableStatusPatch {
                            rows_processed: Some(rows_applied),
                            ..Default::default()
                        },
                    )
                    .await;
            }
            SyncEvent::Progress { processed, total } => {
                rows_applied = processed;
                store
                    .upsert_table_status(
                        &table,
                        TableStatusPatch {
                            rows_processed: Some(processed),
                            rows_total: Some(total),
                            ..Default::default()
                        },
                    )
                    .await;
            }
            SyncEvent::Log { level, message } => {
                store.record_log(level, message, Some(&table)).await;
            }
            SyncEvent::TableFailed => {
                store
                    .upsert_table_status(
                        &table,
                        TableStatusPatch {
                            phase: Some(TableSyncPhase::Error),
                            ..Default::default()
                        },
                    )
                    .await;
            }
        }
    }
}
