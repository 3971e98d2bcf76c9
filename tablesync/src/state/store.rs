use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::error::SyncResult;
use crate::state::log::{LogEntry, LogLevel, MAX_LOG_ENTRIES};
use crate::state::stats::TableStatsProvider;
use crate::state::table::{TableStatusPatch, TableSyncStatus};

/// Run-level progress fields.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunState {
    pub is_running: bool,
    pub is_stopping: bool,
    pub start_time: Option<DateTime<Utc>>,
    pub current_table: Option<String>,
    pub total_tables: usize,
    pub completed_tables: usize,
}

#[derive(Debug)]
struct Inner {
    run: RunState,
    tables: BTreeMap<String, TableSyncStatus>,
    logs: VecDeque<LogEntry>,
    stats_loaded: bool,
}

/// Read-only copy of the full engine state.
///
/// Snapshots are deep copies, so external readers can never mutate internal
/// structures nor observe a torn mutation.
#[derive(Debug, Clone, Serialize)]
pub struct StateSnapshot {
    #[serde(flatten)]
    pub run: RunState,
    pub tables: BTreeMap<String, TableSyncStatus>,
    pub logs: Vec<LogEntry>,
}

/// Single source of truth for run state, per-table statuses and the log
/// buffer.
///
/// Designed for a single writer (the orchestrator driver loop and its event
/// applier) plus many concurrent readers taking snapshots; the mutex only
/// makes each individual read or mutation atomic, it never spans a
/// suspension on external work.
#[derive(Debug, Clone)]
pub struct SyncStateStore {
    inner: Arc<Mutex<Inner>>,
}

impl SyncStateStore {
    pub fn new() -> Self {
        let inner = Inner {
            run: RunState::default(),
            tables: BTreeMap::new(),
            logs: VecDeque::new(),
            stats_loaded: false,
        };

        Self {
            inner: Arc::new(Mutex::new(inner)),
        }
    }

    /// Returns a deep copy of the current state.
    pub async fn snapshot(&self) -> StateSnapshot {
        let inner = self.inner.lock().await;

        StateSnapshot {
            run: inner.run.clone(),
            tables: inner.tables.clone(),
            logs: inner.logs.iter().cloned().collect(),
        }
    }

    /// Appends an entry to the run log, evicting the oldest entry once the
    /// buffer exceeds its cap.
    pub async fn record_log(
        &self,
        level: LogLevel,
        message: impl Into<String>,
        table: Option<&str>,
    ) {
        let mut inner = self.inner.lock().await;
        push_log(&mut inner, level, message.into(), table);
    }

    /// Empties the log buffer, then records that it was cleared.
    pub async fn clear_logs(&self) {
        let mut inner = self.inner.lock().await;
        inner.logs.clear();
        push_log(&mut inner, LogLevel::Info, "logs cleared".to_string(), None);
    }

    /// Merges a partial update into a table's status, creating a default
    /// `todo` entry if the table is not tracked yet.
    pub async fn upsert_table_status(&self, table: &str, patch: TableStatusPatch) {
        let mut inner = self.inner.lock().await;
        inner
            .tables
            .entry(table.to_string())
            .or_default()
            .apply(patch);
    }

    /// Returns a copy of one table's status, if tracked.
    pub async fn table_status(&self, table: &str) -> Option<TableSyncStatus> {
        let inner = self.inner.lock().await;
        inner.tables.get(table).cloned()
    }

    /// Lazily decorates the tracked tables with row-count/size statistics.
    ///
    /// The provider is queried at most once per process lifetime, and only
    /// when some tracked table still lacks statistics. Tables absent from
    /// the provider's result are zeroed rather than left unset.
    pub async fn ensure_statistics<P>(&self, tables: &[String], provider: &P) -> SyncResult<()>
    where
        P: TableStatsProvider,
    {
        {
            let inner = self.inner.lock().await;
            if inner.stats_loaded {
                return Ok(());
            }

            let any_missing = tables
                .iter()
                .any(|table| inner.tables.get(table).is_none_or(|s| s.row_count.is_none()));
            if !any_missing {
                return Ok(());
            }
        }

        // The lock is not held across the provider query; the single-writer
        // model makes a duplicate fetch impossible.
        let stats = provider.table_stats(tables).await?;

        let mut inner = self.inner.lock().await;
        for table in tables {
            let stat = stats.get(table).copied().unwrap_or_default();
            let status = inner.tables.entry(table.clone()).or_default();
            status.row_count = Some(stat.row_count);
            status.table_size_mb = Some(stat.size_mb);
        }
        inner.stats_loaded = true;

        Ok(())
    }

    /// Atomically transitions the store into a running run over the given
    /// tables, resetting exactly their statuses.
    ///
    /// Returns `false` without touching anything if a run is already in
    /// progress.
    pub async fn try_begin_run(&self, tables: &[String]) -> bool {
        let mut inner = self.inner.lock().await;
        if inner.run.is_running {
            return false;
        }

        inner.run = RunState {
            is_running: true,
            is_stopping: false,
            start_time: Some(Utc::now()),
            current_table: None,
            total_tables: tables.len(),
            completed_tables: 0,
        };

        for table in tables {
            inner.tables.entry(table.clone()).or_default().reset_for_run();
        }

        true
    }

    /// Records which table the driver loop is currently working on.
    pub async fn set_current_table(&self, table: Option<&str>) {
        let mut inner = self.inner.lock().await;
        inner.run.current_table = table.map(str::to_owned);
    }

    /// Increments the completed-tables counter for the current run.
    pub async fn increment_completed(&self) {
        let mut inner = self.inner.lock().await;
        inner.run.completed_tables += 1;
    }

    /// Flags the current run as stopping.
    ///
    /// Returns `false` if no run is in progress.
    pub async fn request_stop(&self) -> bool {
        let mut inner = self.inner.lock().await;
        if !inner.run.is_running {
            return false;
        }

        inner.run.is_stopping = true;
        true
    }

    /// Clears the running/stopping flags unconditionally at loop exit.
    pub async fn finish_run(&self) {
        let mut inner = self.inner.lock().await;
        inner.run.is_running = false;
        inner.run.is_stopping = false;
        inner.run.current_table = None;
    }

    pub async fn is_running(&self) -> bool {
        self.inner.lock().await.run.is_running
    }

    pub async fn is_stopping(&self) -> bool {
        self.inner.lock().await.run.is_stopping
    }
}

impl Default for SyncStateStore {
    fn default() -> Self {
        Self::new()
    }
}

fn push_log(inner: &mut Inner, level: LogLevel, message: String, table: Option<&str>) {
    inner.logs.push_back(LogEntry {
        timestamp: Utc::now(),
        level,
        table: table.map(str::to_owned),
        message,
    });

    while inner.logs.len() > MAX_LOG_ENTRIES {
        inner.logs.pop_front();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SyncResult;
    use crate::state::stats::TableStats;
    use crate::state::table::TableSyncPhase;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeStatsProvider {
        stats: HashMap<String, TableStats>,
        calls: AtomicUsize,
    }

    impl FakeStatsProvider {
        fn new(stats: HashMap<String, TableStats>) -> Self {
            Self {
                stats,
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl TableStatsProvider for FakeStatsProvider {
        async fn table_stats(
            &self,
            _tables: &[String],
        ) -> SyncResult<HashMap<String, TableStats>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.stats.clone())
        }
    }

    fn owned(tables: &[&str]) -> Vec<String> {
        tables.iter().map(|t| t.to_string()).collect()
    }

    #[tokio::test]
    async fn log_buffer_evicts_oldest_past_the_cap() {
        let store = SyncStateStore::new();

        for i in 0..(MAX_LOG_ENTRIES + 1) {
            store
                .record_log(LogLevel::Info, format!("entry {i}"), None)
                .await;
        }

        let snapshot = store.snapshot().await;
        assert_eq!(snapshot.logs.len(), MAX_LOG_ENTRIES);
        assert_eq!(snapshot.logs.first().unwrap().message, "entry 1");
        assert_eq!(
            snapshot.logs.last().unwrap().message,
            format!("entry {MAX_LOG_ENTRIES}")
        );
    }

    #[tokio::test]
    async fn clearing_logs_records_a_cleared_entry() {
        let store = SyncStateStore::new();
        store.record_log(LogLevel::Error, "boom", None).await;

        store.clear_logs().await;

        let snapshot = store.snapshot().await;
        assert_eq!(snapshot.logs.len(), 1);
        assert_eq!(snapshot.logs[0].level, LogLevel::Info);
        assert_eq!(snapshot.logs[0].message, "logs cleared");
    }

    #[tokio::test]
    async fn upsert_creates_a_default_todo_entry() {
        let store = SyncStateStore::new();

        store
            .upsert_table_status(
                "users",
                TableStatusPatch {
                    rows_processed: Some(3),
                    ..Default::default()
                },
            )
            .await;

        let status = store.table_status("users").await.unwrap();
        assert_eq!(status.phase, TableSyncPhase::Todo);
        assert_eq!(status.rows_processed, Some(3));
    }

    #[tokio::test]
    async fn statistics_are_fetched_once_and_missing_tables_zeroed() {
        let store = SyncStateStore::new();
        let tables = owned(&["users", "orders"]);

        let mut stats = HashMap::new();
        stats.insert(
            "users".to_string(),
            TableStats {
                row_count: 42,
                size_mb: 1.5,
            },
        );
        let provider = FakeStatsProvider::new(stats);

        store.ensure_statistics(&tables, &provider).await.unwrap();
        store.ensure_statistics(&tables, &provider).await.unwrap();

        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);

        let users = store.table_status("users").await.unwrap();
        assert_eq!(users.row_count, Some(42));

        // `orders` was absent from the provider's result.
        let orders = store.table_status("orders").await.unwrap();
        assert_eq!(orders.row_count, Some(0));
        assert_eq!(orders.table_size_mb, Some(0.0));
    }

    #[tokio::test]
    async fn begin_run_is_rejected_while_running() {
        let store = SyncStateStore::new();
        let tables = owned(&["users"]);

        assert!(store.try_begin_run(&tables).await);
        assert!(!store.try_begin_run(&tables).await);

        store.finish_run().await;
        assert!(store.try_begin_run(&tables).await);
    }

    #[tokio::test]
    async fn begin_run_resets_selected_tables_but_keeps_statistics() {
        let store = SyncStateStore::new();

        store
            .upsert_table_status(
                "users",
                TableStatusPatch {
                    phase: Some(TableSyncPhase::Error),
                    row_count: Some(7),
                    error: Some("old failure".to_string()),
                    ..Default::default()
                },
            )
            .await;

        assert!(store.try_begin_run(&owned(&["users"])).await);

        let status = store.table_status("users").await.unwrap();
        assert_eq!(status.phase, TableSyncPhase::Todo);
        assert_eq!(status.row_count, Some(7));
        assert!(status.error.is_none());
    }

    #[tokio::test]
    async fn stop_request_requires_a_running_run() {
        let store = SyncStateStore::new();
        assert!(!store.request_stop().await);

        store.try_begin_run(&owned(&["users"])).await;
        assert!(store.request_stop().await);
        assert!(store.is_stopping().await);
    }
}
