use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Position of one table in the run lifecycle.
///
/// Transitions only ever go `Todo → Busy → {Done, Error}`; a table selected
/// for a new run is reset to [`TableSyncPhase::Todo`] before transitioning
/// again.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TableSyncPhase {
    /// Selected for the current run but not reached yet.
    Todo,
    /// The external process for this table is in flight.
    Busy,
    /// The external process settled within the accepted exit code set.
    Done,
    /// The external process failed or could not be spawned.
    Error,
}

impl TableSyncPhase {
    /// Returns `true` if the table has reached a terminal phase for the run.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Error)
    }
}

impl fmt::Display for TableSyncPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Todo => write!(f, "todo"),
            Self::Busy => write!(f, "busy"),
            Self::Done => write!(f, "done"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Live status of one table, including the catalog statistics used to
/// decorate it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct TableSyncStatus {
    pub phase: TableSyncPhase,
    /// Rows the external tool has applied so far in this run.
    pub rows_processed: Option<u64>,
    /// Total rows the tool reported it is going to process.
    pub rows_total: Option<u64>,
    /// Row count reported by the statistics provider.
    pub row_count: Option<u64>,
    /// On-disk size in megabytes reported by the statistics provider.
    pub table_size_mb: Option<f64>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

impl TableSyncStatus {
    /// Merges a partial update into this status.
    pub fn apply(&mut self, patch: TableStatusPatch) {
        if let Some(phase) = patch.phase {
            self.phase = phase;
        }
        if let Some(rows_processed) = patch.rows_processed {
            self.rows_processed = Some(rows_processed);
        }
        if let Some(rows_total) = patch.rows_total {
            self.rows_total = Some(rows_total);
        }
        if let Some(row_count) = patch.row_count {
            self.row_count = Some(row_count);
        }
        if let Some(table_size_mb) = patch.table_size_mb {
            self.table_size_mb = Some(table_size_mb);
        }
        if let Some(started_at) = patch.started_at {
            self.started_at = Some(started_at);
        }
        if let Some(completed_at) = patch.completed_at {
            self.completed_at = Some(completed_at);
        }
        if let Some(error) = patch.error {
            self.error = Some(error);
        }
    }

    /// Resets the per-run fields ahead of a new run.
    ///
    /// Catalog statistics survive the reset, they describe the table rather
    /// than any particular run.
    pub fn reset_for_run(&mut self) {
        self.phase = TableSyncPhase::Todo;
        self.rows_processed = None;
        self.rows_total = None;
        self.started_at = None;
        self.completed_at = None;
        self.error = None;
    }
}

impl Default for TableSyncStatus {
    fn default() -> Self {
        Self {
            phase: TableSyncPhase::Todo,
            rows_processed: None,
            rows_total: None,
            row_count: None,
            table_size_mb: None,
            started_at: None,
            completed_at: None,
            error: None,
        }
    }
}

/// Partial update merged into a [`TableSyncStatus`] by the state store.
#[derive(Debug, Default, Clone)]
pub struct TableStatusPatch {
    pub phase: Option<TableSyncPhase>,
    pub rows_processed: Option<u64>,
    pub rows_total: Option<u64>,
    pub row_count: Option<u64>,
    pub table_size_mb: Option<f64>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}
