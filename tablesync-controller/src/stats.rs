use sqlx::mysql::MySqlPoolOptions;
use sqlx::{MySqlPool, Row};
use std::collections::HashMap;
use tokio::sync::OnceCell;

use tablesync::error::{ErrorKind, SyncError, SyncResult};
use tablesync::state::stats::{TableStats, TableStatsProvider};
use tablesync::sync_error;
use tablesync_config::shared::{DbEndpointConfig, IntoConnectOptions};

/// Bytes per megabyte, for the size column.
const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Row counts and sizes for every table in the configured database.
///
/// `TABLE_ROWS` is the storage engine's estimate, which is what the status
/// map wants: an exact count would need a full scan per table.
const STATS_QUERY: &str = "\
SELECT TABLE_NAME AS table_name, \
       COALESCE(TABLE_ROWS, 0) AS row_count, \
       COALESCE(DATA_LENGTH, 0) + COALESCE(INDEX_LENGTH, 0) AS total_bytes \
FROM information_schema.TABLES \
WHERE TABLE_SCHEMA = ?";

/// Statistics provider backed by the master's `information_schema`.
///
/// The pool is created lazily on the first query, so a controller whose
/// endpoints are not configured yet never opens a connection.
pub struct MySqlStatsProvider {
    endpoint: Option<DbEndpointConfig>,
    pool: OnceCell<MySqlPool>,
}

impl MySqlStatsProvider {
    pub fn new(endpoint: Option<DbEndpointConfig>) -> Self {
        Self {
            endpoint,
            pool: OnceCell::new(),
        }
    }

    async fn pool(&self) -> SyncResult<&MySqlPool> {
        let Some(endpoint) = &self.endpoint else {
            return Err(sync_error!(
                ErrorKind::ConfigError,
                "Missing connection config",
                "the source endpoint must be configured to query table statistics"
            ));
        };

        self.pool
            .get_or_try_init(|| async {
                MySqlPoolOptions::new()
                    .max_connections(1)
                    .connect_with(endpoint.with_db())
                    .await
                    .map_err(|err| {
                        sync_error!(
                            ErrorKind::IoError,
                            "Failed to connect for table statistics",
                            err
                        )
                    })
            })
            .await
    }
}

impl TableStatsProvider for MySqlStatsProvider {
    async fn table_stats(&self, tables: &[String]) -> SyncResult<HashMap<String, TableStats>> {
        let pool = self.pool().await?;

        let rows = sqlx::query(STATS_QUERY)
            .bind(
                self.endpoint
                    .as_ref()
                    .map(|endpoint| endpoint.database.as_str())
                    .unwrap_or_default(),
            )
            .fetch_all(pool)
            .await
            .map_err(|err| {
                sync_error!(ErrorKind::IoError, "Table statistics query failed", err)
            })?;

        let mut stats = HashMap::with_capacity(tables.len());
        for row in rows {
            let table: String = row
                .try_get("table_name")
                .map_err(|err| sync_error!(ErrorKind::IoError, "Malformed statistics row", err))?;
            let row_count: u64 = row.try_get("row_count").unwrap_or_default();
            let total_bytes: u64 = row.try_get("total_bytes").unwrap_or_default();

            stats.insert(
                table,
                TableStats {
                    row_count,
                    size_mb: (total_bytes as f64 / BYTES_PER_MB * 100.0).round() / 100.0,
                },
            );
        }

        Ok(stats)
    }
}
