use std::collections::HashMap;
use std::future::Future;

use crate::error::SyncResult;

/// Row-count and on-disk size metadata for one table.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TableStats {
    pub row_count: u64,
    pub size_mb: f64,
}

/// Source of per-table statistics used to decorate the status map.
///
/// The store queries it lazily and at most once per process; tables absent
/// from the result are zeroed rather than left unset, so a table that the
/// provider does not know about still renders as `0 rows` instead of
/// missing data.
pub trait TableStatsProvider {
    /// Returns statistics for the given tables, keyed by table name.
    ///
    /// Tables the provider has no data for may simply be omitted from the
    /// result.
    fn table_stats(
        &self,
        tables: &[String],
    ) -> impl Future<Output = SyncResult<HashMap<String, TableStats>>> + Send;
}
