use serde::{Deserialize, Serialize};

use crate::shared::{DbEndpointConfig, SyncToolConfig};

/// Configuration for the sync orchestration engine.
///
/// The endpoints are optional on purpose: the engine validates their presence
/// when a run is started, so a controller deployed without connection details
/// comes up cleanly and reports the missing configuration through the run
/// API instead of failing at process start.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct OrchestratorConfig {
    /// Master database the rows are read from.
    #[serde(default)]
    pub source: Option<DbEndpointConfig>,
    /// Slave database the rows are written to.
    #[serde(default)]
    pub target: Option<DbEndpointConfig>,
    /// External sync tool invocation settings.
    pub tool: SyncToolConfig,
}
