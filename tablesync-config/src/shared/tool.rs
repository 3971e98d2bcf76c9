use serde::{Deserialize, Serialize};

/// Seconds granted to the external process between SIGTERM and SIGKILL.
const DEFAULT_TERMINATION_GRACE_SECS: u64 = 5;

/// Configuration for the external row-synchronization tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SyncToolConfig {
    /// Path to the sync tool binary. A bare name is resolved via `PATH`.
    pub path: String,
    /// Grace period in seconds before a terminated process is force-killed.
    #[serde(default = "default_termination_grace_secs")]
    pub termination_grace_secs: u64,
}

fn default_termination_grace_secs() -> u64 {
    DEFAULT_TERMINATION_GRACE_SECS
}
