use std::collections::HashMap;
use std::fs;
use std::future::Future;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tablesync::error::SyncResult;
use tablesync::state::stats::{TableStats, TableStatsProvider};
use tablesync_config::shared::{DbEndpointConfig, OrchestratorConfig, SyncToolConfig};

/// Three-table schema with a linear dependency chain:
/// `gamma` references `beta`, `beta` references `alpha`.
pub const TEST_SCHEMA: &str = r#"
model alpha {
  id    Int    @id
  betas beta[]
}

model beta {
  id       Int   @id
  alpha_id Int
  alpha    alpha @relation(fields: [alpha_id], references: [id])
  gammas   gamma[]
}

model gamma {
  id      Int  @id
  beta_id Int
  beta    beta @relation(fields: [beta_id], references: [id])
}
"#;

pub const TEST_PASSWORD: &str = "hunter2";

pub fn endpoint(host: &str) -> DbEndpointConfig {
    DbEndpointConfig {
        host: host.to_string(),
        port: 3306,
        database: "app".to_string(),
        username: "sync".to_string(),
        password: Some(TEST_PASSWORD.into()),
    }
}

/// Orchestrator config pointing at a stub tool, with a short grace period so
/// termination tests stay fast.
pub fn sync_config(tool_path: &Path) -> OrchestratorConfig {
    OrchestratorConfig {
        source: Some(endpoint("master")),
        target: Some(endpoint("replica")),
        tool: SyncToolConfig {
            path: tool_path.to_string_lossy().into_owned(),
            termination_grace_secs: 1,
        },
    }
}

/// Writes an executable stub sync tool into `dir`.
///
/// The stub always answers the `--version` probe; `body` decides what a sync
/// invocation does. `$3` is the source descriptor and carries the
/// table-scoping key, so bodies dispatch on `*t=<table>*` patterns.
pub fn write_stub_tool(dir: &Path, body: &str) -> PathBuf {
    let path = dir.join("stub-sync");
    let script = format!(
        "#!/bin/sh\n\
         if [ \"$1\" = \"--version\" ]; then\n\
         \x20 echo \"stub-sync 0.1.0\"\n\
         \x20 exit 0\n\
         fi\n\
         {body}\n"
    );

    fs::write(&path, script).unwrap();
    let mut permissions = fs::metadata(&path).unwrap().permissions();
    permissions.set_mode(0o755);
    fs::set_permissions(&path, permissions).unwrap();

    path
}

/// Statistics provider returning no data, for tests that do not care.
pub struct NullStatsProvider;

impl TableStatsProvider for NullStatsProvider {
    async fn table_stats(&self, _tables: &[String]) -> SyncResult<HashMap<String, TableStats>> {
        Ok(HashMap::new())
    }
}

/// Polls `condition` until it holds, panicking after five seconds.
pub async fn wait_for<F, Fut>(mut condition: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        if condition().await {
            return;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not met within timeout"
        );
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
}
