use std::fmt;

use tablesync_config::PASSWORD_MASK;
use tablesync_config::shared::{DbEndpointConfig, SyncToolConfig};

/// Flag selecting report-only mode.
const DRY_RUN_FLAG: &str = "--dry-run";

/// Flag selecting mutating mode.
const EXECUTE_FLAG: &str = "--execute";

/// Disables the tool's replication-privilege preflight checks, which fail on
/// restricted accounts even when the sync itself would succeed.
const NO_PRIVILEGE_CHECK_FLAG: &str = "--no-check-privileges";

/// Fully built invocation of the external sync tool for one table.
///
/// Two renderings of the argument list are kept: the real one handed to the
/// process spawn, and a masked one in which password material is replaced by
/// [`PASSWORD_MASK`]. Only the masked rendering ever reaches logs or state;
/// [`fmt::Display`] renders the masked form for that reason.
#[derive(Debug, Clone)]
pub struct SyncCommand {
    program: String,
    args: Vec<String>,
    masked_args: Vec<String>,
}

impl SyncCommand {
    pub fn program(&self) -> &str {
        &self.program
    }

    /// The real argument list, passwords included. Never log this.
    pub fn args(&self) -> &[String] {
        &self.args
    }
}

impl fmt::Display for SyncCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.masked_args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Builds the tool invocation for syncing one table from source to target.
pub fn build_sync_command(
    tool: &SyncToolConfig,
    source: &DbEndpointConfig,
    target: &DbEndpointConfig,
    table: &str,
    dry_run: bool,
) -> SyncCommand {
    let mode = if dry_run { DRY_RUN_FLAG } else { EXECUTE_FLAG };

    let args = vec![
        mode.to_string(),
        NO_PRIVILEGE_CHECK_FLAG.to_string(),
        endpoint_descriptor(source, table, true),
        endpoint_descriptor(target, table, true),
    ];
    let masked_args = vec![
        mode.to_string(),
        NO_PRIVILEGE_CHECK_FLAG.to_string(),
        endpoint_descriptor(source, table, false),
        endpoint_descriptor(target, table, false),
    ];

    SyncCommand {
        program: tool.path.clone(),
        args,
        masked_args,
    }
}

/// Renders one endpoint as the tool's `h=,u=,p=,P=,D=,t=` descriptor with
/// the table-scoping key appended.
fn endpoint_descriptor(endpoint: &DbEndpointConfig, table: &str, expose_password: bool) -> String {
    let mut parts = vec![
        format!("h={}", endpoint.host),
        format!("u={}", endpoint.username),
    ];

    if let Some(password) = &endpoint.password {
        let value = if expose_password {
            password.expose_secret()
        } else {
            PASSWORD_MASK
        };
        parts.push(format!("p={value}"));
    }

    parts.push(format!("P={}", endpoint.port));
    parts.push(format!("D={}", endpoint.database));
    parts.push(format!("t={table}"));

    parts.join(",")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoint(host: &str, password: Option<&str>) -> DbEndpointConfig {
        DbEndpointConfig {
            host: host.to_string(),
            port: 3306,
            database: "app".to_string(),
            username: "sync".to_string(),
            password: password.map(Into::into),
        }
    }

    fn tool() -> SyncToolConfig {
        SyncToolConfig {
            path: "table-sync".to_string(),
            termination_grace_secs: 5,
        }
    }

    #[test]
    fn descriptor_carries_all_connection_parts() {
        let command = build_sync_command(
            &tool(),
            &endpoint("master", Some("hunter2")),
            &endpoint("replica", None),
            "users",
            false,
        );

        assert_eq!(command.args()[0], "--execute");
        assert_eq!(command.args()[1], "--no-check-privileges");
        assert_eq!(command.args()[2], "h=master,u=sync,p=hunter2,P=3306,D=app,t=users");
        assert_eq!(command.args()[3], "h=replica,u=sync,P=3306,D=app,t=users");
    }

    #[test]
    fn dry_run_selects_the_report_only_flag() {
        let command = build_sync_command(
            &tool(),
            &endpoint("master", None),
            &endpoint("replica", None),
            "users",
            true,
        );

        assert_eq!(command.args()[0], "--dry-run");
    }

    #[test]
    fn displayed_command_never_contains_the_password() {
        let command = build_sync_command(
            &tool(),
            &endpoint("master", Some("hunter2")),
            &endpoint("replica", Some("hunter2")),
            "users",
            true,
        );

        let rendered = command.to_string();
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains(PASSWORD_MASK));
    }
}
