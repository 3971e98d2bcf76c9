use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use std::io;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use tablesync_config::shared::SyncToolConfig;

use crate::concurrency::stop::StopRx;
use crate::error::{ErrorKind, SyncError, SyncResult};
use crate::process::command::SyncCommand;
use crate::process::output::{SyncEvent, classify_stderr_line, classify_stdout_line};
use crate::{bail, sync_error};

/// Exit codes the tool uses for a successful sync: 0 reports no differences,
/// 1 reports differences found (expected in dry run), 25 reports differences
/// with recoverable errors.
const SUCCESS_EXIT_CODES: [i32; 3] = [0, 1, 25];

/// Exit code meaning the tool hit row-level errors it recovered from.
const RECOVERED_EXIT_CODE: i32 = 25;

/// Argument used to probe that the tool is installed and runnable.
const VERSION_ARG: &str = "--version";

/// Settled result of one external sync invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncOutcome {
    /// The tool exited within the accepted exit code set.
    Completed { exit_code: i32, recovered: bool },
    /// Unrecognized exit code, missing exit status, or spawn failure, with
    /// the captured output attached for diagnostics.
    Failed {
        exit_code: Option<i32>,
        output: String,
    },
}

/// Owner of the lifecycle of external sync invocations.
///
/// At most one child process is live at a time: the orchestrator driver is
/// strictly sequential, and a new spawn only happens once the previous
/// invocation has fully settled.
#[derive(Debug, Clone)]
pub struct ProcessController {
    tool: SyncToolConfig,
}

impl ProcessController {
    pub fn new(tool: SyncToolConfig) -> Self {
        Self { tool }
    }

    pub fn tool(&self) -> &SyncToolConfig {
        &self.tool
    }

    /// Checks that the external tool is installed and runnable.
    ///
    /// Returns the version string the tool reports.
    pub async fn probe_version(&self) -> SyncResult<String> {
        let output = Command::new(&self.tool.path)
            .arg(VERSION_ARG)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|err| {
                sync_error!(
                    ErrorKind::ToolUnavailable,
                    "Sync tool not found",
                    format!(
                        "running `{} {VERSION_ARG}` failed: {err}; install the sync tool and make sure it is on PATH",
                        self.tool.path
                    )
                )
            })?;

        if !output.status.success() {
            bail!(
                ErrorKind::ToolUnavailable,
                "Sync tool version probe failed",
                format!("`{} {VERSION_ARG}` exited with {}", self.tool.path, output.status)
            );
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    /// Spawns the sync process for one table.
    ///
    /// Both output streams get a dedicated per-line read loop that classifies
    /// each line and forwards the resulting events; raw lines are buffered so
    /// a failing exit can attach them for diagnostics.
    pub fn spawn_sync(
        &self,
        command: &SyncCommand,
        events: UnboundedSender<SyncEvent>,
    ) -> SyncResult<SyncProcess> {
        let mut child = Command::new(command.program())
            .args(command.args())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|err| {
                sync_error!(
                    ErrorKind::ProcessSpawnFailed,
                    "Failed to spawn sync tool",
                    format!("`{}` could not be started: {err}", command.program())
                )
            })?;

        let stdout_task = spawn_line_reader(child.stdout.take(), events.clone(), classify_stdout_line);
        let stderr_task = spawn_line_reader(child.stderr.take(), events, classify_stderr_line);

        Ok(SyncProcess {
            child,
            grace: Duration::from_secs(self.tool.termination_grace_secs),
            stdout_task,
            stderr_task,
        })
    }
}

/// One live invocation of the external tool.
///
/// Exists only between spawn and settlement, which keeps the
/// one-process-at-a-time ownership structural rather than checked.
#[derive(Debug)]
pub struct SyncProcess {
    child: Child,
    grace: Duration,
    stdout_task: JoinHandle<Vec<String>>,
    stderr_task: JoinHandle<Vec<String>>,
}

impl SyncProcess {
    /// Waits for the invocation to settle, reacting to a stop signal.
    ///
    /// On stop the child first receives a graceful termination request and
    /// is force-killed only after the grace period; either way the
    /// invocation reaches a terminal outcome.
    pub async fn complete(mut self, stop_rx: &mut StopRx) -> SyncOutcome {
        let status = tokio::select! {
            biased;
            _ = stop_rx.changed() => None,
            status = self.child.wait() => Some(status),
        };

        let status = match status {
            Some(status) => status,
            None => self.terminate().await,
        };

        let stdout_lines = self.stdout_task.await.unwrap_or_default();
        let stderr_lines = self.stderr_task.await.unwrap_or_default();

        settle(status, stdout_lines, stderr_lines)
    }

    /// Graceful termination: SIGTERM, the configured grace period, SIGKILL.
    async fn terminate(&mut self) -> io::Result<ExitStatus> {
        if let Some(pid) = self.child.id() {
            debug!("sending SIGTERM to sync process {}", pid);
            let _ = signal::kill(Pid::from_raw(pid as i32), Signal::SIGTERM);
        }

        match tokio::time::timeout(self.grace, self.child.wait()).await {
            Ok(status) => status,
            Err(_) => {
                warn!("sync process did not exit within the grace period, killing it");
                let _ = self.child.start_kill();
                self.child.wait().await
            }
        }
    }
}

fn spawn_line_reader<R>(
    stream: Option<R>,
    events: UnboundedSender<SyncEvent>,
    classify: fn(&str) -> Vec<SyncEvent>,
) -> JoinHandle<Vec<String>>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let Some(stream) = stream else {
            return Vec::new();
        };

        let mut lines = BufReader::new(stream).lines();
        let mut buffered = Vec::new();
        while let Ok(Some(line)) = lines.next_line().await {
            for event in classify(&line) {
                // A closed receiver only means the applier is gone; keep
                // draining so the child never blocks on a full pipe.
                let _ = events.send(event);
            }
            buffered.push(line);
        }

        buffered
    })
}

/// Classifies the exit status into the final per-table outcome.
fn settle(
    status: io::Result<ExitStatus>,
    stdout_lines: Vec<String>,
    stderr_lines: Vec<String>,
) -> SyncOutcome {
    match status {
        Ok(status) => match status.code() {
            Some(code) if SUCCESS_EXIT_CODES.contains(&code) => SyncOutcome::Completed {
                exit_code: code,
                recovered: code == RECOVERED_EXIT_CODE,
            },
            code => SyncOutcome::Failed {
                exit_code: code,
                output: join_output(stdout_lines, stderr_lines),
            },
        },
        Err(err) => SyncOutcome::Failed {
            exit_code: None,
            output: err.to_string(),
        },
    }
}

fn join_output(stdout_lines: Vec<String>, stderr_lines: Vec<String>) -> String {
    let mut output = stdout_lines.join("\n");
    if !stderr_lines.is_empty() {
        if !output.is_empty() {
            output.push('\n');
        }
        output.push_str(&stderr_lines.join("\n"));
    }
    output
}
