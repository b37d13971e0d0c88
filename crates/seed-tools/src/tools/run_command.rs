//! `runCommand` — foreground or background shell execution, grounded on
//! the teacher's exec/process tool pair: a foreground wait races a yield
//! deadline, and anything still running when the deadline fires is hand
//! off to the process tracker instead of blocking the caller.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use seed_domain::error::{Error, Result};
use seed_domain::tool::RiskLevel;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::{mpsc, Notify};

use crate::process_tracker::{OutputBuffer, ProcessSession, ProcessStatus, ProcessTracker};
use crate::registry::{Tool, ToolContext};

const DEFAULT_OUTPUT_BYTE_CAP: usize = 64 * 1024;
const DEFAULT_YIELD_MS: u64 = 3000;
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Sends SIGTERM to the child's pid. No SIGKILL fallback: a child that
/// ignores SIGTERM just keeps running under the process tracker.
fn terminate(pid: u32) {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;
    let _ = kill(Pid::from_raw(pid as i32), Signal::SIGTERM);
}

#[derive(Debug, Deserialize)]
struct Args {
    command: String,
    #[serde(default)]
    timeout: Option<u64>,
    #[serde(default)]
    cwd: Option<String>,
    #[serde(default, rename = "isBackground")]
    is_background: bool,
}

#[derive(Debug, Serialize)]
struct ForegroundOutcome {
    #[serde(rename = "exitCode")]
    exit_code: Option<i32>,
    stdout: String,
    stderr: String,
}

pub struct RunCommandTool {
    output_byte_cap: usize,
    yield_ms: u64,
    default_timeout_secs: u64,
}

impl RunCommandTool {
    pub fn new() -> Self {
        Self {
            output_byte_cap: DEFAULT_OUTPUT_BYTE_CAP,
            yield_ms: DEFAULT_YIELD_MS,
            default_timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }

    pub fn with_config(output_byte_cap: usize, yield_ms: u64, default_timeout_secs: u64) -> Self {
        Self {
            output_byte_cap,
            yield_ms,
            default_timeout_secs,
        }
    }
}

impl Default for RunCommandTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for RunCommandTool {
    fn name(&self) -> &str {
        "runCommand"
    }

    fn description(&self) -> &str {
        "Run a shell command, foreground or background, inside the task's workspace."
    }

    fn parameters(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "command": {"type": "string"},
                "timeout": {"type": "integer"},
                "cwd": {"type": "string"},
                "isBackground": {"type": "boolean"}
            },
            "required": ["command"]
        })
    }

    fn risk_level(&self) -> RiskLevel {
        RiskLevel::Risky
    }

    async fn execute(&self, args: serde_json::Value, ctx: &ToolContext) -> Result<serde_json::Value> {
        let args: Args = serde_json::from_value(args).map_err(Error::Json)?;
        let timeout_secs = args.timeout.unwrap_or(self.default_timeout_secs);

        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(&args.command);
        cmd.stdout(std::process::Stdio::piped());
        cmd.stderr(std::process::Stdio::piped());
        cmd.stdin(std::process::Stdio::null());

        if let Some(ref cwd) = args.cwd {
            let resolved = ctx.resolver.resolve(&ctx.task_id, cwd)?;
            cmd.current_dir(resolved.absolute_path);
        } else {
            let root = ctx.resolver.resolve(&ctx.task_id, ".")?;
            ctx.resolver.ensure_root(&root)?;
            cmd.current_dir(root.absolute_path);
        }

        let mut child = cmd.spawn().map_err(|e| Error::Other(format!("failed to spawn command: {e}")))?;
        let pid = child.id().unwrap_or(0);
        let key = ProcessTracker::key_for(&ctx.task_id, pid);

        let (kill_tx, mut kill_rx) = mpsc::channel::<()>(1);
        let session = ProcessSession {
            key: key.clone(),
            task_id: ctx.task_id.clone(),
            pid: Some(pid),
            command: args.command.clone(),
            started_at: Utc::now(),
            finished_at: None,
            status: ProcessStatus::Running,
            exit_code: None,
            output: OutputBuffer::new(self.output_byte_cap),
            kill_tx: Some(kill_tx),
        };
        let session_arc = ctx.processes.register(session);

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let done = Arc::new(Notify::new());
        let done_clone = done.clone();
        let session_for_monitor = session_arc.clone();
        let cancel = ctx.cancel.clone();
        let timeout_dur = std::time::Duration::from_secs(timeout_secs);
        let key_for_monitor = key.clone();

        tokio::spawn(async move {
            let out_session = session_for_monitor.clone();
            let stdout_task = tokio::spawn(async move {
                if let Some(stdout) = stdout {
                    let mut lines = BufReader::new(stdout).lines();
                    while let Ok(Some(line)) = lines.next_line().await {
                        let mut s = out_session.write();
                        s.output.push(&line);
                        s.output.push("\n");
                    }
                }
            });
            let err_session = session_for_monitor.clone();
            let stderr_task = tokio::spawn(async move {
                if let Some(stderr) = stderr {
                    let mut lines = BufReader::new(stderr).lines();
                    while let Ok(Some(line)) = lines.next_line().await {
                        let mut s = err_session.write();
                        s.output.push(&line);
                        s.output.push("\n");
                    }
                }
            });

            let final_status;
            tokio::select! {
                result = child.wait() => {
                    let _ = stdout_task.await;
                    let _ = stderr_task.await;
                    let mut s = session_for_monitor.write();
                    match result {
                        Ok(exit) => {
                            s.exit_code = exit.code();
                            s.status = ProcessStatus::Finished;
                        }
                        Err(_) => {
                            s.status = ProcessStatus::Failed;
                        }
                    }
                    s.finished_at = Some(Utc::now());
                    s.kill_tx = None;
                    final_status = s.status;
                }
                _ = kill_rx.recv() => {
                    terminate(pid);
                    let _ = child.wait().await;
                    let _ = stdout_task.await;
                    let _ = stderr_task.await;
                    let mut s = session_for_monitor.write();
                    s.output.push("\n[killed]");
                    s.status = ProcessStatus::Killed;
                    s.finished_at = Some(Utc::now());
                    s.kill_tx = None;
                    final_status = s.status;
                }
                _ = cancel.cancelled() => {
                    terminate(pid);
                    let _ = child.wait().await;
                    let _ = stdout_task.await;
                    let _ = stderr_task.await;
                    let mut s = session_for_monitor.write();
                    s.output.push("\n[aborted]");
                    s.status = ProcessStatus::Killed;
                    s.finished_at = Some(Utc::now());
                    s.kill_tx = None;
                    final_status = s.status;
                }
                _ = tokio::time::sleep(timeout_dur) => {
                    terminate(pid);
                    let _ = child.wait().await;
                    let _ = stdout_task.await;
                    let _ = stderr_task.await;
                    let mut s = session_for_monitor.write();
                    s.output.push("\n[timed out]");
                    s.status = ProcessStatus::TimedOut;
                    s.finished_at = Some(Utc::now());
                    s.kill_tx = None;
                    final_status = s.status;
                }
            }
            tracing::debug!(key = %key_for_monitor, status = ?final_status, "runCommand process finished");
            done_clone.notify_waiters();
        });

        if args.is_background {
            return Ok(serde_json::json!({
                "isBackground": true,
                "key": key,
                "pid": pid,
            }));
        }

        if ctx.cancel.is_cancelled() {
            return Err(Error::Aborted("task canceled before command completed".into()));
        }

        tokio::select! {
            _ = done.notified() => {
                let s = session_arc.read();
                if s.status == ProcessStatus::Killed && ctx.cancel.is_cancelled() {
                    return Err(Error::Aborted("command aborted".into()));
                }
                Ok(serde_json::to_value(ForegroundOutcome {
                    exit_code: s.exit_code,
                    stdout: s.output.render(),
                    stderr: String::new(),
                })?)
            }
            _ = tokio::time::sleep(std::time::Duration::from_millis(self.yield_ms)) => {
                Ok(serde_json::json!({
                    "isBackground": true,
                    "key": key,
                    "pid": pid,
                    "tail": session_arc.read().output.tail(20),
                }))
            }
        }
    }
}
