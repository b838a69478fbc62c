// src/core/runner.rs

//! Process runner: executes one external tool with a timeout and classifies how it ended.
//!
//! Invocations are a program plus an argument vector, never a shell string, so a
//! user-supplied target can't smuggle extra commands in. On Unix every tool runs in
//! its own process group: a timed-out invocation gets SIGTERM across the group, then
//! SIGKILL, and a cancelled one gets both at once. Launchers such as `sudo -n` relay
//! the SIGTERM to the tool they started. The direct child is also spawned with
//! `kill_on_drop`, which is all there is on other platforms.

use std::fmt;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, instrument, warn};

use crate::core::error::ScanError;
use crate::core::models::DEFAULT_TOOL_TIMEOUT;

/// Exit status shells use for "command not found".
const EXIT_COMMAND_NOT_FOUND: i32 = 127;

/// Time a timed-out tool's process group gets between SIGTERM and SIGKILL.
const TERMINATION_GRACE: Duration = Duration::from_secs(3);

/// A single external command, owned by the runner for the duration of the call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolInvocation {
    program: String,
    args: Vec<String>,
    working_dir: Option<PathBuf>,
    timeout: Duration,
}

impl ToolInvocation {
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            working_dir: None,
            timeout: DEFAULT_TOOL_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn in_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Runs this invocation through a launcher such as `sudo -n` or `wsl -e`.
    pub fn wrapped_in(self, launcher: &str, launcher_args: &[&str]) -> Self {
        let mut args: Vec<String> = launcher_args.iter().map(|a| a.to_string()).collect();
        args.push(self.program);
        args.extend(self.args);
        Self {
            program: launcher.to_string(),
            args,
            working_dir: self.working_dir,
            timeout: self.timeout,
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    pub fn working_dir(&self) -> Option<&PathBuf> {
        self.working_dir.as_ref()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// The command line as it would be typed, used as the tool name in logs and errors.
    pub fn command_line(&self) -> String {
        let mut line = self.program.clone();
        for arg in &self.args {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }
}

impl fmt::Display for ToolInvocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.command_line())
    }
}

/// How an invocation ended. Produced once per invocation and consumed by its parser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolOutcome {
    Success(String),
    ToolMissing,
    Failed { exit_code: Option<i32>, stderr: String },
    TimedOut,
}

impl ToolOutcome {
    /// Maps the outcome onto the scan error taxonomy, keeping stdout on success.
    pub fn into_output(self, invocation: &ToolInvocation) -> Result<String, ScanError> {
        let tool = invocation.command_line();
        match self {
            Self::Success(stdout) => Ok(stdout),
            Self::ToolMissing => Err(ScanError::ToolUnavailable { tool }),
            Self::TimedOut => Err(ScanError::ToolTimedOut {
                tool,
                timeout: invocation.timeout(),
            }),
            Self::Failed { exit_code, stderr } => {
                let reason = match exit_code {
                    Some(code) if stderr.is_empty() => format!("exit code {code}"),
                    Some(code) => format!("exit code {code}: {stderr}"),
                    None => stderr,
                };
                Err(ScanError::ToolExecutionFailed { tool, reason })
            }
        }
    }
}

/// Anything that can execute a `ToolInvocation`.
///
/// Implementations never return an error: every failure mode is a `ToolOutcome`
/// variant so callers can apply one fallback policy.
#[async_trait]
pub trait ToolRunner: Send + Sync {
    async fn run(&self, invocation: &ToolInvocation) -> ToolOutcome;
}

/// Runs invocations as real child processes.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessRunner;

#[async_trait]
impl ToolRunner for ProcessRunner {
    #[instrument(skip(self, invocation), fields(tool = %invocation.program()))]
    async fn run(&self, invocation: &ToolInvocation) -> ToolOutcome {
        debug!(command = %invocation, timeout = ?invocation.timeout(), "Spawning tool.");

        let mut command = Command::new(invocation.program());
        command
            .args(invocation.args())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = invocation.working_dir() {
            command.current_dir(dir);
        }
        #[cfg(unix)]
        command.process_group(0);

        let child = match command.spawn() {
            Ok(child) => child,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(command = %invocation, "Tool binary not found.");
                return ToolOutcome::ToolMissing;
            }
            Err(e) => {
                warn!(command = %invocation, error = %e, "Failed to spawn tool.");
                return ToolOutcome::Failed {
                    exit_code: None,
                    stderr: e.to_string(),
                };
            }
        };

        let pid = child.id();
        let output = child.wait_with_output();
        tokio::pin!(output);
        // Declared after `output`, so on cancellation the group is signalled before
        // the direct child is dropped.
        let mut group = ProcessGroup::new(pid);

        let finished = tokio::select! {
            result = &mut output => Some(result),
            () = tokio::time::sleep(invocation.timeout()) => None,
        };

        let result = match finished {
            Some(result) => {
                group.disarm();
                result
            }
            None => {
                warn!(command = %invocation, timeout = ?invocation.timeout(), "Tool timed out, stopping it.");
                group.terminate();
                match tokio::time::timeout(TERMINATION_GRACE, &mut output).await {
                    Ok(_) => group.disarm(),
                    Err(_) => debug!(command = %invocation, "Tool ignored SIGTERM, killing it."),
                }
                return ToolOutcome::TimedOut;
            }
        };

        match result {
            Err(e) => {
                warn!(command = %invocation, error = %e, "Failed to collect tool output.");
                ToolOutcome::Failed {
                    exit_code: None,
                    stderr: e.to_string(),
                }
            }
            Ok(output) => {
                let exit_code = output.status.code();
                if output.status.success() {
                    debug!(command = %invocation, bytes = output.stdout.len(), "Tool finished.");
                    return ToolOutcome::Success(String::from_utf8_lossy(&output.stdout).into_owned());
                }
                if exit_code == Some(EXIT_COMMAND_NOT_FOUND) {
                    return ToolOutcome::ToolMissing;
                }
                let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
                debug!(command = %invocation, ?exit_code, "Tool exited with failure.");
                ToolOutcome::Failed { exit_code, stderr }
            }
        }
    }
}

/// The process group a spawned tool leads. Dropping it while armed sends SIGTERM and
/// SIGKILL to the whole group.
#[cfg(unix)]
struct ProcessGroup {
    pgid: Option<libc::pid_t>,
}

#[cfg(unix)]
impl ProcessGroup {
    fn new(pid: Option<u32>) -> Self {
        Self {
            pgid: pid
                .and_then(|pid| libc::pid_t::try_from(pid).ok())
                .filter(|pid| *pid > 0),
        }
    }

    fn terminate(&self) {
        self.signal(libc::SIGTERM);
    }

    /// The group has exited on its own; nothing left to signal.
    fn disarm(&mut self) {
        self.pgid = None;
    }

    fn signal(&self, signal: libc::c_int) {
        if let Some(pgid) = self.pgid {
            // SAFETY: kill(2) has no memory-safety preconditions; a negative pid
            // addresses the group this runner created with `process_group(0)`.
            unsafe {
                libc::kill(-pgid, signal);
            }
        }
    }
}

#[cfg(unix)]
impl Drop for ProcessGroup {
    fn drop(&mut self) {
        self.signal(libc::SIGTERM);
        self.signal(libc::SIGKILL);
    }
}

#[cfg(not(unix))]
struct ProcessGroup;

#[cfg(not(unix))]
impl ProcessGroup {
    fn new(_pid: Option<u32>) -> Self {
        Self
    }

    fn terminate(&self) {}

    fn disarm(&mut self) {}
}
