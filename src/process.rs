//! External process invocation with optional hard timeouts.

use std::path::Path;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;

/// How an invocation ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandStatus {
    /// The process exited; `None` when it was terminated by a signal.
    Exited(Option<i32>),
    /// The timeout elapsed and the process was killed.
    TimedOut,
    /// The process could not be started.
    SpawnFailed(String),
}

/// Result of running an external command.
#[derive(Debug)]
pub struct CommandResult {
    pub status: CommandStatus,
    pub stdout: String,
    pub stderr: String,
    /// How long the command took to run in milliseconds.
    pub duration_ms: u64,
}

impl CommandResult {
    /// Whether the command exited with code 0.
    pub fn success(&self) -> bool {
        self.status == CommandStatus::Exited(Some(0))
    }

    pub fn timed_out(&self) -> bool {
        self.status == CommandStatus::TimedOut
    }

    /// stdout followed by stderr.
    pub fn combined_output(&self) -> String {
        format!("{}\n{}", self.stdout, self.stderr)
    }

    fn not_started(reason: String, start: Instant) -> Self {
        Self {
            status: CommandStatus::SpawnFailed(reason),
            stdout: String::new(),
            stderr: String::new(),
            duration_ms: start.elapsed().as_millis() as u64,
        }
    }
}

/// Run `command` (program followed by arguments) plus `extra_args` in `working_dir`.
///
/// Non-zero exit codes are reported in the result, never as errors. With a timeout the
/// child is killed once it expires.
pub async fn run_command(
    working_dir: &Path,
    command: &[String],
    extra_args: &[&str],
    timeout: Option<Duration>,
) -> CommandResult {
    let start = Instant::now();

    let Some((program, args)) = command.split_first() else {
        return CommandResult::not_started("empty command".to_string(), start);
    };

    tracing::debug!(
        "Running {} {} {} in {}",
        program,
        args.join(" "),
        extra_args.join(" "),
        working_dir.display()
    );

    let child = Command::new(program)
        .args(args)
        .args(extra_args)
        .current_dir(working_dir)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn();

    let child = match child {
        Ok(c) => c,
        Err(e) => {
            return CommandResult::not_started(format!("Failed to spawn {}: {}", program, e), start)
        }
    };

    let result = match timeout {
        Some(limit) => match tokio::time::timeout(limit, child.wait_with_output()).await {
            Ok(output) => Some(output),
            Err(_) => None,
        },
        None => Some(child.wait_with_output().await),
    };

    let duration_ms = start.elapsed().as_millis() as u64;

    match result {
        Some(Ok(output)) => CommandResult {
            status: CommandStatus::Exited(output.status.code()),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            duration_ms,
        },
        Some(Err(e)) => CommandResult {
            status: CommandStatus::SpawnFailed(format!("Failed to wait for {}: {}", program, e)),
            stdout: String::new(),
            stderr: String::new(),
            duration_ms,
        },
        None => CommandResult {
            status: CommandStatus::TimedOut,
            stdout: String::new(),
            stderr: format!(
                "Command timed out after {} seconds",
                timeout.map(|t| t.as_secs()).unwrap_or_default()
            ),
            duration_ms,
        },
    }
}
