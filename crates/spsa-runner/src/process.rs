//! Child-process execution with an optional wall-clock limit.
//!
//! Commands run on a current-thread tokio runtime so callers stay
//! synchronous. Children are killed when their wait is dropped, which
//! includes an expired timeout.

use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;
use tokio::time::timeout;

#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("failed to start async runtime: {0}")]
    Runtime(#[source] std::io::Error),

    #[error("failed to launch: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("failed while waiting: {0}")]
    Wait(#[source] std::io::Error),

    #[error("timed out after {0} seconds")]
    TimedOut(u64),
}

/// Captured result of a finished child process.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status.success()
    }
}

/// Renders a command line for log and error messages.
pub fn describe(program: &str, args: &[String]) -> String {
    std::iter::once(program)
        .chain(args.iter().map(String::as_str))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Runs `command` to completion, capturing stdout and stderr. When `limit`
/// expires the child is killed.
pub fn run_captured(command: &mut Command, limit: Option<Duration>) -> Result<CommandOutput, ProcessError> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(ProcessError::Runtime)?;
    runtime.block_on(run_async(command, limit))
}

async fn run_async(command: &mut Command, limit: Option<Duration>) -> Result<CommandOutput, ProcessError> {
    let child = command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(ProcessError::Spawn)?;

    let wait = child.wait_with_output();
    let output = match limit {
        Some(limit) => timeout(limit, wait)
            .await
            .map_err(|_| ProcessError::TimedOut(limit.as_secs()))?,
        None => wait.await,
    }
    .map_err(ProcessError::Wait)?;

    Ok(CommandOutput {
        status: output.status,
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    })
}
