//! Process execution seam.
//!
//! Every task action ends in one or two calls to a [`ProcessExecutor`].
//! [`SystemExecutor`] spawns real child processes; tests substitute the
//! recording [`MockExecutor`](crate::mock::MockExecutor).

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tracing::{debug, error};

use crate::error::{RunnerError, RunnerResult};

/// What happens to the child's stdout/stderr.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputMode {
    /// Stream straight to the parent's terminal.
    Inherit,
    /// Collect into [`ProcessOutput`].
    Capture,
    /// Send to the null device.
    Discard,
}

/// A fully assembled command line plus how to run it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandLine {
    /// Program followed by its arguments.
    pub args: Vec<String>,
    /// Working directory for the child process.
    pub working_dir: PathBuf,
    /// How the child's stdout and stderr are handled.
    pub output: OutputMode,
    /// Treat any exit status as success.
    pub ignore_exit_status: bool,
}

impl CommandLine {
    pub fn new(args: Vec<String>, working_dir: impl Into<PathBuf>) -> Self {
        Self {
            args,
            working_dir: working_dir.into(),
            output: OutputMode::Inherit,
            ignore_exit_status: false,
        }
    }

    pub fn capture(mut self) -> Self {
        self.output = OutputMode::Capture;
        self
    }

    pub fn discard(mut self) -> Self {
        self.output = OutputMode::Discard;
        self
    }

    pub fn ignore_exit_status(mut self) -> Self {
        self.ignore_exit_status = true;
        self
    }

    /// The program (first element), if any.
    pub fn program(&self) -> Option<&str> {
        self.args.first().map(String::as_str)
    }

    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    /// Human-readable rendering used in logs and plans.
    pub fn display(&self) -> String {
        format_args_for_display(&self.args)
    }
}

/// Join arguments with spaces, single-quoting any that contain whitespace.
pub fn format_args_for_display(args: &[String]) -> String {
    args.iter()
        .map(|arg| {
            if arg.is_empty() || arg.chars().any(char::is_whitespace) {
                format!("'{}'", arg)
            } else {
                arg.clone()
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Result of a finished child process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessOutput {
    /// Exit code (-1 when terminated by a signal)
    pub exit_code: i32,
    /// Captured stdout (empty unless [`OutputMode::Capture`])
    pub stdout: String,
    /// Captured stderr (empty unless [`OutputMode::Capture`])
    pub stderr: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: u64,
}

impl ProcessOutput {
    /// Check if the process exited with code 0.
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Spawns a command and waits for it to exit.
#[async_trait]
pub trait ProcessExecutor: Send + Sync {
    /// Run `command` to completion.
    ///
    /// Implementations return [`RunnerError::ExecutionFailed`] for a non-zero
    /// exit unless `command.ignore_exit_status` is set.
    async fn execute(&self, command: &CommandLine) -> RunnerResult<ProcessOutput>;
}

/// Executor backed by real child processes.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemExecutor;

impl SystemExecutor {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ProcessExecutor for SystemExecutor {
    async fn execute(&self, command: &CommandLine) -> RunnerResult<ProcessOutput> {
        let (program, args) = command
            .args
            .split_first()
            .ok_or_else(|| RunnerError::invalid("exec", "empty command line"))?;

        let mut cmd = Command::new(program);
        cmd.args(args)
            .current_dir(&command.working_dir)
            .stdin(Stdio::null());

        match command.output {
            OutputMode::Inherit => {
                cmd.stdout(Stdio::inherit()).stderr(Stdio::inherit());
            }
            OutputMode::Capture => {
                cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
            }
            OutputMode::Discard => {
                cmd.stdout(Stdio::null()).stderr(Stdio::null());
            }
        }

        debug!(
            "Executing: {} (in {})",
            command.display(),
            command.working_dir.display()
        );

        let spawn_err = |e: std::io::Error| RunnerError::SpawnFailed {
            program: program.clone(),
            source: e,
        };

        let started_at = Utc::now();
        let (status, stdout, stderr) = if command.output == OutputMode::Capture {
            let output = cmd.output().await.map_err(spawn_err)?;
            (
                output.status,
                String::from_utf8_lossy(&output.stdout).to_string(),
                String::from_utf8_lossy(&output.stderr).to_string(),
            )
        } else {
            let status = cmd.status().await.map_err(spawn_err)?;
            (status, String::new(), String::new())
        };
        let finished_at = Utc::now();
        let duration_ms = (finished_at - started_at).num_milliseconds().max(0) as u64;

        let exit_code = status.code().unwrap_or(-1);

        if exit_code != 0 && !command.ignore_exit_status {
            error!(
                "Command failed with exit code {} after {}ms: {}",
                exit_code,
                duration_ms,
                command.display()
            );
            return Err(RunnerError::ExecutionFailed {
                command: command.display(),
                exit_code,
                stderr: stderr
                    .lines()
                    .last()
                    .unwrap_or("Unknown error")
                    .to_string(),
            });
        }

        debug!("Command exited with code {} in {}ms", exit_code, duration_ms);

        Ok(ProcessOutput {
            exit_code,
            stdout,
            stderr,
            started_at,
            finished_at,
            duration_ms,
        })
    }
}
