//! Mock process executor for testing.
//!
//! Provides a configurable implementation of the [`ProcessExecutor`] trait
//! for use in unit tests without requiring an installed container engine.

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;

use crate::error::{RunnerError, RunnerResult};
use crate::exec::{CommandLine, OutputMode, ProcessExecutor, ProcessOutput};

/// Predefined response for one process execution.
#[derive(Debug, Clone)]
pub struct MockResponse {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub duration_ms: u64,
}

impl MockResponse {
    pub fn success(stdout: impl Into<String>) -> Self {
        Self {
            exit_code: 0,
            stdout: stdout.into(),
            stderr: String::new(),
            duration_ms: 100,
        }
    }

    pub fn failure(exit_code: i32, stderr: impl Into<String>) -> Self {
        Self {
            exit_code,
            stdout: String::new(),
            stderr: stderr.into(),
            duration_ms: 100,
        }
    }

    pub fn with_duration(mut self, ms: u64) -> Self {
        self.duration_ms = ms;
        self
    }
}

/// Captured call information for verification.
#[derive(Debug, Clone)]
pub struct CapturedCall {
    pub args: Vec<String>,
    pub working_dir: PathBuf,
    pub output: OutputMode,
    pub ignore_exit_status: bool,
}

impl CapturedCall {
    /// The engine subcommand (`build`, `run`, ...), i.e. the second argument.
    pub fn subcommand(&self) -> Option<&str> {
        self.args.get(1).map(String::as_str)
    }
}

/// Mock executor for testing.
///
/// Records every command it is asked to run and answers with scripted
/// responses in order. Once the script is exhausted every call succeeds with
/// empty output.
#[derive(Clone, Default)]
pub struct MockExecutor {
    /// Scripted responses, consumed in order.
    responses: Arc<RwLock<Vec<MockResponse>>>,
    /// Index of next response to return.
    response_index: Arc<AtomicUsize>,
    /// Captured calls for verification.
    captured_calls: Arc<RwLock<Vec<CapturedCall>>>,
    /// Fail every call as if the binary were missing.
    spawn_failure: Arc<RwLock<bool>>,
}

impl MockExecutor {
    /// Create a new mock executor.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a response for the next unanswered call.
    pub fn add_response(self, response: MockResponse) -> Self {
        self.responses.write().push(response);
        self
    }

    /// Replace the scripted responses.
    pub fn with_responses(self, responses: Vec<MockResponse>) -> Self {
        *self.responses.write() = responses;
        self
    }

    /// Make every call fail to spawn.
    pub fn simulate_spawn_failure(self) -> Self {
        *self.spawn_failure.write() = true;
        self
    }

    /// Clear all captured calls.
    pub fn clear_calls(&self) {
        self.captured_calls.write().clear();
    }

    /// Get all captured calls.
    pub fn get_calls(&self) -> Vec<CapturedCall> {
        self.captured_calls.read().clone()
    }

    /// Get the number of calls made.
    pub fn call_count(&self) -> usize {
        self.captured_calls.read().len()
    }

    /// The argument lists of all captured calls, in order.
    pub fn commands(&self) -> Vec<Vec<String>> {
        self.captured_calls
            .read()
            .iter()
            .map(|c| c.args.clone())
            .collect()
    }

    /// Get calls for a specific engine subcommand.
    pub fn get_subcommand_calls(&self, subcommand: &str) -> Vec<CapturedCall> {
        self.captured_calls
            .read()
            .iter()
            .filter(|c| c.subcommand() == Some(subcommand))
            .cloned()
            .collect()
    }

    fn next_response(&self) -> MockResponse {
        let index = self.response_index.fetch_add(1, Ordering::SeqCst);
        self.responses
            .read()
            .get(index)
            .cloned()
            .unwrap_or_else(|| MockResponse::success(""))
    }
}

#[async_trait]
impl ProcessExecutor for MockExecutor {
    async fn execute(&self, command: &CommandLine) -> RunnerResult<ProcessOutput> {
        self.captured_calls.write().push(CapturedCall {
            args: command.args.clone(),
            working_dir: command.working_dir.clone(),
            output: command.output,
            ignore_exit_status: command.ignore_exit_status,
        });

        if *self.spawn_failure.read() {
            return Err(RunnerError::SpawnFailed {
                program: command.program().unwrap_or_default().to_string(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "mock: not found"),
            });
        }

        let response = self.next_response();

        if response.exit_code != 0 && !command.ignore_exit_status {
            return Err(RunnerError::ExecutionFailed {
                command: command.display(),
                exit_code: response.exit_code,
                stderr: response.stderr,
            });
        }

        let started_at = Utc::now();
        let finished_at = started_at + chrono::Duration::milliseconds(response.duration_ms as i64);

        Ok(ProcessOutput {
            exit_code: response.exit_code,
            stdout: response.stdout,
            stderr: response.stderr,
            started_at,
            finished_at,
            duration_ms: response.duration_ms,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cmd(args: &[&str]) -> CommandLine {
        CommandLine::new(args.iter().map(|s| s.to_string()).collect(), "/project")
    }

    #[tokio::test]
    async fn test_mock_executor_sequential_responses() {
        let executor = MockExecutor::new().with_responses(vec![
            MockResponse::success("first"),
            MockResponse::success("second"),
        ]);

        let r1 = executor.execute(&cmd(&["docker", "run", "a"])).await.unwrap();
        assert_eq!(r1.stdout, "first");

        let r2 = executor.execute(&cmd(&["docker", "run", "b"])).await.unwrap();
        assert_eq!(r2.stdout, "second");

        let r3 = executor.execute(&cmd(&["docker", "run", "c"])).await.unwrap();
        assert_eq!(r3.stdout, "");
        assert_eq!(executor.call_count(), 3);
    }

    #[tokio::test]
    async fn test_mock_executor_failure_respects_ignore_flag() {
        let executor = MockExecutor::new().with_responses(vec![
            MockResponse::failure(1, "no such container"),
            MockResponse::failure(1, "no such container"),
        ]);

        let strict = executor.execute(&cmd(&["docker", "stop", "x"])).await;
        assert!(matches!(strict, Err(RunnerError::ExecutionFailed { exit_code: 1, .. })));

        let lenient = executor
            .execute(&cmd(&["docker", "stop", "x"]).ignore_exit_status())
            .await
            .unwrap();
        assert_eq!(lenient.exit_code, 1);
    }

    #[tokio::test]
    async fn test_mock_executor_captures_calls() {
        let executor = MockExecutor::new();
        let _ = executor.execute(&cmd(&["docker", "build", "."]).capture()).await;

        let calls = executor.get_subcommand_calls("build");
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].working_dir, PathBuf::from("/project"));
        assert_eq!(calls[0].output, OutputMode::Capture);

        executor.clear_calls();
        assert_eq!(executor.call_count(), 0);
    }
}
