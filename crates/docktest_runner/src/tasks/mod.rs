//! Container tasks and the policy they share.
//!
//! # Task Lifecycle
//!
//! 1. **Unconfigured**: created by name with every setting at its default.
//! 2. **Configured**: at least one setter has been applied.
//! 3. **Executed**: `execute` has run once. A second call fails with
//!    [`RunnerError::AlreadyExecuted`].
//!
//! Every engine-backed task checks the [`EngineStatus`] before spawning
//! anything. An unavailable engine aborts the task unless the task opted
//! into `ignore_availability`, in which case it is skipped with a warning.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{error, warn};

use crate::engine::{ContainerRuntime, EngineStatus};
use crate::error::{RunnerError, RunnerResult};
use crate::exec::{CommandLine, ProcessExecutor};
use crate::project::Project;

pub mod build;
pub mod exec;
pub mod run;
pub mod stop;

pub use build::{BuildSpec, BuildTask};
pub use exec::ExecTask;
pub use run::{parse_container_id, ContainerHandle, ContainerNameSource, PortMapping, RunSpec, RunTask};
pub use stop::{stop_command, StopTask};

/// Lifecycle state of a task instance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    #[default]
    Unconfigured,
    Configured,
    Executed,
}

impl TaskState {
    /// Move to `Configured` unless already executed.
    pub(crate) fn configure(&mut self) {
        if *self == Self::Unconfigured {
            *self = Self::Configured;
        }
    }

    /// Enter `Executed`, failing if the task already ran.
    pub(crate) fn begin_execution(&mut self, task: &str) -> RunnerResult<()> {
        if *self == Self::Executed {
            return Err(RunnerError::AlreadyExecuted(task.to_string()));
        }
        *self = Self::Executed;
        Ok(())
    }
}

/// What a task action ended up doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskOutcome {
    /// The action ran its commands.
    Executed,
    /// The engine was unavailable and the task was told to ignore that.
    Skipped,
}

/// Kind of task, used for display and configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskKind {
    Build,
    Run,
    Stop,
    Exec,
}

impl std::fmt::Display for TaskKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Build => "build",
            Self::Run => "run",
            Self::Stop => "stop",
            Self::Exec => "exec",
        };
        write!(f, "{}", s)
    }
}

/// Everything a task action needs from its surroundings.
#[derive(Clone)]
pub struct TaskContext {
    pub project: Project,
    pub engine: EngineStatus,
    pub executor: Arc<dyn ProcessExecutor>,
}

impl TaskContext {
    pub fn new(project: Project, engine: EngineStatus, executor: Arc<dyn ProcessExecutor>) -> Self {
        Self {
            project,
            engine,
            executor,
        }
    }
}

/// A configurable, executable unit of work.
#[async_trait]
pub trait Task: Send + Sync {
    /// Unique task name.
    fn name(&self) -> &str;

    fn kind(&self) -> TaskKind;

    fn state(&self) -> TaskState;

    /// Tasks that must run first regardless of declared dependencies.
    fn implicit_dependencies(&self) -> Vec<String> {
        Vec::new()
    }

    /// The command lines `execute` would run, without running them.
    fn plan(&self, project: &Project, runtime: ContainerRuntime) -> RunnerResult<Vec<CommandLine>>;

    /// Run the task's action once.
    async fn execute(&mut self, ctx: &TaskContext) -> RunnerResult<TaskOutcome>;
}

/// Decide whether an engine-backed task may proceed.
///
/// Returns `Ok(true)` when the engine is available, `Ok(false)` when it is
/// not but `ignore_availability` is set, and
/// [`RunnerError::EngineUnavailable`] otherwise.
pub fn check_availability(
    task: &str,
    engine: &EngineStatus,
    ignore_availability: bool,
) -> RunnerResult<bool> {
    if engine.is_available() {
        return Ok(true);
    }

    if !ignore_availability {
        error!(
            "{} not available. Task {} can't be executed.",
            engine.runtime(),
            task
        );
        return Err(RunnerError::EngineUnavailable(format!(
            "{} service not available",
            engine.runtime()
        )));
    }

    warn!(
        "{} not available. {} execution skipped for task {}.",
        engine.runtime(),
        engine.runtime(),
        task
    );
    Ok(false)
}
