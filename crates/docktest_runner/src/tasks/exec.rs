//! Plain command task, typically the test suite run between start and stop.

use std::path::PathBuf;

use async_trait::async_trait;
use tracing::info;

use crate::engine::ContainerRuntime;
use crate::error::{RunnerError, RunnerResult};
use crate::exec::CommandLine;
use crate::project::Project;

use super::{Task, TaskContext, TaskKind, TaskOutcome, TaskState};

/// Runs an arbitrary command. Does not need the container engine.
#[derive(Debug, Clone)]
pub struct ExecTask {
    name: String,
    command: Vec<String>,
    directory: Option<PathBuf>,
    state: TaskState,
}

impl ExecTask {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            command: Vec::new(),
            directory: None,
            state: TaskState::Unconfigured,
        }
    }

    pub fn command<I, S>(mut self, command: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.command = command.into_iter().map(Into::into).collect();
        self.state.configure();
        self
    }

    pub fn directory(mut self, directory: impl Into<PathBuf>) -> Self {
        self.directory = Some(directory.into());
        self.state.configure();
        self
    }

    fn command_line(&self, project: &Project) -> RunnerResult<CommandLine> {
        if self.command.is_empty() {
            return Err(RunnerError::invalid(&self.name, "command is required"));
        }
        let dir = match &self.directory {
            Some(dir) => project.resolve(dir),
            None => project.root.clone(),
        };
        Ok(CommandLine::new(self.command.clone(), dir))
    }
}

#[async_trait]
impl Task for ExecTask {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> TaskKind {
        TaskKind::Exec
    }

    fn state(&self) -> TaskState {
        self.state
    }

    fn plan(&self, project: &Project, _runtime: ContainerRuntime) -> RunnerResult<Vec<CommandLine>> {
        Ok(vec![self.command_line(project)?])
    }

    async fn execute(&mut self, ctx: &TaskContext) -> RunnerResult<TaskOutcome> {
        let cmd = self.command_line(&ctx.project)?;
        self.state.begin_execution(&self.name)?;

        info!("Running {}", cmd.display());
        let output = ctx.executor.execute(&cmd).await?;
        info!("Task {} finished in {}ms", self.name, output.duration_ms);
        Ok(TaskOutcome::Executed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_resolves_directory() {
        let task = ExecTask::new("integrationTest")
            .command(["cargo", "test", "--test", "redis"])
            .directory("service");
        let plan = task
            .plan(&Project::new("app", "1").root("/work"), ContainerRuntime::Docker)
            .unwrap();

        assert_eq!(plan[0].display(), "cargo test --test redis");
        assert_eq!(plan[0].working_dir, PathBuf::from("/work/service"));
    }

    #[test]
    fn test_empty_command_rejected() {
        let task = ExecTask::new("t");
        assert!(task
            .plan(&Project::new("app", "1"), ContainerRuntime::Docker)
            .is_err());
    }
}
