//! Container stop task.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::engine::ContainerRuntime;
use crate::error::RunnerResult;
use crate::exec::CommandLine;
use crate::project::Project;

use super::run::{ContainerNameSource, RunTask};
use super::{check_availability, Task, TaskContext, TaskKind, TaskOutcome, TaskState};

/// A container to stop, either by reference to a run task or by name.
#[derive(Clone)]
enum StopTarget {
    Task(Arc<dyn ContainerNameSource>),
    Name(String),
}

/// `<engine> stop <name>...`; the exit status is ignored.
pub fn stop_command(program: &str, names: &[String], working_dir: impl Into<PathBuf>) -> CommandLine {
    let mut args = vec![program.to_string(), "stop".to_string()];
    args.extend(names.iter().cloned());
    // stopping an already stopped container must not fail the task
    CommandLine::new(args, working_dir).capture().ignore_exit_status()
}

/// Stops every registered container with one batched command.
#[derive(Clone)]
pub struct StopTask {
    name: String,
    targets: Vec<StopTarget>,
    ignore_availability: bool,
    state: TaskState,
}

impl StopTask {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            targets: Vec::new(),
            ignore_availability: false,
            state: TaskState::Unconfigured,
        }
    }

    /// Stop the container started by `task`.
    pub fn stop_container_from_task(self, task: &RunTask) -> Self {
        self.stop_container_from_source(Arc::new(task.handle()))
    }

    pub fn stop_containers_from_tasks<'a>(self, tasks: impl IntoIterator<Item = &'a RunTask>) -> Self {
        tasks
            .into_iter()
            .fold(self, |stop, task| stop.stop_container_from_task(task))
    }

    pub fn stop_container_from_source(mut self, source: Arc<dyn ContainerNameSource>) -> Self {
        self.targets.push(StopTarget::Task(source));
        self.state.configure();
        self
    }

    pub fn stop_container_by_name(mut self, name: impl Into<String>) -> Self {
        self.targets.push(StopTarget::Name(name.into()));
        self.state.configure();
        self
    }

    pub fn ignore_availability(mut self, ignore: bool) -> Self {
        self.ignore_availability = ignore;
        self.state.configure();
        self
    }

    /// Number of registered containers.
    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    /// Names of the run tasks this task reads container names from.
    pub fn referenced_tasks(&self) -> Vec<String> {
        self.targets
            .iter()
            .filter_map(|t| match t {
                StopTarget::Task(source) => Some(source.task_name()),
                StopTarget::Name(_) => None,
            })
            .collect()
    }

    /// Container names as of now, in registration order.
    ///
    /// References whose run task has not resolved a name are skipped.
    pub fn resolved_names(&self) -> Vec<String> {
        self.targets
            .iter()
            .filter_map(|target| match target {
                StopTarget::Name(name) => Some(name.clone()),
                StopTarget::Task(source) => {
                    let name = source.container_name();
                    if name.is_none() {
                        warn!(
                            "Task {} has no container name yet, not stopping it",
                            source.task_name()
                        );
                    }
                    name
                }
            })
            .collect()
    }

    /// Names for display, with `<task>` for unresolved references.
    fn planned_names(&self) -> Vec<String> {
        self.targets
            .iter()
            .map(|target| match target {
                StopTarget::Name(name) => name.clone(),
                StopTarget::Task(source) => source
                    .container_name()
                    .unwrap_or_else(|| format!("<{}>", source.task_name())),
            })
            .collect()
    }
}

#[async_trait]
impl Task for StopTask {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> TaskKind {
        TaskKind::Stop
    }

    fn state(&self) -> TaskState {
        self.state
    }

    fn implicit_dependencies(&self) -> Vec<String> {
        self.referenced_tasks()
    }

    fn plan(&self, project: &Project, runtime: ContainerRuntime) -> RunnerResult<Vec<CommandLine>> {
        if self.targets.is_empty() {
            return Ok(Vec::new());
        }
        Ok(vec![stop_command(
            runtime.command(),
            &self.planned_names(),
            project.root.clone(),
        )])
    }

    async fn execute(&mut self, ctx: &TaskContext) -> RunnerResult<TaskOutcome> {
        self.state.begin_execution(&self.name)?;
        if !check_availability(&self.name, &ctx.engine, self.ignore_availability)? {
            return Ok(TaskOutcome::Skipped);
        }

        if self.targets.is_empty() {
            debug!("Task {} has no containers to stop", self.name);
            return Ok(TaskOutcome::Executed);
        }

        let names = self.resolved_names();
        if names.is_empty() {
            warn!("Task {}: no container names resolved, nothing to stop", self.name);
            return Ok(TaskOutcome::Executed);
        }

        let cmd = stop_command(ctx.engine.program(), &names, ctx.project.root.clone());
        info!("Stopping containers: {}", names.join(", "));
        debug!("Command: {}", cmd.display());

        let output = ctx.executor.execute(&cmd).await?;
        if !output.success() {
            warn!(
                "Stop exited with code {} (ignored): {}",
                output.exit_code,
                output.stderr.trim()
            );
        }

        Ok(TaskOutcome::Executed)
    }
}
