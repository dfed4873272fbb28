//! Container run task.

use std::path::PathBuf;
use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::engine::ContainerRuntime;
use crate::error::{RunnerError, RunnerResult};
use crate::exec::CommandLine;
use crate::project::Project;

use super::{check_availability, Task, TaskContext, TaskKind, TaskOutcome, TaskState};

/// Host port published to a container port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortMapping {
    pub host: u16,
    pub container: u16,
}

/// Run configuration. Environment and ports keep insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSpec {
    /// Image reference to run
    #[serde(default)]
    pub image: String,
    /// `-e KEY=VALUE` pairs
    #[serde(default)]
    pub environment: Vec<(String, String)>,
    /// `-p HOST:CONTAINER` pairs, unique by host port
    #[serde(default)]
    pub ports: Vec<PortMapping>,
    /// Extra engine arguments placed before the image
    #[serde(default)]
    pub args: Vec<String>,
    /// Explicit `--name`. Blank counts as unset.
    #[serde(default)]
    pub container_name: Option<String>,
}

/// `Some(name)` unless `name` is blank.
pub(crate) fn non_blank(name: Option<String>) -> Option<String> {
    name.filter(|n| !n.trim().is_empty())
}

impl RunSpec {
    pub fn new(image: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            ..Self::default()
        }
    }

    /// Insert or replace an environment entry, keeping its original position.
    pub fn set_env(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.environment.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.environment.push((key, value)),
        }
    }

    /// Publish `host` to `container`, replacing an existing mapping for `host`.
    pub fn add_port(&mut self, host: u16, container: u16) {
        match self.ports.iter_mut().find(|p| p.host == host) {
            Some(mapping) => mapping.container = container,
            None => self.ports.push(PortMapping { host, container }),
        }
    }

    /// The explicit container name, if one is set and not blank.
    pub fn explicit_name(&self) -> Option<&str> {
        self.container_name
            .as_deref()
            .filter(|name| !name.trim().is_empty())
    }

    /// Remove the mapping for `host`, returning its container port.
    pub fn remove_port(&mut self, host: u16) -> Option<u16> {
        let index = self.ports.iter().position(|p| p.host == host)?;
        Some(self.ports.remove(index).container)
    }

    /// `<engine> run --rm [-e K=V]* [-p H:C]* [--name N] <args>* <image>`
    pub fn run_args(&self, program: &str) -> Vec<String> {
        // --rm removes the container once it is stopped
        let mut args = vec![program.to_string(), "run".to_string(), "--rm".to_string()];

        for (key, value) in &self.environment {
            args.push("-e".to_string());
            args.push(format!("{}={}", key, value));
        }

        for port in &self.ports {
            args.push("-p".to_string());
            args.push(format!("{}:{}", port.host, port.container));
        }

        if let Some(name) = self.explicit_name() {
            args.push("--name".to_string());
            args.push(name.to_string());
        }

        args.extend(self.args.iter().cloned());
        args.push(self.image.clone());
        args
    }

    pub fn run_command(&self, program: &str, working_dir: impl Into<PathBuf>) -> CommandLine {
        CommandLine::new(self.run_args(program), working_dir).capture()
    }
}

/// First line of `stdout`, trimmed, if it is not blank.
pub fn parse_container_id(stdout: &str) -> Option<String> {
    stdout
        .lines()
        .next()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
}

/// Read-only view of a run task's resolved container name.
#[cfg_attr(test, mockall::automock)]
pub trait ContainerNameSource: Send + Sync {
    /// Name of the run task that owns the container.
    fn task_name(&self) -> String;

    /// The container name, once the run task has executed.
    fn container_name(&self) -> Option<String>;
}

/// Shared handle to a run task's container name.
///
/// The run task fills it exactly once; clones only ever read it.
#[derive(Debug, Clone)]
pub struct ContainerHandle {
    task: String,
    name: Arc<OnceLock<String>>,
}

impl ContainerHandle {
    fn new(task: impl Into<String>) -> Self {
        Self {
            task: task.into(),
            name: Arc::new(OnceLock::new()),
        }
    }

    fn resolve(&self, name: String) -> RunnerResult<()> {
        self.name
            .set(name)
            .map_err(|_| RunnerError::AlreadyExecuted(self.task.clone()))
    }
}

impl ContainerNameSource for ContainerHandle {
    fn task_name(&self) -> String {
        self.task.clone()
    }

    fn container_name(&self) -> Option<String> {
        self.name.get().cloned()
    }
}

/// Starts a container and records its identifier.
#[derive(Debug, Clone)]
pub struct RunTask {
    name: String,
    spec: RunSpec,
    ignore_availability: bool,
    state: TaskState,
    handle: ContainerHandle,
}

impl RunTask {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            handle: ContainerHandle::new(name.clone()),
            name,
            spec: RunSpec::default(),
            ignore_availability: false,
            state: TaskState::Unconfigured,
        }
    }

    /// Create a task from a ready-made spec.
    pub fn from_spec(name: impl Into<String>, spec: RunSpec) -> Self {
        let mut task = Self::new(name);
        task.spec = spec;
        task.state.configure();
        task
    }

    pub fn image(mut self, image: impl Into<String>) -> Self {
        self.spec.image = image.into();
        self.state.configure();
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.spec.set_env(key, value);
        self.state.configure();
        self
    }

    /// Replace the extra arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.spec.args = args.into_iter().map(Into::into).collect();
        self.state.configure();
        self
    }

    pub fn add_port(mut self, host: u16, container: u16) -> Self {
        self.spec.add_port(host, container);
        self.state.configure();
        self
    }

    pub fn remove_port(mut self, host: u16) -> Self {
        self.spec.remove_port(host);
        self.state.configure();
        self
    }

    /// Explicit container name. A blank name leaves the engine to pick one.
    pub fn container_name(mut self, name: impl Into<String>) -> Self {
        self.spec.container_name = non_blank(Some(name.into()));
        self.state.configure();
        self
    }

    pub fn ignore_availability(mut self, ignore: bool) -> Self {
        self.ignore_availability = ignore;
        self.state.configure();
        self
    }

    pub fn spec(&self) -> &RunSpec {
        &self.spec
    }

    /// The container name resolved by `execute`, if it has run.
    pub fn resolved_container_name(&self) -> Option<String> {
        self.handle.container_name()
    }

    /// A read-only handle for stop tasks.
    pub fn handle(&self) -> ContainerHandle {
        self.handle.clone()
    }

    pub fn port_mappings(&self) -> &[PortMapping] {
        &self.spec.ports
    }

    /// Host ports published by this container, in configuration order.
    pub fn published_ports(&self) -> Vec<u16> {
        self.spec.ports.iter().map(|p| p.host).collect()
    }

    /// The first published host port. Ambiguous when several are mapped.
    pub fn first_published_port(&self) -> Option<u16> {
        self.spec.ports.first().map(|p| p.host)
    }

    fn validate(&self) -> RunnerResult<()> {
        if self.spec.image.trim().is_empty() {
            return Err(RunnerError::invalid(&self.name, "image is required"));
        }
        Ok(())
    }
}

#[async_trait]
impl Task for RunTask {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> TaskKind {
        TaskKind::Run
    }

    fn state(&self) -> TaskState {
        self.state
    }

    fn plan(&self, project: &Project, runtime: ContainerRuntime) -> RunnerResult<Vec<CommandLine>> {
        self.validate()?;
        Ok(vec![self.spec.run_command(runtime.command(), project.root.clone())])
    }

    async fn execute(&mut self, ctx: &TaskContext) -> RunnerResult<TaskOutcome> {
        self.validate()?;
        self.state.begin_execution(&self.name)?;
        if !check_availability(&self.name, &ctx.engine, self.ignore_availability)? {
            return Ok(TaskOutcome::Skipped);
        }

        let cmd = self
            .spec
            .run_command(ctx.engine.program(), ctx.project.root.clone());
        info!("Execute command: {}", cmd.display());

        let output = ctx.executor.execute(&cmd).await?;

        let container = match self.spec.explicit_name() {
            Some(name) => name.to_string(),
            None => parse_container_id(&output.stdout)
                .ok_or_else(|| RunnerError::OutputParse(cmd.display()))?,
        };
        self.handle.resolve(container.clone())?;

        info!("Started container {}", container);
        Ok(TaskOutcome::Executed)
    }
}
