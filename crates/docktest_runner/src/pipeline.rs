//! Sequential task pipeline.
//!
//! Holds a set of named tasks with their dependencies, orders them
//! topologically (stable by declaration order), probes the engine once and
//! executes the selected tasks one after another.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info};

use crate::config::{PipelineConfig, TaskAction, TaskConfig};
use crate::engine::{ContainerRuntime, EngineStatus};
use crate::error::{RunnerError, RunnerResult};
use crate::exec::ProcessExecutor;
use crate::project::Project;
use crate::tasks::{
    BuildTask, ContainerHandle, ExecTask, RunTask, StopTask, Task, TaskContext, TaskKind,
    TaskOutcome,
};

struct Entry {
    task: Box<dyn Task>,
    depends_on: Vec<String>,
}

/// A command a task would run.
#[derive(Debug, Clone, Serialize)]
pub struct PlannedCommand {
    pub command: String,
    pub working_dir: PathBuf,
}

/// The commands of one task, in execution order.
#[derive(Debug, Clone, Serialize)]
pub struct PlannedTask {
    pub name: String,
    pub kind: TaskKind,
    pub commands: Vec<PlannedCommand>,
}

/// Result of one executed task.
#[derive(Debug, Clone, Serialize)]
pub struct TaskReport {
    pub name: String,
    pub kind: TaskKind,
    pub outcome: TaskOutcome,
    pub duration_ms: u64,
}

/// Result of a full pipeline run.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    pub engine: EngineStatus,
    pub tasks: Vec<TaskReport>,
}

impl PipelineReport {
    pub fn skipped(&self) -> Vec<&str> {
        self.tasks
            .iter()
            .filter(|t| t.outcome == TaskOutcome::Skipped)
            .map(|t| t.name.as_str())
            .collect()
    }
}

/// Ordered collection of tasks sharing one project and engine.
pub struct Pipeline {
    project: Project,
    runtime: ContainerRuntime,
    entries: Vec<Entry>,
}

impl Pipeline {
    pub fn new(project: Project, runtime: ContainerRuntime) -> Self {
        Self {
            project,
            runtime,
            entries: Vec::new(),
        }
    }

    /// Build a pipeline from a parsed configuration file.
    pub fn from_config(config: &PipelineConfig) -> RunnerResult<Self> {
        let mut pipeline = Self::new(config.project.clone(), config.engine);

        // run tasks come first so stop tasks can reference their handles
        let mut run_tasks: HashMap<&str, RunTask> = HashMap::new();
        for task in &config.tasks {
            if let TaskAction::Run(run) = &task.action {
                let spec = run.to_spec(&task.name)?;
                let run_task = RunTask::from_spec(&task.name, spec)
                    .ignore_availability(task.ignore_availability);
                if run_tasks.insert(task.name.as_str(), run_task).is_some() {
                    return Err(RunnerError::DuplicateTask(task.name.clone()));
                }
            }
        }
        let handles: HashMap<&str, ContainerHandle> = run_tasks
            .iter()
            .map(|(name, task)| (*name, task.handle()))
            .collect();

        for task in &config.tasks {
            let deps = task.depends_on.clone();
            match &task.action {
                TaskAction::Build(spec) => pipeline.add_task(
                    BuildTask::from_spec(&task.name, spec.clone())
                        .ignore_availability(task.ignore_availability),
                    deps,
                )?,
                TaskAction::Run(_) => {
                    let run_task = run_tasks
                        .remove(task.name.as_str())
                        .ok_or_else(|| RunnerError::DuplicateTask(task.name.clone()))?;
                    pipeline.add_task(run_task, deps)?
                }
                TaskAction::Stop(stop) => {
                    let stop_task =
                        Self::stop_task(task, &stop.containers_from, &stop.containers, &handles)?;
                    pipeline.add_task(stop_task, deps)?
                }
                TaskAction::Exec(exec) => {
                    let mut exec_task = ExecTask::new(&task.name).command(exec.command.clone());
                    if let Some(dir) = &exec.directory {
                        exec_task = exec_task.directory(dir.clone());
                    }
                    pipeline.add_task(exec_task, deps)?
                }
            }
        }

        Ok(pipeline)
    }

    fn stop_task(
        task: &TaskConfig,
        containers_from: &[String],
        containers: &[String],
        handles: &HashMap<&str, ContainerHandle>,
    ) -> RunnerResult<StopTask> {
        let mut stop = StopTask::new(&task.name).ignore_availability(task.ignore_availability);
        for source in containers_from {
            let handle = handles.get(source.as_str()).ok_or_else(|| {
                RunnerError::invalid(&task.name, format!("{} is not a run task", source))
            })?;
            stop = stop.stop_container_from_source(Arc::new(handle.clone()));
        }
        for name in containers {
            stop = stop.stop_container_by_name(name.clone());
        }
        Ok(stop)
    }

    /// Register a task. Its implicit dependencies are added to `depends_on`.
    pub fn add_task(&mut self, task: impl Task + 'static, depends_on: Vec<String>) -> RunnerResult<()> {
        if self.position(task.name()).is_some() {
            return Err(RunnerError::DuplicateTask(task.name().to_string()));
        }

        let mut deps = depends_on;
        for implicit in task.implicit_dependencies() {
            if !deps.contains(&implicit) {
                deps.push(implicit);
            }
        }

        debug!("Registering task {} (depends on {:?})", task.name(), deps);
        self.entries.push(Entry {
            task: Box::new(task),
            depends_on: deps,
        });
        Ok(())
    }

    pub fn project(&self) -> &Project {
        &self.project
    }

    pub fn runtime(&self) -> ContainerRuntime {
        self.runtime
    }

    /// All task names in declaration order.
    pub fn task_names(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.task.name()).collect()
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.entries.iter().position(|e| e.task.name() == name)
    }

    /// Indices of the tasks to run for `targets` (all tasks when empty),
    /// dependencies first.
    pub fn execution_order(&self, targets: &[String]) -> RunnerResult<Vec<usize>> {
        let roots: Vec<usize> = if targets.is_empty() {
            (0..self.entries.len()).collect()
        } else {
            targets
                .iter()
                .map(|t| {
                    self.position(t)
                        .ok_or_else(|| RunnerError::UnknownTask(t.clone()))
                })
                .collect::<RunnerResult<_>>()?
        };

        let mut order = Vec::new();
        let mut done = HashSet::new();
        let mut visiting = HashSet::new();
        for root in roots {
            self.visit(root, &mut visiting, &mut done, &mut order)?;
        }
        Ok(order)
    }

    fn visit(
        &self,
        index: usize,
        visiting: &mut HashSet<usize>,
        done: &mut HashSet<usize>,
        order: &mut Vec<usize>,
    ) -> RunnerResult<()> {
        if done.contains(&index) {
            return Ok(());
        }
        let entry = &self.entries[index];
        if !visiting.insert(index) {
            return Err(RunnerError::DependencyCycle(entry.task.name().to_string()));
        }

        for dep in &entry.depends_on {
            let dep_index = self
                .position(dep)
                .ok_or_else(|| RunnerError::UnknownTask(dep.clone()))?;
            self.visit(dep_index, visiting, done, order)?;
        }

        visiting.remove(&index);
        done.insert(index);
        order.push(index);
        Ok(())
    }

    /// Commands the selected tasks would run, without running anything.
    pub fn plan(&self, targets: &[String]) -> RunnerResult<Vec<PlannedTask>> {
        self.execution_order(targets)?
            .into_iter()
            .map(|index| {
                let task = &self.entries[index].task;
                let commands = task
                    .plan(&self.project, self.runtime)?
                    .into_iter()
                    .map(|cmd| PlannedCommand {
                        command: cmd.display(),
                        working_dir: cmd.working_dir,
                    })
                    .collect();
                Ok::<_, RunnerError>(PlannedTask {
                    name: task.name().to_string(),
                    kind: task.kind(),
                    commands,
                })
            })
            .collect()
    }

    /// Probe the engine once, then execute the selected tasks in order.
    pub async fn run(
        &mut self,
        executor: Arc<dyn ProcessExecutor>,
        targets: &[String],
    ) -> RunnerResult<PipelineReport> {
        let engine = EngineStatus::probe(executor.as_ref(), self.runtime).await;
        self.run_with_status(executor, engine, targets).await
    }

    /// Execute the selected tasks against an already known engine status.
    pub async fn run_with_status(
        &mut self,
        executor: Arc<dyn ProcessExecutor>,
        engine: EngineStatus,
        targets: &[String],
    ) -> RunnerResult<PipelineReport> {
        let order = self.execution_order(targets)?;
        let ctx = TaskContext::new(self.project.clone(), engine, executor);
        let mut reports = Vec::with_capacity(order.len());

        for index in order {
            let task = &mut self.entries[index].task;
            let name = task.name().to_string();
            info!("> Task :{}", name);

            let started = std::time::Instant::now();
            let outcome = task
                .execute(&ctx)
                .await
                .map_err(|e| RunnerError::TaskFailed {
                    task: name.clone(),
                    source: Box::new(e),
                })?;

            reports.push(TaskReport {
                name,
                kind: task.kind(),
                outcome,
                duration_ms: started.elapsed().as_millis() as u64,
            });
        }

        Ok(PipelineReport {
            engine,
            tasks: reports,
        })
    }
}
