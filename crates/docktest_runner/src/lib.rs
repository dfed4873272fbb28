//! # docktest_runner
//!
//! Container build, run and stop tasks for test pipelines.
//!
//! Every task is a thin wrapper over one container engine CLI call. The
//! engine is probed once per pipeline run and the resulting
//! [`EngineStatus`] is passed to each task explicitly.
//!
//! # Features
//!
//! - **Build**: `docker build` with versioned and `latest` tags, optional `docker save`
//! - **Run**: `docker run --rm` with environment, ports and extra args; records the container id
//! - **Stop**: one batched `docker stop` for containers started by run tasks
//! - **Runtime Selection**: Docker or Podman binaries
//! - **Pipeline**: dependency-ordered execution driven by a YAML file
//! - **Mock Executor**: For testing without an installed engine
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use docktest_runner::{
//!     ContainerRuntime, EngineStatus, Project, RunTask, StopTask, SystemExecutor, Task,
//!     TaskContext,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let executor = Arc::new(SystemExecutor::new());
//!     let engine = EngineStatus::probe(executor.as_ref(), ContainerRuntime::Docker).await;
//!     let ctx = TaskContext::new(Project::new("app", "1.0"), engine, executor);
//!
//!     let mut redis = RunTask::new("startRedis")
//!         .image("redis")
//!         .add_port(6379, 6379)
//!         .args(["-d"]);
//!     let mut stop = StopTask::new("stopRedis").stop_container_from_task(&redis);
//!
//!     redis.execute(&ctx).await?;
//!     // ... run the tests against localhost:6379 ...
//!     stop.execute(&ctx).await?;
//!
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod exec;
pub mod mock;
pub mod pipeline;
pub mod ports;
pub mod project;
pub mod tasks;

pub use config::{PipelineConfig, TaskAction, TaskConfig, DEFAULT_CONFIG_FILE};
pub use engine::{probe, ContainerRuntime, EngineStatus};
pub use error::{RunnerError, RunnerResult};
pub use exec::{CommandLine, OutputMode, ProcessExecutor, ProcessOutput, SystemExecutor};
pub use mock::{CapturedCall, MockExecutor, MockResponse};
pub use pipeline::{Pipeline, PipelineReport, PlannedCommand, PlannedTask, TaskReport};
pub use ports::free_host_port;
pub use project::Project;
pub use tasks::{
    check_availability, parse_container_id, stop_command, BuildSpec, BuildTask, ContainerHandle,
    ContainerNameSource, ExecTask, PortMapping, RunSpec, RunTask, StopTask, Task, TaskContext,
    TaskKind, TaskOutcome, TaskState,
};
