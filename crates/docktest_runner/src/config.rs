//! Pipeline configuration file.
//!
//! ```yaml
//! project:
//!   name: app
//!   version: "2.0"
//! engine: docker
//! tasks:
//!   - name: buildImage
//!     type: build
//!     repository: acme
//!     save_to: build/images
//!   - name: startRedis
//!     type: run
//!     image: redis
//!     ports:
//!       - { host: 6379, container: 6379 }
//!     args: ["-d"]
//!   - name: integrationTest
//!     type: exec
//!     command: [cargo, test]
//!     depends_on: [startRedis]
//!   - name: stopContainers
//!     type: stop
//!     containers_from: [startRedis]
//!     depends_on: [integrationTest]
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};
use tracing::debug;

use crate::engine::ContainerRuntime;
use crate::error::{RunnerError, RunnerResult};
use crate::ports::free_host_port;
use crate::project::Project;
use crate::tasks::run::non_blank;
use crate::tasks::{BuildSpec, RunSpec};

/// Default configuration file name.
pub const DEFAULT_CONFIG_FILE: &str = "docktest.yaml";

const MAX_PORT_ATTEMPTS: usize = 8;

/// Top-level pipeline file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub project: Project,
    #[serde(default)]
    pub engine: ContainerRuntime,
    #[serde(default)]
    pub tasks: Vec<TaskConfig>,
}

/// One task entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskConfig {
    pub name: String,
    #[serde(default)]
    pub depends_on: Vec<String>,
    /// Skip instead of failing when the engine is unavailable
    #[serde(default)]
    pub ignore_availability: bool,
    #[serde(flatten)]
    pub action: TaskAction,
}

/// Task type and its settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TaskAction {
    Build(BuildSpec),
    Run(RunConfig),
    Stop(StopConfig),
    Exec(ExecConfig),
}

/// A port mapping; an omitted host port is picked from the free ports.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PortConfig {
    #[serde(default)]
    pub host: Option<u16>,
    pub container: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    pub image: String,
    /// Ordered `KEY: value` entries
    #[serde(default)]
    pub environment: Mapping,
    #[serde(default)]
    pub ports: Vec<PortConfig>,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub container_name: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StopConfig {
    /// Run tasks whose containers are stopped
    #[serde(default)]
    pub containers_from: Vec<String>,
    /// Containers stopped by explicit name
    #[serde(default)]
    pub containers: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecConfig {
    pub command: Vec<String>,
    #[serde(default)]
    pub directory: Option<PathBuf>,
}

fn scalar_to_string(task: &str, value: &Value) -> RunnerResult<String> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        other => Err(RunnerError::invalid(
            task,
            format!("environment entries must be scalars, got {:?}", other),
        )),
    }
}

impl RunConfig {
    /// Resolve into a [`RunSpec`], allocating free host ports where needed.
    pub fn to_spec(&self, task: &str) -> RunnerResult<RunSpec> {
        let mut spec = RunSpec::new(self.image.clone());

        for (key, value) in &self.environment {
            spec.set_env(scalar_to_string(task, key)?, scalar_to_string(task, value)?);
        }

        for port in &self.ports {
            let host = match port.host {
                Some(host) => host,
                None => {
                    let host = self.unused_host_port(task, &spec, free_host_port)?;
                    debug!("Task {}: publishing container port {} on {}", task, port.container, host);
                    host
                }
            };
            spec.add_port(host, port.container);
        }

        spec.args = self.args.clone();
        spec.container_name = non_blank(self.container_name.clone());
        Ok(spec)
    }

    /// Allocate a host port not already published or declared by this task.
    fn unused_host_port(
        &self,
        task: &str,
        spec: &RunSpec,
        mut allocate: impl FnMut() -> RunnerResult<u16>,
    ) -> RunnerResult<u16> {
        for _ in 0..MAX_PORT_ATTEMPTS {
            let host = allocate()?;
            let taken = spec.ports.iter().any(|p| p.host == host)
                || self.ports.iter().any(|p| p.host == Some(host));
            if !taken {
                return Ok(host);
            }
            debug!("Task {}: host port {} already mapped, retrying", task, host);
        }
        Err(RunnerError::invalid(
            task,
            format!("no unused host port after {} attempts", MAX_PORT_ATTEMPTS),
        ))
    }
}

impl PipelineConfig {
    /// Parse a pipeline from YAML text.
    pub fn from_yaml(content: &str) -> RunnerResult<Self> {
        Ok(serde_yaml::from_str(content)?)
    }

    /// Load a pipeline file. A relative project root is taken relative to
    /// the file's directory.
    pub fn load(path: impl AsRef<Path>) -> RunnerResult<Self> {
        let path = path.as_ref();
        debug!("Reading pipeline from {:?}", path);

        let content = fs::read_to_string(path)?;
        let mut config = Self::from_yaml(&content)?;

        if config.project.root.is_relative() {
            let base = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            config.project.root = base.join(&config.project.root);
        }
        Ok(config)
    }
}
