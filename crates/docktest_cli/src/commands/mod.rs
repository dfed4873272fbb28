//! CLI command definitions.
//!
//! Each subcommand loads the pipeline file (where needed) and hands it to
//! `docktest_runner`.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};

use docktest_runner::{ContainerRuntime, PipelineConfig, DEFAULT_CONFIG_FILE};

pub mod plan;
pub mod probe;
pub mod run;

/// docktest - container build, run and stop tasks for test pipelines
#[derive(Parser)]
#[command(name = "docktest")]
#[command(version, about = "docktest - container tasks for test pipelines")]
#[command(long_about = r#"
docktest builds images, starts containers for the duration of a test run
and stops them again, driven by a YAML pipeline file.

COMMANDS:
  probe  → Check whether the container engine is reachable
  plan   → Print the commands a run would execute
  run    → Execute tasks in dependency order

EXIT CODES:
  0 - Success
  1 - General error
  2 - Invalid configuration
  3 - Container engine unavailable
  4 - Task failure
"#)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Commands,
}

/// Options shared by every subcommand.
#[derive(Args)]
pub struct GlobalArgs {
    /// Pipeline file
    #[arg(short, long, global = true, env = "DOCKTEST_CONFIG", default_value = DEFAULT_CONFIG_FILE)]
    pub config: PathBuf,

    /// Container engine binary (overrides the pipeline file)
    #[arg(short, long, global = true, env = "DOCKTEST_ENGINE")]
    pub engine: Option<ContainerRuntime>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

impl GlobalArgs {
    /// Load the pipeline file and apply command-line overrides.
    pub fn load_config(&self) -> Result<PipelineConfig> {
        let mut config = PipelineConfig::load(&self.config)
            .with_context(|| format!("Failed to load pipeline {}", self.config.display()))?;
        if let Some(engine) = self.engine {
            config.engine = engine;
        }
        Ok(config)
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Check whether the container engine is reachable
    Probe(probe::ProbeArgs),

    /// Print the commands a run would execute, without executing them
    Plan(plan::PlanArgs),

    /// Execute tasks (and their dependencies) in order
    Run(run::RunArgs),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition_is_valid() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_run_with_targets() {
        let cli = Cli::try_parse_from([
            "docktest", "--engine", "podman", "-c", "ci.yaml", "run", "startRedis", "test",
        ])
        .unwrap();

        assert_eq!(cli.global.engine, Some(ContainerRuntime::Podman));
        assert_eq!(cli.global.config, PathBuf::from("ci.yaml"));
        match cli.command {
            Commands::Run(args) => assert_eq!(args.targets, vec!["startRedis", "test"]),
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn test_engine_override_applies() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("docktest.yaml");
        std::fs::write(&path, "project: {name: app, version: '1'}\nengine: docker\n").unwrap();

        let global = GlobalArgs {
            config: path,
            engine: Some(ContainerRuntime::Podman),
            verbose: false,
            quiet: false,
        };
        assert_eq!(global.load_config().unwrap().engine, ContainerRuntime::Podman);
    }
}
