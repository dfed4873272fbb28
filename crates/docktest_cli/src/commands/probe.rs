//! Probe command - Check container engine availability.

use anyhow::Result;
use clap::Args;
use tracing::info;

use docktest_runner::{ContainerRuntime, EngineStatus, RunnerError, SystemExecutor};

use super::GlobalArgs;

#[derive(Args)]
pub struct ProbeArgs {
    /// Print the result as JSON
    #[arg(long)]
    json: bool,
}

pub async fn execute(global: &GlobalArgs, args: &ProbeArgs) -> Result<()> {
    // an explicit engine wins, then the pipeline file, then docker
    let runtime = match global.engine {
        Some(engine) => engine,
        None if global.config.exists() => global.load_config()?.engine,
        None => ContainerRuntime::default(),
    };

    info!("Probing {}", runtime);
    let status = EngineStatus::probe(&SystemExecutor::new(), runtime).await;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&status)?);
    } else if status.is_available() {
        println!("{} is available", runtime);
    } else {
        println!("{} is not available", runtime);
    }

    if !status.is_available() {
        return Err(RunnerError::EngineUnavailable(format!("{} version failed", runtime)).into());
    }
    Ok(())
}
