//! Run command - Execute the pipeline.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use tracing::info;

use docktest_runner::{Pipeline, SystemExecutor, TaskOutcome};

use super::GlobalArgs;

#[derive(Args)]
pub struct RunArgs {
    /// Tasks to run together with their dependencies (default: all)
    pub targets: Vec<String>,

    /// Print the execution report as JSON
    #[arg(long)]
    json: bool,
}

pub async fn execute(global: &GlobalArgs, args: &RunArgs) -> Result<()> {
    let config = global.load_config()?;
    let mut pipeline = Pipeline::from_config(&config).context("Invalid pipeline")?;

    info!(
        "Running {} for project {} {}",
        if args.targets.is_empty() {
            "all tasks".to_string()
        } else {
            args.targets.join(", ")
        },
        config.project.name,
        config.project.version
    );

    let report = pipeline
        .run(Arc::new(SystemExecutor::new()), &args.targets)
        .await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    if !global.quiet {
        println!();
        for task in &report.tasks {
            let status = match task.outcome {
                TaskOutcome::Executed => "done",
                TaskOutcome::Skipped => "skipped",
            };
            println!("  {:<24} {:<8} {}ms", task.name, status, task.duration_ms);
        }
    }

    let skipped = report.skipped();
    if !skipped.is_empty() {
        println!(
            "{} unavailable; skipped: {}",
            report.engine.runtime(),
            skipped.join(", ")
        );
    }
    Ok(())
}
