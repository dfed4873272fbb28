//! Plan command - Show the commands a run would execute.

use anyhow::{Context, Result};
use clap::Args;

use docktest_runner::Pipeline;

use super::GlobalArgs;

#[derive(Args)]
pub struct PlanArgs {
    /// Tasks to plan (default: all)
    pub targets: Vec<String>,

    /// Print the plan as JSON
    #[arg(long)]
    json: bool,
}

pub async fn execute(global: &GlobalArgs, args: &PlanArgs) -> Result<()> {
    let config = global.load_config()?;
    let pipeline = Pipeline::from_config(&config).context("Invalid pipeline")?;
    let plan = pipeline.plan(&args.targets)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&plan)?);
        return Ok(());
    }

    for task in &plan {
        println!(":{} ({})", task.name, task.kind);
        if task.commands.is_empty() {
            println!("    (nothing to do)");
        }
        for cmd in &task.commands {
            println!("    {}", cmd.command);
            println!("      in {}", cmd.working_dir.display());
        }
    }
    Ok(())
}
