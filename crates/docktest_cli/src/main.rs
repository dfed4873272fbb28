//! docktest CLI - Main entry point.
//!
//! Exit codes:
//! - 0: Success
//! - 1: General error
//! - 2: Invalid configuration
//! - 3: Container engine unavailable
//! - 4: Task failure

use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use docktest_runner::RunnerError;

mod commands;

use commands::{Cli, Commands};

/// CI-friendly exit codes
pub struct ExitCodes;

impl ExitCodes {
    pub const SUCCESS: u8 = 0;
    pub const GENERAL_ERROR: u8 = 1;
    pub const INVALID_CONFIG: u8 = 2;
    pub const ENGINE_UNAVAILABLE: u8 = 3;
    pub const TASK_FAILURE: u8 = 4;
}

fn init_logging(verbose: bool, quiet: bool) {
    let default_filter = if verbose {
        "docktest_runner=debug,docktest_cli=debug,info"
    } else if quiet {
        "warn"
    } else {
        "docktest_runner=info,docktest_cli=info,warn"
    };

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    // ignore: a subscriber may already be installed
    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(filter)
        .try_init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.global.verbose, cli.global.quiet);

    let result = match &cli.command {
        Commands::Probe(args) => commands::probe::execute(&cli.global, args).await,
        Commands::Plan(args) => commands::plan::execute(&cli.global, args).await,
        Commands::Run(args) => commands::run::execute(&cli.global, args).await,
    };

    match result {
        Ok(()) => ExitCode::from(ExitCodes::SUCCESS),
        Err(e) => {
            let exit_code = categorize_error(&e);
            eprintln!("Error: {:#}", e);
            ExitCode::from(exit_code)
        }
    }
}

/// Map an error to its exit code.
fn categorize_error(e: &anyhow::Error) -> u8 {
    let Some(runner_error) = e.chain().find_map(|c| c.downcast_ref::<RunnerError>()) else {
        return ExitCodes::GENERAL_ERROR;
    };

    match runner_error.root() {
        RunnerError::EngineUnavailable(_) => ExitCodes::ENGINE_UNAVAILABLE,
        RunnerError::Config(_)
        | RunnerError::InvalidConfiguration { .. }
        | RunnerError::UnknownTask(_)
        | RunnerError::DuplicateTask(_)
        | RunnerError::DependencyCycle(_) => ExitCodes::INVALID_CONFIG,
        _ if matches!(runner_error, RunnerError::TaskFailed { .. }) => ExitCodes::TASK_FAILURE,
        _ => ExitCodes::GENERAL_ERROR,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docktest_runner::ContainerRuntime;

    #[test]
    fn test_categorize_runner_errors() {
        let unavailable = anyhow::Error::new(RunnerError::TaskFailed {
            task: "startRedis".into(),
            source: Box::new(RunnerError::EngineUnavailable("docker".into())),
        });
        assert_eq!(categorize_error(&unavailable), ExitCodes::ENGINE_UNAVAILABLE);

        let failed = anyhow::Error::new(RunnerError::TaskFailed {
            task: "buildImage".into(),
            source: Box::new(RunnerError::ExecutionFailed {
                command: "docker build .".into(),
                exit_code: 1,
                stderr: "boom".into(),
            }),
        });
        assert_eq!(categorize_error(&failed), ExitCodes::TASK_FAILURE);

        let cycle = anyhow::Error::new(RunnerError::DependencyCycle("a".into()))
            .context("Failed to order tasks");
        assert_eq!(categorize_error(&cycle), ExitCodes::INVALID_CONFIG);

        let other = anyhow::anyhow!("{} exploded", ContainerRuntime::Docker);
        assert_eq!(categorize_error(&other), ExitCodes::GENERAL_ERROR);
    }
}
