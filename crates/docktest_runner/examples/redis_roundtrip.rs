//! Example: start Redis, run a test command, stop Redis.
//!
//! Prints the planned commands first, then executes them if an engine is
//! reachable.
//!
//! Run with: cargo run --example redis_roundtrip

use std::sync::Arc;

use docktest_runner::{
    free_host_port, ContainerRuntime, EngineStatus, ExecTask, Pipeline, Project, RunTask,
    StopTask, SystemExecutor,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let port = free_host_port()?;
    let project = Project::new("redis-roundtrip", "0.1.0");

    let redis = RunTask::new("startRedis")
        .image("redis:7-alpine")
        .add_port(port, 6379)
        .args(["-d"]);
    let ping = ExecTask::new("ping").command([
        "sh".to_string(),
        "-c".to_string(),
        format!("printf 'PING\\r\\n' | nc -w 1 127.0.0.1 {}", port),
    ]);
    let stop = StopTask::new("stopRedis").stop_container_from_task(&redis);

    let mut pipeline = Pipeline::new(project, ContainerRuntime::Docker);
    pipeline.add_task(redis, Vec::new())?;
    pipeline.add_task(ping, vec!["startRedis".to_string()])?;
    pipeline.add_task(stop, vec!["ping".to_string()])?;

    println!("=== Plan ===");
    for task in pipeline.plan(&[])? {
        for cmd in &task.commands {
            println!("[{}] {}", task.name, cmd.command);
        }
    }

    let executor = Arc::new(SystemExecutor::new());
    let engine = EngineStatus::probe(executor.as_ref(), pipeline.runtime()).await;
    if !engine.is_available() {
        println!("\nNo container engine available, stopping after the plan.");
        return Ok(());
    }

    println!("\n=== Run ===");
    let report = pipeline.run_with_status(executor, engine, &[]).await?;
    for task in &report.tasks {
        println!("{:<12} {:?} in {}ms", task.name, task.outcome, task.duration_ms);
    }

    Ok(())
}
