//! Integration tests for the container tasks.
//!
//! These tests drive the tasks through the recording mock executor, so no
//! container engine needs to be installed.

use std::fs;
use std::sync::Arc;

use tempfile::tempdir;

use docktest_runner::{
    BuildTask, ContainerRuntime, EngineStatus, MockExecutor, MockResponse, Pipeline,
    PipelineConfig, Project, RunTask, RunnerError, StopTask, Task, TaskContext, TaskOutcome,
    TaskState,
};

fn context(executor: &MockExecutor, project: Project, available: bool) -> TaskContext {
    let engine = if available {
        EngineStatus::available(ContainerRuntime::Docker)
    } else {
        EngineStatus::unavailable(ContainerRuntime::Docker)
    };
    TaskContext::new(project, engine, Arc::new(executor.clone()))
}

fn project() -> Project {
    Project::new("app", "2.0").root("/work/app")
}

/// Build with an unset tag falls back to the project version.
#[tokio::test]
async fn test_build_uses_project_version() {
    let executor = MockExecutor::new();
    let ctx = context(&executor, project(), true);

    let mut task = BuildTask::new("buildImage").image_name("app");
    let outcome = task.execute(&ctx).await.unwrap();

    assert_eq!(outcome, TaskOutcome::Executed);
    assert_eq!(task.state(), TaskState::Executed);
    assert_eq!(
        executor.commands(),
        vec![vec!["docker", "build", "-t", "app:2.0", "-t", "app:latest", "."]]
    );
    assert_eq!(executor.get_calls()[0].working_dir.to_str(), Some("/work/app"));
}

/// A failing build is fatal and nothing is saved.
#[tokio::test]
async fn test_build_failure_propagates() {
    let dir = tempdir().unwrap();
    let executor = MockExecutor::new().add_response(MockResponse::failure(1, "no Dockerfile"));
    let ctx = context(&executor, project(), true);

    let mut task = BuildTask::new("buildImage").save_image_to(dir.path().join("images"));
    let result = task.execute(&ctx).await;

    assert!(matches!(result, Err(RunnerError::ExecutionFailed { exit_code: 1, .. })));
    assert_eq!(executor.call_count(), 1);
    assert!(!dir.path().join("images").exists());
}

/// An existing archive is removed before `docker save` writes a new one.
#[tokio::test]
async fn test_save_replaces_existing_archive() {
    let dir = tempdir().unwrap();
    let images = dir.path().join("images");
    fs::create_dir_all(&images).unwrap();
    let archive = images.join("app.tar");
    fs::write(&archive, b"stale").unwrap();

    let executor = MockExecutor::new();
    let ctx = context(&executor, project(), true);

    let mut task = BuildTask::new("buildImage")
        .image_name("app")
        .save_image_to(&images);
    task.execute(&ctx).await.unwrap();

    assert!(!archive.exists());
    let saves = executor.get_subcommand_calls("save");
    assert_eq!(saves.len(), 1);
    assert_eq!(
        saves[0].args,
        vec![
            "docker".to_string(),
            "save".to_string(),
            "-o".to_string(),
            archive.to_string_lossy().to_string(),
            "app:latest".to_string(),
        ]
    );
}

/// The save directory is created with its parents.
#[tokio::test]
async fn test_save_creates_directory() {
    let dir = tempdir().unwrap();
    let nested = dir.path().join("build").join("images");

    let executor = MockExecutor::new();
    let ctx = context(&executor, project(), true);

    let mut task = BuildTask::new("buildImage").save_image_to(&nested);
    task.execute(&ctx).await.unwrap();

    assert!(nested.is_dir());
    assert_eq!(executor.call_count(), 2);
}

/// The first stdout line becomes the container name.
#[tokio::test]
async fn test_run_records_container_id() {
    let executor = MockExecutor::new().add_response(MockResponse::success("abc123\n"));
    let ctx = context(&executor, project(), true);

    let mut task = RunTask::new("startRedis").image("redis").add_port(6379, 6379);
    task.execute(&ctx).await.unwrap();

    assert_eq!(task.resolved_container_name().as_deref(), Some("abc123"));
    assert_eq!(
        executor.commands(),
        vec![vec!["docker", "run", "--rm", "-p", "6379:6379", "redis"]]
    );
}

/// An explicit name is passed to the engine and kept as the container name.
#[tokio::test]
async fn test_run_with_explicit_name() {
    let executor = MockExecutor::new().add_response(MockResponse::success(""));
    let ctx = context(&executor, project(), true);

    let mut task = RunTask::new("db").image("postgres").container_name("it-db");
    task.execute(&ctx).await.unwrap();

    assert_eq!(task.resolved_container_name().as_deref(), Some("it-db"));
    assert_eq!(
        executor.commands(),
        vec![vec!["docker", "run", "--rm", "--name", "it-db", "postgres"]]
    );
}

/// A blank name falls back to the id printed by the engine.
#[tokio::test]
async fn test_run_blank_name_uses_container_id() {
    let executor = MockExecutor::new().add_response(MockResponse::success("abc123\n"));
    let ctx = context(&executor, project(), true);

    let mut run = RunTask::new("r").image("redis").container_name("");
    let mut stop = StopTask::new("stop").stop_container_from_task(&run);
    run.execute(&ctx).await.unwrap();
    stop.execute(&ctx).await.unwrap();

    assert_eq!(run.resolved_container_name().as_deref(), Some("abc123"));
    assert_eq!(
        executor.commands(),
        vec![
            vec!["docker", "run", "--rm", "redis"],
            vec!["docker", "stop", "abc123"],
        ]
    );
}

/// Empty output without an explicit name is an error, not an empty id.
#[tokio::test]
async fn test_run_empty_output_is_parse_error() {
    let executor = MockExecutor::new().add_response(MockResponse::success(""));
    let ctx = context(&executor, project(), true);

    let mut task = RunTask::new("startRedis").image("redis");
    let result = task.execute(&ctx).await;

    assert!(matches!(result, Err(RunnerError::OutputParse(_))));
    assert_eq!(task.resolved_container_name(), None);
}

/// A task instance runs at most once.
#[tokio::test]
async fn test_run_twice_is_rejected() {
    let executor = MockExecutor::new().add_response(MockResponse::success("abc123\n"));
    let ctx = context(&executor, project(), true);

    let mut task = RunTask::new("startRedis").image("redis");
    task.execute(&ctx).await.unwrap();

    assert!(matches!(
        task.execute(&ctx).await,
        Err(RunnerError::AlreadyExecuted(_))
    ));
    assert_eq!(executor.call_count(), 1);
}

/// Stop reads the container names at execution time, in registration order.
#[tokio::test]
async fn test_stop_after_run() {
    let executor = MockExecutor::new().with_responses(vec![
        MockResponse::success("first\n"),
        MockResponse::success("second\n"),
        MockResponse::failure(1, "No such container: second"),
    ]);
    let ctx = context(&executor, project(), true);

    let mut a = RunTask::new("a").image("redis");
    let mut b = RunTask::new("b").image("postgres");
    let mut stop = StopTask::new("stop")
        .stop_containers_from_tasks([&a, &b])
        .stop_container_by_name("leftover");

    a.execute(&ctx).await.unwrap();
    b.execute(&ctx).await.unwrap();
    let outcome = stop.execute(&ctx).await.unwrap();

    assert_eq!(outcome, TaskOutcome::Executed);
    let stops = executor.get_subcommand_calls("stop");
    assert_eq!(stops.len(), 1);
    assert_eq!(stops[0].args, vec!["docker", "stop", "first", "second", "leftover"]);
    assert!(stops[0].ignore_exit_status);
}

/// Nothing registered means nothing spawned.
#[tokio::test]
async fn test_empty_stop_spawns_nothing() {
    let executor = MockExecutor::new();
    let ctx = context(&executor, project(), true);

    let mut stop = StopTask::new("stop");
    assert_eq!(stop.execute(&ctx).await.unwrap(), TaskOutcome::Executed);
    assert_eq!(executor.call_count(), 0);
}

/// Without the override, an unavailable engine fails every task before spawning.
#[tokio::test]
async fn test_unavailable_engine_is_fatal() {
    let executor = MockExecutor::new();
    let ctx = context(&executor, project(), false);

    let mut build = BuildTask::new("build");
    let mut run = RunTask::new("run").image("redis");
    let mut stop = StopTask::new("stop").stop_container_by_name("x");

    assert!(matches!(build.execute(&ctx).await, Err(RunnerError::EngineUnavailable(_))));
    assert!(matches!(run.execute(&ctx).await, Err(RunnerError::EngineUnavailable(_))));
    assert!(matches!(stop.execute(&ctx).await, Err(RunnerError::EngineUnavailable(_))));
    assert_eq!(executor.call_count(), 0);
}

/// With the override, an unavailable engine skips every task quietly.
#[tokio::test]
async fn test_unavailable_engine_with_override_skips() {
    let executor = MockExecutor::new();
    let ctx = context(&executor, project(), false);

    let mut build = BuildTask::new("build").ignore_availability(true);
    let mut run = RunTask::new("run").image("redis").ignore_availability(true);
    let mut stop = StopTask::new("stop")
        .stop_container_from_task(&run)
        .ignore_availability(true);

    assert_eq!(build.execute(&ctx).await.unwrap(), TaskOutcome::Skipped);
    assert_eq!(run.execute(&ctx).await.unwrap(), TaskOutcome::Skipped);
    assert_eq!(stop.execute(&ctx).await.unwrap(), TaskOutcome::Skipped);
    assert_eq!(executor.call_count(), 0);
    assert_eq!(run.resolved_container_name(), None);
}

/// A pipeline file drives the whole build, run, test, stop sequence.
#[tokio::test]
async fn test_pipeline_from_config() {
    let yaml = r#"
project:
  name: app
  version: "2.0"
  root: /work/app
tasks:
  - name: stopContainers
    type: stop
    containers_from: [startRedis]
    depends_on: [integrationTest]
  - name: buildImage
    type: build
    repository: acme/
  - name: startRedis
    type: run
    image: redis
    environment:
      MODE: test
    ports:
      - { host: 6379, container: 6379 }
    args: ["-d"]
    depends_on: [buildImage]
  - name: integrationTest
    type: exec
    command: [cargo, test]
    depends_on: [startRedis]
"#;
    let config = PipelineConfig::from_yaml(yaml).unwrap();
    let mut pipeline = Pipeline::from_config(&config).unwrap();

    let executor = MockExecutor::new().with_responses(vec![
        MockResponse::success("Docker version 27.0.0"),
        MockResponse::success(""),
        MockResponse::success("f00d\n"),
        MockResponse::success("test result: ok"),
        MockResponse::success("f00d"),
    ]);

    let report = pipeline
        .run(Arc::new(executor.clone()), &[])
        .await
        .unwrap();

    let order: Vec<_> = report.tasks.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(
        order,
        vec!["buildImage", "startRedis", "integrationTest", "stopContainers"]
    );
    assert_eq!(
        executor.commands(),
        vec![
            vec!["docker", "version"],
            vec!["docker", "build", "-t", "acme/app:2.0", "-t", "acme/app:latest", "."],
            vec!["docker", "run", "--rm", "-e", "MODE=test", "-p", "6379:6379", "-d", "redis"],
            vec!["cargo", "test"],
            vec!["docker", "stop", "f00d"],
        ]
    );
}

/// A stop task can only reference run tasks.
#[test]
fn test_pipeline_rejects_bad_stop_reference() {
    let yaml = r#"
project: { name: app, version: "1" }
tasks:
  - name: buildImage
    type: build
  - name: stop
    type: stop
    containers_from: [buildImage]
"#;
    let config = PipelineConfig::from_yaml(yaml).unwrap();
    assert!(matches!(
        Pipeline::from_config(&config),
        Err(RunnerError::InvalidConfiguration { .. })
    ));
}
