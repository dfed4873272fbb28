//! Error types for the runner module.

use thiserror::Error;

/// Result type alias for runner operations.
pub type RunnerResult<T> = Result<T, RunnerError>;

/// Errors that can occur while probing the engine or executing tasks.
#[derive(Error, Debug)]
pub enum RunnerError {
    #[error("Container engine not available: {0}")]
    EngineUnavailable(String),

    #[error("Command `{command}` failed with exit code {exit_code}: {stderr}")]
    ExecutionFailed {
        command: String,
        exit_code: i32,
        stderr: String,
    },

    #[error("Failed to spawn {program}: {source}")]
    SpawnFailed {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Could not read a container identifier from the output of `{0}`")]
    OutputParse(String),

    #[error("Invalid configuration for task {task}: {message}")]
    InvalidConfiguration { task: String, message: String },

    #[error("Task {0} has already been executed")]
    AlreadyExecuted(String),

    #[error("Unknown task: {0}")]
    UnknownTask(String),

    #[error("Duplicate task name: {0}")]
    DuplicateTask(String),

    #[error("Dependency cycle detected involving task {0}")]
    DependencyCycle(String),

    #[error("Task {task} failed: {source}")]
    TaskFailed {
        task: String,
        #[source]
        source: Box<RunnerError>,
    },

    #[error("Config error: {0}")]
    Config(#[from] serde_yaml::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl RunnerError {
    /// Shorthand for an [`RunnerError::InvalidConfiguration`].
    pub fn invalid(task: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidConfiguration {
            task: task.into(),
            message: message.into(),
        }
    }

    /// The innermost error, unwrapping any [`RunnerError::TaskFailed`] layers.
    pub fn root(&self) -> &RunnerError {
        match self {
            Self::TaskFailed { source, .. } => source.root(),
            other => other,
        }
    }
}
