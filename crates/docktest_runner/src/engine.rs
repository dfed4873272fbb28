//! Container engine selection and availability probing.
//!
//! The probe runs once per pipeline execution and yields an
//! [`EngineStatus`] that is handed to every task explicitly.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::exec::{CommandLine, ProcessExecutor};

/// Container runtime type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerRuntime {
    #[default]
    Docker,
    Podman,
}

impl ContainerRuntime {
    /// Get the CLI command name.
    pub fn command(&self) -> &'static str {
        match self {
            Self::Docker => "docker",
            Self::Podman => "podman",
        }
    }
}

impl std::fmt::Display for ContainerRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.command())
    }
}

impl FromStr for ContainerRuntime {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "docker" => Ok(Self::Docker),
            "podman" => Ok(Self::Podman),
            other => Err(format!(
                "unknown container runtime '{}' (expected docker or podman)",
                other
            )),
        }
    }
}

/// The `version` command used to probe the engine.
pub fn version_command(runtime: ContainerRuntime) -> CommandLine {
    CommandLine::new(
        vec![runtime.command().to_string(), "version".to_string()],
        ".",
    )
    .discard()
}

/// Returns true iff `<engine> version` exits with status 0.
///
/// Never fails: a missing binary, an I/O error or a non-zero exit counts
/// as "not available" and is logged as a warning.
pub async fn probe(executor: &dyn ProcessExecutor, runtime: ContainerRuntime) -> bool {
    let available = match executor.execute(&version_command(runtime)).await {
        Ok(output) => output.success(),
        Err(e) => {
            debug!("{} version probe failed: {}", runtime, e);
            false
        }
    };
    if !available {
        warn!(
            "Access to {} not possible. Disabling {} functionality.",
            runtime, runtime
        );
    }
    available
}

/// Outcome of the availability probe, computed once and read by every task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineStatus {
    runtime: ContainerRuntime,
    available: bool,
}

impl EngineStatus {
    /// Probe the engine and record the result.
    pub async fn probe(executor: &dyn ProcessExecutor, runtime: ContainerRuntime) -> Self {
        Self {
            runtime,
            available: probe(executor, runtime).await,
        }
    }

    /// A status known to be available, without probing.
    pub fn available(runtime: ContainerRuntime) -> Self {
        Self {
            runtime,
            available: true,
        }
    }

    /// A status known to be unavailable, without probing.
    pub fn unavailable(runtime: ContainerRuntime) -> Self {
        Self {
            runtime,
            available: false,
        }
    }

    pub fn is_available(&self) -> bool {
        self.available
    }

    pub fn runtime(&self) -> ContainerRuntime {
        self.runtime
    }

    /// The engine binary that task command lines start with.
    pub fn program(&self) -> &'static str {
        self.runtime.command()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockExecutor, MockResponse};
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[test]
    fn test_runtime_parsing() {
        assert_eq!("docker".parse::<ContainerRuntime>(), Ok(ContainerRuntime::Docker));
        assert_eq!(" Podman ".parse::<ContainerRuntime>(), Ok(ContainerRuntime::Podman));
        assert!("containerd".parse::<ContainerRuntime>().is_err());
    }

    #[test]
    fn test_version_command() {
        let cmd = version_command(ContainerRuntime::Podman);
        assert_eq!(cmd.args, vec!["podman", "version"]);
    }

    #[tokio::test]
    async fn test_probe_success() {
        let executor = MockExecutor::new();
        let status = EngineStatus::probe(&executor, ContainerRuntime::Docker).await;

        assert!(status.is_available());
        assert_eq!(executor.commands(), vec![vec!["docker", "version"]]);
    }

    #[tokio::test]
    async fn test_probe_non_zero_exit() {
        let executor = MockExecutor::new().add_response(MockResponse::failure(1, "daemon down"));
        assert!(!probe(&executor, ContainerRuntime::Docker).await);
    }

    #[derive(Clone, Default)]
    struct LogBuffer(Arc<Mutex<Vec<u8>>>);

    impl std::io::Write for LogBuffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_probe_warns_when_unavailable() {
        let logs = LogBuffer::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let executor = MockExecutor::new().add_response(MockResponse::failure(1, "daemon down"));
        assert!(!probe(&executor, ContainerRuntime::Podman).await);

        let output = String::from_utf8_lossy(&logs.0.lock()).to_string();
        assert!(output.contains("WARN"));
        assert!(output.contains("Access to podman not possible. Disabling podman functionality."));
    }

    #[tokio::test]
    async fn test_probe_spawn_failure() {
        let executor = MockExecutor::new().simulate_spawn_failure();
        let status = EngineStatus::probe(&executor, ContainerRuntime::Docker).await;
        assert!(!status.is_available());
        assert_eq!(status.program(), "docker");
    }
}
