//! Container runtime client
//!
//! This module defines the runtime capabilities the proxy relies on, the
//! CLI-backed implementation that drives `docker`/`podman`, and an in-memory
//! mock used by tests.

use crate::errors::{Result, RuntimeError};
use async_trait::async_trait;
use serde::Deserialize;
use std::process::{Output, Stdio};
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tracing::{debug, instrument, warn};

/// Container state as reported by the runtime's inspect
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerInfo {
    /// Full container ID
    pub id: String,
    /// Container name without the leading slash
    pub name: String,
    /// Whether the main process is running
    pub running: bool,
    /// Host pid of the main process; 0 when not running
    pub pid: i64,
    /// Runtime status string (created, running, exited, ...)
    pub status: String,
    /// Exit code of the last run
    pub exit_code: i64,
}

/// Capabilities the proxy needs from a container runtime
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Inspect a container by name or ID; `None` when no such container exists
    async fn inspect_container(&self, name_or_id: &str) -> Result<Option<ContainerInfo>>;

    /// Start an existing, stopped container
    async fn start_container(&self, container_id: &str) -> Result<()>;

    /// Force-remove a container
    async fn remove_container(&self, container_id: &str) -> Result<()>;

    /// Block until the container exits and return its exit code
    async fn wait_container(&self, container_id: &str) -> Result<i64>;

    /// Follow the container's stdout/stderr into this process's own streams
    /// until the runtime closes the stream
    async fn stream_logs(&self, container_id: &str) -> Result<()>;

    /// Create and start a detached container from `run` arguments, returning its ID
    async fn run_detached(&self, args: &[String]) -> Result<String>;
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InspectRecord {
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    state: InspectState,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InspectState {
    #[serde(default)]
    status: String,
    #[serde(default)]
    running: bool,
    #[serde(default)]
    pid: i64,
    #[serde(default)]
    exit_code: i64,
}

impl From<InspectRecord> for ContainerInfo {
    fn from(record: InspectRecord) -> Self {
        Self {
            id: record.id,
            name: record.name.trim_start_matches('/').to_string(),
            running: record.state.running,
            pid: record.state.pid,
            status: record.state.status,
            exit_code: record.state.exit_code,
        }
    }
}

/// Parse the JSON array printed by `inspect`
pub fn parse_inspect_output(stdout: &str) -> Result<Option<ContainerInfo>> {
    let records: Vec<InspectRecord> = serde_json::from_str(stdout)
        .map_err(|e| RuntimeError::CLIError(format!("Failed to parse inspect JSON: {}", e)))?;
    Ok(records.into_iter().next().map(ContainerInfo::from))
}

fn is_missing_container(stderr: &str) -> bool {
    let lower = stderr.to_lowercase();
    lower.contains("no such object") || lower.contains("no such container")
}

/// CLI-based container runtime
///
/// Works for both Docker and Podman, which share the commands used here.
#[derive(Debug, Clone)]
pub struct CliRuntime {
    /// Runtime CLI binary path (e.g., "docker" or "podman")
    runtime_path: String,
    /// Value exported as DOCKER_HOST to every spawned command, when set
    endpoint: Option<String>,
}

impl CliRuntime {
    pub fn new(runtime_path: impl Into<String>, endpoint: Option<String>) -> Self {
        Self {
            runtime_path: runtime_path.into(),
            endpoint,
        }
    }

    pub fn runtime_path(&self) -> &str {
        &self.runtime_path
    }

    fn command(&self) -> Command {
        let mut command = Command::new(&self.runtime_path);
        if let Some(endpoint) = &self.endpoint {
            command.env(crate::config::ENV_RUNTIME_ENDPOINT, endpoint);
        }
        command.stdin(Stdio::null());
        command
    }

    fn spawn_error(&self, e: std::io::Error, action: &str) -> RuntimeError {
        if e.kind() == std::io::ErrorKind::NotFound {
            RuntimeError::NotInstalled {
                binary: self.runtime_path.clone(),
            }
        } else {
            RuntimeError::CLIError(format!("Failed to {}: {}", action, e))
        }
    }

    async fn output(&self, args: &[&str], action: &str) -> Result<Output> {
        debug!(runtime = %self.runtime_path, ?args, "Running runtime command");
        let output = self
            .command()
            .args(args)
            .output()
            .await
            .map_err(|e| self.spawn_error(e, action))?;
        Ok(output)
    }
}

#[async_trait]
impl ContainerRuntime for CliRuntime {
    #[instrument(skip(self))]
    async fn inspect_container(&self, name_or_id: &str) -> Result<Option<ContainerInfo>> {
        let output = self
            .output(
                &["inspect", "--type", "container", name_or_id],
                "inspect container",
            )
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            if is_missing_container(&stderr) {
                debug!("Container {} does not exist", name_or_id);
                return Ok(None);
            }
            return Err(RuntimeError::CLIError(format!(
                "Inspect command failed: {}",
                stderr.trim()
            ))
            .into());
        }

        let stdout = String::from_utf8(output.stdout).map_err(|e| {
            RuntimeError::CLIError(format!("Invalid UTF-8 in runtime output: {}", e))
        })?;
        parse_inspect_output(&stdout)
    }

    #[instrument(skip(self))]
    async fn start_container(&self, container_id: &str) -> Result<()> {
        let output = self
            .output(&["start", container_id], "start container")
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(
                RuntimeError::CLIError(format!("Start command failed: {}", stderr.trim())).into(),
            );
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn remove_container(&self, container_id: &str) -> Result<()> {
        let output = self
            .output(&["rm", "-f", container_id], "remove container")
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(
                RuntimeError::CLIError(format!("Remove command failed: {}", stderr.trim())).into(),
            );
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn wait_container(&self, container_id: &str) -> Result<i64> {
        let output = self
            .output(&["wait", container_id], "wait for container")
            .await?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            if is_missing_container(&stderr) {
                return Err(RuntimeError::ContainerNotFound {
                    id: container_id.to_string(),
                }
                .into());
            }
            return Err(
                RuntimeError::CLIError(format!("Wait command failed: {}", stderr.trim())).into(),
            );
        }

        stdout.trim().parse::<i64>().map_err(|e| {
            RuntimeError::CLIError(format!(
                "Unexpected wait output '{}': {}",
                stdout.trim(),
                e
            ))
            .into()
        })
    }

    #[instrument(skip(self))]
    async fn stream_logs(&self, container_id: &str) -> Result<()> {
        let status = self
            .command()
            .args(["logs", "--follow", container_id])
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()
            .await
            .map_err(|e| self.spawn_error(e, "stream logs"))?;

        if !status.success() {
            return Err(RuntimeError::CLIError(format!(
                "Logs command exited with status {}",
                status.code().unwrap_or(-1)
            ))
            .into());
        }
        Ok(())
    }

    #[instrument(skip(self, args), fields(args = args.len()))]
    async fn run_detached(&self, args: &[String]) -> Result<String> {
        let mut child = self
            .command()
            .arg("run")
            .args(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| self.spawn_error(e, "launch container"))?;

        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| RuntimeError::CLIError("Failed to capture stdout".to_string()))?;
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| RuntimeError::CLIError("Failed to capture stderr".to_string()))?;

        // Diagnostics from the launch go straight to our own stderr.
        let stderr_handle = tokio::spawn(async move {
            let mut sink = tokio::io::stderr();
            if let Err(e) = tokio::io::copy(&mut stderr, &mut sink).await {
                warn!("Failed to forward launch stderr: {}", e);
            }
        });

        let mut captured = String::new();
        stdout
            .read_to_string(&mut captured)
            .await
            .map_err(|e| RuntimeError::CLIError(format!("Failed to read launch output: {}", e)))?;

        let status = child
            .wait()
            .await
            .map_err(|e| RuntimeError::CLIError(format!("Failed to wait for launch: {}", e)))?;
        let _ = stderr_handle.await;

        if !status.success() {
            return Err(RuntimeError::LaunchFailed {
                code: status.code().unwrap_or(-1),
            }
            .into());
        }

        let container_id = captured.trim().to_string();
        if container_id.is_empty() {
            return Err(
                RuntimeError::CLIError("Launch printed no container id".to_string()).into(),
            );
        }

        debug!(container_id = %container_id, "Launched container");
        Ok(container_id)
    }
}

pub mod mock {
    //! Mock container runtime for testing the proxy flow
    //!
    //! Containers live in memory. `wait_container` simulates the container
    //! exiting, so supervision loops terminate deterministically.

    use super::{ContainerInfo, ContainerRuntime};
    use crate::args::extract_name;
    use crate::errors::{Result, RuntimeError};
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};
    use tracing::debug;

    /// Mock container state
    #[derive(Debug, Clone)]
    pub struct MockContainer {
        pub id: String,
        pub name: String,
        pub running: bool,
        pub pid: i64,
        pub exit_code: i64,
    }

    impl MockContainer {
        /// A running container
        pub fn running(id: &str, name: &str, pid: i64) -> Self {
            Self {
                id: id.to_string(),
                name: name.to_string(),
                running: true,
                pid,
                exit_code: 0,
            }
        }

        /// An exited container
        pub fn stopped(id: &str, name: &str, exit_code: i64) -> Self {
            Self {
                id: id.to_string(),
                name: name.to_string(),
                running: false,
                pid: 0,
                exit_code,
            }
        }

        fn info(&self) -> ContainerInfo {
            ContainerInfo {
                id: self.id.clone(),
                name: self.name.clone(),
                running: self.running,
                pid: self.pid,
                status: if self.running { "running" } else { "exited" }.to_string(),
                exit_code: self.exit_code,
            }
        }
    }

    /// Configuration for mock behavior
    #[derive(Debug, Clone)]
    pub struct MockRuntimeConfig {
        /// Pid given to freshly launched containers
        pub launch_pid: i64,
        /// Pid given to containers brought back by `start_container`
        pub restart_pid: i64,
        /// When set, `run_detached` fails with this exit code
        pub launch_exit_code: Option<i32>,
        /// Launched containers exit before they can be inspected
        pub launch_exits_immediately: bool,
        pub fail_start: bool,
        pub fail_remove: bool,
        pub fail_logs: bool,
        /// Exit code reported when a waited-on container stops
        pub wait_exit_code: i64,
    }

    impl Default for MockRuntimeConfig {
        fn default() -> Self {
            Self {
                launch_pid: 4242,
                restart_pid: 5151,
                launch_exit_code: None,
                launch_exits_immediately: false,
                fail_start: false,
                fail_remove: false,
                fail_logs: false,
                wait_exit_code: 0,
            }
        }
    }

    /// Record of a runtime call for verification in tests
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum MockCall {
        Inspect(String),
        Start(String),
        Remove(String),
        Wait(String),
        Logs(String),
        Run(Vec<String>),
    }

    /// In-memory container runtime
    #[derive(Debug, Default, Clone)]
    pub struct MockRuntime {
        config: Arc<Mutex<MockRuntimeConfig>>,
        containers: Arc<Mutex<Vec<MockContainer>>>,
        calls: Arc<Mutex<Vec<MockCall>>>,
        launches: Arc<Mutex<usize>>,
    }

    impl MockRuntime {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_config(config: MockRuntimeConfig) -> Self {
            Self {
                config: Arc::new(Mutex::new(config)),
                ..Self::default()
            }
        }

        pub fn add_container(&self, container: MockContainer) {
            self.containers.lock().unwrap().push(container);
        }

        /// Snapshot of a container by name or ID
        pub fn container(&self, name_or_id: &str) -> Option<MockContainer> {
            self.containers
                .lock()
                .unwrap()
                .iter()
                .find(|c| c.id == name_or_id || c.name == name_or_id)
                .cloned()
        }

        pub fn container_count(&self) -> usize {
            self.containers.lock().unwrap().len()
        }

        /// Number of successful `run_detached` calls
        pub fn launch_count(&self) -> usize {
            *self.launches.lock().unwrap()
        }

        pub fn calls(&self) -> Vec<MockCall> {
            self.calls.lock().unwrap().clone()
        }

        fn record(&self, call: MockCall) {
            self.calls.lock().unwrap().push(call);
        }
    }

    #[async_trait]
    impl ContainerRuntime for MockRuntime {
        async fn inspect_container(&self, name_or_id: &str) -> Result<Option<ContainerInfo>> {
            self.record(MockCall::Inspect(name_or_id.to_string()));
            Ok(self.container(name_or_id).map(|c| c.info()))
        }

        async fn start_container(&self, container_id: &str) -> Result<()> {
            self.record(MockCall::Start(container_id.to_string()));
            let config = self.config.lock().unwrap().clone();
            if config.fail_start {
                return Err(RuntimeError::CLIError("Mock start failure".to_string()).into());
            }

            let mut containers = self.containers.lock().unwrap();
            let container = containers
                .iter_mut()
                .find(|c| c.id == container_id)
                .ok_or_else(|| RuntimeError::ContainerNotFound {
                    id: container_id.to_string(),
                })?;
            container.running = true;
            container.pid = config.restart_pid;
            debug!("MockRuntime started {}", container_id);
            Ok(())
        }

        async fn remove_container(&self, container_id: &str) -> Result<()> {
            self.record(MockCall::Remove(container_id.to_string()));
            if self.config.lock().unwrap().fail_remove {
                return Err(RuntimeError::CLIError("Mock remove failure".to_string()).into());
            }

            let mut containers = self.containers.lock().unwrap();
            let before = containers.len();
            containers.retain(|c| c.id != container_id);
            if containers.len() == before {
                return Err(RuntimeError::ContainerNotFound {
                    id: container_id.to_string(),
                }
                .into());
            }
            Ok(())
        }

        async fn wait_container(&self, container_id: &str) -> Result<i64> {
            self.record(MockCall::Wait(container_id.to_string()));
            let exit_code = self.config.lock().unwrap().wait_exit_code;

            let mut containers = self.containers.lock().unwrap();
            let container = containers
                .iter_mut()
                .find(|c| c.id == container_id)
                .ok_or_else(|| RuntimeError::ContainerNotFound {
                    id: container_id.to_string(),
                })?;
            container.running = false;
            container.pid = 0;
            container.exit_code = exit_code;
            Ok(exit_code)
        }

        async fn stream_logs(&self, container_id: &str) -> Result<()> {
            self.record(MockCall::Logs(container_id.to_string()));
            if self.config.lock().unwrap().fail_logs {
                return Err(RuntimeError::CLIError("Mock logs failure".to_string()).into());
            }
            Ok(())
        }

        async fn run_detached(&self, args: &[String]) -> Result<String> {
            self.record(MockCall::Run(args.to_vec()));
            let config = self.config.lock().unwrap().clone();
            if let Some(code) = config.launch_exit_code {
                return Err(RuntimeError::LaunchFailed { code }.into());
            }

            let name = extract_name(args);
            let mut containers = self.containers.lock().unwrap();
            if let Some(name) = &name {
                if containers.iter().any(|c| &c.name == name) {
                    return Err(RuntimeError::CLIError(format!(
                        "Conflict. The container name \"/{}\" is already in use",
                        name
                    ))
                    .into());
                }
            }

            let mut launches = self.launches.lock().unwrap();
            *launches += 1;
            let id = format!("mock{:060}", *launches);
            let name = name.unwrap_or_else(|| format!("mock_container_{}", *launches));
            let container = if config.launch_exits_immediately {
                MockContainer::stopped(&id, &name, 0)
            } else {
                MockContainer::running(&id, &name, config.launch_pid)
            };
            containers.push(container);
            debug!("MockRuntime launched {}", id);
            Ok(id)
        }
    }
}
