//! Invocation state threaded through every stage of a run

use crate::errors::{ProxyError, Result};
use std::fmt;
use std::path::PathBuf;

/// Process id of a container's main process as seen from the host
///
/// Always strictly positive; a zero or negative pid reported by the runtime
/// is rejected at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HostPid(u32);

impl HostPid {
    /// Validate a pid reported for `container_id`
    pub fn new(raw: i64, container_id: &str) -> Result<Self> {
        if raw <= 0 {
            return Err(ProxyError::invalid_state(format!(
                "Pid is {} for container {}",
                raw, container_id
            )));
        }
        u32::try_from(raw).map(Self).map_err(|_| {
            ProxyError::invalid_state(format!(
                "Pid {} for container {} is out of range",
                raw, container_id
            ))
        })
    }

    pub fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for HostPid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How the container for this invocation was obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acquisition {
    /// A new container was created through the runtime's `run`
    Launched,
    /// A running container with the requested name was adopted as-is
    Attached,
    /// A stopped container with the requested name was started again
    Restarted,
    /// A stopped container with the requested name was removed and a new one launched
    Relaunched,
}

impl fmt::Display for Acquisition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Launched => "launched",
            Self::Attached => "attached",
            Self::Restarted => "restarted",
            Self::Relaunched => "relaunched",
        };
        f.write_str(s)
    }
}

/// Flags belonging to the proxy itself, parsed from before the run marker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnOptions {
    /// Where to persist the resolved host pid
    pub pid_file: Option<PathBuf>,
    /// Stream container output to this process's stdout/stderr
    pub logs: bool,
    /// The container speaks the notify protocol itself
    pub notify: bool,
    /// Forward this process's environment into the container
    pub env: bool,
    /// Remove the container once it exits
    pub rm: bool,
}

impl Default for OwnOptions {
    fn default() -> Self {
        Self {
            pid_file: None,
            logs: true,
            notify: false,
            env: false,
            rm: false,
        }
    }
}

/// The single aggregate populated as an invocation progresses
///
/// Fields move from unset to set and are never reset.
#[derive(Debug, Clone, Default)]
pub struct InvocationContext {
    /// Runtime arguments as received, after the run marker
    pub raw_arguments: Vec<String>,
    /// Arguments handed to the runtime's `run`
    pub rewritten_arguments: Vec<String>,
    /// Container name; `None` means always launch a new container
    pub name: Option<String>,
    pub auto_remove: bool,
    pub wants_detach: bool,
    pub relay_logs: bool,
    /// The container will signal its own readiness through the notify socket
    pub notify_requested: bool,
    pub notify_socket: Option<PathBuf>,
    pub pid_file: Option<PathBuf>,
    pub(crate) container_id: Option<String>,
    pub(crate) host_pid: Option<HostPid>,
    pub(crate) acquisition: Option<Acquisition>,
}

impl InvocationContext {
    pub fn container_id(&self) -> Option<&str> {
        self.container_id.as_deref()
    }

    pub fn host_pid(&self) -> Option<HostPid> {
        self.host_pid
    }

    pub fn acquisition(&self) -> Option<Acquisition> {
        self.acquisition
    }

    /// Record the running container this invocation tracks
    ///
    /// Id and pid are set together, once.
    pub fn adopt(&mut self, container_id: String, pid: HostPid, how: Acquisition) -> Result<()> {
        if let Some(existing) = &self.container_id {
            return Err(ProxyError::invalid_state(format!(
                "Container {} already adopted, refusing to adopt {}",
                existing, container_id
            )));
        }
        self.container_id = Some(container_id);
        self.host_pid = Some(pid);
        self.acquisition = Some(how);
        Ok(())
    }

    /// Id and pid of the adopted container, or `InvalidState` if none was adopted
    pub fn adopted(&self) -> Result<(&str, HostPid)> {
        match (self.container_id.as_deref(), self.host_pid) {
            (Some(id), Some(pid)) => Ok((id, pid)),
            _ => Err(ProxyError::invalid_state(
                "No running container was resolved for this invocation",
            )),
        }
    }
}
