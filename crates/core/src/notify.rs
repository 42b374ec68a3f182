//! Supervisor readiness handshake
//!
//! The supervisor listens on a local datagram socket named by `NOTIFY_SOCKET`
//! and accepts newline-free `KEY=VALUE` messages. The proxy reports the
//! container's host pid as `MAINPID` so the supervisor tracks the real workload,
//! then reports `READY=1` unless the container signals readiness itself.

use crate::context::HostPid;
use crate::errors::{ProxyError, Result};
use std::io;
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};
use tokio::net::UnixDatagram;
use tracing::{debug, info, instrument, warn};

/// Checks whether a process still exists
pub trait LivenessProbe: Send + Sync {
    fn is_alive(&self, pid: HostPid) -> bool;
}

/// Liveness via the proc filesystem: a pid is alive while `<root>/<pid>` exists
#[derive(Debug, Clone)]
pub struct ProcFsProbe {
    root: PathBuf,
}

impl ProcFsProbe {
    pub fn new() -> Self {
        Self::with_root("/proc")
    }

    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl Default for ProcFsProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl LivenessProbe for ProcFsProbe {
    fn is_alive(&self, pid: HostPid) -> bool {
        self.root.join(pid.to_string()).exists()
    }
}

/// Message assigning the supervised main process
pub fn main_pid_message(pid: u32) -> String {
    format!("MAINPID={}", pid)
}

/// Message reporting service readiness
pub const READY_MESSAGE: &str = "READY=1";

/// Client side of the notification protocol
#[derive(Debug, Clone)]
pub struct NotifyClient {
    socket: Option<PathBuf>,
    self_pid: u32,
}

impl NotifyClient {
    /// Client for `socket`; `None` means no supervisor is listening
    pub fn new(socket: Option<PathBuf>) -> Self {
        Self {
            socket,
            self_pid: std::process::id(),
        }
    }

    /// Override the pid reported when tracking falls back to this process
    pub fn with_self_pid(mut self, pid: u32) -> Self {
        self.self_pid = pid;
        self
    }

    /// Run the handshake for the container main process `pid`
    ///
    /// With `container_signals_ready` set, `READY=1` is left to the container.
    #[instrument(skip(self, probe))]
    pub async fn notify(
        &self,
        pid: HostPid,
        container_signals_ready: bool,
        probe: &dyn LivenessProbe,
    ) -> Result<()> {
        if !probe.is_alive(pid) {
            return Err(ProxyError::EarlyExit {
                pid: i64::from(pid.get()),
            });
        }

        let Some(socket_path) = self.socket.as_deref() else {
            debug!("No notify socket configured, skipping handshake");
            return Ok(());
        };

        let socket = connect(socket_path)?;
        send(&socket, socket_path, &main_pid_message(pid.get())).await?;

        if !probe.is_alive(pid) {
            warn!(pid = %pid, "Container exited during handshake, handing MAINPID back to the proxy");
            if let Err(e) = send(&socket, socket_path, &main_pid_message(self.self_pid)).await {
                warn!("Failed to hand MAINPID back: {}", e);
            }
            return Err(ProxyError::EarlyExit {
                pid: i64::from(pid.get()),
            });
        }

        if !container_signals_ready {
            send(&socket, socket_path, READY_MESSAGE).await?;
        }

        info!(pid = %pid, socket = %socket_path.display(), "Supervisor notified");
        Ok(())
    }
}

fn connect(path: &Path) -> Result<UnixDatagram> {
    let socket = match abstract_name(path) {
        Some(name) => connect_abstract(name),
        None => connect_path(path),
    };
    socket.map_err(|source| ProxyError::Notify {
        socket: path.to_path_buf(),
        source,
    })
}

/// Name of an abstract-namespace address, written with a leading `@`
fn abstract_name(path: &Path) -> Option<&[u8]> {
    path.as_os_str().as_bytes().strip_prefix(b"@")
}

fn connect_path(path: &Path) -> io::Result<UnixDatagram> {
    let socket = UnixDatagram::unbound()?;
    socket.connect(path)?;
    Ok(socket)
}

#[cfg(target_os = "linux")]
fn connect_abstract(name: &[u8]) -> io::Result<UnixDatagram> {
    use std::os::linux::net::SocketAddrExt;

    let addr = std::os::unix::net::SocketAddr::from_abstract_name(name)?;
    let socket = std::os::unix::net::UnixDatagram::unbound()?;
    socket.connect_addr(&addr)?;
    socket.set_nonblocking(true)?;
    UnixDatagram::from_std(socket)
}

#[cfg(not(target_os = "linux"))]
fn connect_abstract(_name: &[u8]) -> io::Result<UnixDatagram> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "abstract socket addresses are only available on Linux",
    ))
}

async fn send(socket: &UnixDatagram, path: &Path, message: &str) -> Result<()> {
    debug!(message, "Sending notify message");
    socket
        .send(message.as_bytes())
        .await
        .map_err(|source| ProxyError::Notify {
            socket: path.to_path_buf(),
            source,
        })?;
    Ok(())
}
