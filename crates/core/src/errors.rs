//! Error types and handling
//!
//! Runtime failures are described by [`RuntimeError`] and wrapped, together with
//! the other failure classes of an invocation, in [`ProxyError`]. Every stage
//! returns [`Result`] and the first failure aborts the remaining pipeline.

use std::path::PathBuf;
use thiserror::Error;

/// Container runtime errors
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// Runtime binary is not installed or not executable
    #[error("Container runtime '{binary}' is not installed or not accessible")]
    NotInstalled { binary: String },

    /// Runtime CLI command error
    #[error("Runtime CLI error: {0}")]
    CLIError(String),

    /// Container not found
    #[error("Container not found: {id}")]
    ContainerNotFound { id: String },

    /// The `run` invocation exited unsuccessfully
    #[error("Container launch failed with exit code {code}")]
    LaunchFailed { code: i32 },
}

/// Main error enum for a proxy invocation
#[derive(Error, Debug)]
pub enum ProxyError {
    /// Malformed invocation
    #[error("Usage error: {message}")]
    Usage { message: String },

    /// The container runtime rejected or failed an operation
    #[error("Runtime error: {0}")]
    Runtime(#[from] RuntimeError),

    /// Resolved data violates an invariant
    #[error("Invalid state: {message}")]
    InvalidState { message: String },

    /// The container's main process died before the handshake completed
    #[error("Container exited before the supervisor could be notified (pid {pid})")]
    EarlyExit { pid: i64 },

    /// A notification datagram could not be sent
    #[error("Failed to notify supervisor via {}: {source}", socket.display())]
    Notify {
        socket: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Pid file I/O error
    #[error("Failed to write {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ProxyError {
    pub(crate) fn usage(message: impl Into<String>) -> Self {
        Self::Usage {
            message: message.into(),
        }
    }

    pub(crate) fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState {
            message: message.into(),
        }
    }
}

/// Convenience type alias for Results with ProxyError
pub type Result<T> = std::result::Result<T, ProxyError>;
