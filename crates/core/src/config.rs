//! Invocation configuration
//!
//! Everything the proxy reads from its environment is captured once into a
//! [`ProxyConfig`] and handed to each component at construction time.

use crate::runtime::{RuntimeFactory, RuntimeKind};
use std::path::PathBuf;

/// Default runtime endpoint when `DOCKER_HOST` is unset
pub const DEFAULT_RUNTIME_ENDPOINT: &str = "unix:///var/run/docker.sock";

/// Environment variable naming the runtime endpoint
pub const ENV_RUNTIME_ENDPOINT: &str = "DOCKER_HOST";

/// Environment variable naming the supervisor's notification socket
pub const ENV_NOTIFY_SOCKET: &str = "NOTIFY_SOCKET";

/// Environment variable selecting the runtime kind
pub const ENV_RUNTIME: &str = "SYSTEMD_DOCKER_RUNTIME";

/// Environment variable overriding the runtime binary path
pub const ENV_RUNTIME_PATH: &str = "SYSTEMD_DOCKER_RUNTIME_PATH";

/// Snapshot of the configuration an invocation runs with
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProxyConfig {
    /// Which runtime front end is driven
    pub runtime_kind: RuntimeKind,
    /// Explicitly chosen runtime binary; `None` runs the kind's default binary
    pub runtime_path: Option<String>,
    /// `DOCKER_HOST` as found in the environment
    ///
    /// Exported to spawned runtime commands only when set, so an active
    /// runtime context is left alone otherwise.
    pub runtime_endpoint: Option<String>,
    /// Supervisor notification socket, if the supervisor provided one
    pub notify_socket: Option<PathBuf>,
    /// Ordered snapshot of the process environment
    pub environment: Vec<(String, String)>,
}

impl ProxyConfig {
    /// Build the configuration from the current process environment
    pub fn from_env() -> Self {
        Self::from_vars(std::env::vars())
    }

    /// Build the configuration from an explicit environment snapshot
    pub fn from_vars<I, K, V>(vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let environment: Vec<(String, String)> = vars
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();

        let lookup = |key: &str| -> Option<String> {
            environment
                .iter()
                .rev()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.clone())
                .filter(|v| !v.is_empty())
        };

        let runtime_kind = RuntimeFactory::detect_runtime(None, lookup(ENV_RUNTIME).as_deref());
        let runtime_path = lookup(ENV_RUNTIME_PATH);
        let runtime_endpoint = lookup(ENV_RUNTIME_ENDPOINT);
        let notify_socket = lookup(ENV_NOTIFY_SOCKET).map(PathBuf::from);

        Self {
            runtime_kind,
            runtime_path,
            runtime_endpoint,
            notify_socket,
            environment,
        }
    }

    /// Apply a runtime kind chosen on the command line
    pub fn with_runtime_kind(mut self, kind: RuntimeKind) -> Self {
        self.runtime_kind = kind;
        self
    }

    /// Apply a runtime binary path chosen on the command line
    pub fn with_runtime_path(mut self, path: impl Into<String>) -> Self {
        self.runtime_path = Some(path.into());
        self
    }

    /// Binary spawned for runtime operations
    pub fn runtime_binary(&self) -> &str {
        self.runtime_path
            .as_deref()
            .unwrap_or(self.runtime_kind.as_str())
    }

    /// Endpoint the runtime talks to, falling back to the local default socket
    pub fn effective_endpoint(&self) -> &str {
        self.runtime_endpoint
            .as_deref()
            .unwrap_or(DEFAULT_RUNTIME_ENDPOINT)
    }
}
