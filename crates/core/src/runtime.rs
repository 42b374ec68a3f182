//! Container runtime selection
//!
//! The proxy drives Docker or Podman through their command-line front ends,
//! which share a compatible `run`/`inspect`/`start`/`rm`/`wait`/`logs` surface.

use crate::config::ProxyConfig;
use crate::docker::CliRuntime;
use crate::errors::{ProxyError, Result};

/// Runtime selection options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RuntimeKind {
    /// Docker runtime
    #[default]
    Docker,
    /// Podman runtime
    Podman,
}

impl RuntimeKind {
    /// Get string representation, which is also the default binary name
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Docker => "docker",
            Self::Podman => "podman",
        }
    }
}

impl std::str::FromStr for RuntimeKind {
    type Err = ProxyError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "docker" => Ok(Self::Docker),
            "podman" => Ok(Self::Podman),
            _ => Err(ProxyError::usage(format!(
                "Unknown runtime: {}. Supported runtimes: docker, podman",
                s
            ))),
        }
    }
}

impl std::fmt::Display for RuntimeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Runtime factory for creating container runtime clients
pub struct RuntimeFactory;

impl RuntimeFactory {
    /// Detect runtime from CLI flag, environment value, or default
    ///
    /// Precedence: CLI flag > SYSTEMD_DOCKER_RUNTIME > default (docker).
    /// An unparseable environment value is ignored.
    pub fn detect_runtime(cli_runtime: Option<RuntimeKind>, env_value: Option<&str>) -> RuntimeKind {
        if let Some(runtime) = cli_runtime {
            return runtime;
        }

        if let Some(env_runtime) = env_value {
            if let Ok(runtime) = env_runtime.parse() {
                return runtime;
            }
        }

        RuntimeKind::Docker
    }

    /// Create the CLI-backed runtime client described by `config`
    pub fn create_runtime(config: &ProxyConfig) -> Result<CliRuntime> {
        let binary = config.runtime_binary();
        if binary.trim().is_empty() {
            return Err(ProxyError::usage("Runtime binary path must not be empty"));
        }
        Ok(CliRuntime::new(binary, config.runtime_endpoint.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_runtime_kind_parse() {
        assert_eq!("docker".parse::<RuntimeKind>().unwrap(), RuntimeKind::Docker);
        assert_eq!("Podman".parse::<RuntimeKind>().unwrap(), RuntimeKind::Podman);
        assert!("rkt".parse::<RuntimeKind>().is_err());
    }

    #[test]
    fn test_detect_runtime_precedence() {
        assert_eq!(
            RuntimeFactory::detect_runtime(Some(RuntimeKind::Docker), Some("podman")),
            RuntimeKind::Docker
        );
        assert_eq!(
            RuntimeFactory::detect_runtime(None, Some("podman")),
            RuntimeKind::Podman
        );
        assert_eq!(
            RuntimeFactory::detect_runtime(None, Some("bogus")),
            RuntimeKind::Docker
        );
        assert_eq!(RuntimeFactory::detect_runtime(None, None), RuntimeKind::Docker);
    }

    #[test]
    fn test_create_runtime_rejects_empty_path() {
        let config = ProxyConfig {
            runtime_path: Some("  ".to_string()),
            ..ProxyConfig::default()
        };
        assert!(RuntimeFactory::create_runtime(&config).is_err());
    }

    #[test]
    fn test_create_runtime_uses_configured_binary() {
        let config = ProxyConfig {
            runtime_path: Some("/usr/local/bin/podman".to_string()),
            ..ProxyConfig::default()
        };
        let runtime = RuntimeFactory::create_runtime(&config).unwrap();
        assert_eq!(runtime.runtime_path(), "/usr/local/bin/podman");
    }

    #[test]
    fn test_endpoint_passed_only_when_configured() {
        let runtime = RuntimeFactory::create_runtime(&ProxyConfig::default()).unwrap();
        assert!(format!("{:?}", runtime).contains("endpoint: None"));

        let config = ProxyConfig::from_vars([("DOCKER_HOST", "tcp://10.0.0.1:2375")]);
        let runtime = RuntimeFactory::create_runtime(&config).unwrap();
        assert!(format!("{:?}", runtime).contains("tcp://10.0.0.1:2375"));
    }
}
