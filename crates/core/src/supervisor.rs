//! Container supervision, log relay and cleanup
//!
//! Once the supervisor has been told which pid to track, the proxy stays alive
//! for as long as the container runs. Supervision is a two-state automaton:
//! `Running` waits on the runtime until the container exits and moves to
//! `ObservedStopped` only when an inspect reports the container not running.

use crate::docker::ContainerRuntime;
use crate::errors::{Result, RuntimeError};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

/// Pause before polling again after a failed wait
pub const WAIT_RETRY_INTERVAL: Duration = Duration::from_millis(1000);

/// Supervision state of the tracked container
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisionState {
    Running,
    ObservedStopped { exit_code: i64 },
}

/// Advance the automaton by one observation
///
/// Stays in `Running` for as long as the runtime's own running flag is set.
pub async fn step(runtime: &dyn ContainerRuntime, container_id: &str) -> Result<SupervisionState> {
    let container = runtime
        .inspect_container(container_id)
        .await?
        .ok_or_else(|| RuntimeError::ContainerNotFound {
            id: container_id.to_string(),
        })?;

    if !container.running {
        return Ok(SupervisionState::ObservedStopped {
            exit_code: container.exit_code,
        });
    }

    match runtime.wait_container(container_id).await {
        Ok(code) => debug!(exit_code = code, "Wait returned"),
        Err(e) => {
            warn!("Waiting on container failed, polling again: {}", e);
            tokio::time::sleep(WAIT_RETRY_INTERVAL).await;
        }
    }
    Ok(SupervisionState::Running)
}

/// Block until the container is observed stopped and return its exit code
///
/// There is no timeout: a container that runs forever is supervised forever.
#[instrument(skip(runtime))]
pub async fn supervise(runtime: &dyn ContainerRuntime, container_id: &str) -> Result<i64> {
    let mut state = SupervisionState::Running;
    loop {
        match state {
            SupervisionState::Running => state = step(runtime, container_id).await?,
            SupervisionState::ObservedStopped { exit_code } => {
                info!(exit_code, "Container stopped");
                return Ok(exit_code);
            }
        }
    }
}

/// Relay the container's output to this process's own streams in the background
///
/// The task is never awaited by the main flow; failures are only logged.
pub fn spawn_log_relay(runtime: Arc<dyn ContainerRuntime>, container_id: String) -> JoinHandle<()> {
    tokio::spawn(async move {
        match runtime.stream_logs(&container_id).await {
            Ok(()) => debug!(container_id = %container_id, "Log stream closed"),
            Err(e) => warn!(container_id = %container_id, "Log relay failed: {}", e),
        }
    })
}

/// Force-remove the container when auto-remove was requested
///
/// Returns whether a removal happened.
#[instrument(skip(runtime))]
pub async fn cleanup(runtime: &dyn ContainerRuntime, container_id: &str, auto_remove: bool) -> Result<bool> {
    if !auto_remove {
        return Ok(false);
    }
    runtime.remove_container(container_id).await?;
    info!("Removed container");
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::docker::mock::{MockCall, MockContainer, MockRuntime, MockRuntimeConfig};
    use crate::errors::ProxyError;

    #[tokio::test]
    async fn test_stopped_container_returns_immediately() {
        let runtime = MockRuntime::new();
        runtime.add_container(MockContainer::stopped("abc", "job", 3));
        assert_eq!(supervise(&runtime, "abc").await.unwrap(), 3);
        assert!(!runtime.calls().iter().any(|c| matches!(c, MockCall::Wait(_))));
    }

    #[tokio::test]
    async fn test_running_container_is_waited_on() {
        let runtime = MockRuntime::with_config(MockRuntimeConfig {
            wait_exit_code: 0,
            ..Default::default()
        });
        runtime.add_container(MockContainer::running("abc", "job", 10));
        assert_eq!(supervise(&runtime, "abc").await.unwrap(), 0);
        assert_eq!(
            runtime.calls(),
            vec![
                MockCall::Inspect("abc".to_string()),
                MockCall::Wait("abc".to_string()),
                MockCall::Inspect("abc".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_step_transitions() {
        let runtime = MockRuntime::new();
        runtime.add_container(MockContainer::running("abc", "job", 10));
        assert_eq!(step(&runtime, "abc").await.unwrap(), SupervisionState::Running);
        assert_eq!(
            step(&runtime, "abc").await.unwrap(),
            SupervisionState::ObservedStopped { exit_code: 0 }
        );
    }

    #[tokio::test]
    async fn test_vanished_container_is_error() {
        let runtime = MockRuntime::new();
        let err = supervise(&runtime, "ghost").await.unwrap_err();
        assert!(matches!(
            err,
            ProxyError::Runtime(RuntimeError::ContainerNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_cleanup_only_with_auto_remove() {
        let runtime = MockRuntime::new();
        runtime.add_container(MockContainer::stopped("abc", "job", 0));
        assert!(!cleanup(&runtime, "abc", false).await.unwrap());
        assert!(runtime.container("abc").is_some());
        assert!(cleanup(&runtime, "abc", true).await.unwrap());
        assert!(runtime.container("abc").is_none());
    }

    #[tokio::test]
    async fn test_cleanup_failure_is_runtime_error() {
        let runtime = MockRuntime::with_config(MockRuntimeConfig {
            fail_remove: true,
            ..Default::default()
        });
        runtime.add_container(MockContainer::stopped("abc", "job", 0));
        let err = cleanup(&runtime, "abc", true).await.unwrap_err();
        assert!(matches!(err, ProxyError::Runtime(_)));
    }

    #[tokio::test]
    async fn test_log_relay_failure_is_contained() {
        let runtime = MockRuntime::with_config(MockRuntimeConfig {
            fail_logs: true,
            ..Default::default()
        });
        let handle = spawn_log_relay(Arc::new(runtime.clone()), "abc".to_string());
        handle.await.unwrap();
        assert_eq!(runtime.calls(), vec![MockCall::Logs("abc".to_string())]);
    }
}
