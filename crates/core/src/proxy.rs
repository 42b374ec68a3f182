//! End-to-end invocation flow
//!
//! acquire container → notify supervisor → write pid file → start log relay →
//! supervise until exit → clean up. Each stage either advances or aborts the
//! whole invocation; side effects of earlier stages are not rolled back.

use crate::config::ProxyConfig;
use crate::container;
use crate::context::{Acquisition, HostPid, InvocationContext};
use crate::docker::ContainerRuntime;
use crate::errors::Result;
use crate::notify::{LivenessProbe, NotifyClient, ProcFsProbe};
use crate::pidfile::write_pid_file;
use crate::supervisor;
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// What an invocation did
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvocationOutcome {
    pub container_id: String,
    pub host_pid: HostPid,
    pub acquisition: Acquisition,
    /// Exit code observed by supervision; `None` when supervision was skipped
    pub exit_code: Option<i64>,
    /// Whether the container was removed at the end
    pub removed: bool,
}

/// Drives one invocation against a runtime
pub struct Proxy {
    runtime: Arc<dyn ContainerRuntime>,
    notifier: NotifyClient,
    probe: Arc<dyn LivenessProbe>,
}

impl Proxy {
    pub fn new(runtime: Arc<dyn ContainerRuntime>, config: &ProxyConfig) -> Self {
        Self {
            runtime,
            notifier: NotifyClient::new(config.notify_socket.clone()),
            probe: Arc::new(ProcFsProbe::new()),
        }
    }

    pub fn with_notifier(mut self, notifier: NotifyClient) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_probe(mut self, probe: Arc<dyn LivenessProbe>) -> Self {
        self.probe = probe;
        self
    }

    /// Run the full flow for `ctx`
    #[instrument(skip_all, fields(name = ?ctx.name))]
    pub async fn run(&self, mut ctx: InvocationContext) -> Result<InvocationOutcome> {
        let runtime = self.runtime.as_ref();

        container::acquire(runtime, &mut ctx).await?;
        let (container_id, host_pid) = ctx.adopted()?;
        let container_id = container_id.to_string();
        let acquisition = ctx.acquisition().unwrap_or(Acquisition::Launched);
        info!(container_id = %container_id, pid = %host_pid, %acquisition, "Container resolved");

        self.notifier
            .notify(host_pid, ctx.notify_requested, self.probe.as_ref())
            .await?;

        if let Some(path) = &ctx.pid_file {
            write_pid_file(path, host_pid)?;
        }

        if ctx.relay_logs {
            supervisor::spawn_log_relay(self.runtime.clone(), container_id.clone());
        }

        let mut outcome = InvocationOutcome {
            container_id,
            host_pid,
            acquisition,
            exit_code: None,
            removed: false,
        };

        if !(ctx.relay_logs || ctx.auto_remove) {
            debug!("Neither log relay nor auto-remove requested, not supervising");
            return Ok(outcome);
        }

        outcome.exit_code = Some(supervisor::supervise(runtime, &outcome.container_id).await?);
        outcome.removed =
            supervisor::cleanup(runtime, &outcome.container_id, ctx.auto_remove).await?;
        Ok(outcome)
    }
}
