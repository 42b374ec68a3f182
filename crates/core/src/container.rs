//! Container discovery, launch and pid resolution
//!
//! A named container is looked up first so that re-invoking the proxy against
//! a container that already exists never creates a second one. Only when no
//! usable container is found is a new one launched through the runtime's `run`.

use crate::context::{Acquisition, HostPid, InvocationContext};
use crate::docker::{ContainerInfo, ContainerRuntime};
use crate::errors::{Result, RuntimeError};
use tracing::{debug, info, instrument};

/// Result of looking up a container by name
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Located {
    /// No container with that name exists
    Absent,
    /// A running container was found and can be adopted
    Running(ContainerInfo),
    /// A stopped container was force-removed because auto-remove is set
    Removed,
    /// A stopped container was started again and re-inspected
    Restarted(ContainerInfo),
}

/// Decide what to do with an existing container called `name`
///
/// A running container is never removed here, even when `auto_remove` is set.
#[instrument(skip(runtime))]
pub async fn locate_named(
    runtime: &dyn ContainerRuntime,
    name: &str,
    auto_remove: bool,
) -> Result<Located> {
    let Some(container) = runtime.inspect_container(name).await? else {
        debug!("No existing container named {}", name);
        return Ok(Located::Absent);
    };

    if container.running {
        info!(container_id = %container.id, pid = container.pid, "Attaching to running container");
        return Ok(Located::Running(container));
    }

    if auto_remove {
        info!(container_id = %container.id, "Removing stopped container before relaunch");
        runtime.remove_container(&container.id).await?;
        return Ok(Located::Removed);
    }

    info!(container_id = %container.id, "Starting stopped container");
    runtime.start_container(&container.id).await?;
    let restarted = runtime
        .inspect_container(name)
        .await?
        .ok_or_else(|| RuntimeError::ContainerNotFound {
            id: name.to_string(),
        })?;
    Ok(Located::Restarted(restarted))
}

/// Map a container ID to the host pid of its main process
#[instrument(skip(runtime))]
pub async fn resolve_pid(runtime: &dyn ContainerRuntime, container_id: &str) -> Result<HostPid> {
    let container = runtime
        .inspect_container(container_id)
        .await?
        .ok_or_else(|| RuntimeError::ContainerNotFound {
            id: container_id.to_string(),
        })?;
    HostPid::new(container.pid, container_id)
}

/// Launch a new container from the rewritten arguments and resolve its pid
///
/// A failed launch aborts before any pid resolution is attempted.
#[instrument(skip(runtime, ctx))]
pub async fn launch(runtime: &dyn ContainerRuntime, ctx: &InvocationContext) -> Result<(String, HostPid)> {
    let container_id = runtime.run_detached(&ctx.rewritten_arguments).await?;
    let pid = resolve_pid(runtime, &container_id).await?;
    info!(container_id = %container_id, pid = %pid, "Launched container");
    Ok((container_id, pid))
}

/// Obtain the running container for this invocation and record it in `ctx`
///
/// Exactly one of launch, attach, restart or remove-and-relaunch happens.
pub async fn acquire(runtime: &dyn ContainerRuntime, ctx: &mut InvocationContext) -> Result<()> {
    let located = match ctx.name.as_deref() {
        Some(name) => locate_named(runtime, name, ctx.auto_remove).await?,
        None => Located::Absent,
    };

    match located {
        Located::Running(container) => {
            let pid = HostPid::new(container.pid, &container.id)?;
            ctx.adopt(container.id, pid, Acquisition::Attached)
        }
        Located::Restarted(container) => {
            let pid = HostPid::new(container.pid, &container.id)?;
            ctx.adopt(container.id, pid, Acquisition::Restarted)
        }
        Located::Removed => {
            let (id, pid) = launch(runtime, ctx).await?;
            ctx.adopt(id, pid, Acquisition::Relaunched)
        }
        Located::Absent => {
            let (id, pid) = launch(runtime, ctx).await?;
            ctx.adopt(id, pid, Acquisition::Launched)
        }
    }
}
