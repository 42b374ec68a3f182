//! Pid file persistence

use crate::context::HostPid;
use crate::errors::{ProxyError, Result};
use std::path::Path;
use tracing::{debug, instrument};

/// Write `pid` as decimal text to `path`, replacing any previous contents
///
/// The file is world-readable so that unprivileged tooling can find the
/// container's main process.
#[instrument]
pub fn write_pid_file(path: &Path, pid: HostPid) -> Result<()> {
    let io_error = |source| ProxyError::Io {
        path: path.to_path_buf(),
        source,
    };

    std::fs::write(path, pid.to_string()).map_err(io_error)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o644)).map_err(io_error)?;
    }

    debug!("Wrote pid file");
    Ok(())
}
