//! Core library for systemd-docker
//!
//! Lets a service supervisor that expects one long-lived foreground process
//! manage a detached container: the run arguments are rewritten, the container
//! is launched or re-attached, its host pid is reported over the supervisor's
//! notify socket, and the process stays alive until the container exits.

pub mod args;
pub mod config;
pub mod container;
pub mod context;
pub mod docker;
pub mod errors;
pub mod logging;
pub mod notify;
pub mod pidfile;
pub mod proxy;
pub mod runtime;
pub mod supervisor;

/// Get the version of the core library
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        let version = version();
        assert!(!version.is_empty());
        assert!(version.contains('.'));
    }
}
