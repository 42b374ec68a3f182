//! Run-argument interpretation and rewriting
//!
//! The proxy never parses the runtime's flag grammar. It scans the tokens after
//! the `run` marker for the handful of flags that change its own behavior and
//! passes everything else through untouched.

use crate::config::{ProxyConfig, ENV_NOTIFY_SOCKET};
use crate::context::{InvocationContext, OwnOptions};
use crate::errors::{ProxyError, Result};
use tracing::{debug, instrument};

/// Token separating the proxy's own flags from the runtime's run arguments
pub const RUN_MARKER: &str = "run";

/// Detach flag prepended when the caller did not ask for detached mode
pub const FORCED_DETACH_FLAG: &str = "-d";

/// Environment keys never forwarded into the container
pub const HOST_ONLY_ENV_KEYS: &[&str] = &["HOME", "PATH"];

/// Position of the first run marker, if any
pub fn find_run_marker(args: &[String]) -> Option<usize> {
    args.iter().position(|arg| arg == RUN_MARKER)
}

/// Split the full argument vector into own flags and runtime run arguments
pub fn split_at_run_marker(args: &[String]) -> Result<(&[String], &[String])> {
    let index = find_run_marker(args)
        .ok_or_else(|| ProxyError::usage(format!("{} not found in arguments", RUN_MARKER)))?;
    Ok((&args[..index], &args[index + 1..]))
}

fn is_rm_flag(arg: &str) -> bool {
    arg == "-rm" || arg == "--rm"
}

fn is_detach_flag(arg: &str) -> bool {
    arg == "-d" || arg == "-detach" || arg == "--detach"
}

/// Value of a `-name`/`--name` token, looking at the next token when the value
/// is not attached with `=`
fn name_value<'a>(arg: &'a str, next: Option<&'a String>) -> Option<Option<&'a str>> {
    let rest = arg
        .strip_prefix("--name")
        .or_else(|| arg.strip_prefix("-name"))?;
    if rest.is_empty() {
        Some(next.map(String::as_str))
    } else {
        rest.strip_prefix('=').map(Some)
    }
}

/// Container name requested in the run arguments; the last occurrence wins
pub fn extract_name(run_args: &[String]) -> Option<String> {
    let mut name = None;
    for (i, arg) in run_args.iter().enumerate() {
        if let Some(value) = name_value(arg, run_args.get(i + 1)) {
            name = value.filter(|v| !v.is_empty()).map(str::to_string);
        }
    }
    name
}

/// Build the invocation context for `run_args` under `options`
///
/// Pure: the same arguments, options and configuration always produce the same
/// rewritten argument vector.
#[instrument(skip(options, run_args, config), fields(args = run_args.len()))]
pub fn rewrite(options: &OwnOptions, run_args: &[String], config: &ProxyConfig) -> InvocationContext {
    let mut auto_remove = options.rm;
    let mut wants_detach = false;
    let mut passthrough = Vec::with_capacity(run_args.len() + 1);

    for arg in run_args {
        if is_rm_flag(arg) {
            auto_remove = true;
            continue;
        }
        if is_detach_flag(arg) {
            wants_detach = true;
        }
        passthrough.push(arg.clone());
    }

    let mut prefix: Vec<String> = Vec::new();

    let notify_socket = config.notify_socket.clone();
    let notify_requested = match (&notify_socket, options.notify) {
        (Some(socket), true) => {
            let socket = socket.display().to_string();
            prefix.push("-e".to_string());
            prefix.push(format!("{}={}", ENV_NOTIFY_SOCKET, socket));
            prefix.push("-v".to_string());
            prefix.push(format!("{}:{}", socket, socket));
            true
        }
        _ => false,
    };

    if options.env {
        for (key, value) in &config.environment {
            if HOST_ONLY_ENV_KEYS.contains(&key.as_str()) {
                continue;
            }
            prefix.push("-e".to_string());
            prefix.push(format!("{}={}", key, value));
        }
    }

    if !wants_detach {
        prefix.push(FORCED_DETACH_FLAG.to_string());
    }

    let mut rewritten = prefix;
    rewritten.extend(passthrough);

    let name = extract_name(run_args);
    debug!(
        name = ?name,
        auto_remove,
        wants_detach,
        notify_requested,
        "Rewrote run arguments"
    );

    InvocationContext {
        raw_arguments: run_args.to_vec(),
        rewritten_arguments: rewritten,
        name,
        auto_remove,
        wants_detach: true,
        relay_logs: options.logs,
        notify_requested,
        notify_socket,
        pid_file: options.pid_file.clone(),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn strings(args: &[&str]) -> Vec<String> {
        args.iter().map(|s| s.to_string()).collect()
    }

    fn count(args: &[String], token: &str) -> usize {
        args.iter().filter(|a| *a == token).count()
    }

    #[test]
    fn test_split_requires_run_marker() {
        let args = strings(&["-p", "/run/x.pid", "nginx"]);
        let err = split_at_run_marker(&args).unwrap_err();
        assert!(matches!(err, ProxyError::Usage { .. }));
    }

    #[test]
    fn test_split_at_first_marker() {
        let args = strings(&["-p", "/run/x.pid", "run", "-name=web", "nginx", "run"]);
        let (own, run) = split_at_run_marker(&args).unwrap();
        assert_eq!(own, &strings(&["-p", "/run/x.pid"])[..]);
        assert_eq!(run, &strings(&["-name=web", "nginx", "run"])[..]);
    }

    #[test]
    fn test_forced_detach_preserves_order() {
        let run = strings(&["-p", "8080:80", "--name", "web", "nginx", "-g", "daemon off;"]);
        let ctx = rewrite(&OwnOptions::default(), &run, &ProxyConfig::default());

        assert_eq!(count(&ctx.rewritten_arguments, "-d"), 1);
        assert_eq!(ctx.rewritten_arguments[0], "-d");
        assert_eq!(&ctx.rewritten_arguments[1..], &run[..]);
        assert!(ctx.wants_detach);
    }

    #[test]
    fn test_existing_detach_not_duplicated() {
        for flag in ["-d", "-detach", "--detach"] {
            let run = strings(&[flag, "nginx"]);
            let ctx = rewrite(&OwnOptions::default(), &run, &ProxyConfig::default());
            assert_eq!(ctx.rewritten_arguments, run);
            assert_eq!(count(&ctx.rewritten_arguments, "-d"), usize::from(flag == "-d"));
        }
    }

    #[test]
    fn test_rm_is_stripped() {
        for flag in ["-rm", "--rm"] {
            let run = strings(&[flag, "busybox", "true"]);
            let ctx = rewrite(&OwnOptions::default(), &run, &ProxyConfig::default());
            assert!(ctx.auto_remove);
            assert_eq!(ctx.rewritten_arguments, strings(&["-d", "busybox", "true"]));
            assert_eq!(ctx.raw_arguments, run);
        }
    }

    #[test]
    fn test_own_rm_sets_auto_remove() {
        let opts = OwnOptions {
            rm: true,
            ..Default::default()
        };
        let ctx = rewrite(&opts, &strings(&["busybox"]), &ProxyConfig::default());
        assert!(ctx.auto_remove);
        assert_eq!(count(&ctx.rewritten_arguments, "--rm"), 0);
    }

    #[test]
    fn test_name_forms() {
        assert_eq!(extract_name(&strings(&["-name=web", "nginx"])), Some("web".into()));
        assert_eq!(extract_name(&strings(&["--name=web", "nginx"])), Some("web".into()));
        assert_eq!(extract_name(&strings(&["--name", "web", "nginx"])), Some("web".into()));
        assert_eq!(extract_name(&strings(&["-name", "web", "nginx"])), Some("web".into()));
        assert_eq!(extract_name(&strings(&["--name"])), None);
        assert_eq!(extract_name(&strings(&["--name="])), None);
        assert_eq!(extract_name(&strings(&["--namespace=x", "nginx"])), None);
        assert_eq!(
            extract_name(&strings(&["--name=a", "--name", "b", "nginx"])),
            Some("b".into())
        );
    }

    #[test]
    fn test_name_is_kept_in_rewritten_args() {
        let run = strings(&["--name", "web", "nginx"]);
        let ctx = rewrite(&OwnOptions::default(), &run, &ProxyConfig::default());
        assert_eq!(ctx.name.as_deref(), Some("web"));
        assert!(ctx.rewritten_arguments.contains(&"--name".to_string()));
        assert!(ctx.rewritten_arguments.contains(&"web".to_string()));
    }

    #[test]
    fn test_env_inherit_skips_host_only_keys() {
        let config = ProxyConfig::from_vars([("HOME", "/root"), ("PATH", "/bin"), ("FOO", "bar")]);
        let opts = OwnOptions {
            env: true,
            ..Default::default()
        };
        let ctx = rewrite(&opts, &strings(&["busybox"]), &config);
        assert_eq!(
            ctx.rewritten_arguments,
            strings(&["-e", "FOO=bar", "-d", "busybox"])
        );
    }

    #[test]
    fn test_env_not_inherited_by_default() {
        let config = ProxyConfig::from_vars([("FOO", "bar")]);
        let ctx = rewrite(&OwnOptions::default(), &strings(&["busybox"]), &config);
        assert_eq!(ctx.rewritten_arguments, strings(&["-d", "busybox"]));
    }

    #[test]
    fn test_notify_exposes_socket_when_available() {
        let config = ProxyConfig {
            notify_socket: Some(PathBuf::from("/run/systemd/notify")),
            ..Default::default()
        };
        let opts = OwnOptions {
            notify: true,
            ..Default::default()
        };
        let ctx = rewrite(&opts, &strings(&["nginx"]), &config);
        assert!(ctx.notify_requested);
        assert_eq!(
            ctx.rewritten_arguments,
            strings(&[
                "-e",
                "NOTIFY_SOCKET=/run/systemd/notify",
                "-v",
                "/run/systemd/notify:/run/systemd/notify",
                "-d",
                "nginx"
            ])
        );
    }

    #[test]
    fn test_notify_disabled_without_socket() {
        let opts = OwnOptions {
            notify: true,
            ..Default::default()
        };
        let ctx = rewrite(&opts, &strings(&["nginx"]), &ProxyConfig::default());
        assert!(!ctx.notify_requested);
        assert_eq!(ctx.rewritten_arguments, strings(&["-d", "nginx"]));
    }

    #[test]
    fn test_rewritten_context_starts_unadopted() {
        let opts = OwnOptions {
            pid_file: Some(PathBuf::from("/run/web.pid")),
            ..Default::default()
        };
        let mut ctx = rewrite(&opts, &strings(&["--name=web", "nginx"]), &ProxyConfig::default());
        assert!(ctx.container_id().is_none());
        assert!(ctx.host_pid().is_none());
        assert!(ctx.acquisition().is_none());
        assert!(ctx.adopted().is_err());
        assert_eq!(ctx.pid_file, opts.pid_file);

        let pid = crate::context::HostPid::new(42, "abc").unwrap();
        ctx.adopt("abc".to_string(), pid, crate::context::Acquisition::Launched)
            .unwrap();
        assert_eq!(ctx.adopted().unwrap(), ("abc", pid));
    }

    #[test]
    fn test_rewrite_is_deterministic() {
        let config = ProxyConfig::from_vars([("A", "1"), ("B", "2")]);
        let opts = OwnOptions {
            env: true,
            ..Default::default()
        };
        let run = strings(&["--rm", "--name=x", "img"]);
        let first = rewrite(&opts, &run, &config);
        let second = rewrite(&opts, &run, &config);
        assert_eq!(first.rewritten_arguments, second.rewritten_arguments);
    }
}
