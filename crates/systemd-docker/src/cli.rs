use anyhow::Result;
use clap::error::ErrorKind;
use clap::{ArgAction, Parser, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;
use systemd_docker_core::args::{self, find_run_marker};
use systemd_docker_core::config::ProxyConfig;
use systemd_docker_core::context::OwnOptions;
use systemd_docker_core::errors::ProxyError;
use systemd_docker_core::proxy::Proxy;
use systemd_docker_core::runtime::{RuntimeFactory, RuntimeKind};
use tracing::{debug, info};

/// Runtime selection options
#[derive(Debug, Clone, Copy, ValueEnum, PartialEq)]
pub enum RuntimeOption {
    /// Docker runtime
    Docker,
    /// Podman runtime
    Podman,
}

impl From<RuntimeOption> for RuntimeKind {
    fn from(runtime: RuntimeOption) -> Self {
        match runtime {
            RuntimeOption::Docker => RuntimeKind::Docker,
            RuntimeOption::Podman => RuntimeKind::Podman,
        }
    }
}

/// Log format options
#[derive(Debug, Clone, ValueEnum)]
pub enum LogFormat {
    /// Human-readable text format
    Text,
    /// JSON structured format
    Json,
}

/// Log level options
#[derive(Debug, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

/// Flags accepted before the `run` marker
#[derive(Parser, Debug)]
#[command(
    name = env!("CARGO_PKG_NAME"),
    version,
    about = "Run a container as a systemd service",
    long_about = "Run a container as a systemd service\n\nEverything after the first `run` is handed to the container runtime. \
                  The container's main process is reported to systemd as MAINPID and the unit is kept alive until the container exits.",
    override_usage = "systemd-docker [OPTIONS] run <RUNTIME_ARGS>...",
    color = clap::ColorChoice::Auto
)]
pub struct Cli {
    /// Write the container's host pid to this file
    #[arg(short = 'p', long, value_name = "PATH")]
    pub pid_file: Option<PathBuf>,

    /// Relay container logs to this process's stdout/stderr
    #[arg(
        short = 'l',
        long,
        action = ArgAction::Set,
        num_args = 0..=1,
        require_equals = true,
        default_value_t = true,
        default_missing_value = "true"
    )]
    pub logs: bool,

    /// The container sends READY=1 itself through NOTIFY_SOCKET
    #[arg(short = 'n', long)]
    pub notify: bool,

    /// Forward this process's environment into the container
    #[arg(short = 'e', long)]
    pub env: bool,

    /// Remove the container after it exits
    #[arg(long)]
    pub rm: bool,

    /// Container runtime to use (docker or podman, can be set via SYSTEMD_DOCKER_RUNTIME env var)
    #[arg(long, value_enum)]
    pub runtime: Option<RuntimeOption>,

    /// Path to the runtime executable (can be set via SYSTEMD_DOCKER_RUNTIME_PATH env var)
    #[arg(long, value_name = "PATH")]
    pub runtime_path: Option<String>,

    /// Log format (text or json, defaults to text, can be set via SYSTEMD_DOCKER_LOG_FORMAT env var)
    #[arg(long, value_enum)]
    pub log_format: Option<LogFormat>,

    /// Log level (defaults to info, or SYSTEMD_DOCKER_LOG / RUST_LOG when set)
    #[arg(long, value_enum)]
    pub log_level: Option<LogLevel>,
}

impl Cli {
    /// Own options handed to argument rewriting
    pub fn own_options(&self) -> OwnOptions {
        OwnOptions {
            pid_file: self.pid_file.clone(),
            logs: self.logs,
            notify: self.notify,
            env: self.env,
            rm: self.rm,
        }
    }

    /// Apply command-line runtime overrides on top of the environment
    fn apply(&self, mut config: ProxyConfig) -> ProxyConfig {
        if let Some(runtime) = self.runtime {
            config = config.with_runtime_kind(runtime.into());
        }
        if let Some(path) = &self.runtime_path {
            config = config.with_runtime_path(path.clone());
        }
        config
    }

    fn init_logging(&self) -> Result<()> {
        let log_format = match self.log_format {
            Some(LogFormat::Text) => Some("text"),
            Some(LogFormat::Json) => Some("json"),
            None => None,
        };
        systemd_docker_core::logging::init(log_format, self.log_level.as_ref().map(LogLevel::as_str))
    }
}

fn usage_error(message: impl Into<String>) -> anyhow::Error {
    ProxyError::Usage {
        message: message.into(),
    }
    .into()
}

/// Parse own flags, exiting directly for `--help` and `--version`
fn parse_own_flags(bin: &str, own: &[String]) -> Result<Cli> {
    match Cli::try_parse_from(std::iter::once(bin).chain(own.iter().map(String::as_str))) {
        Ok(cli) => Ok(cli),
        Err(err) if matches!(err.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            err.exit()
        }
        Err(err) => Err(usage_error(clap_message(&err))),
    }
}

/// First line of a clap error without its `error:` prefix
fn clap_message(err: &clap::Error) -> String {
    let rendered = err.render().to_string();
    let first = rendered.lines().next().unwrap_or_default().trim();
    first.strip_prefix("error:").unwrap_or(first).trim().to_string()
}

fn asks_for_help_or_version(args: &[String]) -> bool {
    args.iter()
        .any(|arg| matches!(arg.as_str(), "-h" | "--help" | "-V" | "--version"))
}

/// Run one invocation for the full process argument vector (including argv[0])
pub async fn dispatch(argv: Vec<String>) -> Result<()> {
    let (bin, rest) = match argv.split_first() {
        Some((bin, rest)) => (bin.as_str(), rest),
        None => (env!("CARGO_PKG_NAME"), &argv[..]),
    };

    if find_run_marker(rest).is_none() && asks_for_help_or_version(rest) {
        parse_own_flags(bin, rest)?;
    }

    let (own, run_args) = args::split_at_run_marker(rest)?;
    let cli = parse_own_flags(bin, own)?;
    cli.init_logging()?;
    debug!(?cli, "Parsed own flags");

    let config = cli.apply(ProxyConfig::from_env());
    let runtime = RuntimeFactory::create_runtime(&config)?;
    debug!(
        runtime = %config.runtime_kind,
        path = %config.runtime_binary(),
        endpoint = %config.effective_endpoint(),
        "Using container runtime"
    );

    let ctx = args::rewrite(&cli.own_options(), run_args, &config);
    let outcome = Proxy::new(Arc::new(runtime), &config).run(ctx).await?;

    match outcome.exit_code {
        Some(code) => info!(
            container_id = %outcome.container_id,
            exit_code = code,
            removed = outcome.removed,
            "Container exited"
        ),
        None => info!(
            container_id = %outcome.container_id,
            pid = %outcome.host_pid,
            "Container left running"
        ),
    }
    Ok(())
}
