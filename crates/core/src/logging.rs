//! Logging and observability
//!
//! Structured logging through `tracing`, in human-readable text or JSON,
//! selected at runtime via arguments and environment variables.
//!
//! All logging output is directed to stderr: stdout carries the relayed
//! container output.

use anyhow::Result;
use std::{io, sync::Once};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

static INIT: Once = Once::new();

/// Environment variable selecting the log format ("json" or "text")
pub const ENV_LOG_FORMAT: &str = "SYSTEMD_DOCKER_LOG_FORMAT";

/// Environment variable holding the log filter
pub const ENV_LOG: &str = "SYSTEMD_DOCKER_LOG";

/// Environment variable selecting span lifecycle events
pub const ENV_LOG_SPAN_EVENTS: &str = "SYSTEMD_DOCKER_LOG_SPAN_EVENTS";

/// Initialize the logging system
///
/// Subsequent calls are no-ops.
///
/// ## Arguments
///
/// * `format` - `None` or `"text"` for text, `"json"` for JSON; falls back to
///   `SYSTEMD_DOCKER_LOG_FORMAT` when `None`
/// * `level` - filter directive taking precedence over the environment
///
/// ## Environment Variables
///
/// * `SYSTEMD_DOCKER_LOG_FORMAT` - log output format
/// * `SYSTEMD_DOCKER_LOG` - logging filter
/// * `RUST_LOG` - fallback filter
///
/// ## Example
///
/// ```rust
/// use systemd_docker_core::logging;
///
/// logging::init(None, Some("debug")).expect("Failed to initialize logging");
/// ```
pub fn init(format: Option<&str>, level: Option<&str>) -> Result<()> {
    INIT.call_once(|| {
        let filter = create_env_filter(level);

        let env_format = std::env::var(ENV_LOG_FORMAT).ok();
        let effective_format = format.or(env_format.as_deref()).unwrap_or("text");
        let span_events = span_events_for_format(effective_format);

        match effective_format {
            "json" => {
                tracing_subscriber::registry()
                    .with(
                        fmt::layer()
                            .json()
                            .with_target(true)
                            .with_span_events(span_events)
                            .with_writer(io::stderr),
                    )
                    .with(filter)
                    .init();
            }
            _ => {
                tracing_subscriber::registry()
                    .with(
                        fmt::layer()
                            .with_target(false)
                            .with_span_events(span_events)
                            .with_writer(io::stderr),
                    )
                    .with(filter)
                    .init();
            }
        }

        tracing::debug!("Logging initialized with format: {}", effective_format);
    });

    Ok(())
}

/// Filter from an explicit level, `SYSTEMD_DOCKER_LOG`, `RUST_LOG`, or `info`
fn create_env_filter(level: Option<&str>) -> EnvFilter {
    if let Some(spec) = level {
        if let Ok(filter) = EnvFilter::try_new(spec) {
            return filter;
        }
    }

    if let Ok(spec) = std::env::var(ENV_LOG) {
        EnvFilter::try_new(&spec).unwrap_or_else(|_| EnvFilter::new("info"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    }
}

fn span_events_for_format(format: &str) -> fmt::format::FmtSpan {
    use fmt::format::FmtSpan;

    if let Ok(raw) = std::env::var(ENV_LOG_SPAN_EVENTS) {
        let mut acc = FmtSpan::NONE;
        for token in raw.split(&[',', '|'][..]).map(|t| t.trim().to_lowercase()) {
            acc |= match token.as_str() {
                "new" => FmtSpan::NEW,
                "close" => FmtSpan::CLOSE,
                "enter" => FmtSpan::ENTER,
                "exit" => FmtSpan::EXIT,
                "active" => FmtSpan::ACTIVE,
                "full" => FmtSpan::FULL,
                _ => FmtSpan::NONE,
            };
        }
        return acc;
    }

    match format {
        "json" => FmtSpan::NEW | FmtSpan::CLOSE,
        _ => FmtSpan::NONE,
    }
}

/// Check if logging has been initialized
pub fn is_initialized() -> bool {
    INIT.is_completed()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_multiple_calls_safe() {
        assert!(init(None, None).is_ok());
        assert!(init(Some("json"), Some("debug")).is_ok());
        assert!(init(Some("invalid"), None).is_ok());
        assert!(is_initialized());
    }

    #[test]
    fn test_env_filter_creation() {
        let _filter = create_env_filter(Some("debug"));
        let _filter = create_env_filter(Some("invalid_spec_@@[["));
        let _filter = create_env_filter(None);
    }

    #[test]
    fn test_default_span_events() {
        if std::env::var(ENV_LOG_SPAN_EVENTS).is_err() {
            use fmt::format::FmtSpan;
            assert_eq!(span_events_for_format("text"), FmtSpan::NONE);
            assert_eq!(
                span_events_for_format("json"),
                FmtSpan::NEW | FmtSpan::CLOSE
            );
        }
    }
}
