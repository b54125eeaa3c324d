//! # Structured Logging Module
//!
//! Environment-aware console logging using the tracing ecosystem. Logs go to
//! stdout so containerized consumers can ship them without extra plumbing.
//!
//! - Level from `RUST_LOG`, falling back to a per-environment default
//!   (`QUEUE_PROCESSOR_ENV`: `test` and `development` log at debug,
//!   `production` at info)
//! - TTY-aware ANSI color output
//! - JSON output when `QUEUE_PROCESSOR_LOG_FORMAT=json`

use std::io::IsTerminal;
use std::sync::OnceLock;

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::messaging::MessageId;

static TRACING_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Initialize structured logging
///
/// Safe to call more than once; only the first call installs a subscriber,
/// and an already-installed global subscriber is left in place.
pub fn init_structured_logging() {
    TRACING_INITIALIZED.get_or_init(|| {
        let environment = get_environment();
        let log_level = get_log_level(&environment);
        let use_ansi = std::io::stdout().is_terminal();
        let json = use_json_format();

        let console_layer = if json {
            fmt::layer()
                .json()
                .with_target(true)
                .with_thread_ids(true)
                .with_level(true)
                .with_filter(EnvFilter::new(&log_level))
                .boxed()
        } else {
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_level(true)
                .with_ansi(use_ansi)
                .with_filter(EnvFilter::new(&log_level))
                .boxed()
        };

        if tracing_subscriber::registry()
            .with(console_layer)
            .try_init()
            .is_err()
        {
            tracing::debug!(
                "Global tracing subscriber already initialized - continuing with existing subscriber"
            );
        } else {
            tracing::info!(
                environment = %environment,
                log_level = %log_level,
                ansi_colors = use_ansi,
                json_format = json,
                "Console logging initialized"
            );
        }
    });
}

/// Current environment name
fn get_environment() -> String {
    std::env::var("QUEUE_PROCESSOR_ENV")
        .or_else(|_| std::env::var("APP_ENV"))
        .unwrap_or_else(|_| "development".to_string())
}

/// Log filter directive from `RUST_LOG` or the environment default
fn get_log_level(environment: &str) -> String {
    if let Ok(level) = std::env::var("RUST_LOG") {
        return level.to_lowercase();
    }

    level_for_environment(environment).to_string()
}

fn level_for_environment(environment: &str) -> &'static str {
    match environment {
        "production" => "info",
        _ => "debug",
    }
}

fn use_json_format() -> bool {
    std::env::var("QUEUE_PROCESSOR_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false)
}

/// Log structured data for a message operation
pub fn log_message_operation(
    operation: &str,
    queue: &str,
    message_id: Option<&MessageId>,
    status: &str,
    details: Option<&str>,
) {
    tracing::info!(
        operation = %operation,
        queue = %queue,
        message_id = message_id.map(|id| id.as_str()),
        status = %status,
        details = details,
        "📨 MESSAGE_OPERATION"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_for_environment() {
        assert_eq!(level_for_environment("production"), "info");
        assert_eq!(level_for_environment("test"), "debug");
        assert_eq!(level_for_environment("development"), "debug");
        assert_eq!(level_for_environment("staging"), "debug");
    }

    #[test]
    fn test_init_is_idempotent() {
        init_structured_logging();
        init_structured_logging();
        log_message_operation("receive", "orders", None, "idle", None);
    }
}
