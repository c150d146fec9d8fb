//! Logging configuration from environment variables.

use std::env;

/// Configuration for the process-wide log subscriber.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Level filter used when `RUST_LOG` is not set (trace, debug, info, warn, error)
    pub log_level: String,

    /// Whether to emit JSON formatted logs
    pub json_logs: bool,

    /// Whether to print event targets
    pub show_targets: bool,

    /// Whether to colorize human-readable output
    pub ansi: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
            show_targets: true,
            ansi: true,
        }
    }
}

impl LogConfig {
    /// Create configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `SROS_LOG_LEVEL`: Level filter (default: info)
    /// - `SROS_JSON_LOGS`: Enable JSON logs (default: false, true in containers)
    /// - `SROS_LOG_TARGETS`: Print event targets (default: true)
    pub fn from_env() -> Self {
        let is_container =
            env::var("KUBERNETES_SERVICE_HOST").is_ok() || env::var("DOCKER_CONTAINER").is_ok();

        Self {
            log_level: env::var("SROS_LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),

            json_logs: env::var("SROS_JSON_LOGS")
                .map(|v| parse_flag(&v))
                .unwrap_or(is_container),

            show_targets: env::var("SROS_LOG_TARGETS")
                .map(|v| parse_flag(&v))
                .unwrap_or(true),

            ansi: !is_container,
        }
    }

    /// Quiet configuration for test binaries.
    #[must_use]
    pub fn for_testing() -> Self {
        Self {
            log_level: "debug".to_string(),
            json_logs: false,
            show_targets: true,
            ansi: false,
        }
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
