//! # SROS Telemetry
//!
//! Structured logging for processes that embed the SROS security core.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use sros_telemetry::{init_logging, LogConfig};
//!
//! fn main() {
//!     init_logging(&LogConfig::from_env()).expect("logging");
//!     // Security decisions, handshakes and bootstrap steps now emit spans and events
//! }
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `RUST_LOG` | unset | Full filter directive, wins over everything else |
//! | `SROS_LOG_LEVEL` | `info` | Fallback level filter |
//! | `SROS_LOG_TARGETS` | `true` | Print the event target |
//! | `SROS_JSON_LOGS` | `false` | Emit one JSON object per line |

mod config;
mod logging;

pub use config::LogConfig;
pub use logging::{init_logging, init_test_logging};

use thiserror::Error;

/// Logging initialization errors
#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Invalid log filter '{filter}': {reason}")]
    Filter { filter: String, reason: String },

    #[error("Failed to install subscriber: {0}")]
    Install(String),
}
