//! # Security Errors
//!
//! Error taxonomy shared by every layer of the security core.
//!
//! Configuration, keystore and initialization errors are fatal to the
//! process. Handshake and connection errors are fatal to one connection and
//! leave retry policy to the transport above.

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Errors raised by the security core.
#[derive(Debug, Error)]
pub enum SecurityError {
    /// Untrusted or malformed node, graph or file name
    #[error("Invalid name '{name}': {reason}")]
    InvalidName { name: String, reason: &'static str },

    /// Underlying filesystem failure
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Keystore or graph file is absent
    #[error("File not found: {}", path.display())]
    NotFound { path: PathBuf },

    /// TLS handshake failed or produced no usable peer certificate
    #[error("TLS handshake failed: {0}")]
    Handshake(String),

    /// Peer certificate common name does not follow the role convention
    #[error("Peer common name '{common_name}' does not end in '{expected_suffix}'")]
    IdentityFormat {
        common_name: String,
        expected_suffix: &'static str,
    },

    /// Peer identity is not in this node's allowed clients
    #[error("Peer '{identity}' is not an allowed client")]
    UntrustedPeer { identity: String },

    /// Outbound connect or handshake failed
    #[error("Connection to {endpoint} failed: {reason}")]
    Connection { endpoint: String, reason: String },

    /// A bounded operation ran past its deadline
    #[error("{operation} timed out after {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    /// Keyserver answered with a failure code or an unusable payload
    #[error("Keyserver call {method} failed: {reason}")]
    Keyserver { method: &'static str, reason: String },

    /// Inconsistent configuration or keystore state
    #[error("Configuration error: {0}")]
    Config(String),

    /// Provider accessed before initialization
    #[error("Security provider accessed before init")]
    NotInitialized,
}

impl SecurityError {
    /// Wrap an `io::Error`, mapping `NotFound` onto the dedicated variant.
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        let path = path.into();
        if source.kind() == io::ErrorKind::NotFound {
            Self::NotFound { path }
        } else {
            Self::Io { path, source }
        }
    }

    pub fn invalid_name(name: impl Into<String>, reason: &'static str) -> Self {
        Self::InvalidName {
            name: name.into(),
            reason,
        }
    }

    pub fn connection(endpoint: impl Into<String>, reason: impl ToString) -> Self {
        Self::Connection {
            endpoint: endpoint.into(),
            reason: reason.to_string(),
        }
    }

    /// True for errors after which the process should not continue.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::InvalidName { .. }
                | Self::Io { .. }
                | Self::NotFound { .. }
                | Self::Config(_)
                | Self::NotInitialized
        )
    }
}

pub type SecurityResult<T> = Result<T, SecurityError>;
