//! # Security Configuration
//!
//! Recognized options, their environment variables and their TOML keys.
//!
//! | Option | Environment | TOML | Default |
//! |--------|-------------|------|---------|
//! | security mode | `SROS_SECURITY` | `mode` | `disabled` |
//! | keystore base | `SROS_KEYSTORE_PATH` | `keystore_path` | `$HOME/.ros/keystore` |
//! | key passphrase | `SROS_PASSWORD` | `key_passphrase` | none |
//! | graph name | `ROS_GRAPH_NAME` | `graph.name` | none (policy disabled) |
//! | graph mode | `ROS_GRAPH_MODE` | `graph.mode` | `enforce` |
//! | graph directory | `SROS_GRAPH_DIR` | `graph.dir` | `$HOME/.ros/graphs` |
//! | keyserver URI | `SROS_KEYSERVER_URI` | `keyserver.uri` | none |
//! | keyserver verification | `SROS_KEYSERVER_VERIFY` | `keyserver.verify` | `CERT_OPTIONAL` |
//! | bootstrap timeout | - | `keyserver.timeout_secs` | 10 |
//! | RPC timeout | - | `rpc.timeout_secs` | 10 |
//! | file suffixes | - | `[extensions]` | see [`KeyRole::default_suffix`] |

use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

use crate::domain::errors::{SecurityError, SecurityResult};
use crate::domain::keystore::{ExtensionMapping, KeyRole};
use crate::domain::policy::{validate_graph_name, PolicyMode};

/// Default timeout for keyserver calls and outbound RPC.
pub const DEFAULT_RPC_TIMEOUT: Duration = Duration::from_secs(10);

/// Which provider variant a process runs with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SecurityMode {
    #[default]
    Disabled,
    /// Keystore must already be provisioned
    Tls,
    /// Missing keystore material is fetched from the keyserver
    TlsWithSetup,
}

impl SecurityMode {
    pub fn is_tls(self) -> bool {
        !matches!(self, SecurityMode::Disabled)
    }
}

impl FromStr for SecurityMode {
    type Err = SecurityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "" | "disabled" | "none" => Ok(SecurityMode::Disabled),
            "tls" | "ssl" => Ok(SecurityMode::Tls),
            "tls-with-setup" | "ssl_setup" => Ok(SecurityMode::TlsWithSetup),
            other => Err(SecurityError::Config(format!(
                "illegal security mode '{other}', expected disabled, tls or tls-with-setup"
            ))),
        }
    }
}

/// How strictly the keyserver's own certificate is checked during bootstrap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PeerVerification {
    /// Never verify
    None,
    /// Verify when the root certificate is already on disk
    #[default]
    Optional,
    /// Always verify; the root must be provisioned out of band
    Required,
}

impl FromStr for PeerVerification {
    type Err = SecurityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "CERT_NONE" | "NONE" => Ok(PeerVerification::None),
            "CERT_OPTIONAL" | "OPTIONAL" => Ok(PeerVerification::Optional),
            "CERT_REQUIRED" | "REQUIRED" => Ok(PeerVerification::Required),
            other => Err(SecurityError::Config(format!(
                "unknown keyserver verification '{other}'"
            ))),
        }
    }
}

/// Everything the security core needs to know at construction.
#[derive(Debug, Clone)]
pub struct SecurityConfig {
    pub mode: SecurityMode,
    pub keystore_path: PathBuf,
    pub key_passphrase: Option<String>,
    pub graph_name: Option<String>,
    pub graph_mode: PolicyMode,
    pub graph_dir: PathBuf,
    pub keyserver_uri: Option<String>,
    pub keyserver_verify: PeerVerification,
    pub extension_mapping: ExtensionMapping,
    pub bootstrap_timeout: Duration,
    pub rpc_timeout: Duration,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        let home = home_dir();
        Self {
            mode: SecurityMode::Disabled,
            keystore_path: home.join(".ros").join("keystore"),
            key_passphrase: None,
            graph_name: None,
            graph_mode: PolicyMode::Enforce,
            graph_dir: home.join(".ros").join("graphs"),
            keyserver_uri: None,
            keyserver_verify: PeerVerification::Optional,
            extension_mapping: ExtensionMapping::default(),
            bootstrap_timeout: DEFAULT_RPC_TIMEOUT,
            rpc_timeout: DEFAULT_RPC_TIMEOUT,
        }
    }
}

impl SecurityConfig {
    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// `Config` for unrecognized mode or verification values.
    pub fn from_env() -> SecurityResult<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) over an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> SecurityResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(mode) = lookup("SROS_SECURITY") {
            config.mode = mode.parse()?;
        }
        if let Some(path) = lookup("SROS_KEYSTORE_PATH") {
            config.keystore_path = PathBuf::from(path);
        }
        config.key_passphrase = lookup("SROS_PASSWORD");
        config.graph_name = lookup("ROS_GRAPH_NAME").filter(|name| !name.is_empty());
        if let Some(mode) = lookup("ROS_GRAPH_MODE") {
            config.graph_mode = mode.parse()?;
        }
        if let Some(dir) = lookup("SROS_GRAPH_DIR") {
            config.graph_dir = PathBuf::from(dir);
        }
        config.keyserver_uri = lookup("SROS_KEYSERVER_URI").filter(|uri| !uri.is_empty());
        if let Some(verify) = lookup("SROS_KEYSERVER_VERIFY") {
            config.keyserver_verify = verify.parse()?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file.
    ///
    /// # Config File Format
    ///
    /// ```toml
    /// mode = "tls-with-setup"
    /// keystore_path = "/var/lib/sros/keystore"
    ///
    /// [graph]
    /// name = "lab"
    /// mode = "train"
    ///
    /// [keyserver]
    /// uri = "https://master:11312"
    /// verify = "CERT_REQUIRED"
    /// timeout_secs = 5
    ///
    /// [extensions]
    /// server_key = ".server.pem"
    /// ```
    pub fn from_toml_file(path: &Path) -> SecurityResult<Self> {
        let content = fs::read_to_string(path).map_err(|e| SecurityError::io(path, e))?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> SecurityResult<Self> {
        let file: ConfigFile = toml::from_str(content)
            .map_err(|e| SecurityError::Config(format!("failed to parse config: {e}")))?;
        let mut config = Self::default();

        if let Some(mode) = file.mode {
            config.mode = mode.parse()?;
        }
        if let Some(path) = file.keystore_path {
            config.keystore_path = path;
        }
        config.key_passphrase = file.key_passphrase;

        config.graph_name = file.graph.name;
        if let Some(mode) = file.graph.mode {
            config.graph_mode = mode.parse()?;
        }
        if let Some(dir) = file.graph.dir {
            config.graph_dir = dir;
        }

        config.keyserver_uri = file.keyserver.uri;
        if let Some(verify) = file.keyserver.verify {
            config.keyserver_verify = verify.parse()?;
        }
        if let Some(secs) = file.keyserver.timeout_secs {
            config.bootstrap_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = file.rpc.timeout_secs {
            config.rpc_timeout = Duration::from_secs(secs);
        }
        config.extension_mapping = ExtensionMapping::with_overrides(file.extensions);

        config.validate()?;
        Ok(config)
    }

    /// Policy mode in effect: disabled unless a graph is named.
    pub fn policy_mode(&self) -> PolicyMode {
        match self.graph_name {
            Some(_) => self.graph_mode,
            None => PolicyMode::Disabled,
        }
    }

    /// Check cross-field consistency.
    pub fn validate(&self) -> SecurityResult<()> {
        if let Some(name) = &self.graph_name {
            validate_graph_name(name)?;
        }
        self.extension_mapping.validate()?;
        if self.bootstrap_timeout.is_zero() || self.rpc_timeout.is_zero() {
            return Err(SecurityError::Config("timeouts must be non-zero".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    mode: Option<String>,
    keystore_path: Option<PathBuf>,
    key_passphrase: Option<String>,
    #[serde(default)]
    graph: GraphSection,
    #[serde(default)]
    keyserver: KeyserverSection,
    #[serde(default)]
    rpc: RpcSection,
    #[serde(default)]
    extensions: BTreeMap<KeyRole, String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct GraphSection {
    name: Option<String>,
    mode: Option<String>,
    dir: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct KeyserverSection {
    uri: Option<String>,
    verify: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RpcSection {
    timeout_secs: Option<u64>,
}

fn home_dir() -> PathBuf {
    env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
}

#[cfg(test)]
mod tests;
