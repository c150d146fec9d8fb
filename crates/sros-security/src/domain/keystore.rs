//! # Keystore Layout
//!
//! Pure path derivation for the on-disk keystore. No I/O happens here.
//!
//! ```text
//! <base>/
//! ├── root.cert
//! ├── master.server.cert
//! ├── master.client.cert
//! └── nodes/
//!     └── <fs-name>/
//!         ├── <fs-name>.server.cert
//!         ├── <fs-name>.server.key
//!         ├── <fs-name>.client.cert
//!         └── <fs-name>.client.key
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::domain::errors::{SecurityError, SecurityResult};
use crate::domain::identity::NodeIdentity;

/// Root CA certificate file name.
pub const ROOT_CERT_FILE: &str = "root.cert";

/// Stem of the master node.
pub const MASTER_STEM: &str = "/master";

/// Filesystem name the master's shared certificates are published under.
pub const MASTER_NAME: &str = "master";

/// Directory holding one subdirectory per node.
pub const NODES_DIR: &str = "nodes";

/// Advisory lock taken for the duration of a bootstrap.
pub const BOOTSTRAP_LOCK_FILE: &str = ".bootstrap.lock";

/// Role a key or certificate file plays for its node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyRole {
    ServerCert,
    ServerKey,
    ClientCert,
    ClientKey,
}

impl KeyRole {
    pub const ALL: [KeyRole; 4] = [
        KeyRole::ServerCert,
        KeyRole::ServerKey,
        KeyRole::ClientCert,
        KeyRole::ClientKey,
    ];

    /// Default file suffix for this role.
    pub fn default_suffix(self) -> &'static str {
        match self {
            KeyRole::ServerCert => ".server.cert",
            KeyRole::ServerKey => ".server.key",
            KeyRole::ClientCert => ".client.cert",
            KeyRole::ClientKey => ".client.key",
        }
    }
}

/// Role -> file suffix table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExtensionMapping(BTreeMap<KeyRole, String>);

impl Default for ExtensionMapping {
    fn default() -> Self {
        Self(
            KeyRole::ALL
                .into_iter()
                .map(|role| (role, role.default_suffix().to_string()))
                .collect(),
        )
    }
}

impl ExtensionMapping {
    /// Start from the defaults and replace the given roles.
    pub fn with_overrides(overrides: BTreeMap<KeyRole, String>) -> Self {
        let mut mapping = Self::default();
        mapping.0.extend(overrides);
        mapping
    }

    pub fn suffix(&self, role: KeyRole) -> &str {
        self.0
            .get(&role)
            .map(String::as_str)
            .unwrap_or_else(|| role.default_suffix())
    }

    /// Reject empty, separator-bearing, traversing or duplicate suffixes.
    pub fn validate(&self) -> SecurityResult<()> {
        let mut seen = BTreeSet::new();
        for role in KeyRole::ALL {
            let suffix = self.suffix(role);
            if suffix.is_empty() {
                return Err(SecurityError::Config(format!("empty suffix for {role:?}")));
            }
            if suffix.contains(['/', '\\']) || suffix.contains("..") {
                return Err(SecurityError::Config(format!(
                    "suffix '{suffix}' for {role:?} is not a plain file suffix"
                )));
            }
            if !seen.insert(suffix) {
                return Err(SecurityError::Config(format!(
                    "suffix '{suffix}' is mapped to more than one role"
                )));
            }
        }
        Ok(())
    }
}

/// Which directory a file lands in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreScope {
    /// Root-of-trust and master certificates at the keystore base
    Shared,
    /// This node's own certificates and keys
    Node,
}

/// Paths of one node's keystore.
#[derive(Debug, Clone)]
pub struct KeystoreLayout {
    base: PathBuf,
    node_fs_name: String,
    mapping: ExtensionMapping,
}

impl KeystoreLayout {
    pub fn new(base: impl Into<PathBuf>, identity: &NodeIdentity, mapping: ExtensionMapping) -> Self {
        Self {
            base: base.into(),
            node_fs_name: identity.fs_name().to_string(),
            mapping,
        }
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    pub fn mapping(&self) -> &ExtensionMapping {
        &self.mapping
    }

    pub fn root_cert(&self) -> PathBuf {
        self.base.join(ROOT_CERT_FILE)
    }

    /// Shared master certificate for `role` (a certificate role).
    pub fn master_cert(&self, role: KeyRole) -> PathBuf {
        self.base.join(self.file_name(MASTER_NAME, role))
    }

    pub fn node_dir(&self) -> PathBuf {
        self.base.join(NODES_DIR).join(&self.node_fs_name)
    }

    pub fn node_file(&self, role: KeyRole) -> PathBuf {
        self.node_dir().join(self.file_name(&self.node_fs_name, role))
    }

    /// Certificate another node published under `nodes/<fs-name>/`.
    pub fn peer_cert(&self, peer_fs_name: &str, role: KeyRole) -> PathBuf {
        self.base
            .join(NODES_DIR)
            .join(peer_fs_name)
            .join(self.file_name(peer_fs_name, role))
    }

    pub fn scope_dir(&self, scope: StoreScope) -> PathBuf {
        match scope {
            StoreScope::Shared => self.base.clone(),
            StoreScope::Node => self.node_dir(),
        }
    }

    pub fn bootstrap_lock(&self) -> PathBuf {
        self.base.join(BOOTSTRAP_LOCK_FILE)
    }

    /// Root plus the two master certificates.
    pub fn shared_files(&self) -> BTreeSet<PathBuf> {
        [
            self.root_cert(),
            self.master_cert(KeyRole::ServerCert),
            self.master_cert(KeyRole::ClientCert),
        ]
        .into_iter()
        .collect()
    }

    /// Every role file for this node.
    pub fn node_files(&self) -> BTreeSet<PathBuf> {
        KeyRole::ALL.into_iter().map(|role| self.node_file(role)).collect()
    }

    /// Everything a node needs before any TLS context is built.
    pub fn required_files(&self) -> BTreeSet<PathBuf> {
        let mut files = self.node_files();
        files.extend(self.shared_files());
        files
    }

    fn file_name(&self, fs_name: &str, role: KeyRole) -> String {
        format!("{fs_name}{}", self.mapping.suffix(role))
    }
}

/// Accept only a plain, single-component file name.
pub fn validate_file_name(name: &str) -> SecurityResult<()> {
    if name.is_empty() {
        return Err(SecurityError::invalid_name(name, "empty file name"));
    }
    if name.contains(['/', '\\', '\0']) {
        return Err(SecurityError::invalid_name(name, "file name contains a separator"));
    }
    if name == "." || name.contains("..") {
        return Err(SecurityError::invalid_name(name, "file name contains '..'"));
    }
    Ok(())
}
