//! # SROS Security Core
//!
//! Transport security and topic-level access control for a pub/sub
//! middleware built around a master node and directly connected peers.
//!
//! ## Architecture
//!
//! ```text
//! caller id ──→ NodeIdentity ──→ KeystoreLayout ──→ FileKeyStore
//!                                                      │ incomplete?
//!                                                      ↓
//!                                  KeyServer ←── BootstrapClient
//!                                                      │
//!                                                      ↓
//!               SecureChannel ←── TlsContextFactory (server + per-destination client)
//!                     │
//!                     ↓
//!            SecurityProvider ──→ AccessPolicy ──→ AccessGraph
//! ```
//!
//! ## Invariants
//!
//! | Invariant | Description |
//! |-----------|-------------|
//! | Idempotent names | `canonicalize(canonicalize(x)) == canonicalize(x)` |
//! | No traversal | Names containing `..` never reach the filesystem |
//! | Additive bootstrap | Keystore files already on disk are never replaced |
//! | Gated contexts | No TLS context is built from an incomplete keystore |
//! | TLS 1.3 only | Every context offers one protocol version |
//! | Definite decisions | Policy checks always answer allow or deny |
//!
//! ## Crate Structure (Hexagonal Architecture)
//!
//! - `domain/` - Naming rules, keystore layout, policy types, config, errors
//! - `ports/` - Access graph and keyserver traits
//! - `adapters/` - Filesystem, JSON-RPC and rustls implementations
//! - `service/` - Bootstrap, channel, policy, provider, registry
//!
//! ## Usage
//!
//! ```ignore
//! use sros_security::{SecurityConfig, SecurityProvider};
//!
//! let config = SecurityConfig::from_env()?;
//! let provider = SecurityProvider::from_config("/talker", &config).await?;
//!
//! let (stream, addr, peer) = provider.accept(&listener, "/talker").await?;
//! if !provider.allow_register_publisher("/talker", "/chatter") {
//!     // reject the registration
//! }
//! ```

pub mod adapters;
pub mod domain;
pub mod ports;
pub mod service;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

// Re-export key types for convenience
pub use adapters::graph::{FileAccessGraph, MemoryAccessGraph};
pub use adapters::keyserver::JsonRpcKeyServer;
pub use adapters::keystore::{FileKeyStore, WriteOutcome};
pub use adapters::rpc::{RpcClient, RpcReply};
pub use adapters::tls::{NodeStream, TlsContextFactory};
pub use domain::config::{PeerVerification, SecurityConfig, SecurityMode};
pub use domain::errors::{SecurityError, SecurityResult};
pub use domain::identity::{canonicalize, to_filesystem_name, NodeIdentity};
pub use domain::keystore::{ExtensionMapping, KeyRole, KeystoreLayout};
pub use domain::policy::{GraphVerdict, PermissionMask, PolicyMode};
pub use ports::outbound::{AccessGraph, KeyMaterial, KeyServer};
pub use service::{
    AccessPolicy, BootstrapClient, BootstrapReport, SecureChannel, SecurityProvider,
};
pub use service::registry;
