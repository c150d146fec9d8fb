//! # Services
//!
//! - `bootstrap` - Keystore fill from the keyserver
//! - `channel` - Mutual-TLS accept/connect and the allowed-clients set
//! - `policy` - Registration checks against the access graph
//! - `provider` - Disabled/TLS facade over everything above
//! - `registry` - Process-wide provider slot
//! - `rpc_auth` - Inbound RPC caller re-validation

pub mod bootstrap;
pub mod channel;
pub mod policy;
pub mod provider;
pub mod registry;
pub mod rpc_auth;

pub use bootstrap::{BootstrapClient, BootstrapReport};
pub use channel::{AllowOutcome, SecureChannel};
pub use policy::AccessPolicy;
pub use provider::{NoSecurity, SecurityProvider, TlsSecurity};
pub use rpc_auth::RpcCallerCheck;
