//! # Adapters Layer
//!
//! Filesystem, network and TLS implementations behind the domain rules.
//!
//! - `keystore` - Owner-only keystore files
//! - `graph` - Access graph storage
//! - `keyserver` - JSON-RPC keyserver client
//! - `rpc` - JSON-RPC client with timeouts
//! - `tls` - rustls contexts, verifiers and streams
//! - `lock` - Cross-process advisory locks

pub mod graph;
pub mod keyserver;
pub mod keystore;
pub mod lock;
pub mod rpc;
pub mod tls;
