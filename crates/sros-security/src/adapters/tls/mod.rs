//! # TLS Adapters
//!
//! rustls configuration, certificate inspection and the stream type.
//!
//! - `context` - Server/client context construction and caching
//! - `pem` - Certificate and key loading, including encrypted PKCS#8
//! - `cert` - Common name extraction
//! - `verifier` - Name-agnostic server verification
//! - `stream` - `NodeStream`, plain or TLS

pub mod cert;
pub mod context;
pub mod pem;
pub mod stream;
pub mod verifier;

pub use context::TlsContextFactory;
pub use stream::NodeStream;
