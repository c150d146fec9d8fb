//! # Domain Layer
//!
//! Pure naming, layout and policy rules. Nothing here touches the network,
//! and only `config` reads the filesystem.
//!
//! ## Modules
//!
//! - `identity` - Caller id canonicalization and filesystem names
//! - `keystore` - Keystore paths and the role/suffix table
//! - `peer` - Certificate common-name conventions
//! - `policy` - Permission masks, modes and graph verdicts
//! - `config` - Recognized options and their sources
//! - `errors` - Error taxonomy

pub mod config;
pub mod errors;
pub mod identity;
pub mod keystore;
pub mod peer;
pub mod policy;
