//! # Ports Layer
//!
//! Traits for the collaborators the security core depends on but does not own.
//!
//! - `outbound` - Access graph storage and the keyserver

pub mod outbound;

pub use outbound::{AccessGraph, KeyMaterial, KeyServer};
