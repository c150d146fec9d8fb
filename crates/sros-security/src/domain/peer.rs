//! # Peer Identity Conventions
//!
//! Certificates carry `<fs-name>.client` or `<fs-name>.server` as their
//! subject common name. Only the client role is accepted on inbound
//! connections.

use crate::domain::errors::{SecurityError, SecurityResult};
use crate::domain::identity::NodeIdentity;
use crate::domain::keystore::validate_file_name;

/// Common-name suffix of a client-role certificate.
pub const CLIENT_SUFFIX: &str = ".client";

/// Common-name suffix of a server-role certificate.
pub const SERVER_SUFFIX: &str = ".server";

/// Peer identity reported when no certificate was exchanged.
pub const UNKNOWN_PEER: &str = "unknown";

/// Strip the client-role suffix from a certificate common name.
///
/// # Errors
///
/// `IdentityFormat` if the name does not end in [`CLIENT_SUFFIX`] or nothing
/// precedes it.
pub fn peer_identity_from_common_name(common_name: &str) -> SecurityResult<String> {
    match common_name.strip_suffix(CLIENT_SUFFIX) {
        Some(identity) if !identity.is_empty() => Ok(identity.to_string()),
        _ => Err(SecurityError::IdentityFormat {
            common_name: common_name.to_string(),
            expected_suffix: CLIENT_SUFFIX,
        }),
    }
}

/// Form a caller-supplied identity takes inside the allowed-clients set.
///
/// Accepts either a node name (`/ns/talker`, `talker-12`) or a filesystem
/// name already (`ns.talker`).
pub fn sanitize_peer_identity(identity: &str) -> SecurityResult<String> {
    if identity.contains("..") {
        return Err(SecurityError::invalid_name(identity, "contains '..'"));
    }
    if identity.contains('.') && !identity.contains('/') {
        validate_file_name(identity)?;
        return Ok(identity.to_string());
    }
    Ok(NodeIdentity::new(identity)?.fs_name().to_string())
}

/// Common name a node's client certificate is issued with.
pub fn client_common_name(identity: &NodeIdentity) -> String {
    format!("{}{CLIENT_SUFFIX}", identity.fs_name())
}

/// Common name a node's server certificate is issued with.
pub fn server_common_name(identity: &NodeIdentity) -> String {
    format!("{}{SERVER_SUFFIX}", identity.fs_name())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_suffix_is_stripped() {
        assert_eq!(peer_identity_from_common_name("talker.client").unwrap(), "talker");
        assert_eq!(
            peer_identity_from_common_name("ns.talker.client").unwrap(),
            "ns.talker"
        );
    }

    #[test]
    fn test_server_suffix_is_rejected() {
        let err = peer_identity_from_common_name("evil.server").unwrap_err();
        assert!(matches!(err, SecurityError::IdentityFormat { .. }));
        assert!(peer_identity_from_common_name(".client").is_err());
        assert!(peer_identity_from_common_name("client").is_err());
    }

    #[test]
    fn test_sanitize_accepts_both_forms() {
        assert_eq!(sanitize_peer_identity("/ns/listener").unwrap(), "ns.listener");
        assert_eq!(sanitize_peer_identity("listener-42").unwrap(), "listener");
        assert_eq!(sanitize_peer_identity("ns.listener").unwrap(), "ns.listener");
        assert!(sanitize_peer_identity("../etc").is_err());
    }

    #[test]
    fn test_common_names() {
        let identity = NodeIdentity::new("/ns/talker").unwrap();
        assert_eq!(client_common_name(&identity), "ns.talker.client");
        assert_eq!(server_common_name(&identity), "ns.talker.server");
    }
}
