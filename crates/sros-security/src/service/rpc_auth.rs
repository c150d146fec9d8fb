//! # Inbound RPC Caller Check
//!
//! Second identity check run by the RPC dispatcher on the certificate it
//! saw at the transport layer. It can only narrow what the handshake
//! accepted:
//!
//! - On the master, the presented certificate must equal the caller's
//!   client certificate on file, byte for byte.
//! - Elsewhere, `master.client` and self-addressed calls are compared
//!   byte for byte, and other callers must be in the allowed clients.

use std::path::Path;

use rustls::pki_types::CertificateDer;
use subtle::ConstantTimeEq;

use super::channel::SecureChannel;
use crate::adapters::tls::cert::common_name;
use crate::adapters::tls::pem::load_leaf_der;
use crate::domain::identity::NodeIdentity;
use crate::domain::keystore::{
    validate_file_name, KeyRole, KeystoreLayout, MASTER_NAME, MASTER_STEM,
};
use crate::domain::peer::peer_identity_from_common_name;

/// What the RPC caller check needs from the local node.
#[derive(Debug, Clone, Copy)]
pub struct RpcCallerCheck<'a> {
    pub identity: &'a NodeIdentity,
    pub layout: &'a KeystoreLayout,
    pub channel: &'a SecureChannel,
}

impl RpcCallerCheck<'_> {
    /// Peer identity for an authenticated caller, `None` to reject.
    ///
    /// `cert_text` is the subject common name the transport reported and
    /// `cert_der` the certificate it received.
    pub fn authenticate(&self, cert_text: Option<&str>, cert_der: &[u8]) -> Option<String> {
        let cn = cert_text?;
        let peer = match peer_identity_from_common_name(cn) {
            Ok(peer) if !peer.contains("..") => peer,
            _ => {
                tracing::warn!(common_name = cn, "RPC caller has a malformed common name");
                return None;
            }
        };

        let presented = common_name(&CertificateDer::from(cert_der)).ok().flatten();
        if presented.as_deref() != Some(cn) {
            tracing::warn!(common_name = cn, ?presented, "RPC caller certificate does not match reported name");
            return None;
        }

        if self.identity.stem() == MASTER_STEM {
            return self.authenticate_on_master(peer, cert_der);
        }

        if peer == MASTER_NAME {
            let on_file = self.layout.master_cert(KeyRole::ClientCert);
            return matches_on_file(&on_file, cert_der).then(|| MASTER_NAME.to_string());
        }

        if peer == self.identity.fs_name() {
            let on_file = self.layout.node_file(KeyRole::ClientCert);
            return matches_on_file(&on_file, cert_der).then_some(peer);
        }

        if self.channel.is_allowed(&peer) {
            return Some(peer);
        }
        tracing::warn!(peer = %peer, node = %self.identity, "RPC caller is not an allowed client");
        None
    }

    fn authenticate_on_master(&self, peer: String, cert_der: &[u8]) -> Option<String> {
        if let Err(e) = validate_file_name(&peer) {
            tracing::warn!(peer = %peer, error = %e, "Rejecting RPC caller");
            return None;
        }
        let on_file = self.layout.peer_cert(&peer, KeyRole::ClientCert);
        matches_on_file(&on_file, cert_der).then_some(peer)
    }
}

/// Constant-time comparison of `presented` with the certificate at `path`.
fn matches_on_file(path: &Path, presented: &[u8]) -> bool {
    let stored = match load_leaf_der(path) {
        Ok(stored) => stored,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "No certificate on file for RPC caller");
            return false;
        }
    };
    let matches: bool = stored.as_slice().ct_eq(presented).into();
    if !matches {
        tracing::warn!(path = %path.display(), "RPC caller certificate differs from the one on file");
    }
    matches
}
