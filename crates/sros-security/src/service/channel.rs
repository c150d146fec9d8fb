//! # Secure Channel
//!
//! Mutual-TLS accept and connect for peer-to-peer data connections.
//!
//! ## Inbound identity checks
//!
//! 1. The peer presented a certificate with a subject common name
//! 2. The common name ends in `.client`
//! 3. The name before the suffix is in this node's allowed clients
//!
//! A connection failing any check is shut down before the error is
//! returned.

use std::collections::BTreeSet;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rustls::pki_types::ServerName;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpSocket, TcpStream};
use tokio_rustls::{TlsAcceptor, TlsConnector};

use crate::adapters::tls::cert::common_name;
use crate::adapters::tls::{NodeStream, TlsContextFactory};
use crate::domain::errors::{SecurityError, SecurityResult};
use crate::domain::peer::{peer_identity_from_common_name, sanitize_peer_identity};

/// Result of an administrative allow-list update.
#[derive(Debug, Default)]
pub struct AllowOutcome {
    /// Sanitized identities now in the set
    pub accepted: Vec<String>,
    /// Identities that failed sanitization, with the reason
    pub rejected: Vec<(String, SecurityError)>,
}

/// TLS session establishment for one node.
#[derive(Debug)]
pub struct SecureChannel {
    factory: Arc<TlsContextFactory>,
    allowed_clients: Mutex<BTreeSet<String>>,
}

impl SecureChannel {
    pub fn new(factory: Arc<TlsContextFactory>) -> Self {
        Self {
            factory,
            allowed_clients: Mutex::new(BTreeSet::new()),
        }
    }

    pub fn factory(&self) -> &TlsContextFactory {
        &self.factory
    }

    /// Accept one connection and authenticate the peer.
    ///
    /// Returns the stream, the peer address and the peer identity (the
    /// filesystem form of its node name). The listener stays usable after
    /// any error.
    ///
    /// # Errors
    ///
    /// `Connection` if the TCP accept fails, `Handshake`, `IdentityFormat`
    /// or `UntrustedPeer` if the peer fails authentication.
    pub async fn accept(
        &self,
        listener: &TcpListener,
    ) -> SecurityResult<(NodeStream, SocketAddr, String)> {
        let (tcp, peer_addr) = listener.accept().await.map_err(|e| {
            let local = listener
                .local_addr()
                .map_or_else(|_| "listener".to_string(), |addr| addr.to_string());
            SecurityError::connection(local, e)
        })?;

        let mut stream = self.server_handshake(tcp).await?;
        match self.authenticate(&stream) {
            Ok(identity) => {
                tracing::debug!(peer = %identity, addr = %peer_addr, "Accepted peer");
                Ok((stream, peer_addr, identity))
            }
            Err(e) => {
                tracing::warn!(addr = %peer_addr, error = %e, "Rejected inbound peer");
                let _ = stream.shutdown().await;
                Err(e)
            }
        }
    }

    /// Server-side handshake on an accepted socket.
    ///
    /// The certificate chain is verified against the root, but the
    /// allowed-clients set is not consulted.
    pub async fn server_handshake(&self, tcp: TcpStream) -> SecurityResult<NodeStream> {
        let acceptor = TlsAcceptor::from(self.factory.server_context()?);
        let tls = acceptor
            .accept(tcp)
            .await
            .map_err(|e| SecurityError::Handshake(e.to_string()))?;
        Ok(NodeStream::from(tls))
    }

    /// Connect `socket` to `dest_addr:dest_port` and run the client handshake.
    ///
    /// The client context is cached under `peer_hint`, or `host:port` when
    /// the peer's identity is not known yet. No retry is attempted.
    ///
    /// # Errors
    ///
    /// `Connection` on connect, handshake or deadline failure. `Config` if
    /// the client context cannot be built.
    pub async fn connect(
        &self,
        socket: TcpSocket,
        dest_addr: IpAddr,
        dest_port: u16,
        peer_hint: Option<&str>,
        timeout: Option<Duration>,
    ) -> SecurityResult<NodeStream> {
        let endpoint = SocketAddr::new(dest_addr, dest_port);
        let destination = peer_hint
            .map(str::to_string)
            .unwrap_or_else(|| endpoint.to_string());
        let connector = TlsConnector::from(self.factory.client_context(&destination)?);

        let establish = async {
            let tcp = socket
                .connect(endpoint)
                .await
                .map_err(|e| SecurityError::connection(endpoint.to_string(), e))?;
            let tls = connector
                .connect(ServerName::from(dest_addr), tcp)
                .await
                .map_err(|e| SecurityError::connection(endpoint.to_string(), e))?;
            Ok::<_, SecurityError>(NodeStream::from(tls))
        };

        let stream = with_deadline(endpoint, timeout, establish).await?;
        tracing::debug!(endpoint = %endpoint, destination, "Connected to peer");
        Ok(stream)
    }

    /// Add identities to the allowed-clients set.
    ///
    /// Each identity is sanitized first. Ones that fail are skipped and
    /// reported, and the rest are still added.
    pub fn allow_clients<I, S>(&self, identities: I) -> AllowOutcome
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut outcome = AllowOutcome::default();
        let mut allowed = self.allowed_clients.lock();
        for identity in identities {
            let identity = identity.as_ref();
            match sanitize_peer_identity(identity) {
                Ok(sanitized) => {
                    allowed.insert(sanitized.clone());
                    outcome.accepted.push(sanitized);
                }
                Err(e) => {
                    tracing::warn!(peer = identity, error = %e, "Skipping invalid client identity");
                    outcome.rejected.push((identity.to_string(), e));
                }
            }
        }
        outcome
    }

    pub fn is_allowed(&self, identity: &str) -> bool {
        self.allowed_clients.lock().contains(identity)
    }

    /// Snapshot of the allowed-clients set.
    pub fn allowed_clients(&self) -> BTreeSet<String> {
        self.allowed_clients.lock().clone()
    }

    fn authenticate(&self, stream: &NodeStream) -> SecurityResult<String> {
        let cert = stream
            .peer_certificate()
            .ok_or_else(|| SecurityError::Handshake("peer presented no certificate".into()))?;
        let cn = common_name(cert)?.ok_or_else(|| {
            SecurityError::Handshake("peer certificate has no subject common name".into())
        })?;
        let identity = peer_identity_from_common_name(&cn)?;

        if !self.is_allowed(&identity) {
            return Err(SecurityError::UntrustedPeer { identity });
        }
        Ok(identity)
    }
}

/// Run `establish`, bounded by `timeout` when one is given.
pub(crate) async fn with_deadline<F>(
    endpoint: SocketAddr,
    timeout: Option<Duration>,
    establish: F,
) -> SecurityResult<NodeStream>
where
    F: std::future::Future<Output = SecurityResult<NodeStream>>,
{
    match timeout {
        Some(limit) => tokio::time::timeout(limit, establish).await.map_err(|_| {
            SecurityError::connection(endpoint.to_string(), format!("timed out after {limit:?}"))
        })?,
        None => establish.await,
    }
}

#[cfg(test)]
mod tests;
