//! # TLS Context Factory
//!
//! Builds and caches the rustls configurations a node needs.
//!
//! - One server configuration per process, built on first use
//! - One client configuration per destination, built on first connect to it
//!
//! Every configuration offers TLS 1.3 only, demands a peer certificate, and
//! verifies it against the keystore's root certificate.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;
use rustls::crypto::CryptoProvider;
use rustls::server::WebPkiClientVerifier;
use rustls::{ClientConfig, ServerConfig, SupportedProtocolVersion};

use super::pem::{load_cert_chain, load_private_key, load_root_store};
use super::verifier::{NoServerVerification, RootOnlyServerVerifier};
use crate::domain::config::PeerVerification;
use crate::domain::errors::{SecurityError, SecurityResult};
use crate::domain::keystore::{KeyRole, KeystoreLayout};

/// Crypto provider shared by every context.
pub fn crypto_provider() -> Arc<CryptoProvider> {
    Arc::new(rustls::crypto::ring::default_provider())
}

/// Protocol versions offered by every context.
fn protocol_versions() -> [&'static SupportedProtocolVersion; 1] {
    [&rustls::version::TLS13]
}

/// Builds and memoizes TLS contexts for one node.
#[derive(Debug)]
pub struct TlsContextFactory {
    layout: KeystoreLayout,
    passphrase: Option<String>,
    provider: Arc<CryptoProvider>,
    server: Mutex<Option<Arc<ServerConfig>>>,
    clients: Mutex<HashMap<String, Arc<ClientConfig>>>,
}

impl TlsContextFactory {
    pub fn new(layout: KeystoreLayout, passphrase: Option<String>) -> Self {
        Self {
            layout,
            passphrase,
            provider: crypto_provider(),
            server: Mutex::new(None),
            clients: Mutex::new(HashMap::new()),
        }
    }

    pub fn layout(&self) -> &KeystoreLayout {
        &self.layout
    }

    /// Server context for accepting inbound connections.
    ///
    /// # Errors
    ///
    /// `Config` if this node's server certificate, key or the root is
    /// missing or unusable.
    pub fn server_context(&self) -> SecurityResult<Arc<ServerConfig>> {
        let mut slot = self.server.lock();
        if let Some(config) = slot.as_ref() {
            return Ok(Arc::clone(config));
        }

        let config = Arc::new(self.build_server().map_err(corrupted_store)?);
        tracing::info!(keystore = %self.layout.base().display(), "Built server TLS context");
        *slot = Some(Arc::clone(&config));
        Ok(config)
    }

    /// Client context for connecting to `destination`.
    ///
    /// `destination` is the peer's identity when known, else its `host:port`.
    pub fn client_context(&self, destination: &str) -> SecurityResult<Arc<ClientConfig>> {
        let mut cache = self.clients.lock();
        if let Some(config) = cache.get(destination) {
            return Ok(Arc::clone(config));
        }

        let config = Arc::new(self.build_client().map_err(corrupted_store)?);
        tracing::debug!(destination, "Built client TLS context");
        cache.insert(destination.to_string(), Arc::clone(&config));
        Ok(config)
    }

    /// Number of destinations with a cached client context.
    pub fn cached_client_contexts(&self) -> usize {
        self.clients.lock().len()
    }

    fn build_server(&self) -> SecurityResult<ServerConfig> {
        let roots = load_root_store(&self.layout.root_cert())?;
        let client_verifier =
            WebPkiClientVerifier::builder_with_provider(Arc::new(roots), Arc::clone(&self.provider))
                .build()
                .map_err(|e| SecurityError::Config(format!("cannot build client verifier: {e}")))?;

        let chain = load_cert_chain(&self.layout.node_file(KeyRole::ServerCert))?;
        let key = load_private_key(
            &self.layout.node_file(KeyRole::ServerKey),
            self.passphrase.as_deref(),
        )?;

        ServerConfig::builder_with_provider(Arc::clone(&self.provider))
            .with_protocol_versions(&protocol_versions())
            .map_err(tls_error)?
            .with_client_cert_verifier(client_verifier)
            .with_single_cert(chain, key)
            .map_err(tls_error)
    }

    fn build_client(&self) -> SecurityResult<ClientConfig> {
        let roots = load_root_store(&self.layout.root_cert())?;
        let verifier = RootOnlyServerVerifier::new(roots, Arc::clone(&self.provider))?;

        let chain = load_cert_chain(&self.layout.node_file(KeyRole::ClientCert))?;
        let key = load_private_key(
            &self.layout.node_file(KeyRole::ClientKey),
            self.passphrase.as_deref(),
        )?;

        ClientConfig::builder_with_provider(Arc::clone(&self.provider))
            .with_protocol_versions(&protocol_versions())
            .map_err(tls_error)?
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(verifier))
            .with_client_auth_cert(chain, key)
            .map_err(tls_error)
    }

    /// Client context for reaching the keyserver before node credentials exist.
    ///
    /// # Errors
    ///
    /// `Config` under [`PeerVerification::Required`] when the root is not
    /// on disk yet.
    pub fn keyserver_context(
        root_cert: &Path,
        verification: PeerVerification,
    ) -> SecurityResult<ClientConfig> {
        let provider = crypto_provider();
        let builder = ClientConfig::builder_with_provider(Arc::clone(&provider))
            .with_protocol_versions(&protocol_versions())
            .map_err(tls_error)?
            .dangerous();

        let verify = match verification {
            PeerVerification::None => false,
            PeerVerification::Optional => root_cert.is_file(),
            PeerVerification::Required => {
                if !root_cert.is_file() {
                    return Err(SecurityError::Config(format!(
                        "keyserver verification is required but {} is missing",
                        root_cert.display()
                    )));
                }
                true
            }
        };

        let config = if verify {
            let roots = load_root_store(root_cert)?;
            let verifier = RootOnlyServerVerifier::new(roots, provider)?;
            builder
                .with_custom_certificate_verifier(Arc::new(verifier))
                .with_no_client_auth()
        } else {
            tracing::warn!(?verification, "Keyserver certificate will not be verified");
            builder
                .with_custom_certificate_verifier(Arc::new(NoServerVerification::new(provider)))
                .with_no_client_auth()
        };
        Ok(config)
    }
}

fn tls_error(e: rustls::Error) -> SecurityError {
    SecurityError::Config(format!("invalid TLS configuration: {e}"))
}

/// A gated keystore that is missing credentials is corrupted, not empty.
fn corrupted_store(e: SecurityError) -> SecurityError {
    match e {
        SecurityError::NotFound { path } => SecurityError::Config(format!(
            "keystore is missing {} after completeness check",
            path.display()
        )),
        other => other,
    }
}
