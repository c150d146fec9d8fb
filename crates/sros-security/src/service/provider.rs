//! # Security Provider
//!
//! The one entry point transports and the RPC layer talk to. Selected once
//! per process from [`SecurityMode`]:
//!
//! - `Disabled` - plain TCP, every policy check allows, peers are `unknown`
//! - `Tls` - mutual TLS over a complete keystore, bootstrapped first in
//!   `tls-with-setup` mode, plus the configured access policy

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use tokio::net::{TcpListener, TcpSocket, TcpStream};
use tracing::Instrument;

use super::bootstrap::BootstrapClient;
use super::channel::{with_deadline, SecureChannel};
use super::policy::AccessPolicy;
use super::rpc_auth::RpcCallerCheck;
use crate::adapters::keyserver::JsonRpcKeyServer;
use crate::adapters::keystore::FileKeyStore;
use crate::adapters::rpc::{endpoint_key, parse_endpoint, RpcClient, RpcReply};
use crate::adapters::tls::{NodeStream, TlsContextFactory};
use crate::domain::config::{SecurityConfig, SecurityMode};
use crate::domain::errors::{SecurityError, SecurityResult};
use crate::domain::identity::NodeIdentity;
use crate::domain::keystore::KeystoreLayout;
use crate::domain::peer::UNKNOWN_PEER;
use crate::ports::outbound::KeyServer;

/// RPC scheme for unauthenticated transports.
pub const PLAIN_SCHEME: &str = "http";
/// RPC scheme for TLS transports.
pub const SECURE_SCHEME: &str = "https";

/// Security for one process.
#[derive(Debug)]
pub enum SecurityProvider {
    Disabled(NoSecurity),
    Tls(Box<TlsSecurity>),
}

/// Pass-through provider.
#[derive(Debug, Clone)]
pub struct NoSecurity {
    rpc_timeout: Duration,
}

/// Mutual-TLS provider for one node.
#[derive(Debug)]
pub struct TlsSecurity {
    identity: NodeIdentity,
    store: FileKeyStore,
    factory: Arc<TlsContextFactory>,
    channel: SecureChannel,
    policy: AccessPolicy,
    rpc_timeout: Duration,
}

impl SecurityProvider {
    /// Build the provider `config` selects for `caller_id`.
    ///
    /// # Errors
    ///
    /// `Config` for invalid configuration, an incomplete keystore in `tls`
    /// mode, or a setup run with no keyserver. Bootstrap errors pass through.
    pub async fn from_config(caller_id: &str, config: &SecurityConfig) -> SecurityResult<Self> {
        Self::build(caller_id, config, None).await
    }

    /// Like [`SecurityProvider::from_config`], bootstrapping through `keyserver`
    /// instead of the configured URI.
    pub async fn with_keyserver(
        caller_id: &str,
        config: &SecurityConfig,
        keyserver: &dyn KeyServer,
    ) -> SecurityResult<Self> {
        Self::build(caller_id, config, Some(keyserver)).await
    }

    async fn build(
        caller_id: &str,
        config: &SecurityConfig,
        keyserver: Option<&dyn KeyServer>,
    ) -> SecurityResult<Self> {
        config.validate()?;
        match config.mode {
            SecurityMode::Disabled => {
                tracing::info!(caller = caller_id, "Security disabled");
                Ok(Self::Disabled(NoSecurity {
                    rpc_timeout: config.rpc_timeout,
                }))
            }
            SecurityMode::Tls | SecurityMode::TlsWithSetup => {
                let tls = TlsSecurity::new(caller_id, config, keyserver).await?;
                Ok(Self::Tls(Box::new(tls)))
            }
        }
    }

    pub fn is_secure(&self) -> bool {
        matches!(self, Self::Tls(_))
    }

    /// This node's identity, when running with TLS.
    pub fn identity(&self) -> Option<&NodeIdentity> {
        match self {
            Self::Disabled(_) => None,
            Self::Tls(tls) => Some(&tls.identity),
        }
    }

    /// Scheme RPC URIs use under this provider.
    pub fn xmlrpc_protocol(&self) -> &'static str {
        match self {
            Self::Disabled(_) => PLAIN_SCHEME,
            Self::Tls(_) => SECURE_SCHEME,
        }
    }

    /// Secure a socket accepted by a listener the caller owns.
    pub async fn wrap_socket(&self, tcp: TcpStream) -> SecurityResult<NodeStream> {
        match self {
            Self::Disabled(_) => Ok(NodeStream::Plain(tcp)),
            Self::Tls(tls) => tls.channel.server_handshake(tcp).await,
        }
    }

    /// Open an outbound peer connection.
    ///
    /// `endpoint_id` is the peer's identity when the caller knows it.
    pub async fn connect(
        &self,
        socket: TcpSocket,
        dest_addr: IpAddr,
        dest_port: u16,
        endpoint_id: Option<&str>,
        timeout: Option<Duration>,
    ) -> SecurityResult<NodeStream> {
        match self {
            Self::Disabled(_) => {
                let endpoint = SocketAddr::new(dest_addr, dest_port);
                let establish = async {
                    socket
                        .connect(endpoint)
                        .await
                        .map(NodeStream::Plain)
                        .map_err(|e| SecurityError::connection(endpoint.to_string(), e))
                };
                with_deadline(endpoint, timeout, establish).await
            }
            Self::Tls(tls) => {
                tls.channel
                    .connect(socket, dest_addr, dest_port, endpoint_id, timeout)
                    .await
            }
        }
    }

    /// Accept one inbound peer connection on behalf of `server_node_name`.
    pub async fn accept(
        &self,
        listener: &TcpListener,
        server_node_name: &str,
    ) -> SecurityResult<(NodeStream, SocketAddr, String)> {
        match self {
            Self::Disabled(_) => {
                let (tcp, peer_addr) = listener
                    .accept()
                    .await
                    .map_err(|e| SecurityError::connection(server_node_name, e))?;
                Ok((NodeStream::Plain(tcp), peer_addr, UNKNOWN_PEER.to_string()))
            }
            Self::Tls(tls) => {
                tls.channel
                    .accept(listener)
                    .instrument(tracing::debug_span!("accept", node = server_node_name))
                    .await
            }
        }
    }

    /// JSON-RPC client for `uri`, secured with this node's client context.
    ///
    /// # Errors
    ///
    /// `Config` for a URI without scheme or host, or a non-`https` URI
    /// under TLS.
    pub fn rpc_client(&self, uri: &str) -> SecurityResult<RpcClient> {
        match self {
            Self::Disabled(plain) => RpcClient::plain(uri, plain.rpc_timeout),
            Self::Tls(tls) => {
                let endpoint = parse_endpoint(uri)?;
                let context = tls.factory.client_context(&endpoint_key(&endpoint))?;
                RpcClient::with_tls(uri, (*context).clone(), tls.rpc_timeout)
            }
        }
    }

    pub fn allow_register_publisher(&self, caller_id: &str, topic: &str) -> bool {
        match self {
            Self::Disabled(_) => true,
            Self::Tls(tls) => tls.policy.allow_register_publisher(caller_id, topic),
        }
    }

    pub fn allow_register_subscriber(&self, caller_id: &str, topic: &str) -> bool {
        match self {
            Self::Disabled(_) => true,
            Self::Tls(tls) => tls.policy.allow_register_subscriber(caller_id, topic),
        }
    }

    /// `allowClients` administrative call. Always succeeds.
    pub fn allow_clients<S: AsRef<str>>(&self, caller_id: &str, clients: &[S]) -> RpcReply<i32> {
        let Self::Tls(tls) = self else {
            return RpcReply::success("security disabled", 0);
        };

        let outcome = tls.channel.allow_clients(clients);
        tracing::info!(
            caller = caller_id,
            node = %tls.identity,
            accepted = outcome.accepted.len(),
            rejected = outcome.rejected.len(),
            "Updated allowed clients"
        );

        let mut message = format!("allowed {} clients", outcome.accepted.len());
        if !outcome.rejected.is_empty() {
            let skipped: Vec<&str> = outcome.rejected.iter().map(|(id, _)| id.as_str()).collect();
            message.push_str(&format!(", skipped invalid: {}", skipped.join(", ")));
        }
        RpcReply::success(message, 0)
    }

    /// Identity of an inbound RPC caller, `None` to reject it.
    ///
    /// Without TLS there is nothing to check and every caller is `unknown`.
    pub fn authenticate_rpc_caller(&self, cert_text: Option<&str>, cert_der: &[u8]) -> Option<String> {
        match self {
            Self::Disabled(_) => Some(UNKNOWN_PEER.to_string()),
            Self::Tls(tls) => RpcCallerCheck {
                identity: &tls.identity,
                layout: tls.store.layout(),
                channel: &tls.channel,
            }
            .authenticate(cert_text, cert_der),
        }
    }
}

impl TlsSecurity {
    async fn new(
        caller_id: &str,
        config: &SecurityConfig,
        keyserver: Option<&dyn KeyServer>,
    ) -> SecurityResult<Self> {
        let identity = NodeIdentity::new(caller_id)?;
        if config.mode == SecurityMode::TlsWithSetup
            && keyserver.is_none()
            && config.keyserver_uri.is_none()
        {
            return Err(SecurityError::Config(
                "tls-with-setup needs a keyserver URI or an injected keyserver".into(),
            ));
        }
        let layout = KeystoreLayout::new(
            &config.keystore_path,
            &identity,
            config.extension_mapping.clone(),
        );
        let store = FileKeyStore::new(layout.clone());

        if !store.is_complete() {
            match config.mode {
                SecurityMode::TlsWithSetup => bootstrap(&store, &identity, config, keyserver).await?,
                _ => {
                    let missing: Vec<String> = store
                        .missing_files()
                        .iter()
                        .map(|p| p.display().to_string())
                        .collect();
                    return Err(SecurityError::Config(format!(
                        "keystore for {identity} is incomplete, missing: {}",
                        missing.join(", ")
                    )));
                }
            }
        }

        let factory = Arc::new(TlsContextFactory::new(layout, config.key_passphrase.clone()));
        // Surface key and passphrase problems at startup
        factory.server_context()?;

        let channel = SecureChannel::new(Arc::clone(&factory));
        let policy = AccessPolicy::from_config(config)?;

        tracing::info!(
            node = %identity,
            keystore = %config.keystore_path.display(),
            policy = %policy.mode(),
            "TLS security ready"
        );

        Ok(Self {
            identity,
            store,
            factory,
            channel,
            policy,
            rpc_timeout: config.rpc_timeout,
        })
    }

    pub fn identity(&self) -> &NodeIdentity {
        &self.identity
    }

    pub fn channel(&self) -> &SecureChannel {
        &self.channel
    }

    pub fn policy(&self) -> &AccessPolicy {
        &self.policy
    }

    pub fn factory(&self) -> &TlsContextFactory {
        &self.factory
    }
}

async fn bootstrap(
    store: &FileKeyStore,
    identity: &NodeIdentity,
    config: &SecurityConfig,
    injected: Option<&dyn KeyServer>,
) -> SecurityResult<()> {
    let connected;
    let keyserver: &dyn KeyServer = match (injected, config.keyserver_uri.as_deref()) {
        (Some(keyserver), _) => keyserver,
        (None, Some(uri)) => {
            connected = JsonRpcKeyServer::connect(
                uri,
                &store.layout().root_cert(),
                config.keyserver_verify,
                config.bootstrap_timeout,
            )?;
            &connected
        }
        (None, None) => {
            return Err(SecurityError::Config("no keyserver to bootstrap from".into()))
        }
    };

    let report = BootstrapClient::new(store, keyserver, identity, config.bootstrap_timeout)
        .run()
        .await?;
    tracing::info!(node = %identity, written = report.written, kept = report.kept, "Bootstrap finished");
    Ok(())
}
