//! # JSON-RPC Keyserver Client
//!
//! Reaches the certificate keyserver during bootstrap. Replies are
//! `[code, message, {file name: hex contents}]` triples.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;

use super::rpc::{parse_endpoint, RpcClient, RpcReply};
use super::tls::TlsContextFactory;
use crate::domain::config::PeerVerification;
use crate::domain::errors::{SecurityError, SecurityResult};
use crate::ports::outbound::{KeyMaterial, KeyServer};

const REQUEST_NODE_STORE: &str = "requestNodeStore";
const REQUEST_CA: &str = "requestCA";
const GET_CERTIFICATES: &str = "getCertificates";

/// Keyserver reached over JSON-RPC.
///
/// The TLS client configuration is rebuilt for every call, so a root
/// certificate written by `requestCA` verifies the `requestNodeStore` call
/// that follows it under [`PeerVerification::Optional`].
#[derive(Debug)]
pub struct JsonRpcKeyServer {
    uri: String,
    secure: bool,
    root_cert: PathBuf,
    verification: PeerVerification,
    timeout: Duration,
}

impl JsonRpcKeyServer {
    /// Connect to `uri`, verifying an `https` keyserver per `verification`.
    ///
    /// `http` endpoints are accepted for setup-mode keyservers that run
    /// before any certificate exists.
    ///
    /// # Errors
    ///
    /// `Config` for a malformed URI, or for `CERT_REQUIRED` without a root
    /// certificate on disk.
    pub fn connect(
        uri: &str,
        root_cert: &Path,
        verification: PeerVerification,
        timeout: Duration,
    ) -> SecurityResult<Self> {
        let endpoint = parse_endpoint(uri)?;
        let keyserver = Self {
            uri: uri.to_string(),
            secure: endpoint.scheme() == "https",
            root_cert: root_cert.to_path_buf(),
            verification,
            timeout,
        };
        if keyserver.secure {
            TlsContextFactory::keyserver_context(root_cert, verification)?;
        } else {
            tracing::warn!(keyserver = uri, "Bootstrapping over an unencrypted channel");
        }
        Ok(keyserver)
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    fn client(&self) -> SecurityResult<RpcClient> {
        if self.secure {
            let tls = TlsContextFactory::keyserver_context(&self.root_cert, self.verification)?;
            RpcClient::with_tls(&self.uri, tls, self.timeout)
        } else {
            RpcClient::plain(&self.uri, self.timeout)
        }
    }

    async fn fetch<P: serde::Serialize + Send>(
        &self,
        method: &'static str,
        params: P,
    ) -> SecurityResult<KeyMaterial> {
        let rpc = self.client()?;
        let reply: RpcReply<BTreeMap<String, String>> =
            rpc.call(method, params).await.map_err(|e| match e {
                SecurityError::Timeout { .. } => e,
                other => SecurityError::Keyserver {
                    method,
                    reason: other.to_string(),
                },
            })?;

        if !reply.is_success() {
            return Err(SecurityError::Keyserver {
                method,
                reason: format!("code {}: {}", reply.code, reply.message),
            });
        }
        decode_material(method, reply.value)
    }
}

#[async_trait]
impl KeyServer for JsonRpcKeyServer {
    async fn request_node_store(
        &self,
        node_id: &str,
        node_stem: &str,
    ) -> SecurityResult<KeyMaterial> {
        self.fetch(REQUEST_NODE_STORE, (node_id, node_stem)).await
    }

    async fn request_ca(&self, node_id: &str) -> SecurityResult<KeyMaterial> {
        self.fetch(REQUEST_CA, (node_id,)).await
    }

    async fn get_certificates(&self, node_name: &str) -> SecurityResult<KeyMaterial> {
        self.fetch(GET_CERTIFICATES, (node_name,)).await
    }
}

fn decode_material(
    method: &'static str,
    encoded: BTreeMap<String, String>,
) -> SecurityResult<KeyMaterial> {
    encoded
        .into_iter()
        .map(|(name, hex_data)| {
            let bytes = hex::decode(&hex_data).map_err(|e| SecurityError::Keyserver {
                method,
                reason: format!("file '{name}' is not valid hex: {e}"),
            })?;
            Ok((name, bytes))
        })
        .collect()
}
