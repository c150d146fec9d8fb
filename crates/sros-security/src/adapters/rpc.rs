//! # JSON-RPC Client
//!
//! Outbound request/response calls to the master, peers and the keyserver.
//! Every call is bounded by the timeout the client was built with.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use reqwest::{Client, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::domain::errors::{SecurityError, SecurityResult};

// =============================================================================
// WIRE TYPES
// =============================================================================

/// JSON-RPC request envelope
#[derive(Debug, Serialize)]
pub struct JsonRpcRequest<T> {
    pub jsonrpc: &'static str,
    pub method: String,
    pub params: T,
    pub id: u64,
}

impl<T> JsonRpcRequest<T> {
    pub fn new(method: impl Into<String>, params: T, id: u64) -> Self {
        Self {
            jsonrpc: "2.0",
            method: method.into(),
            params,
            id,
        }
    }
}

/// JSON-RPC response envelope
#[derive(Debug, Deserialize)]
pub struct JsonRpcResponse<T> {
    #[serde(default)]
    pub id: Option<u64>,
    pub result: Option<T>,
    #[serde(default)]
    pub error: Option<JsonRpcError>,
}

/// JSON-RPC error object
#[derive(Debug, Deserialize, Serialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
}

impl std::fmt::Display for JsonRpcError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "RPC Error {}: {}", self.code, self.message)
    }
}

/// Middleware status code: call succeeded
pub const STATUS_SUCCESS: i32 = 1;
/// Middleware status code: call was understood but refused
pub const STATUS_FAILURE: i32 = 0;
/// Middleware status code: call was malformed
pub const STATUS_ERROR: i32 = -1;

/// `(code, message, value)` reply, carried as a three-element JSON array.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RpcReply<T> {
    pub code: i32,
    pub message: String,
    pub value: T,
}

impl<T> RpcReply<T> {
    pub fn success(message: impl Into<String>, value: T) -> Self {
        Self {
            code: STATUS_SUCCESS,
            message: message.into(),
            value,
        }
    }

    pub fn is_success(&self) -> bool {
        self.code == STATUS_SUCCESS
    }
}

impl<T: Serialize> Serialize for RpcReply<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        (self.code, &self.message, &self.value).serialize(serializer)
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for RpcReply<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let (code, message, value) = <(i32, String, T)>::deserialize(deserializer)?;
        Ok(Self {
            code,
            message,
            value,
        })
    }
}

// =============================================================================
// CLIENT
// =============================================================================

/// JSON-RPC client bound to one endpoint.
#[derive(Debug)]
pub struct RpcClient {
    client: Client,
    endpoint: Url,
    timeout: Duration,
    request_id: AtomicU64,
}

impl RpcClient {
    /// Client over plain HTTP (or HTTPS with the default trust store).
    pub fn plain(uri: &str, timeout: Duration) -> SecurityResult<Self> {
        let endpoint = parse_endpoint(uri)?;
        Self::build(endpoint, Client::builder(), timeout)
    }

    /// Client presenting and verifying with a prepared TLS configuration.
    ///
    /// # Errors
    ///
    /// `Config` unless `uri` uses the `https` scheme.
    pub fn with_tls(uri: &str, tls: rustls::ClientConfig, timeout: Duration) -> SecurityResult<Self> {
        let endpoint = parse_endpoint(uri)?;
        if endpoint.scheme() != "https" {
            return Err(SecurityError::Config(format!(
                "secured RPC requires an https endpoint, got '{uri}'"
            )));
        }
        Self::build(endpoint, Client::builder().use_preconfigured_tls(tls), timeout)
    }

    fn build(
        endpoint: Url,
        builder: reqwest::ClientBuilder,
        timeout: Duration,
    ) -> SecurityResult<Self> {
        let client = builder
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()
            .map_err(|e| SecurityError::Config(format!("failed to build RPC client: {e}")))?;

        Ok(Self {
            client,
            endpoint,
            timeout,
            request_id: AtomicU64::new(1),
        })
    }

    pub fn uri(&self) -> &str {
        self.endpoint.as_str()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn next_id(&self) -> u64 {
        self.request_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Call a JSON-RPC method.
    pub async fn call<P: Serialize, R: DeserializeOwned>(
        &self,
        method: &str,
        params: P,
    ) -> SecurityResult<R> {
        let request = JsonRpcRequest::new(method, params, self.next_id());
        tracing::debug!(endpoint = %self.endpoint, method, id = request.id, "RPC call");

        let response = self
            .client
            .post(self.endpoint.clone())
            .json(&request)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let rpc_response: JsonRpcResponse<R> = response
            .json()
            .await
            .map_err(|e| self.transport_error(e))?;

        if let Some(error) = rpc_response.error {
            return Err(SecurityError::connection(
                self.endpoint.as_str(),
                format!("{method}: {error}"),
            ));
        }

        rpc_response.result.ok_or_else(|| {
            SecurityError::connection(
                self.endpoint.as_str(),
                format!("{method}: missing result in response"),
            )
        })
    }

    fn transport_error(&self, e: reqwest::Error) -> SecurityError {
        if e.is_timeout() {
            SecurityError::Timeout {
                operation: "rpc call",
                after: self.timeout,
            }
        } else if e.is_connect() {
            SecurityError::connection(self.endpoint.as_str(), format!("cannot connect: {e}"))
        } else {
            SecurityError::connection(self.endpoint.as_str(), e)
        }
    }
}

/// Parse an RPC endpoint, requiring a scheme and a host.
pub fn parse_endpoint(uri: &str) -> SecurityResult<Url> {
    let url = Url::parse(uri)
        .map_err(|e| SecurityError::Config(format!("invalid RPC endpoint '{uri}': {e}")))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(SecurityError::Config(format!(
            "unsupported RPC scheme '{}' in '{uri}'",
            url.scheme()
        )));
    }
    if url.host_str().map_or(true, str::is_empty) {
        return Err(SecurityError::Config(format!("RPC endpoint '{uri}' has no host")));
    }
    Ok(url)
}

/// `host:port` key for an endpoint, used to cache client contexts.
pub fn endpoint_key(url: &Url) -> String {
    let host = url.host_str().unwrap_or_default();
    match url.port_or_known_default() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    }
}
