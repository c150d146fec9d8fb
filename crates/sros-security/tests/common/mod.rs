//! Shared helpers for the integration tests.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{json, Value};
use sros_security::test_utils::TestPki;
use sros_security::{ExtensionMapping, NodeIdentity, SecurityConfig, SecurityMode};

pub fn init_logging() {
    sros_telemetry::init_test_logging();
}

pub fn config(base: &Path, mode: SecurityMode) -> SecurityConfig {
    SecurityConfig {
        mode,
        keystore_path: base.to_path_buf(),
        ..SecurityConfig::default()
    }
}

/// How the fake keyserver answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Behaviour {
    Issue,
    Refuse,
    Stall(Duration),
}

/// JSON-RPC keyserver on axum, issuing from a [`TestPki`].
pub struct FakeKeyServer {
    pub pki: TestPki,
    pub behaviour: Behaviour,
    pub methods: parking_lot::Mutex<Vec<String>>,
    pub calls: AtomicUsize,
}

impl FakeKeyServer {
    pub fn new(behaviour: Behaviour) -> Arc<Self> {
        Arc::new(Self {
            pki: TestPki::new(),
            behaviour,
            methods: parking_lot::Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn methods(&self) -> Vec<String> {
        self.methods.lock().clone()
    }

    fn reply(&self, method: &str, params: &[Value]) -> Value {
        if self.behaviour == Behaviour::Refuse {
            return json!([0, "node is not registered with this keyserver", {}]);
        }

        let param = |i: usize| params.get(i).and_then(Value::as_str).unwrap_or_default();
        let material = match method {
            "requestCA" => self.pki.ca_material(),
            "requestNodeStore" => {
                let identity = NodeIdentity::new(param(1)).unwrap();
                self.pki.node_material(&identity, &ExtensionMapping::default())
            }
            "getCertificates" => {
                let identity = NodeIdentity::new(param(0)).unwrap();
                let mut all = self.pki.ca_material();
                all.extend(self.pki.node_material(&identity, &ExtensionMapping::default()));
                all
            }
            _ => return json!([-1, format!("unknown method {method}"), {}]),
        };

        let encoded: BTreeMap<String, String> = material
            .into_iter()
            .map(|(name, bytes)| (name, hex::encode(bytes)))
            .collect();
        json!([1, "ok", encoded])
    }
}

async fn handle(State(keyserver): State<Arc<FakeKeyServer>>, Json(request): Json<Value>) -> Json<Value> {
    keyserver.calls.fetch_add(1, Ordering::SeqCst);
    if let Behaviour::Stall(delay) = keyserver.behaviour {
        tokio::time::sleep(delay).await;
    }

    let method = request["method"].as_str().unwrap_or_default().to_string();
    let params = request["params"].as_array().cloned().unwrap_or_default();
    keyserver.methods.lock().push(method.clone());

    Json(json!({
        "jsonrpc": "2.0",
        "id": request["id"],
        "result": keyserver.reply(&method, &params),
    }))
}

/// Serve `keyserver` on an ephemeral port and return its URI.
pub async fn spawn_keyserver(keyserver: Arc<FakeKeyServer>) -> String {
    let app = Router::new().route("/", post(handle)).with_state(keyserver);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr: SocketAddr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}/")
}
