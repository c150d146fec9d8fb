use std::net::Ipv4Addr;
use std::path::Path;

use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use super::*;
use crate::adapters::keystore::FileKeyStore;
use crate::domain::identity::NodeIdentity;
use crate::domain::keystore::{ExtensionMapping, KeyRole, KeystoreLayout, StoreScope};
use crate::test_utils::TestPki;

fn channel_for(base: &Path, caller_id: &str) -> SecureChannel {
    let identity = NodeIdentity::new(caller_id).unwrap();
    let layout = KeystoreLayout::new(base, &identity, ExtensionMapping::default());
    SecureChannel::new(Arc::new(TlsContextFactory::new(layout, None)))
}

/// Keystore for `caller_id` whose client certificate carries `client_cn`.
fn provision_with_client_cn(pki: &TestPki, base: &Path, caller_id: &str, client_cn: &str) {
    let identity = NodeIdentity::new(caller_id).unwrap();
    let layout = KeystoreLayout::new(base, &identity, ExtensionMapping::default());
    let store = FileKeyStore::new(layout.clone());

    for (name, bytes) in pki.ca_material() {
        store.write(StoreScope::Shared, &name, &bytes).unwrap();
    }
    let server = pki.issue(&format!("{}.server", identity.fs_name()));
    let client = pki.issue(client_cn);
    let file = |role: KeyRole| {
        layout
            .node_file(role)
            .file_name()
            .unwrap()
            .to_string_lossy()
            .into_owned()
    };
    store.write(StoreScope::Node, &file(KeyRole::ServerCert), server.cert_pem.as_bytes()).unwrap();
    store.write(StoreScope::Node, &file(KeyRole::ServerKey), server.key_pem.as_bytes()).unwrap();
    store.write(StoreScope::Node, &file(KeyRole::ClientCert), client.cert_pem.as_bytes()).unwrap();
    store.write(StoreScope::Node, &file(KeyRole::ClientKey), client.key_pem.as_bytes()).unwrap();
}

async fn local_listener() -> (TcpListener, u16) {
    let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap();
    let port = listener.local_addr().unwrap().port();
    (listener, port)
}

fn v4_socket() -> TcpSocket {
    TcpSocket::new_v4().unwrap()
}

#[tokio::test]
async fn test_allowed_peer_round_trip() {
    let dir = TempDir::new().unwrap();
    let pki = TestPki::new();
    pki.provision(dir.path(), "/listener");
    pki.provision(dir.path(), "/talker_4242_1700000000000");

    let server = channel_for(dir.path(), "/listener");
    let client = channel_for(dir.path(), "/talker_4242_1700000000000");
    server.allow_clients(["/talker"]);

    let (listener, port) = local_listener().await;
    let (accepted, connected) = tokio::join!(
        server.accept(&listener),
        client.connect(v4_socket(), Ipv4Addr::LOCALHOST.into(), port, Some("listener"), None)
    );

    let (mut inbound, _addr, identity) = accepted.unwrap();
    let mut outbound = connected.unwrap();
    assert_eq!(identity, "talker");
    assert!(inbound.is_secure());
    assert!(outbound.peer_certificate().is_some());

    outbound.write_all(b"ping").await.unwrap();
    outbound.flush().await.unwrap();
    let mut buf = [0u8; 4];
    inbound.read_exact(&mut buf).await.unwrap();
    assert_eq!(&buf, b"ping");
    assert_eq!(client.factory().cached_client_contexts(), 1);
}

#[tokio::test]
async fn test_server_role_certificate_is_rejected_and_listener_survives() {
    let dir = TempDir::new().unwrap();
    let pki = TestPki::new();
    pki.provision(dir.path(), "/listener");
    pki.provision(dir.path(), "/talker");
    provision_with_client_cn(&pki, dir.path(), "/evil", "evil.server");

    let server = channel_for(dir.path(), "/listener");
    server.allow_clients(["/talker", "/evil"]);
    let evil = channel_for(dir.path(), "/evil");
    let good = channel_for(dir.path(), "/talker");
    let (listener, port) = local_listener().await;

    let (accepted, _) = tokio::join!(
        server.accept(&listener),
        evil.connect(v4_socket(), Ipv4Addr::LOCALHOST.into(), port, None, None)
    );
    match accepted {
        Err(SecurityError::IdentityFormat { common_name, .. }) => {
            assert_eq!(common_name, "evil.server")
        }
        other => panic!("expected IdentityFormat, got {other:?}"),
    }

    let (accepted, connected) = tokio::join!(
        server.accept(&listener),
        good.connect(v4_socket(), Ipv4Addr::LOCALHOST.into(), port, None, None)
    );
    assert_eq!(accepted.unwrap().2, "talker");
    assert!(connected.is_ok());
}

#[tokio::test]
async fn test_peer_outside_allow_list_is_untrusted() {
    let dir = TempDir::new().unwrap();
    let pki = TestPki::new();
    pki.provision(dir.path(), "/listener");
    pki.provision(dir.path(), "/stranger");

    let server = channel_for(dir.path(), "/listener");
    let client = channel_for(dir.path(), "/stranger");
    let (listener, port) = local_listener().await;

    let (accepted, _) = tokio::join!(
        server.accept(&listener),
        client.connect(v4_socket(), Ipv4Addr::LOCALHOST.into(), port, None, None)
    );
    assert!(matches!(
        accepted,
        Err(SecurityError::UntrustedPeer { identity }) if identity == "stranger"
    ));
}

#[tokio::test]
async fn test_connect_refused_is_connection_error() {
    let dir = TempDir::new().unwrap();
    let pki = TestPki::new();
    pki.provision(dir.path(), "/talker");
    let client = channel_for(dir.path(), "/talker");

    let (listener, port) = local_listener().await;
    drop(listener);

    let err = client
        .connect(v4_socket(), Ipv4Addr::LOCALHOST.into(), port, None, None)
        .await
        .unwrap_err();
    assert!(matches!(err, SecurityError::Connection { .. }));
    assert!(!err.is_fatal());
}

#[tokio::test]
async fn test_silent_peer_hits_deadline() {
    let dir = TempDir::new().unwrap();
    let pki = TestPki::new();
    pki.provision(dir.path(), "/talker");
    let client = channel_for(dir.path(), "/talker");

    // Accepts TCP through the backlog but never speaks TLS
    let (_listener, port) = local_listener().await;

    let err = client
        .connect(
            v4_socket(),
            Ipv4Addr::LOCALHOST.into(),
            port,
            None,
            Some(Duration::from_millis(200)),
        )
        .await
        .unwrap_err();
    match err {
        SecurityError::Connection { reason, .. } => assert!(reason.contains("timed out")),
        other => panic!("expected Connection, got {other:?}"),
    }
}

#[test]
fn test_allow_clients_sanitizes_and_extends() {
    let dir = TempDir::new().unwrap();
    let channel = channel_for(dir.path(), "/listener");

    let first = channel.allow_clients(["/ns/talker_12_1700000000000", "../etc"]);
    assert_eq!(first.accepted, vec!["ns.talker".to_string()]);
    assert_eq!(first.rejected.len(), 1);

    channel.allow_clients(["ns.listener"]);
    let allowed = channel.allowed_clients();
    assert!(allowed.contains("ns.talker"));
    assert!(allowed.contains("ns.listener"));
}
