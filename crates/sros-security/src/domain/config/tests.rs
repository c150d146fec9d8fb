//! # Configuration Tests

use super::*;
use std::collections::HashMap;

fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let map: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    move |key| map.get(key).cloned()
}

#[test]
fn test_empty_environment_is_disabled() {
    let config = SecurityConfig::from_lookup(lookup(&[])).unwrap();
    assert_eq!(config.mode, SecurityMode::Disabled);
    assert_eq!(config.policy_mode(), PolicyMode::Disabled);
    assert_eq!(config.keyserver_verify, PeerVerification::Optional);
    assert_eq!(config.rpc_timeout, DEFAULT_RPC_TIMEOUT);
}

#[test]
fn test_legacy_mode_aliases() {
    let tls = SecurityConfig::from_lookup(lookup(&[("SROS_SECURITY", "ssl")])).unwrap();
    assert_eq!(tls.mode, SecurityMode::Tls);
    let setup = SecurityConfig::from_lookup(lookup(&[("SROS_SECURITY", "ssl_setup")])).unwrap();
    assert_eq!(setup.mode, SecurityMode::TlsWithSetup);
}

#[test]
fn test_illegal_mode_is_config_error() {
    let err = SecurityConfig::from_lookup(lookup(&[("SROS_SECURITY", "kerberos")])).unwrap_err();
    assert!(matches!(err, SecurityError::Config(_)));
}

#[test]
fn test_graph_settings() {
    let config = SecurityConfig::from_lookup(lookup(&[
        ("ROS_GRAPH_NAME", "lab"),
        ("ROS_GRAPH_MODE", "complain"),
        ("SROS_GRAPH_DIR", "/tmp/graphs"),
    ]))
    .unwrap();
    assert_eq!(config.policy_mode(), PolicyMode::Complain);
    assert_eq!(config.graph_dir, PathBuf::from("/tmp/graphs"));
}

#[test]
fn test_graph_name_traversal_is_rejected() {
    let err = SecurityConfig::from_lookup(lookup(&[("ROS_GRAPH_NAME", "../etc/passwd")]))
        .unwrap_err();
    assert!(matches!(err, SecurityError::InvalidName { .. }));
}

#[test]
fn test_passphrase_and_keyserver() {
    let config = SecurityConfig::from_lookup(lookup(&[
        ("SROS_PASSWORD", "hunter2"),
        ("SROS_KEYSERVER_URI", "http://master:11312"),
        ("SROS_KEYSERVER_VERIFY", "CERT_REQUIRED"),
    ]))
    .unwrap();
    assert_eq!(config.key_passphrase.as_deref(), Some("hunter2"));
    assert_eq!(config.keyserver_uri.as_deref(), Some("http://master:11312"));
    assert_eq!(config.keyserver_verify, PeerVerification::Required);
}

#[test]
fn test_toml_config() {
    let config = SecurityConfig::from_toml_str(
        r#"
        mode = "tls-with-setup"
        keystore_path = "/srv/keystore"

        [graph]
        name = "lab"
        mode = "train"

        [keyserver]
        uri = "https://master:11312"
        verify = "CERT_NONE"
        timeout_secs = 3

        [rpc]
        timeout_secs = 4

        [extensions]
        server_key = ".server.pem"
        "#,
    )
    .unwrap();

    assert_eq!(config.mode, SecurityMode::TlsWithSetup);
    assert_eq!(config.keystore_path, PathBuf::from("/srv/keystore"));
    assert_eq!(config.policy_mode(), PolicyMode::Train);
    assert_eq!(config.keyserver_verify, PeerVerification::None);
    assert_eq!(config.bootstrap_timeout, Duration::from_secs(3));
    assert_eq!(config.rpc_timeout, Duration::from_secs(4));
    assert_eq!(config.extension_mapping.suffix(KeyRole::ServerKey), ".server.pem");
    assert_eq!(config.extension_mapping.suffix(KeyRole::ServerCert), ".server.cert");
}

#[test]
fn test_toml_rejects_unknown_keys_and_zero_timeout() {
    assert!(SecurityConfig::from_toml_str("colour = \"blue\"").is_err());
    assert!(SecurityConfig::from_toml_str("[rpc]\ntimeout_secs = 0").is_err());
}

#[test]
fn test_toml_file_missing() {
    let err = SecurityConfig::from_toml_file(Path::new("/nonexistent/sros.toml")).unwrap_err();
    assert!(matches!(err, SecurityError::NotFound { .. }));
}
