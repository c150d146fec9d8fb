//! Encrypted PKCS#8 private keys.

use std::path::PathBuf;

use sros_security::adapters::tls::pem::load_private_key;
use sros_security::SecurityError;

const PASSPHRASE: &str = "correct-horse";

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

#[test]
fn test_decrypts_to_the_plain_key() {
    let plain = load_private_key(&fixture("plain.key.pem"), None).unwrap();
    let decrypted = load_private_key(&fixture("encrypted.key.pem"), Some(PASSPHRASE)).unwrap();
    assert_eq!(plain.secret_der(), decrypted.secret_der());
}

#[test]
fn test_wrong_passphrase_is_config_error() {
    let err = load_private_key(&fixture("encrypted.key.pem"), Some("battery-staple")).unwrap_err();
    assert!(matches!(err, SecurityError::Config(_)));
    assert!(err.is_fatal());
}

#[test]
fn test_missing_passphrase_is_config_error() {
    assert!(matches!(
        load_private_key(&fixture("encrypted.key.pem"), None),
        Err(SecurityError::Config(_))
    ));
}

#[test]
fn test_plain_key_ignores_passphrase() {
    assert!(load_private_key(&fixture("plain.key.pem"), Some(PASSPHRASE)).is_ok());
}
