//! PEM loading for certificates, private keys and the root store.

use std::io::BufReader;
use std::path::Path;

use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};
use rustls::RootCertStore;
use rustls_pemfile::{certs, private_key};

use crate::adapters::keystore::read_file;
use crate::domain::errors::{SecurityError, SecurityResult};

const ENCRYPTED_KEY_LABEL: &str = "ENCRYPTED PRIVATE KEY";

/// Every certificate in a PEM file, leaf first.
pub fn load_cert_chain(path: &Path) -> SecurityResult<Vec<CertificateDer<'static>>> {
    let bytes = read_file(path)?;
    let chain = certs(&mut BufReader::new(bytes.as_slice()))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| SecurityError::io(path, e))?;
    if chain.is_empty() {
        return Err(SecurityError::Config(format!(
            "no certificates in {}",
            path.display()
        )));
    }
    Ok(chain)
}

/// The private key in a PEM file.
///
/// `ENCRYPTED PRIVATE KEY` blocks are decrypted with `passphrase`.
pub fn load_private_key(
    path: &Path,
    passphrase: Option<&str>,
) -> SecurityResult<PrivateKeyDer<'static>> {
    let bytes = read_file(path)?;

    if contains_label(&bytes, ENCRYPTED_KEY_LABEL) {
        let passphrase = passphrase.ok_or_else(|| {
            SecurityError::Config(format!(
                "{} is encrypted and no key passphrase is configured",
                path.display()
            ))
        })?;
        return decrypt_pkcs8(path, &bytes, passphrase);
    }

    private_key(&mut BufReader::new(bytes.as_slice()))
        .map_err(|e| SecurityError::io(path, e))?
        .ok_or_else(|| SecurityError::Config(format!("no private key in {}", path.display())))
}

/// Root store trusting every certificate in `path`.
pub fn load_root_store(path: &Path) -> SecurityResult<RootCertStore> {
    let mut roots = RootCertStore::empty();
    for cert in load_cert_chain(path)? {
        roots.add(cert).map_err(|e| {
            SecurityError::Config(format!("unusable root certificate {}: {e}", path.display()))
        })?;
    }
    Ok(roots)
}

/// DER bytes of the first certificate in a PEM file.
pub fn load_leaf_der(path: &Path) -> SecurityResult<Vec<u8>> {
    let chain = load_cert_chain(path)?;
    Ok(chain[0].as_ref().to_vec())
}

fn contains_label(bytes: &[u8], label: &str) -> bool {
    let marker = format!("-----BEGIN {label}-----");
    String::from_utf8_lossy(bytes).contains(&marker)
}

fn decrypt_pkcs8(
    path: &Path,
    bytes: &[u8],
    passphrase: &str,
) -> SecurityResult<PrivateKeyDer<'static>> {
    let bad_key = |reason: String| {
        SecurityError::Config(format!("cannot decrypt {}: {reason}", path.display()))
    };

    let text = std::str::from_utf8(bytes).map_err(|e| bad_key(e.to_string()))?;
    let (label, document) =
        pkcs8::der::Document::from_pem(text.trim()).map_err(|e| bad_key(e.to_string()))?;
    if label != ENCRYPTED_KEY_LABEL {
        return Err(bad_key(format!("unexpected PEM label '{label}'")));
    }

    let encrypted = pkcs8::EncryptedPrivateKeyInfo::try_from(document.as_bytes())
        .map_err(|e| bad_key(e.to_string()))?;
    let decrypted = encrypted
        .decrypt(passphrase)
        .map_err(|_| bad_key("wrong passphrase or unsupported cipher".to_string()))?;

    Ok(PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(
        decrypted.as_bytes().to_vec(),
    )))
}
