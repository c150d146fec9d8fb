//! Reading names out of X.509 certificates.

use rustls::pki_types::CertificateDer;
use x509_parser::prelude::{FromDer, X509Certificate};

use crate::domain::errors::{SecurityError, SecurityResult};

/// Subject common name of a DER certificate, if it has one.
///
/// # Errors
///
/// `Handshake` when the certificate does not parse.
pub fn common_name(cert: &CertificateDer<'_>) -> SecurityResult<Option<String>> {
    let (_, parsed) = X509Certificate::from_der(cert.as_ref())
        .map_err(|e| SecurityError::Handshake(format!("unparseable peer certificate: {e}")))?;
    let cn = parsed
        .subject()
        .iter_common_name()
        .next()
        .and_then(|attr| attr.as_str().ok())
        .map(str::to_string);
    Ok(cn)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rcgen::{CertificateParams, DnType, KeyPair};

    fn cert_with(cn: Option<&str>, sans: Vec<String>) -> CertificateDer<'static> {
        let key = KeyPair::generate().unwrap();
        let mut params = CertificateParams::new(sans).unwrap();
        params.distinguished_name = rcgen::DistinguishedName::new();
        if let Some(cn) = cn {
            params.distinguished_name.push(DnType::CommonName, cn);
        }
        params.self_signed(&key).unwrap().der().clone()
    }

    #[test]
    fn test_common_name() {
        let cert = cert_with(Some("talker.client"), vec!["talker".into()]);
        assert_eq!(common_name(&cert).unwrap().as_deref(), Some("talker.client"));
    }

    #[test]
    fn test_missing_common_name() {
        let cert = cert_with(None, vec!["talker".into()]);
        assert_eq!(common_name(&cert).unwrap(), None);
    }

    #[test]
    fn test_garbage_is_handshake_error() {
        let garbage = CertificateDer::from(vec![0x30, 0x03, 0x01, 0x02, 0x03]);
        assert!(matches!(
            common_name(&garbage),
            Err(SecurityError::Handshake(_))
        ));
    }
}
