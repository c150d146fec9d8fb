//! Throwaway certificate authority and keystore provisioning for tests.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use rustls::pki_types::CertificateDer;
use rcgen::{
    BasicConstraints, Certificate, CertificateParams, DistinguishedName, DnType, IsCa, KeyPair,
};

use crate::adapters::keystore::FileKeyStore;
use crate::domain::errors::SecurityResult;
use crate::domain::identity::NodeIdentity;
use crate::domain::keystore::{
    ExtensionMapping, KeyRole, KeystoreLayout, StoreScope, MASTER_STEM, ROOT_CERT_FILE,
};
use crate::domain::peer::{client_common_name, server_common_name};
use crate::ports::outbound::{KeyMaterial, KeyServer};

/// One issued leaf certificate.
#[derive(Debug, Clone)]
pub struct IssuedCert {
    pub cert_pem: String,
    pub key_pem: String,
    pub der: Vec<u8>,
}

/// A root CA plus the master's certificates, issued once.
pub struct TestPki {
    ca_cert: Certificate,
    ca_key: KeyPair,
    master_server: IssuedCert,
    master_client: IssuedCert,
}

impl Default for TestPki {
    fn default() -> Self {
        Self::new()
    }
}

impl TestPki {
    pub fn new() -> Self {
        let ca_key = KeyPair::generate().expect("generate CA key");
        let mut params = CertificateParams::new(Vec::<String>::new()).expect("CA params");
        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        params.distinguished_name = DistinguishedName::new();
        params.distinguished_name.push(DnType::CommonName, "sros test root");
        let ca_cert = params.self_signed(&ca_key).expect("self-sign CA");

        let master = NodeIdentity::new(MASTER_STEM).expect("master identity");
        let master_server = issue_leaf(&ca_cert, &ca_key, &server_common_name(&master));
        let master_client = issue_leaf(&ca_cert, &ca_key, &client_common_name(&master));

        Self {
            ca_cert,
            ca_key,
            master_server,
            master_client,
        }
    }

    pub fn root_pem(&self) -> String {
        self.ca_cert.pem()
    }

    pub fn root_der(&self) -> CertificateDer<'static> {
        self.ca_cert.der().clone()
    }

    pub fn master_client(&self) -> &IssuedCert {
        &self.master_client
    }

    /// Issue a leaf with the given subject common name and no SAN.
    pub fn issue(&self, common_name: &str) -> IssuedCert {
        issue_leaf(&self.ca_cert, &self.ca_key, common_name)
    }

    /// What a keyserver returns from `requestCA`.
    pub fn ca_material(&self) -> KeyMaterial {
        let mut material = KeyMaterial::new();
        material.insert(ROOT_CERT_FILE.to_string(), self.root_pem().into_bytes());
        material.insert(
            format!("master{}", KeyRole::ServerCert.default_suffix()),
            self.master_server.cert_pem.clone().into_bytes(),
        );
        material.insert(
            format!("master{}", KeyRole::ClientCert.default_suffix()),
            self.master_client.cert_pem.clone().into_bytes(),
        );
        material
    }

    /// What a keyserver returns from `requestNodeStore` for `identity`.
    pub fn node_material(&self, identity: &NodeIdentity, mapping: &ExtensionMapping) -> KeyMaterial {
        let (server, client) = if identity.stem() == MASTER_STEM {
            (self.master_server.clone(), self.master_client.clone())
        } else {
            (
                self.issue(&server_common_name(identity)),
                self.issue(&client_common_name(identity)),
            )
        };

        let name = |role: KeyRole| format!("{}{}", identity.fs_name(), mapping.suffix(role));
        let mut material = KeyMaterial::new();
        material.insert(name(KeyRole::ServerCert), server.cert_pem.into_bytes());
        material.insert(name(KeyRole::ServerKey), server.key_pem.into_bytes());
        material.insert(name(KeyRole::ClientCert), client.cert_pem.into_bytes());
        material.insert(name(KeyRole::ClientKey), client.key_pem.into_bytes());
        material
    }

    /// Write a complete keystore for `caller_id` under `base`.
    pub fn provision(&self, base: &Path, caller_id: &str) -> FileKeyStore {
        let identity = NodeIdentity::new(caller_id).expect("valid caller id");
        let mapping = ExtensionMapping::default();
        let store = FileKeyStore::new(KeystoreLayout::new(base, &identity, mapping.clone()));

        for (name, bytes) in self.ca_material() {
            store.write(StoreScope::Shared, &name, &bytes).expect("write shared file");
        }
        for (name, bytes) in self.node_material(&identity, &mapping) {
            store.write(StoreScope::Node, &name, &bytes).expect("write node file");
        }
        store
    }
}

/// Keyserver that issues from a [`TestPki`] and counts calls.
pub struct PkiKeyServer {
    pki: TestPki,
    calls: AtomicUsize,
}

impl PkiKeyServer {
    pub fn new(pki: TestPki) -> Self {
        Self {
            pki,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn pki(&self) -> &TestPki {
        &self.pki
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl KeyServer for PkiKeyServer {
    async fn request_node_store(&self, _node_id: &str, node_stem: &str) -> SecurityResult<KeyMaterial> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let identity = NodeIdentity::new(node_stem)?;
        Ok(self.pki.node_material(&identity, &ExtensionMapping::default()))
    }

    async fn request_ca(&self, _node_id: &str) -> SecurityResult<KeyMaterial> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.pki.ca_material())
    }

    async fn get_certificates(&self, node_name: &str) -> SecurityResult<KeyMaterial> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let identity = NodeIdentity::new(node_name)?;
        let mut material = self.pki.ca_material();
        material.extend(self.pki.node_material(&identity, &ExtensionMapping::default()));
        Ok(material)
    }
}

fn issue_leaf(ca_cert: &Certificate, ca_key: &KeyPair, common_name: &str) -> IssuedCert {
    let key = KeyPair::generate().expect("generate leaf key");
    let mut params = CertificateParams::new(Vec::<String>::new()).expect("leaf params");
    params.distinguished_name = DistinguishedName::new();
    params.distinguished_name.push(DnType::CommonName, common_name);
    let cert = params
        .signed_by(&key, ca_cert, ca_key)
        .expect("sign leaf");

    IssuedCert {
        cert_pem: cert.pem(),
        key_pem: key.serialize_pem(),
        der: cert.der().to_vec(),
    }
}
