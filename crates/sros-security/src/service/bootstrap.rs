//! # Keystore Bootstrap
//!
//! Fills an incomplete keystore from the keyserver. Root-of-trust material
//! is fetched before node material so that, under `CERT_OPTIONAL`, private
//! keys travel over a channel verified against the freshly written root.
//!
//! Writes are additive: a file already on disk is never replaced.

use std::future::Future;
use std::time::Duration;

use crate::adapters::keystore::{FileKeyStore, WriteOutcome};
use crate::adapters::lock::{FileLock, DEFAULT_LOCK_TIMEOUT};
use crate::domain::errors::{SecurityError, SecurityResult};
use crate::domain::identity::NodeIdentity;
use crate::domain::keystore::StoreScope;
use crate::ports::outbound::{KeyMaterial, KeyServer};

/// What one bootstrap run did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BootstrapReport {
    pub ca_requested: bool,
    pub node_store_requested: bool,
    pub legacy_requested: bool,
    pub written: usize,
    pub kept: usize,
}

impl BootstrapReport {
    /// Whether the keyserver was contacted at all.
    pub fn contacted_keyserver(&self) -> bool {
        self.ca_requested || self.node_store_requested || self.legacy_requested
    }
}

/// Fetches missing keystore material for one node.
pub struct BootstrapClient<'a> {
    store: &'a FileKeyStore,
    keyserver: &'a dyn KeyServer,
    identity: &'a NodeIdentity,
    timeout: Duration,
}

impl<'a> BootstrapClient<'a> {
    pub fn new(
        store: &'a FileKeyStore,
        keyserver: &'a dyn KeyServer,
        identity: &'a NodeIdentity,
        timeout: Duration,
    ) -> Self {
        Self {
            store,
            keyserver,
            identity,
            timeout,
        }
    }

    /// Request whatever is missing through `requestCA` and `requestNodeStore`.
    ///
    /// # Errors
    ///
    /// `Timeout` or `Keyserver` if a call fails, `InvalidName` if the
    /// keyserver returns an unsafe file name, `Config` if the keystore is
    /// still incomplete afterwards.
    pub async fn run(&self) -> SecurityResult<BootstrapReport> {
        let mut report = BootstrapReport::default();
        if self.store.is_complete() {
            return Ok(report);
        }

        let _lock = self.lock().await?;

        if !self.store.is_ca_complete() {
            tracing::info!(node = %self.identity, "Requesting CA material");
            let material = self
                .timed("requestCA", self.keyserver.request_ca(self.identity.raw()))
                .await?;
            report.ca_requested = true;
            self.write_all(material, &mut report)?;
        }

        if !self.store.is_node_store_complete() {
            tracing::info!(node = %self.identity, "Requesting node store");
            let material = self
                .timed(
                    "requestNodeStore",
                    self.keyserver
                        .request_node_store(self.identity.raw(), self.identity.stem()),
                )
                .await?;
            report.node_store_requested = true;
            self.write_all(material, &mut report)?;
        }

        self.ensure_complete()?;
        Ok(report)
    }

    /// Fill the keystore with one legacy `getCertificates` call.
    pub async fn run_legacy(&self) -> SecurityResult<BootstrapReport> {
        let mut report = BootstrapReport::default();
        if self.store.is_complete() {
            return Ok(report);
        }

        let _lock = self.lock().await?;

        tracing::info!(node = %self.identity, "Requesting certificates (legacy)");
        let material = self
            .timed(
                "getCertificates",
                self.keyserver.get_certificates(self.identity.fs_name()),
            )
            .await?;
        report.legacy_requested = true;
        self.write_all(material, &mut report)?;

        self.ensure_complete()?;
        Ok(report)
    }

    async fn lock(&self) -> SecurityResult<FileLock> {
        self.store.ensure_dir(StoreScope::Shared)?;
        self.store.ensure_dir(StoreScope::Node)?;

        let lock_path = self.store.layout().bootstrap_lock();
        tokio::task::spawn_blocking(move || FileLock::acquire(&lock_path, DEFAULT_LOCK_TIMEOUT))
            .await
            .map_err(|e| SecurityError::Config(format!("bootstrap lock task failed: {e}")))?
    }

    async fn timed<T>(
        &self,
        operation: &'static str,
        call: impl Future<Output = SecurityResult<T>>,
    ) -> SecurityResult<T> {
        tokio::time::timeout(self.timeout, call)
            .await
            .map_err(|_| SecurityError::Timeout {
                operation,
                after: self.timeout,
            })?
    }

    fn write_all(&self, material: KeyMaterial, report: &mut BootstrapReport) -> SecurityResult<()> {
        for (name, bytes) in material {
            let scope = self.store.scope_for(&name);
            match self.store.write(scope, &name, &bytes)? {
                WriteOutcome::Created => report.written += 1,
                WriteOutcome::AlreadyPresent => {
                    tracing::warn!(file = %name, "Keyserver resent a file already on disk, kept original");
                    report.kept += 1;
                }
            }
        }
        Ok(())
    }

    fn ensure_complete(&self) -> SecurityResult<()> {
        let missing = self.store.missing_files();
        if missing.is_empty() {
            tracing::info!(node = %self.identity, "Keystore complete");
            return Ok(());
        }
        let names: Vec<String> = missing.iter().map(|p| p.display().to_string()).collect();
        Err(SecurityError::Config(format!(
            "keystore still incomplete after bootstrap, missing: {}",
            names.join(", ")
        )))
    }
}
