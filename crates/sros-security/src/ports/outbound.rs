//! # Outbound Ports (Driven Ports / SPI)
//!
//! Interfaces to the permission graph store and the certificate keyserver.

use std::collections::BTreeMap;
use std::path::Path;

use async_trait::async_trait;

use crate::domain::errors::SecurityResult;
use crate::domain::policy::{GraphVerdict, PermissionMask};

// =============================================================================
// ACCESS GRAPH
// =============================================================================

/// Mapping from (node stem, topic) to a permission mask.
///
/// Implementations own their storage format. The policy engine serializes
/// all access through one mutex, so methods take `&mut self` freely.
pub trait AccessGraph: Send {
    /// Look up whether `node` may perform `mask` on `topic`.
    fn check(&self, node: &str, topic: &str, mask: PermissionMask) -> GraphVerdict;

    /// Add the edge in memory. Granting an existing edge is a no-op.
    fn grant(&mut self, node: &str, topic: &str, mask: PermissionMask);

    /// Replace the in-memory graph with what is persisted.
    fn load(&mut self) -> SecurityResult<()>;

    /// Persist the in-memory graph.
    fn save(&self) -> SecurityResult<()>;

    /// Where the graph is persisted.
    fn location(&self) -> &Path;

    /// Add an edge and persist it as one critical section.
    ///
    /// An edge whose save fails is not kept in memory. Stores shared between
    /// processes override this to reload under a lock before granting.
    fn grant_and_persist(
        &mut self,
        node: &str,
        topic: &str,
        mask: PermissionMask,
    ) -> SecurityResult<()> {
        self.grant(node, topic, mask);
        if let Err(e) = self.save() {
            // Drop the unsaved edge
            let _ = self.load();
            return Err(e);
        }
        Ok(())
    }
}

// =============================================================================
// KEYSERVER
// =============================================================================

/// File name -> file contents, as returned by the keyserver.
pub type KeyMaterial = BTreeMap<String, Vec<u8>>;

/// Certificate authority collaborator reached during bootstrap.
///
/// All calls are idempotent; repeating one returns the same material.
#[async_trait]
pub trait KeyServer: Send + Sync {
    /// This node's own certificates and private keys.
    async fn request_node_store(&self, node_id: &str, node_stem: &str)
        -> SecurityResult<KeyMaterial>;

    /// Root certificate and the master's published certificates.
    async fn request_ca(&self, node_id: &str) -> SecurityResult<KeyMaterial>;

    /// Legacy single-call variant returning the node's material in one reply.
    async fn get_certificates(&self, node_name: &str) -> SecurityResult<KeyMaterial>;
}
