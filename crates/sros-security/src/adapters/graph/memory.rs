use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use super::{insert, lookup, GraphEdges};
use crate::domain::errors::SecurityResult;
use crate::domain::policy::{GraphVerdict, PermissionMask, TopicPermission};
use crate::ports::outbound::AccessGraph;

/// Graph held entirely in memory.
///
/// `grant_and_persist` snapshots the edges and `save` only counts calls.
#[derive(Debug, Default)]
pub struct MemoryAccessGraph {
    edges: GraphEdges,
    persisted: GraphEdges,
    location: PathBuf,
    saves: AtomicUsize,
}

impl MemoryAccessGraph {
    pub fn new() -> Self {
        Self {
            location: PathBuf::from("memory"),
            ..Default::default()
        }
    }

    /// Builder-style edge insertion.
    #[must_use]
    pub fn with_edge(mut self, node: &str, topic: &str, mask: PermissionMask) -> Self {
        self.grant(node, topic, mask);
        self
    }

    /// Mark an existing or new edge as audit-worthy.
    #[must_use]
    pub fn with_audit(mut self, node: &str, topic: &str) -> Self {
        let permission: &mut TopicPermission = self
            .edges
            .entry(node.to_string())
            .or_default()
            .entry(topic.to_string())
            .or_default();
        permission.audit = true;
        self
    }

    /// Number of completed `save` calls.
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    /// Whether the last snapshot contains the edge.
    pub fn persisted_allows(&self, node: &str, topic: &str, mask: PermissionMask) -> bool {
        lookup(&self.persisted, node, topic, mask).allowed
    }
}

impl AccessGraph for MemoryAccessGraph {
    fn check(&self, node: &str, topic: &str, mask: PermissionMask) -> GraphVerdict {
        lookup(&self.edges, node, topic, mask)
    }

    fn grant(&mut self, node: &str, topic: &str, mask: PermissionMask) {
        insert(&mut self.edges, node, topic, mask);
    }

    fn load(&mut self) -> SecurityResult<()> {
        self.edges = self.persisted.clone();
        Ok(())
    }

    fn save(&self) -> SecurityResult<()> {
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn location(&self) -> &Path {
        &self.location
    }

    fn grant_and_persist(
        &mut self,
        node: &str,
        topic: &str,
        mask: PermissionMask,
    ) -> SecurityResult<()> {
        self.grant(node, topic, mask);
        self.persisted = self.edges.clone();
        self.save()
    }
}
