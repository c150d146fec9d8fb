//! # Access Graph Adapters
//!
//! - `file` - JSON file with atomic saves and a cross-process lock
//! - `memory` - In-memory graph for embedding and tests

mod file;
mod memory;

pub use file::FileAccessGraph;
pub use memory::MemoryAccessGraph;

use std::collections::BTreeMap;

use crate::domain::policy::{GraphVerdict, PermissionMask, TopicPermission};

/// node stem -> topic -> permission
pub type GraphEdges = BTreeMap<String, BTreeMap<String, TopicPermission>>;

fn lookup(edges: &GraphEdges, node: &str, topic: &str, mask: PermissionMask) -> GraphVerdict {
    let permission = edges.get(node).and_then(|topics| topics.get(topic));
    TopicPermission::verdict(permission, mask)
}

fn insert(edges: &mut GraphEdges, node: &str, topic: &str, mask: PermissionMask) {
    edges
        .entry(node.to_string())
        .or_default()
        .entry(topic.to_string())
        .or_default()
        .grant(mask);
}
