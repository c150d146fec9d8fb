use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

#[cfg(unix)]
use std::os::unix::fs::OpenOptionsExt;

use super::{insert, lookup, GraphEdges};
use crate::adapters::keystore::create_private_dir;
use crate::adapters::lock::FileLock;
use crate::domain::errors::{SecurityError, SecurityResult};
use crate::domain::policy::{GraphVerdict, PermissionMask};
use crate::ports::outbound::AccessGraph;

const FORMAT_VERSION: u32 = 1;

/// Bound on waiting for another process's graph update.
pub const GRAPH_LOCK_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Serialize, Deserialize)]
struct GraphDocument {
    version: u32,
    #[serde(default)]
    nodes: GraphEdges,
}

/// Access graph persisted as a JSON document.
///
/// ```json
/// { "version": 1, "nodes": { "/talker": { "/chatter": { "read": false, "write": true, "audit": false } } } }
/// ```
#[derive(Debug)]
pub struct FileAccessGraph {
    edges: GraphEdges,
    path: PathBuf,
}

impl FileAccessGraph {
    /// Empty graph that will persist to `path`.
    pub fn empty(path: impl Into<PathBuf>) -> Self {
        Self {
            edges: GraphEdges::new(),
            path: path.into(),
        }
    }

    /// Load the graph stored at `path`.
    ///
    /// # Errors
    ///
    /// `NotFound` if there is no file, `Config` if it does not parse.
    pub fn open(path: impl Into<PathBuf>) -> SecurityResult<Self> {
        let path = path.into();
        let edges = read_document(&path)?;
        tracing::info!(
            graph = %path.display(),
            nodes = edges.len(),
            "Loaded access graph"
        );
        Ok(Self { edges, path })
    }

    pub fn edge_count(&self) -> usize {
        self.edges.values().map(|topics| topics.len()).sum()
    }

    fn lock_path(&self) -> PathBuf {
        self.path.with_extension("lock")
    }

    fn ensure_parent(&self) -> SecurityResult<()> {
        match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => create_private_dir(parent),
            _ => Ok(()),
        }
    }
}

impl AccessGraph for FileAccessGraph {
    fn check(&self, node: &str, topic: &str, mask: PermissionMask) -> GraphVerdict {
        lookup(&self.edges, node, topic, mask)
    }

    fn grant(&mut self, node: &str, topic: &str, mask: PermissionMask) {
        insert(&mut self.edges, node, topic, mask);
    }

    fn load(&mut self) -> SecurityResult<()> {
        self.edges = match read_document(&self.path) {
            Ok(edges) => edges,
            Err(SecurityError::NotFound { .. }) => GraphEdges::new(),
            Err(e) => return Err(e),
        };
        Ok(())
    }

    fn save(&self) -> SecurityResult<()> {
        self.ensure_parent()?;

        let document = GraphDocument {
            version: FORMAT_VERSION,
            nodes: self.edges.clone(),
        };
        let bytes = serde_json::to_vec_pretty(&document)
            .map_err(|e| SecurityError::Config(format!("failed to encode graph: {e}")))?;

        // Write atomically via temp file
        let temp_path = self.path.with_extension("tmp");
        let mut options = OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        options.mode(0o600);

        let written = options
            .open(&temp_path)
            .and_then(|mut file| {
                file.write_all(&bytes)?;
                file.sync_all()
            })
            .map_err(|e| SecurityError::io(&temp_path, e))
            .and_then(|()| {
                fs::rename(&temp_path, &self.path).map_err(|e| SecurityError::io(&self.path, e))
            });
        if written.is_err() && temp_path.is_file() {
            let _ = fs::remove_file(&temp_path);
        }
        written
    }

    fn location(&self) -> &Path {
        &self.path
    }

    fn grant_and_persist(
        &mut self,
        node: &str,
        topic: &str,
        mask: PermissionMask,
    ) -> SecurityResult<()> {
        self.ensure_parent()?;
        let _lock = FileLock::acquire(&self.lock_path(), GRAPH_LOCK_TIMEOUT)?;

        // Pick up edges other processes learned since our last load
        self.load()?;
        let loaded = self.edges.clone();
        self.grant(node, topic, mask);
        if let Err(e) = self.save() {
            // An edge that never reached disk is not learned
            self.edges = loaded;
            return Err(e);
        }
        Ok(())
    }
}

fn read_document(path: &Path) -> SecurityResult<GraphEdges> {
    let bytes = fs::read(path).map_err(|e| SecurityError::io(path, e))?;
    let document: GraphDocument = serde_json::from_slice(&bytes).map_err(|e| {
        SecurityError::Config(format!("malformed access graph {}: {e}", path.display()))
    })?;
    if document.version != FORMAT_VERSION {
        return Err(SecurityError::Config(format!(
            "access graph {} has unsupported version {}",
            path.display(),
            document.version
        )));
    }
    Ok(document.nodes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_missing_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let err = FileAccessGraph::open(dir.path().join("lab.json")).unwrap_err();
        assert!(matches!(err, SecurityError::NotFound { .. }));
    }

    #[test]
    fn test_save_then_open_preserves_edges() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("graphs").join("lab.json");

        let mut graph = FileAccessGraph::empty(&path);
        graph.grant("/talker", "/chatter", PermissionMask::Write);
        graph.grant("/listener", "/chatter", PermissionMask::Read);
        graph.save().unwrap();

        let reopened = FileAccessGraph::open(&path).unwrap();
        assert_eq!(reopened.edge_count(), 2);
        assert!(reopened.check("/talker", "/chatter", PermissionMask::Write).allowed);
        assert!(!reopened.check("/talker", "/chatter", PermissionMask::Read).allowed);
        assert!(!path.with_extension("tmp").exists());
    }

    #[test]
    fn test_malformed_file_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lab.json");
        fs::write(&path, b"{ not json").unwrap();
        assert!(matches!(
            FileAccessGraph::open(&path),
            Err(SecurityError::Config(_))
        ));
    }

    #[test]
    fn test_grant_and_persist_merges_concurrent_writer() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lab.json");

        let mut ours = FileAccessGraph::empty(&path);
        let mut theirs = FileAccessGraph::empty(&path);

        theirs
            .grant_and_persist("/a", "/t", PermissionMask::Read)
            .unwrap();
        ours.grant_and_persist("/b", "/t", PermissionMask::Write)
            .unwrap();

        let merged = FileAccessGraph::open(&path).unwrap();
        assert!(merged.check("/a", "/t", PermissionMask::Read).allowed);
        assert!(merged.check("/b", "/t", PermissionMask::Write).allowed);
    }

    #[test]
    fn test_audit_flag_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lab.json");
        fs::write(
            &path,
            br#"{"version":1,"nodes":{"/cam":{"/image":{"read":true,"audit":true}}}}"#,
        )
        .unwrap();

        let graph = FileAccessGraph::open(&path).unwrap();
        let verdict = graph.check("/cam", "/image", PermissionMask::Read);
        assert!(verdict.allowed);
        assert!(verdict.audit);
    }

    #[test]
    fn test_failed_save_does_not_keep_the_edge() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lab.json");
        // A directory where the temp file goes makes every save fail
        fs::create_dir(path.with_extension("tmp")).unwrap();

        let mut graph = FileAccessGraph::empty(&path);
        let err = graph
            .grant_and_persist("/talker", "/chatter", PermissionMask::Write)
            .unwrap_err();
        assert!(matches!(err, SecurityError::Io { .. }));
        assert!(!graph.check("/talker", "/chatter", PermissionMask::Write).allowed);
        assert!(!path.exists());

        fs::remove_dir(path.with_extension("tmp")).unwrap();
        graph
            .grant_and_persist("/talker", "/chatter", PermissionMask::Write)
            .unwrap();
        let stored = FileAccessGraph::open(&path).unwrap();
        assert!(stored.check("/talker", "/chatter", PermissionMask::Write).allowed);
    }

    #[test]
    fn test_held_graph_lock_times_out_quickly() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lab.json");
        let mut graph = FileAccessGraph::empty(&path);
        let _held = FileLock::acquire(&graph.lock_path(), GRAPH_LOCK_TIMEOUT).unwrap();

        let started = std::time::Instant::now();
        let err = graph
            .grant_and_persist("/talker", "/chatter", PermissionMask::Write)
            .unwrap_err();
        assert!(matches!(
            err,
            SecurityError::Timeout { after, .. } if after == GRAPH_LOCK_TIMEOUT
        ));
        assert!(started.elapsed() < GRAPH_LOCK_TIMEOUT + Duration::from_secs(1));
        assert!(!graph.check("/talker", "/chatter", PermissionMask::Write).allowed);
    }
}
