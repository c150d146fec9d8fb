//! # Access Policy
//!
//! Topic-level registration checks against a permission graph.
//!
//! | Mode       | Can deny | Mutates graph | Logs                          |
//! |------------|----------|---------------|-------------------------------|
//! | `disabled` | no       | no            | nothing                       |
//! | `enforce`  | yes      | no            | denials and audit-flagged hits |
//! | `train`    | no       | yes           | every learned edge            |
//! | `complain` | no       | no            | would-be denials              |
//! | `audit`    | yes*     | no            | every decision                |
//!
//! *`audit` without a loaded graph allows everything.
//!
//! Lookups use the canonical stem of the caller id, so anonymous-node
//! suffixes map onto one graph node.

use std::path::PathBuf;

use parking_lot::Mutex;

use crate::adapters::graph::FileAccessGraph;
use crate::domain::config::SecurityConfig;
use crate::domain::errors::{SecurityError, SecurityResult};
use crate::domain::identity::canonicalize;
use crate::domain::policy::{graph_path, PermissionMask, PolicyMode};
use crate::ports::outbound::AccessGraph;

/// Registration gate for one process.
pub struct AccessPolicy {
    mode: PolicyMode,
    graph: Mutex<Option<Box<dyn AccessGraph>>>,
}

impl std::fmt::Debug for AccessPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessPolicy")
            .field("mode", &self.mode)
            .field("graph", &self.graph_location())
            .finish()
    }
}

impl AccessPolicy {
    /// Policy that allows everything without consulting a graph.
    pub fn disabled() -> Self {
        Self::with_graph(PolicyMode::Disabled, None)
    }

    /// Policy over an injected graph.
    pub fn with_graph(mode: PolicyMode, graph: Option<Box<dyn AccessGraph>>) -> Self {
        Self {
            mode,
            graph: Mutex::new(graph),
        }
    }

    /// Load the configured graph file.
    ///
    /// A missing file is an empty graph in `enforce` and `train`, and no
    /// graph in `complain` and `audit`.
    ///
    /// # Errors
    ///
    /// `InvalidName` for a bad graph name, `Config` for a malformed file.
    pub fn from_config(config: &SecurityConfig) -> SecurityResult<Self> {
        let mode = config.policy_mode();
        let Some(name) = config.graph_name.as_deref() else {
            return Ok(Self::disabled());
        };
        if mode == PolicyMode::Disabled {
            return Ok(Self::disabled());
        }

        let path = graph_path(&config.graph_dir, name)?;
        let graph: Option<Box<dyn AccessGraph>> = match FileAccessGraph::open(&path) {
            Ok(graph) => Some(Box::new(graph)),
            Err(SecurityError::NotFound { .. }) if mode.starts_empty_when_missing() => {
                tracing::info!(graph = %path.display(), %mode, "No graph on disk, starting empty");
                Some(Box::new(FileAccessGraph::empty(path)))
            }
            Err(SecurityError::NotFound { .. }) => {
                tracing::warn!(graph = %path.display(), %mode, "No graph on disk, none loaded");
                None
            }
            Err(e) => return Err(e),
        };

        tracing::info!(%mode, graph = name, "Access policy ready");
        Ok(Self::with_graph(mode, graph))
    }

    pub fn mode(&self) -> PolicyMode {
        self.mode
    }

    pub fn graph_location(&self) -> Option<PathBuf> {
        self.graph
            .lock()
            .as_ref()
            .map(|graph| graph.location().to_path_buf())
    }

    /// May the publisher `caller_id` register on `topic`?
    pub fn allow_register_publisher(&self, caller_id: &str, topic: &str) -> bool {
        if self.mode == PolicyMode::Disabled {
            return true;
        }
        self.is_registration_allowed(caller_id, topic, PermissionMask::Write)
    }

    /// May the subscriber `caller_id` register on `topic`?
    pub fn allow_register_subscriber(&self, caller_id: &str, topic: &str) -> bool {
        if self.mode == PolicyMode::Disabled {
            return true;
        }
        self.is_registration_allowed(caller_id, topic, PermissionMask::Read)
    }

    /// Decide one registration. Never fails; errors are logged.
    ///
    /// In train mode a new edge is written to the graph file under a file
    /// lock, which blocks the calling thread. Async callers should run
    /// train-mode checks on `tokio::task::spawn_blocking`.
    pub fn is_registration_allowed(&self, caller_id: &str, topic: &str, mask: PermissionMask) -> bool {
        if self.mode == PolicyMode::Disabled {
            return true;
        }

        let node = canonicalize(caller_id);
        let mut slot = self.graph.lock();

        let Some(graph) = slot.as_mut() else {
            return match self.mode {
                PolicyMode::Enforce => {
                    tracing::warn!(caller = caller_id, node = %node, topic, %mask, "Denied: no graph loaded");
                    false
                }
                PolicyMode::Audit => {
                    tracing::info!(caller = caller_id, node = %node, topic, %mask, "Audit: no graph loaded, allowing");
                    true
                }
                _ => true,
            };
        };

        let verdict = graph.check(&node, topic, mask);
        let location = graph.location().display().to_string();

        match self.mode {
            PolicyMode::Enforce => {
                if !verdict.allowed {
                    tracing::warn!(caller = caller_id, node = %node, topic, %mask, graph = %location, "Registration denied");
                } else if verdict.audit {
                    tracing::info!(caller = caller_id, node = %node, topic, %mask, graph = %location, "Audited registration allowed");
                }
                verdict.allowed
            }
            PolicyMode::Train => {
                if !verdict.allowed {
                    match graph.grant_and_persist(&node, topic, mask) {
                        Ok(()) => {
                            tracing::info!(caller = caller_id, node = %node, topic, %mask, graph = %location, "Learned edge");
                        }
                        Err(e) => {
                            tracing::error!(caller = caller_id, node = %node, topic, %mask, graph = %location, error = %e, "Failed to persist learned edge");
                        }
                    }
                }
                true
            }
            PolicyMode::Complain => {
                if !verdict.allowed {
                    tracing::warn!(caller = caller_id, node = %node, topic, %mask, graph = %location, "Graph would deny registration");
                }
                true
            }
            PolicyMode::Audit => {
                if verdict.allowed {
                    tracing::info!(caller = caller_id, node = %node, topic, %mask, graph = %location, audit = verdict.audit, "Audit: allowed");
                } else {
                    tracing::warn!(caller = caller_id, node = %node, topic, %mask, graph = %location, "Audit: denied");
                }
                verdict.allowed
            }
            PolicyMode::Disabled => true,
        }
    }
}

#[cfg(test)]
mod tests;
