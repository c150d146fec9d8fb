//! # Access Policy Types
//!
//! Vocabulary shared by the policy engine and the access-graph port.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::domain::errors::{SecurityError, SecurityResult};

/// Extension of a persisted graph file.
pub const GRAPH_FILE_EXTENSION: &str = "json";

/// Operation being registered against a topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PermissionMask {
    /// Subscribe
    Read,
    /// Publish
    Write,
}

impl std::fmt::Display for PermissionMask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PermissionMask::Read => f.write_str("read"),
            PermissionMask::Write => f.write_str("write"),
        }
    }
}

/// How graph decisions are applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PolicyMode {
    /// No graph consulted
    Disabled,
    /// Graph decision is authoritative
    #[default]
    Enforce,
    /// Always allow, learn missing edges
    Train,
    /// Always allow, warn on would-be denials
    Complain,
    /// Graph decision applies when loaded, every decision is logged
    Audit,
}

impl PolicyMode {
    pub fn as_str(self) -> &'static str {
        match self {
            PolicyMode::Disabled => "disabled",
            PolicyMode::Enforce => "enforce",
            PolicyMode::Train => "train",
            PolicyMode::Complain => "complain",
            PolicyMode::Audit => "audit",
        }
    }

    /// Whether a missing graph file starts as an empty loaded graph.
    pub fn starts_empty_when_missing(self) -> bool {
        matches!(self, PolicyMode::Enforce | PolicyMode::Train)
    }
}

impl FromStr for PolicyMode {
    type Err = SecurityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "disabled" => Ok(PolicyMode::Disabled),
            "enforce" => Ok(PolicyMode::Enforce),
            "train" => Ok(PolicyMode::Train),
            "complain" => Ok(PolicyMode::Complain),
            "audit" => Ok(PolicyMode::Audit),
            other => Err(SecurityError::Config(format!("unknown graph mode '{other}'"))),
        }
    }
}

impl std::fmt::Display for PolicyMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Answer of one graph lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GraphVerdict {
    pub allowed: bool,
    /// Result should be recorded even when it is an allow
    pub audit: bool,
}

/// Read/write bits for one (node, topic) edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TopicPermission {
    #[serde(default)]
    pub read: bool,
    #[serde(default)]
    pub write: bool,
    #[serde(default)]
    pub audit: bool,
}

impl TopicPermission {
    pub fn permits(&self, mask: PermissionMask) -> bool {
        match mask {
            PermissionMask::Read => self.read,
            PermissionMask::Write => self.write,
        }
    }

    pub fn grant(&mut self, mask: PermissionMask) {
        match mask {
            PermissionMask::Read => self.read = true,
            PermissionMask::Write => self.write = true,
        }
    }

    pub fn verdict(permission: Option<&TopicPermission>, mask: PermissionMask) -> GraphVerdict {
        match permission {
            Some(p) if p.permits(mask) => GraphVerdict {
                allowed: true,
                audit: p.audit,
            },
            _ => GraphVerdict {
                allowed: false,
                audit: true,
            },
        }
    }
}

/// Reject graph names that could leave the graph directory.
pub fn validate_graph_name(name: &str) -> SecurityResult<()> {
    if name.trim().is_empty() {
        return Err(SecurityError::invalid_name(name, "empty graph name"));
    }
    if name.contains("..") {
        return Err(SecurityError::invalid_name(name, "graph name contains '..'"));
    }
    if name.contains(['/', '\\', '\0']) {
        return Err(SecurityError::invalid_name(name, "graph name contains a separator"));
    }
    Ok(())
}

/// Storage path for a validated graph name.
pub fn graph_path(graph_dir: &Path, name: &str) -> SecurityResult<PathBuf> {
    validate_graph_name(name)?;
    Ok(graph_dir.join(format!("{name}.{GRAPH_FILE_EXTENSION}")))
}
