//! # File Keystore
//!
//! Owner-only storage of one node's certificates and keys plus the shared
//! root-of-trust material.
//!
//! ## Security Properties
//!
//! - Directories are created 0700 and files 0600 (Unix)
//! - Writes are staged in a private file and hard-linked into place, so
//!   material already on disk is never replaced and a failed write leaves
//!   nothing behind
//! - Every file name from outside is checked to be a single path component

use std::fs::{self, DirBuilder, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::domain::errors::{SecurityError, SecurityResult};
use crate::domain::keystore::{validate_file_name, KeyRole, KeystoreLayout, StoreScope};

#[cfg(unix)]
use std::os::unix::fs::{DirBuilderExt, OpenOptionsExt};

const PRIVATE_DIR_MODE: u32 = 0o700;
const PRIVATE_FILE_MODE: u32 = 0o600;

static STAGING_SEQ: AtomicU64 = AtomicU64::new(0);

/// Outcome of one write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Created,
    /// A file was already there and was left untouched
    AlreadyPresent,
}

/// On-disk keystore for one node.
#[derive(Debug, Clone)]
pub struct FileKeyStore {
    layout: KeystoreLayout,
}

impl FileKeyStore {
    pub fn new(layout: KeystoreLayout) -> Self {
        Self { layout }
    }

    pub fn layout(&self) -> &KeystoreLayout {
        &self.layout
    }

    /// Absolute paths of every file this node needs.
    pub fn required_files(&self) -> std::collections::BTreeSet<PathBuf> {
        self.layout.required_files()
    }

    /// True iff every required file exists and is a regular file.
    pub fn is_complete(&self) -> bool {
        all_regular_files(self.layout.required_files().iter())
    }

    pub fn is_node_store_complete(&self) -> bool {
        all_regular_files(self.layout.node_files().iter())
    }

    pub fn is_ca_complete(&self) -> bool {
        all_regular_files(self.layout.shared_files().iter())
    }

    /// Required files that are absent, for diagnostics.
    pub fn missing_files(&self) -> Vec<PathBuf> {
        self.layout
            .required_files()
            .into_iter()
            .filter(|path| !path.is_file())
            .collect()
    }

    /// Create the directory for `scope` with owner-only permissions.
    pub fn ensure_dir(&self, scope: StoreScope) -> SecurityResult<PathBuf> {
        let dir = self.layout.scope_dir(scope);
        create_private_dir(&dir)?;
        Ok(dir)
    }

    /// Route a keyserver-supplied file name to its directory.
    ///
    /// Names of the root or master certificates go to the shared directory,
    /// everything else to this node's directory.
    pub fn scope_for(&self, file_name: &str) -> StoreScope {
        let is_shared = self
            .layout
            .shared_files()
            .iter()
            .any(|path| path.file_name().is_some_and(|name| name == file_name));
        if is_shared {
            StoreScope::Shared
        } else {
            StoreScope::Node
        }
    }

    /// Write `bytes` to `file_name` under `scope` unless it already exists.
    ///
    /// # Errors
    ///
    /// `InvalidName` for anything but a plain file name, `Io` on filesystem
    /// failure.
    pub fn write(
        &self,
        scope: StoreScope,
        file_name: &str,
        bytes: &[u8],
    ) -> SecurityResult<WriteOutcome> {
        validate_file_name(file_name)?;
        let dir = self.ensure_dir(scope)?;
        let path = dir.join(file_name);

        write_exclusive(&path, |file| {
            file.write_all(bytes)?;
            file.sync_all()
        })
    }

    /// Read a file from `scope`.
    ///
    /// # Errors
    ///
    /// `NotFound` if it is absent.
    pub fn read(&self, scope: StoreScope, file_name: &str) -> SecurityResult<Vec<u8>> {
        validate_file_name(file_name)?;
        read_file(&self.layout.scope_dir(scope).join(file_name))
    }

    /// Read this node's file for `role`.
    pub fn read_role(&self, role: KeyRole) -> SecurityResult<Vec<u8>> {
        read_file(&self.layout.node_file(role))
    }
}

/// Publish a file at `path` unless one is already there.
///
/// `fill` writes into a staging file next to `path`. Only a fully written
/// staging file is linked into place; the staging file is always removed.
fn write_exclusive(
    path: &Path,
    fill: impl FnOnce(&mut File) -> io::Result<()>,
) -> SecurityResult<WriteOutcome> {
    let staging = staging_path(path);

    let mut options = OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    options.mode(PRIVATE_FILE_MODE);
    let mut file = options
        .open(&staging)
        .map_err(|e| SecurityError::io(&staging, e))?;

    let filled = fill(&mut file);
    drop(file);

    let outcome = match filled {
        Err(e) => Err(SecurityError::io(path, e)),
        Ok(()) => match fs::hard_link(&staging, path) {
            Ok(()) => {
                tracing::info!(path = %path.display(), "Wrote keystore file");
                Ok(WriteOutcome::Created)
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                tracing::debug!(path = %path.display(), "Keeping existing keystore file");
                Ok(WriteOutcome::AlreadyPresent)
            }
            Err(e) => Err(SecurityError::io(path, e)),
        },
    };

    if let Err(e) = fs::remove_file(&staging) {
        tracing::warn!(path = %staging.display(), error = %e, "Could not remove staging file");
    }
    outcome
}

fn staging_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let seq = STAGING_SEQ.fetch_add(1, Ordering::Relaxed);
    path.with_file_name(format!(".{name}.{}.{seq}.partial", std::process::id()))
}

/// Read a keystore file, mapping absence to `NotFound`.
pub fn read_file(path: &Path) -> SecurityResult<Vec<u8>> {
    fs::read(path).map_err(|e| SecurityError::io(path, e))
}

/// Create `dir` and its parents, 0700 on Unix.
pub fn create_private_dir(dir: &Path) -> SecurityResult<()> {
    let mut builder = DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    builder.mode(PRIVATE_DIR_MODE);
    builder.create(dir).map_err(|e| SecurityError::io(dir, e))
}

fn all_regular_files<'a>(mut paths: impl Iterator<Item = &'a PathBuf>) -> bool {
    paths.all(|path| path.is_file())
}

#[cfg(test)]
mod tests;
