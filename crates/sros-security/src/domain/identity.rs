//! # Node Identity
//!
//! Derives the stable identifiers a node is known by on disk and on the wire.
//!
//! ## Naming Conventions
//!
//! Anonymous nodes append uniqueness suffixes to a base name. Two shapes are
//! recognized and stripped:
//!
//! | Shape | Example | Stem |
//! |-------|---------|------|
//! | `_<pid>_<epoch-ms>` | `/talker_12345_1700000000000` | `/talker` |
//! | `-<pid>` | `/listener-42` | `/listener` |
//!
//! Stripping repeats until neither rule applies, so canonicalizing a stem
//! returns it unchanged.

use crate::domain::errors::{SecurityError, SecurityResult};

/// Graph resource separator.
pub const NAME_SEPARATOR: char = '/';

/// Replaces `/` in filesystem names and certificate common names. Stems
/// containing it are rejected, so the mapping cannot collide.
pub const SEPARATOR_SUBSTITUTE: char = '.';

/// Digit count of a millisecond Unix timestamp between 2001 and 2286.
pub const EPOCH_MILLIS_DIGITS: usize = 13;

/// Separator before the `<pid>_<epoch-ms>` suffix.
const EPOCH_SUFFIX_SEPARATOR: char = '_';

/// Separator before a bare `<pid>` suffix.
const PID_SUFFIX_SEPARATOR: char = '-';

/// Immutable identity of one node process.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NodeIdentity {
    raw: String,
    stem: String,
    fs_name: String,
}

impl NodeIdentity {
    /// Build the identity for a caller-supplied node name.
    ///
    /// # Errors
    ///
    /// `InvalidName` when the stem cannot be mapped to a filesystem name.
    pub fn new(caller_id: &str) -> SecurityResult<Self> {
        let stem = canonicalize(caller_id);
        let fs_name = to_filesystem_name(&stem)?;
        Ok(Self {
            raw: caller_id.to_string(),
            stem,
            fs_name,
        })
    }

    /// Caller id as supplied.
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Canonical stem, e.g. `/ns/talker`.
    pub fn stem(&self) -> &str {
        &self.stem
    }

    /// Filesystem-safe name, e.g. `ns.talker`.
    pub fn fs_name(&self) -> &str {
        &self.fs_name
    }

    /// Last segment of the stem, e.g. `talker`.
    pub fn node_name(&self) -> &str {
        node_name(&self.stem)
    }
}

impl std::fmt::Display for NodeIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.stem)
    }
}

/// Reduce a raw caller id to its canonical stem.
///
/// Adds a leading `/`, collapses empty segments, then strips anonymous-node
/// suffixes until none remain.
pub fn canonicalize(raw_caller_id: &str) -> String {
    let mut stem = normalize_separators(raw_caller_id);
    while let Some(shorter) = strip_epoch_suffix(&stem).or_else(|| strip_pid_suffix(&stem)) {
        stem = shorter;
    }
    stem
}

/// Map a stem to a name usable as a single path component.
///
/// # Errors
///
/// `InvalidName` if the stem contains `..`, a NUL byte, a `.` or a backslash, or
/// nothing but separators.
pub fn to_filesystem_name(stem: &str) -> SecurityResult<String> {
    if stem.contains("..") {
        return Err(SecurityError::invalid_name(stem, "contains '..'"));
    }
    if stem.contains('\0') {
        return Err(SecurityError::invalid_name(stem, "contains NUL"));
    }
    if stem.contains([SEPARATOR_SUBSTITUTE, '\\']) {
        return Err(SecurityError::invalid_name(
            stem,
            "contains '.' or '\\', which would alias another node",
        ));
    }

    let name: String = stem
        .trim_start_matches(NAME_SEPARATOR)
        .chars()
        .map(|c| match c {
            NAME_SEPARATOR => SEPARATOR_SUBSTITUTE,
            other => other,
        })
        .collect();

    if name.is_empty() {
        return Err(SecurityError::invalid_name(stem, "empty after normalization"));
    }
    if name.contains("..") {
        return Err(SecurityError::invalid_name(stem, "maps to a name containing '..'"));
    }
    Ok(name)
}

/// Last `/` segment of a stem.
pub fn node_name(stem: &str) -> &str {
    stem.rsplit(NAME_SEPARATOR).next().unwrap_or(stem)
}

fn normalize_separators(raw: &str) -> String {
    let segments: Vec<&str> = raw.split(NAME_SEPARATOR).filter(|s| !s.is_empty()).collect();
    format!("{NAME_SEPARATOR}{}", segments.join("/"))
}

fn is_digits(token: &str) -> bool {
    !token.is_empty() && token.bytes().all(|b| b.is_ascii_digit())
}

/// `<base>_<digits>_<13 digits>` -> `<base>`
fn strip_epoch_suffix(stem: &str) -> Option<String> {
    let mut parts = stem.rsplitn(3, EPOCH_SUFFIX_SEPARATOR);
    let epoch = parts.next()?;
    let pid = parts.next()?;
    let base = parts.next()?;
    let matches = is_digits(pid) && is_digits(epoch) && epoch.len() == EPOCH_MILLIS_DIGITS;
    keep_if_named(base).filter(|_| matches)
}

/// `<base>-<digits>` -> `<base>`
fn strip_pid_suffix(stem: &str) -> Option<String> {
    let (base, pid) = stem.rsplit_once(PID_SUFFIX_SEPARATOR)?;
    keep_if_named(base).filter(|_| is_digits(pid))
}

/// Refuse to strip down to the bare root or into a trailing separator.
fn keep_if_named(base: &str) -> Option<String> {
    let tail = node_name(base);
    if tail.is_empty() {
        None
    } else {
        Some(base.to_string())
    }
}
