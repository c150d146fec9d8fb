//! # Advisory File Locking
//!
//! Serializes keystore bootstrap and graph persistence across processes that
//! share one keystore or graph directory.
//!
//! Uses `fs2` for cross-platform file locking (flock on Unix, LockFile on Windows).
//! The lock file itself is left in place on release; removing it would let a
//! waiter lock an unlinked inode.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use fs2::FileExt;

use crate::domain::errors::{SecurityError, SecurityResult};

/// How long a caller waits for a contended lock.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(30);

const MAX_RETRY_DELAY: Duration = Duration::from_millis(500);

/// Exclusive advisory lock, released on drop (RAII).
///
/// ```ignore
/// let lock = FileLock::acquire(&keystore.join(".bootstrap.lock"), DEFAULT_LOCK_TIMEOUT)?;
/// // Lock is held until `lock` goes out of scope
/// ```
#[derive(Debug)]
pub struct FileLock {
    file: File,
    path: PathBuf,
}

impl FileLock {
    /// Acquire an exclusive lock on `lock_path`, creating the file if needed.
    ///
    /// Retries with exponential backoff until `timeout` elapses. Blocks the
    /// calling thread; async callers run it under `spawn_blocking`.
    ///
    /// # Errors
    ///
    /// `Io` if the lock file cannot be opened, `Timeout` if another holder
    /// keeps it past the deadline.
    pub fn acquire(lock_path: &Path, timeout: Duration) -> SecurityResult<Self> {
        let deadline = Instant::now() + timeout;
        let mut retry_delay = Duration::from_millis(10);

        let mut file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(lock_path)
            .map_err(|e| SecurityError::io(lock_path, e))?;

        loop {
            match file.try_lock_exclusive() {
                Ok(()) => {
                    // Holder PID is informational only
                    let _ = file.set_len(0);
                    let _ = writeln!(file, "{}", std::process::id());

                    tracing::trace!(path = %lock_path.display(), "Lock acquired");
                    return Ok(Self {
                        file,
                        path: lock_path.to_path_buf(),
                    });
                }
                Err(_) if Instant::now() < deadline => {
                    std::thread::sleep(retry_delay);
                    retry_delay = (retry_delay * 2).min(MAX_RETRY_DELAY);
                }
                Err(_) => {
                    tracing::warn!(
                        path = %lock_path.display(),
                        holder = ?Self::read_holder_pid(lock_path),
                        "Lock still held at deadline"
                    );
                    return Err(SecurityError::Timeout {
                        operation: "file lock",
                        after: timeout,
                    });
                }
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_holder_pid(path: &Path) -> Option<u32> {
        std::fs::read_to_string(path)
            .ok()
            .and_then(|s| s.trim().parse().ok())
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        #[allow(clippy::incompatible_msrv)]
        let _ = self.file.unlock();
    }
}
