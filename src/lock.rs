//! File-based locking to prevent concurrent execution.
//!
//! The reconciler assumes it is the only writer of its chain and of the INPUT
//! link rules. Mutating commands hold an flock-style advisory lock for their
//! whole duration to make that true.

use anyhow::{Context, Result};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

pub const LOCK_FILE: &str = "/run/geowall.lock";

/// A guard that holds an exclusive lock on the geowall lock file.
/// The lock is released when the guard is dropped.
pub struct LockGuard {
    _file: File,
}

impl LockGuard {
    /// Acquire the system-wide lock.
    pub fn acquire() -> Result<Self> {
        Self::acquire_at(LOCK_FILE)
    }

    /// Acquire an exclusive lock on `path` without blocking.
    ///
    /// Opens with create+read+write (no truncate) so there is no window between
    /// creating the file and locking it.
    pub fn acquire_at<P: AsRef<Path>>(path: P) -> Result<Self> {
        let lock_path = path.as_ref();
        if let Some(parent) = lock_path.parent() {
            fs::create_dir_all(parent).ok();
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(lock_path)
            .with_context(|| format!("Failed to open lock file: {}", lock_path.display()))?;

        fs::set_permissions(lock_path, fs::Permissions::from_mode(0o600))
            .context("Failed to set lock file permissions")?;

        file.try_lock_exclusive().map_err(|_| {
            anyhow::anyhow!(
                "Another instance of geowall is already running.\n\
                 If you believe this is an error, remove the lock file: {}\n\
                 Or wait for the other instance to complete.",
                lock_path.display()
            )
        })?;

        Ok(Self { _file: file })
    }
}
