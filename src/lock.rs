//! Advisory lock serializing provisioning runs.
//!
//! Two runs sharing a staging path would race on the staging file; two
//! runs for the same host name would race on the live configuration and
//! the reload. A run therefore holds two locks: one on `{staging}.lock`
//! and one on `{lock_dir}/vhostctl-{host}.lock`. Each is a `flock(2)`
//! held for the lifetime of a [`ProvisionLock`] and released when the
//! file descriptor is closed.

use std::fs::{File, OpenOptions};

use camino::{Utf8Path, Utf8PathBuf};
use rustix::fs::{self as rfs, FlockOperation};
use rustix::io::Errno;

use crate::error::VhostError;

/// Default directory for per-host lock files.
pub const DEFAULT_LOCK_DIR: &str = "/run/lock";

/// Returns the lock file path associated with a staging path.
pub fn lock_path_for(staging_path: &Utf8Path) -> Utf8PathBuf {
    Utf8PathBuf::from(format!("{}.lock", staging_path))
}

/// Returns the per-host lock file path inside `lock_dir`.
pub fn host_lock_path(lock_dir: &Utf8Path, host_name: &str) -> Utf8PathBuf {
    lock_dir.join(format!("vhostctl-{}.lock", host_name))
}

/// Held exclusive lock; dropping it releases the lock.
#[derive(Debug)]
pub struct ProvisionLock {
    path: Utf8PathBuf,
    _file: File,
}

impl ProvisionLock {
    /// Takes the lock without blocking.
    ///
    /// # Errors
    ///
    /// Returns `VhostError::Busy` if another process holds the lock.
    pub fn acquire(path: &Utf8Path) -> Result<Self, VhostError> {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(path)
            .map_err(|e| VhostError::io(format!("failed to open lock file {}", path), e))?;

        match rfs::flock(&file, FlockOperation::NonBlockingLockExclusive) {
            Ok(()) => {
                tracing::debug!("acquired provisioning lock {}", path);
                Ok(Self {
                    path: path.to_owned(),
                    _file: file,
                })
            }
            Err(Errno::WOULDBLOCK) => Err(VhostError::Busy(path.to_string())),
            Err(e) => Err(VhostError::io(
                format!("failed to lock {}", path),
                std::io::Error::from(e),
            )),
        }
    }

    pub fn path(&self) -> &Utf8Path {
        &self.path
    }
}

impl Drop for ProvisionLock {
    fn drop(&mut self) {
        tracing::debug!("released provisioning lock {}", self.path);
    }
}
