// src/applock.rs

//! Single-instance application lock
//!
//! The package-manager transaction lock already serializes mutations, but a
//! second conversion run would still race the staging directories and the
//! rollback ledger. An exclusive file lock taken before the first mutation
//! keeps the whole run single-instance; the lock dies with the process, so
//! a crash never leaves a stale lock behind.

use crate::error::{Error, Result};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Held for the lifetime of a conversion run.
#[derive(Debug)]
pub struct ApplicationLock {
    file: File,
    path: PathBuf,
}

impl ApplicationLock {
    /// Acquire the lock or fail immediately when another instance holds it.
    pub fn acquire(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(path)?;
        file.try_lock_exclusive()
            .map_err(|_| Error::AlreadyRunning(path.display().to_string()))?;

        // Record the owning pid for a human inspecting the lock file.
        let _ = write!(file, "{}\n", std::process::id());
        debug!("Acquired application lock at {}", path.display());

        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }
}

impl Drop for ApplicationLock {
    fn drop(&mut self) {
        let _ = fs2::FileExt::unlock(&self.file);
        let _ = fs::remove_file(&self.path);
        debug!("Released application lock at {}", self.path.display());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acquire_and_release() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("distroshift.lock");

        let lock = ApplicationLock::acquire(&path).unwrap();
        assert!(path.exists());
        drop(lock);
        assert!(!path.exists());
    }

    #[test]
    fn test_second_acquire_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("distroshift.lock");

        let _lock = ApplicationLock::acquire(&path).unwrap();
        let err = ApplicationLock::acquire(&path).unwrap_err();
        assert!(matches!(err, Error::AlreadyRunning(_)));
    }

    #[test]
    fn test_reacquire_after_release() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("distroshift.lock");

        drop(ApplicationLock::acquire(&path).unwrap());
        let _lock = ApplicationLock::acquire(&path).unwrap();
    }
}
