//! Cross-process lock on a working copy.
//!
//! Two URIs can name the same working copy (`site` and
//! `https://github.com/org/site.git` both live in `<root>/site`). The
//! in-process registry is keyed by URI, so the directory itself is guarded by
//! an OS file lock at `<lock_dir>/<working copy name>.lock`. The lock is held
//! for as long as the returned value lives.

use anyhow::{Context, Result};
use fs4::fs_std::FileExt;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

/// Exclusive OS-level lock on one working copy.
#[derive(Debug)]
pub struct WorkingCopyLock {
    file: File,
    path: PathBuf,
}

impl WorkingCopyLock {
    /// Block until the lock for `name` is acquired.
    ///
    /// The wait happens on the blocking pool so the runtime keeps running.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock directory or file cannot be created, or if
    /// the filesystem does not support locking.
    pub async fn acquire(lock_dir: &Path, name: &str) -> Result<Self> {
        let path = lock_path(lock_dir, name).await?;
        let target = path.clone();
        let file = tokio::task::spawn_blocking(move || -> Result<File> {
            let file = open(&target)?;
            file.lock_exclusive()
                .with_context(|| format!("Failed to lock {}", target.display()))?;
            Ok(file)
        })
        .await
        .context("lock task panicked")??;

        tracing::trace!(target: "lock", path = %path.display(), "working copy lock acquired");
        Ok(Self { file, path })
    }

    /// Take the lock for `name` if nobody holds it; `None` when it is busy.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock directory or file cannot be created.
    pub async fn try_acquire(lock_dir: &Path, name: &str) -> Result<Option<Self>> {
        let path = lock_path(lock_dir, name).await?;
        let target = path.clone();
        let file = tokio::task::spawn_blocking(move || -> Result<Option<File>> {
            let file = open(&target)?;
            let locked = file
                .try_lock_exclusive()
                .with_context(|| format!("Failed to lock {}", target.display()))?;
            Ok(locked.then_some(file))
        })
        .await
        .context("lock task panicked")??;

        Ok(file.map(|file| {
            tracing::trace!(target: "lock", path = %path.display(), "working copy lock acquired");
            Self { file, path }
        }))
    }

    /// Location of the lock file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for WorkingCopyLock {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            tracing::warn!(target: "lock", path = %self.path.display(), "failed to unlock: {e}");
        }
    }
}

async fn lock_path(lock_dir: &Path, name: &str) -> Result<PathBuf> {
    tokio::fs::create_dir_all(lock_dir)
        .await
        .with_context(|| format!("Failed to create lock directory {}", lock_dir.display()))?;
    Ok(lock_dir.join(format!("{name}.lock")))
}

fn open(path: &Path) -> Result<File> {
    OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(false)
        .open(path)
        .with_context(|| format!("Failed to open lock file {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_creates_lock_directory() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join(".locks");
        let lock = WorkingCopyLock::acquire(&dir, "site").await.unwrap();
        assert_eq!(lock.path(), dir.join("site.lock"));
        assert!(lock.path().exists());
    }

    #[tokio::test]
    async fn test_try_acquire_reports_busy() {
        let temp = TempDir::new().unwrap();
        let held = WorkingCopyLock::try_acquire(temp.path(), "site").await.unwrap();
        assert!(held.is_some());
        assert!(WorkingCopyLock::try_acquire(temp.path(), "site").await.unwrap().is_none());
        assert!(WorkingCopyLock::try_acquire(temp.path(), "other").await.unwrap().is_some());

        drop(held);
        assert!(WorkingCopyLock::try_acquire(temp.path(), "site").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_acquire_waits_for_release() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().to_path_buf();
        let held = WorkingCopyLock::acquire(&dir, "site").await.unwrap();

        let waiter = tokio::spawn(async move { WorkingCopyLock::acquire(&dir, "site").await });
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!waiter.is_finished());

        drop(held);
        let lock = tokio::time::timeout(Duration::from_secs(5), waiter).await.unwrap().unwrap();
        assert!(lock.is_ok());
    }
}
