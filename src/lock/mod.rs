//! Per-repository lock registry.
//!
//! One async mutex per repository URI, created on first use and kept until
//! [`RepositoryLocks::prune`] drops it. Regeneration holds a repository's
//! [`RepositoryGuard`] for the whole clone, parse, persist and cache-write
//! sequence, so two branches of one repository serialize against each other:
//! they share a working copy.
//!
//! Two ways in:
//!
//! - [`RepositoryLocks::try_acquire`] never waits. A held lock yields `None`,
//!   which background callers treat as "someone is already regenerating this".
//! - [`RepositoryLocks::acquire`] waits, for synchronous readers that need an
//!   answer.
//!
//! When the registry has a lock directory, each guard also holds a
//! [`WorkingCopyLock`] so separate processes sharing a repositories root do
//! not trample each other's checkouts.

mod file_lock;

pub use file_lock::WorkingCopyLock;

use anyhow::Result;
use dashmap::DashMap;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::git::working_copy_name;

/// Registry of per-repository locks, shared by the orchestrator, the worker
/// pool and the scheduler.
#[derive(Debug, Default)]
pub struct RepositoryLocks {
    locks: DashMap<String, Arc<Mutex<()>>>,
    lock_dir: Option<PathBuf>,
}

impl RepositoryLocks {
    /// In-process locks only.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// In-process locks backed by file locks under `lock_dir`.
    #[must_use]
    pub fn with_lock_dir(lock_dir: impl Into<PathBuf>) -> Self {
        Self {
            locks: DashMap::new(),
            lock_dir: Some(lock_dir.into()),
        }
    }

    /// Directory of cross-process lock files, if any.
    #[must_use]
    pub fn lock_dir(&self) -> Option<&Path> {
        self.lock_dir.as_deref()
    }

    fn mutex(&self, uri: &str) -> Arc<Mutex<()>> {
        Arc::clone(self.locks.entry(uri.to_string()).or_insert_with(|| Arc::new(Mutex::new(()))).value())
    }

    /// Take the lock for `uri` without waiting. `None` means busy.
    ///
    /// # Errors
    ///
    /// Returns an error if `uri` has no usable working-copy name or the lock
    /// file cannot be created.
    pub async fn try_acquire(&self, uri: &str) -> Result<Option<RepositoryGuard>> {
        let Ok(guard) = self.mutex(uri).try_lock_owned() else {
            tracing::debug!(target: "lock", uri, "repository busy");
            return Ok(None);
        };

        let file = match &self.lock_dir {
            Some(dir) => match WorkingCopyLock::try_acquire(dir, &working_copy_name(uri)?).await? {
                Some(file) => Some(file),
                None => {
                    tracing::debug!(target: "lock", uri, "working copy busy in another process");
                    return Ok(None);
                }
            },
            None => None,
        };

        tracing::debug!(target: "lock", uri, "repository lock acquired");
        Ok(Some(RepositoryGuard::new(uri, guard, file)))
    }

    /// Wait for the lock for `uri`.
    ///
    /// # Errors
    ///
    /// Returns an error if `uri` has no usable working-copy name or the lock
    /// file cannot be created.
    pub async fn acquire(&self, uri: &str) -> Result<RepositoryGuard> {
        let name = match &self.lock_dir {
            Some(_) => Some(working_copy_name(uri)?),
            None => None,
        };

        let start = std::time::Instant::now();
        let guard = self.mutex(uri).lock_owned().await;
        let file = match (&self.lock_dir, name) {
            (Some(dir), Some(name)) => Some(WorkingCopyLock::acquire(dir, &name).await?),
            _ => None,
        };

        tracing::debug!(
            target: "lock",
            uri,
            wait_ms = start.elapsed().as_millis() as u64,
            "repository lock acquired"
        );
        Ok(RepositoryGuard::new(uri, guard, file))
    }

    /// Whether `uri` is currently held by someone.
    #[must_use]
    pub fn is_locked(&self, uri: &str) -> bool {
        self.locks.get(uri).is_some_and(|m| m.try_lock().is_err())
    }

    /// Create locks for `uris` up front.
    pub fn register<I, S>(&self, uris: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for uri in uris {
            self.locks.entry(uri.as_ref().to_string()).or_insert_with(|| Arc::new(Mutex::new(())));
        }
    }

    /// Drop idle locks for repositories not in `keep`. Held locks survive.
    /// Returns how many were removed.
    pub fn prune(&self, keep: &HashSet<String>) -> usize {
        let before = self.locks.len();
        self.locks.retain(|uri, mutex| keep.contains(uri) || Arc::strong_count(mutex) > 1);
        let removed = before.saturating_sub(self.locks.len());
        if removed > 0 {
            tracing::debug!(target: "lock", removed, "pruned idle repository locks");
        }
        removed
    }

    /// Whether a lock exists for `uri`.
    #[must_use]
    pub fn contains(&self, uri: &str) -> bool {
        self.locks.contains_key(uri)
    }

    /// Number of locks in the registry.
    #[must_use]
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    /// Whether the registry holds no locks.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

/// Proof that the holder may touch a repository's working copy. Released on drop.
#[derive(Debug)]
pub struct RepositoryGuard {
    uri: String,
    _file: Option<WorkingCopyLock>,
    _guard: OwnedMutexGuard<()>,
}

impl RepositoryGuard {
    fn new(uri: &str, guard: OwnedMutexGuard<()>, file: Option<WorkingCopyLock>) -> Self {
        Self {
            uri: uri.to_string(),
            _file: file,
            _guard: guard,
        }
    }

    /// Repository this guard locks.
    #[must_use]
    pub fn uri(&self) -> &str {
        &self.uri
    }
}

impl Drop for RepositoryGuard {
    fn drop(&mut self) {
        tracing::debug!(target: "lock", uri = %self.uri, "repository lock released");
    }
}
