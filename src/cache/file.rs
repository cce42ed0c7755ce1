//! Filesystem cache backend.

use anyhow::{Context, Result};
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

use super::TreeCache;
use crate::constants::FILE_CACHE_PREFIX;
use crate::core::SiteError;

/// Longest sanitised key fragment kept in a file name.
const MAX_KEY_CHARS: usize = 64;

/// One JSON file per key in a dedicated directory.
///
/// File names are `WEBSITES_CONTENT_SYSTEM_<sanitised key>_<hash>.json`. The
/// sanitised part keeps names readable; the hash of the raw key keeps keys that
/// sanitise identically (`a/b` and `a_b`) apart.
#[derive(Debug, Clone)]
pub struct FileCache {
    dir: PathBuf,
}

impl FileCache {
    /// Cache rooted at `dir`, creating it if needed.
    ///
    /// # Errors
    ///
    /// Returns [`SiteError::CacheError`] if the directory cannot be created or
    /// is not writable.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|e| SiteError::CacheError {
            operation: "create cache directory".to_string(),
            reason: format!("{}: {e}", dir.display()),
        })?;
        let metadata = std::fs::metadata(&dir)?;
        if metadata.permissions().readonly() {
            return Err(SiteError::CacheError {
                operation: "open cache directory".to_string(),
                reason: format!("{} is not writable", dir.display()),
            }
            .into());
        }
        Ok(Self { dir })
    }

    /// Directory holding the cache files.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File that stores `key`.
    #[must_use]
    pub fn path_for(&self, key: &str) -> PathBuf {
        let sanitised: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') { c } else { '_' })
            .take(MAX_KEY_CHARS)
            .collect();
        let digest = hex::encode(Sha256::digest(key.as_bytes()));
        self.dir.join(format!("{FILE_CACHE_PREFIX}_{sanitised}_{}.json", &digest[..12]))
    }
}

#[async_trait]
impl TreeCache for FileCache {
    fn backend(&self) -> &'static str {
        "file"
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let path = self.path_for(key);
        match tokio::fs::read_to_string(&path).await {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(SiteError::CacheError {
                operation: "read".to_string(),
                reason: format!("{}: {e}", path.display()),
            }
            .into()),
        }
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let dir = self.dir.clone();
        let path = self.path_for(key);
        let value = value.to_string();

        tokio::task::spawn_blocking(move || -> Result<()> {
            std::fs::create_dir_all(&dir)?;
            let mut temp = NamedTempFile::new_in(&dir)?;
            temp.write_all(value.as_bytes())?;
            temp.as_file().sync_all()?;
            temp.persist(&path).map_err(|e| SiteError::CacheError {
                operation: "write".to_string(),
                reason: format!("{}: {}", path.display(), e.error),
            })?;
            Ok(())
        })
        .await
        .context("cache write task panicked")?
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let path = self.path_for(key);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(SiteError::CacheError {
                operation: "delete".to_string(),
                reason: format!("{}: {e}", path.display()),
            }
            .into()),
        }
    }

    async fn is_available(&self) -> bool {
        tokio::fs::metadata(&self.dir).await.is_ok_and(|m| m.is_dir())
    }
}
