//! Tree cache facade.
//!
//! Parsed trees are memoized under `{uri}_{branch}`. Two interchangeable
//! backends implement [`TreeCache`]:
//!
//! - [`ValkeyCache`]: a networked Valkey/Redis instance, keys prefixed with
//!   `WEBSITES-CONTENT-SYSTEM_`.
//! - [`FileCache`]: one JSON file per key under `<base_dir>/tree-cache`.
//!
//! [`init_cache`] probes the networked backend once and falls back to the
//! filesystem, logging the degradation. Callers only see the trait.
//!
//! # Consistency
//!
//! Writers always replace a whole value. Valkey `SET` is atomic per key, and
//! [`FileCache`] writes through a temporary file that is renamed into place,
//! so a reader sees either the previous complete value or the new one.
//!
//! # Invalidation
//!
//! An invalidated entry holds the literal `null`. [`read_tree`] treats that,
//! an absent key, an undecodable value and a backend error identically: as a
//! miss.

mod file;
mod valkey;

pub use file::FileCache;
pub use valkey::ValkeyCache;

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;

use crate::config::AppConfig;
use crate::constants::CACHE_NULL_SENTINEL;
use crate::models::PageNode;

/// Key/value capability used to memoize trees.
#[async_trait]
pub trait TreeCache: Send + Sync {
    /// Short backend name for logs.
    fn backend(&self) -> &'static str;

    /// Raw value under `key`, `None` when absent.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Replace the value under `key`.
    async fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Remove `key`. Removing an absent key succeeds.
    async fn delete(&self, key: &str) -> Result<()>;

    /// Connectivity probe.
    async fn is_available(&self) -> bool;
}

/// Cache key for a repository and branch, before backend prefixing.
#[must_use]
pub fn tree_key(uri: &str, branch: &str) -> String {
    format!("{uri}_{branch}")
}

/// Cached tree under `key`, or `None` on any kind of miss.
pub async fn read_tree(cache: &dyn TreeCache, key: &str) -> Option<PageNode> {
    let raw = match cache.get(key).await {
        Ok(Some(raw)) => raw,
        Ok(None) => return None,
        Err(e) => {
            tracing::warn!(target: "cache", backend = cache.backend(), key, "cache read failed: {e:#}");
            return None;
        }
    };
    if raw.trim() == CACHE_NULL_SENTINEL {
        return None;
    }
    match serde_json::from_str(&raw) {
        Ok(tree) => Some(tree),
        Err(e) => {
            tracing::warn!(target: "cache", key, "discarding undecodable cache entry: {e}");
            None
        }
    }
}

/// Serialize `tree` and store it under `key`.
///
/// # Errors
///
/// Returns the backend's error if the write fails.
pub async fn write_tree(cache: &dyn TreeCache, key: &str, tree: &PageNode) -> Result<()> {
    let value = serde_json::to_string(tree)?;
    cache.set(key, &value).await?;
    tracing::debug!(target: "cache", backend = cache.backend(), key, bytes = value.len(), "tree cached");
    Ok(())
}

/// Mark `key` stale by storing the null sentinel.
///
/// # Errors
///
/// Returns the backend's error if the write fails.
pub async fn invalidate(cache: &dyn TreeCache, key: &str) -> Result<()> {
    cache.set(key, CACHE_NULL_SENTINEL).await?;
    tracing::debug!(target: "cache", backend = cache.backend(), key, "cache entry invalidated");
    Ok(())
}

/// Pick a cache backend for `config`.
///
/// When a Valkey endpoint is configured and answers `PING`, it is used.
/// Otherwise the filesystem cache under [`AppConfig::cache_dir`] is returned.
///
/// # Errors
///
/// Returns an error only if the filesystem fallback cannot be created.
pub async fn init_cache(config: &AppConfig) -> Result<Arc<dyn TreeCache>> {
    if let Some(valkey) = &config.valkey {
        tracing::info!(target: "cache", host = %valkey.host, port = valkey.port, "connecting to Valkey");
        match ValkeyCache::new(valkey) {
            Ok(cache) if cache.is_available().await => return Ok(Arc::new(cache)),
            Ok(_) => tracing::warn!(
                target: "cache",
                "Valkey at {}:{} is not available, using the file cache instead",
                valkey.host,
                valkey.port
            ),
            Err(e) => tracing::warn!(target: "cache", "invalid Valkey settings, using the file cache instead: {e:#}"),
        }
    }

    let dir = config.cache_dir();
    tracing::info!(target: "cache", dir = %dir.display(), "using file cache");
    Ok(Arc::new(FileCache::new(dir)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ValkeyConfig;
    use crate::models::{PageMeta, PageTree};
    use tempfile::TempDir;

    fn sample_tree() -> PageNode {
        let mut tree = PageTree::new(
            "/",
            PageMeta {
                title: Some("Home".into()),
                ..PageMeta::default()
            },
        );
        tree.add_child(0, "/about", PageMeta::default());
        tree.to_node()
    }

    #[test]
    fn test_tree_key() {
        assert_eq!(tree_key("ubuntu.com", "main"), "ubuntu.com_main");
    }

    #[tokio::test]
    async fn test_read_after_write() {
        let temp = TempDir::new().unwrap();
        let cache = FileCache::new(temp.path()).unwrap();
        let key = tree_key("site", "main");
        assert_eq!(read_tree(&cache, &key).await, None);

        write_tree(&cache, &key, &sample_tree()).await.unwrap();
        assert_eq!(read_tree(&cache, &key).await, Some(sample_tree()));
    }

    #[tokio::test]
    async fn test_invalidated_entry_reads_as_miss() {
        let temp = TempDir::new().unwrap();
        let cache = FileCache::new(temp.path()).unwrap();
        write_tree(&cache, "k", &sample_tree()).await.unwrap();

        invalidate(&cache, "k").await.unwrap();
        assert_eq!(cache.get("k").await.unwrap().as_deref(), Some("null"));
        assert_eq!(read_tree(&cache, "k").await, None);
    }

    #[tokio::test]
    async fn test_garbage_reads_as_miss() {
        let temp = TempDir::new().unwrap();
        let cache = FileCache::new(temp.path()).unwrap();
        cache.set("k", "{not json").await.unwrap();
        assert_eq!(read_tree(&cache, "k").await, None);
    }

    #[tokio::test]
    async fn test_init_falls_back_to_file_cache() {
        let temp = TempDir::new().unwrap();
        let config = AppConfig {
            base_dir: temp.path().to_path_buf(),
            valkey: Some(ValkeyConfig {
                host: "127.0.0.1".into(),
                port: 1,
                db: 0,
            }),
            ..AppConfig::default()
        };
        let cache = init_cache(&config).await.unwrap();
        assert_eq!(cache.backend(), "file");
        assert!(cache.is_available().await);
        assert!(temp.path().join("tree-cache").is_dir());
    }

    #[tokio::test]
    async fn test_init_without_valkey_uses_file_cache() {
        let temp = TempDir::new().unwrap();
        let config = AppConfig {
            base_dir: temp.path().to_path_buf(),
            ..AppConfig::default()
        };
        assert_eq!(init_cache(&config).await.unwrap().backend(), "file");
    }
}
