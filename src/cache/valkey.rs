//! Valkey (Redis protocol) cache backend.

use anyhow::Result;
use async_trait::async_trait;
use redis::AsyncCommands;
use std::future::Future;
use std::time::Duration;
use tokio::time::timeout;

use super::TreeCache;
use crate::config::ValkeyConfig;
use crate::constants::{VALKEY_KEY_PREFIX, VALKEY_TIMEOUT};
use crate::core::SiteError;

/// Networked cache. Every call opens a multiplexed connection and is bounded
/// by a timeout so an unresponsive server degrades into cache misses.
#[derive(Debug, Clone)]
pub struct ValkeyCache {
    client: redis::Client,
    prefix: String,
    timeout: Duration,
}

impl ValkeyCache {
    /// Client for the server described by `config`. No connection is made yet.
    ///
    /// # Errors
    ///
    /// Returns [`SiteError::CacheError`] if the connection URL is malformed.
    pub fn new(config: &ValkeyConfig) -> Result<Self> {
        let client = redis::Client::open(config.url()).map_err(|e| SiteError::CacheError {
            operation: "open".to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self {
            client,
            prefix: VALKEY_KEY_PREFIX.to_string(),
            timeout: VALKEY_TIMEOUT,
        })
    }

    /// Override the per-call timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Key as stored on the server.
    #[must_use]
    pub fn prefixed(&self, key: &str) -> String {
        format!("{}_{key}", self.prefix)
    }

    async fn bounded<T, F>(&self, operation: &str, fut: F) -> Result<T>
    where
        F: Future<Output = redis::RedisResult<T>>,
    {
        match timeout(self.timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(SiteError::CacheError {
                operation: operation.to_string(),
                reason: e.to_string(),
            }
            .into()),
            Err(_) => Err(SiteError::CacheError {
                operation: operation.to_string(),
                reason: format!("timed out after {:?}", self.timeout),
            }
            .into()),
        }
    }
}

#[async_trait]
impl TreeCache for ValkeyCache {
    fn backend(&self) -> &'static str {
        "valkey"
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let key = self.prefixed(key);
        self.bounded("get", async {
            let mut conn = self.client.get_multiplexed_async_connection().await?;
            conn.get::<_, Option<String>>(&key).await
        })
        .await
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let key = self.prefixed(key);
        self.bounded("set", async {
            let mut conn = self.client.get_multiplexed_async_connection().await?;
            conn.set::<_, _, ()>(&key, value).await
        })
        .await
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let key = self.prefixed(key);
        self.bounded("delete", async {
            let mut conn = self.client.get_multiplexed_async_connection().await?;
            conn.del::<_, ()>(&key).await
        })
        .await
    }

    async fn is_available(&self) -> bool {
        let probe = self
            .bounded("ping", async {
                let mut conn = self.client.get_multiplexed_async_connection().await?;
                let pong: String = redis::cmd("PING").query_async(&mut conn).await?;
                Ok(pong)
            })
            .await;
        match probe {
            Ok(_) => true,
            Err(e) => {
                tracing::debug!(target: "cache", "Valkey probe failed: {e:#}");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unreachable() -> ValkeyCache {
        ValkeyCache::new(&ValkeyConfig {
            host: "127.0.0.1".into(),
            port: 1,
            db: 0,
        })
        .unwrap()
        .with_timeout(Duration::from_millis(500))
    }

    #[test]
    fn test_keys_are_prefixed() {
        assert_eq!(unreachable().prefixed("site_main"), "WEBSITES-CONTENT-SYSTEM_site_main");
    }

    #[tokio::test]
    async fn test_unreachable_server_is_unavailable() {
        let cache = unreachable();
        assert!(!cache.is_available().await);
        let err = cache.get("k").await.unwrap_err();
        assert!(matches!(err.downcast_ref::<SiteError>(), Some(SiteError::CacheError { .. })));
    }
}
