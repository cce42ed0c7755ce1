//! Shared collaborators of every [`SiteRepository`](super::SiteRepository).

use anyhow::{Context, Result};
use std::sync::Arc;

use crate::cache::{TreeCache, init_cache};
use crate::checkout::{GitWorkingCopies, WorkingCopies};
use crate::config::{AppConfig, SiteManifest};
use crate::lock::RepositoryLocks;
use crate::parser::{TemplateParser, TreeParser};
use crate::store::PageStore;

/// Everything the orchestrator, the worker pool and the scheduler share.
///
/// Built once at startup and passed around behind an [`Arc`]; there is no
/// process-global state.
pub struct SiteContext {
    /// Resolved configuration
    pub config: AppConfig,
    /// Active cache backend
    pub cache: Arc<dyn TreeCache>,
    /// Per-repository locks
    pub locks: Arc<RepositoryLocks>,
    /// Page database
    pub store: PageStore,
    /// Working-copy lifecycle
    pub working_copies: Arc<dyn WorkingCopies>,
    /// Template parser
    pub parser: Arc<dyn TreeParser>,
}

impl SiteContext {
    /// Wire up the production collaborators for `config`: the probed cache
    /// backend, the SQLite store, file-backed locks pre-registered for every
    /// manifest site, git working copies and the template parser.
    ///
    /// # Errors
    ///
    /// Fails if the cache directory, database or manifest cannot be opened.
    pub async fn from_config(config: AppConfig) -> Result<Self> {
        let cache = init_cache(&config).await?;
        let store = PageStore::open(&config.database_path())
            .await
            .with_context(|| format!("Failed to open database {}", config.database_path().display()))?;

        let locks = Arc::new(RepositoryLocks::with_lock_dir(config.lock_dir()));
        let manifest = SiteManifest::load(&config.manifest_path()).await?;
        locks.register(&manifest.sites);
        tracing::info!(target: "lock", sites = manifest.sites.len(), "repository locks registered");

        Ok(Self {
            cache,
            locks,
            store,
            working_copies: Arc::new(GitWorkingCopies::from_config(&config)),
            parser: Arc::new(TemplateParser::new()?),
            config,
        })
    }
}

impl std::fmt::Debug for SiteContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SiteContext")
            .field("base_dir", &self.config.base_dir)
            .field("cache", &self.cache.backend())
            .field("locks", &self.locks.len())
            .finish_non_exhaustive()
    }
}
