//! The site repository orchestrator.
//!
//! A [`SiteRepository`] is a cheap handle on one `(repository, branch)` pair.
//! It composes the collaborators in [`SiteContext`]:
//!
//! ```text
//! cache hit? ──yes──▶ tree
//!     │no
//!     ▼
//! lock ─▶ invalidate ─▶ setup ─▶ parse ─▶ persist ─▶ cache write ─▶ tree
//!                         ▲                                │ transient error
//!                         └──── delete working copy ◀──────┘ (retried)
//! ```
//!
//! The repository lock is held from setup to cache write, so a tree in the
//! cache always matches the working copy it was parsed from, whichever branch
//! last used it.
//!
//! # Errors
//!
//! Internal steps return [`anyhow::Result`]. The public methods convert at the
//! boundary: validation errors pass through unchanged, everything else
//! becomes [`SiteError::RegenerationFailed`]. [`SiteRepository::get_tree_sync`]
//! and [`SiteRepository::get_tree_async`] never fail; they fall back to the
//! placeholder tree.

mod context;

pub use context::SiteContext;

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_retry::RetryIf;
use tokio_retry::strategy::ExponentialBackoff;

use crate::cache::{invalidate, read_tree, tree_key, write_tree};
use crate::constants::{CACHE_POLL_INTERVAL, MAX_BACKOFF_DELAY_MS, STARTING_BACKOFF_DELAY_MS};
use crate::core::{SiteError, is_transient};
use crate::lock::RepositoryGuard;
use crate::models::{PageNode, PageTree, TreeResponse, Webpage};
use crate::store::WebpageChangeset;
use crate::tasks::{JobOutcome, TreeWorkerPool};

/// Handle on one repository and branch.
#[derive(Debug, Clone)]
pub struct SiteRepository {
    uri: String,
    branch: String,
    ctx: Arc<SiteContext>,
}

impl SiteRepository {
    /// Handle for `uri` at `branch`.
    pub fn new(ctx: Arc<SiteContext>, uri: impl Into<String>, branch: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            branch: branch.into(),
            ctx,
        }
    }

    /// Handle for `uri` at the configured default branch.
    pub fn on_default_branch(ctx: Arc<SiteContext>, uri: impl Into<String>) -> Self {
        let branch = ctx.config.default_branch.clone();
        Self::new(ctx, uri, branch)
    }

    /// Repository URI.
    #[must_use]
    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// Branch.
    #[must_use]
    pub fn branch(&self) -> &str {
        &self.branch
    }

    /// Cache key of this repository and branch.
    #[must_use]
    pub fn cache_key(&self) -> String {
        tree_key(&self.uri, &self.branch)
    }

    /// The page tree, from the cache unless `no_cache` is set.
    ///
    /// On a miss the caller waits for the repository lock. Once it has it, the
    /// cache is checked again: whoever held the lock may have just filled it.
    ///
    /// # Errors
    ///
    /// Returns the validation error for a bad repository URI, or
    /// [`SiteError::RegenerationFailed`] when no tree could be produced.
    pub async fn get_tree(&self, no_cache: bool) -> std::result::Result<PageNode, SiteError> {
        if !no_cache && let Some(tree) = self.cached_tree().await {
            return Ok(tree);
        }

        let guard = self.ctx.locks.acquire(&self.uri).await.map_err(|e| self.failure(e))?;
        if !no_cache && let Some(tree) = self.cached_tree().await {
            tracing::debug!(target: "cache", uri = %self.uri, "tree filled while waiting for the lock");
            return Ok(tree);
        }

        self.regenerate(&guard).await.map_err(|e| self.failure(e))
    }

    /// Regenerate only if nobody else is: `Ok(None)` when the repository is
    /// busy. Used by background callers that must not queue up behind an
    /// in-flight generation.
    ///
    /// # Errors
    ///
    /// Same as [`Self::get_tree`].
    pub async fn regenerate_if_idle(&self) -> std::result::Result<Option<PageNode>, SiteError> {
        let Some(guard) = self.ctx.locks.try_acquire(&self.uri).await.map_err(|e| self.failure(e))? else {
            tracing::debug!(target: "tasks", uri = %self.uri, "generation already in progress, skipping");
            return Ok(None);
        };
        self.regenerate(&guard).await.map(Some).map_err(|e| self.failure(e))
    }

    /// [`Self::get_tree`] wrapped for callers that want a body, not an error.
    /// Failures are logged and answered with the placeholder tree.
    pub async fn get_tree_sync(&self, no_cache: bool) -> TreeResponse {
        let templates = match self.get_tree(no_cache).await {
            Ok(tree) => tree,
            Err(e) => {
                tracing::error!(uri = %self.uri, branch = %self.branch, "returning placeholder tree: {e}");
                PageNode::placeholder()
            }
        };
        self.response(templates)
    }

    /// Invalidate, hand regeneration to `pool`, and wait a bounded time for
    /// the result.
    ///
    /// The job is not cancelled when the wait runs out; it finishes in the
    /// background and fills the cache for the next reader. When the
    /// repository is already being regenerated (or the queue is full), the
    /// cache is polled instead.
    pub async fn get_tree_async(&self, pool: &TreeWorkerPool) -> TreeResponse {
        self.invalidate_quietly().await;
        let deadline = Instant::now() + self.ctx.config.tasks.async_wait();

        match pool.submit(self.clone()) {
            Ok(reply) => match tokio::time::timeout_at(deadline, reply).await {
                Ok(Ok(JobOutcome::Generated(tree))) => return self.response(tree),
                Ok(Ok(JobOutcome::Failed(e))) => {
                    tracing::error!(uri = %self.uri, "background generation failed: {e}");
                    return self.response(PageNode::placeholder());
                }
                Ok(Ok(JobOutcome::Busy)) | Ok(Err(_)) => {}
                Err(_) => {
                    tracing::info!(uri = %self.uri, "tree not ready in time, returning placeholder");
                    return self.response(PageNode::placeholder());
                }
            },
            Err(e) => tracing::debug!(target: "tasks", uri = %self.uri, "{e}"),
        }

        self.response(self.poll_cache(deadline).await.unwrap_or_else(PageNode::placeholder))
    }

    /// Mark the cached tree stale.
    ///
    /// # Errors
    ///
    /// Returns [`SiteError::CacheError`] if the backend rejects the write.
    pub async fn invalidate_cache(&self) -> std::result::Result<(), SiteError> {
        invalidate(self.ctx.cache.as_ref(), &self.cache_key()).await.map_err(|e| match e.downcast::<SiteError>() {
            Ok(site_error) => site_error,
            Err(other) => SiteError::CacheError {
                operation: "invalidate".to_string(),
                reason: format!("{other:#}"),
            },
        })
    }

    /// Reconcile this repository's persisted pages with `tree`.
    ///
    /// # Errors
    ///
    /// Returns [`SiteError::DatabaseError`] if the transaction fails.
    pub async fn create_webpages_for_tree(&self, tree: &PageTree) -> std::result::Result<WebpageChangeset, SiteError> {
        let project = self.ctx.store.get_or_create_project(&self.uri).await?;
        self.ctx.store.create_webpages_for_tree(&project, tree).await
    }

    /// Request removal of `page` and invalidate the cached tree.
    ///
    /// # Errors
    ///
    /// Returns [`SiteError::PageNotFound`] for an unknown page, or the
    /// database or cache error that stopped the request.
    pub async fn remove_page(&self, page: &str) -> std::result::Result<Webpage, SiteError> {
        let webpage = self.ctx.store.request_removal(&self.uri, page).await?;
        self.invalidate_cache().await?;
        Ok(webpage)
    }

    async fn regenerate(&self, _guard: &RepositoryGuard) -> Result<PageNode> {
        self.invalidate_quietly().await;

        let strategy = ExponentialBackoff::from_millis(STARTING_BACKOFF_DELAY_MS)
            .max_delay(Duration::from_millis(MAX_BACKOFF_DELAY_MS))
            .take(self.ctx.config.tasks.regeneration_retries);

        RetryIf::start(strategy, || self.attempt(), |e: &anyhow::Error| {
            let retry = is_transient(e);
            if retry {
                tracing::warn!(uri = %self.uri, branch = %self.branch, "generation failed, retrying: {e:#}");
            }
            retry
        })
        .await
    }

    async fn attempt(&self) -> Result<PageNode> {
        match self.generate().await {
            Ok(tree) => Ok(tree),
            Err(e) => {
                if is_transient(&e)
                    && let Err(cleanup) = self.ctx.working_copies.delete_local_files(&self.uri).await
                {
                    tracing::warn!(uri = %self.uri, "working copy cleanup failed: {cleanup:#}");
                }
                Err(e)
            }
        }
    }

    async fn generate(&self) -> Result<PageNode> {
        let start = std::time::Instant::now();
        let templates = self.ctx.working_copies.setup(&self.uri, &self.branch).await?;

        let parser = Arc::clone(&self.ctx.parser);
        let tree = tokio::task::spawn_blocking(move || parser.parse(&templates))
            .await
            .context("parser task panicked")??;

        self.create_webpages_for_tree(&tree).await?;

        let node = tree.to_node();
        if let Err(e) = write_tree(self.ctx.cache.as_ref(), &self.cache_key(), &node).await {
            tracing::warn!(target: "cache", uri = %self.uri, "tree generated but not cached: {e:#}");
        }

        tracing::info!(
            uri = %self.uri,
            branch = %self.branch,
            pages = tree.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "tree generated"
        );
        Ok(node)
    }

    async fn cached_tree(&self) -> Option<PageNode> {
        read_tree(self.ctx.cache.as_ref(), &self.cache_key()).await
    }

    async fn invalidate_quietly(&self) {
        if let Err(e) = self.invalidate_cache().await {
            tracing::warn!(target: "cache", uri = %self.uri, "could not invalidate cached tree: {e}");
        }
    }

    async fn poll_cache(&self, deadline: Instant) -> Option<PageNode> {
        loop {
            if let Some(tree) = self.cached_tree().await {
                return Some(tree);
            }
            if Instant::now() + CACHE_POLL_INTERVAL > deadline {
                return None;
            }
            tokio::time::sleep(CACHE_POLL_INTERVAL).await;
        }
    }

    fn response(&self, templates: PageNode) -> TreeResponse {
        TreeResponse {
            name: self.uri.clone(),
            templates,
        }
    }

    fn failure(&self, error: anyhow::Error) -> SiteError {
        match error.chain().find_map(|c| c.downcast_ref::<SiteError>()) {
            Some(site_error) if site_error.is_validation() => site_error.clone(),
            _ => SiteError::RegenerationFailed {
                repository: self.uri.clone(),
                reason: format!("{error:#}"),
            },
        }
    }
}
