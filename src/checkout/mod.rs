//! Repository lifecycle: keeping one working copy per repository on disk.
//!
//! Working copies live at `<repositories root>/<name>`, where `name` is the
//! last path segment of the repository URI without `.git`. Setting one up is
//! idempotent:
//!
//! 1. Derive and validate the clone URL. Nothing touches disk if it is rejected.
//! 2. Clone. An existing destination counts as success.
//! 3. Fetch the requested branch from `origin`.
//! 4. Check it out at the fetched tip, discarding local changes.
//!
//! Callers must hold the repository's lock from [`crate::lock`] around
//! [`WorkingCopies::setup`] and [`WorkingCopies::delete_local_files`].

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::config::AppConfig;
use crate::constants::TEMPLATES_FOLDER;
use crate::core::SiteError;
use crate::git::{
    GitRepo, build_clone_url, ensure_git_available, is_git_repository, strip_auth_from_url, validate_clone_url,
    working_copy_name,
};

/// Manages on-disk working copies.
#[async_trait]
pub trait WorkingCopies: Send + Sync {
    /// Where the working copy of `uri` lives.
    ///
    /// # Errors
    ///
    /// Returns [`SiteError::InvalidRepositoryUri`] if no directory name can be
    /// derived from `uri`.
    fn path_for(&self, uri: &str) -> Result<PathBuf>;

    /// Whether a git working copy of `uri` is already on disk.
    fn exists(&self, uri: &str) -> bool {
        self.path_for(uri).is_ok_and(|path| is_git_repository(&path))
    }

    /// Bring the working copy of `uri` to the tip of `branch` and return its
    /// templates folder.
    async fn setup(&self, uri: &str, branch: &str) -> Result<PathBuf>;

    /// Remove the working copy of `uri` so the next setup starts clean.
    async fn delete_local_files(&self, uri: &str) -> Result<()>;
}

/// [`WorkingCopies`] backed by the system `git`.
#[derive(Debug, Clone)]
pub struct GitWorkingCopies {
    root: PathBuf,
    repo_org: String,
    token: String,
    allow_file_urls: bool,
    timeout: Duration,
}

impl GitWorkingCopies {
    /// Working copies under `root`, resolving bare names against `repo_org`.
    pub fn new(root: impl Into<PathBuf>, repo_org: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            repo_org: repo_org.into(),
            token: String::new(),
            allow_file_urls: false,
            timeout: crate::constants::GIT_COMMAND_TIMEOUT,
        }
    }

    /// Settings taken from `config`.
    #[must_use]
    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(config.repositories_root(), config.repo_org.clone())
            .with_token(config.gh_token.clone())
            .allow_file_urls(config.allow_file_urls)
            .with_timeout(config.git_timeout())
    }

    /// Token injected into https clone URLs.
    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = token.into();
        self
    }

    /// Accept `file://` clone URLs.
    #[must_use]
    pub const fn allow_file_urls(mut self, allow: bool) -> Self {
        self.allow_file_urls = allow;
        self
    }

    /// Timeout for each git subprocess.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Root directory of all working copies.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Validated clone URL for `uri`, credentials included.
    ///
    /// # Errors
    ///
    /// Returns [`SiteError::InvalidRepositoryUri`] for a non-https scheme or a
    /// missing `.git` suffix.
    pub fn clone_url(&self, uri: &str) -> Result<String> {
        let url = build_clone_url(&self.repo_org, uri, &self.token);
        validate_clone_url(&url, self.allow_file_urls)?;
        Ok(url)
    }
}

#[async_trait]
impl WorkingCopies for GitWorkingCopies {
    fn path_for(&self, uri: &str) -> Result<PathBuf> {
        Ok(self.root.join(working_copy_name(uri)?))
    }

    async fn setup(&self, uri: &str, branch: &str) -> Result<PathBuf> {
        let path = self.path_for(uri)?;
        let url = self.clone_url(uri)?;
        ensure_git_available()?;
        let start = std::time::Instant::now();

        tokio::fs::create_dir_all(&self.root)
            .await
            .with_context(|| format!("Failed to create repositories root {}", self.root.display()))?;

        if path.exists() && !is_git_repository(&path) {
            tracing::warn!(target: "git", path = %path.display(), "removing non-git directory in the way of a clone");
            tokio::fs::remove_dir_all(&path).await?;
        }

        tracing::debug!(target: "git", url = %strip_auth_from_url(&url)?, path = %path.display(), "cloning");
        let repo = GitRepo::clone(&url, &path, self.timeout).await?;
        repo.fetch_branch(branch).await?;
        repo.checkout(branch).await?;

        if let Ok(commit) = repo.current_commit().await {
            tracing::info!(
                target: "git",
                uri,
                branch,
                commit = %commit,
                elapsed_ms = start.elapsed().as_millis() as u64,
                "working copy ready"
            );
        }

        let templates = path.join(TEMPLATES_FOLDER);
        if !templates.is_dir() {
            return Err(SiteError::TemplatesNotFound {
                path: templates.display().to_string(),
            }
            .into());
        }
        Ok(templates)
    }

    async fn delete_local_files(&self, uri: &str) -> Result<()> {
        let path = self.path_for(uri)?;
        match tokio::fs::remove_dir_all(&path).await {
            Ok(()) => {
                tracing::info!(target: "git", path = %path.display(), "working copy removed");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(SiteError::IoError(e).into()),
        }
    }
}
