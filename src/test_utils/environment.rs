//! Test environment setup and management
//!
//! A temporary base directory with an [`AppConfig`] pointing into it, plus
//! helpers to wire a [`SiteContext`] from fakes or from the real git-backed
//! collaborators.

use anyhow::Result;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

use super::fixtures::SiteFixture;
use crate::cache::FileCache;
use crate::checkout::WorkingCopies;
use crate::config::AppConfig;
use crate::lock::RepositoryLocks;
use crate::parser::TreeParser;
use crate::site_repository::SiteContext;
use crate::store::PageStore;

/// Isolated sitetree installation in a temporary directory.
pub struct TestEnvironment {
    /// Owns the directory; dropped last
    pub temp_dir: TempDir,
    /// Configuration rooted in `temp_dir`
    pub config: AppConfig,
}

impl TestEnvironment {
    /// Fresh environment: no Valkey, short async wait, one retry, and
    /// `file://` clone URLs resolved against [`Self::mirrors_dir`].
    pub fn new() -> Result<Self> {
        super::init_test_logging(None);

        let temp_dir = TempDir::new()?;
        let base = temp_dir.path().to_path_buf();
        let mirrors = base.join("mirrors");
        fs::create_dir_all(&mirrors)?;

        let mut config = AppConfig {
            base_dir: base,
            repo_org: super::fixtures::file_url(&mirrors),
            allow_file_urls: true,
            git_timeout_secs: 60,
            ..AppConfig::default()
        };
        config.tasks.async_wait_ms = 1_000;
        config.tasks.regeneration_retries = 1;

        Ok(Self { temp_dir, config })
    }

    /// Base directory of the environment.
    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Where [`Self::create_site`] puts its repositories.
    pub fn mirrors_dir(&self) -> PathBuf {
        self.path().join("mirrors")
    }

    /// Create a git repository for site `name` from `fixture` on the default
    /// branch, so that the bare name `name` clones it.
    pub fn create_site(&self, name: &str, fixture: &SiteFixture) -> Result<PathBuf> {
        let repo = self.mirrors_dir().join(format!("{name}.git"));
        fixture.create_repo(&repo, &self.config.default_branch)?;
        Ok(repo)
    }

    /// Write the site manifest.
    pub fn write_manifest(&self, sites: &[&str]) -> Result<()> {
        let mut content = String::from("sites:\n");
        for site in sites {
            content.push_str(&format!("  - {site}\n"));
        }
        fs::write(self.config.manifest_path(), content)?;
        Ok(())
    }

    /// Context around the given collaborators, with a filesystem cache and an
    /// in-memory store.
    pub async fn context_with(
        &self,
        working_copies: Arc<dyn WorkingCopies>,
        parser: Arc<dyn TreeParser>,
    ) -> Result<Arc<SiteContext>> {
        Ok(Arc::new(SiteContext {
            config: self.config.clone(),
            cache: Arc::new(FileCache::new(self.config.cache_dir())?),
            locks: Arc::new(RepositoryLocks::with_lock_dir(self.config.lock_dir())),
            store: PageStore::in_memory().await?,
            working_copies,
            parser,
        }))
    }

    /// Production context: real git, real parser, SQLite file in the
    /// environment.
    pub async fn git_context(&self) -> Result<Arc<SiteContext>> {
        Ok(Arc::new(SiteContext::from_config(self.config.clone()).await?))
    }
}
