//! Common test utilities for sitetree integration tests
//!
//! Wraps [`sitetree::test_utils::TestEnvironment`] with helpers for driving the
//! compiled binary.

// Not every helper is used by every test module
#![allow(dead_code)]

use anyhow::{Context, Result};
use assert_cmd::Command;
use std::path::PathBuf;
use std::sync::Arc;

use sitetree::models::PageNode;
use sitetree::site_repository::{SiteContext, SiteRepository};
use sitetree::test_utils::{CountingParser, FakeWorkingCopies, SiteFixture, TestEnvironment};

/// Environment variables the binary reads that must not leak in from the
/// developer's shell.
const SCRUBBED_ENV: &[&str] = &[
    "BASE_DIR",
    "REPO_ORG",
    "GH_TOKEN",
    "VALKEY_HOST",
    "VALKEY_PORT",
    "TASK_DELAY",
    "DATABASE_PATH",
    "SITES_MANIFEST",
    "SITETREE_CONFIG",
    "RUST_LOG",
];

/// A [`TestEnvironment`] wired to fakes, with handles kept for assertions.
pub struct FakeSite {
    pub env: TestEnvironment,
    pub copies: Arc<FakeWorkingCopies>,
    pub parser: Arc<CountingParser>,
    pub ctx: Arc<SiteContext>,
}

impl FakeSite {
    /// Fake-backed context whose working copies hold `fixture`.
    pub async fn new(fixture: SiteFixture) -> Result<Self> {
        Self::build(TestEnvironment::new()?, |root| FakeWorkingCopies::new(root, fixture)).await
    }

    /// Same, with every setup taking at least `delay`.
    pub async fn slow(fixture: SiteFixture, delay: std::time::Duration) -> Result<Self> {
        Self::build(TestEnvironment::new()?, |root| FakeWorkingCopies::new(root, fixture).with_delay(delay)).await
    }

    /// Fake-backed context over a prepared environment.
    pub async fn build<F>(env: TestEnvironment, copies: F) -> Result<Self>
    where
        F: FnOnce(PathBuf) -> FakeWorkingCopies,
    {
        let copies = Arc::new(copies(env.config.repositories_root()));
        let parser = Arc::new(CountingParser::new()?);
        let ctx = env.context_with(copies.clone(), parser.clone()).await?;
        Ok(Self {
            env,
            copies,
            parser,
            ctx,
        })
    }

    /// Handle on `uri` at the default branch.
    pub fn repository(&self, uri: &str) -> SiteRepository {
        SiteRepository::on_default_branch(Arc::clone(&self.ctx), uri)
    }

    /// Handle on `uri` at `branch`.
    pub fn repository_on(&self, uri: &str, branch: &str) -> SiteRepository {
        SiteRepository::new(Arc::clone(&self.ctx), uri, branch)
    }
}

/// Sorted child names of `node`.
pub fn child_names(node: &PageNode) -> Vec<String> {
    let mut names: Vec<String> = node.children.iter().map(|c| c.name.clone()).collect();
    names.sort();
    names
}

/// Write the environment's configuration as a TOML file for the binary.
pub fn write_config(env: &TestEnvironment) -> Result<PathBuf> {
    let path = env.path().join("config.toml");
    let content = toml::to_string(&env.config).context("Failed to serialize test config")?;
    std::fs::write(&path, content)?;
    Ok(path)
}

/// The sitetree binary, configured for `env` and isolated from the shell.
pub fn sitetree_cmd(env: &TestEnvironment) -> Result<Command> {
    let config = write_config(env)?;
    let mut cmd = Command::cargo_bin("sitetree")?;
    for var in SCRUBBED_ENV {
        cmd.env_remove(var);
    }
    cmd.arg("--config").arg(config).env("NO_COLOR", "1").current_dir(env.path());
    Ok(cmd)
}
