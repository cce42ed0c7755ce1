//! Application configuration.
//!
//! Settings come from three layers, later layers winning:
//!
//! 1. Built-in defaults
//! 2. A TOML file (`<config dir>/sitetree/config.toml`, or `--config`)
//! 3. Environment variables
//!
//! # File Format
//!
//! ```toml
//! base_dir = "~/.local/share/sitetree"
//! repo_org = "https://github.com/canonical"
//! default_branch = "main"
//!
//! [valkey]
//! host = "localhost"
//! port = 6379
//!
//! [tasks]
//! tree_refresh_minutes = 5
//! deletion_sweep_minutes = 5
//! promotion_sweep_minutes = 5
//! workers = 2
//! ```
//!
//! # Environment Overrides
//!
//! | Variable | Field |
//! |---|---|
//! | `BASE_DIR` | `base_dir` |
//! | `REPO_ORG` | `repo_org` |
//! | `GH_TOKEN` | `gh_token` |
//! | `VALKEY_HOST` / `VALKEY_PORT` | `valkey` |
//! | `TASK_DELAY` | all three job intervals, in minutes |
//! | `DATABASE_PATH` | `database_path` |
//! | `SITES_MANIFEST` | `sites_manifest` |
//!
//! The token is never serialized back out and never logged.

use crate::constants::{
    DEFAULT_ASYNC_WAIT, DEFAULT_BRANCH, DEFAULT_QUEUE_CAPACITY, DEFAULT_REGENERATION_RETRIES,
    DEFAULT_REPO_ORG, DEFAULT_TASK_DELAY_MINUTES, DEFAULT_WORKERS, GIT_COMMAND_TIMEOUT,
};
use crate::core::SiteError;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;

/// Connection settings for the networked cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValkeyConfig {
    /// Hostname of the cache service
    pub host: String,
    /// Port of the cache service
    #[serde(default = "default_valkey_port")]
    pub port: u16,
    /// Logical database index
    #[serde(default)]
    pub db: i64,
}

const fn default_valkey_port() -> u16 {
    6379
}

impl ValkeyConfig {
    /// Connection URL understood by the redis client.
    #[must_use]
    pub fn url(&self) -> String {
        format!("redis://{}:{}/{}", self.host, self.port, self.db)
    }
}

/// Scheduler and worker pool tunables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskConfig {
    /// Minutes between tree refreshes of every manifest site
    pub tree_refresh_minutes: u64,
    /// Minutes between deletion sweeps
    pub deletion_sweep_minutes: u64,
    /// Minutes between promotion sweeps
    pub promotion_sweep_minutes: u64,
    /// Number of tree workers
    pub workers: usize,
    /// Capacity of the tree job queue
    pub queue_capacity: usize,
    /// How long the async read path waits before returning a placeholder
    pub async_wait_ms: u64,
    /// Extra generation attempts after a transient failure
    pub regeneration_retries: usize,
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            tree_refresh_minutes: DEFAULT_TASK_DELAY_MINUTES,
            deletion_sweep_minutes: DEFAULT_TASK_DELAY_MINUTES,
            promotion_sweep_minutes: DEFAULT_TASK_DELAY_MINUTES,
            workers: DEFAULT_WORKERS,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            async_wait_ms: DEFAULT_ASYNC_WAIT.as_millis() as u64,
            regeneration_retries: DEFAULT_REGENERATION_RETRIES,
        }
    }
}

impl TaskConfig {
    /// Interval of the tree refresh job.
    #[must_use]
    pub fn tree_refresh_interval(&self) -> Duration {
        minutes(self.tree_refresh_minutes)
    }

    /// Interval of the deletion sweep.
    #[must_use]
    pub fn deletion_sweep_interval(&self) -> Duration {
        minutes(self.deletion_sweep_minutes)
    }

    /// Interval of the promotion sweep.
    #[must_use]
    pub fn promotion_sweep_interval(&self) -> Duration {
        minutes(self.promotion_sweep_minutes)
    }

    /// Bounded wait of the async read path.
    #[must_use]
    pub const fn async_wait(&self) -> Duration {
        Duration::from_millis(self.async_wait_ms)
    }
}

fn minutes(m: u64) -> Duration {
    // A zero interval would make tokio's interval panic.
    Duration::from_secs(m.max(1) * 60)
}

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Root for working copies, cache files, database and manifest
    pub base_dir: PathBuf,
    /// Organisation URL that bare repository names are resolved against
    pub repo_org: String,
    /// Token injected into clone URLs
    #[serde(skip_serializing)]
    pub gh_token: String,
    /// Branch used when a caller does not name one
    pub default_branch: String,
    /// Override for the working-copy root
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repositories_dir: Option<PathBuf>,
    /// Override for the filesystem cache directory
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_dir: Option<PathBuf>,
    /// Override for the SQLite database file
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database_path: Option<PathBuf>,
    /// Override for the site manifest location
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sites_manifest: Option<PathBuf>,
    /// Accept `file://` clone URLs (local mirrors and tests)
    pub allow_file_urls: bool,
    /// Timeout for each git subprocess, in seconds
    pub git_timeout_secs: u64,
    /// Networked cache; the filesystem cache is used when absent or unreachable
    #[serde(skip_serializing_if = "Option::is_none")]
    pub valkey: Option<ValkeyConfig>,
    /// Scheduler settings
    pub tasks: TaskConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            base_dir: default_base_dir(),
            repo_org: DEFAULT_REPO_ORG.to_string(),
            gh_token: String::new(),
            default_branch: DEFAULT_BRANCH.to_string(),
            repositories_dir: None,
            cache_dir: None,
            database_path: None,
            sites_manifest: None,
            allow_file_urls: false,
            git_timeout_secs: GIT_COMMAND_TIMEOUT.as_secs(),
            valkey: None,
            tasks: TaskConfig::default(),
        }
    }
}

fn default_base_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|dir| dir.join("sitetree"))
        .unwrap_or_else(|| PathBuf::from(".sitetree"))
}

impl AppConfig {
    /// Default location of the configuration file.
    ///
    /// # Errors
    ///
    /// Returns an error if the platform config directory cannot be determined.
    pub fn default_path() -> Result<PathBuf> {
        let dir = dirs::config_dir().ok_or_else(|| SiteError::ConfigError {
            message: "Unable to determine the configuration directory".to_string(),
        })?;
        Ok(dir.join("sitetree").join("config.toml"))
    }

    /// Load configuration from `path` (or the default location), then apply
    /// environment overrides.
    ///
    /// A missing file yields defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed, or if
    /// an environment override holds an invalid number.
    pub async fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::default_path()?,
        };
        let mut config = if path.exists() {
            Self::load_from(&path).await?
        } else {
            tracing::debug!(path = %path.display(), "No config file, using defaults");
            Self::default()
        };
        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        config.expand_paths()?;
        Ok(config)
    }

    /// Load configuration from a specific TOML file, without environment overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or contains invalid TOML.
    pub async fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config from {}", path.display()))?;

        let config: Self = toml::from_str(&content)
            .map_err(SiteError::from)
            .with_context(|| format!("Failed to parse config from {}", path.display()))?;
        Ok(config)
    }

    /// Apply environment overrides through `lookup`, so tests can inject a map
    /// instead of mutating the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`SiteError::ConfigError`] for unparseable numeric values.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dir) = lookup("BASE_DIR") {
            self.base_dir = PathBuf::from(dir);
        }
        if let Some(org) = lookup("REPO_ORG") {
            self.repo_org = org;
        }
        if let Some(token) = lookup("GH_TOKEN") {
            self.gh_token = token;
        }
        if let Some(path) = lookup("DATABASE_PATH") {
            self.database_path = Some(PathBuf::from(path));
        }
        if let Some(path) = lookup("SITES_MANIFEST") {
            self.sites_manifest = Some(PathBuf::from(path));
        }
        if let Some(host) = lookup("VALKEY_HOST") {
            let port = match lookup("VALKEY_PORT") {
                Some(raw) => parse_env("VALKEY_PORT", &raw)?,
                None => self.valkey.as_ref().map_or_else(default_valkey_port, |v| v.port),
            };
            let db = self.valkey.as_ref().map_or(0, |v| v.db);
            self.valkey = Some(ValkeyConfig { host, port, db });
        } else if let (Some(raw), Some(valkey)) = (lookup("VALKEY_PORT"), self.valkey.as_mut()) {
            valkey.port = parse_env("VALKEY_PORT", &raw)?;
        }
        if let Some(raw) = lookup("TASK_DELAY") {
            let delay: u64 = parse_env("TASK_DELAY", &raw)?;
            self.tasks.tree_refresh_minutes = delay;
            self.tasks.deletion_sweep_minutes = delay;
            self.tasks.promotion_sweep_minutes = delay;
        }
        Ok(())
    }

    fn expand_paths(&mut self) -> Result<()> {
        self.base_dir = expand(&self.base_dir)?;
        for path in [
            &mut self.repositories_dir,
            &mut self.cache_dir,
            &mut self.database_path,
            &mut self.sites_manifest,
        ]
        .into_iter()
        .flatten()
        {
            *path = expand(path)?;
        }
        Ok(())
    }

    /// Directory holding one working copy per repository.
    #[must_use]
    pub fn repositories_root(&self) -> PathBuf {
        self.repositories_dir.clone().unwrap_or_else(|| self.base_dir.join("repositories"))
    }

    /// Directory of the filesystem cache backend.
    #[must_use]
    pub fn cache_dir(&self) -> PathBuf {
        self.cache_dir.clone().unwrap_or_else(|| self.base_dir.join("tree-cache"))
    }

    /// Directory for cross-process working-copy lock files.
    #[must_use]
    pub fn lock_dir(&self) -> PathBuf {
        self.repositories_root().join(".locks")
    }

    /// SQLite database file.
    #[must_use]
    pub fn database_path(&self) -> PathBuf {
        self.database_path.clone().unwrap_or_else(|| self.base_dir.join("sitetree.db"))
    }

    /// Site manifest file.
    #[must_use]
    pub fn manifest_path(&self) -> PathBuf {
        self.sites_manifest.clone().unwrap_or_else(|| self.base_dir.join("sites.yaml"))
    }

    /// Timeout applied to each git subprocess.
    #[must_use]
    pub const fn git_timeout(&self) -> Duration {
        Duration::from_secs(self.git_timeout_secs)
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T> {
    raw.trim().parse().map_err(|_| {
        SiteError::ConfigError {
            message: format!("{key} must be a number, got '{raw}'"),
        }
        .into()
    })
}

fn expand(path: &Path) -> Result<PathBuf> {
    let raw = path.to_string_lossy();
    let expanded = shellexpand::full(&raw).map_err(|e| SiteError::ConfigError {
        message: format!("Cannot expand path '{raw}': {e}"),
    })?;
    Ok(PathBuf::from(expanded.as_ref()))
}
