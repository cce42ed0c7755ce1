//! Git working-copy operations and clone-URL helpers.
//!
//! [`GitRepo`] wraps a local working copy and exposes the handful of
//! operations the lifecycle manager sequences: clone, fetch a branch, check it
//! out at the fetched tip, and inspect HEAD. All of them shell out to the
//! system `git` through [`GitCommand`], which passes arguments as a vector.
//!
//! The free functions build and validate clone URLs:
//!
//! ```rust,no_run
//! use sitetree::git::{build_clone_url, strip_auth_from_url};
//!
//! let url = build_clone_url("https://github.com/canonical", "ubuntu.com", "tok");
//! assert_eq!(url, "https://tok@github.com/canonical/ubuntu.com.git");
//! assert_eq!(
//!     strip_auth_from_url(&url).unwrap(),
//!     "https://github.com/canonical/ubuntu.com.git"
//! );
//! ```

pub mod command_builder;

pub use command_builder::{GitCommand, GitCommandOutput};

use crate::core::SiteError;
use anyhow::Result;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Remote name used for every working copy.
pub const REMOTE: &str = "origin";

/// A local git working copy.
#[derive(Debug, Clone)]
pub struct GitRepo {
    path: PathBuf,
    timeout: Option<Duration>,
}

impl GitRepo {
    /// Wrap an existing directory. Nothing is checked until an operation runs.
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            timeout: Some(crate::constants::GIT_COMMAND_TIMEOUT),
        }
    }

    /// Per-command timeout for operations on this working copy.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Clone `url` into `target`.
    ///
    /// A "destination path already exists" failure is treated as success: the
    /// working copy is already there and the caller proceeds to fetch.
    ///
    /// # Errors
    ///
    /// Returns [`SiteError::GitCloneFailed`] for any other clone failure.
    pub async fn clone(url: &str, target: impl AsRef<Path>, timeout: Duration) -> Result<Self> {
        let target = target.as_ref();
        let result = GitCommand::clone(url, target)
            .with_timeout(Some(timeout))
            .with_context(target.display().to_string())
            .execute_success()
            .await;

        match result {
            Ok(()) => {}
            Err(err) if is_already_exists(&err) => {
                tracing::debug!(
                    target: "git",
                    path = %target.display(),
                    "Clone destination already exists, reusing it"
                );
            }
            Err(err) => return Err(err),
        }

        Ok(Self::new(target).with_timeout(Some(timeout)))
    }

    /// Fetch one branch from `origin`.
    ///
    /// # Errors
    ///
    /// Returns [`SiteError::GitCommandError`] if the fetch fails.
    pub async fn fetch_branch(&self, branch: &str) -> Result<()> {
        self.command(GitCommand::fetch_branch(REMOTE, branch)).execute_success().await
    }

    /// Check out `branch` at the tip of `origin/<branch>`.
    ///
    /// Local modifications are discarded first. When the remote-tracking ref
    /// is missing (a branch that only exists locally) this falls back to a
    /// plain checkout.
    ///
    /// # Errors
    ///
    /// Returns [`SiteError::GitCheckoutFailed`] if neither form succeeds.
    pub async fn checkout(&self, branch: &str) -> Result<()> {
        // A fresh clone of an empty repo has no HEAD; ignore reset failures.
        if let Err(e) = self.command(GitCommand::reset_hard()).execute_success().await {
            tracing::debug!(target: "git", "reset --hard before checkout failed: {e}");
        }

        let remote_ref = format!("{REMOTE}/{branch}");
        if self.command(GitCommand::verify_ref(&remote_ref)).execute_success().await.is_ok() {
            return self
                .command(GitCommand::checkout_branch(branch, &remote_ref))
                .execute_success()
                .await;
        }

        self.command(GitCommand::checkout(branch)).execute_success().await
    }

    /// Commit hash of HEAD.
    ///
    /// # Errors
    ///
    /// Fails when the working copy has no commits.
    pub async fn current_commit(&self) -> Result<String> {
        self.command(GitCommand::current_commit()).execute_stdout().await
    }

    /// Whether the directory holds a `.git` marker.
    #[must_use]
    pub fn is_git_repo(&self) -> bool {
        is_git_repository(&self.path)
    }

    /// Location of the working copy.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn command(&self, cmd: GitCommand) -> GitCommand {
        cmd.current_dir(&self.path)
            .with_timeout(self.timeout)
            .with_context(self.path.display().to_string())
    }
}

/// Whether `path` contains a `.git` directory or file.
#[must_use]
pub fn is_git_repository(path: &Path) -> bool {
    path.join(".git").exists()
}

fn is_already_exists(err: &anyhow::Error) -> bool {
    matches!(
        err.downcast_ref::<SiteError>(),
        Some(SiteError::GitCloneFailed { reason, .. })
            if reason.contains("already exists and is not an empty directory")
                || (reason.contains("destination path") && reason.contains("already exists"))
    )
}

/// Check that the `git` binary is on PATH.
///
/// # Errors
///
/// Returns [`SiteError::GitNotFound`] otherwise.
pub fn ensure_git_available() -> Result<PathBuf> {
    which::which("git").map_err(|_| SiteError::GitNotFound.into())
}

/// Build the clone URL for a repository URI.
///
/// A bare name (`ubuntu.com`) is resolved under `repo_org`; anything with a
/// scheme is used as given. `.git` is appended when missing, and `token`, if
/// non-empty, is injected as the userinfo of an https URL.
#[must_use]
pub fn build_clone_url(repo_org: &str, uri: &str, token: &str) -> String {
    let uri = uri.trim();
    let mut url = if uri.contains("://") {
        uri.to_string()
    } else {
        format!("{}/{}", repo_org.trim_end_matches('/'), uri.trim_start_matches('/'))
    };
    if !url.ends_with(".git") {
        url.push_str(".git");
    }

    if !token.is_empty()
        && let Some(rest) = url.strip_prefix("https://")
    {
        // Replace existing userinfo rather than stacking a second one.
        let rest = match (rest.find('@'), rest.find('/')) {
            (Some(at), Some(slash)) if at < slash => &rest[at + 1..],
            (Some(at), None) => &rest[at + 1..],
            _ => rest,
        };
        url = format!("https://{token}@{rest}");
    }
    url
}

/// Validate a clone URL before it is handed to git.
///
/// Requires the `https://` scheme (or `file://` when `allow_file` is set) and
/// a `.git` suffix.
///
/// # Errors
///
/// Returns [`SiteError::InvalidRepositoryUri`] describing the first violation.
pub fn validate_clone_url(url: &str, allow_file: bool) -> Result<()> {
    let shown = strip_auth_from_url(url)?;
    let invalid = |reason: &str| -> anyhow::Error {
        SiteError::InvalidRepositoryUri {
            uri: shown.clone(),
            reason: reason.to_string(),
        }
        .into()
    };

    let scheme_ok = url.starts_with("https://") || (allow_file && url.starts_with("file://"));
    if !scheme_ok {
        return Err(invalid("clone URL must use https"));
    }
    if !url.ends_with(".git") {
        return Err(invalid("clone URL must end with .git"));
    }
    if url.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(invalid("clone URL must not contain whitespace"));
    }
    Ok(())
}

/// Directory name of a repository's working copy: the last path segment of
/// its URI with any `.git` suffix removed.
///
/// # Errors
///
/// Returns [`SiteError::InvalidRepositoryUri`] when no usable segment exists.
pub fn working_copy_name(uri: &str) -> Result<String> {
    let trimmed = uri.trim().trim_end_matches('/');
    let segment = trimmed.rsplit('/').next().unwrap_or(trimmed);
    let name = segment.strip_suffix(".git").unwrap_or(segment);

    if name.is_empty() || name == "." || name == ".." || name.starts_with('.') {
        return Err(SiteError::InvalidRepositoryUri {
            uri: strip_auth_from_url(uri)?,
            reason: "cannot derive a working-copy directory name".to_string(),
        }
        .into());
    }
    Ok(name.to_string())
}

/// Remove `user:token@` from an http(s) URL.
///
/// # Errors
///
/// Currently infallible; returns `Result` so callers can use `?` uniformly.
pub fn strip_auth_from_url(url: &str) -> Result<String> {
    for scheme in ["https://", "http://"] {
        if let Some(rest) = url.strip_prefix(scheme)
            && let Some(at_pos) = rest.find('@')
        {
            let first_slash = rest.find('/');
            if first_slash.is_none_or(|slash| at_pos < slash) {
                return Ok(format!("{scheme}{}", &rest[at_pos + 1..]));
            }
        }
    }
    Ok(url.to_string())
}
