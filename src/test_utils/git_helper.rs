//! Git test helper utilities
//!
//! Provides a safe, testable wrapper around Git operations for tests that
//! need a real repository to clone from.

use anyhow::{Context, Result, bail};
use std::path::{Path, PathBuf};
use std::process::Command;

/// Git command builder for tests
///
/// Use this instead of raw `std::process::Command` for git operations in
/// tests. Every command runs in the repository directory and fails with the
/// captured stderr.
pub struct TestGit {
    repo_path: PathBuf,
}

impl TestGit {
    fn run_git_command(&self, args: &[&str], action: &str) -> Result<std::process::Output> {
        let output = Command::new("git")
            .args(args)
            .current_dir(&self.repo_path)
            .output()
            .with_context(|| action.to_string())?;

        if !output.status.success() {
            bail!("{} failed: {}", action, String::from_utf8_lossy(&output.stderr));
        }

        Ok(output)
    }

    /// Create a new TestGit instance for the given repository path
    pub fn new(repo_path: impl Into<PathBuf>) -> Self {
        Self {
            repo_path: repo_path.into(),
        }
    }

    /// Initialize a new git repository
    pub fn init(&self) -> Result<()> {
        self.run_git_command(&["init"], "Failed to initialize git repository")?;
        Ok(())
    }

    /// Configure git user for tests
    pub fn config_user(&self) -> Result<()> {
        self.run_git_command(
            &["config", "user.email", "test@sitetree.example"],
            "Failed to configure git user email",
        )?;

        self.run_git_command(&["config", "user.name", "Test User"], "Failed to configure git user name")?;
        Ok(())
    }

    /// Add all files to staging
    pub fn add_all(&self) -> Result<()> {
        self.run_git_command(&["add", "."], "Failed to add files to git")?;
        Ok(())
    }

    /// Create a commit with the given message
    pub fn commit(&self, message: &str) -> Result<()> {
        self.run_git_command(&["commit", "-m", message], "Failed to create git commit")?;
        Ok(())
    }

    /// Initialize a repository whose first commit lands on `branch_name`,
    /// whatever `init.defaultBranch` says.
    pub fn init_on_branch(&self, branch_name: &str) -> Result<()> {
        self.init()?;
        self.run_git_command(
            &["symbolic-ref", "HEAD", &format!("refs/heads/{branch_name}")],
            &format!("Failed to set initial branch: {branch_name}"),
        )?;
        Ok(())
    }

    /// Create and checkout a branch
    pub fn create_branch(&self, branch_name: &str) -> Result<()> {
        self.run_git_command(
            &["checkout", "-b", branch_name],
            &format!("Failed to create branch: {branch_name}"),
        )?;
        Ok(())
    }

    /// Checkout an existing branch
    pub fn checkout(&self, ref_name: &str) -> Result<()> {
        self.run_git_command(&["checkout", ref_name], &format!("Failed to checkout: {ref_name}"))?;
        Ok(())
    }

    /// Current commit SHA
    pub fn rev_parse_head(&self) -> Result<String> {
        let output = self.run_git_command(&["rev-parse", "HEAD"], "Failed to get current commit SHA")?;
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    /// Return the repository path
    pub fn repo_path(&self) -> &Path {
        &self.repo_path
    }
}
