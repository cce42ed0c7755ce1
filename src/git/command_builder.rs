//! Argument-vector git command builder.
//!
//! Every git invocation in the crate goes through [`GitCommand`]. Arguments are
//! passed to the process as a vector, never through a shell, so repository
//! names and branch names cannot inject commands. Credentials embedded in URLs
//! are stripped before anything is logged or put into an error.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;

use super::strip_auth_from_url;
use crate::constants::GIT_COMMAND_TIMEOUT;
use crate::core::SiteError;

/// Builder for a single git subprocess.
pub struct GitCommand {
    args: Vec<String>,
    current_dir: Option<PathBuf>,
    env_vars: Vec<(String, String)>,
    timeout_duration: Option<Duration>,
    context: Option<String>,
    /// Clone URL kept aside so failures can report it (redacted).
    clone_url: Option<String>,
}

impl Default for GitCommand {
    fn default() -> Self {
        Self {
            args: Vec::new(),
            current_dir: None,
            // Never let git block on a credential prompt.
            env_vars: vec![("GIT_TERMINAL_PROMPT".to_string(), "0".to_string())],
            timeout_duration: Some(GIT_COMMAND_TIMEOUT),
            context: None,
            clone_url: None,
        }
    }
}

/// Captured output of a successful command.
#[derive(Debug)]
pub struct GitCommandOutput {
    /// Standard output
    pub stdout: String,
    /// Standard error (git reports progress here)
    pub stderr: String,
}

impl GitCommand {
    /// Empty command.
    pub fn new() -> Self {
        Self::default()
    }

    /// Run the command inside `dir` (passed as `git -C dir`).
    pub fn current_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.current_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    /// Append one argument.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append several arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set an environment variable for the subprocess.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env_vars.push((key.into(), value.into()));
        self
    }

    /// Override the timeout; `None` waits forever.
    pub const fn with_timeout(mut self, duration: Option<Duration>) -> Self {
        self.timeout_duration = duration;
        self
    }

    /// Label used in log lines, typically the repository URI.
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// The arguments as they will be passed to git, `-C` included.
    #[must_use]
    pub fn full_args(&self) -> Vec<String> {
        let mut full_args = Vec::with_capacity(self.args.len() + 2);
        if let Some(dir) = &self.current_dir {
            full_args.push("-C".to_string());
            full_args.push(dir.display().to_string());
        }
        full_args.extend(self.args.iter().cloned());
        full_args
    }

    fn operation(&self) -> String {
        self.args.first().cloned().unwrap_or_else(|| "unknown".to_string())
    }

    /// Run the command and capture its output.
    ///
    /// # Errors
    ///
    /// - [`SiteError::GitNotFound`] when the binary cannot be spawned
    /// - [`SiteError::GitCloneFailed`] / [`SiteError::GitCheckoutFailed`] for
    ///   those subcommands
    /// - [`SiteError::GitCommandError`] for other non-zero exits and timeouts
    pub async fn execute(self) -> Result<GitCommandOutput> {
        let start = std::time::Instant::now();
        let full_args = self.full_args();
        let printable = redact_args(&full_args).join(" ");
        let ctx = self.context.as_deref().unwrap_or("-");

        tracing::debug!(target: "git", "({ctx}) Executing command: git {printable}");

        let mut cmd = Command::new("git");
        cmd.args(&full_args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        for (key, value) in &self.env_vars {
            cmd.env(key, value);
        }

        let output_future = cmd.output();
        let output = match self.timeout_duration {
            Some(duration) => match timeout(duration, output_future).await {
                Ok(result) => result,
                Err(_) => {
                    tracing::warn!(
                        target: "git",
                        "({ctx}) Command timed out after {} seconds: git {printable}",
                        duration.as_secs()
                    );
                    return Err(SiteError::GitCommandError {
                        operation: self.operation(),
                        stderr: format!("timed out after {} seconds", duration.as_secs()),
                    }
                    .into());
                }
            },
            None => output_future.await,
        };
        let output = match output {
            Ok(output) => output,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(SiteError::GitNotFound.into());
            }
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to execute git {printable}"));
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = redact_text(&String::from_utf8_lossy(&output.stderr));

        if !output.status.success() {
            tracing::debug!(
                target: "git",
                "({ctx}) Command failed with exit code {:?}: {}",
                output.status.code(),
                stderr.trim()
            );

            let error = match self.args.first().map(String::as_str) {
                Some("clone") => SiteError::GitCloneFailed {
                    url: self
                        .clone_url
                        .as_deref()
                        .map_or_else(|| "unknown".to_string(), redact_url),
                    reason: stderr,
                },
                Some("checkout") => SiteError::GitCheckoutFailed {
                    reference: self
                        .args
                        .iter()
                        .skip(1)
                        .find(|a| !a.starts_with('-'))
                        .cloned()
                        .unwrap_or_default(),
                    reason: stderr,
                },
                _ => SiteError::GitCommandError {
                    operation: self.operation(),
                    stderr: if stderr.is_empty() { stdout } else { stderr },
                },
            };
            return Err(error.into());
        }

        if !stdout.trim().is_empty() {
            tracing::trace!(target: "git", "({ctx}) {}", stdout.trim());
        }

        let elapsed = start.elapsed();
        if elapsed.as_secs() > 1 {
            tracing::info!(
                target: "git::perf",
                "({ctx}) Git {} took {:.2}s",
                self.operation(),
                elapsed.as_secs_f64()
            );
        } else if elapsed.as_millis() > 100 {
            tracing::debug!(
                target: "git::perf",
                "({ctx}) Git {} took {}ms",
                self.operation(),
                elapsed.as_millis()
            );
        }

        Ok(GitCommandOutput { stdout, stderr })
    }

    /// Run and return trimmed stdout.
    ///
    /// # Errors
    ///
    /// See [`GitCommand::execute`].
    pub async fn execute_stdout(self) -> Result<String> {
        let output = self.execute().await?;
        Ok(output.stdout.trim().to_string())
    }

    /// Run and discard output.
    ///
    /// # Errors
    ///
    /// See [`GitCommand::execute`].
    pub async fn execute_success(self) -> Result<()> {
        self.execute().await?;
        Ok(())
    }
}

// Convenience builders for the operations the lifecycle manager needs.

impl GitCommand {
    /// `git clone <url> <target>`
    pub fn clone(url: &str, target: impl AsRef<Path>) -> Self {
        let mut cmd = Self::new().args([
            "clone".to_string(),
            "--quiet".to_string(),
            url.to_string(),
            target.as_ref().display().to_string(),
        ]);
        cmd.clone_url = Some(url.to_string());
        cmd
    }

    /// `git fetch <remote> <branch>`
    pub fn fetch_branch(remote: &str, branch: &str) -> Self {
        Self::new().args(["fetch", "--quiet", remote, branch])
    }

    /// `git checkout -B <branch> <start_point>`: create or reset the local
    /// branch to `start_point`.
    pub fn checkout_branch(branch: &str, start_point: &str) -> Self {
        Self::new().args(["checkout", "--quiet", "-B", branch, start_point])
    }

    /// `git checkout <branch>`
    pub fn checkout(branch: &str) -> Self {
        Self::new().args(["checkout", "--quiet", branch])
    }

    /// `git reset --hard HEAD`
    pub fn reset_hard() -> Self {
        Self::new().args(["reset", "--hard", "HEAD"])
    }

    /// `git rev-parse HEAD`
    pub fn current_commit() -> Self {
        Self::new().args(["rev-parse", "HEAD"])
    }

    /// `git rev-parse --verify --quiet <reference>`
    pub fn verify_ref(reference: &str) -> Self {
        Self::new().args(["rev-parse", "--verify", "--quiet", reference])
    }
}

fn redact_url(url: &str) -> String {
    strip_auth_from_url(url).unwrap_or_else(|_| "<redacted>".to_string())
}

fn redact_args(args: &[String]) -> Vec<String> {
    args.iter()
        .map(|arg| if arg.contains("://") { redact_url(arg) } else { arg.clone() })
        .collect()
}

/// Git echoes remote URLs in some messages; scrub credentials from them.
fn redact_text(text: &str) -> String {
    text.split_inclusive(char::is_whitespace)
        .map(|word| {
            let trimmed = word.trim_end().trim_matches(|c| c == '\'' || c == '"');
            if trimmed.contains("://") && trimmed.contains('@') {
                word.replace(trimmed, &redact_url(trimmed))
            } else {
                word.to_string()
            }
        })
        .collect()
}
