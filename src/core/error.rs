//! Error handling for sitetree
//!
//! Two layers cooperate here:
//! 1. [`SiteError`] is the typed taxonomy every subsystem reports through.
//! 2. [`ErrorContext`] wraps a [`SiteError`] with an actionable suggestion and
//!    details for the CLI, and [`ErrorPayload`] is its serializable form for
//!    callers that need a structured error body (direct mutations such as page
//!    removal).
//!
//! # Error Categories
//!
//! - **Validation**: [`SiteError::InvalidRepositoryUri`], [`SiteError::ConfigError`],
//!   [`SiteError::PageNotFound`]. Fatal for the request, never retried.
//! - **Transient infrastructure**: git failures, a missing templates folder, cache
//!   failures, database failures.
//!   The orchestrator cleans the working copy and may retry once.
//! - **Regeneration**: [`SiteError::RegenerationFailed`] is what synchronous callers
//!   see when a tree could not be produced after cleanup and retry.
//!
//! Internal layers return [`anyhow::Result`] with a [`SiteError`] inside, so the
//! orchestrator can `downcast_ref` and classify before converting.
//!
//! # Examples
//!
//! ```rust,no_run
//! use sitetree::core::{SiteError, user_friendly_error};
//!
//! let err = anyhow::Error::from(SiteError::InvalidRepositoryUri {
//!     uri: "http://example.com/site".to_string(),
//!     reason: "clone URL must use https".to_string(),
//! });
//! user_friendly_error(err).display();
//! ```

use colored::Colorize;
use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// The main error type for sitetree operations.
#[derive(Error, Debug)]
pub enum SiteError {
    /// The repository URI or the clone URL derived from it is not acceptable.
    #[error("Invalid repository URI '{uri}': {reason}")]
    InvalidRepositoryUri {
        /// The URI as supplied by the caller (credentials stripped)
        uri: String,
        /// Why it was rejected
        reason: String,
    },

    /// A git subprocess exited with a non-zero status.
    #[error("Git operation failed: {operation}")]
    GitCommandError {
        /// The git operation that failed (e.g., "fetch", "checkout")
        operation: String,
        /// The error output from the git command
        stderr: String,
    },

    /// Git executable not found in PATH
    #[error("Git is not installed or not found in PATH")]
    GitNotFound,

    /// Git repository clone failed
    #[error("Failed to clone repository: {url}")]
    GitCloneFailed {
        /// The repository URL that failed to clone, credentials stripped
        url: String,
        /// The reason for the clone failure
        reason: String,
    },

    /// Git checkout failed
    #[error("Failed to checkout branch '{reference}' in repository")]
    GitCheckoutFailed {
        /// The branch that failed to checkout
        reference: String,
        /// The reason for the checkout failure
        reason: String,
    },

    /// The working copy has no templates folder to parse.
    #[error("Templates folder not found: {path}")]
    TemplatesNotFound {
        /// The directory that was expected to hold templates
        path: String,
    },

    /// A cache backend call failed or the backend is unreachable.
    #[error("Cache operation '{operation}' failed: {reason}")]
    CacheError {
        /// The cache operation (get, set, delete, probe)
        operation: String,
        /// Backend-specific failure text
        reason: String,
    },

    /// A database statement or transaction failed.
    #[error("Database operation '{operation}' failed: {reason}")]
    DatabaseError {
        /// What the store was doing
        operation: String,
        /// The driver's message
        reason: String,
    },

    /// A tree could not be produced for a repository.
    #[error("Failed to generate tree for '{repository}': {reason}")]
    RegenerationFailed {
        /// Repository URI
        repository: String,
        /// Flattened cause chain
        reason: String,
    },

    /// Another generation for the same repository currently holds its lock.
    #[error("Repository '{repository}' is busy with another generation")]
    RepositoryBusy {
        /// Repository URI
        repository: String,
    },

    /// A removal request named a page the store does not know.
    #[error("Page '{page}' not found in project '{project}'")]
    PageNotFound {
        /// Project (repository URI)
        project: String,
        /// Page name
        page: String,
    },

    /// Configuration error
    #[error("Configuration error: {message}")]
    ConfigError {
        /// Description of the configuration error
        message: String,
    },

    /// IO error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON (de)serialization error
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// YAML parsing error (site manifest)
    #[error("YAML parsing error: {0}")]
    YamlError(#[from] serde_yaml::Error),

    /// TOML parsing error (configuration file)
    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    /// Anything else
    #[error("{message}")]
    Other {
        /// Error message
        message: String,
    },
}

impl From<sqlx::Error> for SiteError {
    fn from(err: sqlx::Error) -> Self {
        Self::DatabaseError {
            operation: "query".to_string(),
            reason: err.to_string(),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for SiteError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        Self::DatabaseError {
            operation: "migrate".to_string(),
            reason: err.to_string(),
        }
    }
}

impl Clone for SiteError {
    fn clone(&self) -> Self {
        match self {
            Self::InvalidRepositoryUri { uri, reason } => Self::InvalidRepositoryUri {
                uri: uri.clone(),
                reason: reason.clone(),
            },
            Self::GitCommandError { operation, stderr } => Self::GitCommandError {
                operation: operation.clone(),
                stderr: stderr.clone(),
            },
            Self::GitNotFound => Self::GitNotFound,
            Self::GitCloneFailed { url, reason } => Self::GitCloneFailed {
                url: url.clone(),
                reason: reason.clone(),
            },
            Self::GitCheckoutFailed { reference, reason } => Self::GitCheckoutFailed {
                reference: reference.clone(),
                reason: reason.clone(),
            },
            Self::TemplatesNotFound { path } => Self::TemplatesNotFound { path: path.clone() },
            Self::CacheError { operation, reason } => Self::CacheError {
                operation: operation.clone(),
                reason: reason.clone(),
            },
            Self::DatabaseError { operation, reason } => Self::DatabaseError {
                operation: operation.clone(),
                reason: reason.clone(),
            },
            Self::RegenerationFailed { repository, reason } => Self::RegenerationFailed {
                repository: repository.clone(),
                reason: reason.clone(),
            },
            Self::RepositoryBusy { repository } => Self::RepositoryBusy {
                repository: repository.clone(),
            },
            Self::PageNotFound { project, page } => Self::PageNotFound {
                project: project.clone(),
                page: page.clone(),
            },
            Self::ConfigError { message } => Self::ConfigError { message: message.clone() },
            // Library errors are not Clone; keep their rendered message.
            Self::IoError(e) => Self::IoError(std::io::Error::new(e.kind(), e.to_string())),
            Self::JsonError(e) => Self::Other { message: format!("JSON error: {e}") },
            Self::YamlError(e) => Self::Other { message: format!("YAML parsing error: {e}") },
            Self::TomlError(e) => Self::Other { message: format!("TOML parsing error: {e}") },
            Self::Other { message } => Self::Other { message: message.clone() },
        }
    }
}

impl SiteError {
    /// Configuration and validation failures. These are surfaced as-is and
    /// never retried.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::InvalidRepositoryUri { .. }
                | Self::ConfigError { .. }
                | Self::PageNotFound { .. }
                | Self::GitNotFound
        )
    }

    /// Infrastructure failures where cleaning the working copy and trying
    /// again can plausibly succeed. A working copy without a templates folder
    /// counts: it may be a clone interrupted before checkout.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::GitCommandError { .. }
                | Self::GitCloneFailed { .. }
                | Self::GitCheckoutFailed { .. }
                | Self::TemplatesNotFound { .. }
                | Self::CacheError { .. }
                | Self::DatabaseError { .. }
                | Self::IoError(_)
        )
    }
}

/// Classifies an arbitrary error chain: the first [`SiteError`] found decides.
#[must_use]
pub fn is_transient(error: &anyhow::Error) -> bool {
    error
        .chain()
        .find_map(|cause| cause.downcast_ref::<SiteError>())
        .is_none_or(SiteError::is_transient)
}

/// Error context wrapper that provides user-friendly error information
#[derive(Debug)]
pub struct ErrorContext {
    /// The underlying error
    pub error: SiteError,
    /// Optional suggestion for resolving the error
    pub suggestion: Option<String>,
    /// Optional additional details about the error
    pub details: Option<String>,
}

impl ErrorContext {
    /// Create a new error context from a [`SiteError`]
    #[must_use]
    pub const fn new(error: SiteError) -> Self {
        Self {
            error,
            suggestion: None,
            details: None,
        }
    }

    /// Add a suggestion for resolving the error
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    /// Add additional details explaining the error
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// Display the error context to stderr with terminal colors
    ///
    /// - Error message: Red and bold
    /// - Details: Yellow
    /// - Suggestion: Green
    pub fn display(&self) {
        eprintln!("{}: {}", "error".red().bold(), self.error);

        if let Some(details) = &self.details {
            eprintln!("{}: {}", "details".yellow(), details);
        }

        if let Some(suggestion) = &self.suggestion {
            eprintln!("{}: {}", "suggestion".green(), suggestion);
        }
    }

    /// Structured form for machine consumers.
    #[must_use]
    pub fn to_payload(&self) -> ErrorPayload {
        ErrorPayload {
            error: self.error.to_string(),
            suggestion: self.suggestion.clone(),
            details: self.details.clone(),
        }
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)?;

        if let Some(details) = &self.details {
            write!(f, "\nDetails: {details}")?;
        }

        if let Some(suggestion) = &self.suggestion {
            write!(f, "\nSuggestion: {suggestion}")?;
        }

        Ok(())
    }
}

impl std::error::Error for ErrorContext {}

/// JSON body returned when a direct mutation fails.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorPayload {
    /// Human-readable message
    pub error: String,
    /// Suggested fix, when one is known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
    /// Extra context
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// Convert any error into a user-friendly [`ErrorContext`].
///
/// [`SiteError`] values anywhere in the chain get tailored suggestions; other
/// errors are reported with their full cause chain.
#[must_use]
pub fn user_friendly_error(error: anyhow::Error) -> ErrorContext {
    if let Some(site_error) = error.chain().find_map(|c| c.downcast_ref::<SiteError>()) {
        return create_error_context(site_error.clone());
    }

    if let Some(toml_error) = error.downcast_ref::<toml::de::Error>() {
        return ErrorContext::new(SiteError::ConfigError {
            message: toml_error.to_string(),
        })
        .with_suggestion("Check the TOML syntax of the configuration file");
    }

    let mut message = error.to_string();
    let chain: Vec<String> =
        error.chain().skip(1).map(std::string::ToString::to_string).collect();

    if !chain.is_empty() {
        message.push_str("\n\nCaused by:");
        for (i, cause) in chain.iter().enumerate() {
            message.push_str(&format!("\n  {}: {}", i + 1, cause));
        }
    }

    ErrorContext::new(SiteError::Other { message })
}

fn create_error_context(error: SiteError) -> ErrorContext {
    match &error {
        SiteError::InvalidRepositoryUri { .. } => ErrorContext::new(error)
            .with_suggestion("Use a bare repository name (e.g. 'ubuntu.com') or a full https URL ending in .git")
            .with_details("Clone URLs are built from REPO_ORG and must use https"),

        SiteError::GitNotFound => ErrorContext::new(error)
            .with_suggestion("Install git from https://git-scm.com/ or your package manager")
            .with_details("sitetree shells out to git to manage working copies"),

        SiteError::GitCommandError { operation, .. } => {
            let suggestion = match operation.as_str() {
                op if op.contains("fetch") => "Check network access and that GH_TOKEN can read the repository",
                op if op.contains("checkout") => "Verify the branch exists on the remote",
                _ => "Run the git command manually in the working copy for more details",
            };
            ErrorContext::new(error).with_suggestion(suggestion)
        }

        SiteError::GitCloneFailed { url, .. } => {
            let suggestion = format!("Verify the repository exists and is readable: {url}");
            ErrorContext::new(error)
                .with_suggestion(suggestion)
                .with_details("Clone operations fail on invalid URLs, network issues or missing credentials")
        }

        SiteError::GitCheckoutFailed { reference, .. } => {
            let suggestion = format!("Check that branch '{reference}' exists on the remote");
            ErrorContext::new(error).with_suggestion(suggestion)
        }

        SiteError::TemplatesNotFound { .. } => ErrorContext::new(error)
            .with_suggestion("The repository must contain a 'templates' folder at its root"),

        SiteError::CacheError { .. } => ErrorContext::new(error)
            .with_suggestion("Check VALKEY_HOST/VALKEY_PORT or the permissions of the tree-cache directory"),

        SiteError::DatabaseError { .. } => ErrorContext::new(error)
            .with_suggestion("Check DATABASE_PATH and that the database file is writable"),

        SiteError::RepositoryBusy { .. } => ErrorContext::new(error)
            .with_suggestion("Another generation is in progress; retry shortly"),

        SiteError::PageNotFound { .. } => ErrorContext::new(error)
            .with_suggestion("List the tree with 'sitetree tree <uri>' to find valid page names"),

        SiteError::ConfigError { .. } | SiteError::TomlError(_) | SiteError::YamlError(_) => {
            ErrorContext::new(error)
                .with_suggestion("Check config.toml and sites.yaml for syntax errors")
        }

        _ => ErrorContext::new(error),
    }
}
