//! Global constants used throughout the sitetree codebase.
//!
//! Timeouts, retry parameters, template allow-lists and cache prefixes live
//! here so that magic values are discoverable in one place.

use std::time::Duration;

/// Default timeout for a single git subprocess (5 minutes).
pub const GIT_COMMAND_TIMEOUT: Duration = Duration::from_secs(300);

/// Maximum backoff delay for exponential backoff (500ms).
pub const MAX_BACKOFF_DELAY_MS: u64 = 500;

/// Starting delay for exponential backoff (10ms).
///
/// Doubles on each retry attempt.
pub const STARTING_BACKOFF_DELAY_MS: u64 = 10;

/// How long the async read path waits for a background generation before
/// returning the placeholder tree.
pub const DEFAULT_ASYNC_WAIT: Duration = Duration::from_secs(3);

/// Interval between cache polls while the async read path is waiting.
pub const CACHE_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Default interval for scheduled jobs, in minutes (`TASK_DELAY`).
pub const DEFAULT_TASK_DELAY_MINUTES: u64 = 5;

/// Number of extra attempts after a failed generation (cleanup happens between attempts).
pub const DEFAULT_REGENERATION_RETRIES: usize = 1;

/// Default number of tree workers.
pub const DEFAULT_WORKERS: usize = 2;

/// Default capacity of the tree job queue.
pub const DEFAULT_QUEUE_CAPACITY: usize = 16;

/// Connect/command timeout for the networked cache.
pub const VALKEY_TIMEOUT: Duration = Duration::from_secs(2);

/// Key prefix used by the networked cache backend.
pub const VALKEY_KEY_PREFIX: &str = "WEBSITES-CONTENT-SYSTEM";

/// File name prefix used by the filesystem cache backend.
pub const FILE_CACHE_PREFIX: &str = "WEBSITES_CONTENT_SYSTEM";

/// Value written to a cache key to mark it invalidated.
pub const CACHE_NULL_SENTINEL: &str = "null";

/// Default GitHub organisation base URL used to build clone URLs.
pub const DEFAULT_REPO_ORG: &str = "https://github.com/canonical";

/// Default branch for trees when the caller does not specify one.
pub const DEFAULT_BRANCH: &str = "main";

/// Folder inside a working copy that holds the templates.
pub const TEMPLATES_FOLDER: &str = "templates";

/// Name of the project created when the database is initialised.
pub const DEFAULT_PROJECT_NAME: &str = "Default";

/// Templates that mark a file as a navigable page when extended, directly or
/// through a chain.
pub const BASE_TEMPLATES: &[&str] = &[
    "/base_index.html",
    "base_index.html",
    "templates/base.html",
    "templates/base_no_nav.html",
    "templates/one-column.html",
];

/// File name prefixes reserved for template scaffolding.
pub const TEMPLATE_PREFIXES: &[&str] = &["base", "_base"];

/// Upper bound on the length of an `extends` chain.
pub const MAX_EXTENDS_DEPTH: usize = 32;
