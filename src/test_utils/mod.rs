//! Test utilities for sitetree
//!
//! Shared helpers for unit and integration tests: a temporary environment, a
//! templates-folder fixture builder, instrumented fakes for the working-copy
//! manager and the parser, and a small git wrapper.

pub mod environment;
pub mod fakes;
pub mod fixtures;
pub mod git_helper;

pub use environment::TestEnvironment;
pub use fakes::{CountingParser, FakeWorkingCopies};
pub use fixtures::{SiteFixture, TemplateFile, file_url};
pub use git_helper::TestGit;

use std::sync::Once;
use tracing::Level;
use tracing_subscriber::EnvFilter;

/// Global flag to ensure logging is only initialized once in tests
static INIT_LOGGING: Once = Once::new();

/// Initialize logging for tests.
///
/// Runs once per process. Uses `level` when given, otherwise `RUST_LOG`;
/// with neither, tests stay silent.
///
/// ```bash
/// RUST_LOG=cache=debug,lock=debug cargo test
/// ```
pub fn init_test_logging(level: Option<Level>) {
    INIT_LOGGING.call_once(|| {
        let filter = if let Some(level) = level {
            EnvFilter::new(level.to_string())
        } else if std::env::var("RUST_LOG").is_ok() {
            EnvFilter::from_default_env()
        } else {
            return;
        };

        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_target(true)
            .with_thread_ids(false)
            .try_init();
    });
}
