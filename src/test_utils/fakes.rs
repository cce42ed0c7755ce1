//! Instrumented stand-ins for the orchestrator's collaborators.
//!
//! They count calls and track concurrency so tests can assert how often the
//! expensive steps ran, and they can be told to fail on demand.

use anyhow::Result;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use super::fixtures::SiteFixture;
use crate::checkout::WorkingCopies;
use crate::core::SiteError;
use crate::git::working_copy_name;
use crate::models::PageTree;
use crate::parser::{TemplateParser, TreeParser};

/// [`WorkingCopies`] that writes a [`SiteFixture`] instead of cloning.
#[derive(Debug)]
pub struct FakeWorkingCopies {
    root: PathBuf,
    fixture: Mutex<SiteFixture>,
    failures: Mutex<VecDeque<SiteError>>,
    delay: Duration,
    setups: AtomicUsize,
    deletes: AtomicUsize,
    active: AtomicUsize,
    max_active: AtomicUsize,
}

impl FakeWorkingCopies {
    /// Working copies under `root`, each holding `fixture`.
    pub fn new(root: impl Into<PathBuf>, fixture: SiteFixture) -> Self {
        Self {
            root: root.into(),
            fixture: Mutex::new(fixture),
            failures: Mutex::new(VecDeque::new()),
            delay: Duration::ZERO,
            setups: AtomicUsize::new(0),
            deletes: AtomicUsize::new(0),
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
        }
    }

    /// Make every setup take at least `delay`.
    #[must_use]
    pub const fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Fail the next setup with `error`. Queued errors are used in order.
    pub fn fail_next(&self, error: SiteError) {
        self.failures.lock().unwrap().push_back(error);
    }

    /// Replace what later setups write.
    pub fn set_fixture(&self, fixture: SiteFixture) {
        *self.fixture.lock().unwrap() = fixture;
    }

    /// Setup calls so far, failed ones included.
    pub fn setups(&self) -> usize {
        self.setups.load(Ordering::SeqCst)
    }

    /// `delete_local_files` calls so far.
    pub fn deletes(&self) -> usize {
        self.deletes.load(Ordering::SeqCst)
    }

    /// Most setups ever running at the same time.
    pub fn max_concurrent_setups(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WorkingCopies for FakeWorkingCopies {
    fn path_for(&self, uri: &str) -> Result<PathBuf> {
        Ok(self.root.join(working_copy_name(uri)?))
    }

    async fn setup(&self, uri: &str, _branch: &str) -> Result<PathBuf> {
        self.setups.fetch_add(1, Ordering::SeqCst);
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let result = self.write(uri);
        self.active.fetch_sub(1, Ordering::SeqCst);
        result
    }

    async fn delete_local_files(&self, uri: &str) -> Result<()> {
        self.deletes.fetch_add(1, Ordering::SeqCst);
        let path = self.path_for(uri)?;
        if path.exists() {
            std::fs::remove_dir_all(path)?;
        }
        Ok(())
    }
}

impl FakeWorkingCopies {
    fn write(&self, uri: &str) -> Result<PathBuf> {
        let path = self.path_for(uri)?;
        if let Some(error) = self.failures.lock().unwrap().pop_front() {
            return Err(error.into());
        }
        let templates = path.join("templates");
        if templates.exists() {
            std::fs::remove_dir_all(&templates)?;
        }
        self.fixture.lock().unwrap().write_to(&templates)?;
        Ok(templates)
    }
}

/// [`TemplateParser`] that counts its calls.
#[derive(Debug)]
pub struct CountingParser {
    inner: TemplateParser,
    calls: AtomicUsize,
}

impl CountingParser {
    /// Wrap the default parser.
    pub fn new() -> Result<Self> {
        Ok(Self {
            inner: TemplateParser::new()?,
            calls: AtomicUsize::new(0),
        })
    }

    /// Parses so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl TreeParser for CountingParser {
    fn parse(&self, templates_dir: &Path) -> Result<PageTree> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.parse(templates_dir)
    }
}
