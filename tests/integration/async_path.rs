use anyhow::Result;
use serial_test::serial;
use std::time::Duration;

use sitetree::core::SiteError;
use sitetree::tasks::{JobOutcome, TreeWorkerPool};
use sitetree::test_utils::{FakeWorkingCopies, SiteFixture, TestEnvironment};

use crate::common::{FakeSite, child_names};

async fn site_with_wait(delay: Duration, wait_ms: u64) -> Result<FakeSite> {
    let mut env = TestEnvironment::new()?;
    env.config.tasks.async_wait_ms = wait_ms;
    FakeSite::build(env, |root| FakeWorkingCopies::new(root, SiteFixture::basic()).with_delay(delay)).await
}

#[tokio::test]
async fn test_async_read_returns_fresh_tree() -> Result<()> {
    let site = site_with_wait(Duration::ZERO, 2_000).await?;
    let pool = TreeWorkerPool::start(2, 8);
    let repository = site.repository("ubuntu.com");

    // Warm the cache, then change the templates: the async path must not
    // serve the stale entry.
    repository.get_tree(false).await?;
    site.copies.set_fixture(SiteFixture::basic().page("pricing.html", "Pricing"));

    let response = repository.get_tree_async(&pool).await;
    assert_eq!(response.name, "ubuntu.com");
    assert_eq!(child_names(&response.templates), vec!["/about", "/pricing"]);
    assert_eq!(site.copies.setups(), 2);

    pool.shutdown().await;
    Ok(())
}

#[tokio::test]
#[serial]
async fn test_async_read_times_out_to_placeholder_and_finishes_later() -> Result<()> {
    let site = site_with_wait(Duration::from_millis(600), 100).await?;
    let pool = TreeWorkerPool::start(1, 4);
    let repository = site.repository("ubuntu.com");

    let response = repository.get_tree_async(&pool).await;
    assert!(response.templates.is_placeholder());

    // The job was not cancelled: once it lands, readers get it from the cache.
    pool.shutdown().await;
    let tree = repository.get_tree(false).await?;
    assert!(!tree.is_placeholder());
    assert_eq!(site.copies.setups(), 1);
    Ok(())
}

#[tokio::test]
#[serial]
async fn test_async_read_while_busy_polls_cache() -> Result<()> {
    let site = site_with_wait(Duration::ZERO, 300).await?;
    let pool = TreeWorkerPool::start(1, 4);
    let repository = site.repository("ubuntu.com");

    let guard = site.ctx.locks.acquire("ubuntu.com").await?;
    let response = repository.get_tree_async(&pool).await;
    drop(guard);

    assert!(response.templates.is_placeholder());
    assert_eq!(site.copies.setups(), 0, "a busy repository must not be set up twice");

    pool.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_worker_reports_failures() -> Result<()> {
    let mut env = TestEnvironment::new()?;
    env.config.tasks.regeneration_retries = 0;
    let site = FakeSite::build(env, |root| FakeWorkingCopies::new(root, SiteFixture::basic())).await?;
    site.copies.fail_next(SiteError::GitCheckoutFailed {
        reference: "main".to_string(),
        reason: "pathspec 'main' did not match".to_string(),
    });

    let pool = TreeWorkerPool::start(1, 4);
    let outcome = pool.submit(site.repository("ubuntu.com"))?.await?;
    assert!(matches!(outcome, JobOutcome::Failed(SiteError::RegenerationFailed { .. })), "got {outcome:?}");

    let response = site.repository("ubuntu.com").get_tree_async(&pool).await;
    assert!(!response.templates.is_placeholder(), "the next job succeeds");

    pool.shutdown().await;
    Ok(())
}

#[tokio::test]
#[serial]
async fn test_full_queue_rejects_submissions() -> Result<()> {
    let site = site_with_wait(Duration::from_millis(500), 100).await?;
    let pool = TreeWorkerPool::start(1, 1);

    // One job running, one queued: the third does not fit.
    let _running = pool.submit(site.repository("a.com"))?;
    tokio::time::sleep(Duration::from_millis(50)).await;
    let _queued = pool.submit(site.repository("b.com"))?;
    let err = pool.submit(site.repository("c.com")).unwrap_err();
    assert!(matches!(err, SiteError::RepositoryBusy { .. }));

    pool.shutdown().await;
    assert_eq!(site.copies.setups(), 2);
    Ok(())
}
