use anyhow::Result;

use sitetree::cache::write_tree;
use sitetree::constants::DEFAULT_PROJECT_NAME;
use sitetree::core::SiteError;
use sitetree::models::{PageMeta, PageTree, WebpageStatus};
use sitetree::tasks::{Job, Scheduler, SweepReport};
use sitetree::test_utils::SiteFixture;

use crate::common::FakeSite;

async fn status_of(site: &FakeSite, project: &str, page: &str) -> Result<Option<WebpageStatus>> {
    let Some(project) = site.ctx.store.find_project(project).await? else {
        return Ok(None);
    };
    Ok(site.ctx.store.find_webpage(project.id, page).await?.map(|w| w.status))
}

#[tokio::test]
async fn test_promotion_sweep_promotes_live_pages() -> Result<()> {
    let site = FakeSite::new(SiteFixture::basic()).await?;
    site.repository("ubuntu.com").get_tree(false).await?;
    assert_eq!(status_of(&site, "ubuntu.com", "/about").await?, Some(WebpageStatus::New));

    let report = Scheduler::new(site.ctx.clone()).sweep_promotions().await;

    assert_eq!(report.processed, 1);
    assert_eq!(report.changed, 2);
    assert_eq!(report.failed, 0);
    assert_eq!(status_of(&site, "ubuntu.com", "/").await?, Some(WebpageStatus::Available));
    assert_eq!(status_of(&site, "ubuntu.com", "/about").await?, Some(WebpageStatus::Available));
    // Served from the cache: no second setup
    assert_eq!(site.copies.setups(), 1);
    Ok(())
}

#[tokio::test]
async fn test_promotion_sweep_leaves_pages_missing_from_tree() -> Result<()> {
    let site = FakeSite::new(SiteFixture::basic()).await?;
    site.repository("ubuntu.com").get_tree(false).await?;

    // A page requested through the store but not (yet) in the templates
    let project = site.ctx.store.get_or_create_project("ubuntu.com").await?;
    site.ctx.store.insert_webpage(project.id, "/pricing", None, WebpageStatus::New).await?;

    Scheduler::new(site.ctx.clone()).sweep_promotions().await;
    assert_eq!(status_of(&site, "ubuntu.com", "/pricing").await?, Some(WebpageStatus::New));
    Ok(())
}

#[tokio::test]
async fn test_deletion_sweep_removes_confirmed_pages() -> Result<()> {
    let site = FakeSite::new(SiteFixture::basic().page("pricing.html", "Pricing")).await?;
    let repository = site.repository("ubuntu.com");
    let mut tree = repository.get_tree(false).await?;

    // Removals requested straight through the store leave the cache alone
    site.ctx.store.request_removal("ubuntu.com", "/pricing").await?;
    site.ctx.store.request_removal("ubuntu.com", "/about").await?;

    // The live tree no longer has the pricing page; about stays.
    tree.children.retain(|child| child.name != "/pricing");
    write_tree(site.ctx.cache.as_ref(), &repository.cache_key(), &tree).await?;

    let report = Scheduler::new(site.ctx.clone()).sweep_deletions().await;

    assert_eq!(report.processed, 1);
    assert_eq!(report.changed, 1);
    assert_eq!(report.failed, 0);
    assert_eq!(status_of(&site, "ubuntu.com", "/pricing").await?, None);
    assert_eq!(
        status_of(&site, "ubuntu.com", "/about").await?,
        Some(WebpageStatus::ToDelete),
        "a page still in the templates waits for its template to go"
    );
    // The live tree came from the cache, not a regeneration
    assert_eq!(site.copies.setups(), 1);
    Ok(())
}

#[tokio::test]
async fn test_deletion_sweep_after_remove_page_regenerates() -> Result<()> {
    let site = FakeSite::new(SiteFixture::basic().page("pricing.html", "Pricing")).await?;
    let repository = site.repository("ubuntu.com");
    repository.get_tree(false).await?;
    repository.remove_page("/pricing").await?;

    site.copies.set_fixture(SiteFixture::basic());
    Scheduler::new(site.ctx.clone()).sweep_deletions().await;

    assert_eq!(status_of(&site, "ubuntu.com", "/pricing").await?, None);
    assert_eq!(site.copies.setups(), 2);
    Ok(())
}

#[tokio::test]
async fn test_promotion_sweep_continues_past_failing_project() -> Result<()> {
    let site = FakeSite::new(SiteFixture::basic()).await?;
    let broken = site.repository("broken.com");
    broken.get_tree(false).await?;
    site.repository("ubuntu.com").get_tree(false).await?;

    // broken.com has to regenerate for its live tree, and that fails
    broken.invalidate_cache().await?;
    site.copies.fail_next(SiteError::InvalidRepositoryUri {
        uri: "broken.com".to_string(),
        reason: "repository moved".to_string(),
    });

    let report = Scheduler::new(site.ctx.clone()).sweep_promotions().await;

    assert_eq!(report.failed, 1);
    assert_eq!(report.processed, 1);
    assert_eq!(report.changed, 2);
    assert_eq!(status_of(&site, "broken.com", "/about").await?, Some(WebpageStatus::New));
    assert_eq!(status_of(&site, "ubuntu.com", "/about").await?, Some(WebpageStatus::Available));
    Ok(())
}

#[tokio::test]
async fn test_sweeps_skip_default_project() -> Result<()> {
    let site = FakeSite::new(SiteFixture::basic()).await?;
    let default = site.ctx.store.get_or_create_project(DEFAULT_PROJECT_NAME).await?;
    site.ctx.store.insert_webpage(default.id, "/orphan", None, WebpageStatus::New).await?;

    let report = Scheduler::new(site.ctx.clone()).sweep_promotions().await;
    assert_eq!(
        report,
        SweepReport {
            processed: 0,
            changed: 0,
            skipped: 1,
            failed: 0,
        }
    );
    assert_eq!(site.copies.setups(), 0);
    Ok(())
}

#[tokio::test]
async fn test_tree_refresh_regenerates_manifest_sites() -> Result<()> {
    let site = FakeSite::new(SiteFixture::basic()).await?;
    site.env.write_manifest(&["ubuntu.com", "canonical.com"])?;

    let scheduler = Scheduler::new(site.ctx.clone());
    let report = scheduler.run(Job::TreeRefresh).await;
    assert_eq!(report.changed, 2);
    assert_eq!(site.copies.setups(), 2);

    // Refresh ignores the cache
    scheduler.refresh_trees().await;
    assert_eq!(site.copies.setups(), 4);
    assert!(site.ctx.locks.contains("ubuntu.com"));
    assert!(site.ctx.locks.contains("canonical.com"));
    Ok(())
}

#[tokio::test]
async fn test_tree_refresh_continues_past_failing_site() -> Result<()> {
    let site = FakeSite::new(SiteFixture::basic()).await?;
    site.env.write_manifest(&["broken.com", "ubuntu.com"])?;
    site.copies.fail_next(SiteError::InvalidRepositoryUri {
        uri: "broken.com".to_string(),
        reason: "repository moved".to_string(),
    });

    let report = Scheduler::new(site.ctx.clone()).refresh_trees().await;

    assert_eq!(report.failed, 1);
    assert_eq!(report.changed, 1);
    assert_eq!(site.copies.setups(), 2);
    assert_eq!(status_of(&site, "broken.com", "/").await?, None);
    assert_eq!(status_of(&site, "ubuntu.com", "/").await?, Some(WebpageStatus::New));
    Ok(())
}

#[tokio::test]
async fn test_tree_refresh_skips_busy_repository() -> Result<()> {
    let site = FakeSite::new(SiteFixture::basic()).await?;
    site.env.write_manifest(&["ubuntu.com"])?;

    let guard = site.ctx.locks.acquire("ubuntu.com").await?;
    let report = Scheduler::new(site.ctx.clone()).refresh_trees().await;
    drop(guard);

    assert_eq!(report.skipped, 1);
    assert_eq!(site.copies.setups(), 0);
    Ok(())
}

#[tokio::test]
async fn test_tree_refresh_prunes_idle_unlisted_locks() -> Result<()> {
    let site = FakeSite::new(SiteFixture::basic()).await?;
    site.env.write_manifest(&["ubuntu.com"])?;
    site.repository("old-site.com").get_tree(false).await?;
    assert!(site.ctx.locks.contains("old-site.com"));

    Scheduler::new(site.ctx.clone()).refresh_trees().await;
    assert!(!site.ctx.locks.contains("old-site.com"));
    assert!(site.ctx.locks.contains("ubuntu.com"));
    Ok(())
}

#[tokio::test]
async fn test_store_reconciles_direct_tree() -> Result<()> {
    let site = FakeSite::new(SiteFixture::basic()).await?;
    let mut tree = PageTree::new("/", PageMeta::default());
    let root = tree.root();
    tree.add_child(root, "/docs", PageMeta::default());

    let changeset = site.repository("ubuntu.com").create_webpages_for_tree(&tree).await?;
    assert_eq!(changeset.creates.len(), 2);

    let again = site.repository("ubuntu.com").create_webpages_for_tree(&tree).await?;
    assert_eq!(again.creates.len(), 0);
    assert_eq!(again.updates.len(), 2, "NEW pages seen again become AVAILABLE");
    assert_eq!(status_of(&site, "ubuntu.com", "/docs").await?, Some(WebpageStatus::Available));
    Ok(())
}
