use anyhow::Result;
use futures::future::join_all;
use serial_test::serial;
use std::time::Duration;

use sitetree::cache::read_tree;
use sitetree::core::SiteError;
use sitetree::models::WebpageStatus;
use sitetree::test_utils::{FakeWorkingCopies, SiteFixture, TestEnvironment};

use crate::common::{FakeSite, child_names};

#[tokio::test]
async fn test_cold_read_generates_and_caches() -> Result<()> {
    let site = FakeSite::new(SiteFixture::basic()).await?;
    let repository = site.repository("ubuntu.com");

    let tree = repository.get_tree(false).await?;
    assert_eq!(tree.name, "/");
    assert_eq!(tree.title.as_deref(), Some("Home"));
    assert_eq!(child_names(&tree), vec!["/about"]);

    let cached = read_tree(site.ctx.cache.as_ref(), &repository.cache_key()).await;
    assert_eq!(cached.as_ref(), Some(&tree));
    assert_eq!(site.copies.setups(), 1);
    assert_eq!(site.parser.calls(), 1);
    Ok(())
}

#[tokio::test]
async fn test_warm_read_skips_setup() -> Result<()> {
    let site = FakeSite::new(SiteFixture::basic()).await?;
    let repository = site.repository("ubuntu.com");

    let first = repository.get_tree(false).await?;
    let second = repository.get_tree(false).await?;

    assert_eq!(first, second);
    assert_eq!(site.copies.setups(), 1);
    assert_eq!(site.parser.calls(), 1);
    Ok(())
}

#[tokio::test]
async fn test_forced_read_bypasses_cache() -> Result<()> {
    let site = FakeSite::new(SiteFixture::basic()).await?;
    let repository = site.repository("ubuntu.com");

    repository.get_tree(false).await?;
    site.copies.set_fixture(SiteFixture::basic().page("pricing.html", "Pricing"));

    // Cached: still the old tree
    let cached = repository.get_tree(false).await?;
    assert_eq!(child_names(&cached), vec!["/about"]);

    let fresh = repository.get_tree(true).await?;
    assert_eq!(child_names(&fresh), vec!["/about", "/pricing"]);
    assert_eq!(site.copies.setups(), 2);

    // The forced read refilled the cache
    let after = repository.get_tree(false).await?;
    assert_eq!(after, fresh);
    assert_eq!(site.copies.setups(), 2);
    Ok(())
}

#[tokio::test]
async fn test_branches_are_cached_separately() -> Result<()> {
    let site = FakeSite::new(SiteFixture::basic()).await?;
    let main = site.repository_on("ubuntu.com", "main");
    let staging = site.repository_on("ubuntu.com", "staging");
    assert_ne!(main.cache_key(), staging.cache_key());

    main.get_tree(false).await?;
    staging.get_tree(false).await?;
    assert_eq!(site.copies.setups(), 2);

    main.get_tree(false).await?;
    staging.get_tree(false).await?;
    assert_eq!(site.copies.setups(), 2);
    Ok(())
}

#[tokio::test]
async fn test_invalidate_forces_next_read_to_regenerate() -> Result<()> {
    let site = FakeSite::new(SiteFixture::basic()).await?;
    let repository = site.repository("ubuntu.com");

    repository.get_tree(false).await?;
    repository.invalidate_cache().await?;
    assert!(read_tree(site.ctx.cache.as_ref(), &repository.cache_key()).await.is_none());

    repository.get_tree(false).await?;
    assert_eq!(site.copies.setups(), 2);
    Ok(())
}

#[tokio::test]
#[serial]
async fn test_concurrent_cold_reads_set_up_once() -> Result<()> {
    let site = FakeSite::slow(SiteFixture::basic(), Duration::from_millis(200)).await?;
    let repository = site.repository("ubuntu.com");

    let reads = (0..8).map(|_| {
        let repository = repository.clone();
        tokio::spawn(async move { repository.get_tree(false).await })
    });
    let results = join_all(reads).await;

    let trees: Vec<_> = results.into_iter().map(|r| r.unwrap().unwrap()).collect();
    assert!(trees.windows(2).all(|w| w[0] == w[1]));
    assert_eq!(site.copies.setups(), 1, "waiters must pick up the tree from the cache");
    assert_eq!(site.copies.max_concurrent_setups(), 1);
    Ok(())
}

#[tokio::test]
#[serial]
async fn test_forced_reads_are_serialized() -> Result<()> {
    let site = FakeSite::slow(SiteFixture::basic(), Duration::from_millis(100)).await?;
    let repository = site.repository("ubuntu.com");

    let reads = (0..3).map(|_| {
        let repository = repository.clone();
        tokio::spawn(async move { repository.get_tree(true).await })
    });
    for result in join_all(reads).await {
        result.unwrap()?;
    }

    assert_eq!(site.copies.setups(), 3);
    assert_eq!(site.copies.max_concurrent_setups(), 1);
    Ok(())
}

#[tokio::test]
#[serial]
async fn test_different_repositories_run_in_parallel() -> Result<()> {
    let site = FakeSite::slow(SiteFixture::basic(), Duration::from_millis(300)).await?;
    let a = site.repository("ubuntu.com");
    let b = site.repository("canonical.com");

    let (ra, rb) = tokio::join!(a.get_tree(false), b.get_tree(false));
    ra?;
    rb?;
    assert_eq!(site.copies.setups(), 2);
    assert_eq!(site.copies.max_concurrent_setups(), 2);
    Ok(())
}

#[tokio::test]
async fn test_validation_error_is_not_retried() -> Result<()> {
    let site = FakeSite::new(SiteFixture::basic()).await?;
    site.copies.fail_next(SiteError::InvalidRepositoryUri {
        uri: "http://example.com/site".to_string(),
        reason: "clone URL must use https".to_string(),
    });

    let err = site.repository("http://example.com/site").get_tree(false).await.unwrap_err();
    assert!(matches!(err, SiteError::InvalidRepositoryUri { .. }), "got {err:?}");
    assert_eq!(site.copies.setups(), 1);
    assert_eq!(site.copies.deletes(), 0);
    Ok(())
}

#[tokio::test]
async fn test_transient_failure_cleans_up_and_retries() -> Result<()> {
    let site = FakeSite::new(SiteFixture::basic()).await?;
    site.copies.fail_next(SiteError::GitCloneFailed {
        url: "https://github.com/canonical/ubuntu.com.git".to_string(),
        reason: "connection reset".to_string(),
    });

    let tree = site.repository("ubuntu.com").get_tree(false).await?;
    assert!(!tree.is_placeholder());
    assert_eq!(site.copies.setups(), 2);
    assert_eq!(site.copies.deletes(), 1);
    Ok(())
}

#[tokio::test]
async fn test_missing_templates_folder_cleans_up_and_retries() -> Result<()> {
    let site = FakeSite::new(SiteFixture::basic()).await?;
    site.copies.fail_next(SiteError::TemplatesNotFound {
        path: "ubuntu.com/templates".to_string(),
    });

    let tree = site.repository("ubuntu.com").get_tree(false).await?;
    assert_eq!(child_names(&tree), vec!["/about"]);
    assert_eq!(site.copies.setups(), 2);
    assert_eq!(site.copies.deletes(), 1, "the broken working copy is removed before the retry");
    Ok(())
}

#[tokio::test]
async fn test_exhausted_retries_report_regeneration_failure() -> Result<()> {
    let site = FakeSite::new(SiteFixture::basic()).await?;
    for _ in 0..2 {
        site.copies.fail_next(SiteError::GitCommandError {
            operation: "fetch".to_string(),
            stderr: "fatal: unable to access".to_string(),
        });
    }

    let repository = site.repository("ubuntu.com");
    let err = repository.get_tree(false).await.unwrap_err();
    match err {
        SiteError::RegenerationFailed { repository: uri, reason } => {
            assert_eq!(uri, "ubuntu.com");
            assert!(reason.contains("fetch"), "reason should carry the cause: {reason}");
        }
        other => panic!("expected RegenerationFailed, got {other:?}"),
    }
    assert_eq!(site.copies.setups(), 2);
    assert_eq!(site.copies.deletes(), 2);

    // Nothing stale was left behind
    assert!(read_tree(site.ctx.cache.as_ref(), &repository.cache_key()).await.is_none());
    Ok(())
}

#[tokio::test]
async fn test_sync_read_falls_back_to_placeholder() -> Result<()> {
    let mut env = TestEnvironment::new()?;
    env.config.tasks.regeneration_retries = 0;
    let site = FakeSite::build(env, |root| FakeWorkingCopies::new(root, SiteFixture::basic())).await?;
    site.copies.fail_next(SiteError::TemplatesNotFound {
        path: "templates".to_string(),
    });

    let response = site.repository("ubuntu.com").get_tree_sync(false).await;
    assert_eq!(response.name, "ubuntu.com");
    assert!(response.templates.is_placeholder());
    assert_eq!(site.copies.setups(), 1);
    Ok(())
}

#[tokio::test]
async fn test_generation_persists_pages() -> Result<()> {
    let fixture = SiteFixture::new()
        .page("index.html", "Home")
        .documented_page("about/index.html", "About", "Who we are", "https://docs.example/about")
        .page("about/team.html", "Team");
    let site = FakeSite::new(fixture).await?;

    site.repository("ubuntu.com").get_tree(false).await?;

    let project = site.ctx.store.find_project("ubuntu.com").await?.expect("project created");
    let pages = site.ctx.store.list_webpages(project.id).await?;
    let mut names: Vec<&str> = pages.iter().map(|p| p.name.as_str()).collect();
    names.sort_unstable();
    assert_eq!(names, vec!["/", "/about", "/about/team"]);
    assert!(pages.iter().all(|p| p.status == WebpageStatus::New));

    let about = pages.iter().find(|p| p.name == "/about").unwrap();
    let team = pages.iter().find(|p| p.name == "/about/team").unwrap();
    assert_eq!(about.description.as_deref(), Some("Who we are"));
    assert_eq!(about.copy_doc_link.as_deref(), Some("https://docs.example/about"));
    assert_eq!(team.parent_id, Some(about.id));
    Ok(())
}

#[tokio::test]
async fn test_remove_page_marks_and_invalidates() -> Result<()> {
    let site = FakeSite::new(SiteFixture::basic()).await?;
    let repository = site.repository("ubuntu.com");
    repository.get_tree(false).await?;

    let page = repository.remove_page("/about").await?;
    assert_eq!(page.status, WebpageStatus::ToDelete);
    assert!(read_tree(site.ctx.cache.as_ref(), &repository.cache_key()).await.is_none());

    let err = repository.remove_page("/missing").await.unwrap_err();
    assert!(matches!(err, SiteError::PageNotFound { .. }));
    Ok(())
}
