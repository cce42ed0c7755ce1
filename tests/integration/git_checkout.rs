//! Working copies against real git repositories served over `file://`.

use anyhow::Result;
use serial_test::serial;
use std::fs;

use sitetree::checkout::{GitWorkingCopies, WorkingCopies};
use sitetree::core::SiteError;
use sitetree::models::WebpageStatus;
use sitetree::site_repository::SiteRepository;
use sitetree::test_utils::{SiteFixture, TestEnvironment, TestGit, init_test_logging};

use crate::common::child_names;

fn working_copies(env: &TestEnvironment) -> GitWorkingCopies {
    GitWorkingCopies::from_config(&env.config)
}

#[tokio::test]
#[serial]
async fn test_setup_clones_and_is_idempotent() -> Result<()> {
    init_test_logging(None);
    let env = TestEnvironment::new()?;
    env.create_site("site", &SiteFixture::basic())?;
    let copies = working_copies(&env);

    let templates = copies.setup("site", "main").await?;
    assert_eq!(templates, env.config.repositories_root().join("site/templates"));
    assert!(templates.join("about/index.html").is_file());

    // Second setup reuses the clone
    let again = copies.setup("site", "main").await?;
    assert_eq!(again, templates);
    Ok(())
}

#[tokio::test]
#[serial]
async fn test_setup_picks_up_new_commits_and_discards_local_edits() -> Result<()> {
    let env = TestEnvironment::new()?;
    let repo = env.create_site("site", &SiteFixture::basic())?;
    let copies = working_copies(&env);

    let templates = copies.setup("site", "main").await?;
    fs::write(templates.join("index.html"), "local edit")?;
    fs::write(templates.join("scratch.html"), "untracked")?;

    SiteFixture::new().page("pricing.html", "Pricing").commit_to(&repo, "Add pricing")?;
    let templates = copies.setup("site", "main").await?;

    assert!(templates.join("pricing.html").is_file());
    assert!(fs::read_to_string(templates.join("index.html"))?.contains("Home"));
    Ok(())
}

#[tokio::test]
#[serial]
async fn test_setup_switches_branches() -> Result<()> {
    let env = TestEnvironment::new()?;
    let repo = env.create_site("site", &SiteFixture::basic())?;
    let git = TestGit::new(&repo);
    git.create_branch("staging")?;
    SiteFixture::new().page("beta.html", "Beta").commit_to(&repo, "Beta page")?;
    git.checkout("main")?;

    let copies = working_copies(&env);
    let staging = copies.setup("site", "staging").await?;
    assert!(staging.join("beta.html").is_file());

    let main = copies.setup("site", "main").await?;
    assert!(!main.join("beta.html").exists());
    Ok(())
}

#[tokio::test]
#[serial]
async fn test_setup_replaces_non_git_directory() -> Result<()> {
    let env = TestEnvironment::new()?;
    env.create_site("site", &SiteFixture::basic())?;
    let stale = env.config.repositories_root().join("site");
    fs::create_dir_all(&stale)?;
    fs::write(stale.join("leftover.txt"), "half-deleted clone")?;

    let templates = working_copies(&env).setup("site", "main").await?;
    assert!(templates.is_dir());
    assert!(!stale.join("leftover.txt").exists());
    Ok(())
}

#[tokio::test]
#[serial]
async fn test_missing_branch_is_an_error() -> Result<()> {
    let env = TestEnvironment::new()?;
    env.create_site("site", &SiteFixture::basic())?;

    let err = working_copies(&env).setup("site", "no-such-branch").await.unwrap_err();
    let site_err = err.chain().find_map(|c| c.downcast_ref::<SiteError>());
    assert!(site_err.is_some_and(SiteError::is_transient), "got {err:#}");
    Ok(())
}

#[tokio::test]
#[serial]
async fn test_repository_without_templates() -> Result<()> {
    let env = TestEnvironment::new()?;
    let repo = env.mirrors_dir().join("bare-site.git");
    fs::create_dir_all(&repo)?;
    let git = TestGit::new(&repo);
    git.init_on_branch("main")?;
    git.config_user()?;
    fs::write(repo.join("README.md"), "no templates here")?;
    git.add_all()?;
    git.commit("Initial")?;

    let err = working_copies(&env).setup("bare-site", "main").await.unwrap_err();
    assert!(matches!(err.downcast_ref::<SiteError>(), Some(SiteError::TemplatesNotFound { .. })));
    Ok(())
}

#[tokio::test]
#[serial]
async fn test_end_to_end_tree_from_git() -> Result<()> {
    let env = TestEnvironment::new()?;
    let fixture = SiteFixture::basic()
        .page("about/team.html", "Team")
        .file("base_layout.html", "{% extends \"templates/base.html\" %}");
    env.create_site("site", &fixture)?;
    let ctx = env.git_context().await?;

    let repository = SiteRepository::on_default_branch(ctx.clone(), "site");
    let tree = repository.get_tree(false).await?;
    assert_eq!(tree.name, "/");
    assert_eq!(tree.title.as_deref(), Some("Home"));
    assert_eq!(child_names(&tree), vec!["/about"]);
    assert_eq!(child_names(&tree.children[0]), vec!["/about/team"]);

    let project = ctx.store.find_project("site").await?.expect("project persisted");
    let pages = ctx.store.list_webpages(project.id).await?;
    assert_eq!(pages.len(), 3);
    assert!(pages.iter().all(|p| p.status == WebpageStatus::New));
    assert!(env.config.database_path().is_file());

    // Forced regeneration promotes what the first pass created
    repository.get_tree(true).await?;
    let pages = ctx.store.list_webpages(project.id).await?;
    assert!(pages.iter().all(|p| p.status == WebpageStatus::Available));
    Ok(())
}

#[tokio::test]
#[serial]
async fn test_end_to_end_invalid_uri_touches_nothing() -> Result<()> {
    let env = TestEnvironment::new()?;
    let ctx = env.git_context().await?;

    let err = SiteRepository::on_default_branch(ctx, "http://example.com/site").get_tree(false).await.unwrap_err();
    assert!(err.is_validation(), "got {err:?}");
    assert!(!env.config.repositories_root().join("site").exists());
    Ok(())
}
