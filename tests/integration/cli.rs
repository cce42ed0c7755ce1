//! Smoke tests of the compiled binary.

use anyhow::Result;
use predicates::prelude::*;
use serial_test::serial;

use sitetree::models::TreeResponse;
use sitetree::test_utils::{SiteFixture, TestEnvironment};

use crate::common::{child_names, sitetree_cmd};

#[test]
fn test_help_lists_commands() -> Result<()> {
    let env = TestEnvironment::new()?;
    sitetree_cmd(&env)?
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("tree"))
        .stdout(predicate::str::contains("sweep"))
        .stdout(predicate::str::contains("serve"));
    Ok(())
}

#[test]
#[serial]
fn test_tree_prints_json_body() -> Result<()> {
    let env = TestEnvironment::new()?;
    env.create_site("site", &SiteFixture::basic())?;

    let output = sitetree_cmd(&env)?.args(["tree", "site", "--compact"]).output()?;
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));

    let response: TreeResponse = serde_json::from_slice(&output.stdout)?;
    assert_eq!(response.name, "site");
    assert_eq!(response.templates.name, "/");
    assert_eq!(child_names(&response.templates), vec!["/about"]);

    // The wire format uses camelCase for the copy doc link
    let raw: serde_json::Value = serde_json::from_slice(&output.stdout)?;
    assert!(raw["templates"].get("copyDocLink").is_some());
    Ok(())
}

#[test]
#[serial]
fn test_tree_for_invalid_uri_prints_placeholder() -> Result<()> {
    let env = TestEnvironment::new()?;

    let output = sitetree_cmd(&env)?.args(["tree", "http://example.com/site"]).output()?;
    assert!(output.status.success());

    let response: TreeResponse = serde_json::from_slice(&output.stdout)?;
    assert!(response.templates.is_placeholder());
    Ok(())
}

#[test]
#[serial]
fn test_remove_unknown_page_fails_with_json_body() -> Result<()> {
    let env = TestEnvironment::new()?;

    sitetree_cmd(&env)?
        .args(["remove", "site", "/missing", "--json"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("\"error\""))
        .stdout(predicate::str::contains("/missing"))
        .stderr(predicate::str::contains("not found"));
    Ok(())
}

#[test]
#[serial]
fn test_remove_after_tree_marks_page() -> Result<()> {
    let env = TestEnvironment::new()?;
    env.create_site("site", &SiteFixture::basic())?;

    sitetree_cmd(&env)?.args(["tree", "site"]).assert().success();
    sitetree_cmd(&env)?
        .args(["remove", "site", "/about", "--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("TO_DELETE"));
    Ok(())
}

#[test]
#[serial]
fn test_sweep_with_empty_store() -> Result<()> {
    let env = TestEnvironment::new()?;

    sitetree_cmd(&env)?
        .args(["sweep", "all"])
        .assert()
        .success()
        .stdout(predicate::str::contains("TreeRefresh"))
        .stdout(predicate::str::contains("PromotionSweep"));
    Ok(())
}

#[test]
fn test_invalid_config_reports_error() -> Result<()> {
    let env = TestEnvironment::new()?;
    let mut cmd = sitetree_cmd(&env)?;
    std::fs::write(env.path().join("config.toml"), "base_dir = [unclosed")?;

    cmd.arg("sweep")
        .assert()
        .failure()
        .stderr(predicate::str::contains("error"));
    Ok(())
}
