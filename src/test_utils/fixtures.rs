//! Test fixtures for template folders and site repositories.

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

use super::git_helper::TestGit;

/// Base template every fixture page extends.
pub const BASE_TEMPLATE: &str = "templates/base.html";

/// A template file: where it goes and what it contains.
#[derive(Clone, Debug)]
pub struct TemplateFile {
    /// Path relative to the templates folder
    pub path: String,
    /// File contents
    pub content: String,
}

/// Builder for a templates folder.
#[derive(Clone, Debug, Default)]
pub struct SiteFixture {
    files: Vec<TemplateFile>,
}

impl SiteFixture {
    /// Empty templates folder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Home page plus an `/about` section.
    #[must_use]
    pub fn basic() -> Self {
        Self::new().page("index.html", "Home").page("about/index.html", "About")
    }

    /// A page extending the base template, titled `title`.
    #[must_use]
    pub fn page(self, path: &str, title: &str) -> Self {
        let content = format!("{{% extends \"{BASE_TEMPLATE}\" %}}\n{{% block title %}}{title}{{% endblock %}}\n");
        self.file(path, &content)
    }

    /// A page with a description and a copydoc link.
    #[must_use]
    pub fn documented_page(self, path: &str, title: &str, description: &str, copydoc: &str) -> Self {
        let content = format!(
            "{{% extends \"{BASE_TEMPLATE}\" %}}\n\
             {{% block title %}}{title}{{% endblock %}}\n\
             {{% block meta_description %}}{description}{{% endblock %}}\n\
             {{% block meta_copydoc %}}{copydoc}{{% endblock %}}\n"
        );
        self.file(path, &content)
    }

    /// An arbitrary file.
    #[must_use]
    pub fn file(mut self, path: &str, content: &str) -> Self {
        self.files.retain(|f| f.path != path);
        self.files.push(TemplateFile {
            path: path.to_string(),
            content: content.to_string(),
        });
        self
    }

    /// Files in the fixture.
    #[must_use]
    pub fn files(&self) -> &[TemplateFile] {
        &self.files
    }

    /// Write the files under `templates_dir`, creating it.
    pub fn write_to(&self, templates_dir: &Path) -> Result<()> {
        fs::create_dir_all(templates_dir)?;
        for file in &self.files {
            let path = templates_dir.join(&file.path);
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(&path, &file.content).with_context(|| format!("Failed to write {}", path.display()))?;
        }
        Ok(())
    }

    /// Create a git repository at `repo_dir` holding the fixture under
    /// `templates/`, committed on `branch`. Returns the `file://` URL to clone.
    pub fn create_repo(&self, repo_dir: &Path, branch: &str) -> Result<String> {
        fs::create_dir_all(repo_dir)?;
        let git = TestGit::new(repo_dir);
        git.init_on_branch(branch)?;
        git.config_user()?;
        self.write_to(&repo_dir.join("templates"))?;
        git.add_all()?;
        git.commit("Initial templates")?;
        Ok(file_url(repo_dir))
    }

    /// Add or replace the fixture's files in an existing repository and
    /// commit them on the current branch.
    pub fn commit_to(&self, repo_dir: &Path, message: &str) -> Result<()> {
        self.write_to(&repo_dir.join("templates"))?;
        let git = TestGit::new(repo_dir);
        git.add_all()?;
        git.commit(message)?;
        Ok(())
    }
}

/// `file://` URL of a local repository.
#[must_use]
pub fn file_url(repo_dir: &Path) -> String {
    let path: PathBuf = repo_dir.components().collect();
    format!("file://{}", path.display().to_string().replace('\\', "/"))
}
