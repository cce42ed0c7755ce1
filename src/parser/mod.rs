//! Template parser: a templates folder in, a [`PageTree`] out.
//!
//! The walk is recursive and read-only. For each directory:
//!
//! - If `index.html` exists, the template it extends is noted. The index
//!   contributes the directory node's metadata when its own extends chain
//!   reaches a base template.
//! - Other `.html` files become child pages when they extend the same
//!   template as the index, or reach a base template through their own chain.
//!   Files named with a scaffolding prefix (`base`, `_base`) never do. When the
//!   directory has an index that is not a page, none of its files are pages.
//! - A page without a copydoc link inherits the one defined by the template
//!   its directory's index extends.
//! - Subdirectories are attached only if they yield a title or children.
//!
//! Entries are visited in file-name order so that parses are reproducible.
//!
//! Node names are paths relative to the templates folder with `.html` and
//! `/index.html` removed: the root is `/`, `about/index.html` is `/about`,
//! `about/team.html` is `/about/team`.

mod blocks;
mod extends;

pub use blocks::BlockExtractor;
pub use extends::{ChainEnd, ExtendsResolver, resolve_target};

use anyhow::Result;
use std::path::{Component, Path};
use walkdir::WalkDir;

use crate::constants::{BASE_TEMPLATES, TEMPLATE_PREFIXES};
use crate::core::SiteError;
use crate::models::{PageMeta, PageTree};
use extends::read_template;

/// Anything that can turn a templates folder into a tree.
///
/// The orchestrator depends on this rather than on [`TemplateParser`] so that
/// tests can count invocations.
pub trait TreeParser: Send + Sync {
    /// Parse the templates folder at `templates_dir`.
    ///
    /// # Errors
    ///
    /// Returns [`SiteError::TemplatesNotFound`] if the folder does not exist.
    fn parse(&self, templates_dir: &Path) -> Result<PageTree>;
}

/// The template-hierarchy parser.
#[derive(Debug, Clone)]
pub struct TemplateParser {
    blocks: BlockExtractor,
    extends: ExtendsResolver,
    template_prefixes: Vec<String>,
}

impl TemplateParser {
    /// Parser with the built-in base templates and scaffolding prefixes.
    ///
    /// # Errors
    ///
    /// Only fails if a built-in pattern is invalid.
    pub fn new() -> Result<Self> {
        Self::with_templates(BASE_TEMPLATES.iter().copied(), TEMPLATE_PREFIXES.iter().copied())
    }

    /// Parser with custom base templates and scaffolding prefixes.
    ///
    /// # Errors
    ///
    /// Only fails if a built-in pattern is invalid.
    pub fn with_templates<B, P, S, T>(base_templates: B, prefixes: P) -> Result<Self>
    where
        B: IntoIterator<Item = S>,
        S: Into<String>,
        P: IntoIterator<Item = T>,
        T: Into<String>,
    {
        Ok(Self {
            blocks: BlockExtractor::new()?,
            extends: ExtendsResolver::new(base_templates)?,
            template_prefixes: prefixes.into_iter().map(Into::into).collect(),
        })
    }

    /// Parse `root`, the templates folder of a working copy.
    ///
    /// # Errors
    ///
    /// Returns [`SiteError::TemplatesNotFound`] if `root` is not a directory.
    pub fn parse_dir(&self, root: &Path) -> Result<PageTree> {
        if !root.is_dir() {
            return Err(SiteError::TemplatesNotFound {
                path: root.display().to_string(),
            }
            .into());
        }
        let tree = self.scan(root, root);
        tracing::debug!(target: "parser", root = %root.display(), pages = tree.len(), "Parsed template tree");
        Ok(tree)
    }

    fn scan(&self, dir: &Path, root: &Path) -> PageTree {
        let mut tree = PageTree::new(page_name(dir, root, false), PageMeta::default());
        let node = tree.root();

        let index = dir.join("index.html");
        let has_index = index.is_file();
        let mut extended: Option<String> = None;
        let mut index_is_page = false;

        if has_index && let Some(source) = read_template(&index) {
            extended = self.extends.target(&source);
            index_is_page = self.is_page(&index, None, root);
            if index_is_page {
                tree.meta_mut(node).merge(self.blocks.extract_meta(&source));
            }
        }

        // Computed lazily: only needed when some page lacks its own link.
        let mut inherited_link: Option<Option<String>> = None;

        let entries = WalkDir::new(dir).min_depth(1).max_depth(1).sort_by_file_name();
        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!(target: "parser", dir = %dir.display(), "Skipping unreadable entry: {e}");
                    continue;
                }
            };
            let path = entry.path();
            let file_name = entry.file_name().to_string_lossy();
            if file_name.starts_with('.') {
                continue;
            }

            let file_type = entry.file_type();
            if file_type.is_dir() {
                let child = self.scan(path, root);
                let child_root = child.get(child.root());
                if child_root.meta.title.is_some() || !child_root.children.is_empty() {
                    tree.graft(node, child);
                }
                continue;
            }

            if !file_type.is_file() || file_name == "index.html" || !is_html(path) {
                continue;
            }
            if has_index && !index_is_page {
                continue;
            }
            if !self.is_page(path, extended.as_deref(), root) {
                continue;
            }
            let Some(source) = read_template(path) else {
                continue;
            };

            let mut meta = self.blocks.extract_meta(&source);
            if meta.copy_doc_link.is_none()
                && let Some(target) = extended.as_deref()
            {
                meta.copy_doc_link = inherited_link
                    .get_or_insert_with(|| self.inherited_copydoc(target, root))
                    .clone();
            }
            tree.add_child(node, page_name(path, root, true), meta);
        }

        tree
    }

    /// Whether `path` is a navigable page. `index_extends` is the template the
    /// directory's index extends (`None` when judging the index itself).
    fn is_page(&self, path: &Path, index_extends: Option<&str>, root: &Path) -> bool {
        if self.is_template(path) {
            return false;
        }
        if let Some(shared) = index_extends
            && let Some(source) = read_template(path)
            && self.extends.target(&source).as_deref() == Some(shared)
        {
            return true;
        }
        self.extends.extends_base(path, root)
    }

    /// Whether the file name marks template scaffolding.
    #[must_use]
    pub fn is_template(&self, path: &Path) -> bool {
        path.file_name()
            .map(|n| n.to_string_lossy())
            .is_some_and(|name| self.template_prefixes.iter().any(|p| name.starts_with(p.as_str())))
    }

    fn inherited_copydoc(&self, target: &str, root: &Path) -> Option<String> {
        read_template(&resolve_target(root, target))
            .and_then(|source| self.blocks.extract_copydoc(&source))
    }
}

impl TreeParser for TemplateParser {
    fn parse(&self, templates_dir: &Path) -> Result<PageTree> {
        self.parse_dir(templates_dir)
    }
}

fn is_html(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("html"))
}

/// Slug for `path` relative to `root`, always with `/` separators.
fn page_name(path: &Path, root: &Path, is_file: bool) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path);
    let mut parts: Vec<String> = rel
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();

    if is_file && let Some(last) = parts.last_mut() {
        let lower = last.to_ascii_lowercase();
        if lower.ends_with(".html") {
            last.truncate(last.len() - ".html".len());
        }
        if last == "index" {
            parts.pop();
        }
    }
    format!("/{}", parts.join("/"))
}
