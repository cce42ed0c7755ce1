//! `{% extends %}` detection and chain resolution.

use anyhow::Result;
use regex::Regex;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::constants::MAX_EXTENDS_DEPTH;

/// Where an extends chain ends up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainEnd {
    /// Reaches an allow-listed base template
    Base,
    /// Ends at a template that extends nothing
    Unrelated,
    /// Names a template that does not exist (or cannot be read)
    Missing(PathBuf),
    /// Revisits a template already in the chain
    Cycle(PathBuf),
    /// Longer than [`MAX_EXTENDS_DEPTH`]
    TooDeep,
}

/// Finds the template a file extends and follows chains to a base.
#[derive(Debug, Clone)]
pub struct ExtendsResolver {
    pattern: Regex,
    base_templates: Vec<String>,
}

impl ExtendsResolver {
    /// Resolver accepting `base_templates` as chain terminators.
    ///
    /// # Errors
    ///
    /// Only fails if the built-in pattern is invalid.
    pub fn new<I, S>(base_templates: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Ok(Self {
            pattern: Regex::new(r#"\{%-?\s*extends\s+["']([^"']+)["']\s*-?%\}"#)?,
            base_templates: base_templates.into_iter().map(Into::into).collect(),
        })
    }

    /// Target of the first `extends` tag in `source`.
    #[must_use]
    pub fn target(&self, source: &str) -> Option<String> {
        source
            .lines()
            .find_map(|line| self.pattern.captures(line).map(|caps| caps[1].to_string()))
    }

    /// Whether `target` is an allow-listed base template.
    #[must_use]
    pub fn is_base(&self, target: &str) -> bool {
        self.base_templates.iter().any(|base| base == target)
    }

    /// Follow the chain starting at `file`. Targets resolve against `root`
    /// (the templates folder); a leading `/` is ignored.
    #[must_use]
    pub fn resolve(&self, file: &Path, root: &Path) -> ChainEnd {
        let mut visited: HashSet<PathBuf> = HashSet::new();
        let mut current = file.to_path_buf();

        for _ in 0..MAX_EXTENDS_DEPTH {
            if !visited.insert(current.clone()) {
                return ChainEnd::Cycle(current);
            }
            let Some(source) = read_template(&current) else {
                return ChainEnd::Missing(current);
            };
            let Some(target) = self.target(&source) else {
                return ChainEnd::Unrelated;
            };
            if self.is_base(&target) {
                return ChainEnd::Base;
            }
            current = resolve_target(root, &target);
        }
        ChainEnd::TooDeep
    }

    /// `true` when the chain from `file` reaches a base template.
    #[must_use]
    pub fn extends_base(&self, file: &Path, root: &Path) -> bool {
        match self.resolve(file, root) {
            ChainEnd::Base => true,
            ChainEnd::Unrelated => false,
            other => {
                tracing::debug!(
                    target: "parser",
                    file = %file.display(),
                    "extends chain does not terminate at a base template: {other:?}"
                );
                false
            }
        }
    }
}

/// Path of an extends target inside the templates folder.
#[must_use]
pub fn resolve_target(root: &Path, target: &str) -> PathBuf {
    root.join(target.trim_start_matches('/'))
}

/// Template source, lossily decoded. `None` when it cannot be read.
pub(crate) fn read_template(path: &Path) -> Option<String> {
    match std::fs::read(path) {
        Ok(bytes) => Some(String::from_utf8_lossy(&bytes).into_owned()),
        Err(e) => {
            tracing::trace!(target: "parser", path = %path.display(), "cannot read template: {e}");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::BASE_TEMPLATES;
    use tempfile::TempDir;

    fn resolver() -> ExtendsResolver {
        ExtendsResolver::new(BASE_TEMPLATES.iter().copied()).unwrap()
    }

    fn write(root: &Path, rel: &str, content: &str) -> PathBuf {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_target_accepts_both_quote_styles() {
        let r = resolver();
        assert_eq!(r.target("{% extends 'a.html' %}").as_deref(), Some("a.html"));
        assert_eq!(r.target("x\n{% extends \"b.html\" %}\n").as_deref(), Some("b.html"));
        assert_eq!(r.target("{% block title %}{% endblock %}"), None);
    }

    #[test]
    fn test_direct_base() {
        let temp = TempDir::new().unwrap();
        let page = write(temp.path(), "index.html", "{% extends \"templates/base.html\" %}");
        assert_eq!(resolver().resolve(&page, temp.path()), ChainEnd::Base);
    }

    #[test]
    fn test_two_level_chain_reaches_base() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "b.html", "{% extends 'templates/base.html' %}");
        let a = write(temp.path(), "a.html", "{% extends '/b.html' %}");
        assert!(resolver().extends_base(&a, temp.path()));
    }

    #[test]
    fn test_unrelated_and_missing() {
        let temp = TempDir::new().unwrap();
        let plain = write(temp.path(), "plain.html", "<p>hi</p>");
        assert_eq!(resolver().resolve(&plain, temp.path()), ChainEnd::Unrelated);

        let dangling = write(temp.path(), "dangling.html", "{% extends 'nope.html' %}");
        assert!(matches!(resolver().resolve(&dangling, temp.path()), ChainEnd::Missing(_)));
        assert!(!resolver().extends_base(&dangling, temp.path()));
    }

    #[test]
    fn test_cycle_terminates() {
        let temp = TempDir::new().unwrap();
        let a = write(temp.path(), "a.html", "{% extends 'b.html' %}");
        write(temp.path(), "b.html", "{% extends 'a.html' %}");
        assert!(matches!(resolver().resolve(&a, temp.path()), ChainEnd::Cycle(_)));
    }

    #[test]
    fn test_self_extension_is_cycle() {
        let temp = TempDir::new().unwrap();
        let a = write(temp.path(), "a.html", "{% extends 'a.html' %}");
        assert!(!resolver().extends_base(&a, temp.path()));
    }
}
