//! Extraction of named template blocks.
//!
//! This is not a template engine. It finds `{% block name %} ... {% endblock %}`
//! by scanning lines, flattens the body onto one line, and collapses
//! conditionals to a single static string.

use anyhow::Result;
use regex::Regex;

use crate::models::PageMeta;

/// Block names tried, in order, for each metadata field.
const TITLE_BLOCKS: &[&str] = &["title"];
const DESCRIPTION_BLOCKS: &[&str] = &["meta_description", "description"];
const COPYDOC_BLOCKS: &[&str] = &["meta_copydoc"];

/// Compiled patterns for block extraction.
#[derive(Debug, Clone)]
pub struct BlockExtractor {
    openers: Vec<(&'static str, Regex)>,
    endblock: Regex,
    if_open: Regex,
    endif: Regex,
    else_marker: Regex,
}

impl BlockExtractor {
    /// Compile the patterns.
    ///
    /// # Errors
    ///
    /// Only fails if a built-in pattern is invalid.
    pub fn new() -> Result<Self> {
        let openers = TITLE_BLOCKS
            .iter()
            .chain(DESCRIPTION_BLOCKS)
            .chain(COPYDOC_BLOCKS)
            .map(|&name| -> Result<(&'static str, Regex)> {
                let pattern = format!(r"\{{%-?\s*block\s+{}\s*-?%\}}", regex::escape(name));
                Ok((name, Regex::new(&pattern)?))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            openers,
            endblock: Regex::new(r"\{%-?\s*endblock\b")?,
            if_open: Regex::new(r"\{%-?\s*if\s[^%]*?-?%\}")?,
            endif: Regex::new(r"\{%-?\s*endif\s*-?%\}")?,
            else_marker: Regex::new(r"\{%-?\s*(?:else|elif)\b")?,
        })
    }

    /// Extract title, description and copydoc link from template source.
    ///
    /// Missing or unterminated blocks leave the field `None`.
    #[must_use]
    pub fn extract_meta(&self, source: &str) -> PageMeta {
        PageMeta {
            title: self.first_block(source, TITLE_BLOCKS),
            description: self.first_block(source, DESCRIPTION_BLOCKS),
            copy_doc_link: self.first_block(source, COPYDOC_BLOCKS),
        }
    }

    /// Body of the `meta_copydoc` block, used when a page inherits its link
    /// from the template its directory's index extends.
    #[must_use]
    pub fn extract_copydoc(&self, source: &str) -> Option<String> {
        self.first_block(source, COPYDOC_BLOCKS)
    }

    fn first_block(&self, source: &str, names: &[&str]) -> Option<String> {
        names.iter().find_map(|name| self.extract_block(source, name))
    }

    /// Body of block `name`, flattened and with conditionals resolved.
    ///
    /// Scans line by line: buffering starts at the opening tag and stops at
    /// the first line that closes the block. Only the metadata block names
    /// are known.
    #[must_use]
    pub fn extract_block(&self, source: &str, name: &str) -> Option<String> {
        let open = self.openers.iter().find(|(n, _)| *n == name).map(|(_, re)| re)?;
        let mut buffer: Option<String> = None;

        for line in source.lines() {
            match buffer.as_mut() {
                Some(buf) => {
                    buf.push_str("  ");
                    buf.push_str(line);
                }
                None => match open.find(line) {
                    Some(m) => buffer = Some(line[m.end()..].to_string()),
                    None => continue,
                },
            }

            if let Some(buf) = buffer.as_deref()
                && let Some(end) = self.endblock.find(buf)
            {
                return Some(self.clean_body(&buf[..end.start()]));
            }
        }

        tracing::trace!(target: "parser", block = name, "block missing or unterminated");
        None
    }

    fn clean_body(&self, body: &str) -> String {
        let body = body.trim();
        if body.contains("{%") {
            self.resolve_conditionals(body).trim().to_string()
        } else {
            body.to_string()
        }
    }

    /// Collapse `{% if %}` blocks to static text.
    ///
    /// A conditional with an `else` (or `elif`) branch becomes its first
    /// branch. A conditional without one is optional decoration and is dropped.
    /// Nested conditionals are collapsed innermost first.
    ///
    /// ```rust
    /// use sitetree::parser::BlockExtractor;
    ///
    /// let blocks = BlockExtractor::new().unwrap();
    /// assert_eq!(
    ///     blocks.resolve_conditionals("Search results{% if query %} for '{{ query }}'{% endif %}"),
    ///     "Search results"
    /// );
    /// assert_eq!(blocks.resolve_conditionals("{% if x %}A{% else %}B{% endif %}"), "A");
    /// ```
    #[must_use]
    pub fn resolve_conditionals(&self, text: &str) -> String {
        let mut current = text.to_string();
        // The innermost conditional is the last opener before the first endif.
        while let Some(close) = self.endif.find(&current)
            && let Some(open) = self.if_open.find_iter(&current[..close.start()]).last()
        {
            let inner = &current[open.end()..close.start()];
            let kept = self.else_marker.find(inner).map_or("", |m| &inner[..m.start()]);
            current = format!("{}{kept}{}", &current[..open.start()], &current[close.end()..]);
        }
        current
    }
}
