//! Page trees.
//!
//! Two shapes of the same data:
//!
//! - [`PageTree`] is an arena: nodes live in a vector, children are index
//!   lists. The parser builds it and the store diffs against it.
//! - [`PageNode`] is the nested, JSON-serializable shape handed to callers and
//!   written to the cache: `{ name, title, description, copyDocLink, children }`.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Index of a node inside a [`PageTree`].
pub type NodeId = usize;

/// Metadata extracted from a page's template blocks.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageMeta {
    /// `title` block
    pub title: Option<String>,
    /// `meta_description` or `description` block
    pub description: Option<String>,
    /// `meta_copydoc` block, possibly inherited
    pub copy_doc_link: Option<String>,
}

impl PageMeta {
    /// Overwrite fields that `other` defines, keeping the rest.
    pub fn merge(&mut self, other: Self) {
        if other.title.is_some() {
            self.title = other.title;
        }
        if other.description.is_some() {
            self.description = other.description;
        }
        if other.copy_doc_link.is_some() {
            self.copy_doc_link = other.copy_doc_link;
        }
    }
}

/// One node of the arena.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageEntry {
    /// Slug derived from the path relative to the templates root
    pub name: String,
    /// Extracted metadata
    pub meta: PageMeta,
    /// Parent node, `None` only for the root
    pub parent: Option<NodeId>,
    /// Child nodes in insertion order
    pub children: Vec<NodeId>,
}

/// Arena-allocated page tree. Node `0` is always the root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageTree {
    nodes: Vec<PageEntry>,
}

impl PageTree {
    /// Tree holding only a root.
    #[must_use]
    pub fn new(root_name: impl Into<String>, meta: PageMeta) -> Self {
        Self {
            nodes: vec![PageEntry {
                name: root_name.into(),
                meta,
                parent: None,
                children: Vec::new(),
            }],
        }
    }

    /// The root id.
    #[must_use]
    pub const fn root(&self) -> NodeId {
        0
    }

    /// Node by id.
    ///
    /// # Panics
    ///
    /// Panics if `id` did not come from this tree.
    #[must_use]
    pub fn get(&self, id: NodeId) -> &PageEntry {
        &self.nodes[id]
    }

    /// Mutable metadata of a node.
    ///
    /// # Panics
    ///
    /// Panics if `id` did not come from this tree.
    pub fn meta_mut(&mut self, id: NodeId) -> &mut PageMeta {
        &mut self.nodes[id].meta
    }

    /// Number of nodes, root included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the arena holds no nodes. A tree built with [`Self::new`] never is.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Append a leaf under `parent`.
    pub fn add_child(&mut self, parent: NodeId, name: impl Into<String>, meta: PageMeta) -> NodeId {
        let id = self.nodes.len();
        self.nodes.push(PageEntry {
            name: name.into(),
            meta,
            parent: Some(parent),
            children: Vec::new(),
        });
        self.nodes[parent].children.push(id);
        id
    }

    /// Move every node of `subtree` under `parent`, preserving its shape.
    /// Returns the id the subtree's root received.
    pub fn graft(&mut self, parent: NodeId, subtree: Self) -> NodeId {
        let offset = self.nodes.len();
        for (index, mut entry) in subtree.nodes.into_iter().enumerate() {
            entry.parent = if index == 0 { Some(parent) } else { entry.parent.map(|p| p + offset) };
            entry.children.iter_mut().for_each(|c| *c += offset);
            self.nodes.push(entry);
        }
        self.nodes[parent].children.push(offset);
        offset
    }

    /// Node ids in pre-order: every parent precedes its children.
    #[must_use]
    pub fn preorder(&self) -> Vec<NodeId> {
        let mut order = Vec::with_capacity(self.nodes.len());
        let mut stack = vec![self.root()];
        while let Some(id) = stack.pop() {
            order.push(id);
            stack.extend(self.nodes[id].children.iter().rev());
        }
        order
    }

    /// Every node name in the tree.
    #[must_use]
    pub fn names(&self) -> HashSet<String> {
        self.nodes.iter().map(|n| n.name.clone()).collect()
    }

    /// Nested form of the tree.
    #[must_use]
    pub fn to_node(&self) -> PageNode {
        self.node_at(self.root())
    }

    fn node_at(&self, id: NodeId) -> PageNode {
        let entry = &self.nodes[id];
        PageNode {
            name: entry.name.clone(),
            title: entry.meta.title.clone(),
            description: entry.meta.description.clone(),
            copy_doc_link: entry.meta.copy_doc_link.clone(),
            children: entry.children.iter().map(|&c| self.node_at(c)).collect(),
        }
    }
}

/// Nested page tree as served to callers and stored in the cache.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageNode {
    /// Page slug
    pub name: String,
    /// Page title
    pub title: Option<String>,
    /// Page description
    pub description: Option<String>,
    /// Link to the page's copy document
    #[serde(rename = "copyDocLink")]
    pub copy_doc_link: Option<String>,
    /// Child pages
    #[serde(default)]
    pub children: Vec<PageNode>,
}

impl PageNode {
    /// Fallback returned when no tree could be produced: same shape, blank strings.
    #[must_use]
    pub fn placeholder() -> Self {
        Self {
            name: String::new(),
            title: Some(String::new()),
            description: Some(String::new()),
            copy_doc_link: Some(String::new()),
            children: Vec::new(),
        }
    }

    /// Whether this is the blank fallback tree.
    #[must_use]
    pub fn is_placeholder(&self) -> bool {
        *self == Self::placeholder()
    }

    /// Every name in the tree, this node included.
    #[must_use]
    pub fn names(&self) -> HashSet<String> {
        let mut names = HashSet::new();
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            names.insert(node.name.clone());
            stack.extend(node.children.iter());
        }
        names
    }
}

/// Response body for tree requests: `{ "name": <repository>, "templates": <tree> }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeResponse {
    /// Repository URI
    pub name: String,
    /// The page tree
    pub templates: PageNode,
}
