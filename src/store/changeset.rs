//! Reconciling a parsed tree with persisted pages.
//!
//! [`diff_tree`] is pure: given the tree and the project's current rows it
//! decides what to insert, update and delete. The store applies the result in
//! one transaction.

use std::collections::{HashMap, HashSet};

use crate::models::{PageTree, Webpage, WebpageStatus};

/// Page fields derived from one tree node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageFields {
    /// Page slug
    pub name: String,
    /// Page title
    pub title: Option<String>,
    /// Page description
    pub description: Option<String>,
    /// Copy document link
    pub copy_doc_link: Option<String>,
    /// Name of the parent page, `None` for the root
    pub parent: Option<String>,
}

/// An existing row to rewrite.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageUpdate {
    /// Row id
    pub id: i64,
    /// New field values
    pub fields: PageFields,
    /// Status after the update
    pub status: WebpageStatus,
}

/// Everything one tree requires of the page table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WebpageChangeset {
    /// Pages not yet persisted, parents before children. Inserted as `NEW`.
    pub creates: Vec<PageFields>,
    /// Persisted pages whose fields or status change
    pub updates: Vec<PageUpdate>,
    /// `TO_DELETE` rows whose page no longer exists
    pub deletes: Vec<i64>,
}

impl WebpageChangeset {
    /// Whether applying would change nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.creates.is_empty() && self.updates.is_empty() && self.deletes.is_empty()
    }
}

/// Compare `tree` with a project's `existing` rows.
///
/// - Tree nodes without a row are created.
/// - Rows found in the tree take the tree's fields; `NEW` rows become
///   `AVAILABLE`. Other statuses are left alone, so a page awaiting removal
///   stays `TO_DELETE` while its template still exists.
/// - `TO_DELETE` rows absent from the tree are deleted.
///
/// Rows that already match are left out.
#[must_use]
pub fn diff_tree(tree: &PageTree, existing: &[Webpage]) -> WebpageChangeset {
    let by_name: HashMap<&str, &Webpage> = existing.iter().map(|w| (w.name.as_str(), w)).collect();
    let mut seen: HashSet<&str> = HashSet::new();
    let mut changeset = WebpageChangeset::default();

    for id in tree.preorder() {
        let entry = tree.get(id);
        if !seen.insert(entry.name.as_str()) {
            tracing::warn!(target: "store", page = %entry.name, "duplicate page name in tree, keeping the first");
            continue;
        }
        let fields = PageFields {
            name: entry.name.clone(),
            title: entry.meta.title.clone(),
            description: entry.meta.description.clone(),
            copy_doc_link: entry.meta.copy_doc_link.clone(),
            parent: entry.parent.map(|p| tree.get(p).name.clone()),
        };

        match by_name.get(entry.name.as_str()) {
            None => changeset.creates.push(fields),
            Some(row) => {
                let status = match row.status {
                    WebpageStatus::New => WebpageStatus::Available,
                    other => other,
                };
                let parent_id = fields.parent.as_deref().and_then(|p| by_name.get(p)).map(|w| w.id);
                let unchanged = status == row.status
                    && row.title == fields.title
                    && row.description == fields.description
                    && row.copy_doc_link == fields.copy_doc_link
                    && fields.parent.is_some() == row.parent_id.is_some()
                    && parent_id == row.parent_id;
                if !unchanged {
                    changeset.updates.push(PageUpdate {
                        id: row.id,
                        fields,
                        status,
                    });
                }
            }
        }
    }

    changeset.deletes = existing
        .iter()
        .filter(|w| w.status == WebpageStatus::ToDelete && !seen.contains(w.name.as_str()))
        .map(|w| w.id)
        .collect();

    changeset
}
