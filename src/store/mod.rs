//! Persisted page table.
//!
//! SQLite through `sqlx`: one `projects` row per repository and one
//! `webpages` row per page. The orchestrator is the only writer of page
//! fields; the reconciliation sweeps are the only agents that change a
//! page's status without a user asking.
//!
//! All methods return [`SiteError`] directly, so database failures arrive at
//! the orchestrator already classified as [`SiteError::DatabaseError`].

mod changeset;
mod migrations;

pub use changeset::{PageFields, PageUpdate, WebpageChangeset, diff_tree};
pub use migrations::{MIGRATIONS, Migration};

use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use crate::constants::DEFAULT_PROJECT_NAME;
use crate::core::SiteError;
use crate::models::{PageTree, Project, Webpage, WebpageStatus};

type StoreResult<T> = std::result::Result<T, SiteError>;

const WEBPAGE_COLUMNS: &str =
    "id, project_id, name, url, title, description, copy_doc_link, parent_id, owner_id, status";

#[derive(Debug, sqlx::FromRow)]
struct WebpageRow {
    id: i64,
    project_id: i64,
    name: String,
    url: String,
    title: Option<String>,
    description: Option<String>,
    copy_doc_link: Option<String>,
    parent_id: Option<i64>,
    owner_id: Option<i64>,
    status: String,
}

impl TryFrom<WebpageRow> for Webpage {
    type Error = SiteError;

    fn try_from(row: WebpageRow) -> StoreResult<Self> {
        Ok(Self {
            id: row.id,
            project_id: row.project_id,
            name: row.name,
            url: row.url,
            title: row.title,
            description: row.description,
            copy_doc_link: row.copy_doc_link,
            parent_id: row.parent_id,
            owner_id: row.owner_id,
            status: row.status.parse()?,
        })
    }
}

fn now() -> String {
    Utc::now().to_rfc3339()
}

/// Handle on the page database.
#[derive(Debug, Clone)]
pub struct PageStore {
    pool: SqlitePool,
}

impl PageStore {
    /// Open (creating if needed) the database at `path` and migrate it.
    ///
    /// # Errors
    ///
    /// Returns [`SiteError::DatabaseError`] if the file cannot be opened or a
    /// migration fails.
    pub async fn open(path: &Path) -> StoreResult<Self> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(5));
        let pool = SqlitePoolOptions::new().max_connections(4).connect_with(options).await?;

        tracing::debug!(target: "store", path = %path.display(), "database opened");
        Self::init(pool).await
    }

    /// Private in-memory database, for tests and dry runs.
    ///
    /// # Errors
    ///
    /// Returns [`SiteError::DatabaseError`] if a migration fails.
    pub async fn in_memory() -> StoreResult<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
        // Each connection to :memory: is its own database, so keep exactly one alive.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;
        Self::init(pool).await
    }

    async fn init(pool: SqlitePool) -> StoreResult<Self> {
        migrations::migrator().await?.run(&pool).await?;
        let store = Self { pool };
        store.get_or_create_project(DEFAULT_PROJECT_NAME).await?;
        Ok(store)
    }

    /// The underlying pool.
    #[must_use]
    pub const fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Project named `name`, created if missing.
    ///
    /// # Errors
    ///
    /// Returns [`SiteError::DatabaseError`] on query failure.
    pub async fn get_or_create_project(&self, name: &str) -> StoreResult<Project> {
        let stamp = now();
        sqlx::query(
            "INSERT INTO projects (name, created_at, updated_at) VALUES (?, ?, ?) ON CONFLICT(name) DO NOTHING",
        )
        .bind(name)
        .bind(&stamp)
        .bind(&stamp)
        .execute(&self.pool)
        .await?;

        self.find_project(name).await?.ok_or_else(|| SiteError::DatabaseError {
            operation: "create project".to_string(),
            reason: format!("project '{name}' missing after insert"),
        })
    }

    /// Project named `name`, if any.
    ///
    /// # Errors
    ///
    /// Returns [`SiteError::DatabaseError`] on query failure.
    pub async fn find_project(&self, name: &str) -> StoreResult<Option<Project>> {
        let row: Option<(i64, String)> = sqlx::query_as("SELECT id, name FROM projects WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|(id, name)| Project { id, name }))
    }

    /// Every project, by id.
    ///
    /// # Errors
    ///
    /// Returns [`SiteError::DatabaseError`] on query failure.
    pub async fn list_projects(&self) -> StoreResult<Vec<Project>> {
        let rows: Vec<(i64, String)> =
            sqlx::query_as("SELECT id, name FROM projects ORDER BY id").fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(|(id, name)| Project { id, name }).collect())
    }

    /// All pages of a project, by id.
    ///
    /// # Errors
    ///
    /// Returns [`SiteError::DatabaseError`] on query failure or an unknown status.
    pub async fn list_webpages(&self, project_id: i64) -> StoreResult<Vec<Webpage>> {
        let sql = format!("SELECT {WEBPAGE_COLUMNS} FROM webpages WHERE project_id = ? ORDER BY id");
        sqlx::query_as::<_, WebpageRow>(&sql)
            .bind(project_id)
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(Webpage::try_from)
            .collect()
    }

    /// One page by project and name.
    ///
    /// # Errors
    ///
    /// Returns [`SiteError::DatabaseError`] on query failure.
    pub async fn find_webpage(&self, project_id: i64, name: &str) -> StoreResult<Option<Webpage>> {
        let sql = format!("SELECT {WEBPAGE_COLUMNS} FROM webpages WHERE project_id = ? AND name = ?");
        sqlx::query_as::<_, WebpageRow>(&sql)
            .bind(project_id)
            .bind(name)
            .fetch_optional(&self.pool)
            .await?
            .map(Webpage::try_from)
            .transpose()
    }

    /// Pages in `status`, grouped by project. Projects without such pages are
    /// omitted.
    ///
    /// # Errors
    ///
    /// Returns [`SiteError::DatabaseError`] on query failure.
    pub async fn pages_by_project(&self, status: WebpageStatus) -> StoreResult<Vec<(Project, Vec<Webpage>)>> {
        let sql = format!("SELECT {WEBPAGE_COLUMNS} FROM webpages WHERE status = ? ORDER BY project_id, id");
        let pages = sqlx::query_as::<_, WebpageRow>(&sql)
            .bind(status.as_str())
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(Webpage::try_from)
            .collect::<StoreResult<Vec<_>>>()?;

        let mut grouped: BTreeMap<i64, Vec<Webpage>> = BTreeMap::new();
        for page in pages {
            grouped.entry(page.project_id).or_default().push(page);
        }

        let projects: HashMap<i64, Project> =
            self.list_projects().await?.into_iter().map(|p| (p.id, p)).collect();
        Ok(grouped
            .into_iter()
            .filter_map(|(id, pages)| projects.get(&id).cloned().map(|p| (p, pages)))
            .collect())
    }

    /// Insert a single page. Used for pages created outside a tree walk.
    ///
    /// # Errors
    ///
    /// Returns [`SiteError::DatabaseError`] on query failure, including a
    /// duplicate name within the project.
    pub async fn insert_webpage(
        &self,
        project_id: i64,
        name: &str,
        parent_id: Option<i64>,
        status: WebpageStatus,
    ) -> StoreResult<Webpage> {
        let stamp = now();
        let id = sqlx::query(
            "INSERT INTO webpages (project_id, name, url, parent_id, status, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(project_id)
        .bind(name)
        .bind(name)
        .bind(parent_id)
        .bind(status.as_str())
        .bind(&stamp)
        .bind(&stamp)
        .execute(&self.pool)
        .await?
        .last_insert_rowid();

        Ok(Webpage {
            id,
            project_id,
            name: name.to_string(),
            url: name.to_string(),
            title: None,
            description: None,
            copy_doc_link: None,
            parent_id,
            owner_id: None,
            status,
        })
    }

    /// Set a page's status.
    ///
    /// # Errors
    ///
    /// Returns [`SiteError::DatabaseError`] on query failure.
    pub async fn update_status(&self, id: i64, status: WebpageStatus) -> StoreResult<()> {
        sqlx::query("UPDATE webpages SET status = ?, updated_at = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(now())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Delete a page row. Children keep existing with no parent.
    ///
    /// # Errors
    ///
    /// Returns [`SiteError::DatabaseError`] on query failure.
    pub async fn delete_webpage(&self, id: i64) -> StoreResult<()> {
        sqlx::query("DELETE FROM webpages WHERE id = ?").bind(id).execute(&self.pool).await?;
        Ok(())
    }

    /// Ask for a page to be removed: it becomes `TO_DELETE` and is deleted by
    /// reconciliation once its template is gone.
    ///
    /// # Errors
    ///
    /// Returns [`SiteError::PageNotFound`] if the project or page does not
    /// exist, or [`SiteError::DatabaseError`] on query failure.
    pub async fn request_removal(&self, project: &str, page: &str) -> StoreResult<Webpage> {
        let not_found = || SiteError::PageNotFound {
            project: project.to_string(),
            page: page.to_string(),
        };
        let found = self.find_project(project).await?.ok_or_else(not_found)?;
        let updated = sqlx::query("UPDATE webpages SET status = ?, updated_at = ? WHERE project_id = ? AND name = ?")
            .bind(WebpageStatus::ToDelete.as_str())
            .bind(now())
            .bind(found.id)
            .bind(page)
            .execute(&self.pool)
            .await?
            .rows_affected();
        if updated == 0 {
            return Err(not_found());
        }

        tracing::info!(target: "store", project, page, "removal requested");
        self.find_webpage(found.id, page).await?.ok_or_else(not_found)
    }

    /// Reconcile the pages of `project` with a freshly parsed `tree`.
    ///
    /// # Errors
    ///
    /// Returns [`SiteError::DatabaseError`] if any write fails; nothing is
    /// committed in that case.
    pub async fn create_webpages_for_tree(&self, project: &Project, tree: &PageTree) -> StoreResult<WebpageChangeset> {
        let existing = self.list_webpages(project.id).await?;
        let changeset = diff_tree(tree, &existing);
        if changeset.is_empty() {
            tracing::debug!(target: "store", project = %project.name, "pages already up to date");
        } else {
            self.apply_changeset(project.id, &existing, &changeset).await?;
        }
        Ok(changeset)
    }

    /// Apply `changeset` to `project_id` in one transaction. `existing` must be
    /// the rows the changeset was computed from.
    ///
    /// Status changes are conditional on the row's current status: only a
    /// `NEW` row is promoted and only a `TO_DELETE` row is deleted, so a
    /// removal requested after `existing` was read is never overwritten.
    ///
    /// # Errors
    ///
    /// Returns [`SiteError::DatabaseError`] if any statement fails; the
    /// transaction is rolled back.
    pub async fn apply_changeset(
        &self,
        project_id: i64,
        existing: &[Webpage],
        changeset: &WebpageChangeset,
    ) -> StoreResult<()> {
        let mut ids: HashMap<String, i64> = existing.iter().map(|w| (w.name.clone(), w.id)).collect();
        let stamp = now();
        let mut tx = self.pool.begin().await?;

        for page in &changeset.creates {
            let parent_id = page.parent.as_ref().and_then(|p| ids.get(p)).copied();
            let id = sqlx::query(
                "INSERT INTO webpages \
                 (project_id, name, url, title, description, copy_doc_link, parent_id, status, created_at, updated_at) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(project_id)
            .bind(&page.name)
            .bind(&page.name)
            .bind(&page.title)
            .bind(&page.description)
            .bind(&page.copy_doc_link)
            .bind(parent_id)
            .bind(WebpageStatus::New.as_str())
            .bind(&stamp)
            .bind(&stamp)
            .execute(&mut *tx)
            .await?
            .last_insert_rowid();
            ids.insert(page.name.clone(), id);
        }

        for update in &changeset.updates {
            let parent_id = update.fields.parent.as_ref().and_then(|p| ids.get(p)).copied();
            sqlx::query(
                "UPDATE webpages SET title = ?, description = ?, copy_doc_link = ?, parent_id = ?, \
                 status = CASE WHEN status = ? THEN ? ELSE status END, updated_at = ? WHERE id = ?",
            )
            .bind(&update.fields.title)
            .bind(&update.fields.description)
            .bind(&update.fields.copy_doc_link)
            .bind(parent_id)
            .bind(WebpageStatus::New.as_str())
            .bind(update.status.as_str())
            .bind(&stamp)
            .bind(update.id)
            .execute(&mut *tx)
            .await?;
        }

        for id in &changeset.deletes {
            sqlx::query("DELETE FROM webpages WHERE id = ? AND status = ?")
                .bind(id)
                .bind(WebpageStatus::ToDelete.as_str())
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        tracing::info!(
            target: "store",
            project_id,
            created = changeset.creates.len(),
            updated = changeset.updates.len(),
            deleted = changeset.deletes.len(),
            "pages reconciled"
        );
        Ok(())
    }
}
