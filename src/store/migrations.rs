//! Embedded schema migrations.

use futures::future::BoxFuture;
use sqlx::error::BoxDynError;
use sqlx::migrate::{Migration as SqlxMigration, MigrationSource, MigrationType, Migrator};

/// One forward-only schema step.
#[derive(Debug, Clone, Copy)]
pub struct Migration {
    pub version: i64,
    pub description: &'static str,
    pub sql: &'static str,
}

/// Ordered schema history.
pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "create_projects_and_webpages",
        sql: "\
            CREATE TABLE projects (\
                id INTEGER PRIMARY KEY AUTOINCREMENT, \
                name TEXT NOT NULL UNIQUE, \
                created_at TEXT NOT NULL, \
                updated_at TEXT NOT NULL\
            ); \
            CREATE TABLE webpages (\
                id INTEGER PRIMARY KEY AUTOINCREMENT, \
                project_id INTEGER NOT NULL REFERENCES projects(id) ON DELETE CASCADE, \
                name TEXT NOT NULL, \
                url TEXT NOT NULL, \
                title TEXT, \
                description TEXT, \
                copy_doc_link TEXT, \
                parent_id INTEGER REFERENCES webpages(id) ON DELETE SET NULL, \
                owner_id INTEGER, \
                status TEXT NOT NULL DEFAULT 'NEW' CHECK (status IN ('NEW', 'AVAILABLE', 'TO_DELETE')), \
                created_at TEXT NOT NULL, \
                updated_at TEXT NOT NULL, \
                UNIQUE (project_id, name)\
            );",
    },
    Migration {
        version: 2,
        description: "index_webpages_status",
        sql: "CREATE INDEX idx_webpages_status ON webpages (status, project_id);",
    },
];

#[derive(Debug, Clone)]
struct MigrationList(&'static [Migration]);

impl MigrationSource<'static> for MigrationList {
    fn resolve(self) -> BoxFuture<'static, Result<Vec<SqlxMigration>, BoxDynError>> {
        Box::pin(async move {
            Ok(self
                .0
                .iter()
                .map(|m| {
                    SqlxMigration::new(m.version, m.description.into(), MigrationType::Simple, m.sql.into(), false)
                })
                .collect())
        })
    }
}

/// Migrator over [`MIGRATIONS`].
///
/// # Errors
///
/// Fails if the migration list cannot be resolved.
pub async fn migrator() -> Result<Migrator, sqlx::migrate::MigrateError> {
    Migrator::new(MigrationList(MIGRATIONS)).await
}
