//! Embedded schema migrations for the shared memory store.

use sqlx::SqlitePool;

use crate::domain::errors::DomainResult;

/// One versioned migration step.
#[derive(Debug, Clone)]
pub struct Migration {
    pub version: i64,
    pub description: &'static str,
    pub sql: &'static str,
}

/// All migrations in order.
pub fn all_migrations() -> Vec<Migration> {
    vec![Migration {
        version: 1,
        description: "shared memory entries",
        sql: r"
            CREATE TABLE IF NOT EXISTS memory_entries (
                id TEXT PRIMARY KEY,
                key TEXT NOT NULL,
                value TEXT NOT NULL,
                metadata TEXT NOT NULL,
                agent_id TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                expires_at TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_memory_entries_key
                ON memory_entries(key, created_at);
            CREATE INDEX IF NOT EXISTS idx_memory_entries_agent
                ON memory_entries(agent_id);
            CREATE INDEX IF NOT EXISTS idx_memory_entries_expires
                ON memory_entries(expires_at);
        ",
    }]
}

/// Apply pending migrations; returns how many ran.
pub async fn run_migrations(pool: &SqlitePool) -> DomainResult<usize> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now')),
            description TEXT
        )",
    )
    .execute(pool)
    .await?;

    let current: (i64,) =
        sqlx::query_as("SELECT COALESCE(MAX(version), 0) FROM schema_migrations")
            .fetch_one(pool)
            .await?;

    let pending: Vec<Migration> = all_migrations()
        .into_iter()
        .filter(|m| m.version > current.0)
        .collect();

    for migration in &pending {
        sqlx::raw_sql(migration.sql).execute(pool).await?;
        sqlx::query("INSERT OR IGNORE INTO schema_migrations (version, description) VALUES (?, ?)")
            .bind(migration.version)
            .bind(migration.description)
            .execute(pool)
            .await?;
    }

    Ok(pending.len())
}
