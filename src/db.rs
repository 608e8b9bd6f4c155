//! SQLite connection pool and schema.
//!
//! `file_index` holds one row per document, keyed by the full
//! `(organization, project, repository, blob, path)` tuple. Refs are stored
//! as a JSON array so `json_each` can filter on membership.
//! `file_index_fts` mirrors the key columns (unindexed) next to the
//! searchable content.

use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use std::time::Duration;

use crate::config::Config;

pub async fn connect(config: &Config) -> Result<SqlitePool> {
    let db_path = &config.db.path;

    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }

    let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", db_path.display()))?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_secs(10));

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    Ok(pool)
}

/// Create tables and indexes. Safe to run repeatedly.
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS file_index (
            organization TEXT NOT NULL,
            project TEXT NOT NULL,
            repository TEXT NOT NULL,
            blob TEXT NOT NULL,
            path TEXT NOT NULL,
            ext TEXT NOT NULL DEFAULT '',
            refs_json TEXT NOT NULL,
            content TEXT NOT NULL,
            PRIMARY KEY (organization, project, repository, blob, path)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // FTS5 CREATE has no IF NOT EXISTS guard for virtual tables in older
    // SQLite builds, so check first.
    let fts_exists: bool = sqlx::query_scalar(
        "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type='table' AND name='file_index_fts'",
    )
    .fetch_one(pool)
    .await?;

    if !fts_exists {
        sqlx::query(
            r#"
            CREATE VIRTUAL TABLE file_index_fts USING fts5(
                organization UNINDEXED,
                project UNINDEXED,
                repository UNINDEXED,
                blob UNINDEXED,
                path UNINDEXED,
                content
            )
            "#,
        )
        .execute(pool)
        .await?;
    }

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_file_index_ext ON file_index(ext)")
        .execute(pool)
        .await?;

    Ok(())
}

/// Connect and make sure the schema exists.
pub async fn open(config: &Config) -> Result<SqlitePool> {
    let pool = connect(config).await?;
    run_migrations(&pool).await?;
    Ok(pool)
}
