//! Wiring of the core [`Indexer`] to SQLite and the `git` CLI.

use anyhow::Result;
use blobdex_core::Indexer;

use crate::config::Config;
use crate::db;
use crate::git_cli::CliGitReader;
use crate::sqlite_store::SqliteStore;

/// The indexer used by the CLI and the HTTP server.
pub type AppIndexer = Indexer<SqliteStore, CliGitReader>;

/// Connect to the configured database, ensure the schema, and build an
/// indexer over it.
pub async fn open(config: &Config) -> Result<AppIndexer> {
    let pool = db::open(config).await?;
    Ok(Indexer::new(
        SqliteStore::new(pool),
        CliGitReader::new(&config.git.root),
        config.indexer_options(),
    ))
}
