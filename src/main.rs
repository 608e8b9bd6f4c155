//! # blobdex CLI (`bdx`)
//!
//! ## Usage
//!
//! ```bash
//! bdx --config ./config/bdx.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `bdx init` | Create the SQLite database and schema |
//! | `bdx sync <org> <project> <repo>` | Index branches and tags of a repository |
//! | `bdx drop-refs <org> <project> <repo> <ref>...` | Remove refs from the index |
//! | `bdx search "<query>"` | Search indexed files |
//! | `bdx serve` | Start the HTTP server |
//!
//! ## Examples
//!
//! ```bash
//! # Index two branches
//! bdx sync acme core api --ref main --ref release/1.2
//!
//! # Search Rust files on main, second page
//! bdx search "parse_config" --ref main --ext .rs --page 2
//!
//! # Forget a deleted branch
//! bdx drop-refs acme core api feature/old
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use blobdex::{config, db, ingest, search, server};
use blobdex_core::search::{SearchFilter, SearchQuery};
use blobdex_core::RepoScope;

/// blobdex: content-addressed source search over git repositories.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file.
#[derive(Parser)]
#[command(name = "bdx", version, about)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/bdx.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Repository coordinates shared by several commands.
#[derive(clap::Args)]
struct RepoArgs {
    organization: String,
    project: String,
    repository: String,
}

impl RepoArgs {
    fn scope(&self) -> RepoScope {
        RepoScope::new(&self.organization, &self.project, &self.repository)
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Safe to run repeatedly.
    Init,

    /// Index refs of a repository under `[git].root`.
    ///
    /// Without `--ref`, every branch and tag is indexed. Files that left a
    /// ref since the last sync lose that ref.
    Sync {
        #[command(flatten)]
        repo: RepoArgs,

        /// Ref to index. Repeatable.
        #[arg(long = "ref")]
        refs: Vec<String>,
    },

    /// Remove refs from every indexed file of a repository.
    DropRefs {
        #[command(flatten)]
        repo: RepoArgs,

        /// Refs to remove.
        #[arg(required = true)]
        refs: Vec<String>,
    },

    /// Search indexed files.
    Search {
        /// Search terms.
        query: String,

        #[arg(long)]
        organization: Option<String>,
        #[arg(long)]
        project: Option<String>,
        #[arg(long)]
        repository: Option<String>,
        /// Only files present in this ref.
        #[arg(long = "ref")]
        reference: Option<String>,
        /// File extension including the dot, e.g. `.rs`.
        #[arg(long)]
        ext: Option<String>,

        /// 1-based page number.
        #[arg(long, default_value_t = 1)]
        page: usize,

        /// Hits per page (defaults to `[search].page_limit`).
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Start the HTTP server on `[server].bind`.
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            let pool = db::open(&cfg).await?;
            pool.close().await;
            println!("Database initialized at {}", cfg.db.path.display());
        }
        Commands::Sync { repo, refs } => {
            ingest::run_sync(&cfg, &repo.scope(), refs).await?;
        }
        Commands::DropRefs { repo, refs } => {
            ingest::run_drop_refs(&cfg, &repo.scope(), refs).await?;
        }
        Commands::Search {
            query,
            organization,
            project,
            repository,
            reference,
            ext,
            page,
            limit,
        } => {
            let query = SearchQuery::new(query)
                .with_page(page)
                .with_limit(limit.unwrap_or(0))
                .with_filter(SearchFilter {
                    organization,
                    project,
                    repository,
                    reference,
                    ext,
                });
            search::run_search(&cfg, query).await?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}
