//! # blobdex
//!
//! Content-addressed source search over git repositories.
//!
//! Every file is indexed once per `(organization, project, repository,
//! blob, path)`; the branches and tags containing it are a ref set on that
//! single document. Syncing a ref merges it into the documents of its tree,
//! dropping a ref removes it, and a document left without refs is deleted.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌──────────────┐   ┌──────────┐
//! │  git CLI    │──▶│   Indexer    │──▶│  SQLite  │
//! │ ls-tree/cat │   │ merge/remove │   │   FTS5   │
//! └─────────────┘   └──────┬───────┘   └──────────┘
//!                          │
//!                ┌─────────┴─────────┐
//!                ▼                   ▼
//!           ┌──────────┐       ┌──────────┐
//!           │   CLI    │       │   HTTP   │
//!           │  (bdx)   │       │  (axum)  │
//!           └──────────┘       └──────────┘
//! ```
//!
//! The indexing rules live in `blobdex-core`; this crate supplies the
//! SQLite store, the git reader, and the two front ends.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`db`] | Connection pool and schema |
//! | [`sqlite_store`] | `IndexStore` over SQLite FTS5 |
//! | [`git_cli`] | `GitRepoReader` over the `git` command |
//! | [`indexer`] | Wiring of store and git reader |
//! | [`ingest`] | Ref sync and ref drop |
//! | [`search`] | CLI search output |
//! | [`server`] | HTTP API |

pub mod config;
pub mod db;
pub mod git_cli;
pub mod indexer;
pub mod ingest;
pub mod search;
pub mod server;
pub mod sqlite_store;
