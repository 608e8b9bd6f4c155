//! # blobdex core
//!
//! Runtime-agnostic logic for blobdex: the content-addressed file index
//! model, ref-set merging and removal, document identity, batch mutation,
//! search result shaping, and the [`indexer::Indexer`] facade.
//!
//! This crate contains no tokio, sqlx, process spawning, or filesystem I/O.
//! Storage and git access are injected through the [`store::IndexStore`]
//! and [`git::GitRepoReader`] traits.
//!
//! ## Document model
//!
//! A document is identified by `(organization, project, repository, blob,
//! path)`. Refs (branches and tags) are a membership tag on that document,
//! not a version axis: the same blob at the same path under ten branches is
//! one document whose ref set has ten entries. Adding a ref grows the set,
//! removing refs shrinks it, and a document whose set becomes empty is
//! deleted from the store.

pub mod batch;
pub mod error;
pub mod git;
pub mod highlight;
pub mod identity;
pub mod indexer;
pub mod models;
pub mod preview;
pub mod refs;
pub mod search;
pub mod store;

pub use error::IndexError;
pub use identity::{DocId, RepoScope};
pub use indexer::{Indexer, IndexerOptions};
pub use models::{
    ExtFacet, FileIndex, FileIndexOperation, Hit, Metadata, RefFacet, SearchFacets, SearchResult,
    Source, TextPreview,
};
pub use refs::RefSet;
