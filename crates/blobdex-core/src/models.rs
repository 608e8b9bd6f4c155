//! Core data models exchanged between the indexer, stores, and clients.
//!
//! Field names serialize to the wire shape clients expect (`_source`,
//! `isLastPage`, `fileIndex`).

use serde::{Deserialize, Serialize};

use crate::identity::{DocId, RepoScope};
use crate::refs::RefSet;

/// Scope, location, and ref membership of an indexed file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    pub organization: String,
    pub project: String,
    pub repository: String,
    pub refs: RefSet,
    pub path: String,
    #[serde(default)]
    pub ext: String,
}

impl Metadata {
    pub fn scope(&self) -> RepoScope {
        RepoScope::new(&self.organization, &self.project, &self.repository)
    }
}

/// One indexed document: a blob at a path, with the refs that contain it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileIndex {
    pub blob: String,
    pub metadata: Metadata,
    #[serde(default)]
    pub content: String,
}

impl FileIndex {
    /// A document holding exactly one ref. The extension is left empty
    /// until [`fill_file_ext`](crate::identity::fill_file_ext) runs.
    pub fn new(
        scope: &RepoScope,
        blob: impl Into<String>,
        reference: impl Into<String>,
        path: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            blob: blob.into(),
            content: content.into(),
            metadata: Metadata {
                organization: scope.organization.clone(),
                project: scope.project.clone(),
                repository: scope.repository.clone(),
                refs: RefSet::single(reference),
                path: path.into(),
                ext: String::new(),
            },
        }
    }

    pub fn doc_id(&self) -> DocId {
        DocId::of(self)
    }

    pub fn source(&self) -> Source {
        Source {
            blob: self.blob.clone(),
            metadata: self.metadata.clone(),
        }
    }
}

/// A single mutation in a [`batch_file_index`](crate::indexer::Indexer::batch_file_index) call.
///
/// Serialized as `{"method": "ADD" | "DELETE", "fileIndex": {...}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", content = "fileIndex", rename_all = "UPPERCASE")]
pub enum FileIndexOperation {
    /// Merge the file's refs into the document, creating it if needed.
    Add(FileIndex),
    /// Remove the file's refs from the document, deleting it once empty.
    Delete(FileIndex),
}

impl FileIndexOperation {
    pub fn file_index(&self) -> &FileIndex {
        match self {
            FileIndexOperation::Add(f) | FileIndexOperation::Delete(f) => f,
        }
    }

    pub fn kind(&self) -> OperationKind {
        match self {
            FileIndexOperation::Add(_) => OperationKind::Add,
            FileIndexOperation::Delete(_) => OperationKind::Delete,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OperationKind {
    Add,
    Delete,
}

/// Stored fields of a hit, without the content body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    pub blob: String,
    pub metadata: Metadata,
}

/// A window of lines around one or more matches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextPreview {
    /// 1-based line number of the first line in `preview`.
    pub offset: usize,
    pub preview: String,
    /// 1-based line numbers of the matching lines inside the window.
    pub hits: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hit {
    #[serde(rename = "_source")]
    pub source: Source,
    pub preview: Vec<TextPreview>,
}

/// One page of search hits plus pagination state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    /// Elapsed seconds.
    pub time: f64,
    /// Total number of matching documents across all pages.
    pub size: u64,
    pub limit: usize,
    #[serde(rename = "isLastPage")]
    pub is_last_page: bool,
    pub current: usize,
    pub next: usize,
    pub hits: Vec<Hit>,
    /// Distinct matched words across every hit on this page.
    #[serde(default)]
    pub words: Vec<String>,
    /// Counts over every matching document, not just this page.
    #[serde(default)]
    pub facets: SearchFacets,
}

/// Number of matching documents sharing one extension.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtFacet {
    pub ext: String,
    pub count: u64,
}

/// Number of matching documents contained in one ref of one repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefFacet {
    pub organization: String,
    pub project: String,
    pub repository: String,
    #[serde(rename = "ref")]
    pub reference: String,
    pub count: u64,
}

/// Aggregations clients offer as filters, largest count first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchFacets {
    pub ext: Vec<ExtFacet>,
    #[serde(rename = "fullRefs")]
    pub full_refs: Vec<RefFacet>,
}
