//! The indexing facade.
//!
//! [`Indexer`] composes the ref merge/removal rules, batch application, and
//! result shaping over an injected [`IndexStore`] and [`GitRepoReader`].
//! It holds no global state: construct one per backend and share it.
//!
//! | Method | Purpose |
//! |--------|---------|
//! | [`create_file_index`](Indexer::create_file_index) | Write a document as given, replacing any previous version |
//! | [`upsert_file_index`](Indexer::upsert_file_index) | Create, or merge refs into, a document |
//! | [`batch_file_index`](Indexer::batch_file_index) | Apply ADD/DELETE operations |
//! | [`delete_index_by_refs`](Indexer::delete_index_by_refs) | Remove refs across a repository |
//! | [`search_query`](Indexer::search_query) | One page of highlighted hits |

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use futures::future::join_all;
use tracing::{debug, info, warn};

use crate::batch::{self, BatchReport, DocLocks, OperationResult, OperationStatus};
use crate::error::{IndexError, Result};
use crate::git::{GitRepo, GitRepoReader};
use crate::identity::{fill_file_ext, RepoScope};
use crate::models::{FileIndex, FileIndexOperation, OperationKind, SearchResult};
use crate::preview::PreviewParams;
use crate::search::{empty_result, shape_results, SearchQuery};
use crate::store::{IndexStore, RawSearchResponse};

/// Tuning for an [`Indexer`].
#[derive(Debug, Clone)]
pub struct IndexerOptions {
    /// Page size used when a query does not set one.
    pub page_limit: usize,
    /// Upper bound on any requested page size.
    pub max_limit: usize,
    pub preview: PreviewParams,
    /// Number of per-document lock stripes.
    pub lock_stripes: usize,
}

impl Default for IndexerOptions {
    fn default() -> Self {
        Self {
            page_limit: 20,
            max_limit: 100,
            preview: PreviewParams::default(),
            lock_stripes: 64,
        }
    }
}

pub struct Indexer<S, G> {
    store: S,
    git: G,
    options: IndexerOptions,
    locks: DocLocks,
}

impl<S: IndexStore, G: GitRepoReader> Indexer<S, G> {
    pub fn new(store: S, git: G, options: IndexerOptions) -> Self {
        let locks = DocLocks::new(options.lock_stripes);
        Self {
            store,
            git,
            options,
            locks,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn git(&self) -> &G {
        &self.git
    }

    pub fn options(&self) -> &IndexerOptions {
        &self.options
    }

    /// Persist `file` as a fresh document, overwriting whatever was stored
    /// under the same key.
    ///
    /// Fails with [`IndexError::NoRefs`] when `file` carries no refs.
    pub async fn create_file_index(&self, mut file: FileIndex) -> Result<()> {
        let id = file.doc_id();
        if file.metadata.refs.is_empty() {
            return Err(IndexError::NoRefs { doc: id });
        }
        fill_file_ext(&mut file);
        let _guard = self.locks.lock(&id).await;
        self.store
            .put(&file)
            .await
            .map_err(|e| IndexError::store("put", &id, e))
    }

    /// Create the document, or merge `file`'s refs into the existing one.
    pub async fn upsert_file_index(&self, file: FileIndex) -> Result<OperationStatus> {
        let id = file.doc_id();
        let _guard = self.locks.lock(&id).await;
        batch::apply_add(&self.store, file).await
    }

    /// Apply `operations` in order per document.
    ///
    /// Returns `Err(PartialBatch)` carrying the full report when any
    /// operation failed; the successful ones are not rolled back.
    pub async fn batch_file_index(
        &self,
        operations: Vec<FileIndexOperation>,
    ) -> Result<BatchReport> {
        let submitted = operations.len();
        let report = batch::run_batch(&self.store, &self.locks, operations).await;
        info!(
            operations = submitted,
            failed = report.failed().count(),
            "applied batch"
        );
        report.into_result()
    }

    /// Remove `refs` from every document in `scope` that carries any of them.
    ///
    /// Documents left without refs are deleted. A scope with no matching
    /// documents yields an empty report.
    pub async fn delete_index_by_refs(
        &self,
        scope: &RepoScope,
        refs: &[String],
    ) -> Result<BatchReport> {
        if refs.is_empty() {
            return Ok(BatchReport::default());
        }
        let docs = self
            .store
            .find_by_refs(scope, refs)
            .await
            .map_err(|e| IndexError::Scan {
                scope: scope.clone(),
                source: e,
            })?;
        debug!(scope = %scope, documents = docs.len(), "pruning refs");

        let tasks = docs.into_iter().enumerate().map(|(index, doc)| async move {
            let id = doc.doc_id();
            let _guard = self.locks.lock(&id).await;
            // Re-read under the lock; the scan result may be stale.
            let outcome = match self.store.get(&id).await {
                Ok(Some(current)) => batch::prune_refs(&self.store, current, refs).await,
                Ok(None) => Ok(OperationStatus::Missing),
                Err(e) => Err(IndexError::store("get", &id, e)),
            };
            OperationResult {
                index,
                doc: id,
                kind: OperationKind::Delete,
                outcome,
            }
        });

        let report = BatchReport::new(join_all(tasks).await);
        info!(
            scope = %scope,
            deleted = report.count(OperationStatus::Deleted),
            pruned = report.count(OperationStatus::Pruned),
            "dropped refs"
        );
        report.into_result()
    }

    /// Run `query` and shape one page of results.
    ///
    /// Never fails: a backend error is logged and produces an empty page.
    pub async fn search_query(&self, query: &SearchQuery) -> SearchResult {
        let started = Instant::now();
        let query = query
            .normalized(self.options.page_limit)
            .capped(self.options.max_limit);
        if query.text.trim().is_empty() {
            return empty_result(&query, started.elapsed());
        }

        let mut raw = match self.store.query(&query).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!(query = %query.text, error = %e, "search backend failed");
                return empty_result(&query, started.elapsed());
            }
        };
        self.fill_missing_content(&mut raw).await;

        shape_results(raw, &query, started.elapsed(), &self.options.preview)
    }

    /// Read blob content through git for hits the store returned without it.
    async fn fill_missing_content(&self, raw: &mut RawSearchResponse) {
        let mut repos: HashMap<RepoScope, Option<Arc<dyn GitRepo>>> = HashMap::new();

        for hit in raw.hits.iter_mut().filter(|h| h.content.is_none()) {
            let scope = hit.source.metadata.scope();
            if !repos.contains_key(&scope) {
                let repo = match self.git.get_git_repo(&scope).await {
                    Ok(repo) => Some(repo),
                    Err(e) => {
                        warn!(scope = %scope, error = %e, "git repository unavailable");
                        None
                    }
                };
                repos.insert(scope.clone(), repo);
            }
            let Some(Some(repo)) = repos.get(&scope) else {
                continue;
            };
            match repo.read_blob(&hit.source.blob).await {
                Ok(content) => hit.content = Some(content),
                Err(e) => warn!(blob = %hit.source.blob, error = %e, "blob unreadable"),
            }
        }
    }
}
