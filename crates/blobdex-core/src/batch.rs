//! Applying ADD/DELETE operations against a store.
//!
//! Each operation is a read-modify-write on one document:
//!
//! | Operation | Document missing | Document present |
//! |-----------|------------------|------------------|
//! | `Add` | fill extension, persist → `Created` (`Unchanged` without refs) | merge refs; persist only if grown → `Merged` / `Unchanged` |
//! | `Delete` | no-op → `Missing` | remove refs; persist → `Pruned`, or delete when empty → `Deleted` |
//!
//! A batch is split into groups by [`DocId`]. Groups run concurrently,
//! operations within a group run in input order, and every group holds the
//! document's stripe of [`DocLocks`] while it works. One failing operation
//! does not stop the others; the [`BatchReport`] lists every outcome in
//! input order.

use std::collections::hash_map::DefaultHasher;
use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};

use futures::future::join_all;
use futures::lock::{Mutex, MutexGuard};
use tracing::debug;

use crate::error::{IndexError, Result};
use crate::identity::{fill_file_ext, DocId};
use crate::models::{FileIndex, FileIndexOperation, OperationKind};
use crate::refs::{MergeOutcome, RemoveOutcome};
use crate::store::IndexStore;

/// What an operation did to its document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationStatus {
    /// A new document was written.
    Created,
    /// New refs were merged into an existing document.
    Merged,
    /// Refs were already present (ADD) or absent (DELETE); nothing written.
    Unchanged,
    /// Some refs were removed and the document was rewritten.
    Pruned,
    /// The last refs were removed and the document was deleted.
    Deleted,
    /// DELETE of a document that does not exist.
    Missing,
}

#[derive(Debug)]
pub struct OperationResult {
    /// Position of the operation in the submitted batch.
    pub index: usize,
    pub doc: DocId,
    pub kind: OperationKind,
    pub outcome: Result<OperationStatus>,
}

impl OperationResult {
    pub fn is_ok(&self) -> bool {
        self.outcome.is_ok()
    }
}

/// Per-operation outcomes of a batch, in input order.
#[derive(Debug, Default)]
pub struct BatchReport {
    results: Vec<OperationResult>,
}

impl BatchReport {
    pub fn new(mut results: Vec<OperationResult>) -> Self {
        results.sort_by_key(|r| r.index);
        Self { results }
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn results(&self) -> &[OperationResult] {
        &self.results
    }

    pub fn failed(&self) -> impl Iterator<Item = &OperationResult> {
        self.results.iter().filter(|r| !r.is_ok())
    }

    pub fn succeeded(&self) -> impl Iterator<Item = &OperationResult> {
        self.results.iter().filter(|r| r.is_ok())
    }

    pub fn has_failures(&self) -> bool {
        self.failed().next().is_some()
    }

    /// Number of successful operations that ended in `status`.
    pub fn count(&self, status: OperationStatus) -> usize {
        self.results
            .iter()
            .filter(|r| matches!(r.outcome, Ok(s) if s == status))
            .count()
    }

    /// Append `other`, renumbering its indexes after this report's entries.
    pub fn append(&mut self, other: BatchReport) {
        let base = self.results.len();
        self.results
            .extend(other.results.into_iter().map(|mut r| {
                r.index += base;
                r
            }));
    }

    /// `Err(PartialBatch)` when any operation failed.
    pub fn into_result(self) -> Result<BatchReport> {
        if self.has_failures() {
            Err(IndexError::PartialBatch(self))
        } else {
            Ok(self)
        }
    }
}

/// Striped async locks serializing read-modify-write per document.
pub struct DocLocks {
    stripes: Vec<Mutex<()>>,
}

impl DocLocks {
    pub fn new(stripes: usize) -> Self {
        Self {
            stripes: (0..stripes.max(1)).map(|_| Mutex::new(())).collect(),
        }
    }

    pub async fn lock(&self, id: &DocId) -> MutexGuard<'_, ()> {
        let mut hasher = DefaultHasher::new();
        id.hash(&mut hasher);
        let stripe = (hasher.finish() % self.stripes.len() as u64) as usize;
        self.stripes[stripe].lock().await
    }
}

/// Merge `incoming`'s refs into its document, creating it when absent.
///
/// An ADD carrying no refs changes nothing: a document only exists while
/// some ref contains it.
pub async fn apply_add<S: IndexStore>(store: &S, incoming: FileIndex) -> Result<OperationStatus> {
    let id = incoming.doc_id();
    if incoming.metadata.refs.is_empty() {
        debug!(doc = %id, "ignored add without refs");
        return Ok(OperationStatus::Unchanged);
    }
    let existing = store
        .get(&id)
        .await
        .map_err(|e| IndexError::store("get", &id, e))?;

    match existing {
        None => {
            let mut doc = incoming;
            fill_file_ext(&mut doc);
            store
                .put(&doc)
                .await
                .map_err(|e| IndexError::store("put", &id, e))?;
            debug!(doc = %id, "created document");
            Ok(OperationStatus::Created)
        }
        Some(mut doc) => match doc.metadata.refs.merge(incoming.metadata.refs.as_slice()) {
            MergeOutcome::Unchanged => Ok(OperationStatus::Unchanged),
            MergeOutcome::Added(n) => {
                store
                    .put(&doc)
                    .await
                    .map_err(|e| IndexError::store("put", &id, e))?;
                debug!(doc = %id, added = n, "merged refs");
                Ok(OperationStatus::Merged)
            }
        },
    }
}

/// Remove `target`'s refs from its document.
pub async fn apply_delete<S: IndexStore>(store: &S, target: &FileIndex) -> Result<OperationStatus> {
    let id = target.doc_id();
    let existing = store
        .get(&id)
        .await
        .map_err(|e| IndexError::store("get", &id, e))?;

    match existing {
        None => Ok(OperationStatus::Missing),
        Some(doc) => prune_refs(store, doc, target.metadata.refs.as_slice()).await,
    }
}

/// Remove `refs` from a loaded document, persisting or deleting it.
pub async fn prune_refs<S: IndexStore>(
    store: &S,
    mut doc: FileIndex,
    refs: &[String],
) -> Result<OperationStatus> {
    let id = doc.doc_id();
    match doc.metadata.refs.remove(refs) {
        RemoveOutcome::Unchanged => Ok(OperationStatus::Unchanged),
        RemoveOutcome::Updated(n) => {
            store
                .put(&doc)
                .await
                .map_err(|e| IndexError::store("put", &id, e))?;
            debug!(doc = %id, removed = n, "pruned refs");
            Ok(OperationStatus::Pruned)
        }
        RemoveOutcome::Emptied => {
            store
                .delete(&id)
                .await
                .map_err(|e| IndexError::store("delete", &id, e))?;
            debug!(doc = %id, "deleted document");
            Ok(OperationStatus::Deleted)
        }
    }
}

async fn apply<S: IndexStore>(store: &S, op: FileIndexOperation) -> Result<OperationStatus> {
    match op {
        FileIndexOperation::Add(file) => apply_add(store, file).await,
        FileIndexOperation::Delete(file) => apply_delete(store, &file).await,
    }
}

/// Apply `operations`, grouped per document, and report every outcome.
pub async fn run_batch<S: IndexStore>(
    store: &S,
    locks: &DocLocks,
    operations: Vec<FileIndexOperation>,
) -> BatchReport {
    let mut groups: BTreeMap<DocId, Vec<(usize, FileIndexOperation)>> = BTreeMap::new();
    for (index, op) in operations.into_iter().enumerate() {
        groups
            .entry(op.file_index().doc_id())
            .or_default()
            .push((index, op));
    }

    let tasks = groups.into_iter().map(|(id, ops)| async move {
        let _guard = locks.lock(&id).await;
        let mut results = Vec::with_capacity(ops.len());
        for (index, op) in ops {
            let kind = op.kind();
            let outcome = apply(store, op).await;
            results.push(OperationResult {
                index,
                doc: id.clone(),
                kind,
                outcome,
            });
        }
        results
    });

    BatchReport::new(join_all(tasks).await.into_iter().flatten().collect())
}
