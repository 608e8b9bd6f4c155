//! Ref synchronization from git into the index.
//!
//! `sync_ref` turns the tree of one ref into ADD operations and, for files
//! that carried the ref before but are no longer in its tree, DELETE
//! operations for that ref. Shared blobs are merged by the indexer, so
//! syncing ten branches that agree on a file stores it once.

use std::collections::HashSet;

use anyhow::{bail, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use tracing::{debug, info, warn};

use blobdex_core::batch::{BatchReport, OperationStatus};
use blobdex_core::git::GitRepoReader;
use blobdex_core::store::IndexStore;
use blobdex_core::{FileIndex, FileIndexOperation, IndexError, Indexer, RepoScope};

use crate::config::{Config, GitConfig};
use crate::git_cli::{CliGitRepo, TreeEntry};
use crate::indexer;

/// Outcome of syncing one ref.
#[derive(Debug, Default)]
pub struct SyncSummary {
    pub reference: String,
    /// Blob entries listed in the ref's tree.
    pub listed: usize,
    /// Entries skipped as excluded, oversized, or binary.
    pub skipped: usize,
    /// Indexed documents that no longer belong to the ref.
    pub stale: usize,
    pub report: BatchReport,
}

/// Why a tree entry is left out of the index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Skip {
    Excluded,
    TooLarge,
    Binary,
}

pub fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}

/// Decide from the listing alone whether an entry is skipped.
pub fn skip_entry(entry: &TreeEntry, excludes: &GlobSet, max_file_bytes: u64) -> Option<Skip> {
    if excludes.is_match(&entry.path) {
        Some(Skip::Excluded)
    } else if entry.size > max_file_bytes {
        Some(Skip::TooLarge)
    } else {
        None
    }
}

/// Text content of a blob, or `None` for binary data.
pub fn decode_text(bytes: Vec<u8>) -> Option<String> {
    if bytes.contains(&0) {
        return None;
    }
    String::from_utf8(bytes).ok()
}

/// Index the tree of `reference` and drop the ref from files it no longer
/// contains.
pub async fn sync_ref<S: IndexStore, G: GitRepoReader>(
    indexer: &Indexer<S, G>,
    git: &GitConfig,
    repo: &CliGitRepo,
    scope: &RepoScope,
    reference: &str,
) -> Result<SyncSummary> {
    let excludes = build_globset(&git.exclude_globs)?;
    let entries = repo.list_tree(reference).await?;

    let mut summary = SyncSummary {
        reference: reference.to_string(),
        listed: entries.len(),
        ..SyncSummary::default()
    };
    let mut present: HashSet<(String, String)> = HashSet::new();
    let mut operations = Vec::new();

    for entry in entries {
        if let Some(reason) = skip_entry(&entry, &excludes, git.max_file_bytes) {
            debug!(path = %entry.path, ?reason, "skipping entry");
            summary.skipped += 1;
            continue;
        }
        let Some(content) = decode_text(repo.read_blob_bytes(&entry.blob).await?) else {
            debug!(path = %entry.path, reason = ?Skip::Binary, "skipping entry");
            summary.skipped += 1;
            continue;
        };
        present.insert((entry.blob.clone(), entry.path.clone()));
        operations.push(FileIndexOperation::Add(FileIndex::new(
            scope, entry.blob, reference, entry.path, content,
        )));
    }

    let indexed = indexer
        .store()
        .find_by_refs(scope, &[reference.to_string()])
        .await?;
    for doc in indexed {
        if present.contains(&(doc.blob.clone(), doc.metadata.path.clone())) {
            continue;
        }
        summary.stale += 1;
        operations.push(FileIndexOperation::Delete(FileIndex::new(
            scope,
            doc.blob,
            reference,
            doc.metadata.path,
            "",
        )));
    }

    summary.report = submit_in_batches(indexer, operations, git.batch_size).await?;
    info!(
        scope = %scope,
        reference,
        listed = summary.listed,
        skipped = summary.skipped,
        stale = summary.stale,
        "synced ref"
    );
    Ok(summary)
}

/// Submit `operations` in chunks of `batch_size`, collecting one report.
///
/// Partial failures are folded into the report; any other error aborts.
pub async fn submit_in_batches<S: IndexStore, G: GitRepoReader>(
    indexer: &Indexer<S, G>,
    operations: Vec<FileIndexOperation>,
    batch_size: usize,
) -> Result<BatchReport> {
    let mut report = BatchReport::default();
    let mut operations = operations.into_iter();

    loop {
        let chunk: Vec<FileIndexOperation> = operations.by_ref().take(batch_size.max(1)).collect();
        if chunk.is_empty() {
            break;
        }
        match indexer.batch_file_index(chunk).await {
            Ok(part) => report.append(part),
            Err(IndexError::PartialBatch(part)) => {
                warn!(failed = part.failed().count(), "batch partially applied");
                report.append(part);
            }
            Err(e) => return Err(e.into()),
        }
    }

    Ok(report)
}

fn print_report(report: &BatchReport) {
    println!("  created: {}", report.count(OperationStatus::Created));
    println!("  merged: {}", report.count(OperationStatus::Merged));
    println!("  unchanged: {}", report.count(OperationStatus::Unchanged));
    println!("  pruned: {}", report.count(OperationStatus::Pruned));
    println!("  deleted: {}", report.count(OperationStatus::Deleted));
    for failed in report.failed() {
        if let Err(e) = &failed.outcome {
            println!("  failed: {} ({})", failed.doc, e);
        }
    }
}

pub async fn run_sync(config: &Config, scope: &RepoScope, refs: Vec<String>) -> Result<()> {
    let indexer = indexer::open(config).await?;
    let repo = indexer.git().open(scope)?;

    let refs = if refs.is_empty() {
        repo.list_refs().await?
    } else {
        refs
    };
    if refs.is_empty() {
        println!("sync {}: no branches or tags", scope);
        return Ok(());
    }

    let mut failures = 0;
    for reference in &refs {
        let summary = sync_ref(&indexer, &config.git, &repo, scope, reference).await?;
        println!("sync {} @ {}", scope, summary.reference);
        println!("  files listed: {}", summary.listed);
        println!("  skipped: {}", summary.skipped);
        println!("  stale: {}", summary.stale);
        print_report(&summary.report);
        failures += summary.report.failed().count();
    }

    indexer.store().pool().close().await;

    if failures > 0 {
        bail!("{} operations failed", failures);
    }
    println!("ok");
    Ok(())
}

pub async fn run_drop_refs(config: &Config, scope: &RepoScope, refs: Vec<String>) -> Result<()> {
    if refs.is_empty() {
        bail!("No refs given");
    }
    let indexer = indexer::open(config).await?;

    let result = indexer.delete_index_by_refs(scope, &refs).await;
    indexer.store().pool().close().await;

    println!("drop-refs {} [{}]", scope, refs.join(", "));
    match result {
        Ok(report) => {
            print_report(&report);
            println!("ok");
            Ok(())
        }
        Err(IndexError::PartialBatch(report)) => {
            print_report(&report);
            bail!("{} operations failed", report.failed().count());
        }
        Err(e) => Err(e.into()),
    }
}
