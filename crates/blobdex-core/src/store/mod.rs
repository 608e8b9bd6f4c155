//! Storage abstraction for blobdex.
//!
//! The [`IndexStore`] trait is the narrow interface the indexer needs from a
//! search backend: point operations keyed by [`DocId`], a scoped scan by ref
//! membership, and full-text query execution. Backends (SQLite, in-memory)
//! know nothing about ref merging; they persist whatever document they are
//! given.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use std::collections::BTreeMap;

use anyhow::Result;
use async_trait::async_trait;

use crate::identity::{DocId, RepoScope};
use crate::models::{ExtFacet, FileIndex, Metadata, RefFacet, SearchFacets, Source};
use crate::search::SearchQuery;

/// Tag pair wrapped around each match inside [`RawHit::fragments`].
pub const HIT_OPEN: &str = "<b>";
pub const HIT_CLOSE: &str = "</b>";

/// Fragments rendered per hit.
pub const MAX_FRAGMENTS: usize = 3;

/// Byte range of one match inside a document's content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct MatchSpan {
    pub start: usize,
    pub end: usize,
}

/// A matching document as returned by the backend.
#[derive(Debug, Clone)]
pub struct RawHit {
    pub source: Source,
    /// Document content, when the backend stores it.
    pub content: Option<String>,
    /// Match ranges into `content`, sorted and non-overlapping.
    pub matches: Vec<MatchSpan>,
    /// Rendered text with matches wrapped in [`HIT_OPEN`]/[`HIT_CLOSE`].
    pub fragments: Vec<String>,
}

/// One page of backend hits.
#[derive(Debug, Clone, Default)]
pub struct RawSearchResponse {
    /// Total matching documents, across all pages.
    pub total: u64,
    pub hits: Vec<RawHit>,
    /// Aggregated over all `total` matches.
    pub facets: SearchFacets,
}

/// Accumulates facet counts, then orders them by count descending and
/// value ascending.
#[derive(Debug, Default)]
pub struct FacetCounter {
    ext: BTreeMap<String, u64>,
    refs: BTreeMap<(RepoScope, String), u64>,
}

impl FacetCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_ext(&mut self, ext: &str, count: u64) {
        *self.ext.entry(ext.to_string()).or_default() += count;
    }

    pub fn add_ref(&mut self, scope: RepoScope, reference: &str, count: u64) {
        *self.refs.entry((scope, reference.to_string())).or_default() += count;
    }

    /// Count one matching document under its extension and every ref.
    pub fn add_doc(&mut self, metadata: &Metadata) {
        self.add_ext(&metadata.ext, 1);
        let scope = metadata.scope();
        for reference in metadata.refs.iter() {
            self.add_ref(scope.clone(), reference, 1);
        }
    }

    pub fn finish(self) -> SearchFacets {
        let mut ext: Vec<ExtFacet> = self
            .ext
            .into_iter()
            .map(|(ext, count)| ExtFacet { ext, count })
            .collect();
        ext.sort_by(|a, b| b.count.cmp(&a.count));

        let mut full_refs: Vec<RefFacet> = self
            .refs
            .into_iter()
            .map(|((scope, reference), count)| RefFacet {
                organization: scope.organization,
                project: scope.project,
                repository: scope.repository,
                reference,
                count,
            })
            .collect();
        full_refs.sort_by(|a, b| b.count.cmp(&a.count));

        SearchFacets { ext, full_refs }
    }
}

/// Abstract storage and search backend.
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`get`](IndexStore::get) | Point lookup by document key |
/// | [`put`](IndexStore::put) | Insert or replace a document |
/// | [`delete`](IndexStore::delete) | Remove a document |
/// | [`find_by_refs`](IndexStore::find_by_refs) | Documents in a scope carrying any of the refs |
/// | [`query`](IndexStore::query) | Full-text query, one page of hits |
#[async_trait]
pub trait IndexStore: Send + Sync {
    async fn get(&self, id: &DocId) -> Result<Option<FileIndex>>;

    async fn put(&self, doc: &FileIndex) -> Result<()>;

    /// Deleting a missing document is not an error.
    async fn delete(&self, id: &DocId) -> Result<()>;

    async fn find_by_refs(&self, scope: &RepoScope, refs: &[String]) -> Result<Vec<FileIndex>>;

    /// `query.page` is 1-based and `query.limit` is non-zero when called
    /// from the indexer.
    async fn query(&self, query: &SearchQuery) -> Result<RawSearchResponse>;
}

/// Sort spans and fold overlapping or touching ranges together.
pub fn merge_spans(mut spans: Vec<MatchSpan>) -> Vec<MatchSpan> {
    spans.sort();
    let mut merged: Vec<MatchSpan> = Vec::with_capacity(spans.len());
    for span in spans {
        match merged.last_mut() {
            Some(last) if span.start <= last.end => last.end = last.end.max(span.end),
            _ => merged.push(span),
        }
    }
    merged
}

/// Render the lines holding the first matches with each match tagged.
pub fn render_fragments(content: &str, spans: &[MatchSpan]) -> Vec<String> {
    let mut fragments: Vec<String> = Vec::new();
    let mut i = 0;
    while i < spans.len() && fragments.len() < MAX_FRAGMENTS {
        let line_start = content[..spans[i].start].rfind('\n').map_or(0, |p| p + 1);
        let line_end = content[spans[i].start..]
            .find('\n')
            .map_or(content.len(), |p| spans[i].start + p);

        let mut fragment = String::new();
        let mut cursor = line_start;
        while i < spans.len() && spans[i].start < line_end {
            let end = spans[i].end.min(line_end);
            fragment.push_str(&content[cursor..spans[i].start]);
            fragment.push_str(HIT_OPEN);
            fragment.push_str(&content[spans[i].start..end]);
            fragment.push_str(HIT_CLOSE);
            cursor = end;
            i += 1;
        }
        fragment.push_str(&content[cursor..line_end]);
        fragments.push(fragment);
    }
    fragments
}

#[cfg(test)]
mod tests {
    use super::*;

    fn span(start: usize, end: usize) -> MatchSpan {
        MatchSpan { start, end }
    }

    #[test]
    fn test_merge_spans() {
        let merged = merge_spans(vec![span(10, 12), span(0, 3), span(2, 5), span(5, 6)]);
        assert_eq!(merged, vec![span(0, 6), span(10, 12)]);
    }

    #[test]
    fn test_facet_counter_orders_by_count() {
        let scope = RepoScope::new("o", "p", "r");
        let mut counter = FacetCounter::new();
        counter.add_ext(".md", 1);
        counter.add_ext(".rs", 2);
        counter.add_ext(".go", 2);
        counter.add_ref(scope.clone(), "main", 3);
        counter.add_ref(scope.clone(), "dev", 1);
        counter.add_ref(scope, "main", 1);

        let facets = counter.finish();
        let exts: Vec<(&str, u64)> = facets.ext.iter().map(|f| (f.ext.as_str(), f.count)).collect();
        assert_eq!(exts, vec![(".go", 2), (".rs", 2), (".md", 1)]);
        assert_eq!(facets.full_refs[0].reference, "main");
        assert_eq!(facets.full_refs[0].count, 4);
        assert_eq!(facets.full_refs[1].reference, "dev");
    }

    #[test]
    fn test_merge_spans_empty() {
        assert!(merge_spans(Vec::new()).is_empty());
    }
}
