//! In-memory [`IndexStore`] implementation for testing and embedding.
//!
//! Documents live in a `BTreeMap` behind `std::sync::RwLock`. Queries are a
//! Unicode case-insensitive substring scan: a document matches when it contains at
//! least one query term, and hits are ordered by the number of distinct
//! terms matched, then by document key.

use std::collections::BTreeMap;
use std::iter;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::identity::{DocId, RepoScope};
use crate::models::FileIndex;
use crate::search::SearchQuery;

use super::{
    merge_spans, render_fragments, FacetCounter, IndexStore, MatchSpan, RawHit, RawSearchResponse,
};

#[derive(Default)]
pub struct InMemoryStore {
    docs: RwLock<BTreeMap<DocId, FileIndex>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.read().map(|d| d.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, BTreeMap<DocId, FileIndex>>> {
        self.docs.read().map_err(|_| anyhow!("in-memory store lock poisoned"))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, BTreeMap<DocId, FileIndex>>> {
        self.docs.write().map_err(|_| anyhow!("in-memory store lock poisoned"))
    }
}

/// Lowercased `content`, and for each of its bytes the byte range of the
/// source character it came from.
///
/// Lowercasing may change a character's encoded length, so spans found in
/// the folded text are mapped back through the ranges.
fn fold_case(content: &str) -> (String, Vec<(usize, usize)>) {
    let mut folded = String::with_capacity(content.len());
    let mut origin = Vec::with_capacity(content.len());
    for (start, ch) in content.char_indices() {
        let end = start + ch.len_utf8();
        for lower in ch.to_lowercase() {
            folded.push(lower);
            origin.extend(iter::repeat((start, end)).take(lower.len_utf8()));
        }
    }
    (folded, origin)
}

/// Byte spans of every occurrence of each term, case-insensitive.
///
/// `terms` must already be lowercase, as [`SearchQuery::terms`] returns them.
fn find_spans(content: &str, terms: &[String]) -> (usize, Vec<MatchSpan>) {
    let (haystack, origin) = fold_case(content);
    let mut matched_terms = 0;
    let mut spans = Vec::new();
    for needle in terms.iter().filter(|t| !t.is_empty()) {
        let before = spans.len();
        spans.extend(haystack.match_indices(needle.as_str()).map(|(i, m)| MatchSpan {
            start: origin[i].0,
            end: origin[i + m.len() - 1].1,
        }));
        if spans.len() > before {
            matched_terms += 1;
        }
    }
    (matched_terms, merge_spans(spans))
}

#[async_trait]
impl IndexStore for InMemoryStore {
    async fn get(&self, id: &DocId) -> Result<Option<FileIndex>> {
        Ok(self.read()?.get(id).cloned())
    }

    async fn put(&self, doc: &FileIndex) -> Result<()> {
        self.write()?.insert(doc.doc_id(), doc.clone());
        Ok(())
    }

    async fn delete(&self, id: &DocId) -> Result<()> {
        self.write()?.remove(id);
        Ok(())
    }

    async fn find_by_refs(&self, scope: &RepoScope, refs: &[String]) -> Result<Vec<FileIndex>> {
        Ok(self
            .read()?
            .values()
            .filter(|d| d.metadata.scope() == *scope && d.metadata.refs.intersects(refs))
            .cloned()
            .collect())
    }

    async fn query(&self, query: &SearchQuery) -> Result<RawSearchResponse> {
        let terms = query.terms();
        if terms.is_empty() {
            return Ok(RawSearchResponse::default());
        }

        let docs = self.read()?;
        let mut scored: Vec<(usize, &FileIndex, Vec<MatchSpan>)> = docs
            .values()
            .filter(|d| query.filter.matches(&d.metadata))
            .filter_map(|d| {
                let (matched, spans) = find_spans(&d.content, &terms);
                (matched > 0).then_some((matched, d, spans))
            })
            .collect();
        // Stable sort keeps BTreeMap (DocId) order among equal scores.
        scored.sort_by(|a, b| b.0.cmp(&a.0));

        let total = scored.len() as u64;
        let mut facets = FacetCounter::new();
        for (_, doc, _) in &scored {
            facets.add_doc(&doc.metadata);
        }
        let hits = scored
            .into_iter()
            .skip(query.offset())
            .take(query.limit)
            .map(|(_, doc, spans)| RawHit {
                source: doc.source(),
                content: Some(doc.content.clone()),
                fragments: render_fragments(&doc.content, &spans),
                matches: spans,
            })
            .collect();

        Ok(RawSearchResponse {
            total,
            hits,
            facets: facets.finish(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::SearchFilter;
    use crate::store::MAX_FRAGMENTS;

    #[test]
    fn test_find_spans_case_insensitive() {
        let (matched, spans) = find_spans("Foo foo FOO bar", &["foo".into(), "zzz".into()]);
        assert_eq!(matched, 1);
        assert_eq!(spans.len(), 3);
        assert_eq!(spans[2], MatchSpan { start: 8, end: 11 });
    }

    #[test]
    fn test_find_spans_folds_non_ascii() {
        let content = "Élan vital, ÉLAN";
        let (matched, spans) = find_spans(content, &["élan".into()]);
        assert_eq!(matched, 1);
        assert_eq!(spans.len(), 2);
        assert_eq!(&content[spans[0].start..spans[0].end], "Élan");
        assert_eq!(&content[spans[1].start..spans[1].end], "ÉLAN");
    }

    #[test]
    fn test_find_spans_keeps_original_offsets_when_length_changes() {
        // 'İ' lowercases to two characters, one byte longer than itself.
        let content = "İx foo";
        let (_, spans) = find_spans(content, &["foo".into()]);
        assert_eq!(spans, vec![MatchSpan { start: 4, end: 7 }]);

        let (_, spans) = find_spans(content, &["i\u{307}x".into()]);
        assert_eq!(&content[spans[0].start..spans[0].end], "İx");
    }

    #[test]
    fn test_render_fragments_tags_each_match() {
        let content = "alpha\nfoo and foo\nbeta foo";
        let (_, spans) = find_spans(content, &["foo".into()]);
        let fragments = render_fragments(content, &spans);
        assert_eq!(
            fragments,
            vec!["<b>foo</b> and <b>foo</b>", "beta <b>foo</b>"]
        );
    }

    #[test]
    fn test_render_fragments_limit() {
        let content = "x\nx\nx\nx\nx";
        let (_, spans) = find_spans(content, &["x".into()]);
        assert_eq!(render_fragments(content, &spans).len(), MAX_FRAGMENTS);
    }

    #[tokio::test]
    async fn test_put_get_delete() {
        let store = InMemoryStore::new();
        let doc = FileIndex::new(&RepoScope::new("o", "p", "r"), "b", "main", "a.rs", "fn a()");
        let id = doc.doc_id();

        store.put(&doc).await.unwrap();
        assert_eq!(store.get(&id).await.unwrap(), Some(doc));
        store.delete(&id).await.unwrap();
        assert_eq!(store.get(&id).await.unwrap(), None);
        // Deleting again is fine.
        store.delete(&id).await.unwrap();
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_query_orders_and_paginates() {
        let store = InMemoryStore::new();
        let scope = RepoScope::new("o", "p", "r");
        for (blob, content) in [("1", "foo"), ("2", "foo bar"), ("3", "bar"), ("4", "nothing")] {
            store
                .put(&FileIndex::new(&scope, blob, "main", "f.txt", content))
                .await
                .unwrap();
        }

        let q = SearchQuery::new("foo bar").normalized(2);
        let page1 = store.query(&q).await.unwrap();
        assert_eq!(page1.total, 3);
        assert_eq!(page1.hits.len(), 2);
        assert_eq!(page1.hits[0].source.blob, "2");

        let page2 = store.query(&q.with_page(2)).await.unwrap();
        assert_eq!(page2.hits.len(), 1);
        // Facets cover every match, not just the page.
        assert_eq!(page2.facets, page1.facets);
        assert_eq!(page1.facets.full_refs[0].count, 3);
    }

    #[tokio::test]
    async fn test_query_facets_respect_filters() {
        let store = InMemoryStore::new();
        let api = RepoScope::new("o", "p", "api");
        let web = RepoScope::new("o", "p", "web");
        let mut shared = FileIndex::new(&api, "1", "main", "a.rs", "needle");
        shared.metadata.refs.merge(&["dev"]);
        shared.metadata.ext = ".rs".into();
        let mut doc = FileIndex::new(&api, "2", "main", "b.md", "needle");
        doc.metadata.ext = ".md".into();
        let mut other = FileIndex::new(&web, "3", "main", "c.rs", "needle");
        other.metadata.ext = ".rs".into();
        for d in [&shared, &doc, &other] {
            store.put(d).await.unwrap();
        }

        let all = store.query(&SearchQuery::new("needle").normalized(1)).await.unwrap();
        let exts: Vec<(&str, u64)> = all.facets.ext.iter().map(|f| (f.ext.as_str(), f.count)).collect();
        assert_eq!(exts, vec![(".rs", 2), (".md", 1)]);
        let refs: Vec<(&str, &str, u64)> = all
            .facets
            .full_refs
            .iter()
            .map(|f| (f.repository.as_str(), f.reference.as_str(), f.count))
            .collect();
        assert_eq!(refs, vec![("api", "main", 2), ("api", "dev", 1), ("web", "main", 1)]);

        let api_only = SearchQuery::new("needle")
            .with_filter(SearchFilter {
                repository: Some("api".into()),
                ..SearchFilter::default()
            })
            .normalized(1);
        let result = store.query(&api_only).await.unwrap();
        assert!(result.facets.full_refs.iter().all(|f| f.repository == "api"));
    }
}
