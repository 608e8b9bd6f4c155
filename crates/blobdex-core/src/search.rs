//! Search queries, pagination, and result shaping.
//!
//! The backend executes the query and returns a [`RawSearchResponse`]; this
//! module turns it into the client-facing [`SearchResult`]: hits with line
//! previews, the union of matched words, page markers derived from the
//! total hit count and the page size, and the backend's facet counts.
//!
//! Documents are already deduplicated by blob and path at index time, so a
//! file shared by many refs comes back as a single hit whose
//! `metadata.refs` lists them all.

use std::collections::BTreeSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::highlight::{get_hit_words, hit_tag};
use crate::models::{Hit, Metadata, SearchResult};
use crate::preview::{build_previews, PreviewParams};
use crate::store::RawSearchResponse;

/// Optional restrictions applied on top of the text query.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchFilter {
    pub organization: Option<String>,
    pub project: Option<String>,
    pub repository: Option<String>,
    /// Only documents whose ref set contains this ref.
    #[serde(rename = "ref")]
    pub reference: Option<String>,
    /// File extension including the dot, e.g. `.rs`.
    pub ext: Option<String>,
}

impl SearchFilter {
    pub fn matches(&self, metadata: &Metadata) -> bool {
        fn eq(want: &Option<String>, have: &str) -> bool {
            want.as_deref().map_or(true, |w| w == have)
        }

        eq(&self.organization, &metadata.organization)
            && eq(&self.project, &metadata.project)
            && eq(&self.repository, &metadata.repository)
            && eq(&self.ext, &metadata.ext)
            && self
                .reference
                .as_deref()
                .map_or(true, |r| metadata.refs.contains(r))
    }
}

/// A full-text query for one page of results.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchQuery {
    pub text: String,
    #[serde(default)]
    pub filter: SearchFilter,
    /// 1-based page number. `0` is read as `1`.
    #[serde(default)]
    pub page: usize,
    /// Page size. `0` means the indexer's configured limit.
    #[serde(default)]
    pub limit: usize,
}

impl SearchQuery {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    pub fn with_page(mut self, page: usize) -> Self {
        self.page = page;
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_filter(mut self, filter: SearchFilter) -> Self {
        self.filter = filter;
        self
    }

    /// Copy with `page >= 1` and a non-zero `limit`.
    pub fn normalized(&self, default_limit: usize) -> Self {
        Self {
            text: self.text.clone(),
            filter: self.filter.clone(),
            page: self.page.max(1),
            limit: if self.limit == 0 {
                default_limit.max(1)
            } else {
                self.limit
            },
        }
    }

    /// Copy with `limit` no larger than `max_limit`.
    pub fn capped(mut self, max_limit: usize) -> Self {
        self.limit = self.limit.min(max_limit.max(1));
        self
    }

    /// Number of hits preceding this page, saturating for far pages.
    pub fn offset(&self) -> usize {
        self.page.saturating_sub(1).saturating_mul(self.limit)
    }

    /// Lowercased whitespace-separated terms.
    pub fn terms(&self) -> Vec<String> {
        self.text
            .split_whitespace()
            .map(str::to_lowercase)
            .collect()
    }
}

/// Page markers for a result set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub current: usize,
    pub next: usize,
    pub is_last_page: bool,
}

/// Compute page markers from the total hit count.
///
/// Pages are 1-based. On the last page `next` equals `current`.
pub fn paginate(size: u64, limit: usize, current: usize) -> Pagination {
    let current = current.max(1);
    let last_page = if limit == 0 {
        1
    } else {
        (size.div_ceil(limit as u64) as usize).max(1)
    };
    let is_last_page = current >= last_page;

    Pagination {
        current,
        next: if is_last_page { current } else { current + 1 },
        is_last_page,
    }
}

/// An empty page for `query`.
pub fn empty_result(query: &SearchQuery, elapsed: Duration) -> SearchResult {
    shape_results(
        RawSearchResponse::default(),
        query,
        elapsed,
        &PreviewParams::default(),
    )
}

/// Turn a raw backend page into a [`SearchResult`].
///
/// `query` must already be [normalized](SearchQuery::normalized).
pub fn shape_results(
    raw: RawSearchResponse,
    query: &SearchQuery,
    elapsed: Duration,
    params: &PreviewParams,
) -> SearchResult {
    let pattern = hit_tag();
    let mut words = BTreeSet::new();

    let hits = raw
        .hits
        .into_iter()
        .map(|h| {
            words.extend(get_hit_words(pattern, &h.fragments));
            let preview = h
                .content
                .as_deref()
                .map(|c| build_previews(c, &h.matches, params))
                .unwrap_or_default();
            Hit {
                source: h.source,
                preview,
            }
        })
        .collect();

    let page = paginate(raw.total, query.limit, query.page);

    SearchResult {
        time: elapsed.as_secs_f64(),
        size: raw.total,
        limit: query.limit,
        is_last_page: page.is_last_page,
        current: page.current,
        next: page.next,
        hits,
        words: words.into_iter().collect(),
        facets: raw.facets,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::RepoScope;
    use crate::models::{ExtFacet, FileIndex, SearchFacets};
    use crate::store::{MatchSpan, RawHit};

    #[test]
    fn test_paginate_middle_and_last() {
        let p = paginate(45, 20, 1);
        assert_eq!(p.next, 2);
        assert!(!p.is_last_page);

        let p = paginate(45, 20, 2);
        assert_eq!(p.next, 3);
        assert!(!p.is_last_page);

        let p = paginate(45, 20, 3);
        assert!(p.is_last_page);
        assert_eq!(p.next, 3);
    }

    #[test]
    fn test_paginate_exact_multiple() {
        assert!(!paginate(40, 20, 1).is_last_page);
        assert!(paginate(40, 20, 2).is_last_page);
    }

    #[test]
    fn test_paginate_empty_and_degenerate() {
        let p = paginate(0, 20, 0);
        assert_eq!(p.current, 1);
        assert!(p.is_last_page);
        assert!(paginate(10, 0, 1).is_last_page);
    }

    #[test]
    fn test_normalized_query() {
        let q = SearchQuery::new("foo").normalized(20);
        assert_eq!(q.page, 1);
        assert_eq!(q.limit, 20);
        assert_eq!(q.offset(), 0);

        let q = SearchQuery::new("foo").with_page(3).with_limit(5).normalized(20);
        assert_eq!(q.limit, 5);
        assert_eq!(q.offset(), 10);
    }

    #[test]
    fn test_far_page_offset_saturates() {
        let q = SearchQuery::new("foo").with_page(usize::MAX).normalized(20);
        assert_eq!(q.offset(), usize::MAX);

        let q = SearchQuery::new("foo").with_limit(usize::MAX).normalized(20).capped(100);
        assert_eq!(q.limit, 100);
        assert_eq!(q.with_page(2).offset(), 100);
        assert_eq!(SearchQuery::new("foo").normalized(20).capped(0).limit, 1);

        let p = paginate(10, 20, usize::MAX);
        assert!(p.is_last_page);
        assert_eq!(p.next, usize::MAX);
    }

    #[test]
    fn test_terms_lowercased() {
        let q = SearchQuery::new("  Foo   BAR ");
        assert_eq!(q.terms(), vec!["foo", "bar"]);
    }

    #[test]
    fn test_filter_matches() {
        let mut f = FileIndex::new(&RepoScope::new("o", "p", "r"), "b", "main", "x.rs", "");
        f.metadata.ext = ".rs".into();

        assert!(SearchFilter::default().matches(&f.metadata));
        let by_ref = SearchFilter {
            reference: Some("main".into()),
            ext: Some(".rs".into()),
            ..SearchFilter::default()
        };
        assert!(by_ref.matches(&f.metadata));
        let other_ref = SearchFilter {
            reference: Some("dev".into()),
            ..SearchFilter::default()
        };
        assert!(!other_ref.matches(&f.metadata));
        let other_repo = SearchFilter {
            repository: Some("q".into()),
            ..SearchFilter::default()
        };
        assert!(!other_repo.matches(&f.metadata));
    }

    #[test]
    fn test_shape_results() {
        let file = FileIndex::new(
            &RepoScope::new("o", "p", "r"),
            "b1",
            "main",
            "a.txt",
            "one\nfoo bar\nthree",
        );
        let raw = RawSearchResponse {
            total: 45,
            hits: vec![RawHit {
                source: file.source(),
                content: Some(file.content.clone()),
                matches: vec![MatchSpan { start: 8, end: 11 }],
                fragments: vec!["foo <b>bar</b>".into()],
            }],
            facets: SearchFacets {
                ext: vec![ExtFacet {
                    ext: ".txt".into(),
                    count: 45,
                }],
                full_refs: vec![],
            },
        };
        let query = SearchQuery::new("bar").normalized(20);

        let result = shape_results(
            raw,
            &query,
            Duration::from_millis(1500),
            &PreviewParams::default(),
        );

        assert_eq!(result.size, 45);
        assert_eq!(result.limit, 20);
        assert_eq!(result.current, 1);
        assert_eq!(result.next, 2);
        assert!(!result.is_last_page);
        assert!((result.time - 1.5).abs() < 1e-9);
        assert_eq!(result.words, vec!["bar"]);
        assert_eq!(result.hits.len(), 1);
        assert_eq!(result.hits[0].preview[0].hits, vec![2]);
        assert_eq!(result.facets.ext[0].count, 45);
    }

    #[test]
    fn test_shape_results_without_content_has_no_preview() {
        let file = FileIndex::new(&RepoScope::new("o", "p", "r"), "b1", "main", "a", "");
        let raw = RawSearchResponse {
            total: 1,
            hits: vec![RawHit {
                source: file.source(),
                content: None,
                matches: vec![MatchSpan { start: 0, end: 1 }],
                fragments: vec![],
            }],
            ..RawSearchResponse::default()
        };
        let result = shape_results(
            raw,
            &SearchQuery::new("x").normalized(10),
            Duration::ZERO,
            &PreviewParams::default(),
        );
        assert!(result.hits[0].preview.is_empty());
        assert!(result.is_last_page);
    }

    #[test]
    fn test_empty_result() {
        let result = empty_result(&SearchQuery::new("").normalized(20), Duration::ZERO);
        assert_eq!(result.size, 0);
        assert!(result.hits.is_empty());
        assert!(result.is_last_page);
        assert_eq!(result.current, 1);
    }
}
