//! SQLite-backed [`IndexStore`] implementation.
//!
//! Documents live in `file_index`; `file_index_fts` carries the same key
//! columns next to the content so a full-text match can be joined back to
//! its row. Both tables are written in one transaction. Facets are `GROUP BY`
//! queries over the same join, with refs unnested through `json_each`.

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use blobdex_core::identity::{DocId, RepoScope};
use blobdex_core::models::{FileIndex, Metadata, SearchFacets};
use blobdex_core::refs::RefSet;
use blobdex_core::search::{SearchFilter, SearchQuery};
use blobdex_core::store::{
    merge_spans, render_fragments, FacetCounter, IndexStore, MatchSpan, RawHit, RawSearchResponse,
};

/// Markers passed to `highlight()`. Neither occurs in indexed text files.
const MARK_OPEN: char = '\u{1}';
const MARK_CLOSE: char = '\u{2}';

/// Join between the FTS table and its document row.
const FTS_JOIN: &str = r#"
    FROM file_index_fts
    JOIN file_index f
      ON f.organization = file_index_fts.organization
     AND f.project = file_index_fts.project
     AND f.repository = file_index_fts.repository
     AND f.blob = file_index_fts.blob
     AND f.path = file_index_fts.path
    WHERE file_index_fts MATCH ?
      AND (? IS NULL OR f.organization = ?)
      AND (? IS NULL OR f.project = ?)
      AND (? IS NULL OR f.repository = ?)
      AND (? IS NULL OR f.ext = ?)
      AND (? IS NULL OR EXISTS (SELECT 1 FROM json_each(f.refs_json) r WHERE r.value = ?))
"#;

/// SQLite implementation of the [`IndexStore`] trait.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Extension and ref counts over every document matching `expr`.
    async fn facets(&self, expr: &str, filter: &SearchFilter) -> Result<SearchFacets> {
        let filters = filter_values(filter);
        let mut counter = FacetCounter::new();

        let ext_sql = format!("SELECT f.ext AS ext, COUNT(*) AS n {} GROUP BY f.ext", FTS_JOIN);
        let mut ext_query = sqlx::query(&ext_sql).bind(expr);
        for value in filters {
            ext_query = ext_query.bind(value).bind(value);
        }
        for row in ext_query.fetch_all(&self.pool).await? {
            let ext: String = row.get("ext");
            let n: i64 = row.get("n");
            counter.add_ext(&ext, n as u64);
        }

        let refs_sql = format!(
            r#"
            SELECT m.organization, m.project, m.repository, r.value AS reference, COUNT(*) AS n
            FROM (SELECT f.organization, f.project, f.repository, f.refs_json {}) m,
                 json_each(m.refs_json) r
            GROUP BY m.organization, m.project, m.repository, r.value
            "#,
            FTS_JOIN
        );
        let mut refs_query = sqlx::query(&refs_sql).bind(expr);
        for value in filters {
            refs_query = refs_query.bind(value).bind(value);
        }
        for row in refs_query.fetch_all(&self.pool).await? {
            let scope = RepoScope::new(
                row.get::<String, _>("organization"),
                row.get::<String, _>("project"),
                row.get::<String, _>("repository"),
            );
            let reference: String = row.get("reference");
            let n: i64 = row.get("n");
            counter.add_ref(scope, &reference, n as u64);
        }

        Ok(counter.finish())
    }

    /// Number of stored documents.
    pub async fn count(&self) -> Result<u64> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM file_index")
            .fetch_one(&self.pool)
            .await?;
        Ok(n as u64)
    }
}

fn row_to_file(row: &SqliteRow) -> Result<FileIndex> {
    let refs_json: String = row.get("refs_json");
    let refs: RefSet = serde_json::from_str(&refs_json)
        .with_context(|| format!("Corrupt refs_json: {}", refs_json))?;

    Ok(FileIndex {
        blob: row.get("blob"),
        content: row.get("content"),
        metadata: Metadata {
            organization: row.get("organization"),
            project: row.get("project"),
            repository: row.get("repository"),
            refs,
            path: row.get("path"),
            ext: row.get("ext"),
        },
    })
}

/// Quote each term as an FTS5 string and OR them together.
///
/// Returns `None` when the query holds no terms.
pub fn fts_match_expr(terms: &[String]) -> Option<String> {
    let quoted: Vec<String> = terms
        .iter()
        .filter(|t| !t.is_empty())
        .map(|t| format!("\"{}\"", t.replace('"', "\"\"")))
        .collect();
    if quoted.is_empty() {
        None
    } else {
        Some(quoted.join(" OR "))
    }
}

/// Filter values in the order [`FTS_JOIN`] binds them.
fn filter_values(filter: &SearchFilter) -> [Option<&str>; 5] {
    [
        filter.organization.as_deref(),
        filter.project.as_deref(),
        filter.repository.as_deref(),
        filter.ext.as_deref(),
        filter.reference.as_deref(),
    ]
}

/// `LIMIT`/`OFFSET` value; SQLite reads a negative limit as unbounded.
fn sql_count(n: usize) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

/// Byte spans of the marked regions, measured against the unmarked text.
pub fn spans_from_marked(marked: &str) -> Vec<MatchSpan> {
    let mut spans = Vec::new();
    let mut offset = 0;
    let mut open = None;
    for ch in marked.chars() {
        match ch {
            MARK_OPEN => open = Some(offset),
            MARK_CLOSE => {
                if let Some(start) = open.take() {
                    if offset > start {
                        spans.push(MatchSpan { start, end: offset });
                    }
                }
            }
            c => offset += c.len_utf8(),
        }
    }
    merge_spans(spans)
}

#[async_trait]
impl IndexStore for SqliteStore {
    async fn get(&self, id: &DocId) -> Result<Option<FileIndex>> {
        let row = sqlx::query(
            r#"
            SELECT organization, project, repository, blob, path, ext, refs_json, content
            FROM file_index
            WHERE organization = ? AND project = ? AND repository = ? AND blob = ? AND path = ?
            "#,
        )
        .bind(&id.organization)
        .bind(&id.project)
        .bind(&id.repository)
        .bind(&id.blob)
        .bind(&id.path)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_file).transpose()
    }

    async fn put(&self, doc: &FileIndex) -> Result<()> {
        let m = &doc.metadata;
        let refs_json = serde_json::to_string(&m.refs)?;
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO file_index (organization, project, repository, blob, path,
                                    ext, refs_json, content)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(organization, project, repository, blob, path) DO UPDATE SET
                ext = excluded.ext,
                refs_json = excluded.refs_json,
                content = excluded.content
            "#,
        )
        .bind(&m.organization)
        .bind(&m.project)
        .bind(&m.repository)
        .bind(&doc.blob)
        .bind(&m.path)
        .bind(&m.ext)
        .bind(&refs_json)
        .bind(&doc.content)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            DELETE FROM file_index_fts
            WHERE organization = ? AND project = ? AND repository = ? AND blob = ? AND path = ?
            "#,
        )
        .bind(&m.organization)
        .bind(&m.project)
        .bind(&m.repository)
        .bind(&doc.blob)
        .bind(&m.path)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO file_index_fts (organization, project, repository, blob, path, content)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&m.organization)
        .bind(&m.project)
        .bind(&m.repository)
        .bind(&doc.blob)
        .bind(&m.path)
        .bind(&doc.content)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn delete(&self, id: &DocId) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        for table in ["file_index_fts", "file_index"] {
            let sql = format!(
                "DELETE FROM {} WHERE organization = ? AND project = ? AND repository = ? AND blob = ? AND path = ?",
                table
            );
            sqlx::query(&sql)
                .bind(&id.organization)
                .bind(&id.project)
                .bind(&id.repository)
                .bind(&id.blob)
                .bind(&id.path)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn find_by_refs(&self, scope: &RepoScope, refs: &[String]) -> Result<Vec<FileIndex>> {
        if refs.is_empty() {
            return Ok(Vec::new());
        }
        let wanted = serde_json::to_string(refs)?;

        let rows = sqlx::query(
            r#"
            SELECT organization, project, repository, blob, path, ext, refs_json, content
            FROM file_index
            WHERE organization = ? AND project = ? AND repository = ?
              AND EXISTS (
                  SELECT 1 FROM json_each(file_index.refs_json) have
                  JOIN json_each(?) want ON have.value = want.value
              )
            ORDER BY blob, path
            "#,
        )
        .bind(&scope.organization)
        .bind(&scope.project)
        .bind(&scope.repository)
        .bind(&wanted)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_file).collect()
    }

    async fn query(&self, query: &SearchQuery) -> Result<RawSearchResponse> {
        let Some(expr) = fts_match_expr(&query.terms()) else {
            return Ok(RawSearchResponse::default());
        };
        let filters = filter_values(&query.filter);

        let count_sql = format!("SELECT COUNT(*) {}", FTS_JOIN);
        let mut count = sqlx::query_scalar::<_, i64>(&count_sql).bind(&expr);
        for value in filters {
            count = count.bind(value).bind(value);
        }
        let total = count.fetch_one(&self.pool).await? as u64;

        if total == 0 {
            return Ok(RawSearchResponse::default());
        }

        let select_sql = format!(
            r#"
            SELECT f.organization, f.project, f.repository, f.blob, f.path, f.ext,
                   f.refs_json, f.content,
                   highlight(file_index_fts, 5, ?, ?) AS marked
            {}
            ORDER BY bm25(file_index_fts), f.organization, f.project, f.repository, f.blob, f.path
            LIMIT ? OFFSET ?
            "#,
            FTS_JOIN
        );
        let mut select = sqlx::query(&select_sql)
            .bind(MARK_OPEN.to_string())
            .bind(MARK_CLOSE.to_string())
            .bind(&expr);
        for value in filters {
            select = select.bind(value).bind(value);
        }
        let rows = select
            .bind(sql_count(query.limit))
            .bind(sql_count(query.offset()))
            .fetch_all(&self.pool)
            .await?;

        let facets = self.facets(&expr, &query.filter).await?;

        let mut hits = Vec::with_capacity(rows.len());
        for row in &rows {
            let doc = row_to_file(row)?;
            let marked: String = row.get("marked");
            let matches = spans_from_marked(&marked);
            hits.push(RawHit {
                source: doc.source(),
                fragments: render_fragments(&doc.content, &matches),
                matches,
                content: Some(doc.content),
            });
        }

        Ok(RawSearchResponse {
            total,
            hits,
            facets,
        })
    }
}
