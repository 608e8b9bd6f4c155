//! `bdx search`: run one page of a query and print it.

use std::fmt::Write as _;

use anyhow::Result;
use blobdex_core::search::SearchQuery;
use blobdex_core::SearchResult;

use crate::config::Config;
use crate::indexer;

pub async fn run_search(config: &Config, query: SearchQuery) -> Result<()> {
    if query.text.trim().is_empty() {
        println!("No results.");
        return Ok(());
    }

    let indexer = indexer::open(config).await?;
    let result = indexer.search_query(&query).await;
    indexer.store().pool().close().await;

    print!("{}", render_result(&result));
    Ok(())
}

/// Human-readable rendering of a result page.
pub fn render_result(result: &SearchResult) -> String {
    let mut out = String::new();
    if result.hits.is_empty() {
        out.push_str("No results.\n");
        return out;
    }

    let first = result.current.saturating_sub(1).saturating_mul(result.limit);
    for (i, hit) in result.hits.iter().enumerate() {
        let m = &hit.source.metadata;
        let refs: Vec<&str> = m.refs.iter().collect();
        let _ = writeln!(
            out,
            "{}. {}/{}/{} {} [{}]",
            first.saturating_add(i + 1),
            m.organization,
            m.project,
            m.repository,
            m.path,
            refs.join(", ")
        );
        let _ = writeln!(out, "    blob: {}", hit.source.blob);
        for preview in &hit.preview {
            for (n, line) in preview.preview.lines().enumerate() {
                let number = preview.offset + n;
                let marker = if preview.hits.contains(&number) { '>' } else { ' ' };
                let _ = writeln!(out, "   {}{:>5}: {}", marker, number, line);
            }
            out.push('\n');
        }
    }

    let _ = writeln!(
        out,
        "{} hits in {:.3}s, page {}{}",
        result.size,
        result.time,
        result.current,
        if result.is_last_page {
            " (last)".to_string()
        } else {
            format!(", next {}", result.next)
        }
    );
    if !result.words.is_empty() {
        let _ = writeln!(out, "matched: {}", result.words.join(", "));
    }
    let exts: Vec<String> = result
        .facets
        .ext
        .iter()
        .filter(|f| !f.ext.is_empty())
        .map(|f| format!("{} ({})", f.ext, f.count))
        .collect();
    if !exts.is_empty() {
        let _ = writeln!(out, "extensions: {}", exts.join(", "));
    }
    out
}
