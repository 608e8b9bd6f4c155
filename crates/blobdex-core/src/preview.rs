//! Line-window previews around matches.
//!
//! Every match is mapped to the line containing its start offset. Each hit
//! line gets `context_lines` lines of context on both sides; windows that
//! overlap or touch are merged, so a cluster of nearby matches renders as a
//! single preview. At most `max_previews` windows are produced per document.
//!
//! Lines longer than `max_line_bytes` are cut on character boundaries: a hit
//! line keeps a slice centred on its first match, a context line keeps its
//! head. Minified or generated files therefore still yield short previews.

use std::collections::BTreeMap;
use std::iter;

use crate::models::TextPreview;
use crate::store::MatchSpan;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PreviewParams {
    pub context_lines: usize,
    pub max_previews: usize,
    pub max_line_bytes: usize,
}

impl Default for PreviewParams {
    fn default() -> Self {
        Self {
            context_lines: 3,
            max_previews: 5,
            max_line_bytes: 240,
        }
    }
}

struct Window {
    start: usize,
    end: usize,
    hits: Vec<usize>,
}

fn floor_boundary(s: &str, mut i: usize) -> usize {
    while !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}

/// At most `max` bytes of `line`, keeping byte `anchor` near the middle.
fn clip_line(line: &str, anchor: usize, max: usize) -> &str {
    if line.len() <= max {
        return line;
    }
    let start = anchor
        .saturating_sub(max / 2)
        .min(line.len() - max);
    let start = floor_boundary(line, start);
    let end = floor_boundary(line, start + max);
    &line[start..end]
}

pub fn build_previews(
    content: &str,
    matches: &[MatchSpan],
    params: &PreviewParams,
) -> Vec<TextPreview> {
    if content.is_empty() || matches.is_empty() || params.max_previews == 0 {
        return Vec::new();
    }

    let line_starts: Vec<usize> = iter::once(0)
        .chain(content.match_indices('\n').map(|(i, _)| i + 1))
        .collect();
    let lines: Vec<&str> = content
        .split('\n')
        .map(|l| l.strip_suffix('\r').unwrap_or(l))
        .collect();
    let last_line = lines.len() - 1;

    // Hit line -> byte offset of its first match within the line.
    let mut anchors: BTreeMap<usize, usize> = BTreeMap::new();
    for m in matches.iter().filter(|m| m.start < content.len()) {
        let line = line_starts.partition_point(|&s| s <= m.start) - 1;
        let column = m.start - line_starts[line];
        anchors
            .entry(line)
            .and_modify(|c| *c = (*c).min(column))
            .or_insert(column);
    }
    let hit_lines: Vec<usize> = anchors.keys().copied().collect();

    let mut windows: Vec<Window> = Vec::new();
    for line in hit_lines {
        let start = line.saturating_sub(params.context_lines);
        let end = (line + params.context_lines).min(last_line);
        match windows.last_mut() {
            Some(w) if start <= w.end + 1 => {
                w.end = w.end.max(end);
                w.hits.push(line);
            }
            _ => {
                if windows.len() == params.max_previews {
                    break;
                }
                windows.push(Window {
                    start,
                    end,
                    hits: vec![line],
                });
            }
        }
    }

    windows
        .into_iter()
        .map(|w| {
            let preview: Vec<&str> = (w.start..=w.end)
                .map(|l| {
                    let anchor = anchors.get(&l).copied().unwrap_or(0);
                    clip_line(lines[l], anchor, params.max_line_bytes.max(1))
                })
                .collect();
            TextPreview {
                offset: w.start + 1,
                preview: preview.join("\n"),
                hits: w.hits.into_iter().map(|l| l + 1).collect(),
            }
        })
        .collect()
}
