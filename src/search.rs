use std::collections::HashMap;

use serde::Serialize;
use tracing::{info, warn};

use crate::{
    error::Result,
    metadata::{ManuscriptMeta, MetadataSource, display_shelfmark},
    planner::{Planner, RawHits, SearchMode},
    progress::{Completion, Monitor, Outcome},
    spans::{MergedSpan, merge_spans, render, total_score},
    tantivy_index::SearchIndex,
    text_util::{DEFAULT_PREVIEW_CHARS, preview},
};

/// One search request.
#[derive(Debug, Clone)]
pub struct SearchParams {
    pub query: String,
    pub mode: SearchMode,
    /// Intervening words allowed between consecutive query words.
    pub gap: usize,
    /// Keep at most this many hits.
    pub limit: Option<usize>,
}

impl SearchParams {
    pub fn new(query: impl Into<String>, mode: SearchMode, gap: usize) -> Self {
        Self {
            query: query.into(),
            mode,
            gap,
            limit: None,
        }
    }
}

/// A matching page with its merged, scored spans.
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub rank: usize,
    pub document_id: String,
    pub system_id: String,
    pub page_no: Option<u32>,
    pub shelfmark: String,
    pub title: String,
    pub merged_spans: Vec<MergedSpan>,
    pub total_score: usize,
    pub snippet: String,
}

/// Execute a search.
///
/// 1. Plan the query (bad regex patterns fail here)
/// 2. Retrieve and verify candidate pages
/// 3. Merge spans per page and score
/// 4. Attach catalogue metadata, rank by score, apply the limit
pub fn execute_search(
    params: &SearchParams,
    index: &SearchIndex,
    planner: &Planner<'_>,
    metadata: &dyn MetadataSource,
    monitor: &mut Monitor<'_>,
) -> Result<Outcome<Vec<SearchHit>>> {
    // Stage 1: planning
    let plan = planner.plan(&params.query, params.mode, params.gap)?;

    // Stage 2: retrieval and verification
    let outcome = plan.execute(index, metadata, monitor)?;
    let completion = outcome.completion;

    // Stage 3: merge and score
    let mut hits: Vec<(usize, SearchHit)> = outcome
        .value
        .into_iter()
        .filter_map(|raw| build_hit(index, raw))
        .collect();

    // Stage 4: metadata, ranking, limit
    let system_ids: Vec<&str> =
        hits.iter().map(|(_, h)| h.system_id.as_str()).collect();
    let meta = lookup_metadata(metadata, &system_ids);
    for (_, hit) in &mut hits {
        let record = meta.get(&hit.system_id);
        hit.shelfmark = display_shelfmark(record, &hit.system_id);
        hit.title = record.map(|m| m.title.clone()).unwrap_or_default();
    }

    hits.sort_by(|(slot_a, a), (slot_b, b)| {
        b.total_score.cmp(&a.total_score).then(slot_a.cmp(slot_b))
    });
    let limit = params.limit.unwrap_or(usize::MAX);
    let hits: Vec<SearchHit> = hits
        .into_iter()
        .take(limit)
        .enumerate()
        .map(|(i, (_, mut hit))| {
            hit.rank = i + 1;
            hit
        })
        .collect();

    info!(
        query = %params.query,
        mode = %params.mode,
        gap = params.gap,
        hits = hits.len(),
        cancelled = matches!(completion, Completion::Cancelled { .. }),
        "Search finished"
    );
    Ok(Outcome {
        value: hits,
        completion,
    })
}

fn build_hit(index: &SearchIndex, raw: RawHits) -> Option<(usize, SearchHit)> {
    let doc = index.table().get(raw.slot)?;
    let merged = merge_spans(&raw.spans);
    let snippet = if merged.is_empty() {
        preview(&doc.body, DEFAULT_PREVIEW_CHARS)
    } else {
        render(&doc.body, &merged)
    };

    Some((
        raw.slot,
        SearchHit {
            rank: 0, // Set after sorting
            document_id: doc.id.clone(),
            system_id: doc.system_id.clone(),
            page_no: doc.page_no,
            shelfmark: String::new(),
            title: String::new(),
            total_score: total_score(&merged),
            merged_spans: merged,
            snippet,
        },
    ))
}

/// Batch metadata lookup that never fails the caller.
pub fn lookup_metadata(
    metadata: &dyn MetadataSource,
    system_ids: &[&str],
) -> HashMap<String, ManuscriptMeta> {
    if system_ids.is_empty() {
        return HashMap::new();
    }
    let mut unique = system_ids.to_vec();
    unique.sort_unstable();
    unique.dedup();
    metadata.lookup(&unique).unwrap_or_else(|e| {
        warn!(error = %e, "Metadata lookup failed, using raw ids");
        HashMap::new()
    })
}

/// Format hits for terminal output.
pub fn format_human(hits: &[SearchHit]) -> String {
    if hits.is_empty() {
        return "No results found.\n".to_string();
    }

    let mut out = String::new();
    for h in hits {
        let page = h
            .page_no
            .map(|p| format!(" p.{p}"))
            .unwrap_or_default();
        out.push_str(&format!(
            "{:>3}. [{}] {}{} ({})\n",
            h.rank, h.total_score, h.shelfmark, page, h.document_id
        ));
        if !h.title.is_empty() {
            out.push_str(&format!("     {}\n", h.title));
        }
        for line in h.snippet.lines() {
            out.push_str(&format!("     {line}\n"));
        }
        out.push('\n');
    }
    out.push_str(&format!("{} result(s)\n", hits.len()));
    out
}

#[derive(Serialize)]
struct JsonReport<'a> {
    query: &'a str,
    mode: SearchMode,
    gap: usize,
    completion: Completion,
    result_count: usize,
    results: &'a [SearchHit],
}

/// Format hits as a JSON document.
pub fn format_json(
    params: &SearchParams,
    outcome: &Outcome<Vec<SearchHit>>,
) -> Result<String> {
    Ok(serde_json::to_string_pretty(&JsonReport {
        query: &params.query,
        mode: params.mode,
        gap: params.gap,
        completion: outcome.completion,
        result_count: outcome.value.len(),
        results: &outcome.value,
    })?)
}
