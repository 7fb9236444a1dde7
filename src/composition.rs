//! Composition search: find where a long source text recurs in the corpus.
//!
//! The source is split into overlapping word windows ([`Chunk`]s, stride
//! one word). Each chunk runs as an adjacent-word phrase query; chunks that
//! match more pages than `max_freq` are treated as boilerplate and skipped.
//! Surviving hits are collected per page, merged and scored.

use std::collections::{BTreeMap, BTreeSet};

use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info};

use crate::{
    error::{Error, Result},
    metadata::MetadataSource,
    planner::{Planner, SearchMode},
    progress::{Monitor, Outcome},
    search::lookup_metadata,
    spans::{
        MatchSpan,
        MergedSpan,
        merge_spans,
        render,
        run_texts,
        total_score,
    },
    tantivy_index::SearchIndex,
    text_util::{Token, tokenize},
};

/// Default words per chunk.
pub const DEFAULT_CHUNK_SIZE: usize = 6;

/// Default number of matching pages above which a chunk is skipped.
pub const DEFAULT_MAX_FREQ: usize = 10;

/// Source words shown on each side of a covered passage.
pub const SOURCE_CONTEXT_WORDS: usize = 15;

/// A window of consecutive source words.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Zero-based chunk index, also the index of its first word.
    pub index: usize,
    /// Lowercased words used for matching.
    pub words: Vec<String>,
    /// The words as they appear in the source, space separated.
    pub text: String,
}

/// Split tokens into windows of `size` words advancing one word at a time.
///
/// Fewer tokens than `size` produce no chunks.
pub fn chunk_words(tokens: &[Token<'_>], size: usize) -> Vec<Chunk> {
    if size == 0 || tokens.len() < size {
        return Vec::new();
    }
    tokens
        .windows(size)
        .enumerate()
        .map(|(index, window)| Chunk {
            index,
            words: window.iter().map(|t| t.normalized.to_string()).collect(),
            text: window.iter().map(|t| t.text).collect::<Vec<_>>().join(" "),
        })
        .collect()
}

#[derive(Debug, Clone, Copy)]
pub struct CompositionParams {
    pub chunk_size: usize,
    pub max_freq: usize,
    pub mode: SearchMode,
}

impl Default for CompositionParams {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_freq: DEFAULT_MAX_FREQ,
            mode: SearchMode::Exact,
        }
    }
}

impl CompositionParams {
    fn validate(&self) -> Result<()> {
        if self.chunk_size < 1 {
            return Err(Error::InvalidConfiguration(
                "chunk size must be at least 1".into(),
            ));
        }
        if !self.mode.is_phrase() {
            return Err(Error::InvalidConfiguration(format!(
                "composition search does not support {} mode",
                self.mode
            )));
        }
        Ok(())
    }
}

/// A corpus page that shares passages with the source.
#[derive(Debug, Clone, Serialize)]
pub struct CompositionMatch {
    pub document_id: String,
    pub system_id: String,
    pub page_no: Option<u32>,
    pub shelfmark: Option<String>,
    pub title: Option<String>,
    pub merged_spans: Vec<MergedSpan>,
    pub total_score: usize,
    /// Indices of the source chunks that hit this page.
    pub src_indices: BTreeSet<usize>,
    /// Page text covered by each merged run.
    pub matched_texts: Vec<String>,
    pub snippet: String,
    /// The covered source passages with surrounding words.
    pub source_context: String,
}

impl CompositionMatch {
    /// Shelfmark for display, or the system id.
    pub fn display_name(&self) -> String {
        let shelfmark = self.shelfmark.as_deref().unwrap_or_default();
        if shelfmark.trim().is_empty() {
            format!("ID: {}", self.system_id)
        } else {
            shelfmark.to_string()
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CompositionReport {
    pub total_chunks: usize,
    /// Chunks processed, including skipped ones.
    pub scanned: usize,
    /// Chunks skipped for matching too many pages.
    pub skipped_common: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Composition {
    pub matches: Vec<CompositionMatch>,
    pub report: CompositionReport,
}

#[derive(Default)]
struct PageHits {
    spans: Vec<MatchSpan>,
    chunks: BTreeSet<usize>,
}

/// Scan `text` chunk by chunk against the index.
pub fn search_composition(
    text: &str,
    params: &CompositionParams,
    index: &SearchIndex,
    planner: &Planner<'_>,
    metadata: &dyn MetadataSource,
    monitor: &mut Monitor<'_>,
) -> Result<Outcome<Composition>> {
    params.validate()?;

    let tokens = tokenize(text);
    let chunks = chunk_words(&tokens, params.chunk_size);
    let total = chunks.len();
    let mut report = CompositionReport {
        total_chunks: total,
        ..CompositionReport::default()
    };
    monitor.start(total);

    let mut pages: BTreeMap<usize, PageHits> = BTreeMap::new();
    let mut cancelled_at = None;
    for chunk in &chunks {
        if monitor.is_cancelled() {
            cancelled_at = Some(chunk.index);
            break;
        }

        let words: Vec<&str> = chunk.words.iter().map(String::as_str).collect();
        let plan = planner.plan_words(&words, params.mode, 0)?;
        let candidates = plan.candidates(index)?;
        report.scanned += 1;

        if candidates.total > params.max_freq {
            debug!(
                chunk = chunk.index,
                text = %chunk.text,
                pages = candidates.total,
                "Skipping common chunk"
            );
            report.skipped_common += 1;
            monitor.update(report.scanned);
            continue;
        }

        let table = index.table();
        let found: Vec<(usize, Vec<MatchSpan>)> = candidates
            .slots
            .par_iter()
            .filter_map(|&slot| {
                let spans = plan.verify(&table.get(slot)?.body);
                (!spans.is_empty()).then_some((slot, spans))
            })
            .collect();
        for (slot, spans) in found {
            let page = pages.entry(slot).or_default();
            page.spans.extend(spans);
            page.chunks.insert(chunk.index);
        }
        monitor.update(report.scanned);
    }

    let matches = build_matches(index, metadata, &tokens, params, pages);
    info!(
        chunks = total,
        skipped = report.skipped_common,
        matches = matches.len(),
        "Composition search finished"
    );

    let composition = Composition { matches, report };
    Ok(match cancelled_at {
        Some(processed) => Outcome::cancelled(composition, processed, total),
        None => Outcome::completed(composition),
    })
}

fn build_matches(
    index: &SearchIndex,
    metadata: &dyn MetadataSource,
    tokens: &[Token<'_>],
    params: &CompositionParams,
    pages: BTreeMap<usize, PageHits>,
) -> Vec<CompositionMatch> {
    let mut matches: Vec<(usize, CompositionMatch)> = pages
        .into_iter()
        .filter_map(|(slot, hits)| {
            let doc = index.table().get(slot)?;
            let merged = merge_spans(&hits.spans);
            Some((
                slot,
                CompositionMatch {
                    document_id: doc.id.clone(),
                    system_id: doc.system_id.clone(),
                    page_no: doc.page_no,
                    shelfmark: None,
                    title: None,
                    total_score: total_score(&merged),
                    matched_texts: run_texts(&doc.body, &merged)
                        .into_iter()
                        .map(str::to_string)
                        .collect(),
                    snippet: render(&doc.body, &merged),
                    source_context: source_context(
                        tokens,
                        &hits.chunks,
                        params.chunk_size,
                    ),
                    merged_spans: merged,
                    src_indices: hits.chunks,
                },
            ))
        })
        .collect();

    let system_ids: Vec<&str> =
        matches.iter().map(|(_, m)| m.system_id.as_str()).collect();
    let meta = lookup_metadata(metadata, &system_ids);
    for (_, m) in &mut matches {
        if let Some(record) = meta.get(&m.system_id) {
            m.shelfmark =
                Some(record.shelfmark.clone()).filter(|s| !s.trim().is_empty());
            m.title = Some(record.title.clone()).filter(|t| !t.is_empty());
        }
    }

    matches.sort_by(|(slot_a, a), (slot_b, b)| {
        b.total_score.cmp(&a.total_score).then(slot_a.cmp(slot_b))
    });
    matches.into_iter().map(|(_, m)| m).collect()
}

/// Render the source passages covered by `chunks` as
/// `... before *passage* after ...`, one line per contiguous passage.
pub fn source_context(
    tokens: &[Token<'_>],
    chunks: &BTreeSet<usize>,
    chunk_size: usize,
) -> String {
    let covered: BTreeSet<usize> = chunks
        .iter()
        .flat_map(|&c| c..(c + chunk_size).min(tokens.len()))
        .collect();

    let mut runs: Vec<(usize, usize)> = Vec::new();
    for i in covered {
        match runs.last_mut() {
            Some((_, end)) if *end + 1 == i => *end = i,
            _ => runs.push((i, i)),
        }
    }

    let join = |range: std::ops::Range<usize>| {
        tokens[range].iter().map(|t| t.text).collect::<Vec<_>>().join(" ")
    };
    runs.into_iter()
        .map(|(start, end)| {
            let before = start.saturating_sub(SOURCE_CONTEXT_WORDS);
            let after = (end + 1 + SOURCE_CONTEXT_WORDS).min(tokens.len());
            format!(
                "... {} *{}* {} ...",
                join(before..start),
                join(start..end + 1),
                join(end + 1..after)
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}
