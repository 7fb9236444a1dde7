//! Span merging, scoring and snippet rendering.
//!
//! Offsets are character positions in a document body. Raw spans from one
//! or more query expansions are merged into runs when they lie within
//! [`MERGE_GAP`] characters of each other; a run scores its covered length.

use serde::Serialize;

use crate::text_util::CharMap;

/// Spans closer than this many characters are merged into one run.
pub const MERGE_GAP: usize = 20;

/// Characters of context shown on each side of a run.
pub const SNIPPET_CONTEXT: usize = 60;

/// Separator between the rendered runs of one document.
pub const SNIPPET_SEPARATOR: &str = "\n...\n";

/// Half-open character range of one raw match.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize,
)]
pub struct MatchSpan {
    pub start: usize,
    pub end: usize,
}

impl MatchSpan {
    pub fn new(start: usize, end: usize) -> Self {
        debug_assert!(start < end, "empty span {start}..{end}");
        Self { start, end }
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }
}

/// A run of merged spans.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct MergedSpan {
    pub start: usize,
    pub end: usize,
    pub score: usize,
}

impl MergedSpan {
    fn new(start: usize, end: usize) -> Self {
        Self {
            start,
            end,
            score: end - start,
        }
    }

    pub fn as_match(&self) -> MatchSpan {
        MatchSpan::new(self.start, self.end)
    }
}

/// Merge raw spans in any order into sorted, well-separated runs.
pub fn merge_spans(spans: &[MatchSpan]) -> Vec<MergedSpan> {
    let mut sorted: Vec<MatchSpan> =
        spans.iter().copied().filter(|s| !s.is_empty()).collect();
    sorted.sort_unstable();

    let mut merged = Vec::new();
    let mut iter = sorted.into_iter();
    let Some(first) = iter.next() else {
        return merged;
    };

    let (mut start, mut end) = (first.start, first.end);
    for span in iter {
        if span.start <= end + MERGE_GAP {
            end = end.max(span.end);
        } else {
            merged.push(MergedSpan::new(start, end));
            start = span.start;
            end = span.end;
        }
    }
    merged.push(MergedSpan::new(start, end));
    merged
}

pub fn total_score(runs: &[MergedSpan]) -> usize {
    runs.iter().map(|r| r.score).sum()
}

/// Text covered by each run, in run order.
pub fn run_texts<'a>(body: &'a str, runs: &[MergedSpan]) -> Vec<&'a str> {
    let map = CharMap::new(body);
    runs.iter()
        .map(|r| map.slice(body, r.start, r.end))
        .collect()
}

/// One rendered run: context, the starred match, context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Snippet {
    pub start: usize,
    pub score: usize,
    pub text: String,
}

/// Render each run with surrounding context, highest score first and
/// earlier runs first among equal scores.
pub fn render_snippets(body: &str, runs: &[MergedSpan]) -> Vec<Snippet> {
    let map = CharMap::new(body);
    let len = map.char_len();

    let mut snippets: Vec<Snippet> = runs
        .iter()
        .map(|run| {
            let start = run.start.min(len);
            let end = run.end.min(len);
            let before = start.saturating_sub(SNIPPET_CONTEXT);
            let after = (end + SNIPPET_CONTEXT).min(len);
            Snippet {
                start: run.start,
                score: run.score,
                text: format!(
                    "{}*{}*{}",
                    map.slice(body, before, start),
                    map.slice(body, start, end),
                    map.slice(body, end, after),
                ),
            }
        })
        .collect();

    snippets.sort_by(|a, b| b.score.cmp(&a.score).then(a.start.cmp(&b.start)));
    snippets
}

/// All rendered runs joined by [`SNIPPET_SEPARATOR`].
pub fn render(body: &str, runs: &[MergedSpan]) -> String {
    render_snippets(body, runs)
        .into_iter()
        .map(|s| s.text)
        .collect::<Vec<_>>()
        .join(SNIPPET_SEPARATOR)
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn span(start: usize, end: usize) -> MatchSpan {
        MatchSpan::new(start, end)
    }

    #[test]
    fn merges_within_gap() {
        let runs = merge_spans(&[span(51, 56), span(0, 5), span(25, 30)]);
        // 5 + 20 reaches 25, but 30 + 20 falls short of 51
        assert_eq!(
            runs,
            vec![MergedSpan::new(0, 30), MergedSpan::new(51, 56)]
        );
        assert_eq!(total_score(&runs), 35);
    }

    #[test]
    fn contained_spans_do_not_extend() {
        let runs = merge_spans(&[span(0, 40), span(10, 12)]);
        assert_eq!(runs, vec![MergedSpan::new(0, 40)]);
    }

    #[test]
    fn empty_input() {
        assert!(merge_spans(&[]).is_empty());
        assert_eq!(render("abc", &[]), "");
    }

    #[test]
    fn snippet_context_is_clipped() {
        let body = "שלום עולם טוב";
        let runs = merge_spans(&[span(5, 9)]);
        assert_eq!(render(body, &runs), "שלום *עולם* טוב");
        assert_eq!(run_texts(body, &runs), vec!["עולם"]);
    }

    #[test]
    fn snippet_context_is_sixty_chars() {
        let body = format!("{}MATCH{}", "a".repeat(100), "b".repeat(100));
        let runs = merge_spans(&[span(100, 105)]);
        let text = render(&body, &runs);
        assert_eq!(
            text,
            format!("{}*MATCH*{}", "a".repeat(60), "b".repeat(60))
        );
    }

    #[test]
    fn longer_run_is_rendered_first() {
        let body: String = ('a'..='z').cycle().take(120).collect();
        let runs = merge_spans(&[span(6, 11), span(47, 75)]);
        assert_eq!(runs.len(), 2);

        let snippets = render_snippets(&body, &runs);
        assert_eq!(snippets[0].start, 47);
        assert_eq!(snippets[0].score, 28);
        assert_eq!(snippets[1].start, 6);

        let joined = render(&body, &runs);
        let parts: Vec<&str> = joined.split(SNIPPET_SEPARATOR).collect();
        assert_eq!(
            parts,
            vec![snippets[0].text.as_str(), snippets[1].text.as_str()]
        );
    }

    #[test]
    fn equal_scores_keep_document_order() {
        let body = "x".repeat(200);
        let runs = merge_spans(&[span(150, 155), span(10, 15)]);
        let snippets = render_snippets(&body, &runs);
        assert_eq!(snippets[0].start, 10);
        assert_eq!(snippets[1].start, 150);
    }

    fn arb_spans() -> impl Strategy<Value = Vec<MatchSpan>> {
        prop::collection::vec(
            (0usize..500, 1usize..40).prop_map(|(s, l)| span(s, s + l)),
            0..30,
        )
    }

    proptest! {
        #[test]
        fn runs_are_separated(spans in arb_spans()) {
            let runs = merge_spans(&spans);
            for pair in runs.windows(2) {
                prop_assert!(pair[1].start > pair[0].end + MERGE_GAP);
            }
            for s in &spans {
                prop_assert!(runs
                    .iter()
                    .any(|r| r.start <= s.start && s.end <= r.end));
            }
        }

        #[test]
        fn merging_is_idempotent(spans in arb_spans()) {
            let runs = merge_spans(&spans);
            let again: Vec<MatchSpan> =
                runs.iter().map(MergedSpan::as_match).collect();
            prop_assert_eq!(merge_spans(&again), runs);
        }

        #[test]
        fn score_ignores_input_order(spans in arb_spans()) {
            let runs = merge_spans(&spans);
            let mut reversed = spans.clone();
            reversed.reverse();
            let reversed_runs = merge_spans(&reversed);
            prop_assert_eq!(total_score(&runs), total_score(&reversed_runs));
            prop_assert_eq!(
                total_score(&runs),
                runs.iter().map(|r| r.end - r.start).sum::<usize>()
            );
        }
    }
}
