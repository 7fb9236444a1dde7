//! Query planning and verification.
//!
//! A [`QueryPlan`] turns a query string, a [`SearchMode`] and a word gap
//! into two things: a tantivy query that narrows the corpus to candidate
//! pages, and a verifier that finds the exact character spans inside each
//! candidate body. Regex plans skip retrieval and scan every page; field
//! plans ask a [`MetadataSource`] instead of the body index.

use std::{
    collections::HashSet,
    str::FromStr,
    sync::LazyLock,
};

use levenshtein_automata::{DFA, Distance, LevenshteinAutomatonBuilder};
use rayon::prelude::*;
use regex::{Regex, RegexBuilder};
use serde::Serialize;
use tantivy::{
    Term,
    query::{
        BooleanQuery,
        FuzzyTermQuery,
        Occur,
        Query,
        TermQuery,
        TermSetQuery,
    },
    schema::{Field, IndexRecordOption},
};
use tracing::{debug, warn};

use crate::{
    error::{Error, Result},
    metadata::{MetaField, MetadataSource},
    progress::{Monitor, Outcome},
    spans::MatchSpan,
    tantivy_index::{Candidates, DocumentTable, SearchIndex},
    text_util::{CharMap, Token, tokenize},
    variants::{DEFAULT_VARIANT_LIMIT, Tier, VariantTable},
};

/// Default cap on candidate pages retrieved per query.
pub const DEFAULT_CANDIDATE_LIMIT: usize = 5000;

/// Candidate pages verified per parallel batch.
pub const VERIFY_BATCH: usize = 256;

static LEVENSHTEIN: LazyLock<[LevenshteinAutomatonBuilder; 3]> =
    LazyLock::new(|| {
        [0, 1, 2].map(|d| LevenshteinAutomatonBuilder::new(d, true))
    });

static CONTENT_PAGE_RE: LazyLock<Regex> = LazyLock::new(|| {
    let word = r"[\w\x{0590}-\x{05FF}]{4,}";
    Regex::new(&format!(r"{word}\s+{word}\s+{word}")).expect("valid regex")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchMode {
    Exact,
    Variants,
    Extended,
    Maximum,
    Fuzzy,
    Regex,
    TitleField,
    ShelfmarkField,
}

impl SearchMode {
    pub const ALL: [SearchMode; 8] = [
        SearchMode::Exact,
        SearchMode::Variants,
        SearchMode::Extended,
        SearchMode::Maximum,
        SearchMode::Fuzzy,
        SearchMode::Regex,
        SearchMode::TitleField,
        SearchMode::ShelfmarkField,
    ];

    /// Variant tier for the token modes.
    pub fn tier(self) -> Option<Tier> {
        match self {
            SearchMode::Exact => Some(Tier::Exact),
            SearchMode::Variants => Some(Tier::Variants),
            SearchMode::Extended => Some(Tier::Extended),
            SearchMode::Maximum => Some(Tier::Maximum),
            _ => None,
        }
    }

    /// Whether the mode matches word sequences in page bodies.
    pub fn is_phrase(self) -> bool {
        self.tier().is_some() || self == SearchMode::Fuzzy
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SearchMode::Exact => "exact",
            SearchMode::Variants => "variants",
            SearchMode::Extended => "extended",
            SearchMode::Maximum => "maximum",
            SearchMode::Fuzzy => "fuzzy",
            SearchMode::Regex => "regex",
            SearchMode::TitleField => "title",
            SearchMode::ShelfmarkField => "shelfmark",
        }
    }
}

impl std::fmt::Display for SearchMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SearchMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        SearchMode::ALL
            .into_iter()
            .find(|m| m.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| {
                Error::InvalidConfiguration(format!(
                    "unknown search mode '{s}'"
                ))
            })
    }
}

/// Edit distance allowed for a token in fuzzy mode.
pub fn fuzzy_distance(token: &str) -> u8 {
    match token.chars().count() {
        0..=2 => 0,
        3..=4 => 1,
        _ => 2,
    }
}

/// Accepts the body words one query token may match.
pub struct TokenMatcher {
    token: String,
    kind: MatcherKind,
}

enum MatcherKind {
    Forms {
        forms: Vec<String>,
        lookup: HashSet<String>,
    },
    Fuzzy {
        distance: u8,
        dfa: DFA,
    },
}

impl TokenMatcher {
    fn forms(token: &str, forms: Vec<String>) -> Self {
        Self {
            token: token.to_string(),
            kind: MatcherKind::Forms {
                lookup: forms.iter().cloned().collect(),
                forms,
            },
        }
    }

    fn fuzzy(token: &str) -> Self {
        let distance = fuzzy_distance(token);
        let dfa = LEVENSHTEIN[usize::from(distance)].build_dfa(token);
        Self {
            token: token.to_string(),
            kind: MatcherKind::Fuzzy { distance, dfa },
        }
    }

    /// The normalized query token.
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Spellings accepted for this token; empty for fuzzy matchers.
    pub fn accepted_forms(&self) -> &[String] {
        match &self.kind {
            MatcherKind::Forms { forms, .. } => forms,
            MatcherKind::Fuzzy { .. } => &[],
        }
    }

    /// Test a normalized body word.
    pub fn matches(&self, word: &str) -> bool {
        match &self.kind {
            MatcherKind::Forms { lookup, .. } => lookup.contains(word),
            MatcherKind::Fuzzy { dfa, .. } => {
                matches!(dfa.eval(word), Distance::Exact(_))
            }
        }
    }

    fn clause(&self, body: Field) -> Box<dyn Query> {
        let term = |text: &str| Term::from_field_text(body, text);
        match &self.kind {
            MatcherKind::Forms { forms, .. } if forms.len() == 1 => Box::new(
                TermQuery::new(term(&forms[0]), IndexRecordOption::Basic),
            ),
            MatcherKind::Forms { forms, .. } => Box::new(TermSetQuery::new(
                forms.iter().map(|f| term(f)),
            )),
            MatcherKind::Fuzzy { distance: 0, .. } => Box::new(TermQuery::new(
                term(&self.token),
                IndexRecordOption::Basic,
            )),
            MatcherKind::Fuzzy { distance, .. } => Box::new(
                FuzzyTermQuery::new(term(&self.token), *distance, true),
            ),
        }
    }
}

enum PlanKind {
    Phrase(Vec<TokenMatcher>),
    Pattern(Regex),
    Field(MetaField, String),
}

/// Matches inside one page, before merging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawHits {
    pub slot: usize,
    pub spans: Vec<MatchSpan>,
}

/// Builds [`QueryPlan`]s.
#[derive(Debug, Clone, Copy)]
pub struct Planner<'v> {
    variants: &'v VariantTable,
    pub variant_limit: usize,
    pub candidate_limit: usize,
}

impl<'v> Planner<'v> {
    pub fn new(variants: &'v VariantTable) -> Self {
        Self {
            variants,
            variant_limit: DEFAULT_VARIANT_LIMIT,
            candidate_limit: DEFAULT_CANDIDATE_LIMIT,
        }
    }

    pub fn with_limits(
        mut self,
        variant_limit: usize,
        candidate_limit: usize,
    ) -> Self {
        self.variant_limit = variant_limit.max(1);
        self.candidate_limit = candidate_limit.max(1);
        self
    }

    pub fn variants(&self) -> &'v VariantTable {
        self.variants
    }

    /// Plan a query string. Regex patterns are compiled here, so a bad
    /// pattern fails before any page is scanned.
    pub fn plan(
        &self,
        query: &str,
        mode: SearchMode,
        gap: usize,
    ) -> Result<QueryPlan> {
        let kind = match mode {
            SearchMode::Regex => {
                let regex = RegexBuilder::new(query)
                    .case_insensitive(true)
                    .build()
                    .map_err(|source| Error::InvalidPattern {
                        pattern: query.to_string(),
                        source,
                    })?;
                PlanKind::Pattern(regex)
            }
            SearchMode::TitleField => {
                PlanKind::Field(MetaField::Title, query.trim().to_string())
            }
            SearchMode::ShelfmarkField => {
                PlanKind::Field(MetaField::Shelfmark, query.trim().to_string())
            }
            _ => {
                let tokens = tokenize(query);
                let words: Vec<&str> =
                    tokens.iter().map(|t| t.normalized.as_ref()).collect();
                return self.plan_words(&words, mode, gap);
            }
        };

        Ok(QueryPlan {
            mode,
            gap,
            candidate_limit: self.candidate_limit,
            kind,
        })
    }

    /// Plan a phrase from already tokenized, lowercased words.
    pub fn plan_words(
        &self,
        words: &[&str],
        mode: SearchMode,
        gap: usize,
    ) -> Result<QueryPlan> {
        let matchers = match (mode, mode.tier()) {
            (_, Some(tier)) => words
                .iter()
                .map(|w| {
                    TokenMatcher::forms(
                        w,
                        self.variants.expand(w, tier, self.variant_limit),
                    )
                })
                .collect(),
            (SearchMode::Fuzzy, None) => {
                words.iter().map(|w| TokenMatcher::fuzzy(w)).collect()
            }
            _ => {
                return Err(Error::InvalidConfiguration(format!(
                    "{mode} mode does not match word sequences"
                )));
            }
        };

        Ok(QueryPlan {
            mode,
            gap: if mode == SearchMode::Fuzzy { 0 } else { gap },
            candidate_limit: self.candidate_limit,
            kind: PlanKind::Phrase(matchers),
        })
    }
}

/// An executable query.
pub struct QueryPlan {
    mode: SearchMode,
    gap: usize,
    candidate_limit: usize,
    kind: PlanKind,
}

impl QueryPlan {
    pub fn mode(&self) -> SearchMode {
        self.mode
    }

    /// Intervening words allowed between consecutive query tokens.
    pub fn gap(&self) -> usize {
        self.gap
    }

    /// Token matchers of a phrase plan; empty for other plans.
    pub fn tokens(&self) -> &[TokenMatcher] {
        match &self.kind {
            PlanKind::Phrase(m) => m,
            _ => &[],
        }
    }

    /// The retrieval query for a phrase plan with at least one token.
    pub fn retrieval_query(&self, body: Field) -> Option<Box<dyn Query>> {
        let PlanKind::Phrase(matchers) = &self.kind else {
            return None;
        };
        if matchers.is_empty() {
            return None;
        }
        let clauses = matchers
            .iter()
            .map(|m| (Occur::Must, m.clause(body)))
            .collect();
        Some(Box::new(BooleanQuery::new(clauses)))
    }

    /// Pages worth verifying. Regex plans consider every page; field plans
    /// and empty phrases have none.
    pub fn candidates(&self, index: &SearchIndex) -> Result<Candidates> {
        match &self.kind {
            PlanKind::Pattern(_) => {
                let n = index.len();
                Ok(Candidates {
                    total: n,
                    slots: (0..n).collect(),
                })
            }
            PlanKind::Phrase(_) => {
                let Some(query) = self.retrieval_query(index.fields().body)
                else {
                    return Ok(Candidates::default());
                };
                let found = index.candidates(&*query, self.candidate_limit)?;
                if found.is_truncated() {
                    warn!(
                        matched = found.total,
                        kept = found.slots.len(),
                        "Candidate set truncated"
                    );
                }
                Ok(found)
            }
            PlanKind::Field(..) => Ok(Candidates::default()),
        }
    }

    /// Find every match in `body`.
    pub fn verify(&self, body: &str) -> Vec<MatchSpan> {
        match &self.kind {
            PlanKind::Phrase(matchers) => {
                find_phrases(&tokenize(body), matchers, self.gap)
            }
            PlanKind::Pattern(regex) => {
                let map = CharMap::new(body);
                regex
                    .find_iter(body)
                    .filter(|m| !m.is_empty())
                    .map(|m| {
                        MatchSpan::new(
                            map.char_at_byte(m.start()),
                            map.char_at_byte(m.end()),
                        )
                    })
                    .collect()
            }
            PlanKind::Field(..) => Vec::new(),
        }
    }

    /// Run the plan against `index`, returning raw matches per page in
    /// page load order.
    pub fn execute(
        &self,
        index: &SearchIndex,
        metadata: &dyn MetadataSource,
        monitor: &mut Monitor<'_>,
    ) -> Result<Outcome<Vec<RawHits>>> {
        if let PlanKind::Field(field, query) = &self.kind {
            return execute_field(index, metadata, *field, query, monitor);
        }

        let candidates = self.candidates(index)?;
        debug!(
            mode = %self.mode,
            candidates = candidates.slots.len(),
            "Verifying candidates"
        );
        Ok(verify_slots(index.table(), &candidates.slots, monitor, |body| {
            self.verify(body)
        }))
    }
}

impl std::fmt::Debug for QueryPlan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut s = f.debug_struct("QueryPlan");
        s.field("mode", &self.mode).field("gap", &self.gap);
        match &self.kind {
            PlanKind::Phrase(m) => {
                let tokens: Vec<&str> = m.iter().map(|t| t.token()).collect();
                s.field("tokens", &tokens)
            }
            PlanKind::Pattern(r) => s.field("pattern", &r.as_str()),
            PlanKind::Field(field, q) => {
                s.field("field", field).field("query", q)
            }
        };
        s.finish()
    }
}

/// Verify `slots` in parallel batches. Progress and cancellation are
/// handled between batches on the calling thread.
pub fn verify_slots<F>(
    table: &DocumentTable,
    slots: &[usize],
    monitor: &mut Monitor<'_>,
    verify: F,
) -> Outcome<Vec<RawHits>>
where
    F: Fn(&str) -> Vec<MatchSpan> + Sync,
{
    let total = slots.len();
    monitor.start(total);

    let mut hits = Vec::new();
    let mut done = 0;
    for batch in slots.chunks(VERIFY_BATCH) {
        if monitor.is_cancelled() {
            return Outcome::cancelled(hits, done, total);
        }
        let found: Vec<RawHits> = batch
            .par_iter()
            .filter_map(|&slot| {
                let doc = table.get(slot)?;
                let spans = verify(&doc.body);
                (!spans.is_empty()).then_some(RawHits { slot, spans })
            })
            .collect();
        hits.extend(found);
        done += batch.len();
        monitor.update(done);
    }

    Outcome::completed(hits)
}

fn execute_field(
    index: &SearchIndex,
    metadata: &dyn MetadataSource,
    field: MetaField,
    query: &str,
    monitor: &mut Monitor<'_>,
) -> Result<Outcome<Vec<RawHits>>> {
    let system_ids = metadata.find(field, query)?;
    let total = system_ids.len();
    monitor.start(total);

    let mut hits = Vec::new();
    for (i, system_id) in system_ids.iter().enumerate() {
        if monitor.is_cancelled() {
            return Ok(Outcome::cancelled(hits, i, total));
        }
        if let Some(slot) = representative_page(index.table(), system_id) {
            hits.push(RawHits {
                slot,
                spans: Vec::new(),
            });
        }
        monitor.update(i + 1);
    }
    Ok(Outcome::completed(hits))
}

/// The first page of a manuscript that carries running text (three
/// consecutive words of four or more letters), else its first page.
pub fn representative_page(
    table: &DocumentTable,
    system_id: &str,
) -> Option<usize> {
    let slots = table.page_slots(system_id);
    slots
        .iter()
        .copied()
        .find(|&s| {
            table
                .get(s)
                .is_some_and(|d| CONTENT_PAGE_RE.is_match(&d.body))
        })
        .or_else(|| slots.first().copied())
}

/// Every non-overlapping occurrence of the phrase in `words`.
fn find_phrases(
    words: &[Token<'_>],
    matchers: &[TokenMatcher],
    gap: usize,
) -> Vec<MatchSpan> {
    if matchers.is_empty() || words.len() < matchers.len() {
        return Vec::new();
    }

    let mut failed = HashSet::new();
    let mut spans = Vec::new();
    let mut i = 0;
    while i < words.len() {
        if matchers[0].matches(&words[i].normalized)
            && let Some(end) =
                extend_phrase(words, matchers, gap, 0, i, &mut failed)
        {
            spans.push(MatchSpan::new(words[i].start, words[end].end));
            i = end + 1;
            continue;
        }
        i += 1;
    }
    spans
}

/// Given query token `q` matched at word `pos`, find the word where the
/// rest of the phrase completes. Dead ends are remembered in `failed`.
fn extend_phrase(
    words: &[Token<'_>],
    matchers: &[TokenMatcher],
    gap: usize,
    q: usize,
    pos: usize,
    failed: &mut HashSet<(usize, usize)>,
) -> Option<usize> {
    if q + 1 == matchers.len() {
        return Some(pos);
    }
    if failed.contains(&(q, pos)) {
        return None;
    }

    let last = (pos + 1 + gap).min(words.len() - 1);
    for next in pos + 1..=last {
        if matchers[q + 1].matches(&words[next].normalized)
            && let Some(end) =
                extend_phrase(words, matchers, gap, q + 1, next, failed)
        {
            return Some(end);
        }
    }

    failed.insert((q, pos));
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        corpus::Document,
        metadata::{ManuscriptMeta, MetadataBank},
        progress::CancelFlag,
    };

    fn planner() -> Planner<'static> {
        Planner::new(VariantTable::builtin())
    }

    fn spans(plan: &QueryPlan, body: &str) -> Vec<(usize, usize)> {
        plan.verify(body).iter().map(|s| (s.start, s.end)).collect()
    }

    fn corpus() -> SearchIndex {
        SearchIndex::build_in_ram(&[
            Document::new("d1", "990000000011", Some(1), "שלום עולם טוב"),
            Document::new("d2", "990000000022", Some(1), "שלום חבר טוב"),
            Document::new("d3", "990000000033", Some(1), "אחר"),
        ])
        .unwrap()
    }

    fn run(plan: &QueryPlan, index: &SearchIndex) -> Vec<String> {
        plan.execute(index, &MetadataBank::new(), &mut Monitor::silent())
            .unwrap()
            .value
            .iter()
            .map(|h| index.table().get(h.slot).unwrap().id.clone())
            .collect()
    }

    #[test]
    fn mode_names_round_trip() {
        for mode in SearchMode::ALL {
            assert_eq!(mode.as_str().parse::<SearchMode>().unwrap(), mode);
        }
        assert!("bogus".parse::<SearchMode>().is_err());
    }

    #[test]
    fn fuzzy_distance_by_length() {
        assert_eq!(fuzzy_distance("אב"), 0);
        assert_eq!(fuzzy_distance("אבג"), 1);
        assert_eq!(fuzzy_distance("אבגד"), 1);
        assert_eq!(fuzzy_distance("אבגדה"), 2);
    }

    #[test]
    fn exact_phrase_adjacency() {
        let plan = planner().plan("עולם טוב", SearchMode::Exact, 0).unwrap();
        assert_eq!(spans(&plan, "שלום עולם טוב"), vec![(5, 13)]);
        assert!(spans(&plan, "עולם גדול טוב").is_empty());
    }

    #[test]
    fn gap_allows_intervening_words() {
        let plan = planner().plan("שלום טוב", SearchMode::Exact, 1).unwrap();
        assert_eq!(spans(&plan, "שלום עולם טוב"), vec![(0, 13)]);
        assert!(spans(&plan, "שלום עולם גדול טוב").is_empty());

        let wide = planner().plan("שלום טוב", SearchMode::Exact, 2).unwrap();
        assert_eq!(spans(&wide, "שלום עולם גדול טוב").len(), 1);
    }

    #[test]
    fn all_occurrences_without_overlap() {
        let plan = planner().plan("אב אב", SearchMode::Exact, 0).unwrap();
        assert_eq!(
            spans(&plan, "אב אב אב אב"),
            vec![(0, 5), (6, 11)]
        );
    }

    #[test]
    fn backtracks_past_a_dead_end() {
        // the first candidate for the second token leads nowhere
        let plan = planner().plan("א ב ג", SearchMode::Exact, 1).unwrap();
        assert_eq!(spans(&plan, "א ב ב ד ג"), vec![(0, 9)]);
    }

    #[test]
    fn matching_ignores_case_and_punctuation() {
        let plan = planner().plan("Hello World", SearchMode::Exact, 0).unwrap();
        assert_eq!(spans(&plan, "say: hello, WORLD!"), vec![(5, 17)]);
    }

    #[test]
    fn variants_accept_confusable_letters() {
        let plan = planner().plan("דבר", SearchMode::Variants, 0).unwrap();
        assert!(plan.tokens()[0].accepted_forms().contains(&"רבר".into()));
        assert_eq!(spans(&plan, "רבר טוב"), vec![(0, 3)]);

        let exact = planner().plan("דבר", SearchMode::Exact, 0).unwrap();
        assert!(spans(&exact, "רבר טוב").is_empty());
    }

    #[test]
    fn fuzzy_ignores_gap_and_allows_edits() {
        let plan = planner().plan("ירושלים", SearchMode::Fuzzy, 3).unwrap();
        assert_eq!(plan.gap(), 0);
        assert_eq!(spans(&plan, "בירושלם הבנויה"), vec![(0, 7)]);
        assert!(spans(&plan, "ירו").is_empty());
    }

    #[test]
    fn regex_is_case_insensitive_with_char_offsets() {
        let plan = planner().plan("w.rld", SearchMode::Regex, 0).unwrap();
        assert_eq!(spans(&plan, "שלום WORLD"), vec![(5, 10)]);

        let empty = planner().plan("x*", SearchMode::Regex, 0).unwrap();
        assert!(spans(&empty, "abc").is_empty());
    }

    #[test]
    fn invalid_regex_is_rejected_up_front() {
        let err =
            planner().plan("(unclosed", SearchMode::Regex, 0).unwrap_err();
        assert!(matches!(err, Error::InvalidPattern { .. }));
    }

    #[test]
    fn field_modes_do_not_plan_words() {
        let err = planner()
            .plan_words(&["שלום"], SearchMode::TitleField, 0)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidConfiguration(_)));
    }

    #[test]
    fn execute_exact_with_gap() {
        let index = corpus();
        let plan =
            planner().plan("שלום ... טוב", SearchMode::Exact, 1).unwrap();
        assert_eq!(run(&plan, &index), vec!["d1", "d2"]);
    }

    #[test]
    fn execute_regex_scans_all_pages() {
        let index = corpus();
        let plan = planner().plan("ח.?ר", SearchMode::Regex, 0).unwrap();
        assert_eq!(run(&plan, &index), vec!["d2", "d3"]);
    }

    #[test]
    fn execute_fuzzy_through_index() {
        let index = corpus();
        let plan = planner().plan("עולמ", SearchMode::Fuzzy, 0).unwrap();
        assert_eq!(run(&plan, &index), vec!["d1"]);
    }

    #[test]
    fn empty_query_finds_nothing() {
        let index = corpus();
        let plan = planner().plan("...", SearchMode::Exact, 0).unwrap();
        assert!(run(&plan, &index).is_empty());
    }

    #[test]
    fn execute_title_field_uses_representative_page() {
        let index = SearchIndex::build_in_ram(&[
            Document::new("m_P1", "990000000011", Some(1), "דף"),
            Document::new(
                "m_P2",
                "990000000011",
                Some(2),
                "ברוך אדוני אלהינו",
            ),
            Document::new("n_P1", "990000000022", Some(1), "קצר"),
        ])
        .unwrap();
        let mut bank = MetadataBank::new();
        bank.insert("990000000011", ManuscriptMeta::new("A", "פיוט לשבת"));
        bank.insert("990000000022", ManuscriptMeta::new("B", "פיוט לחג"));
        bank.insert("990000000099", ManuscriptMeta::new("C", "פיוט"));

        let plan = planner().plan("פיוט", SearchMode::TitleField, 0).unwrap();
        let hits = plan
            .execute(&index, &bank, &mut Monitor::silent())
            .unwrap()
            .value;
        let ids: Vec<_> = hits
            .iter()
            .map(|h| index.table().get(h.slot).unwrap().id.as_str())
            .collect();
        assert_eq!(ids, vec!["m_P2", "n_P1"]);
        assert!(hits.iter().all(|h| h.spans.is_empty()));
    }

    #[test]
    fn cancellation_returns_partial_outcome() {
        let index = corpus();
        let plan = planner().plan("שלום", SearchMode::Exact, 0).unwrap();
        let cancel = CancelFlag::new();
        cancel.cancel();
        let outcome = plan
            .execute(
                &index,
                &MetadataBank::new(),
                &mut Monitor::silent().with_cancel(cancel),
            )
            .unwrap();
        assert!(outcome.is_cancelled());
        assert!(outcome.value.is_empty());
    }
}
