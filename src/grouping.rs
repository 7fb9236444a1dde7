//! Sorting composition matches into groups.
//!
//! Each match lands in exactly one group, by the first rule that applies:
//! excluded manuscripts go to `known`, matches whose text already appears
//! in a caller-supplied filter text go to `filtered`, and the rest split
//! into `appendix` (titles that recur more than a threshold) and `main`.

use std::{
    collections::{BTreeMap, HashMap, HashSet},
    fmt,
};

use serde::Serialize;
use tracing::debug;

use crate::{
    composition::CompositionMatch,
    progress::Monitor,
    text_util::{
        clean_title_words,
        normalize_for_comparison,
        normalize_shelfmark,
    },
};

/// Default number of same-titled matches tolerated in the main group.
pub const DEFAULT_GROUP_THRESHOLD: usize = 5;

/// Generic catalogue words skipped when deriving a title key.
const IGNORE_PREFIXES: &[&str] = &[
    "קטע", "קטעי", "קטעים", "גניזה", "לא", "מזוהה", "חיבור", "פילוסופיה",
    "בפילוסופיה", "הלכה", "שירה", "פיוט", "מסמך", "מכתב", "ספרות",
    "וספרות", "סיפורת", "יפה", "דרשות", "פרשנות", "מקרא", "מוסר", "הגות",
    "וחכמת", "הלשון", "פירוש", "תפסיר", "שרח", "על", "ספר", "כתאב",
    "משנה", "תלמוד",
];

/// Manuscripts the caller already knows about.
#[derive(Debug, Clone, Default)]
pub struct ExclusionSet {
    system_ids: HashSet<String>,
    shelfmarks: HashSet<String>,
}

impl ExclusionSet {
    /// One entry per line. Entries made only of digits are system ids;
    /// anything else is a shelfmark.
    pub fn parse(text: &str) -> Self {
        let mut set = Self::default();
        for line in text.lines() {
            set.insert(line);
        }
        set
    }

    pub fn insert(&mut self, entry: &str) {
        let compact: String =
            entry.chars().filter(|c| !c.is_whitespace()).collect();
        if compact.is_empty() {
            return;
        }
        if compact.chars().all(|c| c.is_ascii_digit()) {
            self.system_ids.insert(compact);
        } else {
            let shelfmark = normalize_shelfmark(entry);
            if !shelfmark.is_empty() {
                self.shelfmarks.insert(shelfmark);
            }
        }
    }

    pub fn contains(&self, system_id: &str, shelfmark: Option<&str>) -> bool {
        self.system_ids.contains(system_id)
            || shelfmark.is_some_and(|s| {
                self.shelfmarks.contains(&normalize_shelfmark(s))
            })
    }

    pub fn len(&self) -> usize {
        self.system_ids.len() + self.shelfmarks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Text whose passages should not count as new findings.
#[derive(Debug, Clone, Default)]
pub struct FilterText {
    /// Normalized words, padded with spaces for whole-word containment.
    padded: String,
}

impl FilterText {
    pub fn new(text: &str) -> Self {
        let normalized = normalize_for_comparison(text);
        if normalized.is_empty() {
            return Self::default();
        }
        Self {
            padded: format!(" {normalized} "),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.padded.is_empty()
    }

    /// Whether every one of `texts` occurs in the filter text.
    pub fn covers<S: AsRef<str>>(&self, texts: &[S]) -> bool {
        if self.is_empty() || texts.is_empty() {
            return false;
        }
        texts.iter().all(|t| {
            let normalized = normalize_for_comparison(t.as_ref());
            !normalized.is_empty()
                && self.padded.contains(&format!(" {normalized} "))
        })
    }
}

/// The value titles are counted by.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TitleKey {
    Titled(String),
    Untitled,
}

impl TitleKey {
    /// First two significant words of `title`, or its cleaned text when
    /// nothing significant remains.
    pub fn of(title: Option<&str>) -> Self {
        let words = clean_title_words(title.unwrap_or_default());
        if words.is_empty() {
            return TitleKey::Untitled;
        }
        let significant: Vec<&str> = words
            .iter()
            .map(String::as_str)
            .skip_while(|w| IGNORE_PREFIXES.contains(w))
            .take(2)
            .collect();
        if significant.is_empty() {
            TitleKey::Titled(words.join(" "))
        } else {
            TitleKey::Titled(significant.join(" "))
        }
    }
}

impl fmt::Display for TitleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TitleKey::Titled(s) => f.write_str(s),
            TitleKey::Untitled => f.write_str("(untitled)"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Group {
    Main,
    Appendix,
    Known,
    FilteredByText,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct GroupSummary {
    pub main: usize,
    pub appendix: usize,
    pub known: usize,
    pub filtered: usize,
    pub total: usize,
    /// Appendix title keys and the manuscripts filed under each.
    pub appendix_breakdown: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Grouping {
    pub main: Vec<CompositionMatch>,
    pub appendix: Vec<CompositionMatch>,
    pub known: Vec<CompositionMatch>,
    pub filtered: Vec<CompositionMatch>,
    pub summary: GroupSummary,
}

impl Grouping {
    pub fn group(&self, group: Group) -> &[CompositionMatch] {
        match group {
            Group::Main => &self.main,
            Group::Appendix => &self.appendix,
            Group::Known => &self.known,
            Group::FilteredByText => &self.filtered,
        }
    }
}

/// Partition `matches` into the four groups.
///
/// A title key is moved to the appendix when more than `threshold` of the
/// matches left after exclusion and filtering share it.
pub fn group_composition(
    matches: Vec<CompositionMatch>,
    threshold: usize,
    exclusions: &ExclusionSet,
    filter: &FilterText,
    monitor: &mut Monitor<'_>,
) -> Grouping {
    let total = matches.len();
    monitor.start(total);

    let mut grouping = Grouping::default();
    let mut pending = Vec::new();
    for (i, m) in matches.into_iter().enumerate() {
        if exclusions.contains(&m.system_id, m.shelfmark.as_deref()) {
            grouping.known.push(m);
        } else if filter.covers(&m.matched_texts) {
            grouping.filtered.push(m);
        } else {
            pending.push((TitleKey::of(m.title.as_deref()), m));
        }
        monitor.update(i + 1);
    }

    let mut counts: HashMap<&TitleKey, usize> = HashMap::new();
    for (key, _) in &pending {
        *counts.entry(key).or_default() += 1;
    }
    let frequent: HashSet<TitleKey> = counts
        .into_iter()
        .filter(|(_, n)| *n > threshold)
        .map(|(key, _)| key.clone())
        .collect();

    for (key, m) in pending {
        if frequent.contains(&key) {
            grouping
                .summary
                .appendix_breakdown
                .entry(key.to_string())
                .or_default()
                .push(m.display_name());
            grouping.appendix.push(m);
        } else {
            grouping.main.push(m);
        }
    }

    for group in [
        &mut grouping.main,
        &mut grouping.appendix,
        &mut grouping.known,
        &mut grouping.filtered,
    ] {
        group.sort_by(|a, b| b.total_score.cmp(&a.total_score));
    }

    let summary = &mut grouping.summary;
    summary.main = grouping.main.len();
    summary.appendix = grouping.appendix.len();
    summary.known = grouping.known.len();
    summary.filtered = grouping.filtered.len();
    summary.total = total;

    debug!(
        main = summary.main,
        appendix = summary.appendix,
        known = summary.known,
        filtered = summary.filtered,
        "Grouped composition matches"
    );
    grouping
}

/// Page matches folded into one entry per manuscript.
#[derive(Debug, Clone, Serialize)]
pub struct ManuscriptGroup {
    pub system_id: String,
    pub shelfmark: Option<String>,
    pub title: Option<String>,
    pub total_score: usize,
    /// Pages, best first.
    pub pages: Vec<CompositionMatch>,
}

/// Fold page-level matches into manuscripts, best manuscript first.
pub fn aggregate_by_manuscript(
    matches: Vec<CompositionMatch>,
) -> Vec<ManuscriptGroup> {
    let mut order: Vec<String> = Vec::new();
    let mut by_id: HashMap<String, Vec<CompositionMatch>> = HashMap::new();
    for m in matches {
        if !by_id.contains_key(&m.system_id) {
            order.push(m.system_id.clone());
        }
        by_id.entry(m.system_id.clone()).or_default().push(m);
    }

    let mut groups: Vec<ManuscriptGroup> = order
        .into_iter()
        .filter_map(|system_id| {
            let mut pages = by_id.remove(&system_id)?;
            pages.sort_by(|a, b| b.total_score.cmp(&a.total_score));
            let first = pages.first()?;
            Some(ManuscriptGroup {
                shelfmark: first.shelfmark.clone(),
                title: first.title.clone(),
                total_score: pages.iter().map(|p| p.total_score).sum(),
                system_id,
                pages,
            })
        })
        .collect();

    groups.sort_by(|a, b| b.total_score.cmp(&a.total_score));
    groups
}

/// Format a grouping for terminal output.
pub fn format_human(grouping: &Grouping) -> String {
    let s = &grouping.summary;
    if s.total == 0 {
        return "No matching pages found.\n".to_string();
    }

    let mut out = String::new();
    section(&mut out, "Main", &grouping.main, true);
    if !grouping.appendix.is_empty() {
        out.push_str(&format!("== Appendix ({}) ==\n", s.appendix));
        for (key, names) in &s.appendix_breakdown {
            out.push_str(&format!(
                "{key}: {} page(s): {}\n",
                names.len(),
                names.join(", ")
            ));
        }
        out.push('\n');
        section(&mut out, "Appendix pages", &grouping.appendix, false);
    }
    section(&mut out, "Known", &grouping.known, false);
    section(&mut out, "Filtered by text", &grouping.filtered, false);

    out.push_str(&format!(
        "{} page(s): {} main, {} appendix, {} known, {} filtered\n",
        s.total, s.main, s.appendix, s.known, s.filtered
    ));
    out
}

fn section(
    out: &mut String,
    label: &str,
    matches: &[CompositionMatch],
    detailed: bool,
) {
    if matches.is_empty() {
        return;
    }
    out.push_str(&format!("== {label} ({}) ==\n", matches.len()));
    for (i, m) in matches.iter().enumerate() {
        out.push_str(&format!(
            "{:>3}. [{}] {} ({})\n",
            i + 1,
            m.total_score,
            m.display_name(),
            m.document_id
        ));
        if !detailed {
            continue;
        }
        if let Some(title) = &m.title {
            out.push_str(&format!("     {title}\n"));
        }
        for line in m.snippet.lines() {
            out.push_str(&format!("     {line}\n"));
        }
        if !m.source_context.is_empty() {
            out.push_str("     source:\n");
            for line in m.source_context.lines() {
                out.push_str(&format!("     {line}\n"));
            }
        }
        out.push('\n');
    }
    out.push('\n');
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use proptest::prelude::*;

    use super::*;

    fn item(
        doc: &str,
        system_id: &str,
        shelfmark: Option<&str>,
        title: Option<&str>,
        score: usize,
    ) -> CompositionMatch {
        CompositionMatch {
            document_id: doc.to_string(),
            system_id: system_id.to_string(),
            page_no: Some(1),
            shelfmark: shelfmark.map(str::to_string),
            title: title.map(str::to_string),
            merged_spans: Vec::new(),
            total_score: score,
            src_indices: BTreeSet::from([0]),
            matched_texts: vec!["שלום עולם".to_string()],
            snippet: String::new(),
            source_context: String::new(),
        }
    }

    fn ids(group: &[CompositionMatch]) -> Vec<&str> {
        group.iter().map(|m| m.document_id.as_str()).collect()
    }

    fn group(
        matches: Vec<CompositionMatch>,
        threshold: usize,
        exclusions: &ExclusionSet,
        filter: &FilterText,
    ) -> Grouping {
        group_composition(
            matches,
            threshold,
            exclusions,
            filter,
            &mut Monitor::silent(),
        )
    }

    #[test]
    fn exclusion_entries() {
        let set =
            ExclusionSet::parse("990000000011\n MS. Heb. 12 \n\nT-S NS 1\n");
        assert_eq!(set.len(), 3);
        assert!(set.contains("990000000011", None));
        assert!(set.contains("other", Some("ms heb 12")));
        assert!(set.contains("other", Some("T-S NS 1")));
        assert!(!set.contains("other", Some("T-S NS 2")));
        assert!(!set.contains("other", None));
    }

    #[test]
    fn filter_text_matches_whole_words_and_final_letters() {
        let filter = FilterText::new("אמר שלומ, עולם טוב!");
        assert!(filter.covers(&["שלום עולם"]));
        assert!(filter.covers(&["עולם", "טוב"]));
        assert!(!filter.covers(&["לום עולם"]));
        assert!(!filter.covers(&["עולם רע"]));
        assert!(!filter.covers::<&str>(&[]));
        assert!(!FilterText::new("  ").covers(&["שלום"]));
    }

    #[test]
    fn title_keys() {
        assert_eq!(
            TitleKey::of(Some("קטע פיוט: יוצר לשבת הגדול")),
            TitleKey::Titled("יוצר לשבת".into())
        );
        assert_eq!(
            TitleKey::of(Some("פיוט")),
            TitleKey::Titled("פיוט".into())
        );
        assert_eq!(TitleKey::of(Some("  ")), TitleKey::Untitled);
        assert_eq!(TitleKey::of(None), TitleKey::Untitled);
        assert_eq!(TitleKey::Untitled.to_string(), "(untitled)");
    }

    #[test]
    fn rules_apply_in_order() {
        let matches = vec![
            item("a", "1", Some("MS Heb. 12"), Some("x"), 10),
            item("b", "2", None, Some("y"), 20),
            item("c", "3", None, Some("z"), 30),
        ];
        let exclusions = ExclusionSet::parse("Heb 12");
        let filter = FilterText::new("שלום עולם");

        // "a" is both excluded and filtered; exclusion wins
        let g = group(matches, 5, &exclusions, &filter);
        assert_eq!(ids(&g.known), vec!["a"]);
        assert_eq!(ids(&g.filtered), vec!["c", "b"]);
        assert!(g.main.is_empty());
        assert_eq!(g.summary.total, 3);
    }

    #[test]
    fn threshold_boundary() {
        let titled = |n: usize, title: &str| -> Vec<CompositionMatch> {
            (0..n)
                .map(|i| {
                    let doc = format!("{title}{i}");
                    item(&doc, &i.to_string(), None, Some(title), i)
                })
                .collect()
        };

        let g = group(
            titled(3, "ספר הישר"),
            3,
            &ExclusionSet::default(),
            &FilterText::default(),
        );
        assert_eq!(g.main.len(), 3);
        assert!(g.appendix.is_empty());

        let g = group(
            titled(4, "ספר הישר"),
            3,
            &ExclusionSet::default(),
            &FilterText::default(),
        );
        assert!(g.main.is_empty());
        assert_eq!(g.appendix.len(), 4);
        assert_eq!(g.summary.appendix_breakdown["הישר"].len(), 4);
    }

    #[test]
    fn untitled_matches_are_counted_visibly() {
        let matches = (0..3)
            .map(|i| item(&format!("u{i}"), &format!("{i}"), None, None, 1))
            .collect();
        let g = group(
            matches,
            2,
            &ExclusionSet::default(),
            &FilterText::default(),
        );
        assert_eq!(g.appendix.len(), 3);
        assert_eq!(
            g.summary.appendix_breakdown["(untitled)"],
            vec!["ID: 0", "ID: 1", "ID: 2"]
        );
    }

    #[test]
    fn groups_are_ordered_by_score_then_input() {
        let matches = vec![
            item("a", "1", None, Some("אחד"), 5),
            item("b", "2", None, Some("שנים"), 9),
            item("c", "3", None, Some("שלשה"), 5),
        ];
        let g = group(
            matches,
            5,
            &ExclusionSet::default(),
            &FilterText::default(),
        );
        assert_eq!(ids(&g.main), vec!["b", "a", "c"]);
        assert_eq!(g.summary.main, 3);
    }

    #[test]
    fn manuscripts_sum_page_scores() {
        let matches = vec![
            item("p1", "A", Some("T-S 1"), None, 3),
            item("p2", "B", None, None, 5),
            item("p3", "A", Some("T-S 1"), None, 4),
        ];
        let groups = aggregate_by_manuscript(matches);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].system_id, "A");
        assert_eq!(groups[0].total_score, 7);
        assert_eq!(ids(&groups[0].pages), vec!["p3", "p1"]);
        assert_eq!(groups[0].shelfmark.as_deref(), Some("T-S 1"));
        assert_eq!(groups[1].total_score, 5);
    }

    #[test]
    fn human_format_lists_groups_and_summary() {
        let matches = vec![
            item("a", "1", Some("T-S 1"), Some("ספר הישר"), 5),
            item("b", "2", None, Some("ספר הישר"), 3),
            item("c", "3", Some("MS Heb. 12"), None, 2),
        ];
        let g = group(
            matches,
            1,
            &ExclusionSet::parse("Heb 12"),
            &FilterText::default(),
        );
        let out = format_human(&g);
        assert!(out.contains("== Appendix (2) =="));
        assert!(out.contains("הישר: 2 page(s): T-S 1, ID: 2"));
        assert!(out.contains("== Known (1) =="));
        assert!(out.contains(
            "3 page(s): 0 main, 2 appendix, 1 known, 0 filtered"
        ));
        assert!(!out.contains("== Main"));
    }

    #[test]
    fn human_format_empty() {
        let g = group(
            Vec::new(),
            5,
            &ExclusionSet::default(),
            &FilterText::default(),
        );
        assert_eq!(format_human(&g), "No matching pages found.\n");
    }

    proptest! {
        #[test]
        fn groups_partition_the_input(
            specs in prop::collection::vec(
                (0u8..6, 0u8..4, any::<bool>(), 0usize..50),
                0..40,
            ),
            threshold in 0usize..4,
        ) {
            let matches: Vec<CompositionMatch> = specs
                .iter()
                .enumerate()
                .map(|(i, (sys, title, filtered, score))| {
                    let title =
                        (*title > 0).then(|| format!("כותר {title}"));
                    let mut m = item(
                        &format!("doc{i}"),
                        &format!("99{sys}"),
                        None,
                        title.as_deref(),
                        *score,
                    );
                    if !filtered {
                        m.matched_texts = vec![format!("מילה{i}")];
                    }
                    m
                })
                .collect();
            let input: BTreeSet<String> =
                matches.iter().map(|m| m.document_id.clone()).collect();

            let g = group(
                matches,
                threshold,
                &ExclusionSet::parse("990\n991"),
                &FilterText::new("שלום עולם"),
            );

            let mut seen = BTreeSet::new();
            for part in [&g.main, &g.appendix, &g.known, &g.filtered] {
                for m in part {
                    prop_assert!(seen.insert(m.document_id.clone()));
                }
            }
            prop_assert_eq!(seen, input);
            prop_assert_eq!(
                g.summary.main + g.summary.appendix + g.summary.known
                    + g.summary.filtered,
                g.summary.total
            );
        }
    }
}
