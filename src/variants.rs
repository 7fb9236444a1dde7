//! OCR-confusion variant expansion.
//!
//! A [`VariantTable`] holds symmetric letter-pair confusions in three
//! sections. Expanding a token at a [`Tier`] substitutes confusable letters
//! at one or two positions and ranks the results so that the token itself
//! comes first, then the mildest substitutions.

use std::{
    collections::{BTreeMap, BTreeSet, HashMap, HashSet},
    path::Path,
    sync::LazyLock,
};

use serde::Serialize;

use crate::error::{Error, Result};

/// Upper bound on variants generated per table layer.
pub const GENERATION_CEILING: usize = 5000;

/// Default number of variants kept per token.
pub const DEFAULT_VARIANT_LIMIT: usize = 1000;

const BUNDLED_TABLE: &str = include_str!("../data/confusions.txt");

static BUILTIN: LazyLock<VariantTable> = LazyLock::new(|| {
    VariantTable::parse(BUNDLED_TABLE).expect("bundled confusion table")
});

type ConfusionMap = BTreeMap<char, BTreeSet<char>>;

/// Escalating tolerance for transcription errors.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Exact,
    Variants,
    Extended,
    /// High false-positive risk; meant to be chosen deliberately.
    Maximum,
}

impl Tier {
    pub const ALL: [Tier; 4] =
        [Tier::Exact, Tier::Variants, Tier::Extended, Tier::Maximum];

    pub fn as_str(self) -> &'static str {
        match self {
            Tier::Exact => "exact",
            Tier::Variants => "variants",
            Tier::Extended => "extended",
            Tier::Maximum => "maximum",
        }
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Letter confusions grouped by tier.
#[derive(Debug, Clone, Default)]
pub struct VariantTable {
    basic: ConfusionMap,
    /// Basic pairs plus the `[extended]` section.
    extended: ConfusionMap,
    maximum: ConfusionMap,
}

#[derive(Clone, Copy)]
enum Section {
    Variants,
    Extended,
    Maximum,
}

impl VariantTable {
    /// The table bundled with the crate.
    pub fn builtin() -> &'static VariantTable {
        &BUILTIN
    }

    /// Load a table from a file in the same format as the bundled one.
    pub fn from_path(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!(
                "cannot read variant table {}: {e}",
                path.display()
            ))
        })?;
        Self::parse(&text)
    }

    /// Parse `[section]` headers followed by `a=b` lines. Blank lines and
    /// lines starting with `#` are ignored.
    pub fn parse(text: &str) -> Result<Self> {
        let mut table = Self::default();
        let mut section = None;

        for (lineno, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            if let Some(name) =
                line.strip_prefix('[').and_then(|l| l.strip_suffix(']'))
            {
                section = Some(match name.trim() {
                    "variants" => Section::Variants,
                    "extended" => Section::Extended,
                    "maximum" => Section::Maximum,
                    other => {
                        return Err(Error::Config(format!(
                            "line {}: unknown section '{other}'",
                            lineno + 1
                        )));
                    }
                });
                continue;
            }

            let Some(section) = section else {
                return Err(Error::Config(format!(
                    "line {}: pair outside of a section",
                    lineno + 1
                )));
            };
            let (a, b) = parse_pair(line).ok_or_else(|| {
                Error::Config(format!(
                    "line {}: expected a single-letter pair like 'a=b'",
                    lineno + 1
                ))
            })?;

            match section {
                Section::Variants => {
                    link(&mut table.basic, a, b);
                    link(&mut table.extended, a, b);
                }
                Section::Extended => link(&mut table.extended, a, b),
                Section::Maximum => link(&mut table.maximum, a, b),
            }
        }

        Ok(table)
    }

    /// Letters confusable with `c` in the given tier's widest map.
    pub fn confusions(&self, c: char, tier: Tier) -> Vec<char> {
        let map = match tier {
            Tier::Exact => return Vec::new(),
            Tier::Variants => &self.basic,
            Tier::Extended => &self.extended,
            Tier::Maximum => &self.maximum,
        };
        map.get(&c)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Expand `token` into its tier's spellings.
    ///
    /// The token itself is always first. The rest are ordered by the tier
    /// that first produced them, then by number of substituted letters, then
    /// lexicographically, and the list is cut to `limit` entries. Tokens
    /// shorter than two letters are not expanded.
    pub fn expand(&self, token: &str, tier: Tier, limit: usize) -> Vec<String> {
        let chars: Vec<char> = token.chars().collect();
        if tier == Tier::Exact || chars.len() < 2 {
            return vec![token.to_string()];
        }

        let ceiling = limit.min(GENERATION_CEILING);
        let mut ranks: HashMap<String, u8> = HashMap::new();
        ranks.insert(token.to_string(), 0);

        for (map, max_changes, rank) in self.layers(tier) {
            for variant in generate(&chars, map, max_changes, ceiling) {
                ranks.entry(variant).or_insert(rank);
            }
        }

        let mut ranked: Vec<(u8, usize, String)> = ranks
            .into_iter()
            .map(|(v, rank)| (rank, hamming(&chars, &v), v))
            .collect();
        ranked.sort();
        ranked.truncate(limit.max(1));
        ranked.into_iter().map(|(_, _, v)| v).collect()
    }

    fn layers(&self, tier: Tier) -> Vec<(&ConfusionMap, usize, u8)> {
        let mut layers = Vec::with_capacity(3);
        if tier >= Tier::Variants {
            layers.push((&self.basic, 1, 1));
        }
        if tier >= Tier::Extended {
            layers.push((&self.extended, 2, 2));
        }
        if tier >= Tier::Maximum {
            layers.push((&self.maximum, 2, 3));
        }
        layers
    }
}

fn parse_pair(line: &str) -> Option<(char, char)> {
    let (a, b) = line.split_once('=')?;
    let single = |s: &str| {
        let mut it = s.trim().chars();
        let c = it.next()?;
        it.next().is_none().then_some(c)
    };
    Some((single(a)?, single(b)?))
}

fn link(map: &mut ConfusionMap, a: char, b: char) {
    if a == b {
        return;
    }
    map.entry(a).or_default().insert(b);
    map.entry(b).or_default().insert(a);
}

fn hamming(term: &[char], variant: &str) -> usize {
    let n = variant.chars().count();
    if n != term.len() {
        return term.len() + n;
    }
    term.iter().zip(variant.chars()).filter(|(a, b)| **a != *b).count()
}

/// Every spelling reachable by substituting 1..=`max_changes` positions,
/// in a fixed order, stopping at `ceiling` distinct results.
fn generate(
    chars: &[char],
    map: &ConfusionMap,
    max_changes: usize,
    ceiling: usize,
) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();

    for changes in 1..=max_changes.min(chars.len()) {
        for positions in combinations(chars.len(), changes) {
            let options: Option<Vec<Vec<char>>> = positions
                .iter()
                .map(|&pos| {
                    let alts: Vec<char> = map
                        .get(&chars[pos])?
                        .iter()
                        .copied()
                        .filter(|&c| c != chars[pos])
                        .collect();
                    (!alts.is_empty()).then_some(alts)
                })
                .collect();
            let Some(options) = options else {
                continue;
            };

            let mut odometer = vec![0usize; options.len()];
            loop {
                let mut candidate = chars.to_vec();
                for (slot, &pos) in positions.iter().enumerate() {
                    candidate[pos] = options[slot][odometer[slot]];
                }
                let candidate: String = candidate.into_iter().collect();
                if seen.insert(candidate.clone()) {
                    out.push(candidate);
                    if out.len() >= ceiling {
                        return out;
                    }
                }
                if !advance(&mut odometer, &options) {
                    break;
                }
            }
        }
    }

    out
}

fn advance(odometer: &mut [usize], options: &[Vec<char>]) -> bool {
    for slot in (0..odometer.len()).rev() {
        odometer[slot] += 1;
        if odometer[slot] < options[slot].len() {
            return true;
        }
        odometer[slot] = 0;
    }
    false
}

/// k-element position subsets of 0..n in lexicographic order.
fn combinations(n: usize, k: usize) -> Vec<Vec<usize>> {
    fn rec(
        start: usize,
        n: usize,
        k: usize,
        current: &mut Vec<usize>,
        out: &mut Vec<Vec<usize>>,
    ) {
        if current.len() == k {
            out.push(current.clone());
            return;
        }
        for i in start..n {
            current.push(i);
            rec(i + 1, n, k, current, out);
            current.pop();
        }
    }

    let mut out = Vec::new();
    rec(0, n, k, &mut Vec::with_capacity(k), &mut out);
    out
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    const SMALL: &str = "\
# test table
[variants]
ד=ר
ו=י

[extended]
ה=ח

[maximum]
ב=כ
";

    #[test]
    fn bundled_table_loads() {
        let table = VariantTable::builtin();
        assert!(table.confusions('ד', Tier::Variants).contains(&'ר'));
        assert!(table.confusions('ר', Tier::Variants).contains(&'ד'));
        assert!(table.confusions('ת', Tier::Extended).contains(&'ה'));
        assert!(!table.confusions('א', Tier::Maximum).is_empty());
    }

    #[test]
    fn parse_rejects_bad_lines() {
        assert!(VariantTable::parse("ד=ר").is_err());
        assert!(VariantTable::parse("[bogus]\nד=ר").is_err());
        assert!(VariantTable::parse("[variants]\nדד=ר").is_err());
        assert!(VariantTable::parse("[variants]\nדר").is_err());
    }

    #[test]
    fn from_path_reads_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("table.txt");
        std::fs::write(&path, SMALL).unwrap();
        let table = VariantTable::from_path(&path).unwrap();
        assert_eq!(table.confusions('ה', Tier::Extended), vec!['ח']);
        assert!(VariantTable::from_path(&tmp.path().join("nope")).is_err());
    }

    #[test]
    fn exact_and_short_tokens_are_untouched() {
        let table = VariantTable::parse(SMALL).unwrap();
        assert_eq!(table.expand("דוד", Tier::Exact, 100), vec!["דוד"]);
        assert_eq!(table.expand("ד", Tier::Maximum, 100), vec!["ד"]);
    }

    #[test]
    fn variants_tier_substitutes_one_letter() {
        let table = VariantTable::parse(SMALL).unwrap();
        let out = table.expand("דו", Tier::Variants, 100);
        assert_eq!(out[0], "דו");
        let set: BTreeSet<_> = out.iter().map(String::as_str).collect();
        assert_eq!(set, BTreeSet::from(["דו", "רו", "די"]));
    }

    #[test]
    fn extended_tier_allows_two_changes() {
        let table = VariantTable::parse(SMALL).unwrap();
        let out = table.expand("דו", Tier::Extended, 100);
        assert!(out.contains(&"רי".to_string()));
        // rank 1 results precede rank 2 results
        let pos = |s: &str| out.iter().position(|v| v == s).unwrap();
        assert!(pos("רו") < pos("רי"));
    }

    #[test]
    fn maximum_adds_third_section() {
        let table = VariantTable::parse(SMALL).unwrap();
        assert!(!table
            .expand("בו", Tier::Extended, 100)
            .contains(&"כו".to_string()));
        assert!(table
            .expand("בו", Tier::Maximum, 100)
            .contains(&"כו".to_string()));
    }

    #[test]
    fn limit_truncates_deterministically() {
        let table = VariantTable::builtin();
        let a = table.expand("והדברים", Tier::Maximum, 50);
        let b = table.expand("והדברים", Tier::Maximum, 50);
        assert_eq!(a.len(), 50);
        assert_eq!(a, b);
        assert_eq!(a[0], "והדברים");
    }

    #[test]
    fn combinations_are_lexicographic() {
        assert_eq!(
            combinations(3, 2),
            vec![vec![0, 1], vec![0, 2], vec![1, 2]]
        );
        assert!(combinations(1, 2).is_empty());
    }

    proptest! {
        #[test]
        fn tiers_are_nested(token in "[אבגדהוזחטיכלמנסעפצקרשת]{1,5}") {
            let table = VariantTable::builtin();
            let sets: Vec<BTreeSet<String>> = Tier::ALL
                .iter()
                .map(|&t| {
                    table
                        .expand(&token, t, DEFAULT_VARIANT_LIMIT)
                        .into_iter()
                        .collect()
                })
                .collect();
            for pair in sets.windows(2) {
                prop_assert!(pair[0].is_subset(&pair[1]));
            }
        }
    }
}
