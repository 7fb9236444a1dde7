use std::{
    collections::BTreeSet,
    path::{Path, PathBuf},
};

use genizah::{
    ConfigDb,
    MetadataBank,
    SearchIndex,
    VariantTable,
    composition::{CompositionParams, search_composition},
    grouping::{ExclusionSet, FilterText, group_composition},
    ingestion::build_index,
    planner::{Planner, SearchMode},
    progress::Monitor,
    search::{SearchParams, execute_search},
};

type TestResult = Result<(), Box<dyn std::error::Error>>;

const CORPUS: &str = "\
header notes before the first page are ignored
==> 990000000011_P001 <==
ברוך אתה אדוני אלהינו מלך העולם אשר קדשנו במצותיו
==> 990000000011_P002 <==
ועל כן נקוה לך אדוני אלהינו
==> 990000000022_P001 <==
ברוך אתה אדוני אלהינו מלך העולם הזן את העולם כלו
==> 990000000033_P003 <==
דברים אחרים לגמרי בלי קשר
==> 990000000044_P001 <==

";

const METADATA: &str = r#"{
    "990000000011": {"shelfmark": "T-S NS 1.1", "title": "סידור תפילה"},
    "990000000022": {"shelfmark": "MS Heb. 12", "title": "ברכות"}
}"#;

fn setup(
    dir: &Path,
) -> Result<(SearchIndex, ConfigDb), Box<dyn std::error::Error>> {
    let corpus = dir.join("corpus.txt");
    std::fs::write(&corpus, CORPUS)?;
    let index_dir = dir.join("index");

    let outcome = build_index(&corpus, &index_dir, &mut Monitor::silent())?;
    assert!(!outcome.is_cancelled());
    assert_eq!(outcome.value.documents, 4);
    assert_eq!(outcome.value.load.skipped_empty, 1);

    let config_db = ConfigDb::open(&dir.join("config.redb"))?;
    config_db.import_metadata(&MetadataBank::from_json(METADATA)?)?;

    Ok((SearchIndex::open(&index_dir)?, config_db))
}

fn ids(hits: &[genizah::search::SearchHit]) -> Vec<&str> {
    hits.iter().map(|h| h.document_id.as_str()).collect()
}

#[test]
fn phrase_search_over_a_built_index() -> TestResult {
    let tmp = tempfile::tempdir()?;
    let (index, config_db) = setup(tmp.path())?;
    let planner = Planner::new(VariantTable::builtin());

    let params = SearchParams::new("מלך העולם", SearchMode::Exact, 0);
    let outcome = execute_search(
        &params,
        &index,
        &planner,
        &config_db,
        &mut Monitor::silent(),
    )?;
    let hits = &outcome.value;
    assert_eq!(ids(hits), vec!["990000000011_P001", "990000000022_P001"]);
    assert_eq!(hits[0].rank, 1);
    assert_eq!(hits[0].shelfmark, "T-S NS 1.1");
    assert_eq!(hits[0].title, "סידור תפילה");
    assert_eq!(hits[0].total_score, "מלך העולם".chars().count());
    Ok(())
}

#[test]
fn gap_controls_intervening_words() -> TestResult {
    let tmp = tempfile::tempdir()?;
    let (index, config_db) = setup(tmp.path())?;
    let planner = Planner::new(VariantTable::builtin());

    let search = |gap| {
        let params = SearchParams::new("ברוך אלהינו", SearchMode::Exact, gap);
        execute_search(
            &params,
            &index,
            &planner,
            &config_db,
            &mut Monitor::silent(),
        )
    };

    assert!(search(1)?.value.is_empty());
    assert_eq!(search(2)?.value.len(), 2);
    Ok(())
}

#[test]
fn regex_and_title_modes() -> TestResult {
    let tmp = tempfile::tempdir()?;
    let (index, config_db) = setup(tmp.path())?;
    let planner = Planner::new(VariantTable::builtin());

    let params = SearchParams::new("הז.? את", SearchMode::Regex, 0);
    let outcome = execute_search(
        &params,
        &index,
        &planner,
        &config_db,
        &mut Monitor::silent(),
    )?;
    assert_eq!(ids(&outcome.value), vec!["990000000022_P001"]);

    let params = SearchParams::new("סידור", SearchMode::TitleField, 0);
    let outcome = execute_search(
        &params,
        &index,
        &planner,
        &config_db,
        &mut Monitor::silent(),
    )?;
    assert_eq!(ids(&outcome.value), vec!["990000000011_P001"]);
    assert!(outcome.value[0].merged_spans.is_empty());
    Ok(())
}

#[test]
fn manuscript_pages_are_ordered() -> TestResult {
    let tmp = tempfile::tempdir()?;
    let (index, _config_db) = setup(tmp.path())?;

    let pages: Vec<Option<u32>> = index
        .pages("990000000011")
        .iter()
        .map(|d| d.page_no)
        .collect();
    assert_eq!(pages, vec![Some(1), Some(2)]);
    assert!(index.pages("990000000044").is_empty());
    Ok(())
}

#[test]
fn composition_then_grouping() -> TestResult {
    let tmp = tempfile::tempdir()?;
    let (index, config_db) = setup(tmp.path())?;
    let planner = Planner::new(VariantTable::builtin());

    let params = CompositionParams {
        chunk_size: 3,
        ..CompositionParams::default()
    };
    let outcome = search_composition(
        "ברוך אתה אדוני אלהינו מלך העולם",
        &params,
        &index,
        &planner,
        &config_db,
        &mut Monitor::silent(),
    )?;
    let composition = outcome.value;
    assert_eq!(composition.report.total_chunks, 4);
    assert_eq!(composition.report.skipped_common, 0);

    let pages: Vec<&str> = composition
        .matches
        .iter()
        .map(|m| m.document_id.as_str())
        .collect();
    assert_eq!(pages, vec!["990000000011_P001", "990000000022_P001"]);
    for m in &composition.matches {
        assert_eq!(m.src_indices, BTreeSet::from([0, 1, 2, 3]));
        assert_eq!(m.merged_spans.len(), 1);
    }

    let grouping = group_composition(
        composition.matches,
        5,
        &ExclusionSet::parse("Heb. 12"),
        &FilterText::default(),
        &mut Monitor::silent(),
    );
    assert_eq!(grouping.main.len(), 1);
    assert_eq!(grouping.main[0].system_id, "990000000011");
    assert_eq!(grouping.known.len(), 1);
    assert_eq!(grouping.summary.total, 2);
    Ok(())
}

#[test]
fn common_chunks_are_skipped() -> TestResult {
    let tmp = tempfile::tempdir()?;
    let (index, config_db) = setup(tmp.path())?;
    let planner = Planner::new(VariantTable::builtin());

    let params = CompositionParams {
        chunk_size: 3,
        max_freq: 1,
        ..CompositionParams::default()
    };
    let outcome = search_composition(
        "ברוך אתה אדוני אלהינו מלך העולם",
        &params,
        &index,
        &planner,
        &config_db,
        &mut Monitor::silent(),
    )?;
    assert!(outcome.value.matches.is_empty());
    assert_eq!(outcome.value.report.skipped_common, 4);
    Ok(())
}

#[test]
fn opening_a_missing_index_fails() {
    let tmp = tempfile::tempdir().unwrap();
    let missing: PathBuf = tmp.path().join("nowhere");
    assert!(matches!(
        SearchIndex::open(&missing),
        Err(genizah::Error::IndexUnavailable(_))
    ));
}
