use std::{
    borrow::Cow,
    collections::HashSet,
    io::Read,
    path::{Path, PathBuf},
};

use clap::Parser;
use genizah::{
    composition::{self, CompositionParams},
    config_db::{ConfigDb, Settings, keys},
    corpus::Document,
    data_dir::DataDir,
    error::{self, Error},
    grouping::{self, ExclusionSet, FilterText},
    ingestion,
    metadata::{MetadataBank, MetadataSource, display_shelfmark},
    planner::{Planner, SearchMode},
    progress::{Monitor, Outcome},
    search::{self, SearchParams},
    tantivy_index::SearchIndex,
    variants::{Tier, VariantTable},
};
use kdam::{Bar, BarExt, tqdm};
use serde::Serialize;
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

mod cli;

use cli::{Cli, Command, ConfigAction, MetaAction};

fn init_tracing(verbose: u8, quiet: bool) {
    let filter = if let Ok(env) = std::env::var("GENIZAH_LOG") {
        EnvFilter::new(env)
    } else if quiet {
        EnvFilter::new("warn")
    } else {
        match verbose {
            0 => EnvFilter::new("info"),
            1 => EnvFilter::new("debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();
}

fn main() -> error::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    if let Command::Completions(args) = &cli.command {
        args.generate();
        return Ok(());
    }

    let data_dir = DataDir::resolve(cli.data_dir.as_deref())?;
    let config_db = ConfigDb::open(&data_dir.config_db())?;
    let settings = Settings::load(&config_db)?;

    match cli.command {
        Command::Index(args) => {
            cmd_index(&config_db, &data_dir, &settings, &args, cli.quiet)?;
        }
        Command::Search(args) => {
            cmd_search(&config_db, &data_dir, &settings, &args, cli.quiet)?;
        }
        Command::Compose(args) => {
            cmd_compose(&config_db, &data_dir, &settings, &args, cli.quiet)?;
        }
        Command::Variants(args) => {
            cmd_variants(&settings, &args)?;
        }
        Command::Browse(args) => {
            cmd_browse(&config_db, &data_dir, &args)?;
        }
        Command::Status(args) => {
            cmd_status(&config_db, &data_dir, &settings, args.json)?;
        }
        Command::Meta { action } => match action {
            MetaAction::Import { file, replace } => {
                meta_import(&config_db, &file, replace)?;
            }
            MetaAction::Show { system_id, json } => {
                meta_show(&config_db, &system_id, json)?;
            }
        },
        Command::Config { action } => match action {
            ConfigAction::Show { json } => {
                config_show(&config_db, &settings, json)?;
            }
            ConfigAction::Set { key, value } => {
                Settings::validate(&key, &value)?;
                config_db.set_setting(&key, &value)?;
                println!("Set {key} = {value}");
            }
            ConfigAction::Clear { key } => {
                if !config_db.remove_setting(&key)? {
                    return Err(Error::NotFound {
                        kind: "setting",
                        name: key,
                    });
                }
                println!("Cleared {key}");
            }
        },
        Command::Completions(_) => {}
    }

    Ok(())
}

/// A monitor that draws a progress bar on stderr, or nothing when quiet.
fn progress_monitor<'a>(label: &'static str, quiet: bool) -> Monitor<'a> {
    if quiet {
        return Monitor::silent();
    }
    let mut bar: Option<Bar> = None;
    Monitor::new(move |current, total| {
        let bar = bar.get_or_insert_with(|| tqdm!(total = total, desc = label));
        if let Err(e) = bar.update_to(current) {
            debug!(error = %e, "Could not draw progress bar");
        }
    })
}

fn finish_progress(quiet: bool) {
    if !quiet {
        eprintln!();
    }
}

fn load_variants(
    settings: &Settings,
) -> error::Result<Cow<'static, VariantTable>> {
    match &settings.variant_table {
        Some(path) => Ok(Cow::Owned(VariantTable::from_path(path)?)),
        None => Ok(Cow::Borrowed(VariantTable::builtin())),
    }
}

fn read_text(path: &Path) -> error::Result<String> {
    if path == Path::new("-") {
        let mut text = String::new();
        std::io::stdin().read_to_string(&mut text)?;
        return Ok(text);
    }
    std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("cannot read {}: {e}", path.display()))
    })
}

fn report_cancelled<T>(outcome: &Outcome<T>) {
    if outcome.is_cancelled() {
        warn!("Operation was cancelled; results are partial");
    }
}

fn cmd_index(
    config_db: &ConfigDb,
    data_dir: &DataDir,
    settings: &Settings,
    args: &cli::IndexArgs,
    quiet: bool,
) -> error::Result<()> {
    let corpus = if args.corpus.is_empty() {
        settings.corpus_paths.clone()
    } else {
        args.corpus.clone()
    };
    if corpus.is_empty() {
        return Err(Error::Config(
            "no corpus given; pass a path or set corpus_path".into(),
        ));
    }

    let mut monitor = progress_monitor("Indexing", quiet);
    let outcome = ingestion::build_index_from(
        &corpus,
        &data_dir.index_dir(),
        &mut monitor,
    )?;
    drop(monitor);
    finish_progress(quiet);
    report_cancelled(&outcome);

    if !outcome.is_cancelled() {
        let stored = corpus
            .into_iter()
            .map(|p| p.canonicalize().unwrap_or(p));
        match std::env::join_paths(stored) {
            Ok(list) => config_db
                .set_setting(keys::CORPUS_PATH, &list.to_string_lossy())?,
            Err(e) => warn!(error = %e, "Could not store corpus paths"),
        }
    }

    let report = &outcome.value;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    } else {
        println!(
            "Indexed {} page(s) into {}",
            report.documents,
            report.index_dir.display()
        );
        let load = &report.load;
        println!(
            "Skipped: {} empty, {} without system id, {} duplicate",
            load.skipped_empty, load.skipped_malformed, load.duplicates
        );
    }
    Ok(())
}

fn cmd_search(
    config_db: &ConfigDb,
    data_dir: &DataDir,
    settings: &Settings,
    args: &cli::SearchArgs,
    quiet: bool,
) -> error::Result<()> {
    let index = SearchIndex::open(&data_dir.index_dir())?;
    let variants = load_variants(settings)?;
    let planner = Planner::new(&variants).with_limits(
        args.variant_limit.unwrap_or(settings.variant_limit),
        settings.candidate_limit,
    );

    let mut params =
        SearchParams::new(args.query.clone(), args.mode.into(), args.gap);
    params.limit = args.limit;

    let mut monitor = progress_monitor("Searching", quiet || args.json);
    let outcome = search::execute_search(
        &params,
        &index,
        &planner,
        config_db,
        &mut monitor,
    )?;
    drop(monitor);
    finish_progress(quiet || args.json);
    report_cancelled(&outcome);

    if args.json {
        println!("{}", search::format_json(&params, &outcome)?);
    } else {
        print!("{}", search::format_human(&outcome.value));
    }
    Ok(())
}

#[derive(Serialize)]
struct ComposeOutput<'a> {
    report: &'a composition::CompositionReport,
    grouping: &'a grouping::Grouping,
    #[serde(skip_serializing_if = "Option::is_none")]
    manuscripts: Option<Vec<grouping::ManuscriptGroup>>,
}

fn cmd_compose(
    config_db: &ConfigDb,
    data_dir: &DataDir,
    settings: &Settings,
    args: &cli::ComposeArgs,
    quiet: bool,
) -> error::Result<()> {
    let source = read_text(&args.source)?;
    let exclusions = match &args.exclude {
        Some(path) => ExclusionSet::parse(&read_text(path)?),
        None => ExclusionSet::default(),
    };
    let filter = match &args.filter {
        Some(path) => FilterText::new(&read_text(path)?),
        None => FilterText::default(),
    };

    let index = SearchIndex::open(&data_dir.index_dir())?;
    let variants = load_variants(settings)?;
    let planner = Planner::new(&variants)
        .with_limits(settings.variant_limit, settings.candidate_limit);
    let params = CompositionParams {
        chunk_size: args.chunk_size.unwrap_or(settings.chunk_size),
        max_freq: args.max_freq.unwrap_or(settings.max_freq),
        mode: SearchMode::from(args.mode),
    };

    let mut monitor = progress_monitor("Scanning", quiet || args.json);
    let outcome = composition::search_composition(
        &source,
        &params,
        &index,
        &planner,
        config_db,
        &mut monitor,
    )?;
    drop(monitor);
    finish_progress(quiet || args.json);
    report_cancelled(&outcome);

    let report = outcome.value.report;
    let grouping = grouping::group_composition(
        outcome.value.matches,
        args.threshold.unwrap_or(settings.group_threshold),
        &exclusions,
        &filter,
        &mut Monitor::silent(),
    );
    let manuscripts = args
        .by_manuscript
        .then(|| grouping::aggregate_by_manuscript(grouping.main.clone()));

    if args.json {
        let output = ComposeOutput {
            report: &report,
            grouping: &grouping,
            manuscripts,
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    println!(
        "{} chunk(s), {} skipped as common",
        report.total_chunks, report.skipped_common
    );
    match manuscripts {
        Some(manuscripts) => print_manuscripts(&manuscripts),
        None => print!("{}", grouping::format_human(&grouping)),
    }
    Ok(())
}

fn print_manuscripts(manuscripts: &[grouping::ManuscriptGroup]) {
    if manuscripts.is_empty() {
        println!("No matching manuscripts found.");
        return;
    }
    for (i, ms) in manuscripts.iter().enumerate() {
        let name = match ms.shelfmark.as_deref() {
            Some(s) if !s.trim().is_empty() => s.to_string(),
            _ => format!("ID: {}", ms.system_id),
        };
        println!("{:>3}. [{}] {}", i + 1, ms.total_score, name);
        if let Some(title) = &ms.title {
            println!("     {title}");
        }
        for page in &ms.pages {
            let page_no = page
                .page_no
                .map(|p| format!("p.{p}"))
                .unwrap_or_else(|| page.document_id.clone());
            println!("     {page_no} [{}]", page.total_score);
        }
    }
    println!("\n{} manuscript(s)", manuscripts.len());
}

#[derive(Serialize)]
struct VariantsOutput<'a> {
    token: &'a str,
    tier: Tier,
    forms: &'a [String],
}

fn cmd_variants(
    settings: &Settings,
    args: &cli::VariantsArgs,
) -> error::Result<()> {
    let variants = load_variants(settings)?;
    let tier = Tier::from(args.tier);
    let limit = args.limit.unwrap_or(settings.variant_limit);
    let forms = variants.expand(&args.token, tier, limit);

    if args.json {
        let output = VariantsOutput {
            token: &args.token,
            tier,
            forms: &forms,
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        for form in &forms {
            println!("{form}");
        }
        eprintln!("{} form(s) at {tier}", forms.len());
    }
    Ok(())
}

fn cmd_browse(
    config_db: &ConfigDb,
    data_dir: &DataDir,
    args: &cli::BrowseArgs,
) -> error::Result<()> {
    let index = SearchIndex::open(&data_dir.index_dir())?;
    let mut pages: Vec<&Document> = match index.document(&args.id) {
        Some(doc) => vec![doc],
        None => index.pages(&args.id),
    };
    if let Some(page) = args.page {
        pages.retain(|d| d.page_no == Some(page));
    }
    if pages.is_empty() {
        return Err(Error::NotFound {
            kind: "manuscript",
            name: args.id.clone(),
        });
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&pages)?);
        return Ok(());
    }

    let system_id = pages[0].system_id.as_str();
    let meta = search::lookup_metadata(config_db, &[system_id]);
    let record = meta.get(system_id);
    println!("{}", display_shelfmark(record, system_id));
    if let Some(m) = record.filter(|m| !m.title.is_empty()) {
        println!("{}", m.title);
    }
    for doc in pages {
        let page = doc
            .page_no
            .map(|p| format!("page {p}"))
            .unwrap_or_else(|| "page ?".to_string());
        println!("\n=== {} ({page}) ===", doc.id);
        println!("{}", doc.body);
    }
    Ok(())
}

#[derive(Serialize)]
struct IndexStatus {
    pages: usize,
    manuscripts: usize,
    corrupt: usize,
}

#[derive(Serialize)]
struct StatusOutput<'a> {
    data_dir: PathBuf,
    index: Option<IndexStatus>,
    metadata_records: u64,
    settings: &'a Settings,
}

fn cmd_status(
    config_db: &ConfigDb,
    data_dir: &DataDir,
    settings: &Settings,
    json: bool,
) -> error::Result<()> {
    let index = if data_dir.has_index() {
        let index = SearchIndex::open(&data_dir.index_dir())?;
        let manuscripts: HashSet<&str> = index
            .table()
            .documents()
            .iter()
            .map(|d| d.system_id.as_str())
            .collect();
        Some(IndexStatus {
            pages: index.len(),
            manuscripts: manuscripts.len(),
            corrupt: index.table().corrupt(),
        })
    } else {
        None
    };
    let status = StatusOutput {
        data_dir: data_dir.root().to_path_buf(),
        index,
        metadata_records: config_db.metadata_count()?,
        settings,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }

    println!("Data directory: {}", status.data_dir.display());
    match &status.index {
        Some(index) => {
            println!(
                "Index: {} page(s) from {} manuscript(s)",
                index.pages, index.manuscripts
            );
            if index.corrupt > 0 {
                println!("  {} unreadable stored page(s)", index.corrupt);
            }
        }
        None => println!("Index: not built (run `genizah index <corpus>`)"),
    }
    if data_dir.staging_dir().exists() {
        println!("  leftover staging directory from an interrupted build");
    }
    for path in &settings.corpus_paths {
        println!("Corpus: {}", path.display());
    }
    println!("Metadata records: {}", status.metadata_records);
    Ok(())
}

fn meta_import(
    config_db: &ConfigDb,
    file: &Path,
    replace: bool,
) -> error::Result<()> {
    let is_csv = file
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"));
    let bank = if is_csv {
        let reader = std::fs::File::open(file).map_err(|e| {
            Error::Config(format!("cannot read {}: {e}", file.display()))
        })?;
        MetadataBank::from_csv(std::io::BufReader::new(reader))?
    } else {
        MetadataBank::from_json(&read_text(file)?)?
    };
    if replace {
        config_db.clear_metadata()?;
    }
    let count = config_db.import_metadata(&bank)?;
    println!("Imported {count} metadata record(s)");
    Ok(())
}

fn meta_show(
    config_db: &ConfigDb,
    system_id: &str,
    json: bool,
) -> error::Result<()> {
    let found = config_db.lookup(&[system_id])?;
    let meta = found.get(system_id).ok_or_else(|| Error::NotFound {
        kind: "metadata record",
        name: system_id.to_string(),
    })?;

    if json {
        println!("{}", serde_json::to_string_pretty(meta)?);
    } else {
        println!("shelfmark: {}", meta.shelfmark);
        println!("title: {}", meta.title);
    }
    Ok(())
}

fn config_show(
    config_db: &ConfigDb,
    settings: &Settings,
    json: bool,
) -> error::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(settings)?);
        return Ok(());
    }

    let stored: HashSet<String> = config_db
        .list_settings()?
        .into_iter()
        .map(|(k, _)| k)
        .collect();
    let effective = serde_json::to_value(settings)?;
    for key in keys::ALL {
        let value = match effective.get(*key) {
            Some(serde_json::Value::Null) | None => "(unset)".to_string(),
            Some(serde_json::Value::Array(items)) if items.is_empty() => {
                "(unset)".to_string()
            }
            Some(serde_json::Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
        };
        let origin = if stored.contains(*key) { "" } else { " (default)" };
        println!("{key}\t{value}{origin}");
    }
    Ok(())
}
