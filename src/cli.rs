use std::path::PathBuf;

use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use genizah::{planner::SearchMode, variants::Tier};

#[derive(Debug, Parser)]
#[command(
    name = "genizah",
    about = "OCR-tolerant search over transcribed manuscript pages"
)]
pub struct Cli {
    /// Override the XDG data directory
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Increase log verbosity (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Only log warnings and errors, and hide progress bars
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Build the search index from a transcription export
    Index(IndexArgs),
    /// Search the corpus for a phrase, pattern or catalogue field
    Search(SearchArgs),
    /// Find the passages of a source text that recur in the corpus
    Compose(ComposeArgs),
    /// Show the spelling variants generated for a word
    Variants(VariantsArgs),
    /// Print the pages of a manuscript
    Browse(BrowseArgs),
    /// Show index and configuration status
    Status(StatusArgs),
    /// Manage the local catalogue metadata
    Meta {
        #[command(subcommand)]
        action: MetaAction,
    },
    /// Manage stored settings
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Generate shell completions
    #[command(hide = true)]
    Completions(CompletionsArgs),
}

/// Search modes as exposed on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ModeArg {
    Exact,
    Variants,
    Extended,
    Maximum,
    Fuzzy,
    Regex,
    Title,
    Shelfmark,
}

impl From<ModeArg> for SearchMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Exact => SearchMode::Exact,
            ModeArg::Variants => SearchMode::Variants,
            ModeArg::Extended => SearchMode::Extended,
            ModeArg::Maximum => SearchMode::Maximum,
            ModeArg::Fuzzy => SearchMode::Fuzzy,
            ModeArg::Regex => SearchMode::Regex,
            ModeArg::Title => SearchMode::TitleField,
            ModeArg::Shelfmark => SearchMode::ShelfmarkField,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum TierArg {
    Exact,
    Variants,
    Extended,
    Maximum,
}

impl From<TierArg> for Tier {
    fn from(tier: TierArg) -> Self {
        match tier {
            TierArg::Exact => Tier::Exact,
            TierArg::Variants => Tier::Variants,
            TierArg::Extended => Tier::Extended,
            TierArg::Maximum => Tier::Maximum,
        }
    }
}

// -- Index --

#[derive(Debug, Parser)]
pub struct IndexArgs {
    /// Transcription exports to index, highest priority first (defaults to
    /// the stored corpus_path)
    pub corpus: Vec<PathBuf>,

    /// Output the build report as JSON
    #[arg(long)]
    pub json: bool,
}

// -- Search --

#[derive(Debug, Parser)]
pub struct SearchArgs {
    /// The search query
    pub query: String,

    /// How query words are matched
    #[arg(short, long, value_enum, default_value = "exact")]
    pub mode: ModeArg,

    /// Words allowed between consecutive query words
    #[arg(short, long, default_value = "0")]
    pub gap: usize,

    /// Maximum number of results to return
    #[arg(short = 'n', long)]
    pub limit: Option<usize>,

    /// Override the stored variant_limit
    #[arg(long)]
    pub variant_limit: Option<usize>,

    /// Output results as JSON
    #[arg(long)]
    pub json: bool,
}

// -- Compose --

#[derive(Debug, Parser)]
pub struct ComposeArgs {
    /// Source text file, or `-` for stdin
    pub source: PathBuf,

    /// Words per chunk (overrides the stored chunk_size)
    #[arg(short = 'k', long)]
    pub chunk_size: Option<usize>,

    /// Skip chunks matching more pages than this (overrides max_freq)
    #[arg(long)]
    pub max_freq: Option<usize>,

    /// How chunk words are matched
    #[arg(short, long, value_enum, default_value = "exact")]
    pub mode: ModeArg,

    /// Same-title matches kept in the main group (overrides group_threshold)
    #[arg(short, long)]
    pub threshold: Option<usize>,

    /// File of known shelfmarks or system ids, one per line
    #[arg(long)]
    pub exclude: Option<PathBuf>,

    /// File whose passages should not count as new findings
    #[arg(long)]
    pub filter: Option<PathBuf>,

    /// Group page matches by manuscript
    #[arg(long)]
    pub by_manuscript: bool,

    /// Output results as JSON
    #[arg(long)]
    pub json: bool,
}

// -- Variants --

#[derive(Debug, Parser)]
pub struct VariantsArgs {
    /// The word to expand
    pub token: String,

    /// Expansion tier
    #[arg(short, long, value_enum, default_value = "variants")]
    pub tier: TierArg,

    /// Maximum number of forms (overrides the stored variant_limit)
    #[arg(short = 'n', long)]
    pub limit: Option<usize>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

// -- Browse --

#[derive(Debug, Parser)]
pub struct BrowseArgs {
    /// Manuscript system id, or a document id
    pub id: String,

    /// Print only this page number
    #[arg(short, long)]
    pub page: Option<u32>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

// -- Status --

#[derive(Debug, Parser)]
pub struct StatusArgs {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

// -- Meta --

#[derive(Debug, Subcommand)]
pub enum MetaAction {
    /// Load catalogue records from a libraries.csv export or a JSON map of
    /// {system_id: {shelfmark, title}}
    Import {
        /// Path to the file; `.csv` files are read as a catalogue export
        file: PathBuf,

        /// Drop existing records first
        #[arg(long)]
        replace: bool,
    },
    /// Show the record for a system id
    Show {
        system_id: String,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

// -- Config --

#[derive(Debug, Subcommand)]
pub enum ConfigAction {
    /// Show all settings with their effective values
    Show {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Store a setting
    Set { key: String, value: String },
    /// Remove a stored setting (revert to default)
    Clear { key: String },
}

// -- Completions --

#[derive(Debug, Parser)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    #[arg(value_enum)]
    pub shell: Shell,
}

impl CompletionsArgs {
    /// Generate shell completions and print to stdout.
    pub fn generate(&self) {
        let mut cmd = Cli::command();
        clap_complete::generate(
            self.shell,
            &mut cmd,
            "genizah",
            &mut std::io::stdout(),
        );
    }
}
