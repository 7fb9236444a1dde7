//! genizah - OCR-tolerant search over transcribed manuscript pages.
//!
//! A corpus export of page transcriptions is indexed with
//! [Tantivy](https://github.com/quickwit-oss/tantivy). Queries run as
//! exact phrases, letter-confusion variants, fuzzy words, regular
//! expressions or catalogue lookups, and every hit is verified against
//! the page text before it is scored. Composition search slides a word
//! window over a long source text to find every page that shares a
//! passage with it, then sorts those pages into groups.
//!
//! # Quick start
//!
//! ```no_run
//! use genizah::{DataDir, MetadataBank, SearchIndex, VariantTable};
//! use genizah::planner::{Planner, SearchMode};
//! use genizah::progress::Monitor;
//! use genizah::search::{self, SearchParams};
//!
//! let data_dir = DataDir::resolve(None).unwrap();
//! let index = SearchIndex::open(&data_dir.index_dir()).unwrap();
//! let planner = Planner::new(VariantTable::builtin());
//! let metadata = MetadataBank::new();
//!
//! let params = SearchParams::new("ברוך אתה", SearchMode::Variants, 1);
//! let outcome = search::execute_search(
//!     &params,
//!     &index,
//!     &planner,
//!     &metadata,
//!     &mut Monitor::silent(),
//! )
//! .unwrap();
//! for hit in &outcome.value {
//!     println!("{} {} ({})", hit.rank, hit.shelfmark, hit.total_score);
//! }
//! ```

pub mod composition;
pub mod config_db;
pub mod corpus;
pub mod data_dir;
pub mod doc_id;
pub mod error;
pub mod grouping;
pub mod ingestion;
pub mod metadata;
pub mod planner;
pub mod progress;
pub mod search;
pub mod spans;
pub mod tantivy_index;
pub mod text_util;
pub mod variants;

pub use config_db::{ConfigDb, Settings};
pub use data_dir::DataDir;
pub use doc_id::DocumentId;
pub use error::{Error, Result};
pub use metadata::{MetadataBank, MetadataSource};
pub use tantivy_index::SearchIndex;
pub use variants::VariantTable;
