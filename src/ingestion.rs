use std::{
    ffi::OsString,
    path::{Path, PathBuf},
};

use serde::Serialize;
use tracing::{info, warn};

use crate::{
    corpus::{Corpus, Document, LoadReport},
    error::{Error, Result},
    progress::{Monitor, Outcome},
    tantivy_index::SearchIndex,
};

/// Documents between progress reports and cancellation checks.
pub const PROGRESS_INTERVAL: usize = 1000;

/// Summary of an index build.
#[derive(Debug, Clone, Serialize)]
pub struct IndexReport {
    /// Documents written to the live index. Zero when cancelled.
    pub documents: usize,
    pub load: LoadReport,
    pub index_dir: PathBuf,
}

/// `<dir>.<suffix>` next to `dir`.
pub fn sibling_dir(dir: &Path, suffix: &str) -> PathBuf {
    let mut name = dir
        .file_name()
        .map(OsString::from)
        .unwrap_or_else(|| OsString::from("index"));
    name.push(".");
    name.push(suffix);
    dir.with_file_name(name)
}

/// Rebuild the index in `index_dir` from the corpus at `corpus_path`.
pub fn build_index(
    corpus_path: &Path,
    index_dir: &Path,
    monitor: &mut Monitor<'_>,
) -> Result<Outcome<IndexReport>> {
    build_index_from(&[corpus_path], index_dir, monitor)
}

/// Rebuild the index in `index_dir` from several corpus exports, highest
/// priority first (see [`Corpus::load_all`]).
///
/// The new index is written to a staging directory and only moved into
/// place once fully committed. On failure or cancellation the staging
/// directory is removed and any previous index is left as it was.
pub fn build_index_from<P: AsRef<Path>>(
    corpus_paths: &[P],
    index_dir: &Path,
    monitor: &mut Monitor<'_>,
) -> Result<Outcome<IndexReport>> {
    let corpus = Corpus::load_all(corpus_paths)?;
    let total = corpus.documents.len();
    let staging = sibling_dir(index_dir, "staging");

    info!(
        files = corpus_paths.len(),
        documents = total,
        staging = %staging.display(),
        "Building index"
    );

    let mut report = IndexReport {
        documents: 0,
        load: corpus.report,
        index_dir: index_dir.to_path_buf(),
    };

    let written = discard_stale(&staging)
        .and_then(|()| write_staging(&corpus.documents, &staging, monitor));
    let cancelled_at = match written {
        Ok(cancelled_at) => cancelled_at,
        Err(e) => {
            discard(&staging);
            return Err(build_failed(e));
        }
    };

    if let Some(processed) = cancelled_at {
        discard(&staging);
        info!(processed, total, "Index build cancelled");
        return Ok(Outcome::cancelled(report, processed, total));
    }

    if let Err(e) = swap_into_place(&staging, index_dir) {
        discard(&staging);
        return Err(Error::IndexBuildFailed(format!(
            "could not move index into {}: {e}",
            index_dir.display()
        )));
    }

    report.documents = total;
    info!(documents = total, index = %index_dir.display(), "Index built");
    Ok(Outcome::completed(report))
}

/// Write every document into a new index at `staging`. Returns the number
/// processed when cancelled before the end.
fn write_staging(
    documents: &[Document],
    staging: &Path,
    monitor: &mut Monitor<'_>,
) -> Result<Option<usize>> {
    let total = documents.len();
    monitor.start(total);

    let builder = SearchIndex::create(staging)?;
    for (i, doc) in documents.iter().enumerate() {
        if i % PROGRESS_INTERVAL == 0 && monitor.is_cancelled() {
            return Ok(Some(i));
        }
        builder.add(i as u64, doc)?;
        if (i + 1) % PROGRESS_INTERVAL == 0 {
            monitor.update(i + 1);
        }
    }
    if monitor.is_cancelled() {
        return Ok(Some(total));
    }

    builder.finish()?;
    monitor.update(total);
    Ok(None)
}

fn discard_stale(staging: &Path) -> Result<()> {
    if staging.exists() {
        warn!(path = %staging.display(), "Removing stale staging directory");
        std::fs::remove_dir_all(staging)?;
    }
    Ok(())
}

fn discard(staging: &Path) {
    if staging.exists()
        && let Err(e) = std::fs::remove_dir_all(staging)
    {
        warn!(
            path = %staging.display(),
            error = %e,
            "Could not remove staging directory"
        );
    }
}

fn build_failed(e: Error) -> Error {
    match e {
        Error::IndexBuildFailed(_) => e,
        other => Error::IndexBuildFailed(other.to_string()),
    }
}

fn swap_into_place(staging: &Path, target: &Path) -> std::io::Result<()> {
    let old = sibling_dir(target, "old");
    if old.exists() {
        std::fs::remove_dir_all(&old)?;
    }

    let had_previous = target.exists();
    if had_previous {
        std::fs::rename(target, &old)?;
    }
    if let Err(e) = std::fs::rename(staging, target) {
        if had_previous && let Err(restore) = std::fs::rename(&old, target) {
            warn!(
                path = %old.display(),
                error = %restore,
                "Could not restore previous index"
            );
        }
        return Err(e);
    }

    if had_previous && let Err(e) = std::fs::remove_dir_all(&old) {
        warn!(path = %old.display(), error = %e, "Could not remove old index");
    }
    Ok(())
}
