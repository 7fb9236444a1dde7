//! Transcription corpus loading.
//!
//! A corpus file is a sequence of page records. Each record starts with a
//! header line (`==> header <==` in current exports, `### header` in legacy
//! ones) and its body runs until the next header. Several exports can be
//! loaded together; the first one listed wins when a page appears twice.

use std::{
    collections::HashSet,
    fs::File,
    io::{BufRead, BufReader},
    path::Path,
};

use serde::Serialize;
use tracing::{debug, info};

use crate::{
    doc_id::DocumentId,
    error::{Error, Result},
};

/// One transcribed page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Document {
    /// Page-level identifier, unique in the corpus.
    pub id: String,
    pub system_id: String,
    pub page_no: Option<u32>,
    /// Header line as it appeared in the corpus, markers stripped.
    pub header: String,
    pub body: String,
}

impl Document {
    pub fn new(
        id: impl Into<String>,
        system_id: impl Into<String>,
        page_no: Option<u32>,
        body: impl Into<String>,
    ) -> Self {
        let id = id.into();
        Self {
            header: id.clone(),
            id,
            system_id: system_id.into(),
            page_no,
            body: body.into(),
        }
    }

    /// Body length in characters.
    pub fn len(&self) -> usize {
        self.body.chars().count()
    }

    pub fn is_empty(&self) -> bool {
        self.body.is_empty()
    }
}

/// Counts of what happened while reading a corpus.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LoadReport {
    pub loaded: usize,
    pub skipped_empty: usize,
    pub skipped_malformed: usize,
    pub duplicates: usize,
}

#[derive(Debug, Default)]
pub struct Corpus {
    pub documents: Vec<Document>,
    pub report: LoadReport,
}

impl Corpus {
    /// Read a corpus file from disk.
    pub fn load(path: &Path) -> Result<Self> {
        Self::load_all(&[path])
    }

    /// Read several corpus files, highest priority first. A page already
    /// loaded from an earlier file counts as a duplicate in later ones.
    pub fn load_all<P: AsRef<Path>>(paths: &[P]) -> Result<Self> {
        let mut builder = Builder::default();
        for path in paths {
            let path = path.as_ref();
            let unavailable = |source| Error::CorpusUnavailable {
                path: path.to_path_buf(),
                source,
            };

            let file = File::open(path).map_err(unavailable)?;
            builder.read(BufReader::new(file)).map_err(unavailable)?;
            // A record never continues into the next file.
            builder.flush();
        }

        let corpus = builder.finish();
        info!(
            files = paths.len(),
            loaded = corpus.report.loaded,
            skipped_empty = corpus.report.skipped_empty,
            skipped_malformed = corpus.report.skipped_malformed,
            duplicates = corpus.report.duplicates,
            "Loaded corpus"
        );
        Ok(corpus)
    }

    pub fn parse(text: &str) -> Self {
        let mut builder = Builder::default();
        for line in text.lines() {
            builder.line(line);
        }
        builder.finish()
    }

    pub fn from_reader(reader: impl BufRead) -> std::io::Result<Self> {
        let mut builder = Builder::default();
        builder.read(reader)?;
        Ok(builder.finish())
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

/// Strip the record marker from a header line. Returns `None` for body lines.
pub fn header_text(line: &str) -> Option<&str> {
    let line = line.trim_start_matches('\u{feff}').trim();
    if let Some(rest) = line.strip_prefix("==>") {
        let rest = rest.trim();
        Some(rest.strip_suffix("<==").unwrap_or(rest).trim())
    } else {
        line.strip_prefix("###").map(str::trim)
    }
}

#[derive(Default)]
struct Builder {
    documents: Vec<Document>,
    report: LoadReport,
    seen: HashSet<String>,
    header: Option<String>,
    lines: Vec<String>,
}

impl Builder {
    fn read(&mut self, reader: impl BufRead) -> std::io::Result<()> {
        for line in reader.lines() {
            self.line(&line?);
        }
        Ok(())
    }

    fn line(&mut self, line: &str) {
        match header_text(line) {
            Some(header) => {
                self.flush();
                self.header = Some(header.to_string());
            }
            None if self.header.is_some() => {
                self.lines.push(line.trim().to_string());
            }
            None => {}
        }
    }

    fn flush(&mut self) {
        let Some(header) = self.header.take() else {
            return;
        };
        let body = self.lines.join("\n").trim().to_string();
        self.lines.clear();

        let Some(id) = DocumentId::parse(&header) else {
            debug!(header = %header, "Skipping record without system id");
            self.report.skipped_malformed += 1;
            return;
        };
        if body.is_empty() {
            self.report.skipped_empty += 1;
            return;
        }
        if !self.seen.insert(id.unique.clone()) {
            debug!(id = %id, "Skipping duplicate record");
            self.report.duplicates += 1;
            return;
        }

        self.documents.push(Document {
            id: id.unique,
            system_id: id.system_id,
            page_no: id.page_no,
            header,
            body,
        });
        self.report.loaded += 1;
    }

    fn finish(mut self) -> Corpus {
        self.flush();
        Corpus {
            documents: self.documents,
            report: self.report,
        }
    }
}
