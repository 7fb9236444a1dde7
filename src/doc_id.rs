use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

static SYSTEM_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"99\d{6,}").expect("valid regex"));
static FILE_ID_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"IE\d+_P(\d+)_FL\d+").expect("valid regex")
});
static COMPONENTS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(99\d{6,})_?(IE\d+)?_?(P\d+)?_?(FL\d+)?")
        .expect("valid regex")
});
static PAGE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"_P(\d+)").expect("valid regex"));
static TIF_PAGE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)[ _-](\d{3,4})\.tif").expect("valid regex")
});

/// Identity of one transcribed page, parsed from its header line.
///
/// Headers look like `990001234560205171_IE1234_P002_FL5678.tif`: a
/// catalogue system id, then optionally the digital object (`IE`), the
/// page number (`P`) and the file (`FL`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentId {
    /// Catalogue system id shared by every page of a manuscript.
    pub system_id: String,
    pub ie_id: Option<String>,
    pub page_no: Option<u32>,
    pub fl_id: Option<String>,
    /// Page-level identifier, unique within the corpus.
    pub unique: String,
}

impl DocumentId {
    /// Parse a header line. Returns `None` when it carries no system id.
    pub fn parse(header: &str) -> Option<Self> {
        let caps = COMPONENTS_RE.captures(header)?;
        let system_id = caps.get(1)?.as_str().to_string();
        let ie_id = caps.get(2).map(|m| m.as_str().to_string());
        let fl_id = caps
            .get(4)
            .map(|m| m.as_str().trim_start_matches("FL").to_string());

        let page_no = caps
            .get(3)
            .and_then(|m| m.as_str()[1..].parse().ok())
            .or_else(|| Self::page_from_header(header));

        let unique = match FILE_ID_RE.find(header) {
            Some(m) => m.as_str().to_string(),
            None => match page_no {
                Some(page) => format!("{system_id}_P{page:03}"),
                None => system_id.clone(),
            },
        };

        Some(Self {
            system_id,
            ie_id,
            page_no,
            fl_id,
            unique,
        })
    }

    fn page_from_header(header: &str) -> Option<u32> {
        PAGE_RE
            .captures(header)
            .or_else(|| TIF_PAGE_RE.captures(header))
            .and_then(|c| c.get(1))
            .and_then(|m| m.as_str().parse().ok())
    }

    /// Extract just the system id from arbitrary text.
    pub fn system_id_in(text: &str) -> Option<&str> {
        SYSTEM_ID_RE.find(text).map(|m| m.as_str())
    }
}

impl std::fmt::Display for DocumentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.unique)
    }
}
