//! Catalogue metadata for manuscripts.
//!
//! Shelfmarks and titles come from outside the corpus. Anything that can
//! answer a batch lookup implements [`MetadataSource`]; the engine works
//! with missing entries by falling back to raw system ids.

use std::{
    collections::{BTreeMap, HashMap},
    io::Read,
};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::Result;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManuscriptMeta {
    #[serde(default)]
    pub shelfmark: String,
    #[serde(default)]
    pub title: String,
}

impl ManuscriptMeta {
    pub fn new(shelfmark: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            shelfmark: shelfmark.into(),
            title: title.into(),
        }
    }

    pub fn field(&self, field: MetaField) -> &str {
        match field {
            MetaField::Shelfmark => &self.shelfmark,
            MetaField::Title => &self.title,
        }
    }

    /// Case-insensitive substring test. `needle` must be lowercase.
    pub fn field_contains(&self, field: MetaField, needle: &str) -> bool {
        let value = self.field(field);
        !value.is_empty() && value.to_lowercase().contains(needle)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MetaField {
    Shelfmark,
    Title,
}

/// Shelfmark for display, or the system id when none is known.
pub fn display_shelfmark(
    meta: Option<&ManuscriptMeta>,
    system_id: &str,
) -> String {
    match meta {
        Some(m) if !m.shelfmark.trim().is_empty() => m.shelfmark.clone(),
        _ => format!("ID: {system_id}"),
    }
}

fn shortest_call_number(field: &str) -> &str {
    field
        .split('|')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .fold("", |best, s| {
            if best.is_empty() || s.chars().count() < best.chars().count() {
                s
            } else {
                best
            }
        })
}

pub trait MetadataSource {
    /// Records for whichever of `ids` are known.
    fn lookup(&self, ids: &[&str]) -> Result<HashMap<String, ManuscriptMeta>>;

    /// System ids whose `field` contains `query`, ignoring case, sorted.
    fn find(&self, field: MetaField, query: &str) -> Result<Vec<String>>;
}

/// In-memory metadata keyed by system id.
#[derive(Debug, Clone, Default)]
pub struct MetadataBank {
    entries: BTreeMap<String, ManuscriptMeta>,
}

impl MetadataBank {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a JSON object of `{system_id: {shelfmark, title}}`.
    pub fn from_json(json: &str) -> Result<Self> {
        let entries: BTreeMap<String, ManuscriptMeta> =
            serde_json::from_str(json)?;
        Ok(Self { entries })
    }

    /// Parse a library catalogue export (`libraries.csv`).
    ///
    /// The first row is a header. Column 0 holds the system number (only
    /// its digits are kept), column 1 one or more `|`-separated call
    /// numbers and column 5 the title. The shortest non-empty call number
    /// becomes the shelfmark; ties keep the first listed. Rows with fewer
    /// than two columns or no digits in the system number are skipped.
    /// Invalid UTF-8 is replaced rather than rejected.
    pub fn from_csv(reader: impl Read) -> Result<Self> {
        let mut rows = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(reader);

        let mut bank = Self::new();
        let mut skipped = 0usize;
        for record in rows.byte_records() {
            let record = record?;
            let column = |i: usize| {
                record.get(i).map(String::from_utf8_lossy).unwrap_or_default()
            };
            let system_id: String =
                column(0).chars().filter(char::is_ascii_digit).collect();
            if record.len() < 2 || system_id.is_empty() {
                skipped += 1;
                continue;
            }

            let meta = ManuscriptMeta::new(
                shortest_call_number(&column(1)),
                column(5).trim(),
            );
            bank.insert(system_id, meta);
        }
        debug!(records = bank.len(), skipped, "Parsed catalogue CSV");
        Ok(bank)
    }

    pub fn insert(
        &mut self,
        system_id: impl Into<String>,
        meta: ManuscriptMeta,
    ) {
        self.entries.insert(system_id.into(), meta);
    }

    pub fn get(&self, system_id: &str) -> Option<&ManuscriptMeta> {
        self.entries.get(system_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ManuscriptMeta)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl MetadataSource for MetadataBank {
    fn lookup(&self, ids: &[&str]) -> Result<HashMap<String, ManuscriptMeta>> {
        Ok(ids
            .iter()
            .filter_map(|id| {
                self.entries.get(*id).map(|m| (id.to_string(), m.clone()))
            })
            .collect())
    }

    fn find(&self, field: MetaField, query: &str) -> Result<Vec<String>> {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return Ok(Vec::new());
        }
        Ok(self
            .entries
            .iter()
            .filter(|(_, meta)| meta.field_contains(field, &needle))
            .map(|(id, _)| id.clone())
            .collect())
    }
}
