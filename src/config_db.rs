use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};

use redb::{
    Database, ReadableDatabase, ReadableTable, ReadableTableMetadata,
    TableDefinition,
};

use serde::Serialize;

use crate::{
    error::{Error, Result},
    metadata::{ManuscriptMeta, MetaField, MetadataBank, MetadataSource},
};

const METADATA: TableDefinition<&str, &[u8]> = TableDefinition::new("metadata");
const SETTINGS: TableDefinition<&str, &str> = TableDefinition::new("settings");

/// Names of the recognized settings.
pub mod keys {
    pub const CORPUS_PATH: &str = "corpus_path";
    pub const CHUNK_SIZE: &str = "chunk_size";
    pub const MAX_FREQ: &str = "max_freq";
    pub const GROUP_THRESHOLD: &str = "group_threshold";
    pub const VARIANT_LIMIT: &str = "variant_limit";
    pub const CANDIDATE_LIMIT: &str = "candidate_limit";
    pub const VARIANT_TABLE: &str = "variant_table";

    pub const ALL: &[&str] = &[
        CORPUS_PATH,
        CHUNK_SIZE,
        MAX_FREQ,
        GROUP_THRESHOLD,
        VARIANT_LIMIT,
        CANDIDATE_LIMIT,
        VARIANT_TABLE,
    ];
}

pub struct ConfigDb {
    db: Database,
}

impl ConfigDb {
    pub fn open(path: &Path) -> Result<Self> {
        let db = Database::create(path)?;

        // Ensure all tables exist by opening them in a write transaction.
        let txn = db.begin_write()?;
        txn.open_table(METADATA)?;
        txn.open_table(SETTINGS)?;
        txn.commit()?;

        Ok(Self { db })
    }

    // -- Settings --

    pub fn set_setting(&self, key: &str, value: &str) -> Result<()> {
        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(SETTINGS)?;
            table.insert(key, value)?;
        }
        txn.commit()?;
        Ok(())
    }

    pub fn get_setting(&self, key: &str) -> Result<Option<String>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(SETTINGS)?;
        Ok(table.get(key)?.map(|v| v.value().to_string()))
    }

    /// Get a setting, returning the default if not set.
    pub fn get_setting_or(&self, key: &str, default: &str) -> Result<String> {
        Ok(self
            .get_setting(key)?
            .unwrap_or_else(|| default.to_string()))
    }

    pub fn remove_setting(&self, key: &str) -> Result<bool> {
        let txn = self.db.begin_write()?;
        let removed = {
            let mut table = txn.open_table(SETTINGS)?;
            table.remove(key)?.is_some()
        };
        txn.commit()?;
        Ok(removed)
    }

    pub fn list_settings(&self) -> Result<Vec<(String, String)>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(SETTINGS)?;
        let mut result = Vec::new();
        for entry in table.iter()? {
            let (k, v) = entry?;
            result.push((k.value().to_string(), v.value().to_string()));
        }
        Ok(result)
    }

    // -- Manuscript metadata --

    pub fn set_metadata(
        &self,
        system_id: &str,
        meta: &ManuscriptMeta,
    ) -> Result<()> {
        let bytes = serde_json::to_vec(meta)?;
        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(METADATA)?;
            table.insert(system_id, bytes.as_slice())?;
        }
        txn.commit()?;
        Ok(())
    }

    pub fn get_metadata(
        &self,
        system_id: &str,
    ) -> Result<Option<ManuscriptMeta>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(METADATA)?;
        match table.get(system_id)? {
            Some(v) => Ok(Some(serde_json::from_slice(v.value())?)),
            None => Ok(None),
        }
    }

    /// Store every entry of `bank` in a single transaction, replacing
    /// existing records with the same system id.
    pub fn import_metadata(&self, bank: &MetadataBank) -> Result<usize> {
        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(METADATA)?;
            for (system_id, meta) in bank.iter() {
                let bytes = serde_json::to_vec(meta)?;
                table.insert(system_id.as_str(), bytes.as_slice())?;
            }
        }
        txn.commit()?;
        Ok(bank.len())
    }

    pub fn clear_metadata(&self) -> Result<()> {
        let txn = self.db.begin_write()?;
        txn.delete_table(METADATA)?;
        txn.open_table(METADATA)?;
        txn.commit()?;
        Ok(())
    }

    pub fn metadata_count(&self) -> Result<u64> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(METADATA)?;
        Ok(table.len()?)
    }

    /// Return all records in a single read transaction.
    pub fn all_metadata(&self) -> Result<MetadataBank> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(METADATA)?;
        let mut bank = MetadataBank::new();
        for entry in table.iter()? {
            let (k, v) = entry?;
            bank.insert(k.value(), serde_json::from_slice(v.value())?);
        }
        Ok(bank)
    }
}

impl MetadataSource for ConfigDb {
    fn lookup(&self, ids: &[&str]) -> Result<HashMap<String, ManuscriptMeta>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(METADATA)?;
        let mut found = HashMap::new();
        for id in ids {
            if let Some(v) = table.get(*id)? {
                let meta = serde_json::from_slice(v.value())?;
                found.insert(id.to_string(), meta);
            }
        }
        Ok(found)
    }

    fn find(&self, field: MetaField, query: &str) -> Result<Vec<String>> {
        self.all_metadata()?.find(field, query)
    }
}

impl std::fmt::Debug for ConfigDb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigDb").finish_non_exhaustive()
    }
}

/// Engine parameters resolved from stored settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Settings {
    /// Corpus exports, highest priority first. Stored as one
    /// platform path list (`:`-separated on Unix).
    #[serde(rename = "corpus_path")]
    pub corpus_paths: Vec<PathBuf>,
    pub chunk_size: usize,
    pub max_freq: usize,
    pub group_threshold: usize,
    pub variant_limit: usize,
    pub candidate_limit: usize,
    pub variant_table: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            corpus_paths: Vec::new(),
            chunk_size: crate::composition::DEFAULT_CHUNK_SIZE,
            max_freq: crate::composition::DEFAULT_MAX_FREQ,
            group_threshold: crate::grouping::DEFAULT_GROUP_THRESHOLD,
            variant_limit: crate::variants::DEFAULT_VARIANT_LIMIT,
            candidate_limit: crate::planner::DEFAULT_CANDIDATE_LIMIT,
            variant_table: None,
        }
    }
}

impl Settings {
    pub fn load(db: &ConfigDb) -> Result<Self> {
        let defaults = Self::default();
        let number = |key: &str, default: usize| -> Result<usize> {
            match db.get_setting(key)? {
                Some(v) => parse_number(key, &v),
                None => Ok(default),
            }
        };
        let path = |key: &str| -> Result<Option<PathBuf>> {
            Ok(db.get_setting(key)?.map(PathBuf::from))
        };

        Ok(Self {
            corpus_paths: db
                .get_setting(keys::CORPUS_PATH)?
                .map(|v| {
                    std::env::split_paths(&v)
                        .filter(|p| !p.as_os_str().is_empty())
                        .collect()
                })
                .unwrap_or_default(),
            chunk_size: number(keys::CHUNK_SIZE, defaults.chunk_size)?,
            max_freq: number(keys::MAX_FREQ, defaults.max_freq)?,
            group_threshold: number(
                keys::GROUP_THRESHOLD,
                defaults.group_threshold,
            )?,
            variant_limit: number(keys::VARIANT_LIMIT, defaults.variant_limit)?,
            candidate_limit: number(
                keys::CANDIDATE_LIMIT,
                defaults.candidate_limit,
            )?,
            variant_table: path(keys::VARIANT_TABLE)?,
        })
    }

    /// Check that `key` is known and `value` fits it before storing.
    pub fn validate(key: &str, value: &str) -> Result<()> {
        match key {
            keys::CORPUS_PATH | keys::VARIANT_TABLE => Ok(()),
            k if keys::ALL.contains(&k) => parse_number(k, value).map(|_| ()),
            _ => Err(Error::Config(format!(
                "unknown setting '{key}' (expected one of: {})",
                keys::ALL.join(", ")
            ))),
        }
    }
}

fn parse_number(key: &str, value: &str) -> Result<usize> {
    value.trim().parse().map_err(|_| {
        Error::Config(format!(
            "setting '{key}' must be a non-negative integer, got '{value}'"
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_db() -> (tempfile::TempDir, ConfigDb) {
        let tmp = tempfile::tempdir().unwrap();
        let db = ConfigDb::open(&tmp.path().join("config.redb")).unwrap();
        (tmp, db)
    }

    #[test]
    fn settings_crud() {
        let (_tmp, db) = test_db();

        assert_eq!(db.get_setting("chunk_size").unwrap(), None);
        assert_eq!(db.get_setting_or("chunk_size", "6").unwrap(), "6");

        db.set_setting("chunk_size", "8").unwrap();
        assert_eq!(
            db.get_setting("chunk_size").unwrap(),
            Some("8".to_string())
        );
        assert_eq!(
            db.list_settings().unwrap(),
            vec![("chunk_size".to_string(), "8".to_string())]
        );

        assert!(db.remove_setting("chunk_size").unwrap());
        assert!(!db.remove_setting("chunk_size").unwrap());
    }

    #[test]
    fn settings_load_defaults_and_overrides() {
        let (_tmp, db) = test_db();
        assert_eq!(Settings::load(&db).unwrap(), Settings::default());

        db.set_setting(keys::MAX_FREQ, "25").unwrap();
        db.set_setting(keys::CORPUS_PATH, "/data/pages.txt").unwrap();
        let settings = Settings::load(&db).unwrap();
        assert_eq!(settings.max_freq, 25);
        assert_eq!(settings.chunk_size, 6);
        assert_eq!(
            settings.corpus_paths,
            vec![PathBuf::from("/data/pages.txt")]
        );
    }

    #[test]
    fn corpus_path_list_keeps_order() {
        let (_tmp, db) = test_db();
        let list = std::env::join_paths(["/data/v8.txt", "/data/v7.txt"])
            .unwrap();
        db.set_setting(keys::CORPUS_PATH, &list.to_string_lossy())
            .unwrap();
        assert_eq!(
            Settings::load(&db).unwrap().corpus_paths,
            vec![PathBuf::from("/data/v8.txt"), PathBuf::from("/data/v7.txt")]
        );
    }

    #[test]
    fn malformed_number_is_a_config_error() {
        let (_tmp, db) = test_db();
        db.set_setting(keys::CHUNK_SIZE, "six").unwrap();
        assert!(matches!(Settings::load(&db), Err(Error::Config(_))));
    }

    #[test]
    fn validate_rejects_unknown_keys() {
        assert!(Settings::validate(keys::GROUP_THRESHOLD, "3").is_ok());
        assert!(Settings::validate(keys::VARIANT_TABLE, "x.txt").is_ok());
        assert!(Settings::validate(keys::GROUP_THRESHOLD, "-1").is_err());
        assert!(Settings::validate("model_name", "x").is_err());
    }

    #[test]
    fn metadata_import_and_lookup() {
        let (_tmp, db) = test_db();
        let bank = MetadataBank::from_json(
            r#"{
                "990000000011": {"shelfmark": "T-S NS 1", "title": "פיוט"},
                "990000000022": {"shelfmark": "MS Heb. 12"}
            }"#,
        )
        .unwrap();

        assert_eq!(db.import_metadata(&bank).unwrap(), 2);
        assert_eq!(db.metadata_count().unwrap(), 2);

        let found = db.lookup(&["990000000022", "990000000099"]).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found["990000000022"].shelfmark, "MS Heb. 12");
        assert_eq!(found["990000000022"].title, "");

        assert_eq!(
            db.find(MetaField::Shelfmark, "heb").unwrap(),
            vec!["990000000022"]
        );

        db.set_metadata("990000000011", &ManuscriptMeta::new("T-S NS 2", ""))
            .unwrap();
        assert_eq!(
            db.get_metadata("990000000011").unwrap().unwrap().shelfmark,
            "T-S NS 2"
        );

        db.clear_metadata().unwrap();
        assert_eq!(db.metadata_count().unwrap(), 0);
        assert_eq!(db.get_metadata("990000000011").unwrap(), None);
    }

    #[test]
    fn reopen_preserves_data() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("config.redb");

        {
            let db = ConfigDb::open(&path).unwrap();
            db.set_setting("group_threshold", "7").unwrap();
            db.set_metadata("990000000011", &ManuscriptMeta::new("A", "B"))
                .unwrap();
        }

        {
            let db = ConfigDb::open(&path).unwrap();
            assert_eq!(
                db.get_setting("group_threshold").unwrap(),
                Some("7".to_string())
            );
            assert_eq!(db.all_metadata().unwrap().len(), 1);
        }
    }
}
