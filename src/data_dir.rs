use std::path::{Path, PathBuf};

use crate::{
    error::{Error, Result},
    ingestion::sibling_dir,
};

/// Environment variable that overrides the default location.
pub const DATA_DIR_ENV: &str = "GENIZAH_DATA_DIR";

#[derive(Debug, Clone)]
pub struct DataDir {
    root: PathBuf,
}

impl DataDir {
    /// Resolve the data directory from, in order of priority:
    /// 1. An explicit path (from --data-dir)
    /// 2. The [`DATA_DIR_ENV`] environment variable
    /// 3. The XDG data directory (~/.local/share/genizah/)
    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        let root = match explicit {
            Some(path) => path.to_path_buf(),
            None => match std::env::var_os(DATA_DIR_ENV) {
                Some(val) => PathBuf::from(val),
                None => Self::xdg_home()?,
            },
        };

        std::fs::create_dir_all(&root)
            .map_err(|_| Error::DataDir(root.clone()))?;

        Ok(Self { root })
    }

    fn xdg_home() -> Result<PathBuf> {
        xdg::BaseDirectories::with_prefix("genizah")
            .get_data_home()
            .ok_or_else(|| {
                Error::Config(
                    "could not determine XDG data home directory".into(),
                )
            })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config_db(&self) -> PathBuf {
        self.root.join("config.redb")
    }

    /// Location of the search index. Not created here: the index builder
    /// swaps a finished directory into place.
    pub fn index_dir(&self) -> PathBuf {
        self.root.join("index")
    }

    /// Where an in-progress build is written before it is swapped in.
    pub fn staging_dir(&self) -> PathBuf {
        sibling_dir(&self.index_dir(), "staging")
    }

    /// Whether a committed index is present.
    pub fn has_index(&self) -> bool {
        self.index_dir().join("meta.json").is_file()
    }
}
