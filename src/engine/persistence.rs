use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use log::warn;
use serde_json::Value;

use crate::{Error, Result};

#[allow(unused_imports)]
use crate::engine::MemPreferences;

/// Handles disk I/O for a [`MemPreferences`] store.
///
/// Persistence uses an atomic "write-then-rename" strategy to ensure data integrity.
/// Each named store lives in its own `<name>.json` file.
pub struct Persistence {
    data_dir: PathBuf,
    name: String,
}

impl Persistence {
    /// Initializes a new `Persistence` handler for the store `name` in `dir`.
    ///
    /// If the directory does not exist, it will be created. The name becomes a file
    /// name, so it must be non-empty and free of path separators.
    pub fn new<P: AsRef<Path>>(dir: P, name: &str) -> Result<Self> {
        if name.is_empty() || name.contains(['/', '\\']) || name == "." || name == ".." {
            return Err(Error::InvalidArgument(format!(
                "invalid store name {:?}",
                name
            )));
        }
        let dir = dir.as_ref().to_path_buf();
        if !dir.exists() {
            fs::create_dir_all(&dir)?;
        }
        Ok(Self {
            data_dir: dir,
            name: name.to_string(),
        })
    }

    /// Path of the backing file.
    pub fn path(&self) -> PathBuf {
        self.data_dir.join(format!("{}.json", self.name))
    }

    /// Writes every entry to the backing file atomically.
    ///
    /// This method writes to a temporary file first and then renames it to the
    /// final destination, preventing file corruption during power failures.
    pub fn save(&self, data: &HashMap<String, Value>) -> Result<()> {
        let file_path = self.path();
        let temp_path = file_path.with_extension("json.tmp");

        let bytes = serde_json::to_vec_pretty(data)?;

        fs::write(&temp_path, bytes)?;
        fs::rename(&temp_path, &file_path)?;

        Ok(())
    }

    /// Loads the persisted entries.
    ///
    /// A missing file is an empty store. A file that cannot be read or parsed is logged
    /// and also treated as empty, so a corrupt settings file never prevents startup.
    pub fn load(&self) -> Result<HashMap<String, Value>> {
        let path = self.path();
        if !path.exists() {
            return Ok(HashMap::new());
        }

        let content = match fs::read(&path) {
            Ok(c) => c,
            Err(e) => {
                warn!("Could not read preferences file {:?}: {}", path, e);
                return Ok(HashMap::new());
            }
        };

        match serde_json::from_slice(&content) {
            Ok(d) => Ok(d),
            Err(e) => {
                warn!("Could not unmarshal preferences from {:?}: {}", path, e);
                Ok(HashMap::new())
            }
        }
    }
}
