use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use crate::engine::{MemPreferences, Persistence};
use crate::Result;

/// Environment variable overriding [`StoreConfig::data_dir`].
pub const DATA_DIR_ENV: &str = "RX_PREFS_DATA_DIR";
/// Environment variable overriding [`StoreConfig::name`].
pub const NAME_ENV: &str = "RX_PREFS_NAME";

pub const DEFAULT_DATA_DIR: &str = "data";
pub const DEFAULT_NAME: &str = "preferences";

/// Where a persisted store lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    pub data_dir: PathBuf,
    pub name: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            name: DEFAULT_NAME.to_string(),
        }
    }
}

impl StoreConfig {
    /// Reads `RX_PREFS_DATA_DIR` and `RX_PREFS_NAME`, falling back to the defaults for
    /// unset or empty variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let data_dir = env::var(DATA_DIR_ENV)
            .ok()
            .filter(|v| !v.is_empty())
            .map(PathBuf::from)
            .unwrap_or(defaults.data_dir);
        let name = env::var(NAME_ENV)
            .ok()
            .filter(|v| !v.is_empty())
            .unwrap_or(defaults.name);
        Self { data_dir, name }
    }
}

/// Opens the persisted store described by `config`.
///
/// The data directory is created if needed and any existing file is loaded.
///
/// # Examples
///
/// ```no_run
/// use rx_prefs::config::{self, StoreConfig};
/// use rx_prefs::RxPreferences;
///
/// fn main() -> anyhow::Result<()> {
///     let store = config::open(&StoreConfig::from_env())?;
///     let rx = RxPreferences::create(store);
///     let volume = rx.get_integer("volume", 50);
///     volume.set_sync(80);
///     Ok(())
/// }
/// ```
pub fn open(config: &StoreConfig) -> Result<Arc<MemPreferences>> {
    let persistence = Persistence::new(&config.data_dir, &config.name)?;
    log::debug!("Opening preferences at {:?}", persistence.path());
    Ok(Arc::new(MemPreferences::open(persistence)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SharedPreferences;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = StoreConfig::default();
        assert_eq!(config.data_dir, PathBuf::from("data"));
        assert_eq!(config.name, "preferences");
    }

    #[test]
    fn test_open_creates_and_reloads() {
        let dir = tempdir().unwrap();
        let config = StoreConfig {
            data_dir: dir.path().join("prefs"),
            name: "app".to_string(),
        };

        let store = open(&config).unwrap();
        let mut editor = store.edit();
        editor.put_bool("onboarded", true);
        assert!(editor.commit());
        assert!(dir.path().join("prefs").join("app.json").exists());

        let reopened = open(&config).unwrap();
        assert!(reopened.get_bool("onboarded", false));
    }

    #[test]
    fn test_open_rejects_bad_name() {
        let dir = tempdir().unwrap();
        let config = StoreConfig {
            data_dir: dir.path().to_path_buf(),
            name: "../escape".to_string(),
        };
        assert!(open(&config).is_err());
    }
}
