use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use anyhow::{Context, Result};
use bucketdeck_core::preferences::Preferences;

const FILE_NAME: &str = "preferences.json";

/// Resolve the configuration directory and make sure it exists.
///
/// `BUCKETDECK_CONFIG_DIR` overrides the platform config directory.
pub fn config_dir() -> Result<PathBuf> {
    let dir = match std::env::var("BUCKETDECK_CONFIG_DIR") {
        Ok(dir) => PathBuf::from(dir),
        Err(_) => dirs::config_dir()
            .context("Failed to resolve config directory")?
            .join("bucketdeck"),
    };
    fs::create_dir_all(&dir).context("Failed to create config directory")?;
    Ok(dir)
}

/// Preferences kept as one JSON object of string values.
pub struct FilePreferences {
    file_path: PathBuf,
    values: Mutex<BTreeMap<String, String>>,
}

impl FilePreferences {
    /// Load `preferences.json` from `dir`. A corrupt file is backed up and
    /// replaced by an empty store.
    pub fn open(dir: &Path) -> Result<Self> {
        let file_path = dir.join(FILE_NAME);
        let values = Self::load_with_recovery(&file_path)?;
        Ok(Self {
            file_path,
            values: Mutex::new(values),
        })
    }

    fn load_with_recovery(file_path: &Path) -> Result<BTreeMap<String, String>> {
        if !file_path.exists() {
            return Ok(BTreeMap::new());
        }
        let data = fs::read_to_string(file_path).context("Failed to read preferences file")?;
        match serde_json::from_str(&data) {
            Ok(values) => Ok(values),
            Err(e) => {
                let backup_path = file_path.with_extension("json.bak");
                let _ = fs::copy(file_path, &backup_path);
                tracing::warn!(
                    "Preferences file is corrupt ({}), backed up to {}",
                    e,
                    backup_path.display()
                );
                fs::write(file_path, "{}").context("Failed to reset preferences file")?;
                Ok(BTreeMap::new())
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.file_path
    }
}

impl Preferences for FilePreferences {
    fn string(&self, key: &str) -> String {
        self.values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
            .unwrap_or_default()
    }

    fn set_string(&self, key: &str, value: &str) -> io::Result<()> {
        let mut values = self.values.lock().unwrap_or_else(PoisonError::into_inner);
        let previous = values.insert(key.to_string(), value.to_string());
        let written = serde_json::to_string_pretty(&*values)
            .map_err(io::Error::other)
            .and_then(|data| fs::write(&self.file_path, data));
        if written.is_err() {
            match previous {
                Some(previous) => values.insert(key.to_string(), previous),
                None => values.remove(key),
            };
        }
        written
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_file_reads_empty() {
        let dir = TempDir::new().unwrap();
        let prefs = FilePreferences::open(dir.path()).unwrap();
        assert_eq!(prefs.string("allConnections"), "");
    }

    #[test]
    fn values_survive_reopen() {
        let dir = TempDir::new().unwrap();
        let prefs = FilePreferences::open(dir.path()).unwrap();
        prefs.set_string("settings", r#"{"timeoutInSeconds":5}"#).unwrap();

        let reopened = FilePreferences::open(dir.path()).unwrap();
        assert_eq!(reopened.string("settings"), r#"{"timeoutInSeconds":5}"#);
    }

    #[test]
    fn corrupt_file_is_backed_up() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(FILE_NAME);
        fs::write(&path, "not valid json {{{").unwrap();

        let prefs = FilePreferences::open(dir.path()).unwrap();
        assert_eq!(prefs.string("settings"), "");

        let backup = path.with_extension("json.bak");
        assert_eq!(fs::read_to_string(backup).unwrap(), "not valid json {{{");
        assert_eq!(fs::read_to_string(&path).unwrap(), "{}");
    }

    #[test]
    fn failed_write_keeps_previous_value() {
        let dir = TempDir::new().unwrap();
        let prefs = FilePreferences::open(dir.path()).unwrap();
        prefs.set_string("k", "v1").unwrap();

        let broken = FilePreferences {
            file_path: dir.path().join("missing").join(FILE_NAME),
            values: Mutex::new(BTreeMap::from([("k".to_string(), "v1".to_string())])),
        };
        assert!(broken.set_string("k", "v2").is_err());
        assert_eq!(broken.string("k"), "v1");
    }
}
