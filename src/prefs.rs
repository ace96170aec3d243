//! Local preferences stored as a small JSON key-value file.
//!
//! Only the last-used sort of each listing lives here today, under
//! `sort.<view>` keys.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::config;
use crate::error::{DocketError, Result};
use crate::query::SortSpec;

const PREFS_FILE: &str = "preferences.json";

#[derive(Debug, Clone)]
pub struct Preferences {
    path: PathBuf,
    values: BTreeMap<String, Value>,
}

impl Preferences {
    /// Open the preferences file in the data directory.
    pub fn open_default() -> Result<Self> {
        Self::open(&config::data_dir()?.join(PREFS_FILE))
    }

    /// Open `path`. A missing file is empty; an unreadable one is replaced
    /// on the next write.
    pub fn open(path: &Path) -> Result<Self> {
        let values = match fs::read_to_string(path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                tracing::warn!("ignoring unreadable preferences at {}: {}", path.display(), e);
                BTreeMap::new()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };
        Ok(Self {
            path: path.to_path_buf(),
            values,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let value = self.values.get(key)?.clone();
        match serde_json::from_value(value) {
            Ok(v) => Some(v),
            Err(e) => {
                tracing::warn!("ignoring preference '{}': {}", key, e);
                None
            }
        }
    }

    /// Store `value` under `key` and write the file.
    pub fn set<T: Serialize>(&mut self, key: &str, value: &T) -> Result<()> {
        self.values
            .insert(key.to_string(), serde_json::to_value(value)?);
        self.save()
    }

    pub fn remove(&mut self, key: &str) -> Result<()> {
        if self.values.remove(key).is_some() {
            self.save()?;
        }
        Ok(())
    }

    pub fn sort_for(&self, view: &str) -> Option<SortSpec> {
        self.get(&sort_key(view))
    }

    pub fn set_sort(&mut self, view: &str, sort: SortSpec) -> Result<()> {
        self.set(&sort_key(view), &sort)
    }

    fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(&self.values)?;

        // Write then rename so a crash never leaves a truncated file
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, content)?;
        fs::rename(&tmp, &self.path).map_err(|e| {
            DocketError::Io(std::io::Error::new(
                e.kind(),
                format!("Failed to write preferences at {}: {}", self.path.display(), e),
            ))
        })
    }
}

fn sort_key(view: &str) -> String {
    format!("sort.{view}")
}
