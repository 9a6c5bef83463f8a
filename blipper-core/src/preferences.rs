//! Persisted user preferences
//!
//! Last-used directories and repository. These values are advisory: the
//! engine reads them once at construction and validates them against every
//! freshly loaded tree before use.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use crate::error::{Result, SyncError};

/// Key for the last selected posts directory
pub const POSTS_DIRECTORY_KEY: &str = "posts-directory";
/// Key for the last selected images directory
pub const IMAGES_DIRECTORY_KEY: &str = "images-directory";
/// Key for the last used repository (`owner/name`)
pub const REPOSITORY_KEY: &str = "repository";

/// Key/value store for preferences
pub trait PreferenceStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;

    fn set(&self, key: &str, value: &str) -> Result<()>;
}

/// In-memory preference store
#[derive(Debug, Default)]
pub struct MemoryPreferenceStore {
    values: RwLock<BTreeMap<String, String>>,
}

impl MemoryPreferenceStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PreferenceStore for MemoryPreferenceStore {
    fn get(&self, key: &str) -> Option<String> {
        self.values.read().ok()?.get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut values = self
            .values
            .write()
            .map_err(|_| SyncError::Storage("preference lock poisoned".to_string()))?;
        values.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// On-disk representation of the preference file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct PreferenceFile {
    #[serde(flatten)]
    values: BTreeMap<String, String>,
}

/// Preference store persisted as a JSON object at `path`
pub struct FilePreferenceStore {
    path: PathBuf,
    cache: RwLock<PreferenceFile>,
}

impl FilePreferenceStore {
    /// Open the store, loading existing values. A missing file is empty.
    pub fn open(path: &Path) -> Result<Self> {
        let cache = if path.exists() {
            let data = fs::read_to_string(path)?;
            serde_json::from_str(&data)?
        } else {
            PreferenceFile::default()
        };
        Ok(Self {
            path: path.to_path_buf(),
            cache: RwLock::new(cache),
        })
    }

    fn save(&self, file: &PreferenceFile) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp_path = self.path.with_extension("tmp");
        let data = serde_json::to_string_pretty(file)?;
        fs::write(&tmp_path, &data)?;
        fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }
}

impl PreferenceStore for FilePreferenceStore {
    fn get(&self, key: &str) -> Option<String> {
        self.cache.read().ok()?.values.get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut cache = self
            .cache
            .write()
            .map_err(|_| SyncError::Storage("preference lock poisoned".to_string()))?;
        if cache.values.get(key).map(String::as_str) == Some(value) {
            return Ok(());
        }
        let mut next = cache.clone();
        next.values.insert(key.to_string(), value.to_string());
        self.save(&next)?;
        *cache = next;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_memory_store_roundtrip() {
        let store = MemoryPreferenceStore::new();
        assert!(store.get(POSTS_DIRECTORY_KEY).is_none());
        store.set(POSTS_DIRECTORY_KEY, "/posts").unwrap();
        assert_eq!(store.get(POSTS_DIRECTORY_KEY).as_deref(), Some("/posts"));
    }

    #[test]
    fn test_file_store_save_load() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("preferences.json");

        let store = FilePreferenceStore::open(&path).unwrap();
        store.set(IMAGES_DIRECTORY_KEY, "/public/img").unwrap();
        store.set(REPOSITORY_KEY, "octo/blog").unwrap();
        assert!(path.exists());

        let reopened = FilePreferenceStore::open(&path).unwrap();
        assert_eq!(reopened.get(IMAGES_DIRECTORY_KEY).as_deref(), Some("/public/img"));
        assert_eq!(reopened.get(REPOSITORY_KEY).as_deref(), Some("octo/blog"));
        assert!(reopened.get(POSTS_DIRECTORY_KEY).is_none());
    }

    #[test]
    fn test_failed_write_keeps_cache() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("prefs").join("preferences.json");
        let store = FilePreferenceStore::open(&path).unwrap();
        store.set(POSTS_DIRECTORY_KEY, "/posts").unwrap();

        // A directory in place of the temp file makes the write fail.
        fs::create_dir_all(path.with_extension("tmp")).unwrap();
        assert!(store.set(POSTS_DIRECTORY_KEY, "/notes").is_err());
        assert_eq!(store.get(POSTS_DIRECTORY_KEY).as_deref(), Some("/posts"));
    }

    #[test]
    fn test_file_store_rejects_corrupt_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("preferences.json");
        fs::write(&path, "not json").unwrap();
        let result = FilePreferenceStore::open(&path);
        assert!(matches!(result, Err(SyncError::Storage(_))));
    }
}
