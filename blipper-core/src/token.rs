//! Credential storage
//!
//! Holds the bearer token produced by the external authorization flow.
//! Get/set only; the token is never inspected or refreshed here.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use crate::error::{Result, SyncError};

/// Token store trait
///
/// Every authenticated remote call reads the token through this trait.
pub trait TokenStore: Send + Sync {
    /// Current token, if one has been stored
    fn token(&self) -> Option<String>;

    /// Replace the stored token
    fn set_token(&self, token: &str) -> Result<()>;
}

/// Process-local token store
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    token: RwLock<Option<String>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(token: &str) -> Self {
        Self {
            token: RwLock::new(Some(token.to_string())),
        }
    }
}

impl TokenStore for MemoryTokenStore {
    fn token(&self) -> Option<String> {
        self.token.read().ok().and_then(|t| t.clone())
    }

    fn set_token(&self, token: &str) -> Result<()> {
        let mut slot = self
            .token
            .write()
            .map_err(|_| SyncError::Storage("token lock poisoned".to_string()))?;
        *slot = Some(token.to_string());
        Ok(())
    }
}

/// Token store backed by a single file
///
/// The file is written with a temp-file-then-rename so a crash never leaves
/// a half-written token behind. Blank files read as "no token".
#[derive(Debug, Clone)]
pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
        }
    }

    /// Remove the stored token, if any
    pub fn clear(&self) -> Result<()> {
        if self.path.exists() {
            fs::remove_file(&self.path)?;
        }
        Ok(())
    }
}

impl TokenStore for FileTokenStore {
    fn token(&self) -> Option<String> {
        let data = fs::read_to_string(&self.path).ok()?;
        let token = data.trim();
        if token.is_empty() {
            None
        } else {
            Some(token.to_string())
        }
    }

    fn set_token(&self, token: &str) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp_path = self.path.with_extension("tmp");
        fs::write(&tmp_path, token.trim())?;
        fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_memory_store_starts_empty() {
        let store = MemoryTokenStore::new();
        assert!(store.token().is_none());
        store.set_token("gho_abc").unwrap();
        assert_eq!(store.token().as_deref(), Some("gho_abc"));
    }

    #[test]
    fn test_memory_store_reports_poisoned_lock() {
        let store = std::sync::Arc::new(MemoryTokenStore::new());
        let poisoner = store.clone();
        let _ = std::thread::spawn(move || {
            let _guard = poisoner.token.write().unwrap();
            panic!("poison");
        })
        .join();

        assert!(matches!(store.set_token("gho_abc"), Err(SyncError::Storage(_))));
    }

    #[test]
    fn test_file_store_save_load() {
        let tmp = TempDir::new().unwrap();
        let store = FileTokenStore::new(&tmp.path().join("nested").join("token"));
        assert!(store.token().is_none());

        store.set_token("gho_123\n").unwrap();
        assert_eq!(store.token().as_deref(), Some("gho_123"));

        let reopened = FileTokenStore::new(&tmp.path().join("nested").join("token"));
        assert_eq!(reopened.token().as_deref(), Some("gho_123"));
    }

    #[test]
    fn test_file_store_clear() {
        let tmp = TempDir::new().unwrap();
        let store = FileTokenStore::new(&tmp.path().join("token"));
        store.set_token("gho_x").unwrap();
        store.clear().unwrap();
        assert!(store.token().is_none());
        store.clear().unwrap();
    }
}
