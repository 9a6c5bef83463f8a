//! Config directory layout and store construction.
//!
//! ```text
//! <config dir>/
//!   config.json        BlipperConfig
//!   token              bearer token
//!   preferences.json   remembered directories and repository
//! ```

use anyhow::{Context, Result, anyhow};
use blipper_core::preferences::REPOSITORY_KEY;
use blipper_core::{
    BlipperConfig, ContentSyncEngine, FilePreferenceStore, FileTokenStore, GitHubClient,
    PreferenceStore, RepositoryRef, SourceControl, TokenStore,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Environment variable that overrides the stored token
pub const TOKEN_ENV: &str = "BLIPPER_TOKEN";

/// Default config directory: `<platform config dir>/blipper`.
pub fn default_config_dir() -> Result<PathBuf> {
    dirs::config_dir()
        .map(|dir| dir.join("blipper"))
        .ok_or_else(|| anyhow!("Could not determine a config directory; pass --config-dir"))
}

/// Token store that prefers a token from the environment.
struct EnvTokenStore {
    env_token: Option<String>,
    file: FileTokenStore,
}

impl TokenStore for EnvTokenStore {
    fn token(&self) -> Option<String> {
        self.env_token.clone().or_else(|| self.file.token())
    }

    fn set_token(&self, token: &str) -> blipper_core::Result<()> {
        self.file.set_token(token)
    }
}

/// Loaded configuration plus the stores living next to it
pub struct Workspace {
    dir: PathBuf,
    pub config: BlipperConfig,
    tokens: FileTokenStore,
    preferences: Arc<FilePreferenceStore>,
}

impl Workspace {
    pub fn open(dir: PathBuf) -> Result<Self> {
        let config = BlipperConfig::load(&dir)
            .with_context(|| format!("Failed to load config from {}", dir.display()))?;
        let preferences = FilePreferenceStore::open(&dir.join("preferences.json"))
            .context("Failed to open preferences")?;
        Ok(Self {
            tokens: FileTokenStore::new(&dir.join("token")),
            preferences: Arc::new(preferences),
            config,
            dir,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// The on-disk token store, bypassing the environment override.
    pub fn file_tokens(&self) -> &FileTokenStore {
        &self.tokens
    }

    fn tokens(&self) -> Arc<dyn TokenStore> {
        let env_token = std::env::var(TOKEN_ENV)
            .ok()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty());
        Arc::new(EnvTokenStore {
            env_token,
            file: self.tokens.clone(),
        })
    }

    pub fn client(&self) -> Result<Arc<dyn SourceControl>> {
        let client = GitHubClient::from_config(&self.config, self.tokens())
            .context("Failed to create GitHub client")?;
        Ok(Arc::new(client))
    }

    /// `explicit` if given, else the remembered repository.
    pub fn resolve_repository(&self, explicit: Option<&str>) -> Result<RepositoryRef> {
        let reference = match explicit {
            Some(r) => r.to_string(),
            None => self.preferences.get(REPOSITORY_KEY).ok_or_else(|| {
                anyhow!("No repository given and none remembered; pass --repo owner/name")
            })?,
        };
        Ok(reference.parse::<RepositoryRef>()?)
    }

    pub fn engine(&self, remote: Arc<dyn SourceControl>, repo: RepositoryRef) -> ContentSyncEngine {
        ContentSyncEngine::new(remote, self.preferences.clone(), repo, self.config.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_resolve_repository() {
        let tmp = TempDir::new().unwrap();
        let workspace = Workspace::open(tmp.path().to_path_buf()).unwrap();

        assert!(workspace.resolve_repository(None).is_err());
        let repo = workspace.resolve_repository(Some("octo/blog")).unwrap();
        assert_eq!(repo, RepositoryRef::new("octo", "blog"));
        assert!(workspace.resolve_repository(Some("nope")).is_err());

        workspace.preferences.set(REPOSITORY_KEY, "octo/notes").unwrap();
        let repo = workspace.resolve_repository(None).unwrap();
        assert_eq!(repo.name, "notes");
    }

    #[test]
    fn test_env_token_overrides_file() {
        let tmp = TempDir::new().unwrap();
        let file = FileTokenStore::new(&tmp.path().join("token"));
        file.set_token("from-file").unwrap();

        let store = EnvTokenStore {
            env_token: Some("from-env".to_string()),
            file: file.clone(),
        };
        assert_eq!(store.token().as_deref(), Some("from-env"));

        let store = EnvTokenStore {
            env_token: None,
            file,
        };
        assert_eq!(store.token().as_deref(), Some("from-file"));
    }
}
