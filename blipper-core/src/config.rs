//! Configuration stored at `<config dir>/config.json`.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::asset::EncodeOptions;
use crate::error::{Result, SyncError};

/// GitHub REST API root
pub const DEFAULT_API_BASE_URL: &str = "https://api.github.com";

/// Blipper configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlipperConfig {
    /// Root URL of the content API.
    pub api_base_url: String,
    /// HTTP request timeout in seconds.
    pub request_timeout_secs: u64,
    /// Target branch for writes (`None` = repository default branch).
    pub branch: Option<String>,
    /// Extension of generated entries, without the dot.
    pub entry_extension: String,
    pub entry_commit_message: String,
    pub asset_commit_message: String,
    /// Posts directory used when no preference is remembered.
    pub default_posts_directory: String,
    /// Images directory used when no preference is remembered.
    pub default_images_directory: String,
    /// Longest edge of uploaded images, in pixels.
    pub max_image_size: u32,
    /// Lossy encoder quality, 0.0 to 1.0.
    pub image_quality: f32,
}

impl Default for BlipperConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            request_timeout_secs: 30,
            branch: None,
            entry_extension: "mdx".to_string(),
            entry_commit_message: "update blips".to_string(),
            asset_commit_message: "upload image".to_string(),
            default_posts_directory: "/src/collections/blips".to_string(),
            default_images_directory: "/public/img/blips".to_string(),
            max_image_size: 1000,
            image_quality: 0.9,
        }
    }
}

impl BlipperConfig {
    /// Load config from a config directory; defaults when the file is absent.
    pub fn load(config_dir: &Path) -> Result<Self> {
        let config_path = config_dir.join("config.json");
        if !config_path.exists() {
            return Ok(Self::default());
        }
        let data = fs::read_to_string(&config_path)?;
        let config: BlipperConfig = serde_json::from_str(&data).map_err(|e| {
            SyncError::Storage(format!("Failed to parse {}: {}", config_path.display(), e))
        })?;
        Ok(config)
    }

    pub fn encode_options(&self) -> EncodeOptions {
        EncodeOptions {
            max_size: self.max_image_size,
            quality: self.image_quality,
        }
    }
}
