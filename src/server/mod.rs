//! Cloud-save server: authenticated per-player file storage over HTTP.
//!
//! # Configuration
//!
//! Environment variables:
//! - `SAVESYNC_PORT`: Port to listen on (default: 8080)
//! - `SAVESYNC_DATA_DIR`: Directory to store saves (default: ~/.local/share/savesync-server)
//! - `SAVESYNC_CONFIG`: Path to config file (default: ~/.config/savesync-server/config.yaml)
//!
//! # Config File Format
//!
//! ```yaml
//! api_keys:
//!   - key: "your-secret-key-here"
//!     player_id: "player1"
//! ```

pub mod routes;
pub mod storage;

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use savesync_core::sync::PlayerId;

pub use routes::{router, AppState};
pub use storage::{PlayerStorage, StorageError};

/// API key entry in config
#[derive(Debug, Clone, Deserialize)]
struct ApiKeyEntry {
    key: String,
    player_id: String,
}

/// Config file structure
#[derive(Debug, Clone, Deserialize, Default)]
struct ConfigFile {
    #[serde(default)]
    api_keys: Vec<ApiKeyEntry>,
}

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Port to listen on
    pub port: u16,
    /// Directory holding one subdirectory of saves per player
    pub data_dir: PathBuf,
    /// Path to config file
    pub config_path: PathBuf,
}

impl ServerConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let port = std::env::var("SAVESYNC_PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(8080);

        let data_dir = std::env::var("SAVESYNC_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                dirs::data_dir()
                    .unwrap_or_else(|| PathBuf::from("."))
                    .join("savesync-server")
            });

        let config_path = std::env::var("SAVESYNC_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                dirs::config_dir()
                    .unwrap_or_else(|| PathBuf::from("."))
                    .join("savesync-server")
                    .join("config.yaml")
            });

        Self {
            port,
            data_dir,
            config_path,
        }
    }
}

/// API key store - maps key -> player
#[derive(Debug, Clone, Default)]
pub struct ApiKeyStore {
    keys: HashMap<String, PlayerId>,
}

impl ApiKeyStore {
    /// Load API keys from config file. An unreadable file loads no keys.
    pub fn load(config_path: &Path) -> Self {
        let contents = match std::fs::read_to_string(config_path) {
            Ok(contents) => contents,
            Err(e) => {
                tracing::warn!(
                    "Failed to read config file {}: {}",
                    config_path.display(),
                    e
                );
                tracing::warn!("No API keys loaded - all authenticated requests will fail");
                return Self::default();
            }
        };

        match Self::parse(&contents) {
            Ok(store) => {
                tracing::info!("Loaded {} API key(s)", store.keys.len());
                store
            }
            Err(e) => {
                tracing::warn!("Failed to parse config file: {}", e);
                Self::default()
            }
        }
    }

    pub fn parse(yaml: &str) -> Result<Self, serde_yaml::Error> {
        let config: ConfigFile = serde_yaml::from_str(yaml)?;
        let keys = config
            .api_keys
            .into_iter()
            .map(|entry| (entry.key, PlayerId::new(entry.player_id)))
            .collect();
        Ok(Self { keys })
    }

    pub fn with_key(mut self, key: impl Into<String>, player: impl Into<PlayerId>) -> Self {
        self.keys.insert(key.into(), player.into());
        self
    }

    /// Validate an API key and return the associated player
    pub fn validate(&self, key: &str) -> Option<PlayerId> {
        self.keys.get(key).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_api_keys() {
        let store = ApiKeyStore::parse(
            "api_keys:\n  - key: k1\n    player_id: alice\n  - key: k2\n    player_id: bob\n",
        )
        .unwrap();

        assert_eq!(store.validate("k1"), Some(PlayerId::from("alice")));
        assert_eq!(store.validate("k2"), Some(PlayerId::from("bob")));
        assert_eq!(store.validate("k3"), None);
    }

    #[test]
    fn test_missing_config_loads_no_keys() {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = ApiKeyStore::load(&temp_dir.path().join("missing.yaml"));
        assert_eq!(store.validate("anything"), None);
    }
}
