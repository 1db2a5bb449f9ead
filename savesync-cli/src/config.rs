use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use savesync_core::sync::PlayerId;

/// Default interval between sync cycles, in seconds.
const DEFAULT_SYNC_INTERVAL_SECS: u64 = 40;
/// Default interval between sign-in checks, in seconds.
const DEFAULT_SIGN_IN_POLL_SECS: u64 = 10;

/// Source of a configuration value
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigSource {
    Default,
    File,
    Environment,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigSource::Default => write!(f, "default"),
            ConfigSource::File => write!(f, "file"),
            ConfigSource::Environment => write!(f, "environment"),
        }
    }
}

/// A configuration value with its source
#[derive(Debug, Clone, Serialize)]
pub struct ConfigValue<T> {
    pub value: T,
    pub source: ConfigSource,
}

impl<T> ConfigValue<T> {
    pub fn new(value: T, source: ConfigSource) -> Self {
        Self { value, source }
    }
}

/// A save-list element and its current scroll offset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MenuConfig {
    pub menu: String,
    pub element: String,
    #[serde(default)]
    pub offset: u32,
}

/// Sync configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SyncConfig {
    /// Server URL (e.g., "http://localhost:8080")
    pub server_url: Option<String>,
    /// API key for authentication
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    /// Only sync while signed in as this player
    pub player_id: Option<String>,
    /// Seconds between sync cycles (default: 40)
    pub interval_secs: Option<u64>,
    /// Seconds between sign-in checks (default: 10)
    pub sign_in_poll_secs: Option<u64>,
}

impl SyncConfig {
    /// Returns true if sync is configured (has both server_url and api_key)
    pub fn is_configured(&self) -> bool {
        self.server_url.is_some() && self.api_key.is_some()
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(
            self.interval_secs
                .filter(|secs| *secs > 0)
                .unwrap_or(DEFAULT_SYNC_INTERVAL_SECS),
        )
    }

    pub fn sign_in_poll(&self) -> Duration {
        Duration::from_secs(
            self.sign_in_poll_secs
                .filter(|secs| *secs > 0)
                .unwrap_or(DEFAULT_SIGN_IN_POLL_SECS),
        )
    }

    pub fn expected_identity(&self) -> Option<PlayerId> {
        self.player_id
            .as_deref()
            .filter(|id| !id.is_empty())
            .map(PlayerId::from)
    }
}

/// Application configuration with source tracking
#[derive(Debug, Clone, Serialize)]
pub struct Config {
    /// Directory holding the .save files
    pub save_dir: ConfigValue<PathBuf>,
    /// Language used when reading text variables
    pub language: ConfigValue<String>,
    /// YAML file backing the variable store
    pub variables_file: ConfigValue<Option<PathBuf>>,
    /// Milliseconds between polls of a running operation
    pub poll_interval_ms: ConfigValue<u64>,
    /// Save-list elements available to UI-offset addressing
    pub menus: Vec<MenuConfig>,
    /// Config file path consulted, whether or not it exists
    pub config_path: PathBuf,
    /// Config file path used (if any)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_file: Option<PathBuf>,
    /// Sync configuration
    pub sync: SyncConfig,
}

/// Internal struct for deserializing config file
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct ConfigFile {
    save_dir: Option<PathBuf>,
    language: Option<String>,
    variables_file: Option<PathBuf>,
    poll_interval_ms: Option<u64>,
    menus: Option<Vec<MenuConfig>>,
    sync: Option<SyncConfig>,
}

impl Config {
    /// Load configuration with priority: env vars > config file > defaults
    pub fn load(config_path: Option<PathBuf>) -> Result<Self, ConfigError> {
        let mut save_dir = ConfigValue::new(Self::default_save_dir(), ConfigSource::Default);
        let mut language = ConfigValue::new("en".to_string(), ConfigSource::Default);
        let mut variables_file = ConfigValue::new(None, ConfigSource::Default);
        let mut poll_interval_ms = ConfigValue::new(50, ConfigSource::Default);
        let mut menus = Vec::new();
        let mut config_file = None;
        let mut sync = SyncConfig::default();

        // Try to load from config file
        let path = config_path.unwrap_or_else(Self::default_config_path);
        if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .map_err(|e| ConfigError::ReadError(path.clone(), e))?;
            let file_config: ConfigFile = serde_yaml::from_str(&contents)
                .map_err(|e| ConfigError::ParseError(path.clone(), e))?;

            config_file = Some(path.clone());

            if let Some(dir) = file_config.save_dir {
                save_dir = ConfigValue::new(resolve_relative(&path, dir), ConfigSource::File);
            }
            if let Some(lang) = file_config.language {
                language = ConfigValue::new(lang, ConfigSource::File);
            }
            if let Some(vars) = file_config.variables_file {
                variables_file =
                    ConfigValue::new(Some(resolve_relative(&path, vars)), ConfigSource::File);
            }
            if let Some(ms) = file_config.poll_interval_ms {
                poll_interval_ms = ConfigValue::new(ms, ConfigSource::File);
            }
            if let Some(menu_config) = file_config.menus {
                menus = menu_config;
            }
            if let Some(sync_config) = file_config.sync {
                sync = sync_config;
            }
        }

        // Apply environment variable overrides
        if let Ok(dir) = std::env::var("SAVES_SAVE_DIR") {
            save_dir = ConfigValue::new(PathBuf::from(dir), ConfigSource::Environment);
        }
        if let Ok(lang) = std::env::var("SAVES_LANGUAGE") {
            language = ConfigValue::new(lang, ConfigSource::Environment);
        }
        // Sync env var overrides
        if let Ok(url) = std::env::var("SAVES_SYNC_URL") {
            sync.server_url = Some(url);
        }
        if let Ok(key) = std::env::var("SAVES_SYNC_API_KEY") {
            sync.api_key = Some(key);
        }
        if let Ok(player) = std::env::var("SAVES_PLAYER_ID") {
            sync.player_id = Some(player);
        }

        Ok(Self {
            save_dir,
            language,
            variables_file,
            poll_interval_ms,
            menus,
            config_path: path,
            config_file,
            sync,
        })
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.value.max(1))
    }

    /// Default config directory (platform-specific):
    /// - Linux: ~/.config/savesync/
    /// - macOS: ~/Library/Application Support/savesync/
    /// - Windows: %APPDATA%/savesync/
    pub fn default_config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("savesync")
    }

    /// Default save directory (platform data dir + savesync/saves)
    pub fn default_save_dir() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("savesync")
            .join("saves")
    }

    /// Default config file path (platform-specific config dir + config.yaml)
    pub fn default_config_path() -> PathBuf {
        Self::default_config_dir().join("config.yaml")
    }
}

/// Resolves relative paths against the config file's directory
fn resolve_relative(config_path: &Path, value: PathBuf) -> PathBuf {
    if value.is_relative() {
        config_path
            .parent()
            .map(|p| p.join(&value))
            .unwrap_or(value)
    } else {
        value
    }
}

#[derive(Debug)]
pub enum ConfigError {
    ReadError(PathBuf, std::io::Error),
    ParseError(PathBuf, serde_yaml::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::ReadError(path, e) => {
                write!(f, "Failed to read config file '{}': {}", path.display(), e)
            }
            ConfigError::ParseError(path, e) => {
                write!(f, "Failed to parse config file '{}': {}", path.display(), e)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("nonexistent.yaml");

        let config = Config::load(Some(config_path.clone())).unwrap();
        assert!(config.save_dir.value.ends_with("saves"));
        assert_eq!(config.save_dir.source, ConfigSource::Default);
        assert_eq!(config.language.value, "en");
        assert_eq!(config.variables_file.value, None);
        assert!(config.menus.is_empty());
        assert_eq!(config.config_file, None);
        assert_eq!(config.config_path, config_path);
        assert_eq!(config.sync.interval(), Duration::from_secs(40));
        assert_eq!(config.sync.sign_in_poll(), Duration::from_secs(10));
    }

    #[test]
    fn test_load_from_file() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("config.yaml");

        let mut file = std::fs::File::create(&config_path).unwrap();
        writeln!(file, "save_dir: /custom/saves").unwrap();
        writeln!(file, "language: fr").unwrap();
        writeln!(file, "variables_file: vars.yaml").unwrap();
        writeln!(file, "menus:").unwrap();
        writeln!(file, "  - menu: Load").unwrap();
        writeln!(file, "    element: SavesList").unwrap();
        writeln!(file, "    offset: 6").unwrap();
        writeln!(file, "sync:").unwrap();
        writeln!(file, "  server_url: http://localhost:8080").unwrap();
        writeln!(file, "  player_id: alice").unwrap();
        writeln!(file, "  interval_secs: 5").unwrap();

        let config = Config::load(Some(config_path.clone())).unwrap();
        assert_eq!(config.save_dir.value, PathBuf::from("/custom/saves"));
        assert_eq!(config.save_dir.source, ConfigSource::File);
        assert_eq!(config.language.value, "fr");
        assert_eq!(
            config.variables_file.value,
            Some(temp_dir.path().join("vars.yaml"))
        );
        assert_eq!(
            config.menus,
            vec![MenuConfig {
                menu: "Load".to_string(),
                element: "SavesList".to_string(),
                offset: 6
            }]
        );
        assert_eq!(config.sync.expected_identity(), Some(PlayerId::from("alice")));
        assert_eq!(config.sync.interval(), Duration::from_secs(5));
        assert!(!config.sync.is_configured());
        assert_eq!(config.config_file, Some(config_path));
    }

    #[test]
    #[ignore] // Run with --ignored; env vars can pollute parallel tests
    fn test_env_var_overrides_file() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("config.yaml");

        let mut file = std::fs::File::create(&config_path).unwrap();
        writeln!(file, "language: fr").unwrap();

        // Set env var
        std::env::set_var("SAVES_LANGUAGE", "de");

        let config = Config::load(Some(config_path)).unwrap();
        assert_eq!(config.language.value, "de");
        assert_eq!(config.language.source, ConfigSource::Environment);

        // Clean up
        std::env::remove_var("SAVES_LANGUAGE");
    }

    #[test]
    fn test_invalid_yaml_error() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("config.yaml");

        let mut file = std::fs::File::create(&config_path).unwrap();
        writeln!(file, "invalid: yaml: content: [").unwrap();

        let result = Config::load(Some(config_path));
        assert!(result.is_err());
        let err = result.unwrap_err();
        assert!(err.to_string().contains("Failed to parse config file"));
    }

    #[test]
    fn test_zero_intervals_fall_back_to_defaults() {
        let sync = SyncConfig {
            interval_secs: Some(0),
            sign_in_poll_secs: Some(0),
            player_id: Some(String::new()),
            ..Default::default()
        };
        assert_eq!(sync.interval(), Duration::from_secs(40));
        assert_eq!(sync.sign_in_poll(), Duration::from_secs(10));
        assert_eq!(sync.expected_identity(), None);
    }
}
