//! Authentication commands for the saves CLI.
//!
//! Signing in stores an API key (and the player it belongs to) in the config
//! file. A running daemon picks the change up on its next sign-in check.

use clap::{Args, Subcommand};
use std::path::Path;

use savesync_core::sync::{CloudSaveClient, PlayerId, SyncError};

use crate::config::Config;

/// Authentication commands
#[derive(Args)]
pub struct AuthCommand {
    #[command(subcommand)]
    command: AuthSubcommand,
}

#[derive(Subcommand)]
enum AuthSubcommand {
    /// Log in with an API key issued by the server
    Login {
        /// API key
        key: String,
    },
    /// Log out (remove API key from config)
    Logout,
    /// Show authentication status
    Status,
}

impl AuthCommand {
    pub fn run(&self, config: &Config) -> Result<(), AuthError> {
        // Use tokio runtime for async operations
        let rt = tokio::runtime::Runtime::new()
            .map_err(|e| AuthError::ConfigError(format!("Failed to create runtime: {}", e)))?;

        match &self.command {
            AuthSubcommand::Login { key } => rt.block_on(login(config, key)),
            AuthSubcommand::Logout => logout(config),
            AuthSubcommand::Status => status(config),
        }
    }
}

/// Errors that can occur during authentication
#[derive(Debug)]
pub enum AuthError {
    /// The server rejected the key or could not be reached
    SyncError(SyncError),
    /// Config file error
    ConfigError(String),
    /// Server not configured
    NotConfigured,
}

impl std::fmt::Display for AuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthError::SyncError(e) => write!(f, "{}", e),
            AuthError::ConfigError(e) => write!(f, "Config error: {}", e),
            AuthError::NotConfigured => {
                write!(
                    f,
                    "Sync server not configured. Set sync.server_url in config."
                )
            }
        }
    }
}

impl std::error::Error for AuthError {}

impl From<SyncError> for AuthError {
    fn from(e: SyncError) -> Self {
        AuthError::SyncError(e)
    }
}

/// Verifies the key with the server, then stores it
async fn login(config: &Config, api_key: &str) -> Result<(), AuthError> {
    let server_url = config
        .sync
        .server_url
        .as_ref()
        .ok_or(AuthError::NotConfigured)?;

    let client = CloudSaveClient::new(server_url.clone(), Some(api_key.to_string()));
    let player = client.fetch_identity().await?;

    save_credentials(api_key, &player, &config.config_path)?;
    println!("Authenticated as {}", player);
    Ok(())
}

fn read_yaml(config_path: &Path) -> Result<serde_yaml::Value, AuthError> {
    if !config_path.exists() {
        return Ok(serde_yaml::Value::Mapping(serde_yaml::Mapping::new()));
    }
    let contents = std::fs::read_to_string(config_path)
        .map_err(|e| AuthError::ConfigError(e.to_string()))?;
    serde_yaml::from_str(&contents).map_err(|e| AuthError::ConfigError(e.to_string()))
}

fn write_yaml(config_path: &Path, config: &serde_yaml::Value) -> Result<(), AuthError> {
    // Create config directory if needed
    if let Some(parent) = config_path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| AuthError::ConfigError(e.to_string()))?;
    }

    let yaml = serde_yaml::to_string(config).map_err(|e| AuthError::ConfigError(e.to_string()))?;
    std::fs::write(config_path, yaml).map_err(|e| AuthError::ConfigError(e.to_string()))
}

/// Save API key and player to config file
fn save_credentials(
    api_key: &str,
    player: &PlayerId,
    config_path: &Path,
) -> Result<(), AuthError> {
    let mut config = read_yaml(config_path)?;

    // Ensure sync section exists
    let mapping = config
        .as_mapping_mut()
        .ok_or_else(|| AuthError::ConfigError("Invalid config format".to_string()))?;

    let sync_key = serde_yaml::Value::String("sync".to_string());
    if !mapping.get(&sync_key).is_some_and(|v| v.is_mapping()) {
        mapping.insert(
            sync_key.clone(),
            serde_yaml::Value::Mapping(serde_yaml::Mapping::new()),
        );
    }

    if let Some(sync_mapping) = mapping.get_mut(&sync_key).and_then(|s| s.as_mapping_mut()) {
        sync_mapping.insert(
            serde_yaml::Value::String("api_key".to_string()),
            serde_yaml::Value::String(api_key.to_string()),
        );
        sync_mapping.insert(
            serde_yaml::Value::String("player_id".to_string()),
            serde_yaml::Value::String(player.to_string()),
        );
    }

    write_yaml(config_path, &config)
}

/// Remove API key from config
fn logout(config: &Config) -> Result<(), AuthError> {
    let config_path = &config.config_path;

    if !config_path.exists() {
        println!("Already logged out (no config file).");
        return Ok(());
    }

    remove_api_key(config_path)?;
    println!("Logged out. Sync paused until you log in again.");
    Ok(())
}

fn remove_api_key(config_path: &Path) -> Result<(), AuthError> {
    let mut yaml = read_yaml(config_path)?;

    // Remove api_key from sync section
    if let Some(mapping) = yaml.as_mapping_mut() {
        let sync_key = serde_yaml::Value::String("sync".to_string());
        if let Some(sync_mapping) = mapping.get_mut(&sync_key).and_then(|s| s.as_mapping_mut()) {
            sync_mapping.remove(serde_yaml::Value::String("api_key".to_string()));
        }
    }

    write_yaml(config_path, &yaml)
}

/// Mask the key for display
fn mask_key(key: &str) -> String {
    if key.len() > 8 && key.is_char_boundary(4) && key.is_char_boundary(key.len() - 4) {
        format!("{}...{}", &key[..4], &key[key.len() - 4..])
    } else {
        "****".to_string()
    }
}

/// Show authentication status
fn status(config: &Config) -> Result<(), AuthError> {
    match (&config.sync.server_url, &config.sync.api_key) {
        (Some(_), Some(key)) => {
            println!("Logged in (API key: {})", mask_key(key));
            if let Some(player) = config.sync.expected_identity() {
                println!("Player: {}", player);
            }
        }
        (Some(_), None) => println!("Not logged in. Run 'saves auth login <key>' to authenticate."),
        (None, _) => println!("Not configured. Set sync.server_url in config first."),
    }
    Ok(())
}
