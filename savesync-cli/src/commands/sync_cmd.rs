//! Sync CLI commands for reconciling with the server.

use clap::{Args, Subcommand};
use std::sync::Arc;

use savesync_core::sync::{CloudSaveClient, DaemonConfig, SyncDaemon, SyncError};
use savesync_core::LocalSaveDir;

use crate::config::Config;

/// Sync saves with the remote server
#[derive(Debug, Args)]
pub struct SyncCommand {
    #[command(subcommand)]
    command: Option<SyncSubcommand>,
}

#[derive(Debug, Subcommand)]
enum SyncSubcommand {
    /// Show sync configuration and server status
    Status,
}

impl SyncCommand {
    pub fn run(&self, config: &Config) -> Result<(), SyncCommandError> {
        // Use tokio runtime for async operations
        let rt = tokio::runtime::Runtime::new()
            .map_err(|e| SyncCommandError::RuntimeError(e.to_string()))?;

        match &self.command {
            None => rt.block_on(self.sync(config)),
            Some(SyncSubcommand::Status) => rt.block_on(self.status(config)),
        }
    }

    async fn sync(&self, config: &Config) -> Result<(), SyncCommandError> {
        let daemon = build_daemon(config)?;

        println!("Syncing with server...");
        println!();

        let report = daemon.run_once().await?;

        println!("  Player: {}", report.player);
        match &report.upload.uploaded {
            Some(name) => println!("  ✓ uploaded {}", name),
            None => println!("  - nothing uploaded"),
        }
        for name in &report.download.downloaded {
            println!("  ✓ downloaded {}", name);
        }
        for name in &report.download.failed {
            println!("  ✗ failed to download {}", name);
        }

        println!();
        if report.download.failed.is_empty() {
            println!("Sync complete.");
        } else {
            println!(
                "Sync finished with {} failed download{}.",
                report.download.failed.len(),
                if report.download.failed.len() == 1 { "" } else { "s" }
            );
        }

        Ok(())
    }

    async fn status(&self, config: &Config) -> Result<(), SyncCommandError> {
        println!("Sync Configuration");
        println!("==================");
        println!();

        let Some(server_url) = config.sync.server_url.as_ref() else {
            println!("Status: Not configured");
            println!();
            println!("To enable sync, add to your config file:");
            println!();
            println!("  sync:");
            println!("    server_url: \"http://localhost:8080\"");
            println!();
            println!("Or set environment variable:");
            println!("  SAVES_SYNC_URL");
            return Ok(());
        };

        println!("Server:    {}", server_url);
        println!("Save dir:  {}", config.save_dir.value.display());
        println!("Interval:  {}s", config.sync.interval().as_secs());
        if let Some(player) = config.sync.expected_identity() {
            println!("Player:    {}", player);
        }
        println!();

        let client = CloudSaveClient::new(server_url.clone(), config.sync.api_key.clone());

        print!("Server status: ");
        if client.check_health().await {
            println!("✓ reachable");
        } else {
            println!("✗ unreachable");
            return Ok(());
        }

        print!("Signed in:     ");
        if !client.has_api_key() {
            println!("no (run 'saves auth login <key>')");
            return Ok(());
        }
        match client.fetch_identity().await {
            Ok(player) => println!("✓ as {}", player),
            Err(e) => println!("✗ {}", e),
        }

        Ok(())
    }
}

/// Builds a daemon over the configured save directory and server.
pub fn build_daemon(config: &Config) -> Result<SyncDaemon, SyncCommandError> {
    let client = Arc::new(client_from_config(config)?);
    Ok(SyncDaemon::new(
        LocalSaveDir::new(&config.save_dir.value),
        client.clone(),
        client,
        daemon_config(config),
    ))
}

pub fn client_from_config(config: &Config) -> Result<CloudSaveClient, SyncCommandError> {
    let server_url = config
        .sync
        .server_url
        .clone()
        .ok_or(SyncCommandError::NotConfigured)?;
    Ok(CloudSaveClient::new(server_url, config.sync.api_key.clone()))
}

pub fn daemon_config(config: &Config) -> DaemonConfig {
    DaemonConfig {
        interval: config.sync.interval(),
        sign_in_poll: config.sync.sign_in_poll(),
        expected_identity: config.sync.expected_identity(),
    }
}

/// Errors from sync commands
#[derive(Debug)]
pub enum SyncCommandError {
    NotConfigured,
    SyncError(SyncError),
    RuntimeError(String),
}

impl std::fmt::Display for SyncCommandError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncCommandError::NotConfigured => {
                write!(f, "Sync not configured. Set sync.server_url in config.")
            }
            SyncCommandError::SyncError(e) => write!(f, "{}", e),
            SyncCommandError::RuntimeError(e) => write!(f, "Runtime error: {}", e),
        }
    }
}

impl std::error::Error for SyncCommandError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SyncCommandError::SyncError(e) => Some(e),
            _ => None,
        }
    }
}

impl From<SyncError> for SyncCommandError {
    fn from(e: SyncError) -> Self {
        SyncCommandError::SyncError(e)
    }
}
