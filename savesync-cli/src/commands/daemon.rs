//! Background sync until interrupted.

use clap::Args;
use std::sync::Arc;
use tracing::info;

use savesync_core::sync::SyncDaemon;
use savesync_core::LocalSaveDir;

use super::sync_cmd::{client_from_config, daemon_config, SyncCommandError};
use crate::config::Config;
use crate::signin::ConfigSignIn;

/// Run the sync daemon until Ctrl-C
#[derive(Debug, Args)]
pub struct DaemonCommand {
    /// Seconds between sync cycles (overrides sync.interval_secs)
    #[arg(long)]
    interval: Option<u64>,
}

impl DaemonCommand {
    pub fn run(&self, config: &Config) -> Result<(), SyncCommandError> {
        let rt = tokio::runtime::Runtime::new()
            .map_err(|e| SyncCommandError::RuntimeError(e.to_string()))?;
        rt.block_on(self.serve(config))
    }

    async fn serve(&self, config: &Config) -> Result<(), SyncCommandError> {
        let client = Arc::new(client_from_config(config)?);
        let signin = Arc::new(ConfigSignIn::new(config.config_path.clone(), client.clone()));

        let mut daemon_config = daemon_config(config);
        if let Some(secs) = self.interval.filter(|secs| *secs > 0) {
            daemon_config.interval = std::time::Duration::from_secs(secs);
        }

        info!(
            "Syncing {} with {} every {}s",
            config.save_dir.value.display(),
            client.server_url(),
            daemon_config.interval.as_secs()
        );

        let daemon = SyncDaemon::new(
            LocalSaveDir::new(&config.save_dir.value),
            client,
            signin,
            daemon_config,
        );

        let handle = daemon.handle();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Interrupted, stopping once the current cycle ends");
                handle.shutdown();
            }
        });

        daemon.run().await;
        Ok(())
    }
}
