//! Sign-in state read from the config file.
//!
//! `saves auth login` and `saves auth logout` edit the config file, so a
//! running daemon picks up sign-in changes by re-reading it on every check.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use savesync_core::sync::{CloudSaveClient, IdentityProvider, PlayerId};

use crate::config::Config;

pub struct ConfigSignIn {
    config_path: PathBuf,
    client: Arc<CloudSaveClient>,
}

impl ConfigSignIn {
    pub fn new(config_path: PathBuf, client: Arc<CloudSaveClient>) -> Self {
        Self {
            config_path,
            client,
        }
    }

    fn current_api_key(&self) -> Option<String> {
        match Config::load(Some(self.config_path.clone())) {
            Ok(config) => config.sync.api_key,
            Err(e) => {
                warn!("Cannot read sign-in state: {}", e);
                None
            }
        }
    }
}

#[async_trait]
impl IdentityProvider for ConfigSignIn {
    async fn is_signed_in(&self) -> bool {
        self.client.set_api_key(self.current_api_key());
        self.client.has_api_key()
    }

    async fn current_identity(&self) -> Option<PlayerId> {
        self.client.current_identity().await
    }
}
