use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::error::SyncError;
use super::session::PlayerId;

/// A save file held by the remote store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteFile {
    pub name: String,
    pub size: u64,
    pub modified_at: DateTime<Utc>,
}

/// Per-player file storage on the remote side.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Lists every file stored for `identity`.
    async fn list_files(&self, identity: &PlayerId) -> Result<Vec<RemoteFile>, SyncError>;

    /// Creates or replaces a file for the signed-in player.
    async fn upload_bytes(&self, name: &str, bytes: Vec<u8>) -> Result<(), SyncError>;

    async fn download_bytes(&self, name: &str) -> Result<Vec<u8>, SyncError>;
}
