//! HTTP client for the cloud-save server.
//!
//! All requests carry the API key as a bearer token. The server maps the key
//! to a player, so uploads and downloads always act on the signed-in
//! player's files.

use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use reqwest::{Response, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::error::SyncError;
use super::remote::{RemoteFile, RemoteStore};
use super::session::{IdentityProvider, PlayerId};

/// Body of `GET /me`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeResponse {
    pub player_id: PlayerId,
}

/// Body of `GET /players/{player_id}/files`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FileListResponse {
    pub files: Vec<RemoteFile>,
}

/// Client for one cloud-save server.
///
/// The API key can be swapped at runtime, which is how sign-in and sign-out
/// reach a running daemon.
#[derive(Debug)]
pub struct CloudSaveClient {
    server_url: String,
    api_key: RwLock<Option<String>>,
    http: reqwest::Client,
}

impl CloudSaveClient {
    pub fn new(server_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            server_url: server_url.into(),
            api_key: RwLock::new(api_key),
            http: reqwest::Client::new(),
        }
    }

    /// Returns the server URL.
    pub fn server_url(&self) -> &str {
        &self.server_url
    }

    pub fn set_api_key(&self, api_key: Option<String>) {
        *self.api_key.write().unwrap_or_else(PoisonError::into_inner) = api_key;
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key().is_some()
    }

    fn api_key(&self) -> Option<String> {
        self.api_key
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .filter(|key| !key.is_empty())
    }

    fn bearer(&self) -> Result<String, SyncError> {
        self.api_key()
            .map(|key| format!("Bearer {}", key))
            .ok_or(SyncError::NotSignedIn)
    }

    /// Asks the server who the API key belongs to.
    pub async fn fetch_identity(&self) -> Result<PlayerId, SyncError> {
        let response = self
            .http
            .get(self.build_http_url("/me"))
            .header("Authorization", self.bearer()?)
            .send()
            .await?;

        let me: MeResponse = check_status(response, "/me").await?.json().await?;
        Ok(me.player_id)
    }

    /// Returns true if the server answers its health check.
    pub async fn check_health(&self) -> bool {
        match self.http.get(self.build_http_url("/health")).send().await {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                debug!("Health check failed: {}", e);
                false
            }
        }
    }

    fn file_url(&self, name: &str) -> String {
        self.build_http_url(&format!("/files/{}", urlencoding::encode(name)))
    }

    /// Builds an HTTP URL for a given path.
    fn build_http_url(&self, path: &str) -> String {
        let base_url = if self.server_url.starts_with("http://")
            || self.server_url.starts_with("https://")
        {
            self.server_url.clone()
        } else {
            format!("http://{}", self.server_url)
        };

        format!("{}{}", base_url.trim_end_matches('/'), path)
    }
}

/// Maps non-success statuses to errors.
async fn check_status(response: Response, what: &str) -> Result<Response, SyncError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let message = response.text().await.unwrap_or_default();
    match status {
        StatusCode::UNAUTHORIZED => Err(SyncError::NotSignedIn),
        StatusCode::FORBIDDEN => Err(SyncError::IdentityMismatch(if message.is_empty() {
            format!("server refused access to {}", what)
        } else {
            message
        })),
        StatusCode::NOT_FOUND => Err(SyncError::NotFound(what.to_string())),
        _ => Err(SyncError::RemoteStatus {
            status: status.as_u16(),
            message,
        }),
    }
}

#[async_trait]
impl RemoteStore for CloudSaveClient {
    async fn list_files(&self, identity: &PlayerId) -> Result<Vec<RemoteFile>, SyncError> {
        let path = format!("/players/{}/files", urlencoding::encode(identity.as_str()));
        let response = self
            .http
            .get(self.build_http_url(&path))
            .header("Authorization", self.bearer()?)
            .send()
            .await?;

        let list: FileListResponse = check_status(response, &path).await?.json().await?;
        Ok(list.files)
    }

    async fn upload_bytes(&self, name: &str, bytes: Vec<u8>) -> Result<(), SyncError> {
        let response = self
            .http
            .put(self.file_url(name))
            .header("Authorization", self.bearer()?)
            .body(bytes)
            .send()
            .await?;

        check_status(response, name).await?;
        Ok(())
    }

    async fn download_bytes(&self, name: &str) -> Result<Vec<u8>, SyncError> {
        let response = self
            .http
            .get(self.file_url(name))
            .header("Authorization", self.bearer()?)
            .send()
            .await?;

        let bytes = check_status(response, name).await?.bytes().await?;
        Ok(bytes.to_vec())
    }
}

#[async_trait]
impl IdentityProvider for CloudSaveClient {
    async fn is_signed_in(&self) -> bool {
        self.has_api_key()
    }

    /// `None` when the key is missing, rejected, or the server is unreachable.
    async fn current_identity(&self) -> Option<PlayerId> {
        match self.fetch_identity().await {
            Ok(player) => Some(player),
            Err(e) => {
                warn!("Could not confirm identity: {}", e);
                None
            }
        }
    }
}
