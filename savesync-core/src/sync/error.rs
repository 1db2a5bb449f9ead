//! Sync error types.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::local::LocalStoreError;

/// Errors that can occur while talking to the remote store or reconciling
/// with it.
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Not signed in. Run 'saves auth login <key>' first.")]
    NotSignedIn,

    #[error("Identity mismatch: {0}")]
    IdentityMismatch(String),

    #[error("Connection error: {0}")]
    RemoteTransport(String),

    #[error("Server returned status {status}: {message}")]
    RemoteStatus { status: u16, message: String },

    #[error("Not found on server: {0}")]
    NotFound(String),

    #[error("Invalid save file name: {0}")]
    InvalidFileName(String),

    #[error("I/O error for {}: {}", .0.display(), .1)]
    LocalIo(PathBuf, #[source] io::Error),
}

impl From<LocalStoreError> for SyncError {
    fn from(e: LocalStoreError) -> Self {
        match e {
            LocalStoreError::Io(path, source) => SyncError::LocalIo(path, source),
            LocalStoreError::InvalidFileName(name) => SyncError::InvalidFileName(name),
        }
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(e: reqwest::Error) -> Self {
        SyncError::RemoteTransport(e.to_string())
    }
}
