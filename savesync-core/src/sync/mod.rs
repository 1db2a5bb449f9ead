//! Reconciliation between the local save directory and a remote store.
//!
//! ## Flow
//!
//! 1. Wait until the player is signed in
//! 2. Establish a [`SyncSession`] for the signed-in identity
//! 3. Every interval, upload the newest local save and download every
//!    remote save, validating the session first
//! 4. Tear the session down on sign-out or identity change and go back to 1
//!
//! Files are matched by name on both sides. The most recent write wins.

mod client;
mod daemon;
mod error;
mod remote;
mod session;

pub use client::{CloudSaveClient, FileListResponse, MeResponse};
pub use daemon::{DaemonConfig, DaemonHandle, DownloadReport, SyncDaemon, SyncReport, UploadReport};
pub use error::SyncError;
pub use remote::{RemoteFile, RemoteStore};
pub use session::{IdentityProvider, PlayerId, SyncSession};
