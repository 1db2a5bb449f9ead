//! Background reconciliation loops.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Notify};
use tokio::time::{interval_at, sleep, Instant, Interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use super::error::SyncError;
use super::remote::RemoteStore;
use super::session::{IdentityProvider, PlayerId, SyncSession};
use crate::local::{LocalFile, LocalSaveDir};

/// Default time between reconciliation cycles.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(40);
/// Default time between sign-in checks.
pub const DEFAULT_SIGN_IN_POLL: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct DaemonConfig {
    pub interval: Duration,
    pub sign_in_poll: Duration,
    /// Sessions are only established for this player when set.
    pub expected_identity: Option<PlayerId>,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_INTERVAL,
            sign_in_poll: DEFAULT_SIGN_IN_POLL,
            expected_identity: None,
        }
    }
}

/// Result of one upload iteration.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UploadReport {
    /// Name of the file uploaded, if any.
    pub uploaded: Option<String>,
}

/// Result of one download iteration.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DownloadReport {
    pub downloaded: Vec<String>,
    pub failed: Vec<String>,
}

/// Result of [`SyncDaemon::run_once`].
#[derive(Debug, Clone, PartialEq)]
pub struct SyncReport {
    pub player: PlayerId,
    pub upload: UploadReport,
    pub download: DownloadReport,
}

/// Controls a running daemon from elsewhere.
#[derive(Debug, Clone)]
pub struct DaemonHandle {
    shutdown: Arc<watch::Sender<bool>>,
    signed_in: Arc<Notify>,
}

impl DaemonHandle {
    /// Stops the daemon at the next interval boundary.
    pub fn shutdown(&self) {
        self.shutdown.send_replace(true);
    }

    /// Wakes a daemon waiting for sign-in without waiting for the next poll.
    pub fn notify_signed_in(&self) {
        self.signed_in.notify_one();
    }
}

/// Why a session's loops stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionEnd {
    Active,
    /// Signed out or switched player locally.
    Invalidated,
    /// The server refused the player; wait for a new sign-in.
    Refused,
}

/// The receivers a session's loops watch.
struct SessionScope<'a> {
    session: &'a SyncSession,
    end: &'a watch::Sender<SessionEnd>,
    end_rx: watch::Receiver<SessionEnd>,
    shutdown: watch::Receiver<bool>,
}

impl SessionScope<'_> {
    fn stopped(&self) -> bool {
        *self.end_rx.borrow() != SessionEnd::Active || *self.shutdown.borrow()
    }
}

/// Keeps a local save directory and a remote store in step.
pub struct SyncDaemon {
    saves: LocalSaveDir,
    remote: Arc<dyn RemoteStore>,
    identity: Arc<dyn IdentityProvider>,
    config: DaemonConfig,
    shutdown: Arc<watch::Sender<bool>>,
    signed_in: Arc<Notify>,
}

impl SyncDaemon {
    pub fn new(
        saves: LocalSaveDir,
        remote: Arc<dyn RemoteStore>,
        identity: Arc<dyn IdentityProvider>,
        config: DaemonConfig,
    ) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            saves,
            remote,
            identity,
            config,
            shutdown: Arc::new(shutdown),
            signed_in: Arc::new(Notify::new()),
        }
    }

    pub fn handle(&self) -> DaemonHandle {
        DaemonHandle {
            shutdown: Arc::clone(&self.shutdown),
            signed_in: Arc::clone(&self.signed_in),
        }
    }

    /// Uploads the most recently modified local save.
    ///
    /// Failures are logged and reported as nothing uploaded.
    pub async fn upload_cycle(&self) -> UploadReport {
        let files = match self.saves.list() {
            Ok(files) => files,
            Err(e) => {
                error!("Failed to scan local saves: {}", e);
                return UploadReport::default();
            }
        };

        let Some(latest) = newest(&files) else {
            debug!("No local saves to upload");
            return UploadReport::default();
        };
        info!("Local save found: {}", latest.name);

        let bytes = match self.saves.read(&latest.name) {
            Ok(Some(bytes)) => bytes,
            Ok(None) => {
                error!("Local save file not found: {}", latest.path.display());
                return UploadReport::default();
            }
            Err(e) => {
                error!("Failed to read {}: {}", latest.name, e);
                return UploadReport::default();
            }
        };

        match self.remote.upload_bytes(&latest.name, bytes).await {
            Ok(()) => {
                info!("Uploaded {} to the cloud", latest.name);
                UploadReport {
                    uploaded: Some(latest.name.clone()),
                }
            }
            Err(e) => {
                error!("Failed to upload {}: {}", latest.name, e);
                UploadReport::default()
            }
        }
    }

    /// Downloads every remote save for the session's player.
    ///
    /// One failing file does not stop the others. Errors only when the
    /// server refuses the session's identity; the session is over then.
    pub async fn download_cycle(
        &self,
        session: &SyncSession,
    ) -> Result<DownloadReport, SyncError> {
        let mut report = DownloadReport::default();

        let files = match self.remote.list_files(session.identity()).await {
            Ok(files) => files,
            Err(e @ SyncError::IdentityMismatch(_)) => return Err(e),
            Err(e) => {
                error!("Failed to list cloud saves: {}", e);
                return Ok(report);
            }
        };

        for file in files {
            debug!("Found cloud save file: {}", file.name);
            match self.download_file(&file.name).await {
                Ok(()) => {
                    info!("Downloaded {}", file.name);
                    report.downloaded.push(file.name);
                }
                Err(e) => {
                    error!("Failed to download {}: {}", file.name, e);
                    report.failed.push(file.name);
                }
            }
        }

        Ok(report)
    }

    async fn download_file(&self, name: &str) -> Result<(), SyncError> {
        LocalSaveDir::validate_name(name)?;
        let bytes = self.remote.download_bytes(name).await?;
        self.saves.write_atomic(name, &bytes)?;
        Ok(())
    }

    /// Runs one upload and one download under a freshly established session.
    pub async fn run_once(&self) -> Result<SyncReport, SyncError> {
        let session = self.establish().await?;
        let upload = self.upload_cycle().await;
        let download = self.download_cycle(&session).await?;

        Ok(SyncReport {
            player: session.identity().clone(),
            upload,
            download,
        })
    }

    /// Runs until shut down through a [`DaemonHandle`].
    ///
    /// Waits for sign-in, then runs the upload and download loops for as
    /// long as the session stays valid. When it ends, waits for the next
    /// sign-in. A player the server refused gets no new session until
    /// [`DaemonHandle::notify_signed_in`] reports a fresh sign-in.
    pub async fn run(&self) {
        let mut shutdown = self.shutdown.subscribe();
        let mut refused = None;

        while let Some(session) = self.wait_for_session(&mut shutdown, &mut refused).await {
            info!("Sync session established for player {}", session.identity());

            let (end, end_rx) = watch::channel(SessionEnd::Active);
            let upload = self.upload_loop(SessionScope {
                session: &session,
                end: &end,
                end_rx: end_rx.clone(),
                shutdown: shutdown.clone(),
            });
            let download = self.download_loop(SessionScope {
                session: &session,
                end: &end,
                end_rx,
                shutdown: shutdown.clone(),
            });
            tokio::join!(upload, download);

            if *shutdown.borrow() {
                break;
            }
            if *end.borrow() == SessionEnd::Refused {
                refused = Some(session.identity().clone());
            }
            info!("Sync session for player {} ended", session.identity());
        }

        info!("Sync daemon stopped");
    }

    async fn establish(&self) -> Result<SyncSession, SyncError> {
        SyncSession::establish(
            self.identity.as_ref(),
            self.config.expected_identity.as_ref(),
        )
        .await
    }

    /// Returns `None` on shutdown.
    ///
    /// Skips the `refused` player until a sign-in notification clears it.
    async fn wait_for_session(
        &self,
        shutdown: &mut watch::Receiver<bool>,
        refused: &mut Option<PlayerId>,
    ) -> Option<SyncSession> {
        info!("Waiting for player to sign in");

        loop {
            if *shutdown.borrow() {
                return None;
            }

            match self.establish().await {
                Ok(session) if refused.as_ref() == Some(session.identity()) => {
                    debug!("Server refused {}, waiting for a new sign-in", session.identity())
                }
                Ok(session) => return Some(session),
                Err(SyncError::NotSignedIn) => debug!("Not signed in yet"),
                Err(e) => warn!("Skipping sync: {}", e),
            }

            tokio::select! {
                _ = sleep(self.config.sign_in_poll) => {}
                _ = self.signed_in.notified() => {
                    debug!("Sign-in notification received");
                    *refused = None;
                }
                _ = shutdown.changed() => return None,
            }
        }
    }

    async fn upload_loop(&self, mut scope: SessionScope<'_>) {
        let mut ticker = boundary_ticker(self.config.interval);
        while self.next_boundary(&mut ticker, &mut scope).await {
            self.upload_cycle().await;
        }
    }

    async fn download_loop(&self, mut scope: SessionScope<'_>) {
        let mut ticker = boundary_ticker(self.config.interval);
        while self.next_boundary(&mut ticker, &mut scope).await {
            if let Err(e) = self.download_cycle(scope.session).await {
                warn!("Ending sync session: {}", e);
                scope.end.send_replace(SessionEnd::Refused);
                break;
            }
        }
    }

    /// Waits for the next tick and revalidates the session.
    ///
    /// Returns false when the loop should stop.
    async fn next_boundary(&self, ticker: &mut Interval, scope: &mut SessionScope<'_>) -> bool {
        if scope.stopped() {
            return false;
        }

        tokio::select! {
            _ = ticker.tick() => {}
            _ = scope.end_rx.changed() => return false,
            _ = scope.shutdown.changed() => return false,
        }
        if scope.stopped() {
            return false;
        }

        match scope.session.validate(self.identity.as_ref()).await {
            Ok(()) => true,
            Err(e) => {
                warn!("Ending sync session: {}", e);
                scope.end.send_replace(SessionEnd::Invalidated);
                false
            }
        }
    }
}

/// First tick one full period from now.
fn boundary_ticker(period: Duration) -> Interval {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker
}

/// The most recently modified file. Ties go to the first one listed.
fn newest(files: &[LocalFile]) -> Option<&LocalFile> {
    files.iter().fold(None, |best: Option<&LocalFile>, file| match best {
        Some(b) if b.modified_at >= file.modified_at => Some(b),
        _ => Some(file),
    })
}
