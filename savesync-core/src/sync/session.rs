//! Signed-in identity and the session bound to it.

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::error::SyncError;

/// Identity of a player on the remote store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerId(String);

impl PlayerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PlayerId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Reports whether, and as whom, the player is signed in.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn is_signed_in(&self) -> bool;

    async fn current_identity(&self) -> Option<PlayerId>;
}

/// The identity reconciliation runs under.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncSession {
    identity: PlayerId,
    established_at: DateTime<Utc>,
}

impl SyncSession {
    /// Opens a session for the signed-in player.
    ///
    /// With `expected` set, a different signed-in identity is refused.
    pub async fn establish(
        provider: &dyn IdentityProvider,
        expected: Option<&PlayerId>,
    ) -> Result<Self, SyncError> {
        if !provider.is_signed_in().await {
            return Err(SyncError::NotSignedIn);
        }
        let identity = provider
            .current_identity()
            .await
            .ok_or(SyncError::NotSignedIn)?;

        if let Some(expected) = expected {
            if *expected != identity {
                return Err(SyncError::IdentityMismatch(format!(
                    "signed in as {}, expected {}",
                    identity, expected
                )));
            }
        }

        Ok(Self {
            identity,
            established_at: Utc::now(),
        })
    }

    /// Checks that the same player is still signed in.
    pub async fn validate(&self, provider: &dyn IdentityProvider) -> Result<(), SyncError> {
        if !provider.is_signed_in().await {
            return Err(SyncError::NotSignedIn);
        }
        match provider.current_identity().await {
            Some(current) if current == self.identity => Ok(()),
            Some(current) => Err(SyncError::IdentityMismatch(format!(
                "session belongs to {}, now signed in as {}",
                self.identity, current
            ))),
            None => Err(SyncError::NotSignedIn),
        }
    }

    pub fn identity(&self) -> &PlayerId {
        &self.identity
    }

    pub fn established_at(&self) -> DateTime<Utc> {
        self.established_at
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Identity provider whose signed-in player can be changed by tests.
    #[derive(Default)]
    pub(crate) struct FakeIdentity {
        player: Mutex<Option<PlayerId>>,
    }

    impl FakeIdentity {
        pub(crate) fn signed_in(player: &str) -> Self {
            let fake = Self::default();
            fake.set(Some(player));
            fake
        }

        pub(crate) fn set(&self, player: Option<&str>) {
            *self.player.lock().unwrap() = player.map(PlayerId::from);
        }
    }

    #[async_trait]
    impl IdentityProvider for FakeIdentity {
        async fn is_signed_in(&self) -> bool {
            self.player.lock().unwrap().is_some()
        }

        async fn current_identity(&self) -> Option<PlayerId> {
            self.player.lock().unwrap().clone()
        }
    }

    #[tokio::test]
    async fn test_establish_requires_sign_in() {
        let provider = FakeIdentity::default();
        let result = SyncSession::establish(&provider, None).await;
        assert!(matches!(result, Err(SyncError::NotSignedIn)));
    }

    #[tokio::test]
    async fn test_establish_checks_expected_identity() {
        let provider = FakeIdentity::signed_in("alice");

        let session = SyncSession::establish(&provider, Some(&PlayerId::from("alice")))
            .await
            .unwrap();
        assert_eq!(session.identity().as_str(), "alice");

        let result = SyncSession::establish(&provider, Some(&PlayerId::from("bob"))).await;
        assert!(matches!(result, Err(SyncError::IdentityMismatch(_))));
    }

    #[tokio::test]
    async fn test_validate_detects_sign_out_and_switch() {
        let provider = FakeIdentity::signed_in("alice");
        let session = SyncSession::establish(&provider, None).await.unwrap();
        assert!(session.validate(&provider).await.is_ok());

        provider.set(Some("bob"));
        assert!(matches!(
            session.validate(&provider).await,
            Err(SyncError::IdentityMismatch(_))
        ));

        provider.set(None);
        assert!(matches!(
            session.validate(&provider).await,
            Err(SyncError::NotSignedIn)
        ));
    }
}
