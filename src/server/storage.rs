//! Per-player save storage.
//!
//! ```text
//! <DATA_DIR>/
//!   <player_id>/
//!     save_1.save
//!     autosave.save
//! ```
//!
//! Each player directory is a [`LocalSaveDir`], so names are validated and
//! writes are atomic the same way as on the client.

use std::fs;
use std::path::PathBuf;

use savesync_core::sync::{PlayerId, RemoteFile};
use savesync_core::{LocalSaveDir, LocalStoreError};

/// Errors that can occur during server storage operations.
#[derive(Debug)]
pub enum StorageError {
    /// Player ID that cannot name a directory.
    InvalidPlayerId(String),
    /// File name that is not a plain save file name.
    InvalidFileName(String),
    /// I/O error reading or writing a file.
    IoError(LocalStoreError),
}

impl std::fmt::Display for StorageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageError::InvalidPlayerId(id) => write!(f, "Invalid player ID: {}", id),
            StorageError::InvalidFileName(name) => write!(f, "Invalid file name: {}", name),
            StorageError::IoError(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for StorageError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StorageError::IoError(e) => Some(e),
            _ => None,
        }
    }
}

impl From<LocalStoreError> for StorageError {
    fn from(e: LocalStoreError) -> Self {
        match e {
            LocalStoreError::InvalidFileName(name) => StorageError::InvalidFileName(name),
            other => StorageError::IoError(other),
        }
    }
}

/// Save files for every player, one directory each.
#[derive(Debug, Clone)]
pub struct PlayerStorage {
    data_dir: PathBuf,
}

impl PlayerStorage {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    /// Validates a player ID to prevent path traversal attacks.
    fn validate_player_id(player: &PlayerId) -> Result<(), StorageError> {
        let id = player.as_str();
        if id.is_empty()
            || id.contains('/')
            || id.contains('\\')
            || id.contains("..")
            || id.starts_with('.')
        {
            return Err(StorageError::InvalidPlayerId(id.to_string()));
        }
        Ok(())
    }

    fn player_dir(&self, player: &PlayerId) -> Result<LocalSaveDir, StorageError> {
        Self::validate_player_id(player)?;
        Ok(LocalSaveDir::new(self.data_dir.join(player.as_str())))
    }

    /// Lists a player's files, oldest first. A player with no uploads has none.
    pub fn list(&self, player: &PlayerId) -> Result<Vec<RemoteFile>, StorageError> {
        let dir = self.player_dir(player)?;

        let mut files = Vec::new();
        for file in dir.list()? {
            let size = fs::metadata(&file.path)
                .map_err(|e| LocalStoreError::Io(file.path.clone(), e))?
                .len();
            files.push(RemoteFile {
                name: file.name,
                size,
                modified_at: file.modified_at,
            });
        }
        files.sort_by(|a, b| {
            a.modified_at
                .cmp(&b.modified_at)
                .then_with(|| a.name.cmp(&b.name))
        });
        Ok(files)
    }

    /// Returns the file's bytes, or `Ok(None)` if it doesn't exist.
    pub fn read(&self, player: &PlayerId, name: &str) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(self.player_dir(player)?.read(name)?)
    }

    /// Creates or replaces a file atomically.
    pub fn write(
        &self,
        player: &PlayerId,
        name: &str,
        bytes: &[u8],
    ) -> Result<(), StorageError> {
        Ok(self.player_dir(player)?.write_atomic(name, bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup() -> (PlayerStorage, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let storage = PlayerStorage::new(temp_dir.path());
        (storage, temp_dir)
    }

    #[test]
    fn test_validate_player_id() {
        assert!(PlayerStorage::validate_player_id(&PlayerId::from("alice")).is_ok());
        assert!(PlayerStorage::validate_player_id(&PlayerId::from("player_42")).is_ok());

        assert!(PlayerStorage::validate_player_id(&PlayerId::from("")).is_err());
        assert!(PlayerStorage::validate_player_id(&PlayerId::from("../evil")).is_err());
        assert!(PlayerStorage::validate_player_id(&PlayerId::from("a/b")).is_err());
        assert!(PlayerStorage::validate_player_id(&PlayerId::from(".hidden")).is_err());
    }

    #[test]
    fn test_unknown_player_lists_nothing() {
        let (storage, _temp) = setup();
        assert!(storage.list(&PlayerId::from("alice")).unwrap().is_empty());
        assert!(storage
            .read(&PlayerId::from("alice"), "save_1.save")
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_write_read_and_list() {
        let (storage, temp) = setup();
        let alice = PlayerId::from("alice");

        storage.write(&alice, "save_1.save", b"first").unwrap();
        storage.write(&alice, "save_1.save", b"second!").unwrap();

        assert_eq!(
            storage.read(&alice, "save_1.save").unwrap().as_deref(),
            Some(&b"second!"[..])
        );
        let files = storage.list(&alice).unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].name, "save_1.save");
        assert_eq!(files[0].size, 7);
        assert!(temp.path().join("alice").join("save_1.save").exists());
    }

    #[test]
    fn test_players_are_isolated() {
        let (storage, _temp) = setup();
        let alice = PlayerId::from("alice");
        let bob = PlayerId::from("bob");

        storage.write(&alice, "save_1.save", b"alice").unwrap();

        assert!(storage.list(&bob).unwrap().is_empty());
        assert!(storage.read(&bob, "save_1.save").unwrap().is_none());
    }

    #[test]
    fn test_invalid_names_rejected() {
        let (storage, _temp) = setup();
        let alice = PlayerId::from("alice");

        assert!(matches!(
            storage.write(&alice, "../escape.save", b"x"),
            Err(StorageError::InvalidFileName(_))
        ));
        assert!(matches!(
            storage.read(&alice, "notes.txt"),
            Err(StorageError::InvalidFileName(_))
        ));
        assert!(matches!(
            storage.list(&PlayerId::from("../bob")),
            Err(StorageError::InvalidPlayerId(_))
        ));
    }
}
