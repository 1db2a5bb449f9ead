//! Errors raised while resolving and performing save operations.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::context::VariableId;
use crate::local::LocalStoreError;
use crate::record::SaveId;

/// Errors that can occur while resolving or running a save operation.
#[derive(Error, Debug)]
pub enum SaveError {
    #[error("No variable found with ID {0}")]
    MissingVariable(VariableId),

    #[error("Cannot find SavesList element '{element}' in menu '{menu}'")]
    MissingUIElement { menu: String, element: String },

    #[error("The autosave cannot be renamed")]
    AutosaveImmutable,

    #[error("Saving is currently locked")]
    SavingLocked,

    #[error("No save record found for {0}")]
    RecordNotFound(String),

    #[error("Record store error: {0}")]
    Store(String),

    #[error("I/O error for {}: {}", .0.display(), .1)]
    LocalIo(PathBuf, #[source] io::Error),

    #[error("Invalid save payload in {}: {}", .0.display(), .1)]
    Payload(PathBuf, #[source] serde_json::Error),

    #[error("Operation failed: {}", .reason.as_deref().unwrap_or("no reason given"))]
    OperationFailed {
        save_id: Option<SaveId>,
        reason: Option<String>,
    },

    #[error("Unknown operation handle: {0}")]
    UnknownHandle(u64),
}

impl From<LocalStoreError> for SaveError {
    fn from(e: LocalStoreError) -> Self {
        match e {
            LocalStoreError::Io(path, source) => SaveError::LocalIo(path, source),
            LocalStoreError::InvalidFileName(name) => {
                SaveError::Store(format!("Invalid save file name: {}", name))
            }
        }
    }
}
