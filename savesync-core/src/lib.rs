//! SaveSync Core Library
//!
//! Save-game operations driven by completion signals, and background
//! reconciliation of the save directory with a cloud-save server.

pub mod completion;
pub mod context;
pub mod error;
pub mod local;
pub mod operation;
pub mod record;
pub mod slot;
pub mod store;
pub mod sync;

pub use completion::{CompletionBus, CompletionEvent, SubscriptionId, Topic};
pub use context::{
    ElementHandle, ElementKind, LockFlag, MemoryVariables, MenuLookup, OperationContext,
    SavingLock, StaticMenus, VariableId, VariableStore,
};
pub use error::SaveError;
pub use local::{LocalFile, LocalSaveDir, LocalStoreError};
pub use operation::{
    Completion, LabelSource, Operation, OperationHandle, OperationKind, OperationState,
    OperationStatus, Orchestrator,
};
pub use record::{GameState, Record, SaveId, SaveRecord, SelectiveLoad, StateSection};
pub use slot::{AddressingRequest, SlotResolver, SlotTarget};
pub use store::{FileRecordStore, RecordStore};
pub use sync::{
    CloudSaveClient, DaemonConfig, DaemonHandle, DownloadReport, IdentityProvider, PlayerId,
    RemoteFile, RemoteStore, SyncDaemon, SyncError, SyncReport, SyncSession, UploadReport,
};

pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!version().is_empty());
    }
}
