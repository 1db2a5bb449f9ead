//! The record store contract: the subsystem that actually saves, loads,
//! deletes and renames records.
//!
//! Calls only dispatch work. The outcome of each call is published later on
//! the [`CompletionBus`](crate::completion::CompletionBus) the store was
//! built with. An `Err` return means the request could not be dispatched at
//! all, and no event will follow.

mod file_store;

pub use file_store::FileRecordStore;

use crate::completion::RequestId;
use crate::error::SaveError;
use crate::record::SelectiveLoad;
use crate::slot::SlotTarget;

pub trait RecordStore: Send + Sync {
    /// Publishes `FinishDeleting` or `FailDeleting`.
    fn delete(&self, request: RequestId, target: SlotTarget) -> Result<(), SaveError>;

    /// Publishes `FinishRenaming` or `FailRenaming`.
    fn rename(&self, request: RequestId, label: &str, target: SlotTarget) -> Result<(), SaveError>;

    /// Overwrites (or creates) the targeted record from the live state.
    ///
    /// Publishes `FinishSaving` or `FailSaving`.
    fn save(
        &self,
        request: RequestId,
        target: SlotTarget,
        update_label: bool,
        label: Option<&str>,
    ) -> Result<(), SaveError>;

    /// Saves the live state under a newly allocated ID.
    fn save_new(&self, request: RequestId, label: Option<&str>) -> Result<(), SaveError>;

    /// Publishes `FinishLoading` or `FailLoading`.
    fn load(
        &self,
        request: RequestId,
        target: SlotTarget,
        selective: Option<&SelectiveLoad>,
    ) -> Result<(), SaveError>;

    /// Loads the most recently written record.
    fn continue_last_save(
        &self,
        request: RequestId,
        selective: Option<&SelectiveLoad>,
    ) -> Result<(), SaveError>;

    fn save_autosave(&self, request: RequestId) -> Result<(), SaveError>;

    fn load_autosave(
        &self,
        request: RequestId,
        selective: Option<&SelectiveLoad>,
    ) -> Result<(), SaveError>;
}
