//! Save, load, delete and rename requests and the state machine that runs
//! them.

mod orchestrator;

pub use orchestrator::Orchestrator;

use crate::completion::Topic;
use crate::context::VariableId;
use crate::error::SaveError;
use crate::record::{SaveId, SelectiveLoad};
use crate::slot::AddressingRequest;

/// What an operation does to the record set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    Save,
    SaveNew,
    Load,
    Delete,
    Rename,
    ContinueLastSave,
}

impl OperationKind {
    /// The (success, failure) topics a store publishes for this kind.
    pub fn topics(&self) -> (Topic, Topic) {
        match self {
            OperationKind::Save | OperationKind::SaveNew => {
                (Topic::FinishSaving, Topic::FailSaving)
            }
            OperationKind::Load | OperationKind::ContinueLastSave => {
                (Topic::FinishLoading, Topic::FailLoading)
            }
            OperationKind::Delete => (Topic::FinishDeleting, Topic::FailDeleting),
            OperationKind::Rename => (Topic::FinishRenaming, Topic::FailRenaming),
        }
    }

    /// Whether the saving lock applies.
    pub fn is_save(&self) -> bool {
        matches!(self, OperationKind::Save | OperationKind::SaveNew)
    }

    /// Whether the kind ignores its addressing request.
    pub fn skips_slot(&self) -> bool {
        matches!(self, OperationKind::SaveNew | OperationKind::ContinueLastSave)
    }
}

/// Where a label comes from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum LabelSource {
    #[default]
    None,
    Literal(String),
    /// A text variable, read in the context's language.
    Variable(VariableId),
}

/// One request for the orchestrator.
#[derive(Debug, Clone, PartialEq)]
pub struct Operation {
    pub kind: OperationKind,
    /// Ignored by `SaveNew` and `ContinueLastSave`.
    pub addressing: AddressingRequest,
    pub label: LabelSource,
    pub update_label: bool,
    /// Only used by `Load` and `ContinueLastSave`.
    pub selective_load: Option<SelectiveLoad>,
}

impl Operation {
    pub fn new(kind: OperationKind, addressing: AddressingRequest) -> Self {
        Self {
            kind,
            addressing,
            label: LabelSource::None,
            update_label: false,
            selective_load: None,
        }
    }

    pub fn save(addressing: AddressingRequest) -> Self {
        Self::new(OperationKind::Save, addressing)
    }

    pub fn save_new(label: LabelSource) -> Self {
        Self::new(OperationKind::SaveNew, AddressingRequest::ByExplicitIndex(0)).with_label(label)
    }

    pub fn load(addressing: AddressingRequest) -> Self {
        Self::new(OperationKind::Load, addressing)
    }

    pub fn delete(addressing: AddressingRequest) -> Self {
        Self::new(OperationKind::Delete, addressing)
    }

    pub fn rename(addressing: AddressingRequest, label: LabelSource) -> Self {
        Self::new(OperationKind::Rename, addressing).with_label(label)
    }

    pub fn continue_last_save() -> Self {
        Self::new(
            OperationKind::ContinueLastSave,
            AddressingRequest::ByExplicitIndex(0),
        )
    }

    pub fn with_label(mut self, label: LabelSource) -> Self {
        self.label = label;
        self
    }

    pub fn with_update_label(mut self, update_label: bool) -> Self {
        self.update_label = update_label;
        self
    }

    pub fn with_selective_load(mut self, selective_load: SelectiveLoad) -> Self {
        self.selective_load = Some(selective_load);
        self
    }

    /// Whether this operation reads a label at all.
    pub(crate) fn wants_label(&self) -> bool {
        match self.kind {
            OperationKind::SaveNew | OperationKind::Rename => true,
            OperationKind::Save => {
                self.update_label && self.addressing != AddressingRequest::Autosave
            }
            _ => false,
        }
    }
}

/// Lifecycle of the orchestrator's current operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationState {
    Idle,
    Running,
    Completed,
    Failed,
}

/// Names one `begin` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OperationHandle(pub u64);

/// How a successful operation ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    /// The store reported success.
    Finished { save_id: Option<SaveId> },
    /// A save was requested while saving was locked; nothing was written.
    SkippedLocked,
}

/// Result of polling an operation.
#[derive(Debug)]
pub enum OperationStatus {
    Pending,
    Done(Result<Completion, SaveError>),
}

impl OperationStatus {
    pub fn is_pending(&self) -> bool {
        matches!(self, OperationStatus::Pending)
    }
}
