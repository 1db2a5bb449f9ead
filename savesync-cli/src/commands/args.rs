//! Argument groups shared by the save commands.

use clap::Args;
use std::path::PathBuf;

use savesync_core::{AddressingRequest, LabelSource, SaveId, SelectiveLoad, StateSection, VariableId};

/// Which save a command acts on
#[derive(Debug, Clone, Default, Args)]
pub struct SlotArgs {
    /// Slot index in the save list (negative values mean slot 0)
    #[arg(long, allow_hyphen_values = true, conflicts_with_all = ["slot_var", "id", "autosave"])]
    pub slot: Option<i32>,

    /// Read the slot index from an integer variable
    #[arg(long, value_name = "VARIABLE", conflicts_with_all = ["id", "autosave"])]
    pub slot_var: Option<VariableId>,

    /// Persisted save ID, regardless of slot position
    #[arg(long, conflicts_with = "autosave")]
    pub id: Option<u32>,

    /// Act on the autosave
    #[arg(long)]
    pub autosave: bool,

    /// Menu holding the save list whose scroll offset is added to --slot
    #[arg(long, requires = "element", conflicts_with_all = ["slot_var", "id", "autosave"])]
    pub menu: Option<String>,

    /// Save-list element inside --menu
    #[arg(long, requires = "menu")]
    pub element: Option<String>,
}

impl SlotArgs {
    pub fn is_empty(&self) -> bool {
        self.slot.is_none()
            && self.slot_var.is_none()
            && self.id.is_none()
            && !self.autosave
            && self.menu.is_none()
    }

    pub fn addressing(&self) -> Result<AddressingRequest, ArgsError> {
        if self.autosave {
            return Ok(AddressingRequest::Autosave);
        }
        if let Some(id) = self.id {
            return Ok(AddressingRequest::ByPersistedId(SaveId(id)));
        }
        if let Some(variable) = self.slot_var {
            return Ok(AddressingRequest::ByVariableIndex(variable));
        }
        if let (Some(menu), Some(element)) = (&self.menu, &self.element) {
            return Ok(AddressingRequest::ByUiOffsetIndex {
                index: self.slot.unwrap_or(0),
                menu: menu.clone(),
                element: element.clone(),
            });
        }
        match self.slot {
            Some(index) => Ok(AddressingRequest::ByExplicitIndex(index)),
            None => Err(ArgsError::MissingSlot),
        }
    }
}

/// Where a label comes from
#[derive(Debug, Clone, Default, Args)]
pub struct LabelArgs {
    /// Label text
    #[arg(long, conflicts_with = "label_var")]
    pub label: Option<String>,

    /// Read the label from a text variable
    #[arg(long, value_name = "VARIABLE")]
    pub label_var: Option<VariableId>,
}

impl LabelArgs {
    pub fn source(&self) -> LabelSource {
        match (&self.label, self.label_var) {
            (Some(text), _) => LabelSource::Literal(text.clone()),
            (None, Some(variable)) => LabelSource::Variable(variable),
            (None, None) => LabelSource::None,
        }
    }
}

/// Restrict a load to some sections of game state
#[derive(Debug, Clone, Default, Args)]
pub struct LoadFilterArgs {
    /// Comma-separated sections to restore (player, scene, scene_objects, variables, inventory)
    #[arg(long, value_delimiter = ',')]
    pub only: Vec<StateSection>,

    /// Game state file (JSON) to read before and write after the load
    #[arg(long, value_name = "FILE")]
    pub state: Option<PathBuf>,
}

impl LoadFilterArgs {
    pub fn selective_load(&self) -> Option<SelectiveLoad> {
        if self.only.is_empty() {
            None
        } else {
            Some(SelectiveLoad::only(&self.only))
        }
    }
}

#[derive(Debug, PartialEq)]
pub enum ArgsError {
    MissingSlot,
    MissingLabel,
}

impl std::fmt::Display for ArgsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ArgsError::MissingSlot => {
                write!(f, "Specify a save with --slot, --slot-var, --id or --autosave")
            }
            ArgsError::MissingLabel => write!(f, "Specify a label with --label or --label-var"),
        }
    }
}

impl std::error::Error for ArgsError {}
