//! Turning "which save" requests into concrete record targets.

use tracing::warn;

use crate::context::{MenuLookup, VariableId, VariableStore};
use crate::error::SaveError;
use crate::operation::OperationKind;
use crate::record::SaveId;

/// How an operation names the record it acts on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddressingRequest {
    /// A fixed slot index. Negative values clamp to 0.
    ByExplicitIndex(i32),
    /// Slot index read from an integer variable.
    ByVariableIndex(VariableId),
    /// Slot index relative to the scroll offset of a save-list element.
    ByUiOffsetIndex {
        index: i32,
        menu: String,
        element: String,
    },
    /// A persisted save ID, independent of slot position.
    ByPersistedId(SaveId),
    Autosave,
}

/// The record an operation resolved to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotTarget {
    Index(u32),
    Id(SaveId),
    Autosave,
}

/// Resolves addressing requests against the variable store and menus.
pub struct SlotResolver<'a> {
    variables: &'a dyn VariableStore,
    menus: &'a dyn MenuLookup,
}

impl<'a> SlotResolver<'a> {
    pub fn new(variables: &'a dyn VariableStore, menus: &'a dyn MenuLookup) -> Self {
        Self { variables, menus }
    }

    /// Resolves `request` for an operation of the given kind.
    ///
    /// Never touches persisted records.
    pub fn resolve(
        &self,
        request: &AddressingRequest,
        kind: OperationKind,
    ) -> Result<SlotTarget, SaveError> {
        match request {
            AddressingRequest::ByExplicitIndex(n) => Ok(SlotTarget::Index(clamp_index(*n as i64))),
            AddressingRequest::ByVariableIndex(variable_id) => {
                let value = self
                    .variables
                    .get_integer(*variable_id)
                    .ok_or(SaveError::MissingVariable(*variable_id))?;
                Ok(SlotTarget::Index(clamp_index(value)))
            }
            AddressingRequest::ByUiOffsetIndex {
                index,
                menu,
                element,
            } => {
                let base = clamp_index(*index as i64);
                let offset = self.menu_offset(menu, element, base)?;
                Ok(SlotTarget::Index(base.saturating_add(offset)))
            }
            AddressingRequest::ByPersistedId(id) => Ok(SlotTarget::Id(*id)),
            AddressingRequest::Autosave => match kind {
                OperationKind::Rename => Err(SaveError::AutosaveImmutable),
                _ => Ok(SlotTarget::Autosave),
            },
        }
    }

    fn menu_offset(&self, menu: &str, element: &str, slot: u32) -> Result<u32, SaveError> {
        if menu.is_empty() || element.is_empty() {
            warn!(
                "No SavesList element referenced when trying to find save slot {}",
                slot
            );
            return Ok(0);
        }

        let handle = self.menus.find_element(menu, element).ok_or_else(|| {
            SaveError::MissingUIElement {
                menu: menu.to_string(),
                element: element.to_string(),
            }
        })?;
        Ok(self.menus.offset(handle))
    }
}

fn clamp_index(value: i64) -> u32 {
    value.clamp(0, u32::MAX as i64) as u32
}
