//! Record store over a [`LocalSaveDir`].
//!
//! Slot index `i` names the `i`-th record when records are ordered by
//! ascending save ID, autosave included. Work is done inline and the outcome
//! is published on the bus before the call returns.

use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::{debug, info, warn};

use super::RecordStore;
use crate::completion::{CompletionBus, CompletionEvent, RequestId, Topic};
use crate::error::SaveError;
use crate::local::LocalSaveDir;
use crate::record::{GameState, Record, SaveId, SaveRecord, SelectiveLoad};
use crate::slot::SlotTarget;

const AUTOSAVE_LABEL: &str = "Autosave";

/// File-backed record store holding the live game state.
#[derive(Debug)]
pub struct FileRecordStore {
    saves: LocalSaveDir,
    bus: CompletionBus,
    state: Mutex<GameState>,
}

impl FileRecordStore {
    pub fn new(saves: LocalSaveDir, bus: CompletionBus) -> Self {
        Self {
            saves,
            bus,
            state: Mutex::new(GameState::new()),
        }
    }

    pub fn saves(&self) -> &LocalSaveDir {
        &self.saves
    }

    /// A copy of the live state.
    pub fn state(&self) -> GameState {
        self.lock_state().clone()
    }

    pub fn set_state(&self, state: GameState) {
        *self.lock_state() = state;
    }

    /// Lists records in slot order. Unreadable payloads are skipped.
    pub fn list(&self) -> Result<Vec<Record>, SaveError> {
        let mut records = Vec::new();

        for save_id in self.saved_ids()? {
            let record = match self.read_record(save_id) {
                Ok(Some(record)) => record,
                Ok(None) => continue,
                Err(e) => {
                    warn!("Skipping unreadable save {}: {}", save_id, e);
                    continue;
                }
            };
            records.push(Record {
                slot_index: records.len() as u32,
                save_id,
                label: record.label,
                is_autosave: save_id.is_autosave(),
                modified_at: record.saved_at,
            });
        }

        Ok(records)
    }

    fn lock_state(&self) -> MutexGuard<'_, GameState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// IDs of every save on disk, ascending.
    fn saved_ids(&self) -> Result<Vec<SaveId>, SaveError> {
        let mut ids: Vec<SaveId> = self
            .saves
            .list()?
            .iter()
            .filter_map(|f| SaveId::from_file_name(&f.name))
            .collect();
        ids.sort();
        Ok(ids)
    }

    fn read_record(&self, save_id: SaveId) -> Result<Option<SaveRecord>, SaveError> {
        let name = save_id.file_name();
        match self.saves.read(&name)? {
            Some(bytes) => SaveRecord::from_bytes(&bytes)
                .map(Some)
                .map_err(|e| SaveError::Payload(self.saves.path(&name), e)),
            None => Ok(None),
        }
    }

    fn write_record(&self, record: &SaveRecord) -> Result<(), SaveError> {
        let name = record.save_id.file_name();
        let bytes = record
            .to_bytes()
            .map_err(|e| SaveError::Payload(self.saves.path(&name), e))?;
        self.saves.write_atomic(&name, &bytes)?;
        Ok(())
    }

    /// Maps a target to a save ID. `None` means an index past the last record.
    fn target_id(&self, target: SlotTarget) -> Result<Option<SaveId>, SaveError> {
        match target {
            SlotTarget::Index(i) => Ok(self.saved_ids()?.get(i as usize).copied()),
            SlotTarget::Id(id) => Ok(Some(id)),
            SlotTarget::Autosave => Ok(Some(SaveId::AUTOSAVE)),
        }
    }

    fn existing_id(&self, target: SlotTarget) -> Result<SaveId, SaveError> {
        self.target_id(target)?
            .ok_or_else(|| SaveError::RecordNotFound(describe(target)))
    }

    fn next_free_id(&self) -> Result<SaveId, SaveError> {
        let highest = self.saved_ids()?.last().map_or(0, |id| id.0);
        highest
            .checked_add(1)
            .map(SaveId)
            .ok_or_else(|| SaveError::Store(format!("no save ID left after {}", highest)))
    }

    fn delete_record(&self, target: SlotTarget) -> Result<SaveId, SaveError> {
        let save_id = self.existing_id(target)?;
        if !self.saves.delete(&save_id.file_name())? {
            return Err(SaveError::RecordNotFound(describe(target)));
        }
        info!("Deleted save {}", save_id);
        Ok(save_id)
    }

    fn rename_record(&self, label: &str, target: SlotTarget) -> Result<SaveId, SaveError> {
        let save_id = self.existing_id(target)?;
        if save_id.is_autosave() {
            return Err(SaveError::AutosaveImmutable);
        }
        let mut record = self
            .read_record(save_id)?
            .ok_or_else(|| SaveError::RecordNotFound(describe(target)))?;
        record.label = label.to_string();
        self.write_record(&record)?;
        info!("Renamed save {} to '{}'", save_id, label);
        Ok(save_id)
    }

    fn save_record(
        &self,
        save_id: SaveId,
        update_label: bool,
        label: Option<&str>,
    ) -> Result<SaveId, SaveError> {
        let state = self.lock_state();
        let existing_label = self.read_record(save_id)?.map(|r| r.label);

        let label = match (update_label, label, existing_label) {
            (true, Some(new_label), _) => new_label.to_string(),
            (_, _, Some(existing)) => existing,
            (_, Some(new_label), None) => new_label.to_string(),
            (_, None, None) => default_label(save_id),
        };

        let record = SaveRecord::new(save_id, label, state.clone());
        self.write_record(&record)?;
        info!("Saved game to save {} ('{}')", save_id, record.label);
        Ok(save_id)
    }

    fn load_record(
        &self,
        save_id: SaveId,
        selective: Option<&SelectiveLoad>,
    ) -> Result<SaveId, SaveError> {
        let record = self
            .read_record(save_id)?
            .ok_or_else(|| SaveError::RecordNotFound(format!("save {}", save_id)))?;
        self.lock_state().restore_from(&record.state, selective);
        info!("Loaded save {} ('{}')", save_id, record.label);
        Ok(save_id)
    }

    fn latest_id(&self) -> Result<SaveId, SaveError> {
        let mut latest: Option<(SaveId, chrono::DateTime<chrono::Utc>)> = None;
        for save_id in self.saved_ids()? {
            if let Some(record) = self.read_record(save_id)? {
                if latest.map_or(true, |(_, at)| record.saved_at > at) {
                    latest = Some((save_id, record.saved_at));
                }
            }
        }
        latest
            .map(|(id, _)| id)
            .ok_or_else(|| SaveError::RecordNotFound("any save".to_string()))
    }

    /// Publishes the outcome of one request.
    fn publish(
        &self,
        request: RequestId,
        result: Result<SaveId, SaveError>,
        finish: Topic,
        fail: Topic,
    ) {
        let event = match result {
            Ok(save_id) => CompletionEvent::new(finish).with_save_id(save_id),
            Err(e) => {
                warn!("{:?} for request {} failed: {}", fail, request, e);
                CompletionEvent::new(fail).with_detail(e.to_string())
            }
        };
        let event = event.with_request(request);
        let delivered = self.bus.publish(event);
        debug!("Completion delivered to {} subscriber(s)", delivered);
    }
}

fn default_label(save_id: SaveId) -> String {
    if save_id.is_autosave() {
        AUTOSAVE_LABEL.to_string()
    } else {
        format!("Save {}", save_id)
    }
}

fn describe(target: SlotTarget) -> String {
    match target {
        SlotTarget::Index(i) => format!("slot {}", i),
        SlotTarget::Id(id) => format!("save {}", id),
        SlotTarget::Autosave => "autosave".to_string(),
    }
}

impl RecordStore for FileRecordStore {
    fn delete(&self, request: RequestId, target: SlotTarget) -> Result<(), SaveError> {
        let result = self.delete_record(target);
        self.publish(request, result, Topic::FinishDeleting, Topic::FailDeleting);
        Ok(())
    }

    fn rename(&self, request: RequestId, label: &str, target: SlotTarget) -> Result<(), SaveError> {
        let result = self.rename_record(label, target);
        self.publish(request, result, Topic::FinishRenaming, Topic::FailRenaming);
        Ok(())
    }

    fn save(
        &self,
        request: RequestId,
        target: SlotTarget,
        update_label: bool,
        label: Option<&str>,
    ) -> Result<(), SaveError> {
        let result = match self.target_id(target) {
            Ok(Some(save_id)) => self.save_record(save_id, update_label, label),
            Ok(None) => self
                .next_free_id()
                .and_then(|save_id| self.save_record(save_id, update_label, label)),
            Err(e) => Err(e),
        };
        self.publish(request, result, Topic::FinishSaving, Topic::FailSaving);
        Ok(())
    }

    fn save_new(&self, request: RequestId, label: Option<&str>) -> Result<(), SaveError> {
        let result = self
            .next_free_id()
            .and_then(|save_id| self.save_record(save_id, true, label));
        self.publish(request, result, Topic::FinishSaving, Topic::FailSaving);
        Ok(())
    }

    fn load(
        &self,
        request: RequestId,
        target: SlotTarget,
        selective: Option<&SelectiveLoad>,
    ) -> Result<(), SaveError> {
        let result = self
            .existing_id(target)
            .and_then(|save_id| self.load_record(save_id, selective));
        self.publish(request, result, Topic::FinishLoading, Topic::FailLoading);
        Ok(())
    }

    fn continue_last_save(
        &self,
        request: RequestId,
        selective: Option<&SelectiveLoad>,
    ) -> Result<(), SaveError> {
        let result = self
            .latest_id()
            .and_then(|save_id| self.load_record(save_id, selective));
        self.publish(request, result, Topic::FinishLoading, Topic::FailLoading);
        Ok(())
    }

    fn save_autosave(&self, request: RequestId) -> Result<(), SaveError> {
        let result = self.save_record(SaveId::AUTOSAVE, false, None);
        self.publish(request, result, Topic::FinishSaving, Topic::FailSaving);
        Ok(())
    }

    fn load_autosave(
        &self,
        request: RequestId,
        selective: Option<&SelectiveLoad>,
    ) -> Result<(), SaveError> {
        let result = self.load_record(SaveId::AUTOSAVE, selective);
        self.publish(request, result, Topic::FinishLoading, Topic::FailLoading);
        Ok(())
    }
}
