//! The pieces of a game the save operations consult, backed by files.
//!
//! - variables come from a YAML file (`integers` and `texts` maps)
//! - save-list menus come from the `menus` config key
//! - saving is locked while `<save_dir>/.saving.lock` exists

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use serde::Deserialize;
use tracing::debug;

use savesync_core::{
    Completion, CompletionBus, FileRecordStore, GameState, LocalSaveDir, MemoryVariables,
    Operation, OperationContext, OperationStatus, Orchestrator, SaveError, SavingLock,
    StaticMenus, VariableId,
};

use crate::config::{Config, MenuConfig};

/// File whose presence locks saving.
pub const LOCK_FILE_NAME: &str = ".saving.lock";

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct VariablesFile {
    integers: HashMap<VariableId, i64>,
    /// Languages load alphabetically, so the first one is the fallback.
    texts: HashMap<VariableId, BTreeMap<String, String>>,
}

/// Loads the variable store. No file means no variables.
pub fn load_variables(path: Option<&Path>) -> Result<MemoryVariables, HostError> {
    let mut variables = MemoryVariables::new();
    let Some(path) = path else {
        return Ok(variables);
    };

    let contents = std::fs::read_to_string(path)
        .map_err(|e| HostError::ReadError(path.to_path_buf(), e.to_string()))?;
    let file: VariablesFile = serde_yaml::from_str(&contents)
        .map_err(|e| HostError::ParseError(path.to_path_buf(), e.to_string()))?;

    for (id, value) in file.integers {
        variables.set_integer(id, value);
    }
    for (id, translations) in file.texts {
        for (language, text) in translations {
            variables.set_text(id, language, text);
        }
    }
    Ok(variables)
}

pub fn menus_from_config(menus: &[MenuConfig]) -> StaticMenus {
    menus.iter().fold(StaticMenus::new(), |table, m| {
        table.with_saves_list(&m.menu, &m.element, m.offset)
    })
}

/// Saving lock held by a marker file.
#[derive(Debug, Clone)]
pub struct LockFile {
    path: PathBuf,
}

impl LockFile {
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            path: dir.join(LOCK_FILE_NAME),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SavingLock for LockFile {
    fn is_locked(&self) -> bool {
        self.path.exists()
    }
}

/// Reads a game state file. A missing file is an empty state.
pub fn read_state(path: &Path) -> Result<GameState, HostError> {
    match std::fs::read(path) {
        Ok(bytes) => serde_json::from_slice(&bytes)
            .map_err(|e| HostError::ParseError(path.to_path_buf(), e.to_string())),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(GameState::new()),
        Err(e) => Err(HostError::ReadError(path.to_path_buf(), e.to_string())),
    }
}

pub fn write_state(path: &Path, state: &GameState) -> Result<(), HostError> {
    let json = serde_json::to_string_pretty(state)
        .map_err(|e| HostError::WriteError(path.to_path_buf(), e.to_string()))?;
    std::fs::write(path, json).map_err(|e| HostError::WriteError(path.to_path_buf(), e.to_string()))
}

/// A record store plus everything an orchestrator needs, built from config.
pub struct SaveHost {
    store: Arc<FileRecordStore>,
    ctx: OperationContext,
    poll_interval: Duration,
}

impl SaveHost {
    pub fn from_config(config: &Config) -> Result<Self, HostError> {
        let save_dir = config.save_dir.value.clone();
        let bus = CompletionBus::new();
        let store = Arc::new(FileRecordStore::new(
            LocalSaveDir::new(&save_dir),
            bus.clone(),
        ));

        let ctx = OperationContext {
            records: store.clone(),
            variables: Arc::new(load_variables(config.variables_file.value.as_deref())?),
            menus: Arc::new(menus_from_config(&config.menus)),
            saving_lock: Arc::new(LockFile::in_dir(&save_dir)),
            bus,
            language: config.language.value.clone(),
        };

        Ok(Self {
            store,
            ctx,
            poll_interval: config.poll_interval(),
        })
    }

    pub fn store(&self) -> &FileRecordStore {
        &self.store
    }

    /// Runs one operation to completion, polling at the configured interval.
    pub fn run(&self, operation: Operation) -> Result<Completion, SaveError> {
        let mut orchestrator = Orchestrator::new(self.ctx.clone());
        let handle = orchestrator.begin(operation);

        loop {
            match orchestrator.poll(handle) {
                OperationStatus::Pending => {
                    debug!("Operation {} pending", handle.0);
                    thread::sleep(self.poll_interval);
                }
                OperationStatus::Done(result) => return result,
            }
        }
    }
}

#[derive(Debug)]
pub enum HostError {
    ReadError(PathBuf, String),
    ParseError(PathBuf, String),
    WriteError(PathBuf, String),
}

impl std::fmt::Display for HostError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HostError::ReadError(path, e) => write!(f, "Failed to read '{}': {}", path.display(), e),
            HostError::ParseError(path, e) => {
                write!(f, "Failed to parse '{}': {}", path.display(), e)
            }
            HostError::WriteError(path, e) => {
                write!(f, "Failed to write '{}': {}", path.display(), e)
            }
        }
    }
}

impl std::error::Error for HostError {}
