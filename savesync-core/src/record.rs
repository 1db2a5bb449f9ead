//! Save records and the game state they carry.
//!
//! Each record is stored as one `.save` file named after its persisted ID:
//!
//! ```text
//! <save_dir>/
//!   save_0.save      # autosave
//!   save_1.save
//!   save_4.save
//! ```
//!
//! The file name is the key shared between the local directory and the
//! remote store.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// File extension reserved for save payloads.
pub const SAVE_EXTENSION: &str = "save";

const FILE_PREFIX: &str = "save_";

/// Stable identity of a save record, independent of its slot position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SaveId(pub u32);

impl SaveId {
    /// The ID reserved for the autosave.
    pub const AUTOSAVE: SaveId = SaveId(0);

    pub fn is_autosave(&self) -> bool {
        *self == Self::AUTOSAVE
    }

    /// File name of the record with this ID.
    pub fn file_name(&self) -> String {
        format!("{}{}.{}", FILE_PREFIX, self.0, SAVE_EXTENSION)
    }

    /// Parses a record file name such as `save_3.save`.
    ///
    /// Only the name [`file_name`](Self::file_name) produces is accepted, so
    /// `save_03.save` or `save_+3.save` never alias record 3.
    pub fn from_file_name(name: &str) -> Option<SaveId> {
        let save_id = name
            .strip_suffix(SAVE_EXTENSION)?
            .strip_suffix('.')?
            .strip_prefix(FILE_PREFIX)?
            .parse()
            .ok()
            .map(SaveId)?;
        (save_id.file_name() == name).then_some(save_id)
    }
}

impl fmt::Display for SaveId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A category of game state that can be selectively restored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StateSection {
    Player,
    Scene,
    SceneObjects,
    Variables,
    Inventory,
}

impl StateSection {
    pub const ALL: [StateSection; 5] = [
        StateSection::Player,
        StateSection::Scene,
        StateSection::SceneObjects,
        StateSection::Variables,
        StateSection::Inventory,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StateSection::Player => "player",
            StateSection::Scene => "scene",
            StateSection::SceneObjects => "scene_objects",
            StateSection::Variables => "variables",
            StateSection::Inventory => "inventory",
        }
    }
}

impl fmt::Display for StateSection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StateSection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "player" => Ok(StateSection::Player),
            "scene" => Ok(StateSection::Scene),
            "scene_objects" => Ok(StateSection::SceneObjects),
            "variables" => Ok(StateSection::Variables),
            "inventory" => Ok(StateSection::Inventory),
            other => Err(format!("Unknown state section: {}", other)),
        }
    }
}

/// Restricts which sections of game state a load restores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectiveLoad {
    pub player: bool,
    pub scene: bool,
    pub scene_objects: bool,
    pub variables: bool,
    pub inventory: bool,
}

impl Default for SelectiveLoad {
    fn default() -> Self {
        Self {
            player: true,
            scene: true,
            scene_objects: true,
            variables: true,
            inventory: true,
        }
    }
}

impl SelectiveLoad {
    /// A filter that restores only the given sections.
    pub fn only(sections: &[StateSection]) -> Self {
        let mut filter = Self {
            player: false,
            scene: false,
            scene_objects: false,
            variables: false,
            inventory: false,
        };
        for section in sections {
            *filter.flag_mut(*section) = true;
        }
        filter
    }

    pub fn includes(&self, section: StateSection) -> bool {
        match section {
            StateSection::Player => self.player,
            StateSection::Scene => self.scene,
            StateSection::SceneObjects => self.scene_objects,
            StateSection::Variables => self.variables,
            StateSection::Inventory => self.inventory,
        }
    }

    fn flag_mut(&mut self, section: StateSection) -> &mut bool {
        match section {
            StateSection::Player => &mut self.player,
            StateSection::Scene => &mut self.scene,
            StateSection::SceneObjects => &mut self.scene_objects,
            StateSection::Variables => &mut self.variables,
            StateSection::Inventory => &mut self.inventory,
        }
    }
}

/// Live game state, grouped by section.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GameState {
    sections: BTreeMap<StateSection, serde_json::Value>,
}

impl GameState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, section: StateSection) -> Option<&serde_json::Value> {
        self.sections.get(&section)
    }

    pub fn set(&mut self, section: StateSection, value: serde_json::Value) {
        self.sections.insert(section, value);
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    /// Copies sections from `saved` into this state.
    ///
    /// With a filter, sections it excludes keep their current value.
    pub fn restore_from(&mut self, saved: &GameState, filter: Option<&SelectiveLoad>) {
        for section in StateSection::ALL {
            if filter.is_some_and(|f| !f.includes(section)) {
                continue;
            }
            match saved.sections.get(&section) {
                Some(value) => {
                    self.sections.insert(section, value.clone());
                }
                None => {
                    self.sections.remove(&section);
                }
            }
        }
    }
}

/// The payload of one `.save` file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaveRecord {
    pub save_id: SaveId,
    pub label: String,
    #[serde(default)]
    pub is_autosave: bool,
    pub saved_at: DateTime<Utc>,
    #[serde(default)]
    pub state: GameState,
}

impl SaveRecord {
    pub fn new(save_id: SaveId, label: impl Into<String>, state: GameState) -> Self {
        Self {
            save_id,
            label: label.into(),
            is_autosave: save_id.is_autosave(),
            saved_at: Utc::now(),
            state,
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec_pretty(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

/// A record as listed to callers, with its current slot position.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Record {
    pub slot_index: u32,
    pub save_id: SaveId,
    pub label: String,
    pub is_autosave: bool,
    pub modified_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_file_name_roundtrip() {
        assert_eq!(SaveId(3).file_name(), "save_3.save");
        assert_eq!(SaveId::from_file_name("save_3.save"), Some(SaveId(3)));
        assert_eq!(SaveId::from_file_name("save_0.save"), Some(SaveId::AUTOSAVE));
    }

    #[test]
    fn test_from_file_name_rejects_other_names() {
        assert_eq!(SaveId::from_file_name("save_3.save.tmp"), None);
        assert_eq!(SaveId::from_file_name("profile_3.save"), None);
        assert_eq!(SaveId::from_file_name("save_x.save"), None);
        assert_eq!(SaveId::from_file_name("save_3save"), None);
        assert_eq!(SaveId::from_file_name("save_03.save"), None);
        assert_eq!(SaveId::from_file_name("save_+3.save"), None);
        assert_eq!(SaveId::from_file_name("save_00.save"), None);
        assert_eq!(
            SaveId::from_file_name("save_4294967295.save"),
            Some(SaveId(u32::MAX))
        );
    }

    #[test]
    fn test_state_section_parse() {
        assert_eq!("player".parse::<StateSection>(), Ok(StateSection::Player));
        assert_eq!(
            "Scene-Objects".parse::<StateSection>(),
            Ok(StateSection::SceneObjects)
        );
        assert!("weather".parse::<StateSection>().is_err());
    }

    #[test]
    fn test_selective_load_only() {
        let filter = SelectiveLoad::only(&[StateSection::Inventory]);
        assert!(filter.includes(StateSection::Inventory));
        assert!(!filter.includes(StateSection::Player));
        assert!(SelectiveLoad::default().includes(StateSection::Scene));
    }

    #[test]
    fn test_restore_respects_filter() {
        let mut live = GameState::new();
        live.set(StateSection::Player, json!({"x": 1}));
        live.set(StateSection::Inventory, json!(["key"]));

        let mut saved = GameState::new();
        saved.set(StateSection::Player, json!({"x": 9}));
        saved.set(StateSection::Inventory, json!(["sword"]));

        let filter = SelectiveLoad::only(&[StateSection::Inventory]);
        live.restore_from(&saved, Some(&filter));

        assert_eq!(live.get(StateSection::Player), Some(&json!({"x": 1})));
        assert_eq!(live.get(StateSection::Inventory), Some(&json!(["sword"])));
    }

    #[test]
    fn test_restore_without_filter_replaces_everything() {
        let mut live = GameState::new();
        live.set(StateSection::Scene, json!("cellar"));

        let mut saved = GameState::new();
        saved.set(StateSection::Player, json!({"hp": 3}));

        live.restore_from(&saved, None);
        assert_eq!(live.get(StateSection::Scene), None);
        assert_eq!(live.get(StateSection::Player), Some(&json!({"hp": 3})));
    }

    #[test]
    fn test_save_record_bytes() {
        let mut state = GameState::new();
        state.set(StateSection::Variables, json!({"3": 12}));
        let record = SaveRecord::new(SaveId(2), "Chapter 2", state);

        let bytes = record.to_bytes().unwrap();
        let parsed = SaveRecord::from_bytes(&bytes).unwrap();
        assert_eq!(parsed, record);
        assert!(!parsed.is_autosave);
    }
}
