//! Contracts of the collaborators an operation consults, and the bundle
//! passed to the orchestrator at construction.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::completion::CompletionBus;
use crate::store::RecordStore;

/// Identifier of a variable in the host's variable store.
pub type VariableId = u32;

/// Source of integer and text variables.
pub trait VariableStore: Send + Sync {
    fn get_integer(&self, id: VariableId) -> Option<i64>;

    /// Returns the text value of a variable in the given language.
    fn get_text(&self, id: VariableId, language: &str) -> Option<String>;
}

/// Opaque reference to a UI element found by [`MenuLookup::find_element`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ElementHandle(pub usize);

/// Lookup of save-list elements in the host's menus.
pub trait MenuLookup: Send + Sync {
    /// Finds a save-list element.
    ///
    /// Returns `None` when the element is missing or is not a save list.
    fn find_element(&self, menu: &str, element: &str) -> Option<ElementHandle>;

    /// Current scroll offset of a save list.
    fn offset(&self, handle: ElementHandle) -> u32;
}

/// Predicate reporting that the host is not accepting saves right now.
pub trait SavingLock: Send + Sync {
    fn is_locked(&self) -> bool;
}

/// Everything an orchestrator needs, handed over explicitly.
#[derive(Clone)]
pub struct OperationContext {
    pub records: Arc<dyn RecordStore>,
    pub variables: Arc<dyn VariableStore>,
    pub menus: Arc<dyn MenuLookup>,
    pub saving_lock: Arc<dyn SavingLock>,
    pub bus: CompletionBus,
    /// Language used when reading text variables.
    pub language: String,
}

// ==================== In-memory implementations ====================

/// Variable store backed by plain maps.
#[derive(Debug, Clone, Default)]
pub struct MemoryVariables {
    integers: HashMap<VariableId, i64>,
    /// `(language, value)` pairs in the order each language was first set.
    texts: HashMap<VariableId, Vec<(String, String)>>,
}

impl MemoryVariables {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_integer(&mut self, id: VariableId, value: i64) {
        self.integers.insert(id, value);
    }

    pub fn set_text(&mut self, id: VariableId, language: impl Into<String>, value: impl Into<String>) {
        let language = language.into();
        let value = value.into();
        let translations = self.texts.entry(id).or_default();
        match translations.iter_mut().find(|(lang, _)| *lang == language) {
            Some((_, existing)) => *existing = value,
            None => translations.push((language, value)),
        }
    }
}

impl VariableStore for MemoryVariables {
    fn get_integer(&self, id: VariableId) -> Option<i64> {
        self.integers.get(&id).copied()
    }

    /// Falls back to the first language set for the variable when the
    /// requested one is missing.
    fn get_text(&self, id: VariableId, language: &str) -> Option<String> {
        let translations = self.texts.get(&id)?;
        translations
            .iter()
            .find(|(lang, _)| lang == language)
            .or_else(|| translations.first())
            .map(|(_, value)| value.clone())
    }
}

/// Kind of a registered menu element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementKind {
    SavesList,
    Other,
}

#[derive(Debug, Clone)]
struct MenuElement {
    menu: String,
    element: String,
    kind: ElementKind,
    offset: u32,
}

/// Fixed table of menu elements.
#[derive(Debug, Clone, Default)]
pub struct StaticMenus {
    elements: Vec<MenuElement>,
}

impl StaticMenus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_saves_list(mut self, menu: &str, element: &str, offset: u32) -> Self {
        self.add(menu, element, ElementKind::SavesList, offset);
        self
    }

    pub fn add(&mut self, menu: &str, element: &str, kind: ElementKind, offset: u32) {
        self.elements.push(MenuElement {
            menu: menu.to_string(),
            element: element.to_string(),
            kind,
            offset,
        });
    }
}

impl MenuLookup for StaticMenus {
    fn find_element(&self, menu: &str, element: &str) -> Option<ElementHandle> {
        self.elements
            .iter()
            .position(|e| e.menu == menu && e.element == element)
            .filter(|&i| self.elements[i].kind == ElementKind::SavesList)
            .map(ElementHandle)
    }

    fn offset(&self, handle: ElementHandle) -> u32 {
        self.elements.get(handle.0).map(|e| e.offset).unwrap_or(0)
    }
}

/// A saving lock toggled in memory.
#[derive(Debug, Default)]
pub struct LockFlag(AtomicBool);

impl LockFlag {
    pub fn new(locked: bool) -> Self {
        Self(AtomicBool::new(locked))
    }

    pub fn set(&self, locked: bool) {
        self.0.store(locked, Ordering::SeqCst);
    }
}

impl SavingLock for LockFlag {
    fn is_locked(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_variables() {
        let mut vars = MemoryVariables::new();
        vars.set_integer(4, 7);
        vars.set_text(9, "en", "Harbour");
        vars.set_text(9, "fr", "Port");

        assert_eq!(vars.get_integer(4), Some(7));
        assert_eq!(vars.get_integer(5), None);
        assert_eq!(vars.get_text(9, "fr").as_deref(), Some("Port"));
        assert_eq!(vars.get_text(9, "de").as_deref(), Some("Harbour"));
        assert_eq!(vars.get_text(10, "en"), None);
    }

    #[test]
    fn test_text_fallback_is_first_language_set() {
        let mut vars = MemoryVariables::new();
        vars.set_text(3, "fr", "Phare");
        for (language, value) in [("en", "Lighthouse"), ("de", "Leuchtturm"), ("es", "Faro")] {
            vars.set_text(3, language, value);
        }
        vars.set_text(3, "fr", "Le phare");

        assert_eq!(vars.get_text(3, "es").as_deref(), Some("Faro"));
        for _ in 0..8 {
            assert_eq!(vars.get_text(3, "ja").as_deref(), Some("Le phare"));
        }
    }

    #[test]
    fn test_static_menus_only_find_saves_lists() {
        let mut menus = StaticMenus::new().with_saves_list("Load", "SavesList", 3);
        menus.add("Load", "Title", ElementKind::Other, 0);

        let handle = menus.find_element("Load", "SavesList").unwrap();
        assert_eq!(menus.offset(handle), 3);
        assert!(menus.find_element("Load", "Title").is_none());
        assert!(menus.find_element("Save", "SavesList").is_none());
    }

    #[test]
    fn test_lock_flag() {
        let lock = LockFlag::new(false);
        assert!(!lock.is_locked());
        lock.set(true);
        assert!(lock.is_locked());
    }
}
