use std::collections::BTreeSet;

use crate::domain::{PreferenceValue, PreferencesResult};
use super::persistence::{Changes, KeyValueStore};

/// An edit transaction against a store.
///
/// Edits are staged until [`Editor::apply`] or [`Editor::commit`] is called.
/// An editor without a store discards everything it is given.
///
/// # Examples
///
/// ```
/// use prefstore::domain::{AccessMode, PreferenceValue};
/// use prefstore::infrastructure::{FileStore, KeyValueStore};
///
/// let store: Box<dyn KeyValueStore> = Box::new(FileStore::in_memory("demo", AccessMode::Private));
/// store.edit().put_int("count", 3).put_boolean("seen", true).apply();
///
/// assert_eq!(store.get("count"), Some(PreferenceValue::Int(3)));
/// ```
#[must_use = "edits are discarded unless applied or committed"]
pub struct Editor<'a> {
    store: Option<&'a dyn KeyValueStore>,
    changes: Changes,
}

impl<'a> Editor<'a> {
    pub fn new(store: &'a dyn KeyValueStore) -> Self {
        Self {
            store: Some(store),
            changes: Changes::new(),
        }
    }

    /// An editor that is not attached to any store.
    pub fn discarding() -> Self {
        Self {
            store: None,
            changes: Changes::new(),
        }
    }

    pub fn put(mut self, key: impl Into<String>, value: impl Into<PreferenceValue>) -> Self {
        self.changes.put(key, value);
        self
    }

    pub fn put_string(self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.put(key, PreferenceValue::String(value.into()))
    }

    pub fn put_string_set(self, key: impl Into<String>, values: BTreeSet<String>) -> Self {
        self.put(key, PreferenceValue::StringSet(values))
    }

    pub fn put_int(self, key: impl Into<String>, value: i32) -> Self {
        self.put(key, PreferenceValue::Int(value))
    }

    pub fn put_float(self, key: impl Into<String>, value: f32) -> Self {
        self.put(key, PreferenceValue::Float(value))
    }

    pub fn put_long(self, key: impl Into<String>, value: i64) -> Self {
        self.put(key, PreferenceValue::Long(value))
    }

    pub fn put_boolean(self, key: impl Into<String>, value: bool) -> Self {
        self.put(key, PreferenceValue::Boolean(value))
    }

    pub fn remove(mut self, key: impl Into<String>) -> Self {
        self.changes.remove(key);
        self
    }

    /// Removes every entry. Runs before any puts staged in this editor.
    pub fn clear(mut self) -> Self {
        self.changes.clear();
        self
    }

    /// Hands the staged edits to the store without waiting for persistence.
    pub fn apply(self) {
        if let Some(store) = self.store {
            if !self.changes.is_empty() {
                store.apply(self.changes);
            }
        }
    }

    /// Applies the staged edits and waits until they are persisted.
    pub fn commit(self) -> PreferencesResult<()> {
        match self.store {
            Some(store) => store.commit(self.changes),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::AccessMode;
    use crate::infrastructure::FileStore;

    #[test]
    fn test_editor_batches_changes() {
        let store = FileStore::in_memory("batch", AccessMode::Private);
        let store: &dyn KeyValueStore = &store;

        store
            .edit()
            .put_string("name", "Alice")
            .put_long("id", 1 << 40)
            .put_float("ratio", 1.5)
            .apply();

        assert_eq!(store.get("name"), Some(PreferenceValue::from("Alice")));
        assert_eq!(store.get("id"), Some(PreferenceValue::Long(1 << 40)));
        assert_eq!(store.get("ratio"), Some(PreferenceValue::Float(1.5)));

        store.edit().remove("name").put_int("count", 1).commit().unwrap();
        assert!(!store.contains("name"));
        assert_eq!(store.get("count"), Some(PreferenceValue::Int(1)));
    }

    #[test]
    fn test_editor_clear_before_puts() {
        let store = FileStore::in_memory("clear", AccessMode::Private);
        let store: &dyn KeyValueStore = &store;
        store.edit().put_int("a", 1).put_int("b", 2).apply();

        store.edit().put_int("c", 3).clear().apply();

        assert!(!store.contains("a"));
        assert!(!store.contains("b"));
        assert_eq!(store.get("c"), Some(PreferenceValue::Int(3)));
    }

    #[test]
    fn test_discarding_editor() {
        Editor::discarding().put_int("a", 1).clear().apply();
        assert!(Editor::discarding().put_boolean("b", true).commit().is_ok());
    }

    #[test]
    fn test_unapplied_editor_changes_nothing() {
        let store = FileStore::in_memory("lazy", AccessMode::Private);
        let store: &dyn KeyValueStore = &store;
        let _staged = store.edit().put_int("a", 1);
        assert!(!store.contains("a"));
    }
}
