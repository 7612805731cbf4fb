//! Host context supplying store names, locations and the open-store registry.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use tracing::{debug, warn};

use crate::domain::AccessMode;
use super::persistence::{FileStore, KeyValueStore};

/// Directory under the application's data directory that holds store files.
pub const STORE_DIR_NAME: &str = "shared_prefs";

/// The environment stores are opened in.
///
/// Stores are cached by name: opening the same name twice returns the same
/// store, regardless of the access mode passed the second time.
#[derive(Debug)]
pub struct HostContext {
    package_name: String,
    data_dir: Option<PathBuf>,
    stores: Mutex<HashMap<String, Arc<FileStore>>>,
}

impl HostContext {
    /// A context whose stores are files under `data_dir`.
    pub fn new(package_name: impl Into<String>, data_dir: impl Into<PathBuf>) -> Self {
        Self {
            package_name: package_name.into(),
            data_dir: Some(data_dir.into()),
            stores: Mutex::new(HashMap::new()),
        }
    }

    /// A context whose stores live only in memory.
    pub fn in_memory(package_name: impl Into<String>) -> Self {
        Self {
            package_name: package_name.into(),
            data_dir: None,
            stores: Mutex::new(HashMap::new()),
        }
    }

    /// A context rooted in the platform's per-user data directory.
    ///
    /// Returns `None` when the platform has no such directory.
    pub fn for_application(package_name: impl Into<String>) -> Option<Self> {
        let package_name = package_name.into();
        let data_dir = dirs::data_dir()?.join(&package_name).join(STORE_DIR_NAME);
        Some(Self::new(package_name, data_dir))
    }

    pub fn package_name(&self) -> &str {
        &self.package_name
    }

    pub fn data_dir(&self) -> Option<&Path> {
        self.data_dir.as_deref()
    }

    /// Opens the store called `name`, creating it if needed.
    ///
    /// Opened stores stay cached for the lifetime of the context, together
    /// with their writer threads, even after every handle to them is dropped.
    /// Dropping the context releases them. A store is never reopened while a
    /// cached copy exists, so two handles cannot diverge on the same file.
    pub fn open_store(&self, name: &str, mode: AccessMode) -> Arc<dyn KeyValueStore> {
        let mut stores = self.stores.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(store) = stores.get(name) {
            if store.mode() != mode {
                debug!(
                    store = %name,
                    open_mode = %store.mode(),
                    requested_mode = %mode,
                    "store already open; keeping its original mode"
                );
            }
            return store.clone();
        }

        let store = match &self.data_dir {
            Some(dir) => FileStore::open(name, mode, dir.join(store_file_name(name))),
            None => FileStore::in_memory(name, mode),
        };
        let store = Arc::new(store);
        stores.insert(name.to_string(), store.clone());
        store
    }

    /// Number of stores currently cached by this context.
    pub fn open_store_count(&self) -> usize {
        self.stores.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

/// File stem used for a store with an empty name.
///
/// `%` is always escaped in real names, so this stem cannot collide with one.
const EMPTY_NAME_STEM: &str = "%default";

/// Maps a store name to its file name.
///
/// Path separators and `%` are percent-escaped, so distinct names always map
/// to distinct files and none can leave the data directory.
fn store_file_name(name: &str) -> String {
    if name.is_empty() {
        warn!("empty store name; using {}", EMPTY_NAME_STEM);
        return format!("{}.json", EMPTY_NAME_STEM);
    }

    let mut stem = String::with_capacity(name.len());
    for c in name.chars() {
        match c {
            '%' => stem.push_str("%25"),
            '/' => stem.push_str("%2F"),
            '\\' => stem.push_str("%5C"),
            c => stem.push(c),
        }
    }
    if stem != name {
        debug!(name = %name, file_stem = %stem, "escaped store name for its file");
    }
    format!("{}.json", stem)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::PreferenceValue;
    use crate::infrastructure::Changes;
    use tempfile::TempDir;

    #[test]
    fn test_same_name_shares_store() {
        let context = HostContext::in_memory("com.example");
        let private = context.open_store("prefs", AccessMode::Private);
        let readable = context.open_store("prefs", AccessMode::WorldReadable);

        let mut changes = Changes::new();
        changes.put("shared", 1);
        private.apply(changes);

        assert_eq!(readable.get("shared"), Some(PreferenceValue::Int(1)));
        assert_eq!(readable.mode(), AccessMode::Private);
        assert!(Arc::ptr_eq(&private, &readable));
    }

    #[test]
    fn test_different_names_are_isolated() {
        let context = HostContext::in_memory("com.example");
        let a = context.open_store("a", AccessMode::Private);
        let b = context.open_store("b", AccessMode::Private);

        let mut changes = Changes::new();
        changes.put("key", "value");
        a.apply(changes);

        assert!(a.contains("key"));
        assert!(!b.contains("key"));
    }

    #[test]
    fn test_file_backed_store_location() {
        let dir = TempDir::new().unwrap();
        let context = HostContext::new("com.example", dir.path());
        let store = context.open_store("settings", AccessMode::Private);

        let mut changes = Changes::new();
        changes.put("k", true);
        store.commit(changes).unwrap();

        assert_eq!(context.data_dir(), Some(dir.path()));
        assert!(dir.path().join("settings.json").exists());
    }

    #[test]
    fn test_path_separators_are_escaped() {
        let dir = TempDir::new().unwrap();
        let context = HostContext::new("com.example.app", dir.path());
        let store = context.open_store("../escape", AccessMode::Private);
        assert_eq!(store.name(), "../escape");

        let mut changes = Changes::new();
        changes.put("k", 1);
        store.commit(changes).unwrap();
        assert!(dir.path().join("..%2Fescape.json").exists());
    }

    #[test]
    fn test_escaped_names_do_not_collide() {
        let dir = TempDir::new().unwrap();
        let context = HostContext::new("com.example.app", dir.path());
        let slashed = context.open_store("a/b", AccessMode::Private);
        let underscored = context.open_store("a_b", AccessMode::Private);
        let percent = context.open_store("a%2Fb", AccessMode::Private);

        let mut changes = Changes::new();
        changes.put("owner", "slashed");
        slashed.commit(changes).unwrap();

        assert!(!underscored.contains("owner"));
        assert!(!percent.contains("owner"));
        assert_eq!(store_file_name("a/b"), "a%2Fb.json");
        assert_eq!(store_file_name("a_b"), "a_b.json");
        assert_eq!(store_file_name("a%2Fb"), "a%252Fb.json");
        assert_eq!(store_file_name("a\\b"), "a%5Cb.json");
    }

    #[test]
    fn test_empty_name_uses_fixed_file() {
        let dir = TempDir::new().unwrap();
        let context = HostContext::new("", dir.path());
        let store = context.open_store("", AccessMode::Private);

        let mut changes = Changes::new();
        changes.put("k", true);
        store.commit(changes).unwrap();

        assert!(dir.path().join("%default.json").exists());
        assert!(!dir.path().join(".json").exists());
    }

    #[test]
    fn test_stores_stay_cached_after_handles_drop() {
        let context = HostContext::in_memory("com.example.app");
        {
            let store = context.open_store("session", AccessMode::Private);
            let mut changes = Changes::new();
            changes.put("token", "abc");
            store.apply(changes);
        }
        assert_eq!(context.open_store_count(), 1);

        let store = context.open_store("session", AccessMode::Private);
        assert_eq!(store.get("token"), Some(PreferenceValue::from("abc")));
        assert_eq!(context.open_store_count(), 1);
    }

    #[test]
    fn test_package_name() {
        let context = HostContext::in_memory("com.example.app");
        assert_eq!(context.package_name(), "com.example.app");
        assert!(context.data_dir().is_none());
    }
}
