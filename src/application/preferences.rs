//! Typed access to a named preferences store.
//!
//! [`PreferenceStore`] wraps a [`KeyValueStore`] with typed getters and
//! setters, default-value fallback and JSON-backed object accessors. When no
//! host context is available the store is [`StoreHandle::Inactive`]: reads
//! return defaults and writes are discarded.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::domain::{
    AccessMode, JsonCodec, ObjectCodec, PreferenceValue, PreferencesError, PreferencesResult,
    StoreConfig, ValueKind,
};
use crate::infrastructure::{Editor, HostContext, KeyValueStore};

/// The store a [`PreferenceStore`] operates on, if any.
#[derive(Clone)]
pub enum StoreHandle {
    /// An opened store
    Active(Arc<dyn KeyValueStore>),
    /// No store could be opened; everything degrades to defaults
    Inactive,
}

impl StoreHandle {
    pub fn is_active(&self) -> bool {
        matches!(self, StoreHandle::Active(_))
    }
}

impl std::fmt::Debug for StoreHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreHandle::Active(store) => f.debug_tuple("Active").field(&store.name()).finish(),
            StoreHandle::Inactive => f.write_str("Inactive"),
        }
    }
}

/// Typed preferences over a named key-value store.
///
/// # Examples
///
/// ```
/// use prefstore::application::PreferenceStore;
/// use prefstore::domain::StoreConfig;
/// use prefstore::infrastructure::HostContext;
///
/// let context = HostContext::in_memory("com.example.app");
/// let prefs = PreferenceStore::new(Some(&context), StoreConfig::named("settings"));
///
/// prefs.put_int("launches", 3);
/// assert_eq!(prefs.get_int("launches"), 3);
/// assert_eq!(prefs.get_int_or("missing", 7), 7);
///
/// let detached = PreferenceStore::new(None, StoreConfig::default());
/// detached.put_int("launches", 3);
/// assert_eq!(detached.get_int("launches"), 0);
/// ```
#[derive(Debug)]
pub struct PreferenceStore<C: ObjectCodec = JsonCodec> {
    handle: StoreHandle,
    name: String,
    mode: AccessMode,
    codec: C,
}

impl PreferenceStore<JsonCodec> {
    /// Opens the store described by `config` with the default JSON codec.
    pub fn new(context: Option<&HostContext>, config: StoreConfig) -> Self {
        Self::with_codec(context, config, JsonCodec)
    }
}

impl<C: ObjectCodec> PreferenceStore<C> {
    /// Opens the store described by `config`, serializing objects with `codec`.
    ///
    /// Without a context the store is inactive. Otherwise an empty name
    /// resolves to the context's package name and a missing mode to
    /// [`AccessMode::Private`].
    pub fn with_codec(context: Option<&HostContext>, config: StoreConfig, codec: C) -> Self {
        let mode = config.resolved_mode();
        let Some(context) = context else {
            debug!(name = %config.name, "no host context; preferences store is inactive");
            return Self {
                handle: StoreHandle::Inactive,
                name: config.name,
                mode,
                codec,
            };
        };

        let name = config.resolved_name(context.package_name());
        let store = context.open_store(&name, mode);
        Self {
            handle: StoreHandle::Active(store),
            name,
            mode,
            codec,
        }
    }

    /// Wraps an already opened store.
    pub fn from_store(store: Arc<dyn KeyValueStore>, codec: C) -> Self {
        Self {
            name: store.name().to_string(),
            mode: store.mode(),
            handle: StoreHandle::Active(store),
            codec,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mode(&self) -> AccessMode {
        self.mode
    }

    pub fn is_active(&self) -> bool {
        self.handle.is_active()
    }

    pub fn handle(&self) -> &StoreHandle {
        &self.handle
    }

    /// The underlying store, if one was opened.
    pub fn backing_store(&self) -> Option<&Arc<dyn KeyValueStore>> {
        match &self.handle {
            StoreHandle::Active(store) => Some(store),
            StoreHandle::Inactive => None,
        }
    }

    /// Starts an edit transaction; discards its edits when inactive.
    pub fn edit(&self) -> Editor<'_> {
        match &self.handle {
            StoreHandle::Active(store) => store.edit(),
            StoreHandle::Inactive => Editor::discarding(),
        }
    }

    fn put(&self, key: &str, value: PreferenceValue) {
        if let StoreHandle::Active(store) = &self.handle {
            store.edit().put(key, value).apply();
        }
    }

    /// Reads `key` if it holds a value of `kind`.
    fn lookup(&self, key: &str, kind: ValueKind) -> Option<PreferenceValue> {
        let StoreHandle::Active(store) = &self.handle else {
            return None;
        };
        let value = store.get(key)?;
        if value.kind() == kind {
            Some(value)
        } else {
            warn!(
                store = %self.name,
                key = %key,
                expected = %kind,
                found = %value.kind(),
                "preference holds a different kind; returning default"
            );
            None
        }
    }

    pub fn put_string(&self, key: &str, value: impl Into<String>) {
        self.put(key, PreferenceValue::String(value.into()));
    }

    pub fn get_string_or(&self, key: &str, default: impl Into<String>) -> String {
        match self.lookup(key, ValueKind::String) {
            Some(PreferenceValue::String(value)) => value,
            _ => default.into(),
        }
    }

    /// Reads a string, or `""` when absent.
    pub fn get_string(&self, key: &str) -> String {
        self.get_string_or(key, String::new())
    }

    pub fn put_string_set(&self, key: &str, values: BTreeSet<String>) {
        self.put(key, PreferenceValue::StringSet(values));
    }

    pub fn get_string_set_or(&self, key: &str, default: BTreeSet<String>) -> BTreeSet<String> {
        match self.lookup(key, ValueKind::StringSet) {
            Some(PreferenceValue::StringSet(values)) => values,
            _ => default,
        }
    }

    /// Reads a string set, or an empty set when absent.
    pub fn get_string_set(&self, key: &str) -> BTreeSet<String> {
        self.get_string_set_or(key, BTreeSet::new())
    }

    pub fn put_int(&self, key: &str, value: i32) {
        self.put(key, PreferenceValue::Int(value));
    }

    pub fn get_int_or(&self, key: &str, default: i32) -> i32 {
        match self.lookup(key, ValueKind::Int) {
            Some(PreferenceValue::Int(value)) => value,
            _ => default,
        }
    }

    pub fn get_int(&self, key: &str) -> i32 {
        self.get_int_or(key, 0)
    }

    pub fn put_float(&self, key: &str, value: f32) {
        self.put(key, PreferenceValue::Float(value));
    }

    pub fn get_float_or(&self, key: &str, default: f32) -> f32 {
        match self.lookup(key, ValueKind::Float) {
            Some(PreferenceValue::Float(value)) => value,
            _ => default,
        }
    }

    pub fn get_float(&self, key: &str) -> f32 {
        self.get_float_or(key, 0.0)
    }

    pub fn put_long(&self, key: &str, value: i64) {
        self.put(key, PreferenceValue::Long(value));
    }

    pub fn get_long_or(&self, key: &str, default: i64) -> i64 {
        match self.lookup(key, ValueKind::Long) {
            Some(PreferenceValue::Long(value)) => value,
            _ => default,
        }
    }

    pub fn get_long(&self, key: &str) -> i64 {
        self.get_long_or(key, 0)
    }

    pub fn put_boolean(&self, key: &str, value: bool) {
        self.put(key, PreferenceValue::Boolean(value));
    }

    pub fn get_boolean_or(&self, key: &str, default: bool) -> bool {
        match self.lookup(key, ValueKind::Boolean) {
            Some(PreferenceValue::Boolean(value)) => value,
            _ => default,
        }
    }

    pub fn get_boolean(&self, key: &str) -> bool {
        self.get_boolean_or(key, false)
    }

    /// Stores `value` as JSON under `key`.
    ///
    /// Values that encode to `null`, such as `None`, are not stored.
    ///
    /// # Errors
    ///
    /// Returns [`PreferencesError::Encode`] if `value` cannot be serialized.
    pub fn put_object<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> PreferencesResult<()> {
        if !self.is_active() {
            return Ok(());
        }
        let encoded = self
            .codec
            .encode(value)
            .map_err(|source| PreferencesError::Encode {
                key: key.to_string(),
                source,
            })?;
        if let Some(json) = encoded {
            self.put_string(key, json);
        }
        Ok(())
    }

    /// Reads the object stored under `key`.
    ///
    /// Returns `Ok(None)` when the store is inactive, the key is absent or the
    /// stored text is JSON `null`.
    ///
    /// # Errors
    ///
    /// Returns [`PreferencesError::Decode`] if the stored text is not a valid
    /// encoding of `T`.
    pub fn get_object<T: DeserializeOwned>(&self, key: &str) -> PreferencesResult<Option<T>> {
        if !self.is_active() {
            return Ok(None);
        }
        let json = self.get_string(key);
        // An encoded null is an absent value, as on the write side.
        if json.is_empty() || json.trim() == "null" {
            return Ok(None);
        }
        self.codec
            .decode(&json)
            .map(Some)
            .map_err(|source| PreferencesError::Decode {
                key: key.to_string(),
                source,
            })
    }

    pub fn contains(&self, key: &str) -> bool {
        match &self.handle {
            StoreHandle::Active(store) => store.contains(key),
            StoreHandle::Inactive => false,
        }
    }

    pub fn remove(&self, key: &str) {
        if let StoreHandle::Active(store) = &self.handle {
            store.remove(key);
        }
    }

    pub fn clear(&self) {
        if let StoreHandle::Active(store) = &self.handle {
            store.clear();
        }
    }

    /// A snapshot of every entry; empty when inactive.
    pub fn all(&self) -> BTreeMap<String, PreferenceValue> {
        match &self.handle {
            StoreHandle::Active(store) => store.all(),
            StoreHandle::Inactive => BTreeMap::new(),
        }
    }

    /// Blocks until every applied write has been persisted.
    pub fn flush(&self) -> PreferencesResult<()> {
        match &self.handle {
            StoreHandle::Active(store) => store.flush(),
            StoreHandle::Inactive => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Person {
        name: String,
    }

    fn active_store() -> (HostContext, PreferenceStore) {
        let context = HostContext::in_memory("com.example.app");
        let prefs = PreferenceStore::new(Some(&context), StoreConfig::named("test"));
        (context, prefs)
    }

    fn set_of(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_put_then_get_each_kind() {
        let (_context, prefs) = active_store();

        prefs.put_string("string", "hello");
        prefs.put_string_set("set", set_of(&["a", "b"]));
        prefs.put_int("int", -12);
        prefs.put_float("float", 2.25);
        prefs.put_long("long", i64::MAX);
        prefs.put_boolean("bool", true);

        assert_eq!(prefs.get_string_or("string", "default"), "hello");
        assert_eq!(prefs.get_string_set_or("set", set_of(&["z"])), set_of(&["a", "b"]));
        assert_eq!(prefs.get_int_or("int", 99), -12);
        assert_eq!(prefs.get_float_or("float", 9.0), 2.25);
        assert_eq!(prefs.get_long_or("long", 1), i64::MAX);
        assert!(prefs.get_boolean_or("bool", false));
    }

    #[test]
    fn test_missing_keys_return_defaults() {
        let (_context, prefs) = active_store();

        assert_eq!(prefs.get_string_or("missing", "fallback"), "fallback");
        assert_eq!(prefs.get_string_set_or("missing", set_of(&["x"])), set_of(&["x"]));
        assert_eq!(prefs.get_int_or("missing", 5), 5);
        assert_eq!(prefs.get_float_or("missing", 1.5), 1.5);
        assert_eq!(prefs.get_long_or("missing", -3), -3);
        assert!(prefs.get_boolean_or("missing", true));

        assert_eq!(prefs.get_string("missing"), "");
        assert!(prefs.get_string_set("missing").is_empty());
        assert_eq!(prefs.get_int("missing"), 0);
        assert_eq!(prefs.get_float("missing"), 0.0);
        assert_eq!(prefs.get_long("missing"), 0);
        assert!(!prefs.get_boolean("missing"));
    }

    #[test]
    fn test_last_write_wins() {
        let (_context, prefs) = active_store();
        prefs.put_int("count", 1);
        prefs.put_int("count", 2);
        assert_eq!(prefs.get_int("count"), 2);
    }

    #[test]
    fn test_kind_mismatch_returns_default() {
        let (_context, prefs) = active_store();
        prefs.put_string("value", "text");

        assert_eq!(prefs.get_int_or("value", 4), 4);
        assert!(!prefs.get_boolean("value"));
        assert_eq!(prefs.get_string("value"), "text");
    }

    #[test]
    fn test_remove_and_contains() {
        let (_context, prefs) = active_store();
        prefs.put_boolean("flag", true);
        assert!(prefs.contains("flag"));

        prefs.remove("flag");
        assert!(!prefs.contains("flag"));
        assert!(prefs.get_boolean_or("flag", true));
    }

    #[test]
    fn test_clear_removes_everything() {
        let (_context, prefs) = active_store();
        prefs.put_int("a", 1);
        prefs.put_string("b", "two");
        prefs.put_object("c", &Person { name: "Alice".to_string() }).unwrap();

        prefs.clear();
        assert!(!prefs.contains("a"));
        assert!(!prefs.contains("b"));
        assert!(!prefs.contains("c"));
        assert!(prefs.all().is_empty());
    }

    #[test]
    fn test_object_round_trip() {
        let (_context, prefs) = active_store();
        let person = Person { name: "Alice".to_string() };

        prefs.put_object("person", &person).unwrap();
        let loaded: Option<Person> = prefs.get_object("person").unwrap();
        assert_eq!(loaded, Some(person));
        assert_eq!(prefs.get_string("person"), r#"{"name":"Alice"}"#);
    }

    #[test]
    fn test_absent_object_is_not_stored() {
        let (_context, prefs) = active_store();
        prefs.put_object("person", &None::<Person>).unwrap();
        assert!(!prefs.contains("person"));
    }

    #[test]
    fn test_missing_object_is_none() {
        let (_context, prefs) = active_store();
        let loaded: Option<Person> = prefs.get_object("person").unwrap();
        assert!(loaded.is_none());
    }

    #[test]
    fn test_stored_null_object_is_none() {
        let (_context, prefs) = active_store();
        prefs.put_string("person", "null");
        assert_eq!(prefs.get_object::<Person>("person").unwrap(), None);

        prefs.put_string("person", "  null\n");
        assert_eq!(prefs.get_object::<Person>("person").unwrap(), None);
    }

    #[test]
    fn test_malformed_object_is_decode_error() {
        let (_context, prefs) = active_store();
        prefs.put_string("person", "{\"name\": 42");

        let result = prefs.get_object::<Person>("person");
        match result {
            Err(PreferencesError::Decode { key, .. }) => assert_eq!(key, "person"),
            other => panic!("expected decode error, got {:?}", other),
        }
    }

    #[test]
    fn test_unencodable_object_is_encode_error() {
        let (_context, prefs) = active_store();
        let mut map = std::collections::HashMap::new();
        map.insert((1, 2), "tuple keys are not valid JSON object keys");

        let result = prefs.put_object("map", &map);
        assert!(matches!(result, Err(PreferencesError::Encode { .. })));
        assert!(!prefs.contains("map"));
    }

    #[test]
    fn test_inactive_store_degrades() {
        let prefs = PreferenceStore::new(None, StoreConfig::new("test", AccessMode::WorldReadable));
        assert!(!prefs.is_active());
        assert!(prefs.backing_store().is_none());
        assert!(matches!(prefs.handle(), StoreHandle::Inactive));

        prefs.put_string("s", "value");
        prefs.put_string_set("set", set_of(&["a"]));
        prefs.put_int("i", 1);
        prefs.put_float("f", 1.0);
        prefs.put_long("l", 1);
        prefs.put_boolean("b", true);
        prefs.put_object("o", &Person { name: "x".to_string() }).unwrap();
        prefs.remove("s");
        prefs.clear();
        prefs.edit().put_int("i", 2).apply();

        assert_eq!(prefs.get_string("s"), "");
        assert_eq!(prefs.get_string_or("s", "d"), "d");
        assert!(prefs.get_string_set("set").is_empty());
        assert_eq!(prefs.get_int_or("i", 7), 7);
        assert_eq!(prefs.get_float("f"), 0.0);
        assert_eq!(prefs.get_long_or("l", 9), 9);
        assert!(!prefs.get_boolean("b"));
        assert!(prefs.get_object::<Person>("o").unwrap().is_none());
        assert!(!prefs.contains("s"));
        assert!(prefs.all().is_empty());
        assert!(prefs.flush().is_ok());
    }

    #[test]
    fn test_name_and_mode_resolution() {
        let context = HostContext::in_memory("com.example.app");

        let prefs = PreferenceStore::new(Some(&context), StoreConfig::with_raw_mode("", 17));
        assert_eq!(prefs.name(), "com.example.app");
        assert_eq!(prefs.mode(), AccessMode::Private);

        let prefs = PreferenceStore::new(Some(&context), StoreConfig::new("named", AccessMode::WorldWritable));
        assert_eq!(prefs.name(), "named");
        assert_eq!(prefs.mode(), AccessMode::WorldWritable);
    }

    #[test]
    fn test_same_name_different_mode_shares_data() {
        let context = HostContext::in_memory("com.example.app");
        let private = PreferenceStore::new(Some(&context), StoreConfig::new("shared", AccessMode::Private));
        let readable = PreferenceStore::new(Some(&context), StoreConfig::new("shared", AccessMode::WorldReadable));

        private.put_long("timestamp", 1_700_000_000_000);
        assert_eq!(readable.get_long("timestamp"), 1_700_000_000_000);
    }

    #[test]
    fn test_edit_batches_writes() {
        let (_context, prefs) = active_store();
        prefs
            .edit()
            .put_int("a", 1)
            .put_string("b", "two")
            .commit()
            .unwrap();

        assert_eq!(prefs.get_int("a"), 1);
        assert_eq!(prefs.get_string("b"), "two");
        assert_eq!(prefs.all().len(), 2);
    }

    #[test]
    fn test_from_store() {
        let context = HostContext::in_memory("com.example");
        let store = context.open_store("raw", AccessMode::WorldReadable);
        let prefs = PreferenceStore::from_store(store, JsonCodec);

        assert_eq!(prefs.name(), "raw");
        assert_eq!(prefs.mode(), AccessMode::WorldReadable);
        prefs.put_int("x", 1);
        assert_eq!(prefs.backing_store().map(|s| s.contains("x")), Some(true));
    }
}
