//! Named key-value stores and their file-backed implementation.
//!
//! A [`FileStore`] keeps every entry in memory and mirrors it to a JSON file.
//! Asynchronous writes are handed to one writer thread per store, so reads
//! never wait on disk.

use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Sender};
use std::sync::{Mutex, PoisonError, RwLock};
use std::thread::{self, JoinHandle};

use tracing::{debug, error, warn};

use crate::domain::{AccessMode, PreferenceValue, PreferencesError, PreferencesResult};
use super::editor::Editor;

/// A staged batch of edits.
///
/// A staged clear always runs before the staged puts and removes, whatever
/// order they were staged in.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Changes {
    clear: bool,
    operations: Vec<(String, Option<PreferenceValue>)>,
}

impl Changes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&mut self, key: impl Into<String>, value: impl Into<PreferenceValue>) -> &mut Self {
        self.operations.push((key.into(), Some(value.into())));
        self
    }

    pub fn remove(&mut self, key: impl Into<String>) -> &mut Self {
        self.operations.push((key.into(), None));
        self
    }

    pub fn clear(&mut self) -> &mut Self {
        self.clear = true;
        self
    }

    pub fn is_empty(&self) -> bool {
        !self.clear && self.operations.is_empty()
    }

    /// Applies the batch to `entries`, returning whether anything changed.
    pub fn apply_to(self, entries: &mut BTreeMap<String, PreferenceValue>) -> bool {
        let mut changed = false;
        if self.clear && !entries.is_empty() {
            entries.clear();
            changed = true;
        }
        for (key, value) in self.operations {
            match value {
                Some(value) => {
                    if entries.get(&key) != Some(&value) {
                        entries.insert(key, value);
                        changed = true;
                    }
                }
                None => {
                    if entries.remove(&key).is_some() {
                        changed = true;
                    }
                }
            }
        }
        changed
    }
}

/// A named key-value store.
///
/// Implementations must be safe to share between threads; callers add no
/// locking of their own.
pub trait KeyValueStore: Send + Sync {
    fn name(&self) -> &str;

    fn mode(&self) -> AccessMode;

    fn get(&self, key: &str) -> Option<PreferenceValue>;

    fn contains(&self, key: &str) -> bool;

    /// A snapshot of every entry.
    fn all(&self) -> BTreeMap<String, PreferenceValue>;

    /// Applies `changes` in memory and schedules persistence without waiting.
    ///
    /// Persistence failures are not reported to the caller.
    fn apply(&self, changes: Changes);

    /// Applies `changes` and waits until they are persisted.
    fn commit(&self, changes: Changes) -> PreferencesResult<()>;

    /// Waits for every previously applied change to be persisted.
    fn flush(&self) -> PreferencesResult<()>;

    fn remove(&self, key: &str) {
        let mut changes = Changes::new();
        changes.remove(key);
        self.apply(changes);
    }

    fn clear(&self) {
        let mut changes = Changes::new();
        changes.clear();
        self.apply(changes);
    }
}

impl dyn KeyValueStore + '_ {
    /// Starts an edit transaction on this store.
    pub fn edit(&self) -> Editor<'_> {
        Editor::new(self)
    }
}

type Entries = BTreeMap<String, PreferenceValue>;

enum WriteRequest {
    Persist(Entries),
    Flush(Sender<PreferencesResult<()>>),
}

struct Writer {
    sender: Sender<WriteRequest>,
    thread: JoinHandle<()>,
}

/// A store held in memory and, when given a path, mirrored to a JSON file.
pub struct FileStore {
    name: String,
    mode: AccessMode,
    path: Option<PathBuf>,
    entries: RwLock<Entries>,
    writer: Mutex<Option<Writer>>,
}

impl FileStore {
    /// Opens the store backed by `path`, loading any entries already there.
    ///
    /// A missing file yields an empty store. An unreadable or corrupt file is
    /// logged and also yields an empty store; it is replaced on the next write.
    pub fn open(name: impl Into<String>, mode: AccessMode, path: impl Into<PathBuf>) -> Self {
        let name = name.into();
        let path = path.into();
        let entries = load_entries(&path);
        debug!(store = %name, path = %path.display(), entries = entries.len(), "opened preferences store");

        let writer = spawn_writer(&name, mode, path.clone());
        Self {
            name,
            mode,
            path: Some(path),
            entries: RwLock::new(entries),
            writer: Mutex::new(writer),
        }
    }

    /// Creates a store that never touches disk.
    pub fn in_memory(name: impl Into<String>, mode: AccessMode) -> Self {
        Self {
            name: name.into(),
            mode,
            path: None,
            entries: RwLock::new(Entries::new()),
            writer: Mutex::new(None),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Applies `changes` in memory and queues a snapshot for the writer.
    ///
    /// The snapshot is queued while the entries lock is held so the writer
    /// sees snapshots in the same order the changes were made.
    fn apply_and_enqueue(&self, changes: Changes) -> PreferencesResult<bool> {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        if !changes.apply_to(&mut entries) {
            return Ok(false);
        }
        let Some(path) = &self.path else {
            return Ok(true);
        };

        let writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        let queued = writer
            .as_ref()
            .is_some_and(|w| w.sender.send(WriteRequest::Persist(entries.clone())).is_ok());
        if !queued {
            // No writer thread; persist inline instead.
            write_entries(path, self.mode, &entries)?;
        }
        Ok(true)
    }
}

impl KeyValueStore for FileStore {
    fn name(&self) -> &str {
        &self.name
    }

    fn mode(&self) -> AccessMode {
        self.mode
    }

    fn get(&self, key: &str) -> Option<PreferenceValue> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    fn contains(&self, key: &str) -> bool {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(key)
    }

    fn all(&self) -> BTreeMap<String, PreferenceValue> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn apply(&self, changes: Changes) {
        if let Err(e) = self.apply_and_enqueue(changes) {
            error!(store = %self.name, error = %e, "failed to persist preferences");
        }
    }

    fn commit(&self, changes: Changes) -> PreferencesResult<()> {
        if self.apply_and_enqueue(changes)? {
            debug!(store = %self.name, "committing preferences");
        }
        self.flush()
    }

    fn flush(&self) -> PreferencesResult<()> {
        let sender = self
            .writer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|w| w.sender.clone());
        let Some(sender) = sender else {
            return Ok(());
        };

        let (ack_tx, ack_rx) = mpsc::channel();
        sender
            .send(WriteRequest::Flush(ack_tx))
            .map_err(|_| PreferencesError::Persist(format!("writer for '{}' has stopped", self.name)))?;
        ack_rx
            .recv()
            .map_err(|_| PreferencesError::Persist(format!("writer for '{}' has stopped", self.name)))?
    }
}

impl Drop for FileStore {
    fn drop(&mut self) {
        let writer = self.writer.get_mut().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(Writer { sender, thread }) = writer {
            // Closing the channel lets the writer drain its queue and exit.
            drop(sender);
            if thread.join().is_err() {
                error!(store = %self.name, "preferences writer thread panicked");
            }
        }
    }
}

impl std::fmt::Debug for FileStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileStore")
            .field("name", &self.name)
            .field("mode", &self.mode)
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

fn spawn_writer(name: &str, mode: AccessMode, path: PathBuf) -> Option<Writer> {
    let (sender, receiver) = mpsc::channel::<WriteRequest>();
    let store = name.to_string();
    let spawned = thread::Builder::new()
        .name(format!("prefstore-{}", name))
        .spawn(move || {
            let mut last_error: Option<String> = None;
            for request in receiver {
                match request {
                    WriteRequest::Persist(entries) => match write_entries(&path, mode, &entries) {
                        Ok(()) => last_error = None,
                        Err(e) => {
                            error!(store = %store, error = %e, "failed to persist preferences");
                            last_error = Some(e.to_string());
                        }
                    },
                    WriteRequest::Flush(ack) => {
                        let result = match last_error.take() {
                            Some(message) => Err(PreferencesError::Persist(message)),
                            None => Ok(()),
                        };
                        let _ = ack.send(result);
                    }
                }
            }
        });

    match spawned {
        Ok(thread) => Some(Writer { sender, thread }),
        Err(e) => {
            warn!(store = %name, error = %e, "could not start writer thread; writes will be synchronous");
            None
        }
    }
}

fn load_entries(path: &Path) -> Entries {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => return Entries::new(),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "could not read preferences file; starting empty");
            return Entries::new();
        }
    };

    let raw = match serde_json::from_str::<BTreeMap<String, serde_json::Value>>(&content) {
        Ok(raw) => raw,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "invalid preferences file; starting empty");
            return Entries::new();
        }
    };

    raw.into_iter()
        .filter_map(|(key, value)| match serde_json::from_value::<PreferenceValue>(value) {
            Ok(value) => Some((key, value)),
            Err(e) => {
                warn!(path = %path.display(), key = %key, error = %e, "skipping unreadable preference");
                None
            }
        })
        .collect()
}

/// Writes `entries` to `path` through a temporary file and a rename.
fn write_entries(path: &Path, mode: AccessMode, entries: &Entries) -> PreferencesResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| PreferencesError::io(parent, e))?;
    }

    let json = serde_json::to_string_pretty(entries)
        .map_err(|e| PreferencesError::Persist(format!("Serialization failed: {}", e)))?;
    let tmp_path = path.with_extension("json.tmp");
    fs::write(&tmp_path, json).map_err(|e| PreferencesError::io(&tmp_path, e))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let permissions = fs::Permissions::from_mode(mode.file_permissions());
        fs::set_permissions(&tmp_path, permissions).map_err(|e| PreferencesError::io(&tmp_path, e))?;
    }
    #[cfg(not(unix))]
    let _ = mode;

    fs::rename(&tmp_path, path).map_err(|e| PreferencesError::io(path, e))
}
