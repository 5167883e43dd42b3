//! Shared key/value storage visible to every tab.
//!
//! Tabs have no channel to each other; the only thing they share is this store.
//! Values are plain strings (numbers are stored as decimal text) so the layout
//! matches what the web frontend keeps in browser local storage.
//!
//! Reads and writes are not atomic across keys. Callers must tolerate observing
//! a half-applied update from another tab.

use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use fd_lock::RwLock;
use tempfile::NamedTempFile;
use thiserror::Error;

/// Errors that can occur while reading or writing shared storage.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Backing file could not be read or written.
    #[error("storage I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// Backing file could not be encoded.
    #[error("storage encoding failed: {0}")]
    Encoding(#[from] serde_json::Error),
}

/// Convenient Result alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// String key/value store shared between tabs.
pub trait SharedStorage: Send + Sync {
    /// Reads a key. Missing keys are `Ok(None)`.
    fn get(&self, key: &str) -> StorageResult<Option<String>>;

    /// Writes a key, replacing any previous value.
    fn set(&self, key: &str, value: &str) -> StorageResult<()>;

    /// Removes a key. Removing a missing key is not an error.
    fn remove(&self, key: &str) -> StorageResult<()>;
}

// ─────────────────────────────────────────────────────────────────────────────
// In-memory storage
// ─────────────────────────────────────────────────────────────────────────────

/// In-memory storage. Clones share the same entries, so handing one clone to
/// each simulated tab models several tabs over one browser profile.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    entries: Arc<DashMap<String, String>>,
}

impl MemoryStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl SharedStorage for MemoryStorage {
    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        Ok(self.entries.get(key).map(|r| r.value().clone()))
    }

    fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> StorageResult<()> {
        self.entries.remove(key);
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// File-backed storage
// ─────────────────────────────────────────────────────────────────────────────

/// Storage persisted as a single JSON object file, shared by tab processes.
///
/// Every operation re-reads the file so writes from other processes are seen on
/// the next access. Writes hold an advisory lock on a sidecar `.lock` file for
/// the whole read-modify-write cycle, then land through a uniquely named temp
/// file renamed into place. Writers to different keys never drop each other's
/// values, and a reader never observes a torn file.
pub struct FileStorage {
    path: PathBuf,
    lock_path: PathBuf,
}

impl FileStorage {
    /// Opens (or lazily creates) the storage file at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let mut lock_path = path.clone().into_os_string();
        lock_path.push(".lock");
        Self {
            path,
            lock_path: lock_path.into(),
        }
    }

    /// Returns the backing file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn parent_dir(&self) -> &Path {
        match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        }
    }

    /// Loads the whole map. A missing file is empty; an unreadable one is
    /// treated as empty too, since another process will rewrite it shortly.
    fn load(&self) -> StorageResult<BTreeMap<String, String>> {
        match std::fs::read_to_string(&self.path) {
            Ok(contents) if contents.trim().is_empty() => Ok(BTreeMap::new()),
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(map) => Ok(map),
                Err(e) => {
                    log::warn!(
                        "[Storage] Ignoring unreadable storage file {}: {}",
                        self.path.display(),
                        e
                    );
                    Ok(BTreeMap::new())
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    fn save(&self, map: &BTreeMap<String, String>) -> StorageResult<()> {
        let mut temp = NamedTempFile::new_in(self.parent_dir())?;
        serde_json::to_writer_pretty(temp.as_file_mut(), map)?;
        temp.as_file_mut().flush()?;
        temp.persist(&self.path).map_err(|e| e.error)?;
        Ok(())
    }

    fn update(&self, apply: impl FnOnce(&mut BTreeMap<String, String>) -> bool) -> StorageResult<()> {
        std::fs::create_dir_all(self.parent_dir())?;
        let lock_file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&self.lock_path)?;
        let mut file_lock = RwLock::new(lock_file);
        let _held = file_lock.write()?;

        let mut map = self.load()?;
        if apply(&mut map) {
            self.save(&map)?;
        }
        Ok(())
    }
}

impl SharedStorage for FileStorage {
    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        Ok(self.load()?.remove(key))
    }

    fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        self.update(|map| {
            map.insert(key.to_string(), value.to_string());
            true
        })
    }

    fn remove(&self, key: &str) -> StorageResult<()> {
        self.update(|map| map.remove(key).is_some())
    }
}
