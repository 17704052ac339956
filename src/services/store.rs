//! Key/value persistence
//!
//! Each collaborator owns one store, the way the device keeps one flash
//! namespace per subsystem. Writes may be buffered until `flush`.

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, warn};

/// Store errors
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    /// The backing store would not take the write (full, read-only)
    #[error("write refused: {0}")]
    Refused(String),
    #[error("missing key: {0}")]
    Missing(String),
}

/// String key/value store
pub trait KeyValueStore: Send {
    fn get(&self, key: &str) -> Option<String>;

    fn set(&mut self, key: &str, value: &str) -> Result<(), StoreError>;

    fn remove(&mut self, key: &str) -> Result<(), StoreError>;

    /// Remove every key
    fn clear(&mut self) -> Result<(), StoreError>;

    /// Make buffered writes durable
    fn flush(&mut self) -> Result<(), StoreError>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Integer value, `None` when absent or unparsable
    fn get_usize(&self, key: &str) -> Option<usize> {
        self.get(key).and_then(|value| value.parse().ok())
    }
}

#[derive(Debug, Default)]
struct MemoryInner {
    map: BTreeMap<String, String>,
    refuse: Option<String>,
    flushes: usize,
}

/// In-memory store. Clones share contents, so tests can inspect what
/// was persisted while a collaborator owns another handle.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<MemoryInner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Refuse every write with `reason` until `accept_writes`
    pub fn refuse_writes(&self, reason: &str) {
        self.lock().refuse = Some(reason.to_string());
    }

    pub fn accept_writes(&self) {
        self.lock().refuse = None;
    }

    /// Copy of everything stored
    pub fn entries(&self) -> BTreeMap<String, String> {
        self.lock().map.clone()
    }

    pub fn flush_count(&self) -> usize {
        self.lock().flushes
    }

    fn check(inner: &MemoryInner) -> Result<(), StoreError> {
        match &inner.refuse {
            Some(reason) => Err(StoreError::Refused(reason.clone())),
            None => Ok(()),
        }
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.lock().map.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut inner = self.lock();
        Self::check(&inner)?;
        inner.map.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), StoreError> {
        let mut inner = self.lock();
        Self::check(&inner)?;
        inner.map.remove(key);
        Ok(())
    }

    fn clear(&mut self) -> Result<(), StoreError> {
        let mut inner = self.lock();
        Self::check(&inner)?;
        inner.map.clear();
        Ok(())
    }

    fn flush(&mut self) -> Result<(), StoreError> {
        let mut inner = self.lock();
        Self::check(&inner)?;
        inner.flushes += 1;
        Ok(())
    }

    fn len(&self) -> usize {
        self.lock().map.len()
    }
}

/// Store backed by one JSON object on disk, rewritten on `flush`
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    map: BTreeMap<String, String>,
    dirty: bool,
}

impl JsonFileStore {
    /// Open `path`, starting empty if it does not exist yet
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let map = match std::fs::read_to_string(&path) {
            Ok(content) => serde_json::from_str(&content)?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };
        Ok(Self {
            path,
            map,
            dirty: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl KeyValueStore for JsonFileStore {
    fn get(&self, key: &str) -> Option<String> {
        self.map.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StoreError> {
        self.map.insert(key.to_string(), value.to_string());
        self.dirty = true;
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), StoreError> {
        if self.map.remove(key).is_some() {
            self.dirty = true;
        }
        Ok(())
    }

    fn clear(&mut self) -> Result<(), StoreError> {
        if !self.map.is_empty() {
            self.map.clear();
            self.dirty = true;
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<(), StoreError> {
        if !self.dirty {
            return Ok(());
        }
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        // Write-then-rename so a crash never leaves half a file
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_string_pretty(&self.map)?)?;
        std::fs::rename(&tmp, &self.path)?;
        self.dirty = false;
        debug!(path = %self.path.display(), keys = self.map.len(), "store flushed");
        Ok(())
    }

    fn len(&self) -> usize {
        self.map.len()
    }
}

/// Swap `next` in for `current` and persist it. If persisting fails the
/// previous list is restored and written back before the error returns.
pub(crate) fn commit_list<T, E>(
    current: &mut Vec<T>,
    next: Vec<T>,
    mut persist: impl FnMut(&[T]) -> Result<(), E>,
) -> Result<(), E>
where
    E: std::fmt::Display,
{
    let previous = std::mem::replace(current, next);
    match persist(current) {
        Ok(()) => Ok(()),
        Err(e) => {
            warn!(error = %e, "write refused, rolling back");
            *current = previous;
            if let Err(restore) = persist(current) {
                warn!(error = %restore, "rollback could not be persisted");
            }
            Err(e)
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_store_shared_and_refusing() {
        let store = MemoryStore::new();
        let mut handle = store.clone();
        handle.set("count", "2").unwrap();
        assert_eq!(store.get_usize("count"), Some(2));

        store.refuse_writes("flash full");
        assert!(matches!(handle.set("count", "3"), Err(StoreError::Refused(_))));
        assert_eq!(store.get("count").as_deref(), Some("2"));
        store.accept_writes();
        handle.remove("count").unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn test_json_store_persists_on_flush() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("servers.json");
        let mut store = JsonFileStore::open(&path).unwrap();
        store.set("s0_host", "example.org").unwrap();
        assert!(!path.exists());
        store.flush().unwrap();

        let reopened = JsonFileStore::open(&path).unwrap();
        assert_eq!(reopened.get("s0_host").as_deref(), Some("example.org"));
        assert_eq!(reopened.len(), 1);
    }

    #[test]
    fn test_json_store_rejects_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, "[1, 2").unwrap();
        assert!(matches!(JsonFileStore::open(&path), Err(StoreError::Json(_))));
    }

    #[test]
    fn test_commit_list_restores_previous() {
        let mut list = vec![1, 2];
        let mut attempts = 0;
        let result = commit_list(&mut list, vec![1, 2, 3], |_| {
            attempts += 1;
            Err(StoreError::Refused("full".into()))
        });
        assert!(result.is_err());
        assert_eq!(list, [1, 2]);
        assert_eq!(attempts, 2);
    }
}
