//! Persistence substrate for the cache.
//!
//! A synchronous string-keyed store with indexed enumeration, modelled on
//! browser local storage: `get_item`, `set_item`, `remove_item`, `key(i)` and
//! `len()`. Writes can fail with [`GysError::QuotaExceeded`] when the byte
//! budget is exhausted.
//!
//! Two implementations are provided:
//! - [`MemoryStorage`] for tests and ephemeral sessions
//! - [`FileStorage`] which persists to a JSON file shared between processes

use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use tracing::{debug, warn};

use crate::error::{GysError, Result};

/// Default byte budget, in line with browser local storage.
pub const DEFAULT_QUOTA_BYTES: usize = 5 * 1024 * 1024;

/// Synchronous key/value substrate shared by every cache namespace.
#[cfg_attr(test, mockall::automock)]
pub trait Storage: Send {
    /// Return the raw value stored under `key`, if any.
    fn get_item(&self, key: &str) -> Result<Option<String>>;

    /// Store `value` under `key`, replacing any previous value.
    fn set_item(&mut self, key: &str, value: &str) -> Result<()>;

    /// Delete `key`. Removing a missing key is not an error.
    fn remove_item(&mut self, key: &str) -> Result<()>;

    /// Return the key at position `index` in enumeration order.
    fn key(&self, index: usize) -> Option<String>;

    /// Number of stored items.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Pick up changes made by other writers since the last access.
    fn refresh(&mut self) -> Result<()> {
        Ok(())
    }

    /// Remove every `(key, value)` pair whose key still holds exactly
    /// `value`, in one step. Keys rewritten in the meantime are left alone.
    /// Returns how many were removed.
    fn remove_items(&mut self, expected: &[(String, String)]) -> Result<usize> {
        let mut removed = 0;
        for (key, value) in expected {
            if self.get_item(key)?.as_deref() == Some(value.as_str()) {
                self.remove_item(key)?;
                removed += 1;
            }
        }
        Ok(removed)
    }
}

// ============================================================================
// Item map with quota accounting
// ============================================================================

#[derive(Debug, Default)]
struct ItemMap {
    items: BTreeMap<String, String>,
    used_bytes: usize,
    quota_bytes: Option<usize>,
}

impl ItemMap {
    fn with_items(items: BTreeMap<String, String>, quota_bytes: Option<usize>) -> Self {
        let used_bytes = items.iter().map(|(k, v)| k.len() + v.len()).sum();
        Self {
            items,
            used_bytes,
            quota_bytes,
        }
    }

    fn get(&self, key: &str) -> Option<String> {
        self.items.get(key).cloned()
    }

    /// Insert and return the replaced value so callers can roll back.
    fn insert(&mut self, key: &str, value: &str) -> Result<Option<String>> {
        let previous = self.items.get(key).map(|v| key.len() + v.len()).unwrap_or(0);
        let needed = self.used_bytes - previous + key.len() + value.len();
        if let Some(quota) = self.quota_bytes {
            if needed > quota {
                return Err(GysError::QuotaExceeded(format!(
                    "writing '{}' needs {} bytes, quota is {}",
                    key, needed, quota
                )));
            }
        }
        self.used_bytes = needed;
        Ok(self.items.insert(key.to_string(), value.to_string()))
    }

    fn remove(&mut self, key: &str) -> Option<String> {
        let removed = self.items.remove(key);
        if let Some(ref v) = removed {
            self.used_bytes -= key.len() + v.len();
        }
        removed
    }

    fn restore(&mut self, key: &str, previous: Option<String>) {
        self.remove(key);
        if let Some(v) = previous {
            self.used_bytes += key.len() + v.len();
            self.items.insert(key.to_string(), v);
        }
    }

    fn key(&self, index: usize) -> Option<String> {
        self.items.keys().nth(index).cloned()
    }

    fn len(&self) -> usize {
        self.items.len()
    }
}

// ============================================================================
// In-memory storage
// ============================================================================

/// Volatile storage. Unlimited unless a quota is set.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    map: ItemMap,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create storage that rejects writes beyond `quota_bytes`.
    pub fn with_quota(quota_bytes: usize) -> Self {
        Self {
            map: ItemMap::with_items(BTreeMap::new(), Some(quota_bytes)),
        }
    }

    /// Bytes currently accounted against the quota.
    pub fn used_bytes(&self) -> usize {
        self.map.used_bytes
    }
}

impl Storage for MemoryStorage {
    fn get_item(&self, key: &str) -> Result<Option<String>> {
        Ok(self.map.get(key))
    }

    fn set_item(&mut self, key: &str, value: &str) -> Result<()> {
        self.map.insert(key, value).map(|_| ())
    }

    fn remove_item(&mut self, key: &str) -> Result<()> {
        self.map.remove(key);
        Ok(())
    }

    fn key(&self, index: usize) -> Option<String> {
        self.map.key(index)
    }

    fn len(&self) -> usize {
        self.map.len()
    }
}

// ============================================================================
// File-backed storage
// ============================================================================

/// Durable storage persisted as a single JSON object.
///
/// Several processes may share one file. Every mutation takes an exclusive
/// advisory lock on a sidecar `<file>.lock`, re-reads the file, applies the
/// change and writes it back through a temp file and atomic rename, so
/// readers never see a half-written file. A failed flush rolls the change
/// back in memory. [`Storage::refresh`] reloads the file when its on-disk
/// stamp changed.
#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
    lock_path: PathBuf,
    quota_bytes: usize,
    map: ItemMap,
    stamp: Option<FileStamp>,
}

/// Identity of one version of the storage file.
#[derive(Debug, Clone, PartialEq, Eq)]
struct FileStamp {
    len: u64,
    modified: Option<SystemTime>,
    #[cfg(unix)]
    inode: u64,
}

impl FileStamp {
    /// `None` when the file does not exist.
    fn read(path: &Path) -> Result<Option<Self>> {
        match std::fs::metadata(path) {
            Ok(meta) => Ok(Some(Self {
                len: meta.len(),
                modified: meta.modified().ok(),
                #[cfg(unix)]
                inode: std::os::unix::fs::MetadataExt::ino(&meta),
            })),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(GysError::Storage(format!(
                "Failed to stat cache storage at {:?}: {}",
                path, e
            ))),
        }
    }
}

/// Exclusive advisory lock, released when dropped.
struct WriteLock {
    _file: File,
}

impl WriteLock {
    fn acquire(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(path)?;

        #[cfg(unix)]
        {
            use std::os::unix::io::AsRawFd;
            // SAFETY: the descriptor is owned by `file` and stays open for the
            // lifetime of the lock.
            let rc = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX) };
            if rc != 0 {
                return Err(GysError::Storage(format!(
                    "Failed to lock {:?}: {}",
                    path,
                    std::io::Error::last_os_error()
                )));
            }
        }

        Ok(Self { _file: file })
    }
}

impl FileStorage {
    /// Open (or lazily create) storage at `path`.
    ///
    /// A missing file starts empty. A corrupt file is logged and replaced on
    /// the next write.
    pub fn open(path: impl Into<PathBuf>, quota_bytes: usize) -> Result<Self> {
        let path = path.into();
        let mut lock_name = path.clone().into_os_string();
        lock_name.push(".lock");
        let mut storage = Self {
            lock_path: PathBuf::from(lock_name),
            path,
            quota_bytes,
            map: ItemMap::with_items(BTreeMap::new(), Some(quota_bytes)),
            stamp: None,
        };
        storage.reload()?;
        debug!(path = %storage.path.display(), items = storage.map.len(), "Opened cache storage");
        Ok(storage)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn reload(&mut self) -> Result<()> {
        // Stamp first: if the file changes while loading, the next refresh
        // sees a newer stamp and loads again.
        let stamp = FileStamp::read(&self.path)?;
        let items = Self::load_from_disk(&self.path)?;
        self.map = ItemMap::with_items(items, Some(self.quota_bytes));
        self.stamp = stamp;
        Ok(())
    }

    fn load_from_disk(path: &Path) -> Result<BTreeMap<String, String>> {
        match std::fs::read_to_string(path) {
            Ok(data) if data.trim().is_empty() => Ok(BTreeMap::new()),
            Ok(data) => match serde_json::from_str(&data) {
                Ok(items) => Ok(items),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Cache storage file is corrupt, starting empty");
                    Ok(BTreeMap::new())
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(GysError::Storage(format!(
                "Failed to read cache storage at {:?}: {}",
                path, e
            ))),
        }
    }

    /// Write the map to disk. Caller holds the write lock.
    fn flush(&mut self) -> Result<()> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir)?;

        let data = serde_json::to_vec(&self.map.items)?;
        let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
        tmp.write_all(&data)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| GysError::Io(e.error))?;
        // An unknown stamp forces a reload on the next refresh.
        self.stamp = FileStamp::read(&self.path).unwrap_or(None);
        Ok(())
    }
}

impl Storage for FileStorage {
    fn get_item(&self, key: &str) -> Result<Option<String>> {
        Ok(self.map.get(key))
    }

    fn set_item(&mut self, key: &str, value: &str) -> Result<()> {
        let _lock = WriteLock::acquire(&self.lock_path)?;
        self.reload()?;
        let previous = self.map.insert(key, value)?;
        if let Err(e) = self.flush() {
            self.map.restore(key, previous);
            return Err(e);
        }
        Ok(())
    }

    fn remove_item(&mut self, key: &str) -> Result<()> {
        let _lock = WriteLock::acquire(&self.lock_path)?;
        self.reload()?;
        let Some(previous) = self.map.remove(key) else {
            return Ok(());
        };
        if let Err(e) = self.flush() {
            self.map.restore(key, Some(previous));
            return Err(e);
        }
        Ok(())
    }

    fn key(&self, index: usize) -> Option<String> {
        self.map.key(index)
    }

    fn len(&self) -> usize {
        self.map.len()
    }

    fn refresh(&mut self) -> Result<()> {
        if FileStamp::read(&self.path)? != self.stamp {
            self.reload()?;
        }
        Ok(())
    }

    fn remove_items(&mut self, expected: &[(String, String)]) -> Result<usize> {
        if expected.is_empty() {
            return Ok(0);
        }
        let _lock = WriteLock::acquire(&self.lock_path)?;
        self.reload()?;

        let mut removed = Vec::new();
        for (key, value) in expected {
            if self.map.items.get(key) == Some(value) {
                if let Some(previous) = self.map.remove(key) {
                    removed.push((key.clone(), previous));
                }
            }
        }
        if removed.is_empty() {
            return Ok(0);
        }
        if let Err(e) = self.flush() {
            for (key, previous) in removed {
                self.map.restore(&key, Some(previous));
            }
            return Err(e);
        }
        Ok(removed.len())
    }
}
