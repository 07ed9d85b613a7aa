//! Namespaced, expiring key/value store.
//!
//! Entries are stored as JSON `{"data": …, "expiry": <epoch ms>}` under
//! `<namespace prefix><logical id>`. An entry is valid while `now < expiry`.
//! Reads evict expired or unparseable entries. Writes are best-effort: any
//! failure is logged and swallowed.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{GysError, Result};

use super::storage::Storage;

/// Key prefix for document chunk entries.
pub const CHUNK_PREFIX: &str = "chunk_cache_";
/// Key prefix for resolved image sources.
pub const IMAGE_PREFIX: &str = "image_cache_";
/// Key prefix for the suggestion list.
pub const SUGGESTION_PREFIX: &str = "suggestion_cache_";

/// Substrate handle shared by every store and the housekeeper.
pub type SharedStorage = Arc<Mutex<dyn Storage>>;

/// Wrap a storage implementation for sharing.
pub fn shared(storage: impl Storage + 'static) -> SharedStorage {
    Arc::new(Mutex::new(storage))
}

/// Lock the substrate. A poisoned lock still guards consistent data because
/// every storage call is a single atomic step, so recover it.
pub(crate) fn lock_storage(storage: &SharedStorage) -> MutexGuard<'_, dyn Storage + 'static> {
    storage.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Current wall-clock time in epoch milliseconds.
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Absolute expiry `ttl` from now.
pub fn expiry_from_now(ttl: Duration) -> i64 {
    let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
    now_ms().saturating_add(ttl_ms)
}

// ============================================================================
// Entry
// ============================================================================

/// One stored `{data, expiry}` pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry<T> {
    pub data: T,
    /// Epoch milliseconds after which the entry is invalid.
    pub expiry: i64,
}

impl<T> CacheEntry<T> {
    pub fn is_valid_at(&self, now_ms: i64) -> bool {
        now_ms < self.expiry
    }
}

// ============================================================================
// Namespace
// ============================================================================

/// A logical cache partition: a key prefix plus the TTL callers use by default.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Namespace {
    name: String,
    prefix: String,
    default_ttl: Duration,
}

impl Namespace {
    pub fn new(name: impl Into<String>, prefix: impl Into<String>, default_ttl: Duration) -> Self {
        Self {
            name: name.into(),
            prefix: prefix.into(),
            default_ttl,
        }
    }

    /// Document chunks, kept for one day.
    pub fn chunks() -> Self {
        Self::new("chunks", CHUNK_PREFIX, Duration::from_secs(24 * 60 * 60))
    }

    /// Resolved image sources, kept for 60 minutes.
    pub fn images() -> Self {
        Self::new("images", IMAGE_PREFIX, Duration::from_secs(60 * 60))
    }

    /// Suggestion list, kept for 10 minutes.
    pub fn suggestions() -> Self {
        Self::new("suggestions", SUGGESTION_PREFIX, Duration::from_secs(10 * 60))
    }

    /// Built-in namespaces.
    pub fn builtin() -> Vec<Self> {
        vec![Self::chunks(), Self::images(), Self::suggestions()]
    }

    /// Look up a built-in namespace by name.
    pub fn by_name(name: &str) -> Option<Self> {
        Self::builtin().into_iter().find(|ns| ns.name == name)
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Full storage key for a logical id.
    pub fn key(&self, id: &str) -> String {
        format!("{}{}", self.prefix, id)
    }

    /// Whether a storage key belongs to this namespace.
    pub fn owns(&self, storage_key: &str) -> bool {
        storage_key.starts_with(&self.prefix)
    }

    /// Logical id of a storage key owned by this namespace.
    pub fn logical_id<'a>(&self, storage_key: &'a str) -> Option<&'a str> {
        storage_key.strip_prefix(self.prefix.as_str())
    }

    /// Two namespaces overlap when either prefix is a prefix of the other.
    pub fn overlaps(&self, other: &Namespace) -> bool {
        self.prefix.starts_with(&other.prefix) || other.prefix.starts_with(&self.prefix)
    }
}

/// Reject empty prefixes and any pair of overlapping prefixes.
pub fn validate_namespaces(namespaces: &[Namespace]) -> Result<()> {
    for (i, ns) in namespaces.iter().enumerate() {
        if ns.prefix.is_empty() {
            return Err(GysError::Config(format!(
                "Namespace '{}' has an empty prefix",
                ns.name
            )));
        }
        for other in &namespaces[i + 1..] {
            if ns.overlaps(other) {
                return Err(GysError::Config(format!(
                    "Namespace prefixes overlap: '{}' ({}) and '{}' ({})",
                    ns.name, ns.prefix, other.name, other.prefix
                )));
            }
        }
    }
    Ok(())
}

// ============================================================================
// Store
// ============================================================================

/// Cloneable handle to one namespace of the shared cache.
#[derive(Clone)]
pub struct CacheStore {
    storage: Option<SharedStorage>,
    namespace: Namespace,
}

impl std::fmt::Debug for CacheStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheStore")
            .field("namespace", &self.namespace)
            .field("enabled", &self.is_enabled())
            .finish()
    }
}

impl CacheStore {
    pub fn new(storage: SharedStorage, namespace: Namespace) -> Self {
        Self {
            storage: Some(storage),
            namespace,
        }
    }

    /// A store that never hits and never writes.
    pub fn disabled(namespace: Namespace) -> Self {
        Self {
            storage: None,
            namespace,
        }
    }

    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    pub fn is_enabled(&self) -> bool {
        self.storage.is_some()
    }

    /// Persist `data` under `key` until `expiry` (epoch ms).
    ///
    /// Overwrites unconditionally. Serialization and storage failures are
    /// logged and swallowed.
    pub fn set<T: Serialize + ?Sized>(&self, key: &str, expiry: i64, data: &T) {
        let Some(storage) = &self.storage else {
            return;
        };
        let full_key = self.namespace.key(key);
        let raw = match serde_json::to_string(&CacheEntry { data, expiry }) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(key = %full_key, error = %e, "Failed to serialize cache entry");
                return;
            }
        };
        if let Err(e) = lock_storage(storage).set_item(&full_key, &raw) {
            warn!(key = %full_key, error = %e, "Failed to write cache entry");
        }
    }

    /// Persist `data` under `key` for `ttl` from now.
    pub fn set_with_ttl<T: Serialize + ?Sized>(&self, key: &str, ttl: Duration, data: &T) {
        self.set(key, expiry_from_now(ttl), data);
    }

    /// Return the cached value for `key`, or `None` on miss.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.get_at(key, now_ms())
    }

    /// [`get`](Self::get) against an explicit clock.
    pub fn get_at<T: DeserializeOwned>(&self, key: &str, now_ms: i64) -> Option<T> {
        let storage = self.storage.as_ref()?;
        let full_key = self.namespace.key(key);
        let mut guard = lock_storage(storage);

        if let Err(e) = guard.refresh() {
            warn!(key = %full_key, error = %e, "Failed to refresh cache storage");
            return None;
        }
        let raw = match guard.get_item(&full_key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                warn!(key = %full_key, error = %e, "Failed to read cache entry");
                return None;
            }
        };

        let reason = match serde_json::from_str::<CacheEntry<T>>(&raw) {
            Ok(entry) if entry.is_valid_at(now_ms) => return Some(entry.data),
            Ok(_) => {
                debug!(key = %full_key, "Cache entry expired, removing");
                "expired"
            }
            Err(e) => {
                warn!(key = %full_key, error = %e, "Cache entry is corrupt, removing");
                "corrupt"
            }
        };
        // Only evict the value we looked at; another writer may have replaced it.
        if let Err(e) = guard.remove_items(&[(full_key.clone(), raw)]) {
            warn!(key = %full_key, reason = reason, error = %e, "Failed to remove cache entry");
        }
        None
    }

    /// Delete one entry in this namespace.
    pub fn remove(&self, key: &str) {
        let Some(storage) = &self.storage else {
            return;
        };
        let full_key = self.namespace.key(key);
        if let Err(e) = lock_storage(storage).remove_item(&full_key) {
            warn!(key = %full_key, error = %e, "Failed to remove cache entry");
        }
    }

    /// Logical ids currently stored in this namespace, expired or not.
    pub fn keys(&self) -> Vec<String> {
        let Some(storage) = &self.storage else {
            return Vec::new();
        };
        let mut guard = lock_storage(storage);
        if let Err(e) = guard.refresh() {
            warn!(namespace = %self.namespace.name, error = %e, "Failed to refresh cache storage");
        }
        (0..guard.len())
            .filter_map(|i| guard.key(i))
            .filter_map(|k| self.namespace.logical_id(&k).map(str::to_string))
            .collect()
    }

    /// Remove every entry in this namespace. Returns how many were removed.
    pub fn clear(&self) -> usize {
        let Some(storage) = &self.storage else {
            return 0;
        };
        let mut guard = lock_storage(storage);
        if let Err(e) = guard.refresh() {
            warn!(namespace = %self.namespace.name, error = %e, "Failed to refresh cache storage");
        }
        let owned: Vec<(String, String)> = (0..guard.len())
            .filter_map(|i| guard.key(i))
            .filter(|k| self.namespace.owns(k))
            .filter_map(|k| match guard.get_item(&k) {
                Ok(Some(raw)) => Some((k, raw)),
                _ => None,
            })
            .collect();

        match guard.remove_items(&owned) {
            Ok(removed) => removed,
            Err(e) => {
                warn!(namespace = %self.namespace.name, error = %e, "Failed to clear cache namespace");
                0
            }
        }
    }
}
