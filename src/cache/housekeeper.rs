//! Periodic sweep of expired cache entries.
//!
//! Lazy eviction on read leaves behind entries nobody asks for again. The
//! housekeeper walks every key in the shared substrate on a fixed interval
//! and removes entries of known namespaces whose stamped expiry has passed,
//! plus anything under those prefixes that no longer parses.

use std::time::Duration;

use serde::de::IgnoredAny;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{GysError, Result};

use super::store::{lock_storage, now_ms, validate_namespaces, CacheEntry, Namespace, SharedStorage};

/// Default sweep interval.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Outcome of one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Keys inspected that belong to a known namespace.
    pub scanned: usize,
    /// Entries removed as expired or corrupt.
    pub removed: usize,
    /// Keys that could not be read or removed.
    pub errors: usize,
}

/// Background janitor for the shared cache substrate.
#[derive(Clone)]
pub struct Housekeeper {
    storage: SharedStorage,
    namespaces: Vec<Namespace>,
    interval: Duration,
}

impl Housekeeper {
    /// Create a housekeeper for `namespaces`.
    ///
    /// Fails if two prefixes overlap or the interval is zero.
    pub fn new(storage: SharedStorage, namespaces: Vec<Namespace>, interval: Duration) -> Result<Self> {
        validate_namespaces(&namespaces)?;
        if interval.is_zero() {
            return Err(GysError::Config(
                "Housekeeper interval must be greater than zero".into(),
            ));
        }
        Ok(Self {
            storage,
            namespaces,
            interval,
        })
    }

    /// Housekeeper over the built-in namespaces, which never overlap.
    pub(crate) fn builtin(storage: SharedStorage, interval: Duration) -> Self {
        Self {
            storage,
            namespaces: Namespace::builtin(),
            interval,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Run one sweep against the current clock.
    pub fn sweep(&self) -> SweepReport {
        self.sweep_at(now_ms())
    }

    /// Run one sweep treating `now_ms` as the current time.
    ///
    /// The storage lock is held for the whole sweep. The substrate is
    /// refreshed first so entries from other writers are seen. Expired and
    /// corrupt entries are collected during the scan and removed in one
    /// batch, which skips any key rewritten since it was read.
    pub fn sweep_at(&self, now_ms: i64) -> SweepReport {
        let mut report = SweepReport::default();
        let mut guard = lock_storage(&self.storage);
        if let Err(e) = guard.refresh() {
            warn!(error = %e, "Failed to refresh cache storage, skipping sweep");
            report.errors += 1;
            return report;
        }

        let total = guard.len();
        let mut marked = Vec::new();

        for index in 0..total {
            let Some(key) = guard.key(index) else {
                continue;
            };
            if !self.namespaces.iter().any(|ns| ns.owns(&key)) {
                continue;
            }
            report.scanned += 1;

            match guard.get_item(&key) {
                Ok(Some(raw)) => match serde_json::from_str::<CacheEntry<IgnoredAny>>(&raw) {
                    Ok(entry) if entry.is_valid_at(now_ms) => {}
                    Ok(_) => marked.push((key, raw)),
                    Err(e) => {
                        debug!(key = %key, error = %e, "Invalid cache entry, marking for removal");
                        marked.push((key, raw));
                    }
                },
                Ok(None) => {}
                Err(e) => {
                    warn!(key = %key, error = %e, "Failed to inspect cache entry");
                    report.errors += 1;
                }
            }
        }

        if !marked.is_empty() {
            match guard.remove_items(&marked) {
                Ok(removed) => report.removed = removed,
                Err(e) => {
                    warn!(count = marked.len(), error = %e, "Failed to remove expired cache entries");
                    report.errors += marked.len();
                }
            }
        }

        if report.removed > 0 {
            info!(
                removed = report.removed,
                scanned = report.scanned,
                "Purged expired cache entries"
            );
        }
        report
    }

    /// Run sweeps until `shutdown_rx` signals `true`.
    ///
    /// The first sweep runs immediately. Sweeps execute on the blocking pool
    /// and are awaited one at a time, so they never overlap.
    pub fn start(self, mut shutdown_rx: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!(
                interval_secs = self.interval.as_secs_f64(),
                namespaces = self.namespaces.len(),
                "Cache housekeeper started"
            );
            let mut interval = tokio::time::interval(self.interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        let housekeeper = self.clone();
                        if let Err(e) = tokio::task::spawn_blocking(move || housekeeper.sweep()).await {
                            warn!(error = %e, "Cache sweep task failed");
                        }
                    }
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            info!("Cache housekeeper stopping");
                            break;
                        }
                    }
                }
            }
        })
    }

    /// Start the housekeeper and return a handle that owns its shutdown signal.
    pub fn spawn(self) -> HousekeeperHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = self.start(shutdown_rx);
        HousekeeperHandle {
            shutdown_tx,
            handle,
        }
    }
}

/// Running housekeeper. Dropping the handle also stops the task at its next
/// wakeup, because the shutdown sender closes.
pub struct HousekeeperHandle {
    shutdown_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl HousekeeperHandle {
    /// Signal shutdown and wait for the task to exit.
    pub async fn stop(self) {
        let _ = self.shutdown_tx.send(true);
        if let Err(e) = self.handle.await {
            warn!(error = %e, "Cache housekeeper task ended abnormally");
        }
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::storage::{
        FileStorage, MemoryStorage, MockStorage, Storage, DEFAULT_QUOTA_BYTES,
    };
    use crate::cache::store::{shared, CacheStore};

    fn setup() -> (SharedStorage, Housekeeper) {
        let storage = shared(MemoryStorage::new());
        let housekeeper =
            Housekeeper::new(storage.clone(), Namespace::builtin(), Duration::from_millis(20))
                .unwrap();
        (storage, housekeeper)
    }

    #[test]
    fn test_sweep_removes_exactly_expired_entries() {
        let (storage, housekeeper) = setup();
        let chunks = CacheStore::new(storage.clone(), Namespace::chunks());
        let now = 1_000_000;

        for i in 0..10 {
            // even ids expired, odd ids live
            let expiry = if i % 2 == 0 { now - i } else { now + 1 + i };
            chunks.set(&format!("doc{i}"), expiry, &format!("content {i}"));
        }

        let report = housekeeper.sweep_at(now);
        assert_eq!(report.scanned, 10);
        assert_eq!(report.removed, 5);
        assert_eq!(report.errors, 0);

        let mut keys = chunks.keys();
        keys.sort();
        assert_eq!(keys, vec!["doc1", "doc3", "doc5", "doc7", "doc9"]);

        let survivor: CacheEntry<String> = serde_json::from_str(
            &lock_storage(&storage)
                .get_item("chunk_cache_doc3")
                .unwrap()
                .unwrap(),
        )
        .unwrap();
        assert_eq!(survivor.data, "content 3");
        assert_eq!(survivor.expiry, now + 4);
    }

    #[test]
    fn test_sweep_uses_each_entrys_own_expiry() {
        let (storage, housekeeper) = setup();
        let chunks = CacheStore::new(storage.clone(), Namespace::chunks());
        let images = CacheStore::new(storage.clone(), Namespace::images());
        let now = 5_000;

        // An image entry stamped far in the future survives even though the
        // image namespace default TTL is shorter than the chunk one.
        images.set("long", now + 10_000_000, &"img");
        chunks.set("short", now - 1, &"chunk");

        let report = housekeeper.sweep_at(now);
        assert_eq!(report.removed, 1);
        assert_eq!(images.get_at::<String>("long", now), Some("img".into()));
        assert!(chunks.keys().is_empty());
    }

    #[test]
    fn test_sweep_removes_corrupt_entries() {
        let (storage, housekeeper) = setup();
        {
            let mut guard = lock_storage(&storage);
            guard.set_item("image_cache_bad", "garbage").unwrap();
            guard
                .set_item("image_cache_legacy", r#"{"timestamp": 1}"#)
                .unwrap();
        }
        let report = housekeeper.sweep_at(0);
        assert_eq!(report.removed, 2);
        assert!(lock_storage(&storage).is_empty());
    }

    #[test]
    fn test_sweep_ignores_foreign_keys() {
        let (storage, housekeeper) = setup();
        {
            let mut guard = lock_storage(&storage);
            guard.set_item("theme", "dark").unwrap();
            guard
                .set_item("other_app_key", r#"{"data":1,"expiry":0}"#)
                .unwrap();
        }
        let report = housekeeper.sweep_at(i64::MAX);
        assert_eq!(report.scanned, 0);
        assert_eq!(report.removed, 0);
        assert_eq!(lock_storage(&storage).len(), 2);
    }

    #[test]
    fn test_sweep_continues_after_read_error() {
        let mut mock = MockStorage::new();
        mock.expect_len().return_const(3usize);
        mock.expect_key().returning(|i| {
            Some(match i {
                0 => "chunk_cache_a".to_string(),
                1 => "chunk_cache_b".to_string(),
                _ => "chunk_cache_c".to_string(),
            })
        });
        mock.expect_get_item().returning(|key: &str| match key {
            "chunk_cache_a" => Err(GysError::Storage("unreadable".into())),
            "chunk_cache_b" => Ok(Some(r#"{"data":"b","expiry":10}"#.to_string())),
            _ => Ok(Some(r#"{"data":"c","expiry":99999}"#.to_string())),
        });
        mock.expect_refresh().returning(|| Ok(()));
        mock.expect_remove_items()
            .withf(|items: &[(String, String)]| items.len() == 1 && items[0].0 == "chunk_cache_b")
            .times(1)
            .returning(|items: &[(String, String)]| Ok(items.len()));

        let housekeeper =
            Housekeeper::new(shared(mock), Namespace::builtin(), Duration::from_secs(1)).unwrap();
        let report = housekeeper.sweep_at(100);
        assert_eq!(
            report,
            SweepReport {
                scanned: 3,
                removed: 1,
                errors: 1
            }
        );
    }

    #[test]
    fn test_sweep_counts_remove_failures() {
        let mut mock = MockStorage::new();
        mock.expect_len().return_const(1usize);
        mock.expect_key()
            .returning(|_| Some("image_cache_x".to_string()));
        mock.expect_get_item()
            .returning(|_| Ok(Some(r#"{"data":"x","expiry":1}"#.to_string())));
        mock.expect_refresh().returning(|| Ok(()));
        mock.expect_remove_items()
            .returning(|_| Err(GysError::Storage("locked".into())));

        let housekeeper =
            Housekeeper::new(shared(mock), Namespace::builtin(), Duration::from_secs(1)).unwrap();
        let report = housekeeper.sweep_at(100);
        assert_eq!(report.removed, 0);
        assert_eq!(report.errors, 1);
    }

    #[test]
    fn test_sweep_removes_in_one_batch() {
        let mut mock = MockStorage::new();
        mock.expect_refresh().times(1).returning(|| Ok(()));
        mock.expect_len().return_const(3usize);
        mock.expect_key()
            .returning(|i| Some(format!("image_cache_{i}")));
        mock.expect_get_item()
            .returning(|_| Ok(Some(r#"{"data":"x","expiry":1}"#.to_string())));
        mock.expect_remove_item().never();
        mock.expect_remove_items()
            .withf(|items: &[(String, String)]| items.len() == 3)
            .times(1)
            .returning(|items: &[(String, String)]| Ok(items.len()));

        let housekeeper =
            Housekeeper::new(shared(mock), Namespace::builtin(), Duration::from_secs(1)).unwrap();
        let report = housekeeper.sweep_at(100);
        assert_eq!(report.removed, 3);
        assert_eq!(report.errors, 0);
    }

    #[test]
    fn test_sweep_skips_when_refresh_fails() {
        let mut mock = MockStorage::new();
        mock.expect_refresh()
            .returning(|| Err(GysError::Storage("unreadable".into())));
        mock.expect_len().never();
        mock.expect_remove_items().never();

        let housekeeper =
            Housekeeper::new(shared(mock), Namespace::builtin(), Duration::from_secs(1)).unwrap();
        let report = housekeeper.sweep_at(100);
        assert_eq!(report.errors, 1);
        assert_eq!(report.removed, 0);
    }

    #[test]
    fn test_sweep_sees_entries_from_other_writers() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("storage.json");
        let now = now_ms();

        let ours = shared(FileStorage::open(&path, DEFAULT_QUOTA_BYTES).unwrap());
        CacheStore::new(ours.clone(), Namespace::chunks()).set("old", now - 1, &"stale");

        // a second handle on the same file, as another process would have
        let theirs = shared(FileStorage::open(&path, DEFAULT_QUOTA_BYTES).unwrap());
        let their_chunks = CacheStore::new(theirs.clone(), Namespace::chunks());
        their_chunks.set("doc1", now + 3_600_000, &"live");
        CacheStore::new(theirs.clone(), Namespace::images()).set("gone", now - 1, &"img");

        let housekeeper =
            Housekeeper::new(ours, Namespace::builtin(), Duration::from_secs(1)).unwrap();
        let report = housekeeper.sweep_at(now);
        assert_eq!(
            report,
            SweepReport {
                scanned: 3,
                removed: 2,
                errors: 0
            }
        );

        assert_eq!(their_chunks.get::<String>("doc1"), Some("live".to_string()));
        let reopened = FileStorage::open(&path, DEFAULT_QUOTA_BYTES).unwrap();
        assert_eq!(reopened.len(), 1);
        assert!(reopened.get_item("chunk_cache_doc1").unwrap().is_some());
    }

    #[test]
    fn test_rejects_zero_interval() {
        let storage = shared(MemoryStorage::new());
        assert!(Housekeeper::new(storage, Namespace::builtin(), Duration::ZERO).is_err());
    }

    #[tokio::test]
    async fn test_background_sweep_and_stop() {
        let (storage, housekeeper) = setup();
        let chunks = CacheStore::new(storage.clone(), Namespace::chunks());
        chunks.set("expired", now_ms() - 1, &"x");
        chunks.set("live", now_ms() + 60_000, &"y");

        let handle = housekeeper.spawn();
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(chunks.keys(), vec!["live".to_string()]);
        handle.stop().await;
    }

    #[tokio::test]
    async fn test_stop_prevents_further_sweeps() {
        let (storage, housekeeper) = setup();
        let handle = housekeeper.spawn();
        handle.stop().await;

        lock_storage(&storage)
            .set_item("chunk_cache_late", r#"{"data":1,"expiry":0}"#)
            .unwrap();
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(lock_storage(&storage).len(), 1);
    }

    #[tokio::test]
    async fn test_start_with_external_shutdown() {
        let (_, housekeeper) = setup();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = housekeeper.start(shutdown_rx);
        tokio::time::sleep(Duration::from_millis(30)).await;
        let _ = shutdown_tx.send(true);
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
