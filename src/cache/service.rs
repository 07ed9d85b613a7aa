//! Process-wide cache service.
//!
//! Owns the storage substrate, one [`CacheStore`] per namespace and the
//! running [`Housekeeper`]. Build it once at session start, hand store
//! handles to consumers and call [`CacheService::shutdown`] at the end.

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::config::CacheConfig;
use crate::error::Result;

use super::housekeeper::{Housekeeper, HousekeeperHandle, SweepReport, DEFAULT_SWEEP_INTERVAL};
use super::storage::{FileStorage, MemoryStorage};
use super::store::{shared, CacheStore, Namespace, SharedStorage};

pub struct CacheService {
    chunks: CacheStore,
    images: CacheStore,
    suggestions: CacheStore,
    housekeeper: Option<Housekeeper>,
    running: Option<HousekeeperHandle>,
}

impl CacheService {
    /// Build the service from config without starting the housekeeper.
    ///
    /// Useful for one-shot commands that only read or write a few entries.
    pub fn open(config: &CacheConfig) -> Result<Self> {
        config.validate()?;
        let namespaces = [
            Namespace::chunks().with_ttl(config.chunk_ttl()),
            Namespace::images().with_ttl(config.image_ttl()),
            Namespace::suggestions().with_ttl(config.suggestion_ttl()),
        ];

        if !config.enabled {
            info!("Cache disabled by configuration");
            let [chunks, images, suggestions] = namespaces;
            return Ok(Self {
                chunks: CacheStore::disabled(chunks),
                images: CacheStore::disabled(images),
                suggestions: CacheStore::disabled(suggestions),
                housekeeper: None,
                running: None,
            });
        }

        let storage: SharedStorage = if config.persist {
            let path = config.storage_path();
            info!(path = %path.display(), "Using persistent cache storage");
            shared(FileStorage::open(path, config.quota_bytes)?)
        } else {
            shared(MemoryStorage::with_quota(config.quota_bytes))
        };

        Self::with_storage(storage, namespaces.to_vec(), config.sweep_interval())
    }

    /// Build the service and start the housekeeper. Requires a tokio runtime.
    pub fn start(config: &CacheConfig) -> Result<Self> {
        let mut service = Self::open(config)?;
        service.start_housekeeper();
        Ok(service)
    }

    /// Service over a fresh in-memory substrate with built-in namespaces.
    pub fn in_memory() -> Self {
        let storage = shared(MemoryStorage::new());
        Self {
            chunks: CacheStore::new(Arc::clone(&storage), Namespace::chunks()),
            images: CacheStore::new(Arc::clone(&storage), Namespace::images()),
            suggestions: CacheStore::new(Arc::clone(&storage), Namespace::suggestions()),
            housekeeper: Some(Housekeeper::builtin(storage, DEFAULT_SWEEP_INTERVAL)),
            running: None,
        }
    }

    /// Service over an arbitrary substrate.
    ///
    /// `namespaces` must hold exactly chunks, images and suggestions
    /// (in any order, custom TTLs allowed).
    pub fn with_storage(
        storage: SharedStorage,
        namespaces: Vec<Namespace>,
        sweep_interval: Duration,
    ) -> Result<Self> {
        let housekeeper = Housekeeper::new(Arc::clone(&storage), namespaces.clone(), sweep_interval)?;
        let store_for = |fallback: Namespace| {
            let ns = namespaces
                .iter()
                .find(|ns| ns.prefix() == fallback.prefix())
                .cloned()
                .unwrap_or(fallback);
            CacheStore::new(Arc::clone(&storage), ns)
        };
        Ok(Self {
            chunks: store_for(Namespace::chunks()),
            images: store_for(Namespace::images()),
            suggestions: store_for(Namespace::suggestions()),
            housekeeper: Some(housekeeper),
            running: None,
        })
    }

    /// Spawn the periodic sweep. No-op when disabled or already running.
    pub fn start_housekeeper(&mut self) {
        if self.running.is_some() {
            return;
        }
        if let Some(housekeeper) = &self.housekeeper {
            self.running = Some(housekeeper.clone().spawn());
        }
    }

    pub fn is_housekeeping(&self) -> bool {
        self.running.as_ref().is_some_and(|h| !h.is_finished())
    }

    pub fn chunks(&self) -> CacheStore {
        self.chunks.clone()
    }

    pub fn images(&self) -> CacheStore {
        self.images.clone()
    }

    pub fn suggestions(&self) -> CacheStore {
        self.suggestions.clone()
    }

    /// Store handle by namespace name (`chunks`, `images`, `suggestions`).
    pub fn store(&self, name: &str) -> Option<CacheStore> {
        [&self.chunks, &self.images, &self.suggestions]
            .into_iter()
            .find(|s| s.namespace().name() == name)
            .cloned()
    }

    /// Run one sweep on the calling thread.
    pub fn sweep_now(&self) -> SweepReport {
        self.housekeeper
            .as_ref()
            .map(Housekeeper::sweep)
            .unwrap_or_default()
    }

    /// Stop the housekeeper and wait for it to exit.
    pub async fn shutdown(mut self) {
        if let Some(handle) = self.running.take() {
            handle.stop().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::store::now_ms;
    use tempfile::TempDir;

    #[test]
    fn test_in_memory_stores_share_substrate() {
        let service = CacheService::in_memory();
        let expiry = now_ms() + 60_000;
        service.chunks().set("doc1", expiry, &"chunk");
        service.images().set("doc1", expiry, &"image");

        assert_eq!(service.chunks().get::<String>("doc1"), Some("chunk".into()));
        assert_eq!(
            service.store("images").unwrap().get::<String>("doc1"),
            Some("image".into())
        );
        assert!(service.store("videos").is_none());
    }

    #[test]
    fn test_sweep_now_removes_expired() {
        let service = CacheService::in_memory();
        service.suggestions().set("all", now_ms() - 10, &vec!["q"]);
        service.chunks().set("live", now_ms() + 60_000, &"x");

        let report = service.sweep_now();
        assert_eq!(report.removed, 1);
        assert_eq!(service.chunks().keys(), vec!["live".to_string()]);
    }

    #[test]
    fn test_disabled_service() {
        let config = CacheConfig {
            enabled: false,
            ..Default::default()
        };
        let service = CacheService::open(&config).unwrap();
        service.chunks().set("k", now_ms() + 60_000, &"v");
        assert_eq!(service.chunks().get::<String>("k"), None);
        assert_eq!(service.sweep_now(), SweepReport::default());
    }

    #[test]
    fn test_config_ttls_applied() {
        let config = CacheConfig {
            persist: false,
            image_ttl_secs: 90,
            ..Default::default()
        };
        let service = CacheService::open(&config).unwrap();
        assert_eq!(
            service.images().namespace().default_ttl(),
            Duration::from_secs(90)
        );
        assert_eq!(
            service.chunks().namespace().default_ttl(),
            Duration::from_secs(86_400)
        );
    }

    #[test]
    fn test_persistent_service_survives_restart() {
        let tmp = TempDir::new().unwrap();
        let config = CacheConfig {
            path: Some(tmp.path().join("storage.json")),
            ..Default::default()
        };

        let first = CacheService::open(&config).unwrap();
        first.chunks().set("doc", now_ms() + 60_000, &"persisted");
        drop(first);

        let second = CacheService::open(&config).unwrap();
        assert_eq!(
            second.chunks().get::<String>("doc"),
            Some("persisted".into())
        );
    }

    #[tokio::test]
    async fn test_start_and_shutdown() {
        let config = CacheConfig {
            persist: false,
            sweep_interval_secs: 1,
            ..Default::default()
        };
        let service = CacheService::start(&config).unwrap();
        service.chunks().set("old", now_ms() - 1, &"x");
        // first tick fires immediately but may precede the write; give the
        // next one time to run
        tokio::time::sleep(Duration::from_millis(1200)).await;
        assert!(service.is_housekeeping());
        assert!(service.chunks().keys().is_empty());
        service.shutdown().await;
    }
}
