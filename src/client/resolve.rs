//! Cache-aside resolvers for auxiliary backend data.
//!
//! Each resolver checks its cache namespace first, fetches from the
//! [`Backend`] on a miss, and stores the result with `expiry = now + ttl`.
//! Fetch errors go back to the caller and are never cached.

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::cache::{expiry_from_now, CacheService, CacheStore};
use crate::error::Result;

use super::{is_direct_source, Backend, ChunkData};

/// Cache key of the suggestion list.
const SUGGESTIONS_KEY: &str = "all";

/// Document chunk lookup.
#[derive(Clone)]
pub struct ChunkResolver {
    backend: Arc<dyn Backend>,
    cache: CacheStore,
    ttl: Duration,
}

impl ChunkResolver {
    /// Resolver using the namespace's default TTL.
    pub fn new(backend: Arc<dyn Backend>, cache: CacheStore) -> Self {
        let ttl = cache.namespace().default_ttl();
        Self {
            backend,
            cache,
            ttl,
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub async fn get(&self, id: &str) -> Result<ChunkData> {
        if let Some(hit) = self.cache.get::<ChunkData>(id) {
            debug!(id = id, "Chunk cache hit");
            return Ok(hit);
        }
        let data = self.backend.fetch_chunk(id).await?;
        self.cache.set(id, expiry_from_now(self.ttl), &data);
        Ok(data)
    }
}

/// Image source lookup.
#[derive(Clone)]
pub struct ImageResolver {
    backend: Arc<dyn Backend>,
    cache: CacheStore,
    ttl: Duration,
}

impl ImageResolver {
    pub fn new(backend: Arc<dyn Backend>, cache: CacheStore) -> Self {
        let ttl = cache.namespace().default_ttl();
        Self {
            backend,
            cache,
            ttl,
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Return a displayable source for `src`.
    ///
    /// Empty sources and sources that already carry a scheme or are `data:`
    /// URIs pass through untouched.
    pub async fn resolve(&self, src: &str) -> Result<String> {
        if src.is_empty() || is_direct_source(src) {
            return Ok(src.to_string());
        }
        if let Some(hit) = self.cache.get::<String>(src) {
            debug!(src = src, "Image source cache hit");
            return Ok(hit);
        }
        let resolved = self.backend.fetch_image_src(src).await?;
        self.cache.set(src, expiry_from_now(self.ttl), &resolved);
        Ok(resolved)
    }
}

/// Suggested questions lookup.
#[derive(Clone)]
pub struct SuggestionResolver {
    backend: Arc<dyn Backend>,
    cache: CacheStore,
    ttl: Duration,
}

impl SuggestionResolver {
    pub fn new(backend: Arc<dyn Backend>, cache: CacheStore) -> Self {
        let ttl = cache.namespace().default_ttl();
        Self {
            backend,
            cache,
            ttl,
        }
    }

    pub async fn get(&self) -> Result<Vec<String>> {
        if let Some(hit) = self.cache.get::<Vec<String>>(SUGGESTIONS_KEY) {
            return Ok(hit);
        }
        let suggestions = self.backend.fetch_suggestions().await?;
        self.cache
            .set(SUGGESTIONS_KEY, expiry_from_now(self.ttl), &suggestions);
        Ok(suggestions)
    }
}

/// All resolvers wired to one backend and one cache service.
#[derive(Clone)]
pub struct Resolvers {
    pub chunks: ChunkResolver,
    pub images: ImageResolver,
    pub suggestions: SuggestionResolver,
}

impl Resolvers {
    pub fn new(backend: Arc<dyn Backend>, cache: &CacheService) -> Self {
        Self {
            chunks: ChunkResolver::new(Arc::clone(&backend), cache.chunks()),
            images: ImageResolver::new(Arc::clone(&backend), cache.images()),
            suggestions: SuggestionResolver::new(backend, cache.suggestions()),
        }
    }
}
