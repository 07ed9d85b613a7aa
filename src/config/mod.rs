//! Configuration for gyschat.
//!
//! Loaded from `~/.gyschat/config.json`, then overridden by environment
//! variables. Every section falls back to defaults field by field, so a
//! partial file is always valid.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::cache::storage::DEFAULT_QUOTA_BYTES;
use crate::error::{GysError, Result};

mod site;

pub use site::SiteConfig;

// ============================================================================
// Backend
// ============================================================================

/// Remote backend endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Base URL the `/api/...` paths are resolved against.
    pub base_url: String,
    /// Token validation endpoint. Unset means sign-in is unavailable.
    pub auth_url: Option<String>,
    /// Per-request timeout.
    pub timeout_secs: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000".to_string(),
            auth_url: None,
            timeout_secs: 30,
        }
    }
}

// ============================================================================
// Cache
// ============================================================================

/// Client-side cache settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// When false every lookup misses and nothing is written.
    pub enabled: bool,
    /// Persist entries to disk. When false the cache lives in memory only.
    pub persist: bool,
    /// Storage file. Defaults to `~/.gyschat/cache/storage.json`.
    pub path: Option<PathBuf>,
    /// Byte budget of the storage substrate.
    pub quota_bytes: usize,
    /// Housekeeper sweep interval.
    pub sweep_interval_secs: u64,
    /// TTL for document chunks.
    pub chunk_ttl_secs: u64,
    /// TTL for resolved image sources.
    pub image_ttl_secs: u64,
    /// TTL for the suggestion list.
    pub suggestion_ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            persist: true,
            path: None,
            quota_bytes: DEFAULT_QUOTA_BYTES,
            sweep_interval_secs: 60,
            chunk_ttl_secs: 24 * 60 * 60,
            image_ttl_secs: 60 * 60,
            suggestion_ttl_secs: 10 * 60,
        }
    }
}

impl CacheConfig {
    /// Resolved storage file path.
    pub fn storage_path(&self) -> PathBuf {
        self.path
            .clone()
            .unwrap_or_else(|| Config::dir().join("cache").join("storage.json"))
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn chunk_ttl(&self) -> Duration {
        Duration::from_secs(self.chunk_ttl_secs)
    }

    pub fn image_ttl(&self) -> Duration {
        Duration::from_secs(self.image_ttl_secs)
    }

    pub fn suggestion_ttl(&self) -> Duration {
        Duration::from_secs(self.suggestion_ttl_secs)
    }

    /// The sweep interval must be non-zero and shorter than every TTL.
    pub fn validate(&self) -> Result<()> {
        if self.sweep_interval_secs == 0 {
            return Err(GysError::Config(
                "cache.sweep_interval_secs must be greater than zero".into(),
            ));
        }
        let shortest = self
            .chunk_ttl_secs
            .min(self.image_ttl_secs)
            .min(self.suggestion_ttl_secs);
        if self.sweep_interval_secs >= shortest {
            return Err(GysError::Config(format!(
                "cache.sweep_interval_secs ({}) must be shorter than the shortest TTL ({}s)",
                self.sweep_interval_secs, shortest
            )));
        }
        Ok(())
    }
}

// ============================================================================
// Root config
// ============================================================================

/// Root configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub backend: BackendConfig,
    pub cache: CacheConfig,
    pub site: SiteConfig,
}

impl Config {
    /// Configuration directory (`~/.gyschat`).
    pub fn dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".gyschat")
    }

    /// Default config file path.
    pub fn path() -> PathBuf {
        Self::dir().join("config.json")
    }

    /// Load from the default path, apply env overrides and validate.
    pub fn load() -> Result<Self> {
        Self::load_from_path(&Self::path())
    }

    /// Load from `path` (missing file means defaults), apply env overrides
    /// and validate.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let mut config = match std::fs::read_to_string(path) {
            Ok(data) => serde_json::from_str::<Config>(&data).map_err(|e| {
                GysError::Config(format!("Failed to parse config at {:?}: {}", path, e))
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "No config file, using defaults");
                Config::default()
            }
            Err(e) => {
                return Err(GysError::Config(format!(
                    "Failed to read config at {:?}: {}",
                    path, e
                )))
            }
        };
        config.apply_env_overrides(|name| std::env::var(name).ok());
        config.cache.validate()?;
        Ok(config)
    }

    /// Apply overrides from an environment lookup.
    ///
    /// Takes the lookup as a function so tests do not touch process env.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("GYSCHAT_BASE_URL").filter(|v| !v.is_empty()) {
            self.backend.base_url = v;
        }
        if let Some(v) = lookup("GYS_AUTH_URL").filter(|v| !v.is_empty()) {
            self.backend.auth_url = Some(v);
        }
        if let Some(v) = lookup("GYSCHAT_CACHE_ENABLED") {
            self.cache.enabled = matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on");
        }
        if let Some(v) = lookup("GYSCHAT_CACHE_PATH").filter(|v| !v.is_empty()) {
            self.cache.path = Some(PathBuf::from(v));
        }
        if let Some(secs) = lookup("GYSCHAT_SWEEP_INTERVAL_SECS").and_then(|v| v.parse().ok()) {
            self.cache.sweep_interval_secs = secs;
        }
    }
}
