//! Signed-in session persistence.

use std::path::PathBuf;

use crate::error::{GysError, Result};

use super::SignedInSession;

// ============================================================================
// Session Store
// ============================================================================

/// Stores the current session as JSON at `~/.gyschat/session.json`.
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    pub fn new() -> Self {
        Self {
            path: crate::config::Config::dir().join("session.json"),
        }
    }

    /// Store at a custom path (for testing).
    pub fn with_path(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    /// Load the stored session, if any.
    pub fn load(&self) -> Result<Option<SignedInSession>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let raw = std::fs::read_to_string(&self.path).map_err(|e| {
            GysError::Config(format!("Failed to read session at {:?}: {}", self.path, e))
        })?;
        if raw.trim().is_empty() {
            return Ok(None);
        }
        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|e| GysError::Config(format!("Failed to parse session: {}", e)))
    }

    pub fn save(&self, session: &SignedInSession) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                GysError::Config(format!("Failed to create directory {:?}: {}", parent, e))
            })?;
        }
        let json = serde_json::to_string_pretty(session)?;
        std::fs::write(&self.path, json).map_err(|e| {
            GysError::Config(format!("Failed to write session at {:?}: {}", self.path, e))
        })?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let _ = std::fs::set_permissions(&self.path, std::fs::Permissions::from_mode(0o600));
        }
        Ok(())
    }

    /// Remove the stored session. Returns whether one existed.
    pub fn clear(&self) -> Result<bool> {
        if !self.path.exists() {
            return Ok(false);
        }
        std::fs::remove_file(&self.path)?;
        Ok(true)
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}
