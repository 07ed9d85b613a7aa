//! Error types for gyschat.
//!
//! Library code returns [`Result<T>`] with a [`GysError`]. The binary wraps
//! these in `anyhow` at command boundaries.

use thiserror::Error;

/// Crate-wide error type.
#[derive(Debug, Error)]
pub enum GysError {
    /// Invalid or unreadable configuration.
    #[error("Config error: {0}")]
    Config(String),

    /// Filesystem failure.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encode/decode failure.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The storage substrate refused a write because it is full.
    #[error("Storage quota exceeded: {0}")]
    QuotaExceeded(String),

    /// Any other storage substrate failure.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Transport-level HTTP failure.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The backend answered with a non-success status.
    #[error("Backend returned HTTP {status}: {body}")]
    Backend { status: u16, body: String },

    /// The auth endpoint rejected the access token.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Malformed chat inference stream.
    #[error("Stream error: {0}")]
    Stream(String),
}

/// Result alias used across the library.
pub type Result<T> = std::result::Result<T, GysError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_error_display() {
        let err = GysError::Backend {
            status: 404,
            body: "not found".into(),
        };
        assert_eq!(err.to_string(), "Backend returned HTTP 404: not found");
    }

    #[test]
    fn test_io_error_converts() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: GysError = io.into();
        assert!(matches!(err, GysError::Io(_)));
    }

    #[test]
    fn test_quota_error_display() {
        let err = GysError::QuotaExceeded("5242880 bytes".into());
        assert!(err.to_string().contains("quota"));
    }
}
