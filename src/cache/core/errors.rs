//! Error types for the message cache.

use std::time::Duration;

use thiserror::Error;

/// Failures reported by the remote message source.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RemoteError {
    /// The source asked for a pause before the next request.
    #[error("rate limited, retry after {}s", retry_after.as_secs())]
    RateLimited {
        /// Requested pause.
        retry_after: Duration,
    },
    /// No valid remote session for the caller.
    #[error("not authorized")]
    NotAuthorized,
    /// Connection dropped or timed out; safe to retry.
    #[error("transient network error: {0}")]
    TransientNetwork(String),
    /// Any other failure the source considers final.
    #[error("remote failure: {0}")]
    Permanent(String),
}

/// Message cache engine error type.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Invalid configuration or unsupported values.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// Malformed request (inverted window, bad id, ...).
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    /// No valid remote session; not retried.
    #[error("not authorized against the remote source")]
    NotAuthorized,
    /// Remote backoff exceeded what the engine waits for on its own.
    #[error("rate limited by the remote source, retry after {}s", retry_after.as_secs())]
    RateLimited {
        /// Pause requested by the source.
        retry_after: Duration,
    },
    /// Network failure while talking to the remote source.
    #[error("transient network error: {0}")]
    TransientNetwork(String),
    /// Permanent remote failure.
    #[error("remote failure: {0}")]
    Remote(String),
    /// Stored rows could not be decoded.
    #[error("cache corrupted: {0}")]
    CacheCorrupted(String),
    /// `SQLite` storage error (sync).
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    /// `SQLite` storage error (async).
    #[error("tokio-rusqlite error: {0}")]
    TokioSqlite(#[from] tokio_rusqlite::Error),
    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    /// I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// Invalid compiled pattern.
    #[error("pattern error: {0}")]
    Pattern(#[from] regex::Error),
}

impl EngineError {
    /// Whether re-running the same request may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimited { .. } | Self::TransientNetwork(_))
    }

    /// Whether the error comes from the storage layer.
    #[must_use]
    pub const fn is_storage(&self) -> bool {
        matches!(self, Self::Sqlite(_) | Self::TokioSqlite(_) | Self::Io(_))
    }
}

impl From<RemoteError> for EngineError {
    fn from(err: RemoteError) -> Self {
        match err {
            RemoteError::RateLimited { retry_after } => Self::RateLimited { retry_after },
            RemoteError::NotAuthorized => Self::NotAuthorized,
            RemoteError::TransientNetwork(detail) => Self::TransientNetwork(detail),
            RemoteError::Permanent(detail) => Self::Remote(detail),
        }
    }
}

/// Convenience result alias for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;
