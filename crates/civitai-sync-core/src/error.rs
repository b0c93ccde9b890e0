//! Error types for civitai-sync.
//!
//! A single error enum covers every failure the engine can produce. Per-file
//! failures are folded into [`ErrorKind`] for reporting; only failures to open
//! the target directory abort a run.

use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;

/// Main error type for the sync engine.
#[derive(Debug, Error)]
pub enum SyncError {
    // Network errors
    #[error("Network error: {message}")]
    Network {
        message: String,
        /// Optional cause description
        cause: Option<String>,
    },

    #[error("Request timeout: {0}")]
    Timeout(String),

    #[error("Rate limited by {service}, retry after {retry_after_secs:?} seconds")]
    RateLimited {
        service: String,
        retry_after_secs: Option<u64>,
    },

    #[error("Server error {status} from {url}")]
    Server { status: u16, url: String },

    #[error("Request to {url} rejected with status {status}")]
    RemoteClient { status: u16, url: String },

    #[error("Malformed response from {url}: {message}")]
    MalformedResponse { url: String, message: String },

    #[error("Gave up after {attempts} attempts: {last_error}")]
    RetriesExhausted { attempts: u32, last_error: String },

    // Local file errors
    #[error("Invalid model file {path}: {reason}")]
    InvalidFormat { path: PathBuf, reason: String },

    #[error("IO error at {path:?}: {message}")]
    Io {
        message: String,
        path: Option<PathBuf>,
        #[source]
        source: Option<std::io::Error>,
    },

    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Path is not a directory: {0}")]
    NotADirectory(PathBuf),

    // Serialization errors
    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    #[error("Invalid digest: {0}")]
    InvalidDigest(String),

    #[error("Sync cancelled")]
    Cancelled,

    // Generic errors
    #[error("{0}")]
    Other(String),
}

/// Result type alias for sync operations.
pub type Result<T> = std::result::Result<T, SyncError>;

/// Coarse failure taxonomy used in per-file outcomes and reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ErrorKind {
    /// File failed structural validation.
    InvalidFormat,
    /// The remote service has no match for the digest.
    NotFoundRemote,
    /// Transient failure that survived every retry.
    NetworkError,
    /// Non-retryable rejection or unusable response from the service.
    RemoteClientError,
    /// Writing the metadata or image file failed.
    PersistenceError,
    /// External cancellation.
    Interrupted,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorKind::InvalidFormat => "invalid format",
            ErrorKind::NotFoundRemote => "not found",
            ErrorKind::NetworkError => "network error",
            ErrorKind::RemoteClientError => "remote client error",
            ErrorKind::PersistenceError => "persistence error",
            ErrorKind::Interrupted => "interrupted",
        };
        f.write_str(name)
    }
}

impl From<std::io::Error> for SyncError {
    fn from(err: std::io::Error) -> Self {
        SyncError::Io {
            message: err.to_string(),
            path: None,
            source: Some(err),
        }
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::Json {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            SyncError::Timeout(err.to_string())
        } else {
            SyncError::Network {
                message: err.to_string(),
                cause: std::error::Error::source(&err).map(|s| s.to_string()),
            }
        }
    }
}

impl SyncError {
    /// Create an IO error with path context.
    pub fn io_with_path(err: std::io::Error, path: impl Into<PathBuf>) -> Self {
        SyncError::Io {
            message: err.to_string(),
            path: Some(path.into()),
            source: Some(err),
        }
    }

    /// Create an invalid-format error for a model file.
    pub fn invalid_format(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        SyncError::InvalidFormat {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Check if this error should trigger a retry.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SyncError::Network { .. }
                | SyncError::Timeout(_)
                | SyncError::RateLimited { .. }
                | SyncError::Server { .. }
        )
    }

    /// Classify this error for per-file reporting.
    pub fn kind(&self) -> ErrorKind {
        match self {
            SyncError::Network { .. }
            | SyncError::Timeout(_)
            | SyncError::RateLimited { .. }
            | SyncError::Server { .. }
            | SyncError::RetriesExhausted { .. } => ErrorKind::NetworkError,

            SyncError::RemoteClient { .. } | SyncError::MalformedResponse { .. } => {
                ErrorKind::RemoteClientError
            }

            SyncError::InvalidFormat { .. } | SyncError::InvalidDigest(_) => {
                ErrorKind::InvalidFormat
            }

            SyncError::Cancelled => ErrorKind::Interrupted,

            SyncError::Io { .. }
            | SyncError::FileNotFound(_)
            | SyncError::NotADirectory(_)
            | SyncError::Json { .. }
            | SyncError::Other(_) => ErrorKind::PersistenceError,
        }
    }
}
