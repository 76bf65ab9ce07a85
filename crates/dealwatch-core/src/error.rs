//! Core error types for dealwatch-core.
//!
//! Nothing in the tracking engine is fatal to the host application. These
//! types describe what went wrong at a boundary (storage, configuration,
//! collaborators); the pollers catch them, log them and carry on.

use std::path::PathBuf;
use thiserror::Error;

/// Core error type for dealwatch-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Durable storage errors
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Failures reported by an external collaborator
    #[error("Collaborator error: {0}")]
    Collaborator(#[from] CollaboratorError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Durable key-value storage errors.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Failed to open the backing database
    #[error("Failed to open store at {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// Read or write failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Database is locked by another writer
    #[error("Store is locked")]
    Locked,

    /// Stored value could not be encoded or decoded
    #[error("Corrupt value under '{key}': {message}")]
    Corrupt { key: String, message: String },

    /// The background writer is gone
    #[error("Persistence writer stopped")]
    WriterClosed,
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to save configuration
    #[error("Failed to save configuration to {path}: {message}")]
    SaveFailed { path: PathBuf, message: String },

    /// Invalid configuration value
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// Unknown configuration key
    #[error("Unknown configuration key: {0}")]
    UnknownKey(String),

    /// Failed to parse configuration
    #[error("Failed to parse configuration: {0}")]
    ParseFailed(String),

    /// Data directory could not be resolved or created
    #[error("Data directory unavailable: {0}")]
    DataDir(String),
}

/// Errors surfaced by external collaborators (catalog, location, REST API).
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CollaboratorError {
    /// Transport-level failure (DNS, connect, timeout)
    #[error("Network error: {0}")]
    Network(String),

    /// Non-success HTTP status
    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    /// Response body did not match the expected shape
    #[error("Unexpected response: {0}")]
    Decode(String),

    /// The user has not granted the required permission
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// The capability is temporarily unavailable (e.g. no GPS fix)
    #[error("Unavailable: {0}")]
    Unavailable(String),
}

impl From<rusqlite::Error> for StorageError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(e, _msg) => {
                if e.code == rusqlite::ErrorCode::DatabaseBusy
                    || e.code == rusqlite::ErrorCode::DatabaseLocked
                {
                    StorageError::Locked
                } else {
                    StorageError::QueryFailed(err.to_string())
                }
            }
            _ => StorageError::QueryFailed(err.to_string()),
        }
    }
}

impl From<reqwest::Error> for CollaboratorError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            CollaboratorError::Decode(err.to_string())
        } else if let Some(status) = err.status() {
            CollaboratorError::Http {
                status: status.as_u16(),
                message: err.to_string(),
            }
        } else {
            CollaboratorError::Network(err.to_string())
        }
    }
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;
