//! Core error types for starpath-core.
//!
//! Nothing in this crate is fatal to the process: reward fetches degrade to
//! stock artwork, ledger writes are retried then logged, and a missing
//! lockout record is treated as unlocked. The types here cover the paths
//! that do propagate (storage, config, the raw HTTP call under the reward
//! fetcher) before a policy layer absorbs them.

use std::path::PathBuf;
use thiserror::Error;

/// Core error type for starpath-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Storage-related errors
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Reward-generation errors
    #[error("Reward error: {0}")]
    Reward(#[from] RewardError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic errors with context
    #[error("{0}")]
    Custom(String),
}

/// Storage-specific errors.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Failed to open the database file
    #[error("Failed to open database at {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// Query execution failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Database is locked by another writer; the operation may be retried
    #[error("Database is busy")]
    Busy,

    /// A stored document could not be decoded
    #[error("Corrupt document for '{key}': {message}")]
    CorruptDocument { key: String, message: String },
}

impl StorageError {
    /// Whether a transactional read-modify-write should retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StorageError::Busy)
    }
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to load configuration
    #[error("Failed to load configuration from {path}: {message}")]
    LoadFailed { path: PathBuf, message: String },

    /// Failed to save configuration
    #[error("Failed to save configuration to {path}: {message}")]
    SaveFailed { path: PathBuf, message: String },
}

/// Errors from the reward-generation HTTP call.
///
/// These never cross the engine boundary: the fetcher converts every one of
/// them into the task's stock artwork and a warning log.
#[derive(Error, Debug)]
pub enum RewardError {
    #[error("Reward request failed: {0}")]
    Request(String),

    #[error("Reward service returned HTTP {status}")]
    Status { status: u16 },

    #[error("Reward request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    #[error("No async runtime available: {0}")]
    Runtime(String),
}

impl From<rusqlite::Error> for StorageError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(e, _msg)
                if e.code == rusqlite::ErrorCode::DatabaseLocked
                    || e.code == rusqlite::ErrorCode::DatabaseBusy =>
            {
                StorageError::Busy
            }
            _ => StorageError::QueryFailed(err.to_string()),
        }
    }
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;
