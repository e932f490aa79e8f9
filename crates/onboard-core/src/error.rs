//! Core error types for onboard-core.
//!
//! Every fallible operation in the library returns [`CoreError`]. Store and
//! configuration failures keep their own enums so callers can tell a locked
//! database apart from a bad config value.

use std::path::PathBuf;
use thiserror::Error;

use crate::tour::TourState;

/// Core error type for onboard-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Persistent store errors
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The presentation collaborator failed to render a snippet
    #[error("Failed to present step {step}: {message}")]
    Presentation { step: u32, message: String },

    /// An event arrived in a state that does not accept it
    #[error("Cannot {operation} while tour is {state:?}")]
    InvalidTransition {
        operation: &'static str,
        state: TourState,
    },
}

/// Persistent store errors.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Failed to open the backing database
    #[error("Failed to open store at {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// Query or write failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Database is locked
    #[error("Database is locked")]
    Locked,

    /// A stored value did not decode into the expected type
    #[error("Value for '{key}' could not be decoded: {message}")]
    Decode { key: String, message: String },

    /// A value could not be encoded for storage
    #[error("Value for '{key}' could not be encoded: {message}")]
    Encode { key: String, message: String },

    /// Writes are rejected by the backend
    #[error("Store is read-only: {0}")]
    ReadOnly(String),
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

    /// Invalid configuration value
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// Unknown configuration key
    #[error("Unknown configuration key: {0}")]
    UnknownKey(String),

    /// No usable data directory
    #[error("Cannot resolve data directory: {0}")]
    DataDir(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(err, _msg) => match err.code {
                rusqlite::ErrorCode::DatabaseLocked | rusqlite::ErrorCode::DatabaseBusy => {
                    StoreError::Locked
                }
                rusqlite::ErrorCode::ReadOnly => StoreError::ReadOnly(err.to_string()),
                _ => StoreError::QueryFailed(err.to_string()),
            },
            _ => StoreError::QueryFailed(err.to_string()),
        }
    }
}

impl From<rusqlite::Error> for CoreError {
    fn from(err: rusqlite::Error) -> Self {
        CoreError::Store(err.into())
    }
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;
