//! Core error types for focusroom-core.
//!
//! Errors are split by concern: persistence, configuration and session
//! transitions. [`CoreError`] wraps them all for callers that don't care.

use std::path::PathBuf;
use thiserror::Error;

use crate::session::SessionPhase;

/// Core error type for focusroom-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Store-related errors
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Rejected session transitions
    #[error("{0}")]
    Transition(#[from] TransitionError),

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

/// Persistence errors raised by a [`crate::store::SessionStore`].
#[derive(Error, Debug)]
pub enum StoreError {
    /// Failed to open the backing database
    #[error("Failed to open store at {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// Query execution failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Database is locked by another writer
    #[error("Store is locked")]
    Locked,

    /// A stored value could not be decoded
    #[error("Corrupt value under '{key}': {message}")]
    Corrupt { key: String, message: String },
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

    /// Key does not exist in the configuration tree
    #[error("Unknown configuration key: {0}")]
    UnknownKey(String),

    /// Invalid configuration value
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// Failed to parse configuration
    #[error("Failed to parse configuration: {0}")]
    ParseFailed(String),
}

/// Session transitions refused by the state machine.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransitionError {
    /// A session is already open; it must be stopped or completed first.
    #[error("a session is already active")]
    AlreadyActive,

    /// The action needs an active session and there is none.
    #[error("no active session")]
    NoActiveSession,

    /// The action is not valid from the current phase.
    #[error("cannot {action} while {from}")]
    InvalidTransition {
        from: SessionPhase,
        action: &'static str,
    },

    /// Planned duration out of range.
    #[error("invalid session length: {0} minutes (expected 1..=1440)")]
    InvalidDuration(u32),

    /// Boredom tag outside 1..=5.
    #[error("invalid boredom level: {0} (expected 1..=5)")]
    InvalidBoredomLevel(u8),
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(inner, _msg) => {
                if inner.code == rusqlite::ErrorCode::DatabaseLocked
                    || inner.code == rusqlite::ErrorCode::DatabaseBusy
                {
                    StoreError::Locked
                } else {
                    StoreError::QueryFailed(err.to_string())
                }
            }
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
