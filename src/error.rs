// Error types for the item store and settings

use std::io;

/// Errors surfaced by [`crate::Store`] operations.
///
/// Every error is terminal for the attempted operation. The store is left in
/// its last committed state and no change notification is emitted.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("action item not found: {0}")]
    NotFound(String),

    #[error("invalid action item id: {0}")]
    InvalidId(String),

    #[error("persistence error: {0}")]
    Persistence(#[from] PersistenceError),
}

/// Failure of the underlying durable read or write.
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<io::Error> for StoreError {
    fn from(e: io::Error) -> Self {
        StoreError::Persistence(e.into())
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Persistence(e.into())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Persistence(e.into())
    }
}

pub type Result<T> = core::result::Result<T, StoreError>;

/// Errors from loading, saving or editing [`crate::Settings`].
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("invalid settings file: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("unknown setting: {0}")]
    UnknownKey(String),

    #[error("invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },
}
