//! Error types for medsync

use thiserror::Error;

/// Main error type for inventory operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InventoryError {
    /// Gateway unreachable or subscription dropped
    #[error("Transport error: {0}")]
    Transport(String),

    /// Gateway call did not complete in time
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Caller supplied an unusable argument (empty id, blank name)
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The store does not recognize the identifier
    #[error("Not found: {0}")]
    NotFound(String),

    /// Error reported by the local storage backend (redb)
    #[error("Storage error: {0}")]
    Storage(String),

    /// Error during serialization/deserialization
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// General I/O error
    #[error("IO error: {0}")]
    Io(String),

    /// Configuration file could not be read or parsed
    #[error("Config error: {0}")]
    Config(String),
}

impl InventoryError {
    /// Whether this error came from the gateway connection itself.
    ///
    /// Gateway errors on a live subscription trigger the sync engine's
    /// resubscription path; everything else is passed through to callers.
    pub fn is_gateway_error(&self) -> bool {
        matches!(self, InventoryError::Transport(_) | InventoryError::Timeout(_))
    }
}

// redb and std errors are not Clone, so they are flattened into strings.

impl From<std::io::Error> for InventoryError {
    fn from(err: std::io::Error) -> Self {
        InventoryError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for InventoryError {
    fn from(err: serde_json::Error) -> Self {
        InventoryError::Serialization(err.to_string())
    }
}

impl From<redb::DatabaseError> for InventoryError {
    fn from(err: redb::DatabaseError) -> Self {
        InventoryError::Storage(err.to_string())
    }
}

impl From<redb::TransactionError> for InventoryError {
    fn from(err: redb::TransactionError) -> Self {
        InventoryError::Storage(err.to_string())
    }
}

impl From<redb::TableError> for InventoryError {
    fn from(err: redb::TableError) -> Self {
        InventoryError::Storage(err.to_string())
    }
}

impl From<redb::StorageError> for InventoryError {
    fn from(err: redb::StorageError) -> Self {
        InventoryError::Storage(err.to_string())
    }
}

impl From<redb::CommitError> for InventoryError {
    fn from(err: redb::CommitError) -> Self {
        InventoryError::Storage(err.to_string())
    }
}

/// Result type alias using InventoryError
pub type InventoryResult<T> = Result<T, InventoryError>;
