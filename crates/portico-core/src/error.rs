// crates/portico-core/src/error.rs

use thiserror::Error;

/// Domain-wide error type for Portico business logic and persistence.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PorticoError {
    /// Resource not found (or soft-deleted).
    #[error("Not found: {0}")]
    NotFound(String),

    /// A unique key (username, email) is already taken.
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// Caller supplied an invalid value.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Storage layer error (RocksDB, lock poisoning).
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for PorticoError {
    fn from(e: serde_json::Error) -> Self {
        PorticoError::Serialization(e.to_string())
    }
}
