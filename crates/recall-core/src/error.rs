//! Error types for recall-core

use thiserror::Error;

/// Result type alias using recall-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in recall-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// Database error
    #[error("Database error: {0}")]
    Database(String),

    /// libSQL error
    #[error("libSQL error: {0}")]
    LibSql(#[from] libsql::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Record not found
    #[error("Record not found: {0}")]
    NotFound(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Remote API error
    #[error(transparent)]
    Remote(#[from] crate::remote::RemoteError),

    /// A sync pass is already running in this process
    #[error("Sync already in progress")]
    SyncInProgress,

    /// Conflict was already resolved
    #[error("Conflict already resolved: {0}")]
    ConflictResolved(String),
}
