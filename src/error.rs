//! Error types
//!
//! One enum per layer: the store, the live query operator, and the
//! application facade used by the CLI.

use thiserror::Error;

/// Errors raised at the store boundary.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Record is missing identity fields; never persisted.
    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    /// Persistence layer is unreachable or corrupted.
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Record serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<sled::Error> for StoreError {
    fn from(err: sled::Error) -> Self {
        StoreError::Unavailable(err.to_string())
    }
}

impl From<sled::transaction::TransactionError<StoreError>> for StoreError {
    fn from(err: sled::transaction::TransactionError<StoreError>) -> Self {
        match err {
            sled::transaction::TransactionError::Abort(inner) => inner,
            sled::transaction::TransactionError::Storage(e) => StoreError::from(e),
        }
    }
}

/// Errors delivered on a watch stream. The stream keeps running after one.
#[derive(Debug, Error)]
pub enum WatchError {
    #[error("Window recompute failed: {0}")]
    Store(#[from] StoreError),
}

/// Errors surfaced by the application facade and the CLI.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<config::ConfigError> for ApiError {
    fn from(err: config::ConfigError) -> Self {
        ApiError::ConfigError(err.to_string())
    }
}
