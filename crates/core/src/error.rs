//! Error types for corpusdb
//!
//! This module defines all error types used throughout the system.
//! We use `thiserror` for automatic `Display` and `Error` trait implementations.

use crate::types::RecordId;
use std::io;
use thiserror::Error;

/// Result type alias for corpus operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for the corpus store
#[derive(Debug, Error)]
pub enum Error {
    /// Vector dimension doesn't match the collection dimension
    #[error("Dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch {
        /// Dimension fixed at collection creation
        expected: usize,
        /// Dimension of the offending vector
        got: usize,
    },

    /// Collection with the given name was not found
    #[error("Collection not found: {name}")]
    CollectionNotFound {
        /// Collection name
        name: String,
    },

    /// Record with the given id was not found
    #[error("Record not found: {id}")]
    RecordNotFound {
        /// Record id
        id: RecordId,
    },

    /// Collection name is invalid
    #[error("Invalid collection name: {name} ({reason})")]
    InvalidCollectionName {
        /// The invalid name
        name: String,
        /// Reason why it's invalid
        reason: String,
    },

    /// Invalid argument (e.g. k == 0, dimension == 0)
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Embedding gateway failure (network, quota, parse)
    ///
    /// Surfaced to the caller as-is; the store does not retry.
    #[error("Embedding error: {0}")]
    Embedding(String),

    /// Underlying persistence failure
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Data corruption detected (WAL checksum mismatch, bad frame)
    #[error("Data corruption: {0}")]
    Corruption(String),

    /// I/O error (file operations)
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl Error {
    /// Check if this error indicates the record/collection was not found
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Error::CollectionNotFound { .. } | Error::RecordNotFound { .. }
        )
    }

    /// Check if this error is a validation error (caller bug, never transient)
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Error::DimensionMismatch { .. }
                | Error::InvalidCollectionName { .. }
                | Error::InvalidArgument(_)
        )
    }

    /// Shorthand for an invalid-argument error
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Error::InvalidArgument(msg.into())
    }
}
