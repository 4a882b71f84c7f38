//! Storage error types.
//!
//! Defines errors that can occur during session-store operations:
//! - `Io`: underlying persistence system errors
//! - `Serialization`: backend failed to encode/decode its own records
//!
//! These are the only errors a caller may blindly retry; the engine never
//! advances ratchet state before a save completes.

use thiserror::Error;

/// Errors that can occur during session-store operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// I/O error (file system, database, etc.)
    #[error("storage I/O error: {reason}")]
    Io {
        /// Description of the underlying failure
        reason: String,
    },

    /// Backend serialization or deserialization failed
    #[error("storage serialization error: {reason}")]
    Serialization {
        /// Description of the encoding failure
        reason: String,
    },
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        StoreError::Io { reason: err.to_string() }
    }
}
