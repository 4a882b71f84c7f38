//! Encoding error types.
//!
//! Defines errors that can occur while encoding or decoding engine
//! structures:
//! - `Encode` / `Decode`: CBOR serialization failed
//! - `IncompatibleVersion`: blob written by a different engine version
//! - `KindMismatch`: blob holds a different kind of session state

use thiserror::Error;

use crate::blob::BlobKind;

/// Errors that can occur during message or blob encoding
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtoError {
    /// CBOR encoding failed
    #[error("encode error: {reason}")]
    Encode {
        /// Reason encoding failed
        reason: String,
    },

    /// CBOR decoding failed (truncated or malformed bytes)
    #[error("decode error: {reason}")]
    Decode {
        /// Reason decoding failed
        reason: String,
    },

    /// Blob was written by an incompatible engine version
    ///
    /// The store must surface this instead of misinterpreting the payload;
    /// the caller decides whether to migrate or discard the blob.
    #[error("incompatible blob version: found {found}, supported {supported}")]
    IncompatibleVersion {
        /// Version tag found in the blob
        found: u16,
        /// Version this engine supports
        supported: u16,
    },

    /// Blob holds a different kind of session state than requested
    #[error("blob kind mismatch: expected {expected:?}, found {found:?}")]
    KindMismatch {
        /// Kind the caller asked for
        expected: BlobKind,
        /// Kind recorded in the blob
        found: BlobKind,
    },
}
