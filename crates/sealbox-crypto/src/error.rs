//! Error types for cryptographic operations

use thiserror::Error;

/// Errors from primitive-adjacent cryptographic operations
#[derive(Debug, Error)]
pub enum CryptoError {
    /// Public key material is malformed (wrong length or not a valid point)
    #[error("invalid key material: {reason}")]
    InvalidKey {
        /// Reason the key material was rejected
        reason: String,
    },

    /// A signature did not verify against the claimed public key
    #[error("signature verification failed")]
    InvalidSignature,

    /// AEAD authentication tag mismatch (wrong key or tampered ciphertext)
    #[error("authentication failed")]
    AuthenticationFailed,

    /// Chain index would overflow
    #[error("chain index overflow at {current}")]
    IndexOverflow {
        /// Current index when overflow was detected
        current: u32,
    },
}
