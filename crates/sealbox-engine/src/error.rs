//! Engine error taxonomy.
//!
//! All cryptographic validation failures are surfaced to the caller verbatim
//! with their kind; the engine never attempts silent recovery, because
//! re-deriving or guessing a key could reintroduce replay or key-reuse
//! vulnerabilities. Only storage failures are retryable: if a save never
//! completed, no cryptographic state was corrupted.

use thiserror::Error;

use sealbox_crypto::CryptoError;
use sealbox_proto::ProtoError;

use crate::{ids::DeviceId, store::StoreError};

/// Errors surfaced by the session engine
#[derive(Debug, Error)]
pub enum EngineError {
    /// Remote key material is malformed or its signature does not verify
    ///
    /// Permanent: do not retry with the same input.
    #[error("invalid remote key: {reason}")]
    InvalidRemoteKey {
        /// Reason the key material was rejected
        reason: String,
    },

    /// Referenced prekey was already consumed or never existed
    ///
    /// Permanent for this handshake; the sender must restart from a fresh
    /// key bundle.
    #[error("unknown prekey: {id}")]
    UnknownPrekey {
        /// Prekey id the message referenced
        id: u32,
    },

    /// Authentication tag mismatch (wrong key, wrong header, or tampering)
    ///
    /// Permanent for this specific message.
    #[error("authentication failed")]
    AuthenticationFailed,

    /// Message index was already consumed
    ///
    /// Always permanent; must never be treated as success.
    #[error("replayed message at index {index}")]
    ReplayedMessage {
        /// Index that was already consumed
        index: u32,
    },

    /// Gap to the referenced index exceeds the configured skip bound
    ///
    /// The caller decides whether to drop the message or request
    /// retransmission; the engine never fabricates a key.
    #[error("skipped-key limit exceeded: chain at {current}, message at {requested}")]
    SkippedKeyLimitExceeded {
        /// Current chain position
        current: u32,
        /// Requested message index
        requested: u32,
    },

    /// Message index is behind the pruning horizon of an inbound group chain
    #[error("key too old: horizon {horizon}, message at {requested}")]
    KeyTooOld {
        /// Earliest index still decryptable
        horizon: u32,
        /// Requested message index
        requested: u32,
    },

    /// Unknown session, prekey, or identity
    #[error("not found: {resource}")]
    NotFound {
        /// Description of the missing resource
        resource: String,
    },

    /// Resource already exists (duplicate identity or session creation)
    #[error("already exists: {resource}")]
    AlreadyExists {
        /// Description of the conflicting resource
        resource: String,
    },

    /// Remote device is marked blocked in the trust ledger
    #[error("peer blocked: {device}")]
    PeerBlocked {
        /// The blocked device
        device: DeviceId,
    },

    /// Session state does not admit the requested operation
    #[error("invalid session state: {reason}")]
    InvalidSessionState {
        /// What was missing or inconsistent
        reason: String,
    },

    /// A ratchet chain reached its maximum index
    #[error("chain exhausted at index {index}")]
    ChainExhausted {
        /// Index at which the chain ran out
        index: u32,
    },

    /// Message or blob encoding failed
    #[error(transparent)]
    Encoding(#[from] ProtoError),

    /// Underlying persistence failed
    ///
    /// The only class a caller may blindly retry.
    #[error(transparent)]
    Storage(#[from] StoreError),
}

impl EngineError {
    /// Returns true if the operation may be retried unchanged.
    ///
    /// Only storage failures qualify: the ratchet state was not advanced if
    /// the save never completed. Every other kind is a permanent verdict on
    /// that specific input.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Storage(_))
    }
}

impl From<CryptoError> for EngineError {
    fn from(err: CryptoError) -> Self {
        match err {
            CryptoError::AuthenticationFailed => Self::AuthenticationFailed,
            CryptoError::InvalidSignature => {
                Self::InvalidRemoteKey { reason: "signature verification failed".to_string() }
            }
            CryptoError::InvalidKey { reason } => Self::InvalidRemoteKey { reason },
            CryptoError::IndexOverflow { current } => Self::ChainExhausted { index: current },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_storage_is_retryable() {
        let storage = EngineError::Storage(StoreError::Io { reason: "disk".to_string() });
        assert!(storage.is_retryable());

        let replay = EngineError::ReplayedMessage { index: 4 };
        assert!(!replay.is_retryable());

        let auth = EngineError::AuthenticationFailed;
        assert!(!auth.is_retryable());
    }

    #[test]
    fn crypto_auth_failure_maps_to_authentication_failed() {
        let err = EngineError::from(CryptoError::AuthenticationFailed);
        assert!(matches!(err, EngineError::AuthenticationFailed));
    }

    #[test]
    fn crypto_signature_failure_maps_to_invalid_remote_key() {
        let err = EngineError::from(CryptoError::InvalidSignature);
        assert!(matches!(err, EngineError::InvalidRemoteKey { .. }));
    }

    #[test]
    fn error_display() {
        let err = EngineError::SkippedKeyLimitExceeded { current: 3, requested: 5000 };
        assert_eq!(err.to_string(), "skipped-key limit exceeded: chain at 3, message at 5000");
    }
}
