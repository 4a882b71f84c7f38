//! Sealbox Wire and Storage Structures
//!
//! Opaque structures produced and consumed only by the Sealbox session
//! engine: handshake messages, ratchet ciphertext messages, group messages,
//! group distribution messages, key bundles, and versioned session blobs.
//! Any other component treats the encoded forms as binary blobs keyed by
//! session id.
//!
//! Everything here is plain data plus CBOR encode/decode. No cryptography:
//! the engine seals and opens payloads; this crate only gives them a stable
//! byte layout.
//!
//! # Versioning
//!
//! Persisted session state travels inside [`SessionBlob`], a self-describing
//! envelope carrying a version tag and a state kind. A store upgrade detects
//! blobs from an incompatible engine version and rejects them instead of
//! silently misinterpreting bytes.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod blob;
pub mod error;
pub mod ids;
pub mod messages;

pub use blob::{BLOB_VERSION, BlobKind, SessionBlob};
pub use error::ProtoError;
pub use ids::SessionId;
pub use messages::{
    GroupDistributionMessage, GroupMessage, HandshakeMessage, KeyBundle, OneTimePrekeyPublic,
    RatchetMessage,
};

use serde::{Serialize, de::DeserializeOwned};

/// Encode a value as CBOR bytes.
pub(crate) fn encode_cbor<T: Serialize>(value: &T) -> Result<Vec<u8>, ProtoError> {
    let mut bytes = Vec::new();
    ciborium::into_writer(value, &mut bytes)
        .map_err(|err| ProtoError::Encode { reason: err.to_string() })?;
    Ok(bytes)
}

/// Decode a value from CBOR bytes.
pub(crate) fn decode_cbor<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, ProtoError> {
    ciborium::from_reader(bytes).map_err(|err| ProtoError::Decode { reason: err.to_string() })
}
