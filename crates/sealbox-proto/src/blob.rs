//! Versioned session blobs.
//!
//! Every piece of persisted engine state serializes to a self-describing
//! envelope: a version tag, a kind tag, and the CBOR-encoded state. The
//! session store owns the bytes and nothing else; only the engine can read
//! them back, and only when version and kind both match.

use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::{ProtoError, decode_cbor, encode_cbor};

/// Blob format version written by this engine.
pub const BLOB_VERSION: u16 = 1;

/// Kind of state held in a blob.
///
/// Pairwise, group-outbound, and group-inbound sessions have fundamentally
/// different state machines and key-rotation rules, so the kind is tagged
/// explicitly rather than inferred from the payload shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BlobKind {
    /// Long-term identity and prekey pool
    Identity,
    /// Pairwise double-ratchet session
    Pairwise,
    /// Outbound group session (sender side)
    GroupOutbound,
    /// Inbound group session (per room, sender device, session id)
    GroupInbound,
}

/// Self-describing envelope for persisted session state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionBlob {
    version: u16,
    kind: BlobKind,
    #[serde(with = "serde_bytes")]
    payload: Vec<u8>,
}

impl SessionBlob {
    /// Serialize `state` into versioned blob bytes.
    pub fn seal<T: Serialize>(kind: BlobKind, state: &T) -> Result<Vec<u8>, ProtoError> {
        let payload = encode_cbor(state)?;
        encode_cbor(&Self { version: BLOB_VERSION, kind, payload })
    }

    /// Deserialize blob bytes back into state of the expected kind.
    ///
    /// # Errors
    ///
    /// - [`ProtoError::IncompatibleVersion`] if the blob was written by a
    ///   different engine version
    /// - [`ProtoError::KindMismatch`] if the blob holds another state kind
    /// - [`ProtoError::Decode`] if the bytes are malformed
    pub fn open<T: DeserializeOwned>(bytes: &[u8], expected: BlobKind) -> Result<T, ProtoError> {
        let blob: Self = decode_cbor(bytes)?;

        if blob.version != BLOB_VERSION {
            return Err(ProtoError::IncompatibleVersion {
                found: blob.version,
                supported: BLOB_VERSION,
            });
        }
        if blob.kind != expected {
            return Err(ProtoError::KindMismatch { expected, found: blob.kind });
        }

        decode_cbor(&blob.payload)
    }
}
