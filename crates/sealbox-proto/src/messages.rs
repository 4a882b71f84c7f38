//! Engine message structures.
//!
//! Four message families cross the engine boundary:
//!
//! - [`HandshakeMessage`] — first contact; carries the public material a
//!   responder needs plus the first ratchet ciphertext
//! - [`RatchetMessage`] — steady-state pairwise ciphertext
//! - [`GroupMessage`] — sender-key ciphertext for a room
//! - [`GroupDistributionMessage`] — inbound group chain install, transported
//!   only inside an already-established pairwise ciphertext
//!
//! plus [`KeyBundle`], the publication structure a host pushes to whatever
//! directory service exists.
//!
//! Header fields double as AEAD associated data: both sides bind the exact
//! header bytes into the tag, so a relayed message with an altered header
//! fails authentication rather than decrypting under the wrong position.

use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::{ProtoError, decode_cbor, encode_cbor, ids::SessionId};

/// Steady-state pairwise ratchet ciphertext.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RatchetMessage {
    /// Sender's current ratchet public key (X25519)
    pub ratchet_key: [u8; 32],
    /// Message index within the sender's current sending chain
    pub index: u32,
    /// Number of messages sent on the sender's previous sending chain
    pub prev_index: u32,
    /// Sealed payload (ciphertext plus 16-byte tag)
    #[serde(with = "serde_bytes")]
    pub ciphertext: Vec<u8>,
}

impl RatchetMessage {
    /// Canonical header bytes, bound into the AEAD tag as associated data.
    ///
    /// Layout: `ratchet_key (32) || index (4, BE) || prev_index (4, BE)`.
    pub fn associated_data(&self) -> [u8; 40] {
        let mut ad = [0u8; 40];
        ad[..32].copy_from_slice(&self.ratchet_key);
        ad[32..36].copy_from_slice(&self.index.to_be_bytes());
        ad[36..40].copy_from_slice(&self.prev_index.to_be_bytes());
        ad
    }

    /// Encode to CBOR bytes.
    pub fn encode(&self) -> Result<Vec<u8>, ProtoError> {
        encode_cbor(self)
    }

    /// Decode from CBOR bytes.
    pub fn decode(bytes: &[u8]) -> Result<Self, ProtoError> {
        decode_cbor(bytes)
    }
}

/// First message of a pairwise session.
///
/// Carries the minimum public material the responder needs to derive the
/// shared root key, plus the first ciphertext so no empty round-trip is
/// required before real payload flows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandshakeMessage {
    /// Session id assigned by the initiator
    pub session_id: SessionId,
    /// Initiator's long-term Ed25519 public key
    pub identity_signing_key: [u8; 32],
    /// Initiator's long-term X25519 public key
    pub identity_dh_key: [u8; 32],
    /// Initiator's ephemeral X25519 public key for this handshake
    pub ephemeral_key: [u8; 32],
    /// Id of the responder's signed prekey the initiator used
    pub signed_prekey_id: u32,
    /// Id of the responder's one-time prekey, when one was consumed
    pub one_time_prekey_id: Option<u32>,
    /// The embedded first ratchet message
    pub message: RatchetMessage,
}

impl HandshakeMessage {
    /// Encode to CBOR bytes.
    pub fn encode(&self) -> Result<Vec<u8>, ProtoError> {
        encode_cbor(self)
    }

    /// Decode from CBOR bytes.
    pub fn decode(bytes: &[u8]) -> Result<Self, ProtoError> {
        decode_cbor(bytes)
    }
}

/// Sender-key ciphertext for a room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupMessage {
    /// Outbound group session that produced this message
    pub session_id: SessionId,
    /// Monotonic message index within the session's chain
    pub index: u32,
    /// Sealed payload (ciphertext plus 16-byte tag)
    #[serde(with = "serde_bytes")]
    pub ciphertext: Vec<u8>,
}

impl GroupMessage {
    /// Canonical header bytes, bound into the AEAD tag as associated data.
    ///
    /// Layout: `session_id (16) || index (4, BE)`.
    pub fn associated_data(&self) -> [u8; 20] {
        let mut ad = [0u8; 20];
        ad[..16].copy_from_slice(self.session_id.as_bytes());
        ad[16..20].copy_from_slice(&self.index.to_be_bytes());
        ad
    }

    /// Encode to CBOR bytes.
    pub fn encode(&self) -> Result<Vec<u8>, ProtoError> {
        encode_cbor(self)
    }

    /// Decode from CBOR bytes.
    pub fn decode(bytes: &[u8]) -> Result<Self, ProtoError> {
        decode_cbor(bytes)
    }
}

/// Inbound group chain install.
///
/// Carries live key material. MUST only ever travel inside an established
/// pairwise ciphertext; the engine never emits it in the clear. The chain
/// key is exported at the session's current index, so the recipient can
/// decrypt from that point forward but nothing earlier.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct GroupDistributionMessage {
    /// Outbound session being shared
    #[zeroize(skip)]
    pub session_id: SessionId,
    /// Chain key at `index`
    pub chain_key: [u8; 32],
    /// First index the recipient will be able to decrypt
    #[zeroize(skip)]
    pub index: u32,
}

impl GroupDistributionMessage {
    /// Encode to CBOR bytes.
    pub fn encode(&self) -> Result<Vec<u8>, ProtoError> {
        encode_cbor(self)
    }

    /// Decode from CBOR bytes.
    pub fn decode(bytes: &[u8]) -> Result<Self, ProtoError> {
        decode_cbor(bytes)
    }
}

impl std::fmt::Debug for GroupDistributionMessage {
    // Chain key is live key material; keep it out of logs.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GroupDistributionMessage")
            .field("session_id", &self.session_id)
            .field("index", &self.index)
            .finish_non_exhaustive()
    }
}

/// A published one-time prekey.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OneTimePrekeyPublic {
    /// Opaque identifier the initiator echoes back during handshake
    pub id: u32,
    /// X25519 public key
    pub key: [u8; 32],
}

/// Key bundle publication structure.
///
/// Produced by the identity store; the host publishes it via whatever
/// directory service exists. Contains only public material.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyBundle {
    /// Long-term Ed25519 public key
    pub identity_signing_key: [u8; 32],
    /// Long-term X25519 public key
    pub identity_dh_key: [u8; 32],
    /// Id of the current signed prekey
    pub signed_prekey_id: u32,
    /// Current signed prekey (X25519 public)
    pub signed_prekey: [u8; 32],
    /// Ed25519 signature over the signed prekey public bytes
    #[serde(with = "serde_bytes")]
    pub signed_prekey_signature: Vec<u8>,
    /// Batch of unconsumed one-time prekeys
    pub one_time_prekeys: Vec<OneTimePrekeyPublic>,
}

impl KeyBundle {
    /// Encode to CBOR bytes.
    pub fn encode(&self) -> Result<Vec<u8>, ProtoError> {
        encode_cbor(self)
    }

    /// Decode from CBOR bytes.
    pub fn decode(bytes: &[u8]) -> Result<Self, ProtoError> {
        decode_cbor(bytes)
    }
}
