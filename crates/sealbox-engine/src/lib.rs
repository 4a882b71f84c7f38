//! Sealbox Session Engine
//!
//! The encrypted-session engine a messaging host embeds: establishment of
//! pairwise secure channels, per-message ratcheting, and group (room)
//! session distribution. The host hands the engine plaintext/ciphertext
//! payloads and receives back ciphertext/plaintext plus session-state blobs
//! to persist; transport, routing, and persistence backends live outside.
//!
//! # Components
//!
//! - [`identity::IdentityStore`] — long-term identity key pairs and the
//!   one-time/signed prekey pool for the local account
//! - [`pairwise::PairwiseEngine`] — asynchronous handshake and double-ratchet
//!   encryption for one-to-one channels
//! - [`group::GroupEngine`] — sender-key distribution and forward-only
//!   decryption for room channels
//! - [`store::SessionStore`] — durable (key, blob) mapping with per-key
//!   locking; [`store::MemoryStore`] is the reference implementation
//! - [`trust::TrustLedger`] — verification state per remote device, gating
//!   session establishment
//!
//! # Control Flow
//!
//! The host calls the identity store once at startup to obtain/publish key
//! material. Each outbound message goes through the pairwise or group engine,
//! which reads and writes through the session store and consults the trust
//! ledger. Each inbound ciphertext routes to the matching engine, creating a
//! new session on first contact when a valid handshake message is present.
//!
//! # Concurrency
//!
//! The engine is called synchronously per operation; it runs no background
//! threads or timers. All mutating access to one session is serialized by the
//! store's per-key lock, and state is persisted only after the ciphertext or
//! plaintext has been produced, so an abandoned operation leaves no
//! half-advanced ratchet behind. Unrelated sessions proceed fully in
//! parallel.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod config;
pub mod error;
pub mod group;
pub mod identity;
pub mod ids;
pub mod pairwise;
pub mod store;
pub mod trust;

pub use config::EngineConfig;
pub use error::EngineError;
pub use group::GroupEngine;
pub use identity::{Identity, IdentityStore};
pub use ids::{DeviceId, RoomId};
pub use pairwise::PairwiseEngine;
pub use store::{MemoryStore, SessionKey, SessionStore, StoreError};
pub use trust::{TrustLedger, TrustState};

// Message structures and session ids are part of the engine's public surface.
pub use sealbox_proto::{
    GroupDistributionMessage, GroupMessage, HandshakeMessage, KeyBundle, RatchetMessage, SessionId,
};
